// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SDP serializer producing RFC 4566 text.

use crate::{Attribute, Connection, SessionDescription};

/// Serializes a session description to its textual wire form.
pub fn serialize_sdp(sdp: &SessionDescription) -> String {
    let mut output = String::new();

    output.push_str(&format!("v={}\r\n", sdp.version));
    output.push_str(&format!(
        "o={} {} {} IN {} {}\r\n",
        sdp.origin.username,
        sdp.origin.session_id,
        sdp.origin.session_version,
        sdp.origin.addr_type,
        sdp.origin.unicast_address
    ));
    output.push_str(&format!("s={}\r\n", sdp.session_name));

    if let Some(conn) = &sdp.connection {
        push_connection(&mut output, conn);
    }

    // Time is required by the grammar; the recorder only ever describes
    // unbounded sessions.
    output.push_str("t=0 0\r\n");

    for attr in &sdp.attributes {
        push_attribute(&mut output, attr);
    }

    for media in &sdp.media {
        output.push_str(&format!(
            "m={} {} {}",
            media.media_type, media.port, media.protocol
        ));
        for format in &media.formats {
            output.push_str(&format!(" {}", format));
        }
        output.push_str("\r\n");

        if let Some(conn) = &media.connection {
            push_connection(&mut output, conn);
        }
        for attr in &media.attributes {
            push_attribute(&mut output, attr);
        }
    }

    output
}

fn push_connection(output: &mut String, conn: &Connection) {
    output.push_str(&format!(
        "c=IN {} {}\r\n",
        conn.addr_type, conn.connection_address
    ));
}

fn push_attribute(output: &mut String, attr: &Attribute) {
    match attr {
        Attribute::Property(name) => output.push_str(&format!("a={}\r\n", name)),
        Attribute::Value { name, value } => {
            output.push_str(&format!("a={}:{}\r\n", name, value))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{MediaDescription, SessionDescription};

    #[test]
    fn serializes_and_reparses() {
        let sdp = SessionDescription::builder()
            .origin("-", "12345", "192.0.2.10")
            .session_name("rec")
            .connection("192.0.2.10")
            .media(
                MediaDescription::audio(40000)
                    .add_format(0)
                    .add_rtpmap(0, "PCMU", 8000)
                    .add_attribute("label", "1")
                    .add_property("sendonly"),
            )
            .build();

        let text = sdp.to_sdp_string();
        assert!(text.starts_with("v=0\r\n"));
        assert!(text.contains("o=- 12345 0 IN IP4 192.0.2.10\r\n"));
        assert!(text.contains("t=0 0\r\n"));
        assert!(text.contains("m=audio 40000 RTP/AVP 0\r\n"));
        assert!(text.contains("a=label:1\r\n"));
        assert!(text.contains("a=sendonly\r\n"));

        let reparsed = SessionDescription::parse(&text).expect("reparse");
        assert_eq!(reparsed.media.len(), 1);
        assert_eq!(reparsed.media[0].label(), Some(1));
    }

    #[test]
    fn msrp_media_serializes_path() {
        let sdp = SessionDescription::builder()
            .origin("-", "1", "192.0.2.10")
            .session_name("rec")
            .connection("192.0.2.10")
            .media(
                MediaDescription::message(7400)
                    .add_attribute("path", "msrp://192.0.2.10:7400/abcd;tcp")
                    .add_attribute("label", "7")
                    .add_property("sendonly"),
            )
            .build();

        let text = sdp.to_sdp_string();
        assert!(text.contains("m=message 7400 TCP/MSRP *\r\n"));
        assert!(text.contains("a=path:msrp://192.0.2.10:7400/abcd;tcp\r\n"));
    }
}
