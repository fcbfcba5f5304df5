// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tolerant SDP parser.
//!
//! Accepts the dialects produced by call engines and SRSs: unknown line
//! types are skipped, attribute order is preserved, and only structurally
//! broken v=/o=/m= lines are rejected.

use smol_str::SmolStr;

use crate::{
    AddrType, Attribute, Connection, MediaDescription, MediaType, Origin, Protocol,
    SessionDescription,
};

/// Upper bound for SDP input accepted from the wire.
const MAX_SDP_BYTES: usize = 128 * 1024;

/// Error type for SDP parsing failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdpParseError {
    /// Missing required field
    MissingField(&'static str),
    /// Invalid field format
    InvalidLine(&'static str, String),
    /// Input exceeds the accepted size
    TooLarge(usize),
}

impl std::fmt::Display for SdpParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SdpParseError::MissingField(field) => {
                write!(f, "missing required SDP field: {}", field)
            }
            SdpParseError::InvalidLine(kind, line) => {
                write!(f, "invalid SDP {} line: {}", kind, line)
            }
            SdpParseError::TooLarge(len) => write!(f, "SDP input too large: {} bytes", len),
        }
    }
}

impl std::error::Error for SdpParseError {}

/// Parses a complete SDP session description.
pub fn parse_sdp(input: &str) -> Result<SessionDescription, SdpParseError> {
    if input.len() > MAX_SDP_BYTES {
        return Err(SdpParseError::TooLarge(input.len()));
    }

    let mut sdp = SessionDescription::default();
    let mut origin_seen = false;
    let mut current_media: Option<MediaDescription> = None;

    for raw in input.lines() {
        let line = raw.trim_end();
        if line.is_empty() {
            continue;
        }
        let (kind, value) = match line.split_once('=') {
            Some((kind, value)) if kind.len() == 1 => (kind.as_bytes()[0], value),
            _ => continue,
        };

        match kind {
            b'v' => {
                sdp.version = value
                    .trim()
                    .parse()
                    .map_err(|_| SdpParseError::InvalidLine("v", line.to_owned()))?;
            }
            b'o' => {
                sdp.origin = parse_origin(value)
                    .ok_or_else(|| SdpParseError::InvalidLine("o", line.to_owned()))?;
                origin_seen = true;
            }
            b's' => {
                sdp.session_name = SmolStr::new(value);
            }
            b'c' => {
                let connection = parse_connection(value)
                    .ok_or_else(|| SdpParseError::InvalidLine("c", line.to_owned()))?;
                match current_media.as_mut() {
                    Some(media) => media.connection = Some(connection),
                    None => sdp.connection = Some(connection),
                }
            }
            b'm' => {
                if let Some(finished) = current_media.take() {
                    sdp.media.push(finished);
                }
                current_media = Some(
                    parse_media_line(value)
                        .ok_or_else(|| SdpParseError::InvalidLine("m", line.to_owned()))?,
                );
            }
            b'a' => {
                let attribute = parse_attribute(value);
                match current_media.as_mut() {
                    Some(media) => media.attributes.push(attribute),
                    None => sdp.attributes.push(attribute),
                }
            }
            // t=, b=, k=, i=, u=, e=, p=, r=, z= carry nothing the recorder uses.
            _ => {}
        }
    }

    if let Some(finished) = current_media.take() {
        sdp.media.push(finished);
    }
    if !origin_seen {
        return Err(SdpParseError::MissingField("o"));
    }

    Ok(sdp)
}

fn parse_origin(value: &str) -> Option<Origin> {
    let mut parts = value.split_whitespace();
    let username = parts.next()?;
    let session_id = parts.next()?;
    let session_version = parts.next()?;
    let _net_type = parts.next()?;
    let addr_type = parse_addr_type(parts.next()?)?;
    let unicast_address = parts.next()?;
    Some(Origin {
        username: SmolStr::new(username),
        session_id: SmolStr::new(session_id),
        session_version: SmolStr::new(session_version),
        addr_type,
        unicast_address: SmolStr::new(unicast_address),
    })
}

fn parse_connection(value: &str) -> Option<Connection> {
    let mut parts = value.split_whitespace();
    let _net_type = parts.next()?;
    let addr_type = parse_addr_type(parts.next()?)?;
    let connection_address = parts.next()?;
    Some(Connection {
        addr_type,
        connection_address: SmolStr::new(connection_address),
    })
}

fn parse_addr_type(token: &str) -> Option<AddrType> {
    match token {
        "IP4" => Some(AddrType::IPv4),
        "IP6" => Some(AddrType::IPv6),
        _ => None,
    }
}

fn parse_media_line(value: &str) -> Option<MediaDescription> {
    let mut parts = value.split_whitespace();
    let media_type = MediaType::from_token(parts.next()?);
    // "<port>/<count>" port ranges collapse to the base port.
    let port_token = parts.next()?;
    let port = port_token
        .split('/')
        .next()?
        .parse()
        .ok()?;
    let protocol = Protocol::from_token(parts.next()?);
    let formats = parts.map(SmolStr::new).collect();

    Some(MediaDescription {
        media_type,
        port,
        protocol,
        formats,
        connection: None,
        attributes: Vec::new(),
    })
}

fn parse_attribute(value: &str) -> Attribute {
    match value.split_once(':') {
        Some((name, value)) => Attribute::Value {
            name: SmolStr::new(name.trim()),
            value: SmolStr::new(value.trim()),
        },
        None => Attribute::Property(SmolStr::new(value.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;

    const ANSWERED: &str = "v=0\r\n\
o=caller 2890844526 2890844526 IN IP4 198.51.100.1\r\n\
s=-\r\n\
c=IN IP4 198.51.100.1\r\n\
t=0 0\r\n\
m=audio 40000 RTP/AVP 0 8\r\n\
a=rtpmap:0 PCMU/8000\r\n\
a=rtpmap:8 PCMA/8000\r\n\
a=sendrecv\r\n\
m=video 0 RTP/AVP 96\r\n";

    #[test]
    fn parses_answered_sdp() {
        let sdp = parse_sdp(ANSWERED).expect("parse");
        assert_eq!(sdp.version, 0);
        assert_eq!(sdp.origin.username.as_str(), "caller");
        assert_eq!(sdp.media.len(), 2);
        assert_eq!(sdp.media[0].port, 40000);
        assert_eq!(sdp.media[0].direction(), Direction::SendRecv);
        assert_eq!(sdp.media[1].port, 0);
        assert_eq!(sdp.recordable_media().count(), 1);
    }

    #[test]
    fn media_level_connection_overrides() {
        let input = "v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\ns=-\r\nc=IN IP4 10.0.0.1\r\n\
m=audio 5000 RTP/AVP 0\r\nc=IN IP4 10.0.0.2\r\n";
        let sdp = parse_sdp(input).unwrap();
        assert_eq!(
            sdp.media[0]
                .connection
                .as_ref()
                .unwrap()
                .connection_address
                .as_str(),
            "10.0.0.2"
        );
        assert_eq!(
            sdp.connection.unwrap().connection_address.as_str(),
            "10.0.0.1"
        );
    }

    #[test]
    fn unknown_lines_are_skipped() {
        let input = "v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\ns=-\r\nb=AS:64\r\nz=0 0\r\n\
m=audio 5000 RTP/AVP 0\r\nx-custom=ignored\r\n";
        let sdp = parse_sdp(input).unwrap();
        assert_eq!(sdp.media.len(), 1);
    }

    #[test]
    fn missing_origin_is_rejected() {
        assert_eq!(
            parse_sdp("v=0\r\ns=-\r\n"),
            Err(SdpParseError::MissingField("o"))
        );
    }

    #[test]
    fn malformed_media_line_is_rejected() {
        let input = "v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\ns=-\r\nm=audio\r\n";
        assert!(matches!(
            parse_sdp(input),
            Err(SdpParseError::InvalidLine("m", _))
        ));
    }

    #[test]
    fn port_ranges_collapse_to_base_port() {
        let input = "v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\ns=-\r\nm=audio 5000/2 RTP/AVP 0\r\n";
        let sdp = parse_sdp(input).unwrap();
        assert_eq!(sdp.media[0].port, 5000);
    }

    #[test]
    fn msrp_media_parses() {
        let input = "v=0\r\no=- 1 1 IN IP4 10.0.0.1\r\ns=-\r\n\
m=message 7394 TCP/MSRP *\r\na=path:msrp://10.0.0.1:7394/abc;tcp\r\na=accept-types:message/cpim\r\n";
        let sdp = parse_sdp(input).unwrap();
        assert_eq!(sdp.media[0].protocol, Protocol::TcpMsrp);
        assert_eq!(
            sdp.media[0].attribute("accept-types").map(|v| v.as_str()),
            Some("message/cpim")
        );
    }
}
