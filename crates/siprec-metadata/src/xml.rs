//! RFC 7865 XML rendering.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::{MetadataError, RecordingMetadata, StreamAssociation};

const RECORDING_NS: &str = "urn:ietf:params:xml:ns:recording:1";

pub(crate) fn render(doc: &RecordingMetadata) -> Result<String, MetadataError> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(render_err)?;

    let mut recording = BytesStart::new("recording");
    recording.push_attribute(("xmlns", RECORDING_NS));
    writer
        .write_event(Event::Start(recording))
        .map_err(render_err)?;

    text_element(&mut writer, "datamode", "complete")?;

    // group
    let mut group = BytesStart::new("group");
    group.push_attribute(("group_id", doc.group_id().as_str()));
    writer.write_event(Event::Start(group)).map_err(render_err)?;
    text_element(
        &mut writer,
        "associate-time",
        &doc.associate_time().to_rfc3339(),
    )?;
    end_element(&mut writer, "group")?;

    // session
    let mut session = BytesStart::new("session");
    session.push_attribute(("session_id", doc.session_id().as_str()));
    writer
        .write_event(Event::Start(session))
        .map_err(render_err)?;
    text_element(&mut writer, "sipSessionID", doc.sip_session_id().as_str())?;
    text_element(&mut writer, "group-ref", doc.group_id().as_str())?;
    end_element(&mut writer, "session")?;

    // participants
    for participant in [doc.from_participant(), doc.to_participant()] {
        let mut elem = BytesStart::new("participant");
        elem.push_attribute(("participant_id", participant.id.as_str()));
        writer.write_event(Event::Start(elem)).map_err(render_err)?;

        let mut name_id = BytesStart::new("nameID");
        name_id.push_attribute(("aor", participant.aor.as_str()));
        writer
            .write_event(Event::Start(name_id))
            .map_err(render_err)?;
        text_element(&mut writer, "name", participant.name.as_str())?;
        end_element(&mut writer, "nameID")?;

        end_element(&mut writer, "participant")?;
    }

    // streams
    for stream in doc.streams() {
        let mut elem = BytesStart::new("stream");
        elem.push_attribute(("stream_id", stream.id.as_str()));
        elem.push_attribute(("session_id", doc.session_id().as_str()));
        writer.write_event(Event::Start(elem)).map_err(render_err)?;
        text_element(&mut writer, "label", stream.label.as_str())?;
        end_element(&mut writer, "stream")?;
    }

    // session ↔ recording association
    let mut sr_assoc = BytesStart::new("sessionrecordingassoc");
    sr_assoc.push_attribute(("session_id", doc.session_id().as_str()));
    writer
        .write_event(Event::Start(sr_assoc))
        .map_err(render_err)?;
    text_element(
        &mut writer,
        "associate-time",
        &doc.associate_time().to_rfc3339(),
    )?;
    end_element(&mut writer, "sessionrecordingassoc")?;

    // participant ↔ session associations
    for participant in [doc.from_participant(), doc.to_participant()] {
        let mut elem = BytesStart::new("participantsessionassoc");
        elem.push_attribute(("participant_id", participant.id.as_str()));
        elem.push_attribute(("session_id", doc.session_id().as_str()));
        writer.write_event(Event::Start(elem)).map_err(render_err)?;
        end_element(&mut writer, "participantsessionassoc")?;
    }

    // participant ↔ stream associations
    stream_assoc(
        &mut writer,
        doc.from_participant().id.as_str(),
        doc.from_association(),
    )?;
    stream_assoc(
        &mut writer,
        doc.to_participant().id.as_str(),
        doc.to_association(),
    )?;

    end_element(&mut writer, "recording")?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| MetadataError::Render(e.to_string()))
}

fn stream_assoc(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    participant_id: &str,
    assoc: &StreamAssociation,
) -> Result<(), MetadataError> {
    let mut elem = BytesStart::new("participantstreamassoc");
    elem.push_attribute(("participant_id", participant_id));
    writer.write_event(Event::Start(elem)).map_err(render_err)?;
    for id in &assoc.send {
        text_element(writer, "send", id.as_str())?;
    }
    for id in &assoc.recv {
        text_element(writer, "recv", id.as_str())?;
    }
    end_element(writer, "participantstreamassoc")
}

fn text_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    name: &str,
    text: &str,
) -> Result<(), MetadataError> {
    writer
        .write_event(Event::Start(BytesStart::new(name)))
        .map_err(render_err)?;
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .map_err(render_err)?;
    end_element(writer, name)
}

fn end_element(writer: &mut Writer<Cursor<Vec<u8>>>, name: &str) -> Result<(), MetadataError> {
    writer
        .write_event(Event::End(BytesStart::new(name).to_end()))
        .map_err(render_err)
}

fn render_err<E: std::fmt::Display>(err: E) -> MetadataError {
    MetadataError::Render(err.to_string())
}

#[cfg(test)]
mod tests {
    use siprec_core::SipUri;
    use siprec_sdp::MediaLabel;

    use crate::RecordingMetadata;

    fn rendered() -> String {
        let from = SipUri::parse("sip:alice@example.com").unwrap();
        let to = SipUri::parse("sip:bob@example.com").unwrap();
        let mut doc = RecordingMetadata::new("call-42", &from, &to);
        doc.add_stream_pair(MediaLabel::ReceivedAudio, MediaLabel::SentAudio)
            .unwrap();
        doc.to_xml().unwrap()
    }

    #[test]
    fn renders_namespace_and_datamode() {
        let xml = rendered();
        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<recording xmlns=\"urn:ietf:params:xml:ns:recording:1\">"));
        assert!(xml.contains("<datamode>complete</datamode>"));
    }

    #[test]
    fn renders_session_with_call_id() {
        let xml = rendered();
        assert!(xml.contains("<sipSessionID>call-42</sipSessionID>"));
        assert!(xml.contains("<group-ref>"));
    }

    #[test]
    fn renders_graph_cardinality() {
        let xml = rendered();
        assert_eq!(xml.matches("<participant ").count(), 2);
        assert_eq!(xml.matches("<participantsessionassoc ").count(), 2);
        assert_eq!(xml.matches("<participantstreamassoc ").count(), 2);
        assert_eq!(xml.matches("<stream ").count(), 2);
        assert_eq!(xml.matches("<sessionrecordingassoc ").count(), 1);
        assert_eq!(xml.matches("<label>").count(), 2);
        assert!(xml.contains("<label>1</label>"));
        assert!(xml.contains("<label>2</label>"));
    }

    #[test]
    fn aor_appears_on_name_id() {
        let xml = rendered();
        assert!(xml.contains("aor=\"sip:alice@example.com\""));
        assert!(xml.contains("<name>alice</name>"));
    }
}
