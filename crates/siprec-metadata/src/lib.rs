// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! RFC 7865 recording metadata documents.
//!
//! The metadata document is a small association graph: one
//! communication-session group, one session (whose `sipSessionID` is the
//! original call's Call-ID), two participants, one stream pair per
//! recordable media stream, and the associations tying them together.
//! The document is created when the recording dialog is established and
//! only ever grows; re-negotiations append streams, never renumber or
//! remove existing entries.
//!
//! # Example
//! ```
//! use siprec_core::SipUri;
//! use siprec_metadata::RecordingMetadata;
//! use siprec_sdp::MediaLabel;
//!
//! let from = SipUri::parse("sip:alice@example.com").unwrap();
//! let to = SipUri::parse("sip:bob@example.com").unwrap();
//! let mut doc = RecordingMetadata::new("call-1", &from, &to);
//! doc.add_stream_pair(MediaLabel::ReceivedAudio, MediaLabel::SentAudio)
//!     .unwrap();
//! let xml = doc.to_xml().unwrap();
//! assert!(xml.contains("urn:ietf:params:xml:ns:recording:1"));
//! ```

mod xml;

use chrono::{DateTime, Utc};
use smol_str::SmolStr;
use uuid::Uuid;

use siprec_core::SipUri;
use siprec_sdp::MediaLabel;

/// MIME type of the rendered document inside SIPREC bodies.
pub const RS_METADATA_MIME: &str = "application/rs-metadata+xml";

/// Errors raised by metadata mutation or rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataError {
    /// No association exists for the given participant.
    ParticipantMissing(SmolStr),
    /// A stream with this label pair already exists.
    DuplicateLabel(u8),
    /// XML rendering failed.
    Render(String),
}

impl std::fmt::Display for MetadataError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataError::ParticipantMissing(id) => {
                write!(f, "no stream association for participant {}", id)
            }
            MetadataError::DuplicateLabel(label) => {
                write!(f, "stream with label {} already present", label)
            }
            MetadataError::Render(msg) => write!(f, "metadata rendering failed: {}", msg),
        }
    }
}

impl std::error::Error for MetadataError {}

/// One recorded party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: SmolStr,
    /// Address-of-record, the full URI rendered canonically.
    pub aor: SmolStr,
    /// Display name: URI user part when non-empty, otherwise the host.
    pub name: SmolStr,
}

/// One recorded media stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub id: SmolStr,
    pub label: MediaLabel,
}

/// Cross-references between a participant and the streams it sends and
/// receives. Stream identifiers, not labels, per RFC 7865 §6.9.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamAssociation {
    pub send: Vec<SmolStr>,
    pub recv: Vec<SmolStr>,
}

/// The complete recording metadata document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingMetadata {
    group_id: SmolStr,
    session_id: SmolStr,
    sip_session_id: SmolStr,
    associate_time: DateTime<Utc>,
    from: Participant,
    to: Participant,
    streams: Vec<Stream>,
    from_assoc: StreamAssociation,
    to_assoc: StreamAssociation,
}

impl RecordingMetadata {
    /// Builds the initial document for a call between `from_uri` and
    /// `to_uri`. Streams are added separately, one pair per recordable
    /// media stream.
    pub fn new(call_id: impl Into<SmolStr>, from_uri: &SipUri, to_uri: &SipUri) -> Self {
        Self {
            group_id: fresh_id(),
            session_id: fresh_id(),
            sip_session_id: call_id.into(),
            associate_time: Utc::now(),
            from: participant_of(from_uri),
            to: participant_of(to_uri),
            streams: Vec::new(),
            from_assoc: StreamAssociation::default(),
            to_assoc: StreamAssociation::default(),
        }
    }

    /// Appends a (received, sent) stream pair and extends both participant
    /// associations.
    ///
    /// Odd (received-from-remote) labels are media the remote party sent,
    /// so they land in the From participant's `send` list and the To
    /// participant's `recv` list; even labels the other way around.
    pub fn add_stream_pair(
        &mut self,
        received: MediaLabel,
        sent: MediaLabel,
    ) -> Result<(SmolStr, SmolStr), MetadataError> {
        if self.streams.iter().any(|s| s.label == received) {
            return Err(MetadataError::DuplicateLabel(received.value()));
        }

        let received_id = fresh_id();
        let sent_id = fresh_id();
        self.streams.push(Stream {
            id: received_id.clone(),
            label: received,
        });
        self.streams.push(Stream {
            id: sent_id.clone(),
            label: sent,
        });

        self.from_assoc.send.push(received_id.clone());
        self.from_assoc.recv.push(sent_id.clone());
        self.to_assoc.send.push(sent_id.clone());
        self.to_assoc.recv.push(received_id.clone());

        Ok((received_id, sent_id))
    }

    /// Renders the document as RFC 7865 XML.
    pub fn to_xml(&self) -> Result<String, MetadataError> {
        xml::render(self)
    }

    pub fn group_id(&self) -> &SmolStr {
        &self.group_id
    }

    pub fn session_id(&self) -> &SmolStr {
        &self.session_id
    }

    pub fn sip_session_id(&self) -> &SmolStr {
        &self.sip_session_id
    }

    pub fn associate_time(&self) -> DateTime<Utc> {
        self.associate_time
    }

    pub fn from_participant(&self) -> &Participant {
        &self.from
    }

    pub fn to_participant(&self) -> &Participant {
        &self.to
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    pub fn from_association(&self) -> &StreamAssociation {
        &self.from_assoc
    }

    pub fn to_association(&self) -> &StreamAssociation {
        &self.to_assoc
    }

    /// Returns the stream with the given label, if present.
    pub fn stream_by_label(&self, label: MediaLabel) -> Option<&Stream> {
        self.streams.iter().find(|s| s.label == label)
    }
}

fn participant_of(uri: &SipUri) -> Participant {
    Participant {
        id: fresh_id(),
        aor: SmolStr::new(uri.to_string()),
        name: uri.user_or_host().clone(),
    }
}

/// Entity identifiers are opaque, unique within the document, and stable
/// for its lifetime.
fn fresh_id() -> SmolStr {
    SmolStr::new(Uuid::new_v4().to_string())
}
