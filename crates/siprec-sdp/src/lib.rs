// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SDP (RFC 4566) model for the recording client.
//!
//! This crate provides:
//! - A session description model tolerant of the SDP dialects SRSs emit
//! - Parsing and serialization
//! - The fixed recording [`MediaLabel`] numbering (RFC 4574 `a=label`)
//! - Derivation of the doubled send-only offer presented to an SRS
//!
//! # Example
//! ```
//! use siprec_sdp::{MediaDescription, MediaType, SessionDescription};
//!
//! let sdp = SessionDescription::builder()
//!     .origin("-", "31337", "192.0.2.10")
//!     .session_name("call")
//!     .connection("192.0.2.10")
//!     .media(MediaDescription::audio(40000).add_format(0))
//!     .build();
//! assert_eq!(sdp.media.len(), 1);
//! ```

pub mod label;
pub mod offer;
pub mod parse;
pub mod serialize;

pub use label::{MediaKind, MediaLabel};
pub use offer::{
    append_recording_pair, build_recording_offer, copy_accept_types, MediaPortManager,
    MsrpEncryption, OfferOptions, OfferedStream, RtpEncryption,
};
pub use parse::SdpParseError;

use smol_str::SmolStr;

/// Complete SDP session description, reduced to the fields the recorder
/// reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    /// Protocol version (always 0 per RFC 4566)
    pub version: u8,

    /// Origin line: o=username session-id session-version IN addrtype address
    pub origin: Origin,

    /// Session name: s=<session name>
    pub session_name: SmolStr,

    /// Session-level connection: c=IN addrtype address
    pub connection: Option<Connection>,

    /// Session-level attributes: a=
    pub attributes: Vec<Attribute>,

    /// Media descriptions: m=
    pub media: Vec<MediaDescription>,
}

/// Origin line (o=) per RFC 4566 §5.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    pub username: SmolStr,
    pub session_id: SmolStr,
    pub session_version: SmolStr,
    pub addr_type: AddrType,
    pub unicast_address: SmolStr,
}

/// Connection information (c=) per RFC 4566 §5.7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub addr_type: AddrType,
    pub connection_address: SmolStr,
}

/// Address type per RFC 4566.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrType {
    IPv4,
    IPv6,
}

/// Media description (m=) per RFC 4566 §5.14.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescription {
    pub media_type: MediaType,
    pub port: u16,
    pub protocol: Protocol,
    pub formats: Vec<SmolStr>,
    pub connection: Option<Connection>,
    pub attributes: Vec<Attribute>,
}

/// Media type token of an m= line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaType {
    Audio,
    Video,
    Text,
    Application,
    Message,
    Other(SmolStr),
}

/// Transport protocol token of an m= line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protocol {
    /// RTP/AVP (RFC 3551)
    RtpAvp,
    /// RTP/SAVP — SDES-keyed secure RTP (RFC 3711)
    RtpSavp,
    /// UDP/TLS/RTP/SAVP — DTLS-keyed secure RTP (RFC 5764)
    UdpTlsRtpSavp,
    /// TCP/MSRP (RFC 4975)
    TcpMsrp,
    /// TCP/TLS/MSRP (RFC 4975)
    TcpTlsMsrp,
    Other(SmolStr),
}

/// SDP attribute (a=) per RFC 4566 §5.13.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// Property attribute: a=<flag>
    Property(SmolStr),
    /// Value attribute: a=<attribute>:<value>
    Value { name: SmolStr, value: SmolStr },
}

/// Media direction property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SendOnly,
    RecvOnly,
    SendRecv,
    Inactive,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::SendOnly => "sendonly",
            Direction::RecvOnly => "recvonly",
            Direction::SendRecv => "sendrecv",
            Direction::Inactive => "inactive",
        }
    }
}

impl Default for SessionDescription {
    fn default() -> Self {
        Self {
            version: 0,
            origin: Origin {
                username: SmolStr::new("-"),
                session_id: SmolStr::new("0"),
                session_version: SmolStr::new("0"),
                addr_type: AddrType::IPv4,
                unicast_address: SmolStr::new("0.0.0.0"),
            },
            session_name: SmolStr::new("-"),
            connection: None,
            attributes: Vec::new(),
            media: Vec::new(),
        }
    }
}

impl SessionDescription {
    /// Creates a new builder for constructing SDP.
    pub fn builder() -> SessionDescriptionBuilder {
        SessionDescriptionBuilder::default()
    }

    /// Parses SDP from a string.
    pub fn parse(sdp: &str) -> Result<Self, SdpParseError> {
        parse::parse_sdp(sdp)
    }

    /// Serializes SDP to its textual form.
    pub fn to_sdp_string(&self) -> String {
        serialize::serialize_sdp(self)
    }

    /// Returns the media descriptions whose port is non-zero.
    pub fn recordable_media(&self) -> impl Iterator<Item = &MediaDescription> {
        self.media.iter().filter(|m| m.port != 0)
    }

    /// Finds a media description by (media type, label) pair. An SRS may
    /// reorder its answer; label is the only stable correlation key.
    pub fn find_labelled(&self, media_type: &MediaType, label: u8) -> Option<&MediaDescription> {
        self.media
            .iter()
            .find(|m| &m.media_type == media_type && m.label() == Some(label))
    }
}

/// Builder for [`SessionDescription`], mirroring the order SDP lines appear.
#[derive(Debug, Default)]
pub struct SessionDescriptionBuilder {
    sdp: SessionDescription,
}

impl SessionDescriptionBuilder {
    pub fn origin(mut self, username: &str, session_id: &str, addr: &str) -> Self {
        self.sdp.origin = Origin::new(username, session_id, addr);
        self
    }

    pub fn session_name(mut self, name: &str) -> Self {
        self.sdp.session_name = SmolStr::new(name);
        self
    }

    pub fn connection(mut self, addr: &str) -> Self {
        self.sdp.connection = Some(Connection::new(addr));
        self
    }

    pub fn attribute(mut self, name: &str, value: &str) -> Self {
        self.sdp.attributes.push(Attribute::Value {
            name: SmolStr::new(name),
            value: SmolStr::new(value),
        });
        self
    }

    pub fn media(mut self, media: MediaDescription) -> Self {
        self.sdp.media.push(media);
        self
    }

    pub fn build(self) -> SessionDescription {
        self.sdp
    }
}

impl MediaDescription {
    /// Creates a new audio media description.
    pub fn audio(port: u16) -> Self {
        Self::new(MediaType::Audio, port, Protocol::RtpAvp)
    }

    /// Creates a new video media description.
    pub fn video(port: u16) -> Self {
        Self::new(MediaType::Video, port, Protocol::RtpAvp)
    }

    /// Creates a new real-time text media description (RFC 4103).
    pub fn text(port: u16) -> Self {
        Self::new(MediaType::Text, port, Protocol::RtpAvp)
    }

    /// Creates a new MSRP message media description (RFC 4975).
    pub fn message(port: u16) -> Self {
        let mut media = Self::new(MediaType::Message, port, Protocol::TcpMsrp);
        media.formats.push(SmolStr::new("*"));
        media
    }

    fn new(media_type: MediaType, port: u16, protocol: Protocol) -> Self {
        Self {
            media_type,
            port,
            protocol,
            formats: Vec::new(),
            connection: None,
            attributes: Vec::new(),
        }
    }

    /// Adds a format (RTP payload type).
    pub fn add_format(mut self, payload_type: u8) -> Self {
        self.formats.push(SmolStr::new(payload_type.to_string()));
        self
    }

    /// Adds an rtpmap attribute.
    pub fn add_rtpmap(self, payload_type: u8, encoding: &str, clock_rate: u32) -> Self {
        let value = format!("{} {}/{}", payload_type, encoding, clock_rate);
        self.add_attribute("rtpmap", &value)
    }

    /// Adds a property attribute.
    pub fn add_property(mut self, name: &str) -> Self {
        self.attributes.push(Attribute::Property(SmolStr::new(name)));
        self
    }

    /// Adds a value attribute.
    pub fn add_attribute(mut self, name: &str, value: &str) -> Self {
        self.attributes.push(Attribute::Value {
            name: SmolStr::new(name),
            value: SmolStr::new(value),
        });
        self
    }

    /// Returns the first value attribute with the given name.
    pub fn attribute(&self, name: &str) -> Option<&SmolStr> {
        self.attributes.iter().find_map(|attr| match attr {
            Attribute::Value { name: n, value } if n.eq_ignore_ascii_case(name) => Some(value),
            _ => None,
        })
    }

    /// Returns true when the given property attribute is present.
    pub fn has_property(&self, name: &str) -> bool {
        self.attributes.iter().any(|attr| match attr {
            Attribute::Property(p) => p.eq_ignore_ascii_case(name),
            _ => false,
        })
    }

    /// Returns the `a=label` value parsed as an integer (RFC 4574).
    pub fn label(&self) -> Option<u8> {
        self.attribute("label")?.trim().parse().ok()
    }

    /// Returns the declared media direction, defaulting to sendrecv.
    pub fn direction(&self) -> Direction {
        for attr in &self.attributes {
            if let Attribute::Property(p) = attr {
                match p.as_str() {
                    "sendonly" => return Direction::SendOnly,
                    "recvonly" => return Direction::RecvOnly,
                    "sendrecv" => return Direction::SendRecv,
                    "inactive" => return Direction::Inactive,
                    _ => {}
                }
            }
        }
        Direction::SendRecv
    }

    /// Replaces any direction property with the given one.
    pub fn set_direction(&mut self, direction: Direction) {
        self.attributes.retain(|attr| {
            !matches!(
                attr,
                Attribute::Property(p)
                    if matches!(p.as_str(), "sendonly" | "recvonly" | "sendrecv" | "inactive")
            )
        });
        self.attributes
            .push(Attribute::Property(SmolStr::new(direction.as_str())));
    }

    /// Classifies this description into the recorder's media kinds, or
    /// `None` for media the recorder does not mirror.
    pub fn kind(&self) -> Option<MediaKind> {
        match (&self.media_type, &self.protocol) {
            (MediaType::Audio, _) => Some(MediaKind::Audio),
            (MediaType::Video, _) => Some(MediaKind::Video),
            (MediaType::Text, _) => Some(MediaKind::Text),
            (MediaType::Message, Protocol::TcpMsrp | Protocol::TcpTlsMsrp) => {
                Some(MediaKind::Msrp)
            }
            _ => None,
        }
    }
}

impl Origin {
    /// Creates a new origin line.
    pub fn new(username: &str, session_id: &str, addr: &str) -> Self {
        Self {
            username: SmolStr::new(username),
            session_id: SmolStr::new(session_id),
            session_version: SmolStr::new("0"),
            addr_type: AddrType::of(addr),
            unicast_address: SmolStr::new(addr),
        }
    }
}

impl Connection {
    /// Creates a new connection line.
    pub fn new(addr: &str) -> Self {
        Self {
            addr_type: AddrType::of(addr),
            connection_address: SmolStr::new(addr),
        }
    }
}

impl AddrType {
    fn of(addr: &str) -> Self {
        if addr.contains(':') {
            AddrType::IPv6
        } else {
            AddrType::IPv4
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Audio => write!(f, "audio"),
            MediaType::Video => write!(f, "video"),
            MediaType::Text => write!(f, "text"),
            MediaType::Application => write!(f, "application"),
            MediaType::Message => write!(f, "message"),
            MediaType::Other(name) => write!(f, "{}", name),
        }
    }
}

impl MediaType {
    pub fn from_token(token: &str) -> Self {
        match token {
            "audio" => MediaType::Audio,
            "video" => MediaType::Video,
            "text" => MediaType::Text,
            "application" => MediaType::Application,
            "message" => MediaType::Message,
            other => MediaType::Other(SmolStr::new(other)),
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::RtpAvp => write!(f, "RTP/AVP"),
            Protocol::RtpSavp => write!(f, "RTP/SAVP"),
            Protocol::UdpTlsRtpSavp => write!(f, "UDP/TLS/RTP/SAVP"),
            Protocol::TcpMsrp => write!(f, "TCP/MSRP"),
            Protocol::TcpTlsMsrp => write!(f, "TCP/TLS/MSRP"),
            Protocol::Other(s) => write!(f, "{}", s),
        }
    }
}

impl Protocol {
    pub fn from_token(token: &str) -> Self {
        match token {
            "RTP/AVP" => Protocol::RtpAvp,
            "RTP/SAVP" => Protocol::RtpSavp,
            "UDP/TLS/RTP/SAVP" => Protocol::UdpTlsRtpSavp,
            "TCP/MSRP" => Protocol::TcpMsrp,
            "TCP/TLS/MSRP" => Protocol::TcpTlsMsrp,
            other => Protocol::Other(SmolStr::new(other)),
        }
    }

    /// Returns true for RTP-family protocols.
    pub fn is_rtp(&self) -> bool {
        matches!(
            self,
            Protocol::RtpAvp | Protocol::RtpSavp | Protocol::UdpTlsRtpSavp
        )
    }
}

impl std::fmt::Display for AddrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddrType::IPv4 => write!(f, "IP4"),
            AddrType::IPv6 => write!(f, "IP6"),
        }
    }
}
