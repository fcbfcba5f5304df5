// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Derivation of the send-only offer presented to a recording server.
//!
//! Every recordable stream of the original call (non-zero port) is doubled
//! into a (received, sent) pair of send-only media descriptions carrying
//! the fixed labels of [`MediaLabel`]. Rejected streams are omitted.

use std::net::IpAddr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::{
    Attribute, Direction, MediaDescription, MediaKind, MediaLabel, MediaType, Protocol,
    SessionDescription,
};

/// Key-exchange profile offered for the RTP legs toward the SRS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RtpEncryption {
    None,
    SdesSrtp,
    DtlsSrtp,
}

/// Transport profile offered for the MSRP leg toward the SRS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MsrpEncryption {
    None,
    Msrps,
}

/// Source of local media ports for the recording legs.
///
/// Port allocation policy belongs to the host application; the offer
/// factory only draws from it. Ports stay owned by the leg that binds
/// them until that leg is torn down.
pub trait MediaPortManager: Send + Sync + 'static {
    fn next_audio_port(&self) -> u16;
    fn next_video_port(&self) -> u16;
    fn next_text_port(&self) -> u16;
    fn next_msrp_port(&self) -> u16;

    fn next_port(&self, kind: MediaKind) -> u16 {
        match kind {
            MediaKind::Audio => self.next_audio_port(),
            MediaKind::Video => self.next_video_port(),
            MediaKind::Text => self.next_text_port(),
            MediaKind::Msrp => self.next_msrp_port(),
        }
    }
}

/// Inputs controlling offer derivation.
#[derive(Debug, Clone)]
pub struct OfferOptions {
    /// Local address placed in the origin and connection lines.
    pub local_ip: IpAddr,
    pub rtp_encryption: RtpEncryption,
    pub msrp_encryption: MsrpEncryption,
    /// Certificate fingerprint advertised for DTLS-SRTP offers,
    /// e.g. `sha-256 AB:CD:…`.
    pub dtls_fingerprint: Option<SmolStr>,
}

/// One (received, sent) pair emitted into the offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferedStream {
    pub kind: MediaKind,
    pub received: MediaLabel,
    pub sent: MediaLabel,
}

/// Builds the complete offer for the given answered SDP of the original
/// call. Returns the offer and the stream pairs it contains, in media
/// order.
pub fn build_recording_offer(
    answered: &SessionDescription,
    opts: &OfferOptions,
    ports: &dyn MediaPortManager,
) -> (SessionDescription, Vec<OfferedStream>) {
    let mut rng = rand::thread_rng();
    let session_id: u64 = rng.gen_range(1_000_000..u64::MAX / 2);

    let mut offer = SessionDescription::builder()
        .origin("-", &session_id.to_string(), &opts.local_ip.to_string())
        .session_name("recording")
        .connection(&opts.local_ip.to_string())
        .build();

    let mut streams = Vec::new();
    for original in answered.recordable_media() {
        if let Some(stream) = append_recording_pair(&mut offer, original, opts, ports) {
            streams.push(stream);
        }
    }

    (offer, streams)
}

/// Appends the (received, sent) pair for one original media description to
/// an offer under construction. Returns `None` for media kinds the
/// recorder does not mirror.
pub fn append_recording_pair(
    offer: &mut SessionDescription,
    original: &MediaDescription,
    opts: &OfferOptions,
    ports: &dyn MediaPortManager,
) -> Option<OfferedStream> {
    let kind = original.kind()?;
    let received = MediaLabel::received_for(kind);
    let sent = MediaLabel::sent_for(kind);

    let (first, second) = match kind {
        MediaKind::Msrp => (
            msrp_leg(opts, ports.next_port(kind), received),
            msrp_leg(opts, ports.next_port(kind), sent),
        ),
        _ => (
            rtp_leg(original, opts, ports.next_port(kind), received),
            rtp_leg(original, opts, ports.next_port(kind), sent),
        ),
    };

    offer.media.push(first);
    offer.media.push(second);

    Some(OfferedStream {
        kind,
        received,
        sent,
    })
}

/// Copies an RTP media description into a labelled send-only leg with the
/// configured encryption attributes.
fn rtp_leg(
    original: &MediaDescription,
    opts: &OfferOptions,
    port: u16,
    label: MediaLabel,
) -> MediaDescription {
    let protocol = match opts.rtp_encryption {
        RtpEncryption::None => Protocol::RtpAvp,
        RtpEncryption::SdesSrtp => Protocol::RtpSavp,
        RtpEncryption::DtlsSrtp if opts.dtls_fingerprint.is_some() => Protocol::UdpTlsRtpSavp,
        RtpEncryption::DtlsSrtp => Protocol::RtpAvp,
    };

    let mut leg = MediaDescription {
        media_type: original.media_type.clone(),
        port,
        protocol,
        formats: original.formats.clone(),
        connection: None,
        attributes: Vec::new(),
    };

    // Codec parameters travel with the copy; direction, labels, and any
    // original keying material do not.
    for attr in &original.attributes {
        if let Attribute::Value { name, .. } = attr {
            if matches!(
                name.as_str(),
                "rtpmap" | "fmtp" | "ptime" | "maxptime"
            ) {
                leg.attributes.push(attr.clone());
            }
        }
    }

    match opts.rtp_encryption {
        RtpEncryption::SdesSrtp => {
            let value = format!("1 AES_CM_128_HMAC_SHA1_80 inline:{}", sdes_keying_material());
            leg = leg.add_attribute("crypto", &value);
        }
        RtpEncryption::DtlsSrtp => {
            if let Some(fingerprint) = &opts.dtls_fingerprint {
                leg = leg
                    .add_attribute("fingerprint", fingerprint)
                    .add_attribute("setup", "actpass");
            }
        }
        RtpEncryption::None => {}
    }

    leg = leg.add_attribute("label", label.as_str());
    leg.set_direction(Direction::SendOnly);
    leg
}

/// Builds a fresh MSRP media description bound to the local endpoint.
fn msrp_leg(opts: &OfferOptions, port: u16, label: MediaLabel) -> MediaDescription {
    let secure = opts.msrp_encryption == MsrpEncryption::Msrps;
    let scheme = if secure { "msrps" } else { "msrp" };
    let host = match opts.local_ip {
        IpAddr::V6(ip) => format!("[{}]", ip),
        IpAddr::V4(ip) => ip.to_string(),
    };
    let path = format!("{}://{}:{}/{};tcp", scheme, host, port, msrp_session_token());

    let mut leg = MediaDescription::message(port);
    leg.protocol = if secure {
        Protocol::TcpTlsMsrp
    } else {
        Protocol::TcpMsrp
    };
    leg = leg
        .add_attribute("path", &path)
        .add_attribute("setup", "active")
        .add_attribute("label", label.as_str());
    leg.set_direction(Direction::SendOnly);
    leg
}

/// Propagates the original MSRP accept-types onto both offered legs.
/// Separate from leg construction because the pair shares one original.
pub fn copy_accept_types(offer: &mut SessionDescription, original: &MediaDescription) {
    let accepted = original
        .attribute("accept-types")
        .cloned()
        .unwrap_or_else(|| SmolStr::new("*"));
    for media in offer
        .media
        .iter_mut()
        .filter(|m| m.media_type == MediaType::Message)
    {
        if media.attribute("accept-types").is_none() {
            media.attributes.push(Attribute::Value {
                name: SmolStr::new("accept-types"),
                value: accepted.clone(),
            });
        }
    }
}

/// 30 bytes of fresh keying material, base64 as RFC 4568 requires.
fn sdes_keying_material() -> String {
    let mut key = [0u8; 30];
    rand::thread_rng().fill(&mut key[..]);
    BASE64.encode(key)
}

fn msrp_session_token() -> String {
    let mut rng = rand::thread_rng();
    (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU16, Ordering};

    struct SequentialPorts(AtomicU16);

    impl SequentialPorts {
        fn new(base: u16) -> Self {
            Self(AtomicU16::new(base))
        }
    }

    impl MediaPortManager for SequentialPorts {
        fn next_audio_port(&self) -> u16 {
            self.0.fetch_add(2, Ordering::SeqCst)
        }
        fn next_video_port(&self) -> u16 {
            self.0.fetch_add(2, Ordering::SeqCst)
        }
        fn next_text_port(&self) -> u16 {
            self.0.fetch_add(2, Ordering::SeqCst)
        }
        fn next_msrp_port(&self) -> u16 {
            self.0.fetch_add(2, Ordering::SeqCst)
        }
    }

    fn opts(rtp: RtpEncryption) -> OfferOptions {
        OfferOptions {
            local_ip: "192.0.2.10".parse().unwrap(),
            rtp_encryption: rtp,
            msrp_encryption: MsrpEncryption::None,
            dtls_fingerprint: None,
        }
    }

    fn answered_audio_video() -> SessionDescription {
        SessionDescription::builder()
            .origin("caller", "1", "198.51.100.1")
            .session_name("-")
            .connection("198.51.100.1")
            .media(
                MediaDescription::audio(40000)
                    .add_format(0)
                    .add_rtpmap(0, "PCMU", 8000)
                    .add_property("sendrecv"),
            )
            .media(
                MediaDescription::video(40002)
                    .add_format(96)
                    .add_rtpmap(96, "H264", 90000),
            )
            .build()
    }

    #[test]
    fn doubles_every_recordable_stream() {
        let answered = answered_audio_video();
        let (offer, streams) = build_recording_offer(
            &answered,
            &opts(RtpEncryption::None),
            &SequentialPorts::new(20000),
        );

        assert_eq!(offer.media.len(), 4);
        assert_eq!(streams.len(), 2);
        // Labels alternate received (odd) then sent (even), per kind.
        assert_eq!(offer.media[0].label(), Some(1));
        assert_eq!(offer.media[1].label(), Some(2));
        assert_eq!(offer.media[2].label(), Some(3));
        assert_eq!(offer.media[3].label(), Some(4));
        for media in &offer.media {
            assert_eq!(media.direction(), Direction::SendOnly);
        }
    }

    #[test]
    fn rejected_media_is_omitted() {
        let answered = SessionDescription::builder()
            .origin("caller", "1", "198.51.100.1")
            .session_name("-")
            .connection("198.51.100.1")
            .media(MediaDescription::audio(40000).add_format(0))
            .media(MediaDescription::video(0).add_format(96))
            .build();

        let (offer, streams) = build_recording_offer(
            &answered,
            &opts(RtpEncryption::None),
            &SequentialPorts::new(20000),
        );

        assert_eq!(offer.media.len(), 2);
        assert_eq!(streams.len(), 1);
        assert!(offer
            .media
            .iter()
            .all(|m| m.media_type == MediaType::Audio));
    }

    #[test]
    fn codec_attributes_are_copied() {
        let answered = answered_audio_video();
        let (offer, _) = build_recording_offer(
            &answered,
            &opts(RtpEncryption::None),
            &SequentialPorts::new(20000),
        );
        assert_eq!(
            offer.media[0].attribute("rtpmap").map(|v| v.as_str()),
            Some("0 PCMU/8000")
        );
        assert_eq!(offer.media[0].formats, answered.media[0].formats);
    }

    #[test]
    fn sdes_offer_carries_crypto_per_leg() {
        let answered = answered_audio_video();
        let (offer, _) = build_recording_offer(
            &answered,
            &opts(RtpEncryption::SdesSrtp),
            &SequentialPorts::new(20000),
        );
        let mut keys = Vec::new();
        for media in &offer.media {
            assert_eq!(media.protocol, Protocol::RtpSavp);
            let crypto = media.attribute("crypto").expect("crypto line");
            assert!(crypto.starts_with("1 AES_CM_128_HMAC_SHA1_80 inline:"));
            keys.push(crypto.clone());
        }
        // Keying material is fresh per leg.
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), 4);
    }

    #[test]
    fn dtls_offer_carries_fingerprint() {
        let mut options = opts(RtpEncryption::DtlsSrtp);
        options.dtls_fingerprint = Some(SmolStr::new("sha-256 AB:CD:EF"));
        let (offer, _) = build_recording_offer(
            &answered_audio_video(),
            &options,
            &SequentialPorts::new(20000),
        );
        for media in &offer.media {
            assert_eq!(media.protocol, Protocol::UdpTlsRtpSavp);
            assert_eq!(
                media.attribute("fingerprint").map(|v| v.as_str()),
                Some("sha-256 AB:CD:EF")
            );
            assert_eq!(media.attribute("setup").map(|v| v.as_str()), Some("actpass"));
        }
    }

    #[test]
    fn msrp_pair_is_built_fresh() {
        let answered = SessionDescription::builder()
            .origin("caller", "1", "198.51.100.1")
            .session_name("-")
            .connection("198.51.100.1")
            .media(
                MediaDescription::message(7394)
                    .add_attribute("path", "msrp://198.51.100.1:7394/orig;tcp")
                    .add_attribute("accept-types", "message/cpim"),
            )
            .build();

        let mut options = opts(RtpEncryption::None);
        options.msrp_encryption = MsrpEncryption::Msrps;
        let (mut offer, streams) =
            build_recording_offer(&answered, &options, &SequentialPorts::new(20000));
        copy_accept_types(&mut offer, &answered.media[0]);

        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].received, MediaLabel::ReceivedMsrp);
        assert_eq!(offer.media.len(), 2);
        for media in &offer.media {
            assert_eq!(media.protocol, Protocol::TcpTlsMsrp);
            let path = media.attribute("path").expect("path");
            assert!(path.starts_with("msrps://192.0.2.10:"));
            assert_eq!(media.attribute("setup").map(|v| v.as_str()), Some("active"));
            assert_eq!(
                media.attribute("accept-types").map(|v| v.as_str()),
                Some("message/cpim")
            );
        }
    }

    #[test]
    fn offer_media_count_matches_answer_shape() {
        // count(offer media) == 2 * count(answered media with port != 0)
        let answered = answered_audio_video();
        let (offer, _) = build_recording_offer(
            &answered,
            &opts(RtpEncryption::None),
            &SequentialPorts::new(30000),
        );
        assert_eq!(
            offer.media.len(),
            2 * answered.recordable_media().count()
        );
    }
}
