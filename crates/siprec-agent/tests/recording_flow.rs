// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end recording flows over an in-memory signalling wire.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use smol_str::SmolStr;

use siprec_agent::{
    AgentDeps, CallParameters, RecorderAgent, RecorderConfig, ReportingIdentity,
    StaticCertificateStore,
};
use siprec_core::{serialize_request, Method, Request, Response, SipUri};
use siprec_media::RtpChannel;
use siprec_sdp::{MediaKind, MediaLabel, MsrpEncryption, RtpEncryption, SessionDescription};
use siprec_testkit::{
    echo_answer, metadata_of, ok_for, reject_for, sdp_of, srs_bye_for, wait_until,
    CaptureEventLog, CaptureLegFactory, FakeWire, SequentialPorts,
};
use siprec_transport::TransportKind;

struct Harness {
    agent: RecorderAgent,
    wire: FakeWire,
    events: CaptureEventLog,
    legs: CaptureLegFactory,
}

fn recorder_config() -> RecorderConfig {
    RecorderConfig {
        name: SmolStr::new("rec1"),
        enabled: true,
        transport: TransportKind::Udp,
        local_endpoint: "192.0.2.10:5080".parse().unwrap(),
        srs_endpoint: "192.0.2.1:5060".parse().unwrap(),
        rtp_encryption: RtpEncryption::None,
        msrp_encryption: MsrpEncryption::None,
        enable_options: false,
        options_interval_secs: 5,
        tls_server_name: None,
    }
}

fn harness() -> Harness {
    let events = CaptureEventLog::new();
    let legs = CaptureLegFactory::new();
    let deps = AgentDeps {
        event_log: Arc::new(events.clone()),
        ports: Arc::new(SequentialPorts::new()),
        legs: Arc::new(legs.clone()),
        certs: Arc::new(StaticCertificateStore::default()),
        identity: ReportingIdentity {
            element_id: SmolStr::new("srv.psap.example"),
            agency_id: SmolStr::new("psap.example"),
            agent_id: SmolStr::new("agent-17"),
        },
        tls: None,
        status_tx: None,
    };
    let agent = RecorderAgent::new(recorder_config(), deps).expect("config");
    let mut wire = FakeWire::new();
    let inbound = wire.take_inbound();
    agent.start_with_transport(wire.transport.clone(), inbound);
    Harness {
        agent,
        wire,
        events,
        legs,
    }
}

fn audio_sdp(port: u16) -> String {
    format!(
        "v=0\r\no=caller 2890844526 2890844526 IN IP4 198.51.100.1\r\ns=-\r\n\
c=IN IP4 198.51.100.1\r\nt=0 0\r\nm=audio {} RTP/AVP 0\r\na=rtpmap:0 PCMU/8000\r\na=sendrecv\r\n",
        port
    )
}

fn audio_params(call_id: &str) -> (CallParameters, Arc<RtpChannel>) {
    let channel = RtpChannel::new(MediaKind::Audio);
    let params = CallParameters {
        call_id: SmolStr::new(call_id),
        from_uri: SipUri::parse("sip:alice@example.com").unwrap(),
        to_uri: SipUri::parse("sip:bob@example.com").unwrap(),
        emergency_call_id: Some(SmolStr::new("urn:emergency:uid:callid:a1:psap.example")),
        incident_id: Some(SmolStr::new("urn:emergency:uid:incidentid:b2:psap.example")),
        answered_sdp: SessionDescription::parse(&audio_sdp(40000)).unwrap(),
        rtp_channels: vec![channel.clone()],
        msrp_connection: None,
    };
    (params, channel)
}

async fn establish(h: &mut Harness, params: CallParameters) -> (Request, Response) {
    let starts_before = h.events.count_of("RecCallStart");
    h.agent.start_recording(params);
    let invite = h.wire.next_request_of(Method::Invite).await;
    let answer = echo_answer(&sdp_of(&invite));
    let ok = ok_for(&invite, Some(&answer));
    h.wire.inject_response(&ok).await;
    let _ack = h.wire.next_request_of(Method::Ack).await;
    let events = h.events.clone();
    wait_until("recording start", move || {
        events.count_of("RecCallStart") > starts_before
    })
    .await;
    (invite, ok)
}

#[tokio::test]
async fn audio_only_recording_end_to_end() {
    let mut h = harness();
    let (params, channel) = audio_params("c1");
    h.agent.start_recording(params);

    let invite = h.wire.next_request_of(Method::Invite).await;
    assert_eq!(invite.call_id().map(|v| v.as_str()), Some("c1"));
    assert_eq!(
        invite.headers.get("Require").map(|v| v.as_str()),
        Some("siprec")
    );

    let offer = SessionDescription::parse(&sdp_of(&invite)).expect("offer sdp");
    assert_eq!(offer.media.len(), 2);
    assert_eq!(offer.media[0].label(), Some(1));
    assert_eq!(offer.media[1].label(), Some(2));
    assert!(offer.media.iter().all(|m| m.has_property("sendonly")));

    let metadata = metadata_of(&invite);
    assert!(metadata.contains("<sipSessionID>c1</sipSessionID>"));
    assert!(metadata.contains("<label>1</label>"));
    assert!(metadata.contains("<label>2</label>"));

    let answer = echo_answer(&sdp_of(&invite));
    h.wire.inject_response(&ok_for(&invite, Some(&answer))).await;
    let _ack = h.wire.next_request_of(Method::Ack).await;

    let events = h.events.clone();
    wait_until("recording start", move || events.count_of("RecCallStart") == 1).await;

    // First received packet starts the odd-label leg, first sent packet
    // the even-label leg; each exactly once.
    channel.publish_received(Bytes::from_static(b"rtp-in-1"));
    h.legs.wait_for_packets(MediaLabel::ReceivedAudio, 1).await;
    channel.publish_sent(Bytes::from_static(b"rtp-out-1"));
    h.legs.wait_for_packets(MediaLabel::SentAudio, 1).await;
    channel.publish_received(Bytes::from_static(b"rtp-in-2"));
    h.legs.wait_for_packets(MediaLabel::ReceivedAudio, 2).await;

    let events = h.events.clone();
    wait_until("media start events", move || {
        events.media_labels_of("RecMediaStart") == vec![1, 2]
    })
    .await;

    h.agent.shutdown().await;
}

#[tokio::test]
async fn rejected_media_is_not_offered() {
    let mut h = harness();
    let (mut params, _channel) = audio_params("c2");
    let sdp = format!("{}m=video 0 RTP/AVP 96\r\n", audio_sdp(40000));
    params.answered_sdp = SessionDescription::parse(&sdp).unwrap();
    h.agent.start_recording(params);

    let invite = h.wire.next_request_of(Method::Invite).await;
    let offer = SessionDescription::parse(&sdp_of(&invite)).expect("offer sdp");
    assert_eq!(offer.media.len(), 2);
    assert!(offer
        .media
        .iter()
        .all(|m| m.media_type == siprec_sdp::MediaType::Audio));

    let metadata = metadata_of(&invite);
    assert!(metadata.contains("<label>1</label>"));
    assert!(metadata.contains("<label>2</label>"));
    assert!(!metadata.contains("<label>3</label>"));
    assert!(!metadata.contains("<label>4</label>"));

    h.agent.shutdown().await;
}

#[tokio::test]
async fn reinvite_adds_text_streams() {
    let mut h = harness();
    let (params, audio_channel) = audio_params("c3");
    let (invite, _ok) = establish(&mut h, params.clone()).await;
    assert_eq!(
        invite.headers.get("CSeq").map(|v| v.as_str()),
        Some("1 INVITE")
    );

    // The original call added real-time text.
    let text_channel = RtpChannel::new(MediaKind::Text);
    let sdp = format!(
        "{}m=text 40100 RTP/AVP 98\r\na=rtpmap:98 t140/1000\r\n",
        audio_sdp(40000)
    );
    let mut new_params = params.clone();
    new_params.answered_sdp = SessionDescription::parse(&sdp).unwrap();
    new_params.rtp_channels = vec![audio_channel.clone(), text_channel.clone()];
    h.agent.handle_reinvite(new_params);

    let reinvite = h.wire.next_request_of(Method::Invite).await;
    assert_eq!(
        reinvite.headers.get("CSeq").map(|v| v.as_str()),
        Some("2 INVITE")
    );
    let offer = SessionDescription::parse(&sdp_of(&reinvite)).expect("offer sdp");
    assert_eq!(offer.media.len(), 4);
    let labels: Vec<u8> = offer.media.iter().filter_map(|m| m.label()).collect();
    assert_eq!(labels, vec![1, 2, 5, 6]);

    let metadata = metadata_of(&reinvite);
    assert!(metadata.contains("<label>5</label>"));
    assert!(metadata.contains("<label>6</label>"));

    let answer = echo_answer(&sdp_of(&reinvite));
    h.wire
        .inject_response(&ok_for(&reinvite, Some(&answer)))
        .await;
    let _ack = h.wire.next_request_of(Method::Ack).await;

    // The added stream is mirrored after the re-negotiation completes.
    let legs = h.legs.clone();
    wait_until("text legs attached", move || {
        legs.specs()
            .iter()
            .any(|spec| spec.label == MediaLabel::ReceivedText)
    })
    .await;
    text_channel.publish_received(Bytes::from_static(b"t140"));
    h.legs.wait_for_packets(MediaLabel::ReceivedText, 1).await;

    h.agent.shutdown().await;
}

#[tokio::test]
async fn retargeting_reinvite_sends_nothing() {
    let mut h = harness();
    let (params, old_channel) = audio_params("c4");
    establish(&mut h, params.clone()).await;

    old_channel.publish_received(Bytes::from_static(b"before"));
    h.legs.wait_for_packets(MediaLabel::ReceivedAudio, 1).await;

    // Same media count, replaced audio handle.
    let new_channel = RtpChannel::new(MediaKind::Audio);
    let mut new_params = params.clone();
    new_params.rtp_channels = vec![new_channel.clone()];
    h.agent.handle_reinvite(new_params);

    // Zero outbound SIP messages for a pure retarget.
    h.wire.expect_silence(Duration::from_millis(150)).await;

    new_channel.publish_received(Bytes::from_static(b"after"));
    let packets = h.legs.wait_for_packets(MediaLabel::ReceivedAudio, 2).await;
    assert_eq!(packets.last().unwrap().as_ref(), b"after");

    h.agent.shutdown().await;
}

#[tokio::test]
async fn stop_during_offering_cancels_without_bye() {
    let mut h = harness();
    let (params, _channel) = audio_params("c5");
    h.agent.start_recording(params);

    let invite = h.wire.next_request_of(Method::Invite).await;
    h.agent.stop_recording("c5");

    // No CANCEL-era BYE and no events; the late final is absorbed.
    h.wire.expect_silence(Duration::from_millis(150)).await;
    let answer = echo_answer(&sdp_of(&invite));
    h.wire.inject_response(&ok_for(&invite, Some(&answer))).await;
    h.wire.expect_silence(Duration::from_millis(150)).await;

    assert_eq!(h.events.count_of("RecCallStart"), 0);
    assert_eq!(h.events.count_of("RecCallEnd"), 0);

    h.agent.shutdown().await;
}

#[tokio::test]
async fn stop_of_established_call_sends_bye_and_cleans_up() {
    let mut h = harness();
    let (params, channel) = audio_params("c6");
    establish(&mut h, params.clone()).await;
    channel.publish_received(Bytes::from_static(b"rtp"));
    h.legs.wait_for_packets(MediaLabel::ReceivedAudio, 1).await;

    h.agent.stop_recording("c6");
    let bye = h.wire.next_request_of(Method::Bye).await;
    assert_eq!(bye.headers.get("CSeq").map(|v| v.as_str()), Some("2 BYE"));
    h.wire.inject_response(&reject_for(&bye, 200, "OK")).await;

    let events = h.events.clone();
    wait_until("recording end", move || events.count_of("RecCallEnd") == 1).await;
    assert_eq!(h.events.media_labels_of("RecMediaEnd"), vec![1, 2]);

    // The call left the map: the same Call-ID records again from scratch.
    let (params2, _channel2) = audio_params("c6");
    h.agent.start_recording(params2);
    let invite2 = h.wire.next_request_of(Method::Invite).await;
    assert_eq!(
        invite2.headers.get("CSeq").map(|v| v.as_str()),
        Some("1 INVITE")
    );

    h.agent.shutdown().await;
}

#[tokio::test]
async fn rejected_invite_fails_silently() {
    let mut h = harness();
    let (params, _channel) = audio_params("c7");
    h.agent.start_recording(params.clone());

    let invite = h.wire.next_request_of(Method::Invite).await;
    h.wire
        .inject_response(&reject_for(&invite, 486, "Busy Here"))
        .await;

    h.wire.expect_silence(Duration::from_millis(150)).await;
    assert_eq!(h.events.count_of("RecCallStart"), 0);
    assert_eq!(h.events.count_of("RecCallEnd"), 0);

    // The map slot is free again.
    h.agent.start_recording(params);
    let _invite2 = h.wire.next_request_of(Method::Invite).await;

    h.agent.shutdown().await;
}

#[tokio::test]
async fn ok_without_sdp_triggers_cleanup_bye() {
    let mut h = harness();
    let (params, _channel) = audio_params("c8");
    h.agent.start_recording(params);

    let invite = h.wire.next_request_of(Method::Invite).await;
    h.wire.inject_response(&ok_for(&invite, None)).await;

    let _ack = h.wire.next_request_of(Method::Ack).await;
    let bye = h.wire.next_request_of(Method::Bye).await;
    assert_eq!(bye.call_id().map(|v| v.as_str()), Some("c8"));
    assert_eq!(h.events.count_of("RecCallStart"), 0);

    h.agent.shutdown().await;
}

#[tokio::test]
async fn bye_from_srs_ends_the_recording() {
    let mut h = harness();
    let (params, _channel) = audio_params("c9");
    let (invite, ok) = establish(&mut h, params).await;

    let bye = srs_bye_for(&invite, &ok);
    h.wire.inject(serialize_request(&bye)).await;

    let reply = h.wire.next_response().await;
    assert_eq!(reply.code(), 200);

    let events = h.events.clone();
    wait_until("recording end", move || events.count_of("RecCallEnd") == 1).await;
    assert_eq!(h.events.media_labels_of("RecMediaEnd"), vec![1, 2]);

    h.agent.shutdown().await;
}

#[tokio::test]
async fn bye_for_unknown_call_gets_481() {
    let mut h = harness();
    let (params, _channel) = audio_params("c10");
    let (invite, ok) = establish(&mut h, params).await;

    let mut bye = srs_bye_for(&invite, &ok);
    bye.headers.set("Call-ID", "not-recorded");
    h.wire.inject(serialize_request(&bye)).await;

    let reply = h.wire.next_response().await;
    assert_eq!(reply.code(), 481);
    assert_eq!(h.events.count_of("RecCallEnd"), 0);

    h.agent.shutdown().await;
}

#[tokio::test]
async fn unsupported_methods_get_405() {
    let mut h = harness();
    let frame = Bytes::from_static(
        b"SUBSCRIBE sip:rec1@192.0.2.10:5080 SIP/2.0\r\n\
Via: SIP/2.0/UDP 192.0.2.1:5060;branch=z9hG4bKsub\r\n\
From: <sip:srs@192.0.2.1>;tag=s\r\nTo: <sip:rec1@192.0.2.10>\r\n\
Call-ID: sub-1\r\nCSeq: 1 SUBSCRIBE\r\nContent-Length: 0\r\n\r\n",
    );
    h.wire.inject(frame).await;

    let reply = h.wire.next_response().await;
    assert_eq!(reply.code(), 405);

    h.agent.shutdown().await;
}

#[tokio::test]
async fn starting_twice_keeps_the_first_transport() {
    let mut h = harness();
    let mut second = FakeWire::new();
    let inbound = second.take_inbound();
    h.agent
        .start_with_transport(second.transport.clone(), inbound);

    let (params, _channel) = audio_params("c12");
    h.agent.start_recording(params);

    // The INVITE still flows over the original wire.
    let _invite = h.wire.next_request_of(Method::Invite).await;
    second.expect_silence(Duration::from_millis(100)).await;

    h.agent.shutdown().await;
}

#[tokio::test]
async fn msrp_call_is_mirrored_on_message_legs() {
    let mut h = harness();
    let (mut params, _audio) = audio_params("c11");
    let connection = siprec_media::MsrpConnection::new();
    let sdp = format!(
        "{}m=message 7394 TCP/MSRP *\r\na=path:msrp://198.51.100.1:7394/orig;tcp\r\n\
a=accept-types:message/cpim text/plain\r\n",
        audio_sdp(40000)
    );
    params.answered_sdp = SessionDescription::parse(&sdp).unwrap();
    params.msrp_connection = Some(connection.clone());
    h.agent.start_recording(params);

    let invite = h.wire.next_request_of(Method::Invite).await;
    let offer = SessionDescription::parse(&sdp_of(&invite)).expect("offer sdp");
    let labels: Vec<u8> = offer.media.iter().filter_map(|m| m.label()).collect();
    assert_eq!(labels, vec![1, 2, 7, 8]);
    let msrp_leg = &offer.media[2];
    assert!(msrp_leg.attribute("path").unwrap().starts_with("msrp://192.0.2.10:"));
    assert_eq!(
        msrp_leg.attribute("accept-types").map(|v| v.as_str()),
        Some("message/cpim text/plain")
    );
    assert_eq!(msrp_leg.attribute("setup").map(|v| v.as_str()), Some("active"));

    let answer = echo_answer(&sdp_of(&invite));
    h.wire.inject_response(&ok_for(&invite, Some(&answer))).await;
    let _ack = h.wire.next_request_of(Method::Ack).await;

    let events = h.events.clone();
    wait_until("recording start", move || events.count_of("RecCallStart") == 1).await;

    connection.publish_received(Bytes::from_static(b"MSRP a SEND\r\n"));
    h.legs.wait_for_packets(MediaLabel::ReceivedMsrp, 1).await;
    connection.publish_sent(Bytes::from_static(b"MSRP b SEND\r\n"));
    h.legs.wait_for_packets(MediaLabel::SentMsrp, 1).await;

    h.agent.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_ends_every_call_and_disables_the_agent() {
    let mut h = harness();
    let mut channels = Vec::new();
    for call_id in ["s1", "s2", "s3"] {
        let (params, channel) = audio_params(call_id);
        establish(&mut h, params).await;
        channels.push(channel);
    }

    let agent = h.agent;
    let shutdown = tokio::spawn(async move {
        agent.shutdown().await;
        agent
    });

    // One BYE per call, each answered promptly.
    for _ in 0..3 {
        let bye = h.wire.next_request_of(Method::Bye).await;
        h.wire.inject_response(&reject_for(&bye, 200, "OK")).await;
    }

    let agent = shutdown.await.unwrap();
    assert_eq!(h.events.count_of("RecCallEnd"), 3);
    assert_eq!(
        h.events.media_labels_of("RecMediaEnd"),
        vec![1, 1, 1, 2, 2, 2]
    );

    // Shutdown is idempotent and the agent stays down.
    agent.shutdown().await;
    let (params, _channel) = audio_params("s4");
    agent.start_recording(params);
    h.wire.expect_silence(Duration::from_millis(150)).await;
}
