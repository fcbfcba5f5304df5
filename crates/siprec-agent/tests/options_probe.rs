// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SRS liveness probing behaviour.

use std::sync::Arc;
use std::time::Duration;

use smol_str::SmolStr;
use tokio::sync::mpsc;

use siprec_agent::{
    AgentDeps, RecorderAgent, RecorderConfig, ReportingIdentity, SrsStatus,
    StaticCertificateStore,
};
use siprec_core::Method;
use siprec_sdp::{MsrpEncryption, RtpEncryption};
use siprec_testkit::{reject_for, CaptureEventLog, CaptureLegFactory, FakeWire, SequentialPorts};
use siprec_transport::TransportKind;

fn probing_config(enable_options: bool) -> RecorderConfig {
    RecorderConfig {
        name: SmolStr::new("rec1"),
        enabled: true,
        transport: TransportKind::Udp,
        local_endpoint: "192.0.2.10:5080".parse().unwrap(),
        srs_endpoint: "192.0.2.1:5060".parse().unwrap(),
        rtp_encryption: RtpEncryption::None,
        msrp_encryption: MsrpEncryption::None,
        enable_options,
        options_interval_secs: 1,
        tls_server_name: None,
    }
}

fn probing_harness(
    enable_options: bool,
) -> (
    RecorderAgent,
    FakeWire,
    CaptureEventLog,
    mpsc::UnboundedReceiver<SrsStatus>,
) {
    let events = CaptureEventLog::new();
    let (status_tx, status_rx) = mpsc::unbounded_channel();
    let deps = AgentDeps {
        event_log: Arc::new(events.clone()),
        ports: Arc::new(SequentialPorts::new()),
        legs: Arc::new(CaptureLegFactory::new()),
        certs: Arc::new(StaticCertificateStore::default()),
        identity: ReportingIdentity::default(),
        tls: None,
        status_tx: Some(status_tx),
    };
    let agent = RecorderAgent::new(probing_config(enable_options), deps).expect("config");
    let mut wire = FakeWire::new();
    let inbound = wire.take_inbound();
    agent.start_with_transport(wire.transport.clone(), inbound);
    (agent, wire, events, status_rx)
}

async fn next_status(rx: &mut mpsc::UnboundedReceiver<SrsStatus>) -> SrsStatus {
    tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .expect("timed out waiting for an SRS status transition")
        .expect("status channel closed")
}

#[tokio::test(start_paused = true)]
async fn status_changes_fire_only_on_transitions() {
    let (agent, mut wire, _events, mut status_rx) = probing_harness(true);

    // The probe clock is seeded to fire immediately.
    let probe1 = wire.next_request_of(Method::Options).await;
    assert_eq!(
        probe1.headers.get("CSeq").map(|v| v.as_str()),
        Some("1 OPTIONS")
    );

    // Two unanswered probes, exactly one transition to unresponsive.
    let status = next_status(&mut status_rx).await;
    assert_eq!(
        status,
        SrsStatus {
            recorder: SmolStr::new("rec1"),
            responding: false,
            status_code: None,
        }
    );

    let probe2 = wire.next_request_of(Method::Options).await;
    assert_eq!(
        probe2.headers.get("CSeq").map(|v| v.as_str()),
        Some("2 OPTIONS")
    );
    assert_ne!(probe1.headers.get("Via"), probe2.headers.get("Via"));

    // The third probe gets an answer: exactly one transition back. Let
    // probe2's timeout settle first so its outcome cannot trail ours.
    let probe3 = wire.next_request_of(Method::Options).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(status_rx.try_recv().is_err(), "same-state must not re-fire");
    wire.inject_response(&reject_for(&probe3, 200, "OK")).await;

    let status = next_status(&mut status_rx).await;
    assert_eq!(
        status,
        SrsStatus {
            recorder: SmolStr::new("rec1"),
            responding: true,
            status_code: Some(200),
        }
    );

    agent.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn probes_are_not_logged_as_signalling() {
    let (agent, mut wire, events, mut status_rx) = probing_harness(true);

    let probe = wire.next_request_of(Method::Options).await;
    wire.inject_response(&reject_for(&probe, 200, "OK")).await;
    let _ = next_status(&mut status_rx).await;

    assert_eq!(events.count_of("CallSignalingMessage"), 0);

    agent.shutdown().await;
}

#[tokio::test]
async fn disabled_probing_stays_silent() {
    let (agent, mut wire, _events, mut status_rx) = probing_harness(false);

    wire.expect_silence(Duration::from_millis(200)).await;
    assert!(status_rx.try_recv().is_err());

    agent.shutdown().await;
}
