// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Test harness for the recording client crates.
//!
//! Provides an in-memory signalling wire, capturing fakes for the event
//! log and recording legs, a deterministic port manager, and builders for
//! the messages an SRS would send back.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use smol_str::SmolStr;
use tokio::sync::mpsc;

use siprec_agent::SignalingTransport;
use siprec_core::{
    generate_branch_id, generate_tag, parse_request, parse_response, serialize_response, Headers,
    Method, Request, RequestLine, Response, SipUri, StatusLine,
};
use siprec_events::{EventLog, RecorderEvent};
use siprec_media::{LegError, LegFactory, LegSpec, RecordingLeg};
use siprec_sdp::{MediaLabel, MediaPortManager};
use siprec_transport::{TransportError, TransportKind};

/// How long test helpers wait for an expected frame before giving up.
const WIRE_TIMEOUT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// In-memory signalling wire
// ---------------------------------------------------------------------------

/// The agent-facing side of the in-memory wire.
pub struct FakeSignaling {
    local: SocketAddr,
    kind: TransportKind,
    sent_tx: mpsc::UnboundedSender<Bytes>,
}

#[async_trait]
impl SignalingTransport for FakeSignaling {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    fn local_addr(&self) -> SocketAddr {
        self.local
    }

    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        self.sent_tx
            .send(payload)
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {}
}

/// Both ends of an in-memory signalling wire: the transport to hand to the
/// agent plus the SRS-side observation and injection handles.
pub struct FakeWire {
    pub transport: Arc<FakeSignaling>,
    sent_rx: mpsc::UnboundedReceiver<Bytes>,
    inbound_tx: mpsc::Sender<Bytes>,
    inbound_rx: Option<mpsc::Receiver<Bytes>>,
}

impl FakeWire {
    pub fn new() -> Self {
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        Self {
            transport: Arc::new(FakeSignaling {
                local: "192.0.2.10:5080".parse().unwrap(),
                kind: TransportKind::Udp,
                sent_tx,
            }),
            sent_rx,
            inbound_tx,
            inbound_rx: Some(inbound_rx),
        }
    }

    /// The inbound receiver to pass to `start_with_transport`. Panics if
    /// taken twice.
    pub fn take_inbound(&mut self) -> mpsc::Receiver<Bytes> {
        self.inbound_rx.take().expect("inbound receiver already taken")
    }

    /// Injects a raw frame as if the SRS had sent it.
    pub async fn inject(&self, frame: Bytes) {
        self.inbound_tx.send(frame).await.expect("agent inbound closed");
    }

    /// Injects a response.
    pub async fn inject_response(&self, response: &Response) {
        self.inject(serialize_response(response)).await;
    }

    /// Waits for the next frame the agent sent.
    pub async fn next_frame(&mut self) -> Bytes {
        tokio::time::timeout(WIRE_TIMEOUT, self.sent_rx.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("wire closed")
    }

    /// Waits for the next outbound request, skipping responses.
    pub async fn next_request(&mut self) -> Request {
        loop {
            let frame = self.next_frame().await;
            if let Some(request) = parse_request(&frame) {
                return request;
            }
        }
    }

    /// Waits for the next outbound request of the given method.
    pub async fn next_request_of(&mut self, method: Method) -> Request {
        loop {
            let request = self.next_request().await;
            if request.start.method == method {
                return request;
            }
        }
    }

    /// Waits for the next outbound response, skipping requests.
    pub async fn next_response(&mut self) -> Response {
        loop {
            let frame = self.next_frame().await;
            if let Some(response) = parse_response(&frame) {
                return response;
            }
        }
    }

    /// Asserts that nothing is sent within the grace period.
    pub async fn expect_silence(&mut self, grace: Duration) {
        match tokio::time::timeout(grace, self.sent_rx.recv()).await {
            Err(_) => {}
            Ok(Some(frame)) => panic!(
                "expected signalling silence, agent sent: {}",
                String::from_utf8_lossy(&frame)
            ),
            Ok(None) => {}
        }
    }
}

impl Default for FakeWire {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Event log capture
// ---------------------------------------------------------------------------

/// Event sink capturing everything for assertions.
#[derive(Default, Clone)]
pub struct CaptureEventLog {
    events: Arc<Mutex<Vec<RecorderEvent>>>,
}

impl CaptureEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecorderEvent> {
        self.events.lock().clone()
    }

    /// The captured events of one kind, in arrival order.
    pub fn of_kind(&self, kind: &str) -> Vec<RecorderEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.of_kind(kind).len()
    }

    /// Labels of captured media events of the given kind, sorted.
    pub fn media_labels_of(&self, kind: &str) -> Vec<u8> {
        let mut labels: Vec<u8> = self
            .of_kind(kind)
            .iter()
            .filter_map(|e| match e {
                RecorderEvent::MediaStart { label, .. }
                | RecorderEvent::MediaEnd { label, .. } => Some(*label),
                _ => None,
            })
            .collect();
        labels.sort();
        labels
    }
}

impl EventLog for CaptureEventLog {
    fn log(&self, event: RecorderEvent) {
        self.events.lock().push(event);
    }
}

// ---------------------------------------------------------------------------
// Media fakes
// ---------------------------------------------------------------------------

/// Deterministic port manager: one range per media family, stepping by
/// two (RTP + RTCP convention).
pub struct SequentialPorts {
    audio: AtomicU16,
    video: AtomicU16,
    text: AtomicU16,
    msrp: AtomicU16,
}

impl SequentialPorts {
    pub fn new() -> Self {
        Self {
            audio: AtomicU16::new(40000),
            video: AtomicU16::new(42000),
            text: AtomicU16::new(44000),
            msrp: AtomicU16::new(46000),
        }
    }
}

impl Default for SequentialPorts {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaPortManager for SequentialPorts {
    fn next_audio_port(&self) -> u16 {
        self.audio.fetch_add(2, Ordering::SeqCst)
    }
    fn next_video_port(&self) -> u16 {
        self.video.fetch_add(2, Ordering::SeqCst)
    }
    fn next_text_port(&self) -> u16 {
        self.text.fetch_add(2, Ordering::SeqCst)
    }
    fn next_msrp_port(&self) -> u16 {
        self.msrp.fetch_add(2, Ordering::SeqCst)
    }
}

/// A leg that records what it was asked to forward.
pub struct CapturedLeg {
    label: MediaLabel,
    packets: Arc<Mutex<HashMap<u8, Vec<Bytes>>>>,
}

impl RecordingLeg for CapturedLeg {
    fn label(&self) -> MediaLabel {
        self.label
    }

    fn forward(&self, packet: Bytes) {
        self.packets
            .lock()
            .entry(self.label.value())
            .or_default()
            .push(packet);
    }

    fn shutdown(&self) {}
}

/// Factory handing out [`CapturedLeg`]s and remembering every spec it saw.
#[derive(Default, Clone)]
pub struct CaptureLegFactory {
    packets: Arc<Mutex<HashMap<u8, Vec<Bytes>>>>,
    specs: Arc<Mutex<Vec<LegSpec>>>,
}

impl CaptureLegFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Packets forwarded on the leg with this label.
    pub fn packets_of(&self, label: MediaLabel) -> Vec<Bytes> {
        self.packets
            .lock()
            .get(&label.value())
            .cloned()
            .unwrap_or_default()
    }

    /// Waits until at least `count` packets arrived on the leg.
    pub async fn wait_for_packets(&self, label: MediaLabel, count: usize) -> Vec<Bytes> {
        let deadline = tokio::time::Instant::now() + WIRE_TIMEOUT;
        loop {
            let packets = self.packets_of(label);
            if packets.len() >= count {
                return packets;
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "timed out waiting for {} packet(s) on label {}",
                    count,
                    label.value()
                );
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Every leg spec the factory was asked to build, in order.
    pub fn specs(&self) -> Vec<LegSpec> {
        self.specs.lock().clone()
    }
}

#[async_trait]
impl LegFactory for CaptureLegFactory {
    async fn create_leg(&self, spec: &LegSpec) -> Result<Arc<dyn RecordingLeg>, LegError> {
        self.specs.lock().push(spec.clone());
        Ok(Arc::new(CapturedLeg {
            label: spec.label,
            packets: self.packets.clone(),
        }))
    }
}

/// Factory that always fails, for absent-leg behaviour.
#[derive(Default, Clone, Copy)]
pub struct FailingLegFactory;

#[async_trait]
impl LegFactory for FailingLegFactory {
    async fn create_leg(&self, _spec: &LegSpec) -> Result<Arc<dyn RecordingLeg>, LegError> {
        Err(LegError::Bind("leg construction disabled in test".into()))
    }
}

// ---------------------------------------------------------------------------
// SRS-side message builders
// ---------------------------------------------------------------------------

/// Builds the SRS's 200 OK for a recording INVITE, echoing the dialog
/// headers and answering with the given SDP (if any).
pub fn ok_for(invite: &Request, sdp: Option<&str>) -> Response {
    let mut headers = Headers::new();
    for via in invite.headers.get_all("Via") {
        headers.push("Via", via.clone());
    }
    if let Some(from) = invite.headers.get("From") {
        headers.push("From", from.clone());
    }
    if let Some(to) = invite.headers.get("To") {
        headers.push("To", format!("{};tag=srs-{}", to, generate_tag()));
    }
    if let Some(call_id) = invite.headers.get("Call-ID") {
        headers.push("Call-ID", call_id.clone());
    }
    if let Some(cseq) = invite.headers.get("CSeq") {
        headers.push("CSeq", cseq.clone());
    }
    headers.push("Contact", "<sip:srs@192.0.2.1:5060>");

    let body = match sdp {
        Some(text) => {
            headers.push("Content-Type", "application/sdp");
            Bytes::from(text.as_bytes().to_vec())
        }
        None => Bytes::new(),
    };
    Response::new(StatusLine::new(200, "OK"), headers, body)
}

/// Builds a non-2xx final for a request.
pub fn reject_for(request: &Request, code: u16, reason: &str) -> Response {
    let mut headers = Headers::new();
    for name in ["Via", "From", "To", "Call-ID", "CSeq"] {
        for value in request.headers.get_all(name) {
            headers.push(name, value.clone());
        }
    }
    Response::new(StatusLine::new(code, reason), headers, Bytes::new())
}

/// Builds the in-dialog BYE an SRS would send to end a recording, derived
/// from the recorder's INVITE and the OK the SRS answered with.
pub fn srs_bye_for(invite: &Request, ok: &Response) -> Request {
    let mut headers = Headers::new();
    headers.push(
        "Via",
        format!("SIP/2.0/UDP 192.0.2.1:5060;branch={}", generate_branch_id()),
    );
    // Perspective flips: the SRS's From is our To (with its tag).
    if let Some(to) = ok.headers.get("To") {
        headers.push("From", to.clone());
    }
    if let Some(from) = invite.headers.get("From") {
        headers.push("To", from.clone());
    }
    if let Some(call_id) = invite.headers.get("Call-ID") {
        headers.push("Call-ID", call_id.clone());
    }
    headers.push("CSeq", "1 BYE");
    headers.push("Max-Forwards", "70");
    headers.push("Content-Length", "0");

    let uri = invite
        .headers
        .get("Contact")
        .and_then(|contact| {
            let trimmed = contact.trim();
            let start = trimmed.find('<')? + 1;
            let end = trimmed.find('>')?;
            SipUri::parse(&trimmed[start..end])
        })
        .unwrap_or_else(|| SipUri::parse("sip:rec@192.0.2.10:5080").unwrap());

    Request::new(RequestLine::new(Method::Bye, uri), headers, Bytes::new())
}

/// Extracts the SDP part from a multipart SIPREC INVITE body.
pub fn sdp_of(invite: &Request) -> SmolStr {
    let body = String::from_utf8_lossy(invite.body.as_ref());
    let start = body.find("v=").expect("invite body carries SDP");
    let rest = &body[start..];
    let end = rest.find("\r\n--").unwrap_or(rest.len());
    SmolStr::new(&rest[..end])
}

/// Extracts the metadata XML part from a multipart SIPREC INVITE body.
pub fn metadata_of(invite: &Request) -> SmolStr {
    let body = String::from_utf8_lossy(invite.body.as_ref());
    let start = body.find("<?xml").expect("invite body carries metadata");
    let rest = &body[start..];
    let end = rest.find("\r\n--").unwrap_or(rest.len());
    SmolStr::new(&rest[..end])
}

/// Builds an echo answer for an offer: every offered media description is
/// answered on a fresh SRS port, preserving type, protocol and label.
pub fn echo_answer(offer_sdp: &str) -> String {
    let offer = siprec_sdp::SessionDescription::parse(offer_sdp).expect("parse offer");
    let mut answer = String::new();
    answer.push_str("v=0\r\n");
    answer.push_str("o=srs 1 1 IN IP4 192.0.2.1\r\n");
    answer.push_str("s=-\r\n");
    answer.push_str("c=IN IP4 192.0.2.1\r\n");
    answer.push_str("t=0 0\r\n");
    let mut port = 30000;
    for media in &offer.media {
        let formats: Vec<&str> = media.formats.iter().map(|f| f.as_str()).collect();
        answer.push_str(&format!(
            "m={} {} {} {}\r\n",
            media.media_type,
            port,
            media.protocol,
            formats.join(" ")
        ));
        if let Some(label) = media.label() {
            answer.push_str(&format!("a=label:{}\r\n", label));
        }
        answer.push_str("a=recvonly\r\n");
        port += 2;
    }
    answer
}

/// Polls `predicate` until it holds or the harness timeout elapses.
pub async fn wait_until(what: &str, predicate: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WIRE_TIMEOUT;
    loop {
        if predicate() {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_answer_preserves_labels() {
        let offer = "v=0\r\no=- 1 0 IN IP4 192.0.2.10\r\ns=-\r\nc=IN IP4 192.0.2.10\r\nt=0 0\r\n\
m=audio 40000 RTP/AVP 0\r\na=label:1\r\na=sendonly\r\n\
m=audio 40002 RTP/AVP 0\r\na=label:2\r\na=sendonly\r\n";
        let answer = echo_answer(offer);
        assert!(answer.contains("a=label:1"));
        assert!(answer.contains("a=label:2"));
        let parsed = siprec_sdp::SessionDescription::parse(&answer).unwrap();
        assert_eq!(parsed.media.len(), 2);
    }

    #[tokio::test]
    async fn wire_round_trips_frames() {
        let mut wire = FakeWire::new();
        let transport = wire.transport.clone();
        transport
            .send(Bytes::from_static(b"OPTIONS sip:x SIP/2.0\r\n\r\n"))
            .await
            .unwrap();
        let request = wire.next_request().await;
        assert_eq!(request.start.method, Method::Options);
    }
}
