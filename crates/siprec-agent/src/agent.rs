// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The per-SRS recorder agent.
//!
//! One agent owns one signalling channel toward one SRS and multiplexes
//! every recorded call over it. All call state lives inside a single
//! command-loop task: the public API and the transport callbacks only
//! enqueue commands, so the map of calls, each call's fields, its metadata
//! document and its media wiring are mutated from exactly one place.
//! Packet forwarding runs on separate tasks and never touches this state.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use smol_str::SmolStr;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use siprec_core::{
    branch_from_via, cseq_of, generate_call_id, generate_tag, parse_request, parse_response,
    serialize_request, serialize_response, top_via, Method, Request, Response,
};
use siprec_events::{EventContext, RecorderEvent, SignalingDirection};
use siprec_media::{LegSpec, MediaBridge};
use siprec_metadata::RecordingMetadata;
use siprec_sdp::{
    build_recording_offer, copy_accept_types, MediaKind, MediaLabel, MediaType, OfferOptions,
    OfferedStream, Protocol, RtpEncryption, SessionDescription,
};
use siprec_transport::{
    SipChannel, TransactionOutcome, TransactionRegistry, TransportError,
};

use crate::builder;
use crate::call::{CallState, RecordedCall};
use crate::config::{ConfigError, RecorderConfig};
use crate::deps::{AgentDeps, SignalingTransport, SrsStatus};
use crate::metrics::RecorderMetrics;
use crate::params::CallParameters;

/// Timer B equivalent: how long a recording INVITE may stay unanswered.
const INVITE_TIMEOUT: Duration = Duration::from_secs(32);
/// Bound for each OPTIONS probe.
const PROBE_TIMEOUT: Duration = Duration::from_millis(1000);
/// Bound for each BYE, during calls and at shutdown.
const BYE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Failures surfaced by [`RecorderAgent::start`].
#[derive(Debug)]
pub enum AgentError {
    Config(ConfigError),
    /// The configured local signalling endpoint could not be acquired.
    TransportBind(TransportError),
}

impl std::fmt::Display for AgentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentError::Config(err) => write!(f, "invalid recorder configuration: {}", err),
            AgentError::TransportBind(err) => write!(f, "recorder transport failed: {}", err),
        }
    }
}

impl std::error::Error for AgentError {}

impl From<ConfigError> for AgentError {
    fn from(err: ConfigError) -> Self {
        AgentError::Config(err)
    }
}

pub(crate) enum Command {
    Start(CallParameters),
    ReInvite(CallParameters),
    Stop(SmolStr),
    Inbound(Bytes),
    InviteOutcome {
        call_id: SmolStr,
        outcome: TransactionOutcome,
    },
    ReInviteOutcome {
        call_id: SmolStr,
        outcome: TransactionOutcome,
    },
    OptionsTick,
    OptionsOutcome(Option<u16>),
    Shutdown(oneshot::Sender<()>),
}

struct Running {
    cmd_tx: mpsc::UnboundedSender<Command>,
    tasks: Vec<JoinHandle<()>>,
}

/// Long-lived recording endpoint toward one SRS.
///
/// Construct with [`RecorderAgent::new`], call [`start`](Self::start)
/// once, then feed it call lifecycle through `start_recording`,
/// `handle_reinvite` and `stop_recording`. All three enqueue work and
/// return immediately.
pub struct RecorderAgent {
    config: RecorderConfig,
    deps: AgentDeps,
    metrics: RecorderMetrics,
    inner: parking_lot::Mutex<Option<Running>>,
}

impl RecorderAgent {
    pub fn new(config: RecorderConfig, deps: AgentDeps) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            deps,
            metrics: RecorderMetrics::new(),
            inner: parking_lot::Mutex::new(None),
        })
    }

    pub fn name(&self) -> &SmolStr {
        &self.config.name
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn metrics(&self) -> &RecorderMetrics {
        &self.metrics
    }

    /// Binds the signalling channel and starts the agent. Idempotent: a
    /// second call on a started agent is a no-op.
    pub async fn start(&self) -> Result<(), AgentError> {
        if !self.config.enabled {
            info!(recorder = %self.config.name, "recorder disabled, not starting");
            return Ok(());
        }
        if self.inner.lock().is_some() {
            return Ok(());
        }

        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let tls = if self.config.transport.is_secure() {
            self.deps.tls.clone()
        } else {
            None
        };
        let channel = SipChannel::bind(
            self.config.transport,
            self.config.local_endpoint,
            self.config.srs_endpoint,
            tls,
            inbound_tx,
        )
        .await
        .map_err(AgentError::TransportBind)?;

        self.install(Arc::new(channel), inbound_rx);
        Ok(())
    }

    /// Starts the agent over an externally provided signalling transport.
    /// `inbound` must deliver raw SIP messages from the SRS. Idempotent.
    pub fn start_with_transport(
        &self,
        transport: Arc<dyn SignalingTransport>,
        inbound: mpsc::Receiver<Bytes>,
    ) {
        if self.inner.lock().is_some() {
            return;
        }
        self.install(transport, inbound);
    }

    fn install(&self, transport: Arc<dyn SignalingTransport>, mut inbound: mpsc::Receiver<Bytes>) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(TransactionRegistry::new());
        let mut tasks = Vec::new();

        let task = AgentTask {
            config: self.config.clone(),
            deps: self.deps.clone(),
            metrics: self.metrics.clone(),
            transport,
            registry: registry.clone(),
            cmd_tx: cmd_tx.clone(),
            calls: HashMap::new(),
            options_call_id: generate_call_id(&self.config.local_endpoint.ip().to_string()),
            options_from_tag: generate_tag(),
            options_cseq: 0,
            srs_responding: None,
            srs_last_code: None,
            shutting_down: false,
        };
        tasks.push(tokio::spawn(task.run(cmd_rx)));

        // Transaction completion happens here, off the command loop, so a
        // bounded wait inside shutdown still sees its final response. The
        // registry is the only state touched; call state stays loop-owned.
        let pump_tx = cmd_tx.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(message) = inbound.recv().await {
                if message.starts_with(b"SIP/2.0") {
                    if let Some(response) = parse_response(&message) {
                        registry.complete(&response);
                    }
                }
                if pump_tx.send(Command::Inbound(message)).is_err() {
                    break;
                }
            }
        }));

        if self.config.enable_options {
            let tick_tx = cmd_tx.clone();
            let period = Duration::from_secs(self.config.options_interval_secs);
            tasks.push(tokio::spawn(async move {
                // The first tick fires immediately, seeding the probe clock.
                let mut ticker = tokio::time::interval(period);
                loop {
                    ticker.tick().await;
                    if tick_tx.send(Command::OptionsTick).is_err() {
                        break;
                    }
                }
            }));
        }

        *self.inner.lock() = Some(Running { cmd_tx, tasks });
    }

    /// Begins recording a call. Enqueues and returns immediately.
    pub fn start_recording(&self, params: CallParameters) {
        self.send(Command::Start(params));
    }

    /// Reconciles a re-negotiation of the original call. Enqueues and
    /// returns immediately.
    pub fn handle_reinvite(&self, params: CallParameters) {
        self.send(Command::ReInvite(params));
    }

    /// Stops recording the given call. Enqueues and returns immediately.
    pub fn stop_recording(&self, call_id: &str) {
        self.send(Command::Stop(SmolStr::new(call_id)));
    }

    /// Ends every recording, closes the transport and stops the agent.
    /// Returns once all outstanding work has completed. Idempotent.
    pub async fn shutdown(&self) {
        let running = self.inner.lock().take();
        let Some(running) = running else {
            return;
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if running.cmd_tx.send(Command::Shutdown(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
        for task in running.tasks {
            task.abort();
        }
    }

    fn send(&self, command: Command) {
        match &*self.inner.lock() {
            Some(running) => {
                let _ = running.cmd_tx.send(command);
            }
            None => warn!(recorder = %self.config.name, "recorder not started, request dropped"),
        }
    }
}

pub(crate) struct AgentTask {
    pub(crate) config: RecorderConfig,
    pub(crate) deps: AgentDeps,
    pub(crate) metrics: RecorderMetrics,
    pub(crate) transport: Arc<dyn SignalingTransport>,
    pub(crate) registry: Arc<TransactionRegistry>,
    pub(crate) cmd_tx: mpsc::UnboundedSender<Command>,
    pub(crate) calls: HashMap<SmolStr, RecordedCall>,
    options_call_id: SmolStr,
    options_from_tag: SmolStr,
    options_cseq: u32,
    srs_responding: Option<bool>,
    srs_last_code: Option<u16>,
    shutting_down: bool,
}

impl AgentTask {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Start(params) => self.on_start(params).await,
                Command::ReInvite(params) => self.on_reinvite(params).await,
                Command::Stop(call_id) => self.on_stop(&call_id).await,
                Command::Inbound(message) => self.on_inbound(message).await,
                Command::InviteOutcome { call_id, outcome } => {
                    self.on_invite_outcome(call_id, outcome).await
                }
                Command::ReInviteOutcome { call_id, outcome } => {
                    self.on_reinvite_outcome(call_id, outcome).await
                }
                Command::OptionsTick => self.on_options_tick().await,
                Command::OptionsOutcome(code) => self.on_options_outcome(code),
                Command::Shutdown(ack) => {
                    self.on_shutdown().await;
                    let _ = ack.send(());
                    break;
                }
            }
        }
    }

    // ---- recording lifecycle -------------------------------------------

    async fn on_start(&mut self, params: CallParameters) {
        if self.shutting_down {
            warn!(recorder = %self.config.name, call_id = %params.call_id,
                "recorder shutting down, start ignored");
            return;
        }
        if self.calls.contains_key(&params.call_id) {
            error!(recorder = %self.config.name, call_id = %params.call_id,
                "recording already exists for this call");
            return;
        }

        let offer_opts = self.offer_options();
        let (mut offered, streams) =
            build_recording_offer(&params.answered_sdp, &offer_opts, &*self.deps.ports);
        for original in params.answered_sdp.recordable_media() {
            if original.kind() == Some(MediaKind::Msrp) {
                copy_accept_types(&mut offered, original);
            }
        }

        let mut metadata =
            RecordingMetadata::new(params.call_id.clone(), &params.from_uri, &params.to_uri);
        for stream in &streams {
            if let Err(err) = metadata.add_stream_pair(stream.received, stream.sent) {
                error!(call_id = %params.call_id, %err, "metadata stream setup failed");
            }
        }
        let metadata_xml = match metadata.to_xml() {
            Ok(xml) => xml,
            Err(err) => {
                error!(call_id = %params.call_id, %err, "metadata rendering failed, not recording");
                return;
            }
        };

        let from_tag = generate_tag();
        let invite = builder::recording_invite(
            &self.config,
            self.transport.local_addr(),
            &params,
            &offered.to_sdp_string(),
            &metadata_xml,
            &from_tag,
        );
        let Some(branch) = request_branch(&invite) else {
            error!(call_id = %params.call_id, "invite missing Via branch");
            return;
        };

        let ctx = self.event_context(&params);
        let call = RecordedCall {
            state: CallState::Offering,
            params: params.clone(),
            invite: invite.clone(),
            last_cseq: 1,
            from_tag,
            offered_sdp: offered,
            offered_streams: streams,
            answered_sdp: None,
            ok_response: None,
            metadata,
            bridge: MediaBridge::new(ctx, self.deps.event_log.clone()),
            reinvite_in_progress: false,
            pending_new_media: Vec::new(),
            invite_branch: Some(branch.clone()),
        };
        self.calls.insert(params.call_id.clone(), call);

        let pending = self.registry.register(branch.clone(), Method::Invite);
        self.metrics.record_invite_sent();
        if !self.send_request(&invite, Some(&params)).await {
            self.registry.cancel(&branch);
            self.calls.remove(&params.call_id);
            return;
        }

        let tx = self.cmd_tx.clone();
        let registry = self.registry.clone();
        let call_id = params.call_id.clone();
        tokio::spawn(async move {
            let outcome = pending.wait(INVITE_TIMEOUT).await;
            if matches!(outcome, TransactionOutcome::TimedOut) {
                registry.cancel(&branch);
            }
            let _ = tx.send(Command::InviteOutcome { call_id, outcome });
        });
    }

    async fn on_invite_outcome(&mut self, call_id: SmolStr, outcome: TransactionOutcome) {
        let Some(mut call) = self.calls.remove(&call_id) else {
            // Stopped while offering; the late final was already absorbed.
            return;
        };
        call.invite_branch = None;

        match outcome {
            TransactionOutcome::Final(resp) if resp.is_success() => {
                let ack = builder::ack_for(&call.invite, &resp);
                self.send_request(&ack, Some(&call.params)).await;

                match answered_sdp_of(&resp) {
                    Some(answered) if answered.media.len() == call.offered_sdp.media.len() => {
                        call.answered_sdp = Some(answered.clone());
                        call.ok_response = Some(resp);
                        self.attach_initial_media(&mut call, &answered).await;
                        call.state = CallState::Established;
                        self.deps.event_log.log(RecorderEvent::CallStart {
                            ctx: self.event_context(&call.params),
                        });
                        self.metrics.record_call_started();
                        info!(recorder = %self.config.name, call_id = %call_id, "recording established");
                        self.calls.insert(call_id, call);
                    }
                    answered => {
                        // An OK we cannot use still established a dialog;
                        // clean the remote side up.
                        error!(
                            recorder = %self.config.name,
                            call_id = %call_id,
                            media = ?answered.as_ref().map(|a| a.media.len()),
                            offered = call.offered_sdp.media.len(),
                            "unusable recording answer, sending BYE"
                        );
                        let cseq = call.next_cseq();
                        let bye = builder::bye_for(&call.invite, &resp, cseq);
                        self.send_fire_and_forget_bye(bye, &call.params).await;
                        call.state = CallState::Terminated;
                    }
                }
            }
            TransactionOutcome::Final(resp) => {
                debug!(recorder = %self.config.name, call_id = %call_id,
                    code = resp.code(), "recording invite rejected");
            }
            TransactionOutcome::TimedOut => {
                debug!(recorder = %self.config.name, call_id = %call_id,
                    "recording invite timed out");
            }
            TransactionOutcome::Cancelled => {}
        }
    }

    async fn on_stop(&mut self, call_id: &SmolStr) {
        let Some(mut call) = self.calls.remove(call_id) else {
            debug!(recorder = %self.config.name, call_id = %call_id, "stop for unknown call");
            return;
        };

        match call.state {
            CallState::Offering => {
                // Cancel the in-flight INVITE; the eventual final response
                // finds no waiter and is absorbed. No BYE, no events: the
                // recording never started.
                if let Some(branch) = &call.invite_branch {
                    self.registry.cancel(branch);
                }
                call.state = CallState::Cancelled;
                debug!(recorder = %self.config.name, call_id = %call_id, "offering cancelled");
            }
            CallState::Established | CallState::ReOffering => {
                if let Some(branch) = &call.invite_branch {
                    self.registry.cancel(branch);
                }
                if let Some(ok) = call.ok_response.clone() {
                    let cseq = call.next_cseq();
                    let bye = builder::bye_for(&call.invite, &ok, cseq);
                    self.send_fire_and_forget_bye(bye, &call.params).await;
                }
                call.bridge.shutdown();
                self.deps.event_log.log(RecorderEvent::CallEnd {
                    ctx: self.event_context(&call.params),
                });
                self.metrics.record_call_ended();
                call.state = CallState::Terminated;
                info!(recorder = %self.config.name, call_id = %call_id, "recording stopped");
            }
            CallState::Terminated | CallState::Cancelled => {}
        }
    }

    // ---- inbound signalling --------------------------------------------

    async fn on_inbound(&mut self, message: Bytes) {
        if message.starts_with(b"SIP/2.0") {
            // Responses were already routed to their transactions by the
            // inbound pump; here they only surface as log events.
            let Some(response) = parse_response(&message) else {
                warn!(recorder = %self.config.name, "unparseable inbound response");
                return;
            };
            if !is_options(&response.headers) {
                self.emit_signaling(
                    response.call_id().cloned(),
                    SignalingDirection::Received,
                    status_summary(&response),
                );
            }
        } else {
            let Some(request) = parse_request(&message) else {
                warn!(recorder = %self.config.name, "unparseable inbound request");
                return;
            };
            self.on_request(request).await;
        }
    }

    async fn on_request(&mut self, request: Request) {
        let call_id = request.call_id().cloned();
        if request.start.method != Method::Options {
            self.emit_signaling(
                call_id.clone(),
                SignalingDirection::Received,
                request_summary(&request),
            );
        }

        match request.start.method {
            Method::Bye => {
                let known = call_id
                    .clone()
                    .filter(|id| self.calls.contains_key(id));
                if let Some(id) = known {
                    let reply = builder::reply_to(&request, 200, "OK");
                    self.send_response(&reply, Some(&id)).await;

                    if let Some(mut call) = self.calls.remove(&id) {
                        if let Some(branch) = &call.invite_branch {
                            self.registry.cancel(branch);
                        }
                        call.bridge.shutdown();
                        self.deps.event_log.log(RecorderEvent::CallEnd {
                            ctx: self.event_context(&call.params),
                        });
                        self.metrics.record_call_ended();
                        info!(recorder = %self.config.name, call_id = %id, "recording ended by SRS");
                    }
                } else {
                    let reply = builder::reply_to(&request, 481, "Call/Transaction Does Not Exist");
                    self.send_response(&reply, call_id.as_ref()).await;
                }
            }
            Method::Ack => {
                // The transport already matched it; nothing to do.
            }
            _ => {
                let reply = builder::reply_to(&request, 405, "Method Not Allowed");
                self.send_response(&reply, call_id.as_ref()).await;
            }
        }
    }

    // ---- OPTIONS liveness ----------------------------------------------

    async fn on_options_tick(&mut self) {
        if self.shutting_down {
            return;
        }
        self.options_cseq += 1;
        let probe = builder::probe_options(
            &self.config,
            self.transport.local_addr(),
            &self.options_call_id,
            &self.options_from_tag,
            self.options_cseq,
        );
        let Some(branch) = request_branch(&probe) else {
            return;
        };

        let pending = self.registry.register(branch.clone(), Method::Options);
        self.metrics.record_options_probe();

        let payload = serialize_request(&probe);
        if let Err(err) = self.transport.send(payload).await {
            debug!(recorder = %self.config.name, %err, "options probe send failed");
            self.registry.cancel(&branch);
            let _ = self.cmd_tx.send(Command::OptionsOutcome(None));
            return;
        }

        let tx = self.cmd_tx.clone();
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let outcome = pending.wait(PROBE_TIMEOUT).await;
            let code = match outcome {
                TransactionOutcome::Final(resp) => Some(resp.code()),
                TransactionOutcome::TimedOut => {
                    registry.cancel(&branch);
                    None
                }
                TransactionOutcome::Cancelled => return,
            };
            let _ = tx.send(Command::OptionsOutcome(code));
        });
    }

    fn on_options_outcome(&mut self, code: Option<u16>) {
        let responding = code.is_some();
        let transition = match self.srs_responding {
            None => true,
            Some(previous) => {
                previous != responding || (responding && self.srs_last_code != code)
            }
        };
        self.srs_responding = Some(responding);
        self.srs_last_code = code;

        if !transition {
            return;
        }
        info!(recorder = %self.config.name, responding, code = ?code, "SRS status changed");
        if let Some(tx) = &self.deps.status_tx {
            let _ = tx.send(SrsStatus {
                recorder: self.config.name.clone(),
                responding,
                status_code: code,
            });
        }
    }

    // ---- shutdown -------------------------------------------------------

    async fn on_shutdown(&mut self) {
        self.shutting_down = true;
        // No BYE may race an in-flight INVITE for the same dialog.
        self.registry.cancel_all();

        let ids: Vec<SmolStr> = self.calls.keys().cloned().collect();
        for id in ids {
            let Some(mut call) = self.calls.remove(&id) else {
                continue;
            };
            if call.is_established() {
                if let Some(ok) = call.ok_response.clone() {
                    let cseq = call.next_cseq();
                    let bye = builder::bye_for(&call.invite, &ok, cseq);
                    if let Some(branch) = request_branch(&bye) {
                        let pending = self.registry.register(branch.clone(), Method::Bye);
                        self.metrics.record_bye_sent();
                        if self.send_request(&bye, Some(&call.params)).await {
                            if matches!(pending.wait(BYE_TIMEOUT).await, TransactionOutcome::TimedOut)
                            {
                                self.registry.cancel(&branch);
                            }
                        } else {
                            self.registry.cancel(&branch);
                        }
                    }
                }
                call.bridge.shutdown();
                self.deps.event_log.log(RecorderEvent::CallEnd {
                    ctx: self.event_context(&call.params),
                });
                self.metrics.record_call_ended();
            }
        }

        self.transport.close();
        info!(recorder = %self.config.name, "recorder shut down");
    }

    // ---- media attachment ----------------------------------------------

    async fn attach_initial_media(&self, call: &mut RecordedCall, answered: &SessionDescription) {
        let mut rtp_index = 0usize;
        for stream in call.offered_streams.clone() {
            let channel_index = if stream.kind == MediaKind::Msrp {
                None
            } else {
                let index = rtp_index;
                rtp_index += 1;
                Some(index)
            };
            self.attach_stream_pair(call, answered, stream, channel_index)
                .await;
        }
    }

    /// Builds and attaches the legs of one (received, sent) pair. The
    /// answered description is located by (media type, label): the SRS may
    /// reorder its answer, the label is the only stable key.
    pub(crate) async fn attach_stream_pair(
        &self,
        call: &mut RecordedCall,
        answered: &SessionDescription,
        stream: OfferedStream,
        channel_index: Option<usize>,
    ) {
        let received_leg = self.build_leg(call, answered, stream.kind, stream.received).await;
        let sent_leg = self.build_leg(call, answered, stream.kind, stream.sent).await;

        if stream.kind == MediaKind::Msrp {
            let Some(connection) = call.params.msrp_connection.clone() else {
                warn!(call_id = %call.params.call_id, "msrp offered without a connection handle");
                return;
            };
            if let Some(leg) = received_leg {
                call.bridge.attach(leg, connection.subscribe_received());
            }
            if let Some(leg) = sent_leg {
                call.bridge.attach(leg, connection.subscribe_sent());
            }
        } else {
            let Some(channel) = channel_index
                .and_then(|index| call.params.rtp_channels.get(index))
                .cloned()
            else {
                warn!(call_id = %call.params.call_id, kind = stream.kind.as_str(),
                    "no original channel handle for recorded stream");
                return;
            };
            if let Some(leg) = received_leg {
                call.bridge.attach(leg, channel.subscribe_received());
            }
            if let Some(leg) = sent_leg {
                call.bridge.attach(leg, channel.subscribe_sent());
            }
        }
    }

    async fn build_leg(
        &self,
        call: &RecordedCall,
        answered: &SessionDescription,
        kind: MediaKind,
        label: MediaLabel,
    ) -> Option<Arc<dyn siprec_media::RecordingLeg>> {
        let media_type = media_type_of(kind);
        let answered_desc = answered.find_labelled(&media_type, label.value())?;
        if answered_desc.port == 0 {
            debug!(call_id = %call.params.call_id, label = label.value(),
                "leg declined by SRS");
            return None;
        }
        let offered_desc = call.offered_sdp.find_labelled(&media_type, label.value())?;

        let remote_ip: std::net::IpAddr = answered_desc
            .connection
            .as_ref()
            .or(answered.connection.as_ref())
            .and_then(|c| c.connection_address.parse().ok())?;
        let secure = matches!(
            offered_desc.protocol,
            Protocol::RtpSavp | Protocol::UdpTlsRtpSavp | Protocol::TcpTlsMsrp
        );

        let spec = LegSpec {
            kind,
            label,
            local_port: offered_desc.port,
            remote: SocketAddr::new(remote_ip, answered_desc.port),
            secure,
        };
        match self.deps.legs.create_leg(&spec).await {
            Ok(leg) => Some(leg),
            Err(err) => {
                error!(call_id = %call.params.call_id, label = label.value(), %err,
                    "recording leg construction failed");
                None
            }
        }
    }

    // ---- plumbing -------------------------------------------------------

    pub(crate) fn offer_options(&self) -> OfferOptions {
        let dtls_fingerprint = if self.config.rtp_encryption == RtpEncryption::DtlsSrtp {
            self.deps.certs.dtls_fingerprint()
        } else {
            None
        };
        OfferOptions {
            local_ip: self.transport.local_addr().ip(),
            rtp_encryption: self.config.rtp_encryption,
            msrp_encryption: self.config.msrp_encryption,
            dtls_fingerprint,
        }
    }

    pub(crate) async fn send_request(
        &self,
        request: &Request,
        params: Option<&CallParameters>,
    ) -> bool {
        let payload = serialize_request(request);
        match self.transport.send(payload).await {
            Ok(()) => {
                if request.start.method != Method::Options {
                    let ctx = match params {
                        Some(params) => self.event_context(params),
                        None => self.generic_context(request.call_id().cloned()),
                    };
                    self.deps.event_log.log(RecorderEvent::Signaling {
                        ctx,
                        direction: SignalingDirection::Sent,
                        summary: request_summary(request),
                    });
                }
                true
            }
            Err(err) => {
                error!(recorder = %self.config.name, method = %request.start.method, %err,
                    "signalling send failed");
                false
            }
        }
    }

    async fn send_response(&self, response: &Response, call_id: Option<&SmolStr>) {
        let payload = serialize_response(response);
        if let Err(err) = self.transport.send(payload).await {
            error!(recorder = %self.config.name, %err, "response send failed");
            return;
        }
        if !is_options(&response.headers) {
            self.emit_signaling(
                call_id.cloned().or_else(|| response.call_id().cloned()),
                SignalingDirection::Sent,
                status_summary(response),
            );
        }
    }

    /// Sends a BYE without waiting for its outcome, bounded so a silent
    /// SRS cannot pin the transaction entry.
    pub(crate) async fn send_fire_and_forget_bye(&self, bye: Request, params: &CallParameters) {
        let Some(branch) = request_branch(&bye) else {
            return;
        };
        let pending = self.registry.register(branch.clone(), Method::Bye);
        self.metrics.record_bye_sent();
        if !self.send_request(&bye, Some(params)).await {
            self.registry.cancel(&branch);
            return;
        }
        let registry = self.registry.clone();
        tokio::spawn(async move {
            if matches!(pending.wait(BYE_TIMEOUT).await, TransactionOutcome::TimedOut) {
                registry.cancel(&branch);
            }
        });
    }

    pub(crate) fn event_context(&self, params: &CallParameters) -> EventContext {
        EventContext {
            element_id: self.deps.identity.element_id.clone(),
            agency_id: self.deps.identity.agency_id.clone(),
            agent_id: self.deps.identity.agent_id.clone(),
            emergency_call_id: params.emergency_call_id.clone(),
            incident_id: params.incident_id.clone(),
            sip_call_id: params.call_id.clone(),
            srs_endpoint: SmolStr::new(self.config.srs_endpoint.to_string()),
        }
    }

    fn generic_context(&self, call_id: Option<SmolStr>) -> EventContext {
        match call_id.as_ref().and_then(|id| self.calls.get(id)) {
            Some(call) => self.event_context(&call.params),
            None => EventContext {
                element_id: self.deps.identity.element_id.clone(),
                agency_id: self.deps.identity.agency_id.clone(),
                agent_id: self.deps.identity.agent_id.clone(),
                emergency_call_id: None,
                incident_id: None,
                sip_call_id: call_id.unwrap_or_default(),
                srs_endpoint: SmolStr::new(self.config.srs_endpoint.to_string()),
            },
        }
    }

    fn emit_signaling(
        &self,
        call_id: Option<SmolStr>,
        direction: SignalingDirection,
        summary: SmolStr,
    ) {
        self.deps.event_log.log(RecorderEvent::Signaling {
            ctx: self.generic_context(call_id),
            direction,
            summary,
        });
    }
}

pub(crate) fn media_type_of(kind: MediaKind) -> MediaType {
    match kind {
        MediaKind::Audio => MediaType::Audio,
        MediaKind::Video => MediaType::Video,
        MediaKind::Text => MediaType::Text,
        MediaKind::Msrp => MediaType::Message,
    }
}

pub(crate) fn request_branch(request: &Request) -> Option<SmolStr> {
    top_via(&request.headers)
        .and_then(|via| branch_from_via(via))
        .map(|branch| SmolStr::new(branch.to_owned()))
}

fn is_options(headers: &siprec_core::Headers) -> bool {
    matches!(cseq_of(headers), Some((_, Method::Options)))
}

fn request_summary(request: &Request) -> SmolStr {
    SmolStr::new(format!(
        "{} {} SIP/2.0",
        request.start.method, request.start.uri
    ))
}

fn status_summary(response: &Response) -> SmolStr {
    SmolStr::new(format!(
        "SIP/2.0 {} {}",
        response.start.code, response.start.reason
    ))
}

/// Extracts the answered SDP from a final response body. Tolerates both a
/// bare `application/sdp` body and a multipart body containing one.
pub(crate) fn answered_sdp_of(response: &Response) -> Option<SessionDescription> {
    let text = std::str::from_utf8(response.body.as_ref()).ok()?;
    let start = text.find("v=")?;
    let slice = &text[start..];
    let end = slice.find("\r\n--").unwrap_or(slice.len());
    SessionDescription::parse(&slice[..end]).ok()
}
