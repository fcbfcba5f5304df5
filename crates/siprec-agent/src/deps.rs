// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The recorder's explicit collaborator seams.
//!
//! Certificate material, media ports, leg construction and event shipping
//! look like process-wide services, but the agent takes them as explicit
//! dependencies so hosts control them and tests substitute fakes.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use smol_str::SmolStr;
use tokio::sync::mpsc;

use siprec_events::EventLog;
use siprec_media::LegFactory;
use siprec_sdp::MediaPortManager;
use siprec_transport::{SipChannel, TlsSettings, TransportError, TransportKind};

use crate::config::ReportingIdentity;

/// The signalling channel seam. [`SipChannel`] is the production
/// implementation; tests drive the agent through an in-memory one.
#[async_trait]
pub trait SignalingTransport: Send + Sync + 'static {
    fn kind(&self) -> TransportKind;
    fn local_addr(&self) -> SocketAddr;
    async fn send(&self, payload: Bytes) -> Result<(), TransportError>;
    fn close(&self);
}

#[async_trait]
impl SignalingTransport for SipChannel {
    fn kind(&self) -> TransportKind {
        SipChannel::kind(self)
    }

    fn local_addr(&self) -> SocketAddr {
        SipChannel::local_addr(self)
    }

    async fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        SipChannel::send(self, payload).await
    }

    fn close(&self) {
        SipChannel::close(self)
    }
}

/// Source of the local X.509 material advertised in DTLS-SRTP offers.
/// Provisioning is the host's concern.
pub trait CertificateStore: Send + Sync + 'static {
    /// Fingerprint of the certificate the media stack will present,
    /// e.g. `sha-256 AB:CD:…`, or `None` when no certificate is
    /// provisioned.
    fn dtls_fingerprint(&self) -> Option<SmolStr>;
}

/// A certificate store with fixed contents.
#[derive(Debug, Clone, Default)]
pub struct StaticCertificateStore {
    fingerprint: Option<SmolStr>,
}

impl StaticCertificateStore {
    pub fn new(fingerprint: Option<SmolStr>) -> Self {
        Self { fingerprint }
    }
}

impl CertificateStore for StaticCertificateStore {
    fn dtls_fingerprint(&self) -> Option<SmolStr> {
        self.fingerprint.clone()
    }
}

/// SRS reachability notification, delivered on transitions only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrsStatus {
    pub recorder: SmolStr,
    pub responding: bool,
    /// Last response status while responding; `None` when unreachable.
    pub status_code: Option<u16>,
}

/// Everything a recorder needs besides its own configuration.
#[derive(Clone)]
pub struct AgentDeps {
    pub event_log: Arc<dyn EventLog>,
    pub ports: Arc<dyn MediaPortManager>,
    pub legs: Arc<dyn LegFactory>,
    pub certs: Arc<dyn CertificateStore>,
    pub identity: ReportingIdentity,
    /// TLS client material for recorders configured with the TLS
    /// transport.
    pub tls: Option<TlsSettings>,
    /// Receives [`SrsStatus`] transitions, when the host cares.
    pub status_tx: Option<mpsc::UnboundedSender<SrsStatus>>,
}
