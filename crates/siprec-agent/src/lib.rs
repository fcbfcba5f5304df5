// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The recording client proper: per-SRS agents and their fan-out manager.
//!
//! A [`RecorderAgent`] is a long-lived signalling endpoint toward one SIP
//! Recording Server. It multiplexes every recorded call over one local
//! transport, drives the SIPREC INVITE / re-INVITE / BYE state machine
//! per call, probes SRS liveness with OPTIONS, doubles the original
//! call's media into labelled send-only legs, and keeps the RFC 7865
//! metadata document in step with the media set.
//!
//! [`RecordingManager`] fans call lifecycle out over every enabled
//! recorder.
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use siprec_agent::{AgentDeps, RecordingManager, SrcSettings, StaticCertificateStore};
//! use siprec_events::TracingEventLog;
//! use siprec_media::SocketLegFactory;
//! # use siprec_sdp::MediaPortManager;
//! # struct Ports;
//! # impl MediaPortManager for Ports {
//! #     fn next_audio_port(&self) -> u16 { 40000 }
//! #     fn next_video_port(&self) -> u16 { 42000 }
//! #     fn next_text_port(&self) -> u16 { 44000 }
//! #     fn next_msrp_port(&self) -> u16 { 46000 }
//! # }
//!
//! # async fn example(settings: SrcSettings) {
//! let deps = AgentDeps {
//!     event_log: Arc::new(TracingEventLog),
//!     ports: Arc::new(Ports),
//!     legs: Arc::new(SocketLegFactory),
//!     certs: Arc::new(StaticCertificateStore::default()),
//!     identity: settings.identity.clone(),
//!     tls: None,
//!     status_tx: None,
//! };
//! let manager = RecordingManager::new(&settings, deps);
//! manager.start().await;
//! # }
//! ```

pub mod agent;
pub mod builder;
pub mod call;
pub mod config;
pub mod deps;
pub mod manager;
pub mod metrics;
pub mod params;
mod reinvite;

pub use agent::{AgentError, RecorderAgent};
pub use call::{CallState, RecordedCall};
pub use config::{
    ConfigError, RecorderConfig, ReportingIdentity, SrcSettings, DEFAULT_OPTIONS_INTERVAL_SECS,
};
pub use deps::{
    AgentDeps, CertificateStore, SignalingTransport, SrsStatus, StaticCertificateStore,
};
pub use manager::RecordingManager;
pub use metrics::{RecorderMetrics, RecorderMetricsSnapshot};
pub use params::CallParameters;
