// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Media plumbing for the recording client.
//!
//! The original call's media engine owns its RTP channels and MSRP
//! connection; the recorder only subscribes to their per-packet events.
//! [`RtpChannel`] and [`MsrpConnection`] are the handle types that engine
//! publishes into, [`RecordingLeg`] is one outbound leg toward the SRS,
//! and [`MediaBridge`] wires subscriptions to legs for one recorded call.

pub mod bridge;
pub mod channel;
pub mod leg;
pub mod udp;

pub use bridge::MediaBridge;
pub use channel::{MsrpConnection, RtpChannel};
pub use leg::{LegError, LegFactory, LegSpec, RecordingLeg};
pub use udp::SocketLegFactory;
