// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Outbound recording legs toward the SRS.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use siprec_sdp::{MediaKind, MediaLabel};

/// Errors raised while constructing a leg. A failed leg is logged and left
/// absent; the remaining legs keep forwarding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegError {
    /// The local media port could not be bound.
    Bind(String),
    /// The SRS media endpoint could not be connected.
    Connect(String),
    /// The answered media description was unusable.
    BadAnswer(String),
}

impl std::fmt::Display for LegError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LegError::Bind(msg) => write!(f, "leg bind failed: {}", msg),
            LegError::Connect(msg) => write!(f, "leg connect failed: {}", msg),
            LegError::BadAnswer(msg) => write!(f, "unusable answered media: {}", msg),
        }
    }
}

impl std::error::Error for LegError {}

/// Everything a factory needs to build one leg.
#[derive(Debug, Clone)]
pub struct LegSpec {
    pub kind: MediaKind,
    pub label: MediaLabel,
    /// Local port the offer promised for this leg.
    pub local_port: u16,
    /// Where the SRS answered it will receive this leg.
    pub remote: SocketAddr,
    /// Whether the negotiated profile is encrypted (SRTP / MSRPS).
    pub secure: bool,
}

/// One send-only media leg toward the SRS.
pub trait RecordingLeg: Send + Sync + 'static {
    fn label(&self) -> MediaLabel;

    /// Forwards one packet copy. Never blocks; the leg owns its own
    /// delivery queue.
    fn forward(&self, packet: Bytes);

    /// Releases the leg's transport resources. Idempotent.
    fn shutdown(&self);
}

/// Builds recording legs from negotiated media descriptions.
///
/// The RTP/MSRP protocol stacks belong to the host application; this trait
/// is the seam where they plug in. The bundled [`SocketLegFactory`]
/// (crate::udp) forwards raw packets over plain sockets, which suits lab
/// use and SRS deployments that terminate encryption elsewhere — hosts
/// that negotiate SRTP toward the SRS provide their own factory.
#[async_trait]
pub trait LegFactory: Send + Sync + 'static {
    async fn create_leg(&self, spec: &LegSpec) -> Result<Arc<dyn RecordingLeg>, LegError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_their_stage() {
        assert!(LegError::Bind("port in use".into())
            .to_string()
            .contains("bind"));
        assert!(LegError::Connect("refused".into())
            .to_string()
            .contains("connect"));
    }
}
