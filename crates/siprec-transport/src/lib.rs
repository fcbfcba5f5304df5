// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Async SIP signalling transport for the recording client.
//!
//! One [`SipChannel`] serves one recorder: it binds the configured local
//! endpoint, talks to exactly one SRS, and pumps inbound messages into an
//! mpsc channel. UDP delivers one message per datagram; TCP and TLS frame
//! messages by `Content-Length`.
//!
//! Retransmission, forking and the rest of the RFC 3261 §17 machinery is
//! the surrounding SIP infrastructure's concern. The recorder only needs
//! to match final responses to the requests it sent, which
//! [`TransactionRegistry`] does by Via branch.
//!
//! # Example
//! ```no_run
//! use siprec_transport::{SipChannel, TransportKind};
//! use tokio::sync::mpsc;
//! # async fn example() -> Result<(), siprec_transport::TransportError> {
//! let (tx, mut rx) = mpsc::channel(64);
//! let channel = SipChannel::bind(
//!     TransportKind::Udp,
//!     "0.0.0.0:5080".parse().unwrap(),
//!     "192.0.2.1:5060".parse().unwrap(),
//!     None,
//!     tx,
//! )
//! .await?;
//! while let Some(message) = rx.recv().await {
//!     // feed into the recorder
//! }
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod transaction;

pub use channel::{SipChannel, TlsSettings};
pub use transaction::{PendingTransaction, TransactionOutcome, TransactionRegistry};

use serde::{Deserialize, Serialize};

/// Signalling transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Udp,
    Tcp,
    Tls,
}

impl TransportKind {
    /// Returns the lowercase transport string for metrics and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Udp => "udp",
            TransportKind::Tcp => "tcp",
            TransportKind::Tls => "tls",
        }
    }

    /// Returns the Via header transport parameter value per RFC 3261.
    pub fn via_transport(&self) -> &'static str {
        match self {
            TransportKind::Udp => "UDP",
            TransportKind::Tcp => "TCP",
            TransportKind::Tls => "TLS",
        }
    }

    /// Parses a transport string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Some(TransportKind::Udp),
            "tcp" => Some(TransportKind::Tcp),
            "tls" => Some(TransportKind::Tls),
            _ => None,
        }
    }

    /// Returns true if this transport runs over a persistent connection.
    pub fn is_stream_based(&self) -> bool {
        matches!(self, TransportKind::Tcp | TransportKind::Tls)
    }

    /// Returns true if this transport uses TLS encryption.
    pub fn is_secure(&self) -> bool {
        matches!(self, TransportKind::Tls)
    }
}

/// Transport-layer failures.
#[derive(Debug)]
pub enum TransportError {
    /// The configured local endpoint could not be acquired.
    BindFailed {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },
    /// The SRS endpoint could not be connected.
    ConnectFailed(std::io::Error),
    /// The TLS handshake with the SRS failed.
    TlsHandshake(std::io::Error),
    /// TLS transport selected without TLS settings.
    TlsSettingsMissing,
    /// Sending a message failed.
    Send(std::io::Error),
    /// The channel is closed.
    Closed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::BindFailed { addr, source } => {
                write!(f, "failed to bind {}: {}", addr, source)
            }
            TransportError::ConnectFailed(source) => {
                write!(f, "failed to connect to SRS: {}", source)
            }
            TransportError::TlsHandshake(source) => write!(f, "TLS handshake failed: {}", source),
            TransportError::TlsSettingsMissing => {
                write!(f, "TLS transport requires TLS settings")
            }
            TransportError::Send(source) => write!(f, "send failed: {}", source),
            TransportError::Closed => write!(f, "transport channel closed"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::BindFailed { source, .. }
            | TransportError::ConnectFailed(source)
            | TransportError::TlsHandshake(source)
            | TransportError::Send(source) => Some(source),
            _ => None,
        }
    }
}
