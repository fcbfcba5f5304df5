// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plain-socket recording legs.
//!
//! RTP legs forward packet copies over a UDP socket bound to the port the
//! offer promised; MSRP legs open the active TCP connection the offered
//! `a=setup:active` declared and write messages through it. Each leg owns
//! a queue and a sender task so `forward` never blocks the caller.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use siprec_sdp::{MediaKind, MediaLabel};

use crate::leg::{LegError, LegFactory, LegSpec, RecordingLeg};

/// Builds plain UDP (RTP family) and TCP (MSRP) legs.
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketLegFactory;

#[async_trait]
impl LegFactory for SocketLegFactory {
    async fn create_leg(&self, spec: &LegSpec) -> Result<Arc<dyn RecordingLeg>, LegError> {
        match spec.kind {
            MediaKind::Msrp => TcpLeg::connect(spec).await,
            _ => UdpLeg::bind(spec).await,
        }
    }
}

struct UdpLeg {
    label: MediaLabel,
    tx: mpsc::UnboundedSender<Bytes>,
    task: JoinHandle<()>,
}

impl UdpLeg {
    async fn bind(spec: &LegSpec) -> Result<Arc<dyn RecordingLeg>, LegError> {
        let local: SocketAddr = match spec.remote {
            SocketAddr::V4(_) => format!("0.0.0.0:{}", spec.local_port),
            SocketAddr::V6(_) => format!("[::]:{}", spec.local_port),
        }
        .parse()
        .expect("literal bind address");

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|e| LegError::Bind(e.to_string()))?;
        socket
            .connect(spec.remote)
            .await
            .map_err(|e| LegError::Connect(e.to_string()))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        let label = spec.label;
        let task = tokio::spawn(async move {
            while let Some(packet) = rx.recv().await {
                if let Err(err) = socket.send(&packet).await {
                    debug!(label = label.value(), %err, "udp leg send failed");
                }
            }
        });

        Ok(Arc::new(Self {
            label: spec.label,
            tx,
            task,
        }))
    }
}

impl RecordingLeg for UdpLeg {
    fn label(&self) -> MediaLabel {
        self.label
    }

    fn forward(&self, packet: Bytes) {
        let _ = self.tx.send(packet);
    }

    fn shutdown(&self) {
        self.task.abort();
    }
}

struct TcpLeg {
    label: MediaLabel,
    tx: mpsc::UnboundedSender<Bytes>,
    task: JoinHandle<()>,
}

impl TcpLeg {
    async fn connect(spec: &LegSpec) -> Result<Arc<dyn RecordingLeg>, LegError> {
        let stream = TcpStream::connect(spec.remote)
            .await
            .map_err(|e| LegError::Connect(e.to_string()))?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        let label = spec.label;
        let task = tokio::spawn(async move {
            let mut stream = stream;
            while let Some(message) = rx.recv().await {
                if let Err(err) = stream.write_all(&message).await {
                    warn!(label = label.value(), %err, "msrp leg write failed");
                    break;
                }
            }
        });

        Ok(Arc::new(Self {
            label: spec.label,
            tx,
            task,
        }))
    }
}

impl RecordingLeg for TcpLeg {
    fn label(&self) -> MediaLabel {
        self.label
    }

    fn forward(&self, message: Bytes) {
        let _ = self.tx.send(message);
    }

    fn shutdown(&self) {
        self.task.abort();
    }
}
