// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handles onto the original call's media objects.
//!
//! The call engine publishes every packet it receives from and sends to
//! the remote party; subscribers get copies over broadcast channels.
//! Dropping a receiver is the only deregistration needed, which keeps
//! unsubscription unconditional and idempotent on every exit path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;

use siprec_sdp::MediaKind;

/// Queue depth per direction. Forwarding tasks that lag skip ahead rather
/// than stall the publisher.
const PACKET_QUEUE: usize = 256;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Per-direction packet feeds shared by both handle types.
#[derive(Debug)]
struct PacketFeed {
    id: u64,
    received: broadcast::Sender<Bytes>,
    sent: broadcast::Sender<Bytes>,
}

impl PacketFeed {
    fn new() -> Self {
        let (received, _) = broadcast::channel(PACKET_QUEUE);
        let (sent, _) = broadcast::channel(PACKET_QUEUE);
        Self {
            id: NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed),
            received,
            sent,
        }
    }
}

/// Handle onto one RTP stream of the original call.
///
/// The call engine replaces the handle (new identity) when it rebuilds the
/// underlying stream, e.g. after an encryption change; identity comparison
/// is how the recorder detects that.
#[derive(Debug)]
pub struct RtpChannel {
    kind: MediaKind,
    feed: PacketFeed,
}

impl RtpChannel {
    pub fn new(kind: MediaKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            feed: PacketFeed::new(),
        })
    }

    /// Stable identity of this handle.
    pub fn id(&self) -> u64 {
        self.feed.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// True when both handles refer to the same underlying stream.
    pub fn same_as(&self, other: &RtpChannel) -> bool {
        self.feed.id == other.feed.id
    }

    /// Publishes a packet received from the remote party.
    pub fn publish_received(&self, packet: Bytes) {
        let _ = self.feed.received.send(packet);
    }

    /// Publishes a packet sent to the remote party.
    pub fn publish_sent(&self, packet: Bytes) {
        let _ = self.feed.sent.send(packet);
    }

    pub fn subscribe_received(&self) -> broadcast::Receiver<Bytes> {
        self.feed.received.subscribe()
    }

    pub fn subscribe_sent(&self) -> broadcast::Receiver<Bytes> {
        self.feed.sent.subscribe()
    }
}

/// Handle onto the original call's MSRP connection.
#[derive(Debug)]
pub struct MsrpConnection {
    feed: PacketFeed,
}

impl MsrpConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            feed: PacketFeed::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.feed.id
    }

    pub fn same_as(&self, other: &MsrpConnection) -> bool {
        self.feed.id == other.feed.id
    }

    /// Publishes a message received from the remote party.
    pub fn publish_received(&self, message: Bytes) {
        let _ = self.feed.received.send(message);
    }

    /// Publishes a message sent to the remote party.
    pub fn publish_sent(&self, message: Bytes) {
        let _ = self.feed.sent.send(message);
    }

    pub fn subscribe_received(&self) -> broadcast::Receiver<Bytes> {
        self.feed.received.subscribe()
    }

    pub fn subscribe_sent(&self) -> broadcast::Receiver<Bytes> {
        self.feed.sent.subscribe()
    }
}
