// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-call bridge between the original call's media and the SRS legs.
//!
//! The bridge holds at most one leg per label (media kind × direction),
//! runs one forwarding task per attached leg, and reports media lifecycle
//! events: the first packet forwarded on a leg fires `RecMediaStart`
//! exactly once, and teardown fires `RecMediaEnd` for every configured leg
//! whether or not a packet ever flowed.
//!
//! Forwarding tasks only move packets; call state is never touched from
//! here, so they may run while the owning agent mutates its own state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

use siprec_events::{EventContext, EventLog, RecorderEvent};
use siprec_sdp::{MediaKind, MediaLabel};

use crate::channel::{MsrpConnection, RtpChannel};
use crate::leg::RecordingLeg;

struct LegSlot {
    leg: Arc<dyn RecordingLeg>,
    started: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Owns the recording legs of one call and the tasks feeding them.
pub struct MediaBridge {
    ctx: EventContext,
    log: Arc<dyn EventLog>,
    legs: HashMap<MediaLabel, LegSlot>,
}

impl MediaBridge {
    pub fn new(ctx: EventContext, log: Arc<dyn EventLog>) -> Self {
        Self {
            ctx,
            log,
            legs: HashMap::new(),
        }
    }

    /// Attaches a leg and starts forwarding the given packet stream onto
    /// it. Replaces (and shuts down) any previous leg with the same label.
    pub fn attach(&mut self, leg: Arc<dyn RecordingLeg>, packets: broadcast::Receiver<Bytes>) {
        let label = leg.label();
        let started = Arc::new(AtomicBool::new(false));
        let task = self.spawn_forwarder(leg.clone(), packets, started.clone());

        if let Some(previous) = self.legs.insert(label, LegSlot { leg, started, task }) {
            previous.task.abort();
            previous.leg.shutdown();
        }
    }

    /// Attaches both directions of an RTP stream: received packets feed
    /// the odd-label leg, sent packets the even-label leg.
    pub fn attach_rtp_pair(
        &mut self,
        channel: &RtpChannel,
        received_leg: Arc<dyn RecordingLeg>,
        sent_leg: Arc<dyn RecordingLeg>,
    ) {
        self.attach(received_leg, channel.subscribe_received());
        self.attach(sent_leg, channel.subscribe_sent());
    }

    /// Attaches both directions of the MSRP connection.
    pub fn attach_msrp_pair(
        &mut self,
        connection: &MsrpConnection,
        received_leg: Arc<dyn RecordingLeg>,
        sent_leg: Arc<dyn RecordingLeg>,
    ) {
        self.attach(received_leg, connection.subscribe_received());
        self.attach(sent_leg, connection.subscribe_sent());
    }

    /// Re-subscribes the legs of `channel.kind()` to a replacement handle.
    /// Each direction is routed to the same-kind, same-direction leg; the
    /// legs themselves and their started flags are preserved.
    pub fn rehook_rtp(&mut self, channel: &RtpChannel) {
        let kind = channel.kind();
        self.rehook(
            MediaLabel::received_for(kind),
            channel.subscribe_received(),
        );
        self.rehook(MediaLabel::sent_for(kind), channel.subscribe_sent());
    }

    /// Re-subscribes the MSRP legs to a replacement connection.
    pub fn rehook_msrp(&mut self, connection: &MsrpConnection) {
        self.rehook(
            MediaLabel::received_for(MediaKind::Msrp),
            connection.subscribe_received(),
        );
        self.rehook(
            MediaLabel::sent_for(MediaKind::Msrp),
            connection.subscribe_sent(),
        );
    }

    /// Swaps the packet source of one attached leg. Returns false when no
    /// leg carries the label.
    pub fn rehook(&mut self, label: MediaLabel, packets: broadcast::Receiver<Bytes>) -> bool {
        let Some(slot) = self.legs.get_mut(&label) else {
            return false;
        };
        slot.task.abort();
        let leg = slot.leg.clone();
        let started = slot.started.clone();
        slot.task = Self::spawn_forwarder_inner(
            self.ctx.clone(),
            self.log.clone(),
            leg,
            packets,
            started,
        );
        true
    }

    /// Returns true when a leg with this label is attached.
    pub fn has_leg(&self, label: MediaLabel) -> bool {
        self.legs.contains_key(&label)
    }

    /// The labels currently attached, in numeric order.
    pub fn leg_labels(&self) -> Vec<MediaLabel> {
        let mut labels: Vec<MediaLabel> = self.legs.keys().copied().collect();
        labels.sort();
        labels
    }

    /// Stops every forwarding task, reports `RecMediaEnd` per configured
    /// leg, and releases the legs. Safe to call more than once.
    pub fn shutdown(&mut self) {
        for (label, slot) in self.legs.drain() {
            slot.task.abort();
            self.log.log(RecorderEvent::MediaEnd {
                ctx: self.ctx.clone(),
                label: label.value(),
            });
            slot.leg.shutdown();
        }
    }

    fn spawn_forwarder(
        &self,
        leg: Arc<dyn RecordingLeg>,
        packets: broadcast::Receiver<Bytes>,
        started: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        Self::spawn_forwarder_inner(self.ctx.clone(), self.log.clone(), leg, packets, started)
    }

    fn spawn_forwarder_inner(
        ctx: EventContext,
        log: Arc<dyn EventLog>,
        leg: Arc<dyn RecordingLeg>,
        mut packets: broadcast::Receiver<Bytes>,
        started: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match packets.recv().await {
                    Ok(packet) => {
                        if !started.swap(true, Ordering::Relaxed) {
                            log.log(RecorderEvent::MediaStart {
                                ctx: ctx.clone(),
                                label: leg.label().value(),
                            });
                        }
                        leg.forward(packet);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        debug!(
                            label = leg.label().value(),
                            missed, "forwarder lagged, packets skipped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

impl Drop for MediaBridge {
    fn drop(&mut self) {
        for slot in self.legs.values() {
            slot.task.abort();
        }
    }
}
