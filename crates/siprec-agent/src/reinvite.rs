// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reconciliation of original-call re-negotiations.
//!
//! A re-negotiation of the original call reaches the recorder as a fresh
//! set of call parameters. Three things can have happened:
//!
//! 1. **Retargeting** — the call engine rebuilt one or more media streams
//!    (new handle identity, e.g. an encryption change) without changing
//!    the media set. The bridge re-subscribes; nothing is sent to the SRS.
//! 2. **Addition** — the answered SDP grew. The offer toward the SRS gains
//!    one labelled (received, sent) pair per added stream, the metadata
//!    document gains the matching streams and association entries, and a
//!    re-INVITE carries both to the SRS.
//! 3. Both, in which case retargeting is applied first.
//!
//! A failed re-INVITE leaves the established recording untouched; the
//! added media is simply not mirrored.

use std::time::Duration;

use smol_str::SmolStr;
use tracing::{debug, error, info, warn};

use siprec_core::Method;
use siprec_sdp::{append_recording_pair, copy_accept_types, MediaKind};
use siprec_transport::TransactionOutcome;

use crate::agent::{answered_sdp_of, request_branch, AgentTask, Command};
use crate::builder;
use crate::call::{CallState, PendingMedia, RecordedCall};
use crate::params::CallParameters;

const REINVITE_TIMEOUT: Duration = Duration::from_secs(32);

impl AgentTask {
    pub(crate) async fn on_reinvite(&mut self, new_params: CallParameters) {
        let call_id = new_params.call_id.clone();
        let Some(mut call) = self.calls.remove(&call_id) else {
            error!(recorder = %self.config.name, call_id = %call_id,
                "re-negotiation for unknown call");
            return;
        };
        self.reconcile(&mut call, new_params).await;
        self.calls.insert(call_id, call);
    }

    async fn reconcile(&mut self, call: &mut RecordedCall, new_params: CallParameters) {
        let call_id = call.params.call_id.clone();

        // Preconditions: media only ever grows, and no second INVITE may
        // be started while one is outstanding.
        if new_params.rtp_channels.len() < call.params.rtp_channels.len()
            || new_params.answered_sdp.media.len() < call.params.answered_sdp.media.len()
        {
            error!(recorder = %self.config.name, call_id = %call_id,
                "re-negotiation shrank the media set, ignoring");
            return;
        }
        if call.state != CallState::Established {
            warn!(recorder = %self.config.name, call_id = %call_id, state = ?call.state,
                "re-negotiation while not established, ignoring");
            return;
        }

        // Step 1: retargeting. A replaced handle at the same index means
        // the engine rebuilt that stream; re-subscribe same-kind,
        // same-direction.
        for (index, old_channel) in call.params.rtp_channels.iter().enumerate() {
            if let Some(new_channel) = new_params.rtp_channels.get(index) {
                if !old_channel.same_as(new_channel) {
                    debug!(call_id = %call_id, index, "rtp channel replaced, re-subscribing");
                    call.bridge.rehook_rtp(new_channel);
                }
            }
        }
        if let (Some(old_conn), Some(new_conn)) =
            (&call.params.msrp_connection, &new_params.msrp_connection)
        {
            if !old_conn.same_as(new_conn) {
                debug!(call_id = %call_id, "msrp connection replaced, re-subscribing");
                call.bridge.rehook_msrp(new_conn);
            }
        }

        // Step 2: pure retarget. Same media count means nothing to offer;
        // zero SIP messages go to the SRS.
        let old_media_count = call.params.answered_sdp.media.len();
        if new_params.answered_sdp.media.len() == old_media_count {
            call.params = new_params;
            return;
        }

        // Step 3: addition. Double each appended recordable stream into
        // the offer and extend the metadata document.
        let offer_opts = self.offer_options();
        let mut offered = call.offered_sdp.clone();
        let mut pending = Vec::new();
        let mut rtp_index = call.params.rtp_channels.len();

        for media in &new_params.answered_sdp.media[old_media_count..] {
            if media.port == 0 {
                continue;
            }
            let Some(kind) = media.kind() else {
                continue;
            };
            let channel_index = if kind == MediaKind::Msrp {
                None
            } else {
                let index = rtp_index;
                rtp_index += 1;
                Some(index)
            };
            if call.offered_streams.iter().any(|s| s.kind == kind) {
                warn!(call_id = %call_id, kind = kind.as_str(),
                    "media kind already recorded, addition skipped");
                continue;
            }

            let Some(stream) = append_recording_pair(&mut offered, media, &offer_opts, &*self.deps.ports)
            else {
                continue;
            };
            if kind == MediaKind::Msrp {
                copy_accept_types(&mut offered, media);
            }

            match call.metadata.add_stream_pair(stream.received, stream.sent) {
                Ok(_) => {
                    call.offered_streams.push(stream);
                    pending.push(PendingMedia {
                        kind,
                        channel_index,
                    });
                }
                Err(err) => {
                    // Skip this addition, keep the rest of the re-INVITE.
                    error!(call_id = %call_id, %err, "metadata extension failed, addition skipped");
                    offered.media.truncate(offered.media.len() - 2);
                }
            }
        }

        if pending.is_empty() {
            call.params = new_params;
            return;
        }

        let Some(ok) = call.ok_response.clone() else {
            error!(call_id = %call_id, "established call without OK response");
            return;
        };
        let metadata_xml = match call.metadata.to_xml() {
            Ok(xml) => xml,
            Err(err) => {
                error!(call_id = %call_id, %err, "metadata rendering failed, re-negotiation dropped");
                return;
            }
        };

        let cseq = call.next_cseq();
        let reinvite = builder::reinvite_for(
            &call.invite,
            &ok,
            cseq,
            &offered.to_sdp_string(),
            &metadata_xml,
        );
        let Some(branch) = request_branch(&reinvite) else {
            error!(call_id = %call_id, "re-INVITE missing Via branch");
            return;
        };

        call.offered_sdp = offered;
        call.pending_new_media = pending;
        call.reinvite_in_progress = true;
        call.invite_branch = Some(branch.clone());
        call.invite = reinvite.clone();
        call.params = new_params;
        call.state = CallState::ReOffering;

        let pending_txn = self.registry.register(branch.clone(), Method::Invite);
        self.metrics.record_reinvite_sent();
        if !self.send_request(&reinvite, Some(&call.params)).await {
            self.registry.cancel(&branch);
            call.invite_branch = None;
            call.reinvite_in_progress = false;
            call.pending_new_media.clear();
            call.state = CallState::Established;
            return;
        }

        let tx = self.cmd_tx.clone();
        let registry = self.registry.clone();
        let waiter_call_id = call_id.clone();
        tokio::spawn(async move {
            let outcome = pending_txn.wait(REINVITE_TIMEOUT).await;
            if matches!(outcome, TransactionOutcome::TimedOut) {
                registry.cancel(&branch);
            }
            let _ = tx.send(Command::ReInviteOutcome {
                call_id: waiter_call_id,
                outcome,
            });
        });
    }

    pub(crate) async fn on_reinvite_outcome(
        &mut self,
        call_id: SmolStr,
        outcome: TransactionOutcome,
    ) {
        let Some(mut call) = self.calls.remove(&call_id) else {
            // Stopped while re-offering; the late final was absorbed.
            return;
        };
        call.invite_branch = None;
        call.reinvite_in_progress = false;

        match outcome {
            TransactionOutcome::Final(resp) if resp.is_success() => {
                let ack = builder::ack_for(&call.invite, &resp);
                self.send_request(&ack, Some(&call.params)).await;

                match answered_sdp_of(&resp) {
                    Some(answered) if answered.media.len() == call.offered_sdp.media.len() => {
                        call.answered_sdp = Some(answered.clone());
                        call.ok_response = Some(resp);

                        let additions = std::mem::take(&mut call.pending_new_media);
                        for added in additions {
                            let Some(stream) = call
                                .offered_streams
                                .iter()
                                .find(|s| s.kind == added.kind)
                                .copied()
                            else {
                                continue;
                            };
                            self.attach_stream_pair(&mut call, &answered, stream, added.channel_index)
                                .await;
                        }
                        info!(recorder = %self.config.name, call_id = %call_id,
                            "re-negotiation applied");
                    }
                    answered => {
                        // The established recording stays as it was; the
                        // added media is not mirrored.
                        error!(
                            recorder = %self.config.name,
                            call_id = %call_id,
                            media = ?answered.as_ref().map(|a| a.media.len()),
                            offered = call.offered_sdp.media.len(),
                            "unusable re-negotiation answer, keeping existing media"
                        );
                        call.pending_new_media.clear();
                    }
                }
            }
            TransactionOutcome::Final(resp) => {
                error!(recorder = %self.config.name, call_id = %call_id, code = resp.code(),
                    "re-INVITE rejected, keeping existing media");
                call.pending_new_media.clear();
            }
            TransactionOutcome::TimedOut => {
                error!(recorder = %self.config.name, call_id = %call_id,
                    "re-INVITE timed out, keeping existing media");
                call.pending_new_media.clear();
            }
            TransactionOutcome::Cancelled => {
                call.pending_new_media.clear();
            }
        }

        call.state = CallState::Established;
        self.calls.insert(call_id, call);
    }
}
