// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-call recording state.

use smol_str::SmolStr;

use siprec_core::{Request, Response};
use siprec_media::MediaBridge;
use siprec_metadata::RecordingMetadata;
use siprec_sdp::{MediaKind, OfferedStream, SessionDescription};

use crate::params::CallParameters;

/// Lifecycle of one recording dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// INVITE sent, awaiting the final response.
    Offering,
    /// 200 OK received, media attached.
    Established,
    /// re-INVITE sent, awaiting the final response.
    ReOffering,
    /// Dialog ended; the call is about to leave the map.
    Terminated,
    /// Stopped while still offering; the pending final is absorbed.
    Cancelled,
}

/// One media kind added by an in-flight re-INVITE, with the index of the
/// original RTP channel that will feed it (None for MSRP).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMedia {
    pub kind: MediaKind,
    pub channel_index: Option<usize>,
}

/// All state the agent keeps for one recorded call, keyed by the original
/// Call-ID.
pub struct RecordedCall {
    pub state: CallState,
    pub params: CallParameters,

    /// The last INVITE or re-INVITE sent; BYE and re-INVITEs derive their
    /// dialog headers from it.
    pub invite: Request,

    /// Last CSeq used toward the SRS. Monotonic for the call's lifetime.
    pub last_cseq: u32,

    /// From tag of the recording dialog.
    pub from_tag: SmolStr,

    pub offered_sdp: SessionDescription,
    pub offered_streams: Vec<OfferedStream>,

    /// The answered SDP from the SRS, once a 2xx arrived.
    pub answered_sdp: Option<SessionDescription>,

    /// The 200 OK establishing (or re-establishing) the dialog; source of
    /// the remote To tag.
    pub ok_response: Option<Response>,

    pub metadata: RecordingMetadata,
    pub bridge: MediaBridge,

    /// True while a re-INVITE transaction is outstanding.
    pub reinvite_in_progress: bool,

    /// Media kinds the in-flight re-INVITE is adding.
    pub pending_new_media: Vec<PendingMedia>,

    /// Via branch of the outstanding INVITE/re-INVITE transaction.
    /// `Some` iff a client INVITE transaction is outstanding.
    pub invite_branch: Option<SmolStr>,
}

impl RecordedCall {
    /// Increments and returns the CSeq for the next in-dialog request.
    pub fn next_cseq(&mut self) -> u32 {
        self.last_cseq += 1;
        self.last_cseq
    }

    /// True when the recording dialog is fully established.
    pub fn is_established(&self) -> bool {
        matches!(self.state, CallState::Established | CallState::ReOffering)
    }
}
