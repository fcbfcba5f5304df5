// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording lifecycle events.
//!
//! Every significant lifecycle point of a recording emits one event:
//! call start/end, per-leg media start/end, and each non-OPTIONS SIP
//! message traversing the recorder. Events carry the NG9-1-1 identity
//! envelope alongside the call and SRS coordinates.
//!
//! The sink is an explicit [`EventLog`] dependency handed to the recorder
//! so hosts can ship events to their logging service and tests can capture
//! them; [`TracingEventLog`] is the default sink and emits `tracing`
//! events.
//!
//! # Example
//! ```
//! use siprec_events::{EventLog, RecorderEvent, TracingEventLog};
//! # use siprec_events::EventContext;
//! let log = TracingEventLog;
//! # let ctx = EventContext::default();
//! log.log(RecorderEvent::CallStart { ctx });
//! ```

use smol_str::SmolStr;

/// Identity envelope attached to every event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContext {
    /// Logging element identifier of this recording client.
    pub element_id: SmolStr,
    /// Agency operating the element.
    pub agency_id: SmolStr,
    /// Agent within the agency. Distinct from `agency_id`; the two are
    /// populated from separate configuration fields.
    pub agent_id: SmolStr,
    /// NG9-1-1 emergency call identifier, when present.
    pub emergency_call_id: Option<SmolStr>,
    /// NG9-1-1 incident identifier, when present.
    pub incident_id: Option<SmolStr>,
    /// SIP Call-ID of the recorded call (and of the recording dialog).
    pub sip_call_id: SmolStr,
    /// The SRS endpoint this recorder talks to, as `ip:port`.
    pub srs_endpoint: SmolStr,
}

/// Direction of a signalling message relative to this recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingDirection {
    Sent,
    Received,
}

impl SignalingDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalingDirection::Sent => "sent",
            SignalingDirection::Received => "received",
        }
    }
}

/// The recording event kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    /// Recording dialog established; media legs attached.
    CallStart { ctx: EventContext },
    /// Recording dialog ended (local stop, shutdown, or SRS BYE).
    CallEnd { ctx: EventContext },
    /// First packet forwarded on a leg. Fires once per leg.
    MediaStart { ctx: EventContext, label: u8 },
    /// Leg torn down. Fires once per configured leg whether or not a
    /// packet ever flowed.
    MediaEnd { ctx: EventContext, label: u8 },
    /// One non-OPTIONS SIP request or response traversed this recorder.
    Signaling {
        ctx: EventContext,
        direction: SignalingDirection,
        /// The message's first line.
        summary: SmolStr,
    },
}

impl RecorderEvent {
    /// Stable event-kind token used by log shippers.
    pub fn kind(&self) -> &'static str {
        match self {
            RecorderEvent::CallStart { .. } => "RecCallStart",
            RecorderEvent::CallEnd { .. } => "RecCallEnd",
            RecorderEvent::MediaStart { .. } => "RecMediaStart",
            RecorderEvent::MediaEnd { .. } => "RecMediaEnd",
            RecorderEvent::Signaling { .. } => "CallSignalingMessage",
        }
    }

    /// The identity envelope of this event.
    pub fn context(&self) -> &EventContext {
        match self {
            RecorderEvent::CallStart { ctx }
            | RecorderEvent::CallEnd { ctx }
            | RecorderEvent::MediaStart { ctx, .. }
            | RecorderEvent::MediaEnd { ctx, .. }
            | RecorderEvent::Signaling { ctx, .. } => ctx,
        }
    }
}

/// Sink for recording events.
pub trait EventLog: Send + Sync + 'static {
    fn log(&self, event: RecorderEvent);
}

/// Default sink emitting structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn log(&self, event: RecorderEvent) {
        let ctx = event.context();
        match &event {
            RecorderEvent::CallStart { .. } | RecorderEvent::CallEnd { .. } => {
                tracing::info!(
                    kind = event.kind(),
                    call_id = %ctx.sip_call_id,
                    srs = %ctx.srs_endpoint,
                    agency = %ctx.agency_id,
                    agent = %ctx.agent_id,
                    "recording lifecycle"
                );
            }
            RecorderEvent::MediaStart { label, .. } | RecorderEvent::MediaEnd { label, .. } => {
                tracing::info!(
                    kind = event.kind(),
                    call_id = %ctx.sip_call_id,
                    srs = %ctx.srs_endpoint,
                    label,
                    "recording media"
                );
            }
            RecorderEvent::Signaling {
                direction, summary, ..
            } => {
                tracing::debug!(
                    kind = event.kind(),
                    call_id = %ctx.sip_call_id,
                    srs = %ctx.srs_endpoint,
                    direction = direction.as_str(),
                    message = %summary,
                    "recording signalling"
                );
            }
        }
    }
}

/// Sink that drops every event. Useful when a host disables shipping.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventLog;

impl EventLog for NullEventLog {
    fn log(&self, _event: RecorderEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        let ctx = EventContext::default();
        assert_eq!(RecorderEvent::CallStart { ctx: ctx.clone() }.kind(), "RecCallStart");
        assert_eq!(RecorderEvent::CallEnd { ctx: ctx.clone() }.kind(), "RecCallEnd");
        assert_eq!(
            RecorderEvent::MediaStart {
                ctx: ctx.clone(),
                label: 1
            }
            .kind(),
            "RecMediaStart"
        );
        assert_eq!(
            RecorderEvent::MediaEnd {
                ctx: ctx.clone(),
                label: 2
            }
            .kind(),
            "RecMediaEnd"
        );
        assert_eq!(
            RecorderEvent::Signaling {
                ctx,
                direction: SignalingDirection::Sent,
                summary: SmolStr::new("INVITE sip:srs SIP/2.0"),
            }
            .kind(),
            "CallSignalingMessage"
        );
    }

    #[test]
    fn context_travels_with_event() {
        let ctx = EventContext {
            element_id: SmolStr::new("psap.example"),
            agency_id: SmolStr::new("agency-1"),
            agent_id: SmolStr::new("agent-9"),
            emergency_call_id: Some(SmolStr::new("urn:emergency:uid:callid:x")),
            incident_id: None,
            sip_call_id: SmolStr::new("c1"),
            srs_endpoint: SmolStr::new("192.0.2.1:5060"),
        };
        let event = RecorderEvent::CallStart { ctx: ctx.clone() };
        assert_eq!(event.context(), &ctx);
        // agency and agent identities come from distinct fields
        assert_ne!(event.context().agency_id, event.context().agent_id);
    }
}
