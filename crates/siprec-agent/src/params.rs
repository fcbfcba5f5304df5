use std::sync::Arc;

use smol_str::SmolStr;

use siprec_core::SipUri;
use siprec_media::{MsrpConnection, RtpChannel};
use siprec_sdp::SessionDescription;

/// Everything the host call engine hands over when a call should start
/// being recorded or has re-negotiated its media.
///
/// `rtp_channels` carries one handle per RTP media stream with a non-zero
/// port in `answered_sdp`, in SDP order. On re-negotiation the host passes
/// the full updated list; a replaced handle (new identity at the same
/// index) signals that the underlying stream was rebuilt.
#[derive(Clone)]
pub struct CallParameters {
    /// Call-ID of the original call, reused toward the SRS.
    pub call_id: SmolStr,
    pub from_uri: SipUri,
    pub to_uri: SipUri,
    /// NG9-1-1 emergency call identifier, carried into Call-Info.
    pub emergency_call_id: Option<SmolStr>,
    /// NG9-1-1 incident identifier, carried into Call-Info.
    pub incident_id: Option<SmolStr>,
    /// The answered SDP of the original call.
    pub answered_sdp: SessionDescription,
    pub rtp_channels: Vec<Arc<RtpChannel>>,
    pub msrp_connection: Option<Arc<MsrpConnection>>,
}

impl std::fmt::Debug for CallParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallParameters")
            .field("call_id", &self.call_id)
            .field("from_uri", &self.from_uri.to_string())
            .field("to_uri", &self.to_uri.to_string())
            .field("media", &self.answered_sdp.media.len())
            .field("rtp_channels", &self.rtp_channels.len())
            .field("msrp", &self.msrp_connection.is_some())
            .finish()
    }
}
