// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! SIPREC request construction.
//!
//! Builders produce complete, ready-to-serialize messages; the agent only
//! decides when to send them. Request shape follows RFC 7866 §6.1: the
//! INVITE advertises `Require: siprec`, a `+sip.src` Contact, and carries
//! the SDP offer and metadata document as a multipart body. NG9-1-1
//! identifiers travel in Call-Info headers.

use bytes::Bytes;
use smol_str::SmolStr;

use siprec_core::{
    generate_branch_id, rotate_via_branch, Headers, Method, MultipartBody, Request, RequestLine,
    Response, SipUri, StatusLine,
};
use siprec_metadata::RS_METADATA_MIME;

use crate::config::RecorderConfig;
use crate::params::CallParameters;

const USER_AGENT: &str = "siprec-rs/0.1";
const SIPREC_ACCEPT: &str = "application/sdp, application/rs-metadata, application/rs-metadata-request";

/// Builds the initial INVITE toward the SRS.
pub fn recording_invite(
    config: &RecorderConfig,
    local: std::net::SocketAddr,
    params: &CallParameters,
    sdp: &str,
    metadata_xml: &str,
    from_tag: &str,
) -> Request {
    let secure = config.transport.is_secure();
    let srs_uri = SipUri::from_endpoint(config.srs_endpoint, secure).with_user(config.name.clone());
    let local_uri = SipUri::from_endpoint(local, secure).with_user(config.name.clone());

    let mut headers = Headers::new();
    headers.push(
        "Via",
        format!(
            "SIP/2.0/{} {};branch={}",
            config.transport.via_transport(),
            local,
            generate_branch_id()
        ),
    );
    headers.push("From", format!("<{}>;tag={}", local_uri, from_tag));
    headers.push("To", format!("<{}>", srs_uri));
    headers.push("Call-ID", params.call_id.clone());
    headers.push("CSeq", "1 INVITE");
    headers.push("Contact", format!("<{}>;+sip.src", local_uri));
    headers.push("Max-Forwards", "70");
    headers.push("Require", "siprec");
    headers.push("Accept", SIPREC_ACCEPT);
    headers.push("User-Agent", USER_AGENT);

    if let Some(call_id) = &params.emergency_call_id {
        headers.push(
            "Call-Info",
            format!("<{}>;purpose=emergency-CallId", call_id),
        );
    }
    if let Some(incident_id) = &params.incident_id {
        headers.push(
            "Call-Info",
            format!("<{}>;purpose=emergency-IncidentId", incident_id),
        );
    }

    let (content_type, body) = MultipartBody::new()
        .part("application/sdp", sdp.as_bytes().to_vec())
        .part(RS_METADATA_MIME, metadata_xml.as_bytes().to_vec())
        .finish();
    headers.push("Content-Type", content_type);

    Request::new(RequestLine::new(Method::Invite, srs_uri), headers, body)
}

/// Builds one OPTIONS liveness probe. The probe reuses a stable Call-ID
/// and From tag per recorder; each attempt carries a fresh branch and the
/// next CSeq.
pub fn probe_options(
    config: &RecorderConfig,
    local: std::net::SocketAddr,
    call_id: &SmolStr,
    from_tag: &SmolStr,
    cseq: u32,
) -> Request {
    let secure = config.transport.is_secure();
    let srs_uri = SipUri::from_endpoint(config.srs_endpoint, secure);

    let mut headers = Headers::new();
    headers.push(
        "Via",
        format!(
            "SIP/2.0/{} {};branch={}",
            config.transport.via_transport(),
            local,
            generate_branch_id()
        ),
    );
    headers.push("From", format!("<{}>;tag={}", srs_uri, from_tag));
    headers.push("To", format!("<{}>", srs_uri));
    headers.push("Call-ID", call_id.clone());
    headers.push("CSeq", format!("{} OPTIONS", cseq));
    headers.push("Max-Forwards", "70");
    headers.push("User-Agent", USER_AGENT);
    headers.push("Content-Length", "0");

    Request::new(RequestLine::new(Method::Options, srs_uri), headers, Bytes::new())
}

/// Derives an in-dialog request skeleton from the stored INVITE and the
/// 200 OK: same dialog identifiers, the remote's To tag, a fresh top Via
/// branch, and the given CSeq. The caller fills method-specific parts.
fn in_dialog_request(
    method: Method,
    invite: &Request,
    ok: &Response,
    cseq: u32,
) -> Request {
    let uri = contact_uri_of(ok).unwrap_or_else(|| invite.start.uri.clone());

    let mut headers = Headers::new();
    if let Some(via) = invite.headers.get("Via") {
        headers.push("Via", via.clone());
    }
    rotate_via_branch(&mut headers);

    if let Some(from) = invite.headers.get("From") {
        headers.push("From", from.clone());
    }
    if let Some(to) = ok.headers.get("To") {
        headers.push("To", to.clone());
    }
    if let Some(call_id) = invite.headers.get("Call-ID") {
        headers.push("Call-ID", call_id.clone());
    }
    headers.push("CSeq", format!("{} {}", cseq, method.as_str()));
    headers.push("Max-Forwards", "70");

    Request::new(RequestLine::new(method, uri), headers, Bytes::new())
}

/// Builds the BYE ending an established recording dialog.
pub fn bye_for(invite: &Request, ok: &Response, cseq: u32) -> Request {
    let mut bye = in_dialog_request(Method::Bye, invite, ok, cseq);
    bye.headers.push("Content-Length", "0");
    bye
}

/// Builds the ACK for a 2xx final response. A 2xx ACK is its own
/// transaction and carries a fresh branch (RFC 3261 §13.2.2.4); the CSeq
/// number matches the INVITE it acknowledges.
pub fn ack_for(invite: &Request, ok: &Response) -> Request {
    let cseq = siprec_core::cseq_of(&invite.headers)
        .map(|(number, _)| number)
        .unwrap_or(1);
    let mut ack = in_dialog_request(Method::Ack, invite, ok, cseq);
    ack.headers.push("Content-Length", "0");
    ack
}

/// Builds a response to an inbound request, mirroring the headers the
/// transaction and dialog layers correlate on.
pub fn reply_to(request: &Request, code: u16, reason: &str) -> Response {
    let mut headers = Headers::new();
    for via in request.headers.get_all("Via") {
        headers.push("Via", via.clone());
    }
    for name in ["From", "To", "Call-ID", "CSeq"] {
        if let Some(value) = request.headers.get(name) {
            headers.push(name, value.clone());
        }
    }
    headers.push("User-Agent", USER_AGENT);
    headers.push("Content-Length", "0");

    Response::new(StatusLine::new(code, reason), headers, Bytes::new())
}

/// Builds a re-INVITE refreshing the recording dialog with a new offer.
pub fn reinvite_for(
    invite: &Request,
    ok: &Response,
    cseq: u32,
    sdp: &str,
    metadata_xml: &str,
) -> Request {
    let mut reinvite = in_dialog_request(Method::Invite, invite, ok, cseq);

    for name in ["Contact", "Require", "Accept", "User-Agent", "Call-Info"] {
        for value in invite.headers.get_all(name) {
            reinvite.headers.push(name, value.clone());
        }
    }

    let (content_type, body) = MultipartBody::new()
        .part("application/sdp", sdp.as_bytes().to_vec())
        .part(RS_METADATA_MIME, metadata_xml.as_bytes().to_vec())
        .finish();
    reinvite.headers.push("Content-Type", content_type);
    reinvite.body = body;
    reinvite
}

/// Extracts the URI from a response's Contact header.
fn contact_uri_of(response: &Response) -> Option<SipUri> {
    let raw = response.headers.get("Contact")?;
    let trimmed = raw.trim();
    let inner = match (trimmed.find('<'), trimmed.find('>')) {
        (Some(start), Some(end)) if start < end => &trimmed[start + 1..end],
        _ => trimmed.split(';').next()?,
    };
    SipUri::parse(inner)
}
