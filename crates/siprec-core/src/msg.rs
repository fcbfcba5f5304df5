// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use bytes::Bytes;
use smol_str::SmolStr;

use crate::{headers::Headers, method::Method, uri::SipUri};

/// SIP protocol version token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SipVersion {
    V2,
}

impl SipVersion {
    pub fn as_str(&self) -> &'static str {
        "SIP/2.0"
    }
}

/// First line of a SIP request: `Method SP Request-URI SP SIP-Version`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub uri: SipUri,
    pub version: SipVersion,
}

impl RequestLine {
    /// Creates a request line for the given method and target URI.
    pub fn new(method: Method, uri: SipUri) -> Self {
        Self {
            method,
            uri,
            version: SipVersion::V2,
        }
    }
}

/// First line of a SIP response: `SIP-Version SP Status-Code SP Reason-Phrase`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: SipVersion,
    pub code: u16,
    pub reason: SmolStr,
}

impl StatusLine {
    /// Creates a status line with the provided code and reason phrase.
    pub fn new(code: u16, reason: impl Into<SmolStr>) -> Self {
        Self {
            version: SipVersion::V2,
            code,
            reason: reason.into(),
        }
    }
}

/// In-memory representation of a SIP request message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub start: RequestLine,
    pub headers: Headers,
    pub body: Bytes,
}

impl Request {
    /// Builds a request from its components.
    pub fn new(start: RequestLine, headers: Headers, body: Bytes) -> Self {
        Self {
            start,
            headers,
            body,
        }
    }

    /// Returns the Call-ID header value, if present.
    pub fn call_id(&self) -> Option<&SmolStr> {
        self.headers.get("Call-ID")
    }
}

/// In-memory representation of a SIP response message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub start: StatusLine,
    pub headers: Headers,
    pub body: Bytes,
}

impl Response {
    /// Builds a response from its components.
    pub fn new(start: StatusLine, headers: Headers, body: Bytes) -> Self {
        Self {
            start,
            headers,
            body,
        }
    }

    /// Returns the status code.
    pub fn code(&self) -> u16 {
        self.start.code
    }

    /// Returns true if this is a success response (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.start.code)
    }

    /// Returns true if this is a provisional response (1xx).
    pub fn is_provisional(&self) -> bool {
        (100..200).contains(&self.start.code)
    }

    /// Returns the Call-ID header value, if present.
    pub fn call_id(&self) -> Option<&SmolStr> {
        self.headers.get("Call-ID")
    }
}

/// Either a SIP request or response message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SipMessage {
    Request(Request),
    Response(Response),
}

impl SipMessage {
    /// Returns a reference to the request if this is a request.
    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Self::Request(req) => Some(req),
            _ => None,
        }
    }

    /// Returns a reference to the response if this is a response.
    pub fn as_response(&self) -> Option<&Response> {
        match self {
            Self::Response(res) => Some(res),
            _ => None,
        }
    }

    /// Returns the headers regardless of message type.
    pub fn headers(&self) -> &Headers {
        match self {
            Self::Request(req) => &req.headers,
            Self::Response(res) => &res.headers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> SipUri {
        SipUri::parse("sip:srs@example.com").expect("uri")
    }

    #[test]
    fn request_exposes_call_id() {
        let mut headers = Headers::new();
        headers.push("Call-ID", "rec-1");
        let req = Request::new(
            RequestLine::new(Method::Invite, target()),
            headers,
            Bytes::new(),
        );
        assert_eq!(req.call_id().map(|v| v.as_str()), Some("rec-1"));
        assert_eq!(req.start.method, Method::Invite);
    }

    #[test]
    fn response_classification() {
        let ok = Response::new(StatusLine::new(200, "OK"), Headers::new(), Bytes::new());
        assert!(ok.is_success());
        assert!(!ok.is_provisional());

        let trying = Response::new(StatusLine::new(100, "Trying"), Headers::new(), Bytes::new());
        assert!(trying.is_provisional());

        let missing = Response::new(
            StatusLine::new(481, "Call/Transaction Does Not Exist"),
            Headers::new(),
            Bytes::new(),
        );
        assert!(!missing.is_success());
    }

    #[test]
    fn message_wrapper_accessors() {
        let req = Request::new(
            RequestLine::new(Method::Options, target()),
            Headers::new(),
            Bytes::new(),
        );
        let msg = SipMessage::Request(req);
        assert!(msg.as_request().is_some());
        assert!(msg.as_response().is_none());
    }
}
