// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core SIP types and wire codecs for the recording client.
//!
//! This crate provides the signalling substrate shared by the recorder:
//! - **Messages**: [`Request`], [`Response`], [`SipMessage`]
//! - **Headers**: [`Headers`] container preserving insertion order
//! - **Methods**: [`Method`] (the recorder meets INVITE, ACK, BYE, CANCEL, OPTIONS)
//! - **URIs**: [`SipUri`] (sip/sips)
//! - **Identifiers**: Via branch and tag generation, CSeq helpers
//! - **Bodies**: multipart MIME assembly for SIPREC INVITE payloads
//!
//! All types use [`SmolStr`](smol_str::SmolStr) and [`Bytes`](bytes::Bytes)
//! for efficient string and binary handling.
//!
//! # Examples
//!
//! ```
//! # use siprec_core::*;
//! let uri = SipUri::parse("sip:srs@recorder.example.com:5060").unwrap();
//! assert_eq!(uri.host.as_str(), "recorder.example.com");
//!
//! let branch = generate_branch_id();
//! assert!(branch.starts_with("z9hG4bK"));
//! ```

pub mod headers;
pub mod method;
pub mod msg;
pub mod multipart;
pub mod token;
pub mod uri;
pub mod wire;

pub use headers::{Header, Headers};
pub use method::Method;
pub use msg::{Request, RequestLine, Response, SipMessage, SipVersion, StatusLine};
pub use multipart::MultipartBody;
pub use token::{
    branch_from_via, cseq_of, generate_branch_id, generate_call_id, generate_tag, rotate_via_branch,
    tag_of, top_via,
};
pub use uri::SipUri;
pub use wire::{header, parse_request, parse_response, serialize_request, serialize_response};
