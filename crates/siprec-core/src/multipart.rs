// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multipart MIME body assembly for SIPREC INVITE payloads.
//!
//! A SIPREC INVITE carries two parts: the SDP offer and the recording
//! metadata document (RFC 7866 §7). The builder produces the composite
//! body plus the matching `Content-Type` header value.

use bytes::{Bytes, BytesMut};
use rand::{distributions::Alphanumeric, Rng};
use smol_str::SmolStr;

/// Builder for `multipart/mixed` message bodies.
///
/// # Examples
///
/// ```
/// use siprec_core::MultipartBody;
///
/// let (content_type, body) = MultipartBody::new()
///     .part("application/sdp", b"v=0\r\n".to_vec())
///     .part("application/rs-metadata+xml", b"<recording/>".to_vec())
///     .finish();
/// assert!(content_type.starts_with("multipart/mixed;boundary="));
/// assert!(!body.is_empty());
/// ```
#[derive(Debug)]
pub struct MultipartBody {
    boundary: SmolStr,
    parts: Vec<(SmolStr, Vec<u8>)>,
}

impl MultipartBody {
    /// Creates an empty builder with a fresh random boundary.
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let token: String = (&mut rng)
            .sample_iter(&Alphanumeric)
            .take(16)
            .map(char::from)
            .collect();
        Self {
            boundary: SmolStr::new(format!("siprec-{}", token)),
            parts: Vec::new(),
        }
    }

    /// Appends a body part with the given content type.
    pub fn part(mut self, content_type: &str, body: Vec<u8>) -> Self {
        self.parts.push((SmolStr::new(content_type), body));
        self
    }

    /// Returns the boundary token in use.
    pub fn boundary(&self) -> &SmolStr {
        &self.boundary
    }

    /// Renders the composite body, returning the `Content-Type` header
    /// value and the encoded payload.
    pub fn finish(self) -> (SmolStr, Bytes) {
        let mut out = BytesMut::new();
        for (content_type, body) in &self.parts {
            out.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            out.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
            out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());

        let content_type = SmolStr::new(format!("multipart/mixed;boundary={}", self.boundary));
        (content_type, out.freeze())
    }
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_two_parts_with_terminator() {
        let builder = MultipartBody::new();
        let boundary = builder.boundary().clone();
        let (content_type, body) = builder
            .part("application/sdp", b"v=0\r\n".to_vec())
            .part("application/rs-metadata+xml", b"<recording/>".to_vec())
            .finish();

        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(
            content_type.as_str(),
            format!("multipart/mixed;boundary={}", boundary)
        );
        assert_eq!(text.matches(&format!("--{}\r\n", boundary)).count(), 2);
        assert!(text.contains("Content-Type: application/sdp\r\n"));
        assert!(text.contains("Content-Type: application/rs-metadata+xml\r\n"));
        assert!(text.ends_with(&format!("--{}--\r\n", boundary)));
    }

    #[test]
    fn boundaries_are_unique() {
        assert_ne!(
            MultipartBody::new().boundary().as_str(),
            MultipartBody::new().boundary().as_str()
        );
    }
}
