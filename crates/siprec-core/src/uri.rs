// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use smol_str::SmolStr;

/// Parsed representation of a SIP URI (RFC 3261 §19).
///
/// Recorder URIs come from operator configuration and from the original
/// call's From/To headers; the parser is tolerant of parameters and does
/// not attempt percent-decoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SipUri {
    pub sips: bool,
    pub user: Option<SmolStr>,
    pub host: SmolStr,
    pub port: Option<u16>,
    pub params: BTreeMap<SmolStr, Option<SmolStr>>,
}

impl SipUri {
    /// Constructs a `sip:` URI with the given host and default settings.
    pub fn new(host: impl Into<SmolStr>) -> Self {
        Self {
            sips: false,
            user: None,
            host: host.into(),
            port: None,
            params: BTreeMap::new(),
        }
    }

    /// Builds a URI addressing a socket endpoint, e.g. `sip:10.0.0.1:5060`.
    pub fn from_endpoint(addr: SocketAddr, sips: bool) -> Self {
        Self {
            sips,
            user: None,
            host: host_token(addr.ip()),
            port: Some(addr.port()),
            params: BTreeMap::new(),
        }
    }

    /// Attempts to parse a SIP or SIPS URI from the provided string.
    pub fn parse(input: &str) -> Option<Self> {
        let (scheme, rest) = input.trim().split_once(':')?;
        let sips = scheme.eq_ignore_ascii_case("sips");
        if !sips && !scheme.eq_ignore_ascii_case("sip") {
            return None;
        }

        // URI headers (?key=value) are not meaningful to the recorder.
        let addr_part = rest.split('?').next()?;

        let mut params = BTreeMap::new();
        let mut addr_iter = addr_part.split(';');
        let base = addr_iter.next()?.trim();
        for param in addr_iter {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            if let Some((k, v)) = param.split_once('=') {
                params.insert(
                    SmolStr::new(k.trim().to_owned()),
                    Some(SmolStr::new(v.trim().to_owned())),
                );
            } else {
                params.insert(SmolStr::new(param.to_owned()), None);
            }
        }

        let (user, host_port) = match base.split_once('@') {
            Some((user, host)) => {
                let user = user.trim();
                let user = if user.is_empty() {
                    None
                } else {
                    Some(SmolStr::new(user.to_owned()))
                };
                (user, host.trim())
            }
            None => (None, base),
        };

        if host_port.is_empty() {
            return None;
        }

        let (host, port) = split_host_port(host_port)?;

        Some(Self {
            sips,
            user,
            host: SmolStr::new(host.to_ascii_lowercase()),
            port,
            params,
        })
    }

    /// Returns a copy of this URI with the user part replaced.
    pub fn with_user(&self, user: impl Into<SmolStr>) -> Self {
        let mut uri = self.clone();
        uri.user = Some(user.into());
        uri
    }

    /// The user part when non-empty, otherwise the host. Used for display
    /// names in recording metadata.
    pub fn user_or_host(&self) -> &SmolStr {
        self.user.as_ref().unwrap_or(&self.host)
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", if self.sips { "sips" } else { "sip" })?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for (name, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{}={}", name, value)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

/// Formats an IP address as a URI host token (no brackets; Display adds them).
fn host_token(ip: IpAddr) -> SmolStr {
    SmolStr::new(ip.to_string())
}

/// Splits `host[:port]`, handling bracketed IPv6 literals.
fn split_host_port(input: &str) -> Option<(&str, Option<u16>)> {
    if let Some(rest) = input.strip_prefix('[') {
        let (host, tail) = rest.split_once(']')?;
        let port = match tail.strip_prefix(':') {
            Some(port) => Some(port.parse().ok()?),
            None => None,
        };
        return Some((host, port));
    }

    match input.rsplit_once(':') {
        // A second colon means an unbracketed IPv6 literal with no port.
        Some((head, _)) if head.contains(':') => Some((input, None)),
        Some((host, port)) => Some((host, Some(port.parse().ok()?))),
        None => Some((input, None)),
    }
}
