// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed recorder configuration.

use std::net::SocketAddr;

use serde::Deserialize;
use smol_str::SmolStr;

use siprec_sdp::{MsrpEncryption, RtpEncryption};
use siprec_transport::TransportKind;

/// Default seconds between OPTIONS probes.
pub const DEFAULT_OPTIONS_INTERVAL_SECS: u64 = 5;

/// Identity stamped onto every logged recording event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReportingIdentity {
    pub element_id: SmolStr,
    pub agency_id: SmolStr,
    pub agent_id: SmolStr,
}

/// Configuration of one recorder (one SRS).
#[derive(Debug, Clone, Deserialize)]
pub struct RecorderConfig {
    /// Unique recorder name; becomes the user part of the SRS Request-URI.
    pub name: SmolStr,

    #[serde(default = "default_true")]
    pub enabled: bool,

    pub transport: TransportKind,

    /// Local signalling endpoint to bind.
    pub local_endpoint: SocketAddr,

    /// The SRS signalling endpoint.
    pub srs_endpoint: SocketAddr,

    #[serde(default = "default_rtp_encryption")]
    pub rtp_encryption: RtpEncryption,

    #[serde(default = "default_msrp_encryption")]
    pub msrp_encryption: MsrpEncryption,

    #[serde(default = "default_true")]
    pub enable_options: bool,

    #[serde(default = "default_options_interval")]
    pub options_interval_secs: u64,

    /// SNI name presented when `transport` is TLS.
    #[serde(default)]
    pub tls_server_name: Option<SmolStr>,
}

/// Top-level recording settings of the host application.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SrcSettings {
    #[serde(default)]
    pub enable_siprec: bool,

    #[serde(default)]
    pub recorders: Vec<RecorderConfig>,

    #[serde(default)]
    pub identity: ReportingIdentity,
}

/// Configuration validation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    EmptyName,
    DuplicateName(SmolStr),
    /// Local and SRS endpoints must share an address family.
    AddressFamilyMismatch {
        name: SmolStr,
        local: SocketAddr,
        srs: SocketAddr,
    },
    ZeroOptionsInterval(SmolStr),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EmptyName => write!(f, "recorder name must not be empty"),
            ConfigError::DuplicateName(name) => {
                write!(f, "duplicate recorder name: {}", name)
            }
            ConfigError::AddressFamilyMismatch { name, local, srs } => write!(
                f,
                "recorder {}: local endpoint {} and SRS endpoint {} use different address families",
                name, local, srs
            ),
            ConfigError::ZeroOptionsInterval(name) => {
                write!(f, "recorder {}: options interval must be at least 1 second", name)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl RecorderConfig {
    /// Checks the structural constraints this configuration must satisfy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.local_endpoint.is_ipv4() != self.srs_endpoint.is_ipv4() {
            return Err(ConfigError::AddressFamilyMismatch {
                name: self.name.clone(),
                local: self.local_endpoint,
                srs: self.srs_endpoint,
            });
        }
        if self.enable_options && self.options_interval_secs == 0 {
            return Err(ConfigError::ZeroOptionsInterval(self.name.clone()));
        }
        Ok(())
    }
}

impl SrcSettings {
    /// Validates every recorder and the uniqueness of their names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = Vec::new();
        for recorder in &self.recorders {
            recorder.validate()?;
            if seen.contains(&recorder.name) {
                return Err(ConfigError::DuplicateName(recorder.name.clone()));
            }
            seen.push(recorder.name.clone());
        }
        Ok(())
    }

    /// The recorders that should be started.
    pub fn enabled_recorders(&self) -> impl Iterator<Item = &RecorderConfig> {
        self.recorders.iter().filter(|r| r.enabled)
    }
}

fn default_true() -> bool {
    true
}

fn default_rtp_encryption() -> RtpEncryption {
    RtpEncryption::None
}

fn default_msrp_encryption() -> MsrpEncryption {
    MsrpEncryption::None
}

fn default_options_interval() -> u64 {
    DEFAULT_OPTIONS_INTERVAL_SECS
}
