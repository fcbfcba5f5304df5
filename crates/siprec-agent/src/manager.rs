// siprec-rs - SIPREC Session Recording Client
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Fan-out over every configured recorder.
//!
//! The manager is deliberately thin: it owns the agents built from the
//! enabled recorder configurations and forwards each call event to all of
//! them. Every per-agent step is guarded so one misbehaving recorder
//! cannot keep the others from recording.

use std::sync::Arc;

use tracing::{error, info};

use crate::agent::RecorderAgent;
use crate::config::SrcSettings;
use crate::deps::AgentDeps;
use crate::params::CallParameters;

/// Owns the recorder agents and fans call lifecycle out to them.
pub struct RecordingManager {
    agents: Vec<Arc<RecorderAgent>>,
}

impl RecordingManager {
    /// Builds one agent per enabled recorder. Recorders with invalid
    /// configuration are logged and skipped; when recording is globally
    /// disabled no agents are built at all.
    pub fn new(settings: &SrcSettings, deps: AgentDeps) -> Self {
        let mut agents = Vec::new();
        if !settings.enable_siprec {
            info!("SIP recording disabled");
            return Self { agents };
        }

        for config in settings.enabled_recorders() {
            let mut agent_deps = deps.clone();
            agent_deps.identity = settings.identity.clone();
            match RecorderAgent::new(config.clone(), agent_deps) {
                Ok(agent) => agents.push(Arc::new(agent)),
                Err(err) => {
                    error!(recorder = %config.name, %err, "recorder configuration rejected");
                }
            }
        }
        Self { agents }
    }

    /// Starts every agent. An agent whose transport cannot bind is logged
    /// and excluded; the others proceed.
    pub async fn start(&self) {
        for agent in &self.agents {
            if let Err(err) = agent.start().await {
                error!(recorder = %agent.name(), %err, "recorder failed to start");
            }
        }
    }

    /// Begins recording the call on every agent.
    pub fn start_recording(&self, params: &CallParameters) {
        for agent in &self.agents {
            agent.start_recording(params.clone());
        }
    }

    /// Forwards a re-negotiation of the original call to every agent.
    pub fn handle_reinvite(&self, params: &CallParameters) {
        for agent in &self.agents {
            agent.handle_reinvite(params.clone());
        }
    }

    /// Stops recording the call on every agent.
    pub fn stop_recording(&self, call_id: &str) {
        for agent in &self.agents {
            agent.stop_recording(call_id);
        }
    }

    /// Shuts the agents down one after the other, waiting for each.
    pub async fn shutdown(&self) {
        for agent in &self.agents {
            agent.shutdown().await;
        }
    }

    pub fn agents(&self) -> &[Arc<RecorderAgent>] {
        &self.agents
    }
}
