use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

/// Recorder-level counters (calls, signalling, probes).
#[derive(Debug, Clone, Default)]
pub struct RecorderMetrics {
    inner: Arc<RwLock<MetricsData>>,
}

#[derive(Debug, Default)]
struct MetricsData {
    calls_started: u64,
    calls_ended: u64,
    invites_sent: u64,
    reinvites_sent: u64,
    byes_sent: u64,
    options_probes: u64,
    last_updated: Option<Instant>,
}

#[derive(Debug, Clone, Default)]
pub struct RecorderMetricsSnapshot {
    pub calls_started: u64,
    pub calls_ended: u64,
    pub invites_sent: u64,
    pub reinvites_sent: u64,
    pub byes_sent: u64,
    pub options_probes: u64,
    pub last_updated: Option<Instant>,
}

impl RecorderMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_call_started(&self) {
        let mut data = self.inner.write();
        data.calls_started += 1;
        data.last_updated = Some(Instant::now());
    }

    pub fn record_call_ended(&self) {
        let mut data = self.inner.write();
        data.calls_ended += 1;
        data.last_updated = Some(Instant::now());
    }

    pub fn record_invite_sent(&self) {
        let mut data = self.inner.write();
        data.invites_sent += 1;
        data.last_updated = Some(Instant::now());
    }

    pub fn record_reinvite_sent(&self) {
        let mut data = self.inner.write();
        data.reinvites_sent += 1;
        data.last_updated = Some(Instant::now());
    }

    pub fn record_bye_sent(&self) {
        let mut data = self.inner.write();
        data.byes_sent += 1;
        data.last_updated = Some(Instant::now());
    }

    pub fn record_options_probe(&self) {
        let mut data = self.inner.write();
        data.options_probes += 1;
        data.last_updated = Some(Instant::now());
    }

    pub fn snapshot(&self) -> RecorderMetricsSnapshot {
        let data = self.inner.read();
        RecorderMetricsSnapshot {
            calls_started: data.calls_started,
            calls_ended: data.calls_ended,
            invites_sent: data.invites_sent,
            reinvites_sent: data.reinvites_sent,
            byes_sent: data.byes_sent,
            options_probes: data.options_probes,
            last_updated: data.last_updated,
        }
    }
}
