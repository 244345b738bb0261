//! In-memory state for actively managed containers

use crate::host::{short, ContainerSummary};
use crate::labels::ContainerSettings;
use std::time::{Duration, Instant};

/// Readiness hints returned to a caller of `start_host`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct StartAck {
    /// HTTP status the requester should wait for
    pub wait_for_code: u16,
    /// Path the requester should probe
    pub wait_for_path: String,
}

/// One entry in the controller's active set.
///
/// The immutable part is snapshotted from the container's labels when the
/// entry is created; the telemetry fields are advanced by reconciliation
/// ticks under the state-store mutex.
#[derive(Debug, Clone)]
pub struct ContainerState {
    pub(crate) cid: String,
    pub(crate) name: String,
    pub(crate) needs: Vec<String>,
    pub(crate) stop_delay: Duration,
    pub(crate) wait_for_code: u16,
    pub(crate) wait_for_path: String,

    /// Cumulative receive bytes last observed across all interfaces
    pub(crate) last_recv: u64,
    /// Cumulative transmit bytes last observed across all interfaces
    pub(crate) last_send: u64,
    /// When the counters last moved
    pub(crate) last_activity: Instant,

    /// True while a start task is in flight; exempts the entry from
    /// eviction and idleness checks
    pub(crate) pinned: bool,
}

/// Controller-level fallbacks for fields a container's labels leave unset
#[derive(Debug, Clone)]
pub struct StateDefaults {
    pub stop_delay: Duration,
    pub wait_for_code: u16,
    pub wait_for_path: String,
}

impl ContainerState {
    pub(crate) fn new(ct: &ContainerSummary, settings: &ContainerSettings, defaults: &StateDefaults) -> Self {
        Self {
            cid: ct.cid.clone(),
            name: ct.name.clone(),
            needs: settings.needs.clone(),
            stop_delay: settings.stop_delay.unwrap_or(defaults.stop_delay),
            wait_for_code: settings.wait_for_code.unwrap_or(defaults.wait_for_code),
            wait_for_path: settings
                .wait_for_path
                .clone()
                .unwrap_or_else(|| defaults.wait_for_path.clone()),
            last_recv: 0,
            last_send: 0,
            last_activity: Instant::now(),
            pinned: false,
        }
    }

    pub fn cid(&self) -> &str {
        &self.cid
    }

    pub fn short_id(&self) -> &str {
        short(&self.cid)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn needs(&self) -> &[String] {
        &self.needs
    }

    pub fn stop_delay(&self) -> Duration {
        self.stop_delay
    }

    pub fn pinned(&self) -> bool {
        self.pinned
    }

    /// How long the counters have been quiet
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    pub fn ack(&self) -> StartAck {
        StartAck {
            wait_for_code: self.wait_for_code,
            wait_for_path: self.wait_for_path.clone(),
        }
    }
}
