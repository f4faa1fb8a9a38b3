// ── Runtime orchestrator configuration ──
//
// These types describe *how* the orchestrator runs: channel sizing and
// the garbage-collection schedule. They never touch disk; restcache-config
// builds an `OrchestratorConfig` from file and env and hands it in.

use std::time::Duration;

/// Stale-collection sweep schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcConfig {
    /// Run the sweep at all.
    pub enabled: bool,
    /// Idle period before the schedule starts.
    pub initial_delay: Duration,
    /// Period between sweeps once started.
    pub period: Duration,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_delay: Duration::from_secs(10 * 60),
            period: Duration::from_secs(5 * 60),
        }
    }
}

/// Configuration for one [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Capacity of each per-kind intent channel. `dispatch` waits when a
    /// worker's queue is full.
    pub intent_channel_size: usize,
    pub gc: GcConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            intent_channel_size: 64,
            gc: GcConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Config with the GC timer switched off.
    #[must_use]
    pub fn without_gc(mut self) -> Self {
        self.gc.enabled = false;
        self
    }
}
