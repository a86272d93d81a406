//! Frame pump configuration

use std::time::Duration;

/// Frame pump configuration
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Tick duration above which a warning is logged
    pub cpu_budget: Duration,
    /// How often the audio health summary is logged
    pub metrics_interval: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            cpu_budget: Duration::from_millis(12), // most of a 60 Hz refresh
            metrics_interval: Duration::from_secs(1),
        }
    }
}
