//! Per-tick reports and accumulated pump statistics

use std::fmt;
use std::time::Duration;

/// Stages of one pump tick, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Input,
    Step,
    Video,
    Audio,
    Upload,
    Present,
}

impl Stage {
    pub const COUNT: usize = 6;

    pub const ALL: [Stage; Self::COUNT] = [
        Stage::Input,
        Stage::Step,
        Stage::Video,
        Stage::Audio,
        Stage::Upload,
        Stage::Present,
    ];

    const fn bit(self) -> u8 {
        1 << self as u8
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Input => "button push",
            Stage::Step => "step",
            Stage::Video => "video pull",
            Stage::Audio => "audio pull",
            Stage::Upload => "frame upload",
            Stage::Present => "present",
        };
        f.write_str(name)
    }
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// The core advanced one frame
    pub stepped: bool,
    /// A new frame was copied into the host framebuffer
    pub frame_updated: bool,
    /// Sample pairs written to the ring buffer
    pub samples: usize,
    /// The framebuffer was uploaded to the surface
    pub uploaded: bool,
    /// The surface presented
    pub presented: bool,
    /// Wall time spent in the tick
    pub elapsed: Duration,
    failed: u8,
}

impl TickReport {
    pub(super) fn record_failure(&mut self, stage: Stage) {
        self.failed |= stage.bit();
    }

    pub fn failed(&self, stage: Stage) -> bool {
        self.failed & stage.bit() != 0
    }

    /// True when every stage succeeded
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = Stage> + '_ {
        Stage::ALL.into_iter().filter(|&stage| self.failed(stage))
    }
}

/// Counters accumulated over the pump's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpStats {
    pub ticks: u64,
    pub frames_stepped: u64,
    pub frames_presented: u64,
    pub samples_pushed: u64,
    pub over_budget_ticks: u64,
    failures: [u64; Stage::COUNT],
}

impl PumpStats {
    pub(super) fn record(&mut self, report: &TickReport, over_budget: bool) {
        self.ticks += 1;
        self.frames_stepped += u64::from(report.stepped);
        self.frames_presented += u64::from(report.presented);
        self.samples_pushed += report.samples as u64;
        self.over_budget_ticks += u64::from(over_budget);
        for stage in report.failures() {
            self.failures[stage as usize] += 1;
        }
    }

    /// Ticks in which `stage` failed
    pub fn failures(&self, stage: Stage) -> u64 {
        self.failures[stage as usize]
    }
}

/// Logs the first failure of a streak loudly and the rest quietly
#[derive(Debug, Default)]
pub(super) struct FailureLog {
    streaks: [u64; Stage::COUNT],
}

impl FailureLog {
    pub fn fail(&mut self, stage: Stage, error: &dyn fmt::Display) {
        let streak = &mut self.streaks[stage as usize];
        if *streak == 0 {
            tracing::warn!("Frame pump {} failed, continuing: {}", stage, error);
        } else {
            tracing::trace!("Frame pump {} failed again ({} in a row): {}", stage, *streak + 1, error);
        }
        *streak += 1;
    }

    pub fn ok(&mut self, stage: Stage) {
        let streak = &mut self.streaks[stage as usize];
        if *streak > 0 {
            tracing::info!("Frame pump {} recovered after {} failed ticks", stage, *streak);
            *streak = 0;
        }
    }
}
