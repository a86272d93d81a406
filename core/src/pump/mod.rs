//! Display-refresh-clocked frame pump
//!
//! One [`FramePump::tick`] per display refresh runs exactly one core frame:
//!
//! ```text
//! ButtonTable ──snapshot──► set_button_state ×8
//!                                │
//!                              step
//!                                │
//!            framebuffer ──copy──► Framebuffer (dirty)
//!                                │
//!            drain_audio ──write─► AudioProducer ···► device callback
//!                                │
//!               upload (if dirty) + present ──► RenderSurface
//! ```
//!
//! No stage failure stops the tick. A failed step leaves the previous frame
//! on screen; a failed audio pull lets the device drain into silence.

mod config;
mod report;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

pub use config::PumpConfig;
pub use report::{PumpStats, Stage, TickReport};

use crate::audio::{AudioMetricsSnapshot, AudioProducer};
use crate::emu::{CoreError, EmulatorCore};
use crate::input::{Button, ButtonTable};
use crate::surface::{Framebuffer, RenderSurface};
use report::FailureLog;

/// Drives the core and routes its output to the host
pub struct FramePump<C: EmulatorCore = Box<dyn EmulatorCore>> {
    core: C,
    buttons: Arc<ButtonTable>,
    audio: AudioProducer,
    framebuffer: Framebuffer,
    config: PumpConfig,
    stats: PumpStats,
    failures: FailureLog,
    /// Scratch buffers reused for every audio drain
    left: Vec<f32>,
    right: Vec<f32>,
    last_metrics: AudioMetricsSnapshot,
    last_metrics_at: Instant,
}

impl<C: EmulatorCore> FramePump<C> {
    pub fn new(
        core: C,
        buttons: Arc<ButtonTable>,
        audio: AudioProducer,
        config: PumpConfig,
    ) -> Self {
        let info = core.info();
        let last_metrics = audio.metrics().snapshot();
        // A frame's worth of audio at 60 Hz, with headroom
        let scratch = (info.sample_rate / 30) as usize;

        Self {
            core,
            buttons,
            audio,
            framebuffer: Framebuffer::new(info.width, info.height),
            config,
            stats: PumpStats::default(),
            failures: FailureLog::default(),
            left: Vec::with_capacity(scratch),
            right: Vec::with_capacity(scratch),
            last_metrics,
            last_metrics_at: Instant::now(),
        }
    }

    /// Run one display refresh worth of emulation
    pub fn tick(&mut self, surface: &mut dyn RenderSurface) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport::default();

        self.push_buttons(&mut report);
        self.step(&mut report);
        self.pull_video(&mut report);
        self.pull_audio(&mut report);
        self.present(surface, &mut report);

        report.elapsed = start.elapsed();
        let over_budget = report.elapsed > self.config.cpu_budget;
        if over_budget {
            warn!(
                "Tick took {:?}, exceeds budget of {:?}",
                report.elapsed, self.config.cpu_budget
            );
        }
        self.stats.record(&report, over_budget);
        self.maybe_log_metrics();

        report
    }

    fn push_buttons(&mut self, report: &mut TickReport) {
        let snapshot = self.buttons.snapshot();
        let mut first_error = None;

        // Every button, every tick: the core sees level state, never edges
        for button in Button::ALL {
            if let Err(e) = self
                .core
                .set_button_state(button, snapshot.is_pressed(button))
            {
                first_error.get_or_insert(e);
            }
        }
        self.settle(Stage::Input, first_error.map_or(Ok(()), Err), report);
    }

    fn step(&mut self, report: &mut TickReport) {
        let result = self.core.step();
        report.stepped = result.is_ok();
        self.settle(Stage::Step, result, report);
    }

    fn pull_video(&mut self, report: &mut TickReport) {
        let expected = self.framebuffer.pixels().len();
        let result = self.core.framebuffer().and_then(|src| {
            if self.framebuffer.copy_from(src) {
                Ok(())
            } else {
                Err(CoreError::FrameSize {
                    expected,
                    actual: src.len(),
                })
            }
        });
        report.frame_updated = result.is_ok();
        self.settle(Stage::Video, result, report);
    }

    fn pull_audio(&mut self, report: &mut TickReport) {
        self.left.clear();
        self.right.clear();

        let result = self.core.drain_audio(&mut self.left, &mut self.right);
        if let Ok(count) = result
            && count > 0
        {
            report.samples = self.audio.write(&self.left, &self.right);
        }
        self.settle(Stage::Audio, result.map(|_| ()), report);
    }

    fn present(&mut self, surface: &mut dyn RenderSurface, report: &mut TickReport) {
        if self.framebuffer.is_dirty() {
            let result = surface.upload(&self.framebuffer);
            if result.is_ok() {
                // A failed upload stays dirty and is retried next tick
                self.framebuffer.clear_dirty();
                report.uploaded = true;
            }
            self.settle(Stage::Upload, result, report);
        }

        let result = surface.present();
        report.presented = result.is_ok();
        self.settle(Stage::Present, result, report);
    }

    fn settle<E: std::fmt::Display>(
        &mut self,
        stage: Stage,
        result: Result<(), E>,
        report: &mut TickReport,
    ) {
        match result {
            Ok(()) => self.failures.ok(stage),
            Err(e) => {
                report.record_failure(stage);
                self.failures.fail(stage, &e);
            }
        }
    }

    /// Log ring buffer health once per metrics interval
    fn maybe_log_metrics(&mut self) {
        if self.last_metrics_at.elapsed() < self.config.metrics_interval {
            return;
        }

        let now = self.audio.metrics().snapshot();
        let delta = now.since(&self.last_metrics);
        debug!(
            "Audio: written={}, read={}, underruns={} ({} silent), overruns={} ({} dropped), ticks={}",
            delta.samples_written,
            delta.samples_read,
            delta.underruns,
            delta.silent_samples,
            delta.overruns,
            delta.overwritten_samples,
            self.stats.ticks
        );

        self.last_metrics = now;
        self.last_metrics_at = Instant::now();
    }

    pub fn core(&self) -> &C {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut C {
        &mut self.core
    }

    /// Host copy of the last good frame
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    pub fn stats(&self) -> &PumpStats {
        &self.stats
    }

    pub fn config(&self) -> &PumpConfig {
        &self.config
    }

    pub fn audio_metrics(&self) -> AudioMetricsSnapshot {
        self.audio.metrics().snapshot()
    }

    /// Serialize core state; only call between ticks
    pub fn save_state(&mut self) -> Result<Vec<u8>, CoreError> {
        self.core.save_state()
    }

    /// Restore core state; only call between ticks
    pub fn load_state(&mut self, state: &[u8]) -> Result<(), CoreError> {
        self.core.load_state(state)?;
        // Show the restored machine on the next present even if the core
        // does not step successfully
        self.framebuffer.mark_dirty();
        Ok(())
    }
}
