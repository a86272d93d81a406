//! Tests for the frame pump

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::bail;

use super::*;
use crate::audio::{AudioConsumer, AudioRingBuffer, SamplePair};
use crate::emu::CoreInfo;
use crate::input::ButtonSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Buttons(u8),
    Step,
    Video,
    Audio,
    Upload,
    Present,
}

type CallLog = Rc<RefCell<Vec<Call>>>;

/// Core that records calls and fails on demand
struct MockCore {
    log: CallLog,
    frame: Vec<u8>,
    frame_no: u8,
    pending_buttons: ButtonSnapshot,
    fail_step: bool,
    fail_video: bool,
    fail_audio: bool,
    fail_buttons: bool,
    wrong_frame_size: bool,
    samples_per_step: usize,
    pending_samples: usize,
}

impl MockCore {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            frame: vec![0; 2 * 2 * 4],
            frame_no: 0,
            pending_buttons: ButtonSnapshot::NONE,
            fail_step: false,
            fail_video: false,
            fail_audio: false,
            fail_buttons: false,
            wrong_frame_size: false,
            samples_per_step: 3,
            pending_samples: 0,
        }
    }
}

impl EmulatorCore for MockCore {
    fn info(&self) -> CoreInfo {
        CoreInfo::new(2, 2)
    }

    fn step(&mut self) -> Result<(), CoreError> {
        self.log
            .borrow_mut()
            .push(Call::Buttons(self.pending_buttons.bits()));
        self.log.borrow_mut().push(Call::Step);
        if self.fail_step {
            return Err(CoreError::Trap("unreachable".into()));
        }
        self.frame_no += 1;
        self.frame[0] = self.frame_no;
        self.pending_samples += self.samples_per_step;
        Ok(())
    }

    fn framebuffer(&mut self) -> Result<&[u8], CoreError> {
        self.log.borrow_mut().push(Call::Video);
        if self.fail_video {
            return Err(CoreError::OutOfBounds {
                what: "framebuffer",
                offset: 0,
                len: 16,
            });
        }
        if self.wrong_frame_size {
            return Ok(&self.frame[..4]);
        }
        Ok(&self.frame)
    }

    fn drain_audio(
        &mut self,
        left: &mut Vec<f32>,
        right: &mut Vec<f32>,
    ) -> Result<usize, CoreError> {
        self.log.borrow_mut().push(Call::Audio);
        if self.fail_audio {
            return Err(CoreError::Trap("audio".into()));
        }
        let count = std::mem::take(&mut self.pending_samples);
        let value = f32::from(self.frame_no) / 10.0;
        left.extend(std::iter::repeat_n(value, count));
        right.extend(std::iter::repeat_n(-value, count));
        Ok(count)
    }

    fn set_button_state(&mut self, button: Button, pressed: bool) -> Result<(), CoreError> {
        if self.fail_buttons {
            return Err(CoreError::Trap("set_button".into()));
        }
        self.pending_buttons.set(button, pressed);
        Ok(())
    }
}

/// Surface that records calls and fails on demand
struct MockSurface {
    log: CallLog,
    fail_upload: bool,
    fail_present: bool,
    last_upload: Option<Vec<u8>>,
}

impl MockSurface {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            fail_upload: false,
            fail_present: false,
            last_upload: None,
        }
    }
}

impl RenderSurface for MockSurface {
    fn upload(&mut self, frame: &Framebuffer) -> anyhow::Result<()> {
        self.log.borrow_mut().push(Call::Upload);
        if self.fail_upload {
            bail!("device lost");
        }
        self.last_upload = Some(frame.pixels().to_vec());
        Ok(())
    }

    fn present(&mut self) -> anyhow::Result<()> {
        self.log.borrow_mut().push(Call::Present);
        if self.fail_present {
            bail!("surface outdated");
        }
        Ok(())
    }
}

struct Harness {
    pump: FramePump<MockCore>,
    surface: MockSurface,
    table: Arc<ButtonTable>,
    consumer: AudioConsumer,
    log: CallLog,
}

fn harness() -> Harness {
    let log = CallLog::default();
    let table = Arc::new(ButtonTable::default());
    let (producer, consumer) = AudioRingBuffer::new(64);
    let pump = FramePump::new(
        MockCore::new(log.clone()),
        table.clone(),
        producer,
        PumpConfig::default(),
    );

    Harness {
        pump,
        surface: MockSurface::new(log.clone()),
        table,
        consumer,
        log,
    }
}

impl Harness {
    fn tick(&mut self) -> TickReport {
        self.log.borrow_mut().clear();
        self.pump.tick(&mut self.surface)
    }

    fn calls(&self) -> Vec<Call> {
        self.log.borrow().clone()
    }
}

const CLEAN_ORDER: [Call; 6] = [
    Call::Buttons(0),
    Call::Step,
    Call::Video,
    Call::Audio,
    Call::Upload,
    Call::Present,
];

#[test]
fn test_tick_runs_stages_in_order() {
    let mut h = harness();

    let report = h.tick();

    assert_eq!(h.calls(), CLEAN_ORDER);
    assert!(report.is_clean());
    assert!(report.stepped && report.frame_updated && report.uploaded && report.presented);
    assert_eq!(report.samples, 3);
}

#[test]
fn test_step_failure_keeps_order_and_previous_frame() {
    let mut h = harness();
    h.tick();

    h.pump.core_mut().fail_step = true;
    let report = h.tick();

    // Pulls still happen; the core's buffer is unchanged so the frame is too
    assert_eq!(h.calls(), CLEAN_ORDER);
    assert!(report.failed(Stage::Step));
    assert!(!report.stepped);
    assert!(report.presented);
    assert_eq!(h.pump.framebuffer().pixels()[0], 1);
    assert_eq!(report.samples, 0);
}

#[test]
fn test_video_failure_presents_previous_frame() {
    let mut h = harness();
    h.tick();

    h.pump.core_mut().fail_video = true;
    let report = h.tick();

    assert_eq!(
        h.calls(),
        vec![Call::Buttons(0), Call::Step, Call::Video, Call::Audio, Call::Present]
    );
    assert!(report.failed(Stage::Video));
    assert!(!report.uploaded);
    assert!(report.presented);
    assert_eq!(h.pump.framebuffer().pixels()[0], 1);
}

#[test]
fn test_wrong_frame_size_is_a_pull_failure() {
    let mut h = harness();
    h.pump.core_mut().wrong_frame_size = true;

    let report = h.tick();

    assert!(report.failed(Stage::Video));
    assert!(!report.frame_updated);
    // Initial black frame is still uploaded once
    assert_eq!(h.surface.last_upload.as_deref(), Some(&[0u8; 16][..]));
}

#[test]
fn test_audio_failure_continues_to_present() {
    let mut h = harness();
    h.pump.core_mut().fail_audio = true;

    let report = h.tick();

    assert_eq!(h.calls(), CLEAN_ORDER);
    assert!(report.failed(Stage::Audio));
    assert_eq!(h.consumer.available(), 0);
}

#[test]
fn test_every_stage_failing_still_presents() {
    let mut h = harness();
    {
        let core = h.pump.core_mut();
        core.fail_buttons = true;
        core.fail_step = true;
        core.fail_video = true;
        core.fail_audio = true;
    }
    h.surface.fail_upload = true;
    h.surface.fail_present = true;

    let report = h.tick();

    assert_eq!(
        h.calls(),
        vec![Call::Buttons(0), Call::Step, Call::Video, Call::Audio, Call::Upload, Call::Present]
    );
    assert_eq!(report.failures().count(), Stage::COUNT);
    assert_eq!(h.pump.stats().failures(Stage::Present), 1);
}

#[test]
fn test_failed_upload_is_retried_next_tick() {
    let mut h = harness();
    h.surface.fail_upload = true;
    h.pump.core_mut().fail_video = true;
    let report = h.tick();
    assert!(report.failed(Stage::Upload));
    assert!(h.pump.framebuffer().is_dirty());

    h.surface.fail_upload = false;
    let report = h.tick();

    assert!(report.uploaded);
    assert!(!h.pump.framebuffer().is_dirty());
}

#[test]
fn test_clean_frame_is_not_reuploaded() {
    let mut h = harness();
    h.tick();
    h.pump.core_mut().fail_video = true;

    let report = h.tick();
    let report_again = h.tick();

    assert!(!report.uploaded);
    assert!(!report_again.uploaded);
    assert!(report_again.presented);
}

#[test]
fn test_buttons_pushed_every_tick() {
    let mut h = harness();
    h.table.set(Button::A, true);
    h.table.set(Button::Right, true);

    h.tick();
    let first = h.calls()[0];
    h.tick();

    // Same level pushed again, no edge required
    assert_eq!(h.calls()[0], first);
    assert_eq!(
        first,
        Call::Buttons(
            ButtonSnapshot::NONE
                .with(Button::A, true)
                .with(Button::Right, true)
                .bits()
        )
    );

    h.table.set(Button::A, false);
    h.tick();
    assert_eq!(
        h.calls()[0],
        Call::Buttons(ButtonSnapshot::NONE.with(Button::Right, true).bits())
    );
}

#[test]
fn test_audio_reaches_consumer_in_order() {
    let mut h = harness();

    h.tick();
    h.tick();
    let out = h.consumer.read(8);

    let lefts: Vec<f32> = out.iter().map(|s| s.left).collect();
    assert_eq!(lefts, vec![0.1, 0.1, 0.1, 0.2, 0.2, 0.2, 0.0, 0.0]);
    assert_eq!(out[0], SamplePair::new(0.1, -0.1));
}

#[test]
fn test_stats_accumulate() {
    let mut h = harness();
    h.tick();
    h.pump.core_mut().fail_step = true;
    h.tick();
    h.tick();

    let stats = h.pump.stats();
    assert_eq!(stats.ticks, 3);
    assert_eq!(stats.frames_stepped, 1);
    assert_eq!(stats.frames_presented, 3);
    assert_eq!(stats.samples_pushed, 3);
    assert_eq!(stats.failures(Stage::Step), 2);
    assert_eq!(stats.failures(Stage::Video), 0);
}

#[test]
fn test_load_state_marks_frame_dirty() {
    let mut h = harness();
    h.tick();
    assert!(!h.pump.framebuffer().is_dirty());

    // Mock core has no save-state support
    assert!(matches!(
        h.pump.load_state(&[1, 2, 3]),
        Err(CoreError::Unsupported(_))
    ));
    assert!(!h.pump.framebuffer().is_dirty());
}

#[test]
fn test_boxed_core_is_accepted() {
    let log = CallLog::default();
    let (producer, _consumer) = AudioRingBuffer::new(8);
    let core: Box<dyn EmulatorCore> = Box::new(MockCore::new(log.clone()));
    let mut pump: FramePump = FramePump::new(
        core,
        Arc::new(ButtonTable::default()),
        producer,
        PumpConfig::default(),
    );
    let mut surface = MockSurface::new(log);

    assert!(pump.tick(&mut surface).is_clean());
}
