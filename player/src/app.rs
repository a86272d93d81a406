//! Windowed player: one session driven by the display refresh
//!
//! The window's `RedrawRequested` is the frame clock. With an AutoVsync
//! surface, presenting blocks until the next refresh, so requesting a new
//! redraw after every frame runs the core once per refresh.
//!
//! Save slots go through [`SaveStore`] on a small tokio runtime, one
//! operation at a time in the order the hotkeys were pressed. Results come
//! back over a channel and are applied between ticks, never inside one.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use retrobridge_core::config::{self, Config, RESERVED_KEYS};
use retrobridge_core::persist::PersistError;
use retrobridge_core::{RomImage, SaveStore, Session, SessionBuilder};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

use crate::audio::AudioOutput;
use crate::graphics::PlayerGraphics;

/// Number of quick-save slots (F1..F4)
pub const SLOT_COUNT: u8 = 4;

/// Launch options from the command line. `None` keeps the config file value.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub core_path: PathBuf,
    pub rom_path: PathBuf,
    pub fullscreen: bool,
    pub scale: Option<u32>,
    pub save_dir: Option<PathBuf>,
}

/// Load config, boot the session and run the window until it closes.
pub fn run(options: PlayerConfig) -> Result<()> {
    let mut settings = config::load();
    if options.fullscreen {
        settings.video.fullscreen = true;
    }
    if let Some(scale) = options.scale {
        settings.video.scale = scale.max(1);
    }
    if options.save_dir.is_some() {
        settings.storage.save_dir = options.save_dir.clone();
    }
    for warning in config::validate_keybindings(&settings) {
        tracing::warn!("{}", warning);
    }

    let core_wasm = std::fs::read(&options.core_path)
        .with_context(|| format!("Failed to read core {}", options.core_path.display()))?;
    let rom = RomImage::from_path(&options.rom_path)?;

    tracing::info!("Core: {}", options.core_path.display());
    tracing::info!("ROM: {} ({} bytes)", options.rom_path.display(), rom.len());

    let mut session = SessionBuilder::new(settings.clone())
        .rom(rom)
        .core_wasm(core_wasm)
        .build()?;

    #[cfg(feature = "gamepad")]
    session.input_mut().enable_gamepads();

    let save_dir = settings
        .storage
        .resolve_save_dir()
        .context("No save directory available, pass --save-dir")?;
    tracing::info!("Saves: {}", save_dir.display());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("retrobridge-io")
        .build()
        .context("Failed to start persistence runtime")?;

    let event_loop = EventLoop::new()?;
    let mut app = PlayerApp::new(session, settings, SaveStore::new(save_dir), runtime);
    event_loop.run_app(&mut app)?;

    Ok(())
}

/// Completion of a slot operation, returned to the event loop
enum SlotOutcome {
    Saved {
        slot: u8,
        result: Result<(), PersistError>,
    },
    Loaded {
        slot: u8,
        result: Result<Option<Vec<u8>>, PersistError>,
    },
    Deleted {
        slot: u8,
        result: Result<(), PersistError>,
    },
}

/// Runs slot operations one after another in submission order.
///
/// Each task awaits the one queued before it, so a quick load pressed right
/// after a quick save always reads the new blob.
#[derive(Default)]
struct SlotQueue {
    tail: Option<JoinHandle<()>>,
}

impl SlotQueue {
    fn push<F>(&mut self, runtime: &tokio::runtime::Handle, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let previous = self.tail.take();
        self.tail = Some(runtime.spawn(async move {
            if let Some(previous) = previous
                && let Err(e) = previous.await
            {
                tracing::error!("Slot task failed: {}", e);
            }
            task.await;
        }));
    }

    fn is_idle(&self) -> bool {
        self.tail.as_ref().is_none_or(|tail| tail.is_finished())
    }

    /// Last queued operation; it completes after every earlier one
    fn take(&mut self) -> Option<JoinHandle<()>> {
        self.tail.take()
    }
}

struct PlayerApp {
    session: Session,
    settings: Config,
    store: SaveStore,
    runtime: tokio::runtime::Runtime,
    outcome_tx: mpsc::UnboundedSender<SlotOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<SlotOutcome>,
    queue: SlotQueue,

    window: Option<Arc<Window>>,
    graphics: Option<PlayerGraphics>,
    audio: Option<AudioOutput>,

    slot: u8,
    /// Last slot message, shown in the title bar
    status: Option<String>,
}

impl PlayerApp {
    fn new(
        session: Session,
        settings: Config,
        store: SaveStore,
        runtime: tokio::runtime::Runtime,
    ) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            session,
            settings,
            store,
            runtime,
            outcome_tx,
            outcome_rx,
            queue: SlotQueue::default(),
            window: None,
            graphics: None,
            audio: None,
            slot: 1,
            status: None,
        }
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let info = self.session.info();
        let scale = self.settings.video.scale.max(1);

        let mut attributes = Window::default_attributes()
            .with_title(self.title())
            .with_inner_size(winit::dpi::LogicalSize::new(
                info.width * scale,
                info.height * scale,
            ))
            .with_min_inner_size(winit::dpi::LogicalSize::new(info.width, info.height));
        if self.settings.video.fullscreen {
            attributes = attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = Arc::new(event_loop.create_window(attributes)?);
        let graphics = PlayerGraphics::new(
            window.clone(),
            info.width,
            info.height,
            self.settings.video.scale_mode,
        )?;

        // No sound is not fatal; the pump keeps overwriting the ring
        if let Some(consumer) = self.session.take_audio_consumer() {
            match AudioOutput::new(consumer, info.sample_rate, self.settings.audio.volume()) {
                Ok(audio) => self.audio = Some(audio),
                Err(e) => tracing::warn!("Audio unavailable, running silent: {:#}", e),
            }
        }

        window.request_redraw();
        self.window = Some(window);
        self.graphics = Some(graphics);
        Ok(())
    }

    fn frame(&mut self) {
        self.apply_outcomes();

        #[cfg(feature = "gamepad")]
        self.session.input_mut().poll_gamepads();

        if let Some(graphics) = self.graphics.as_mut() {
            self.session.tick(graphics);
        }
    }

    fn key_event(&mut self, event: &KeyEvent, event_loop: &ActiveEventLoop) {
        let PhysicalKey::Code(key) = event.physical_key else {
            return;
        };
        let pressed = event.state == ElementState::Pressed;

        if RESERVED_KEYS.contains(&key) {
            if pressed && !event.repeat {
                self.hotkey(key, event_loop);
            }
            return;
        }
        self.session.input_mut().key_event(key, pressed);
    }

    fn hotkey(&mut self, key: KeyCode, event_loop: &ActiveEventLoop) {
        match key {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::F1 => self.select_slot(1),
            KeyCode::F2 => self.select_slot(2),
            KeyCode::F3 => self.select_slot(3),
            KeyCode::F4 => self.select_slot(4),
            KeyCode::F5 => self.save_slot(),
            KeyCode::F9 => self.load_slot(),
            KeyCode::F8 => self.delete_slot(),
            _ => {}
        }
    }

    fn select_slot(&mut self, slot: u8) {
        self.slot = slot.clamp(1, SLOT_COUNT);
        self.set_status(format!("Slot {} selected", self.slot));
    }

    fn save_slot(&mut self) {
        let slot = self.slot;
        let state = match self.session.snapshot_state() {
            Ok(state) => state,
            Err(e) => {
                tracing::error!("Cannot save slot {}: {}", slot, e);
                self.set_status(format!("Save failed: {}", e));
                return;
            }
        };

        let key = self.session.save_key(slot);
        let store = self.store.clone();
        let tx = self.outcome_tx.clone();
        self.spawn(async move {
            let result = store.save(&key, state).await;
            let _ = tx.send(SlotOutcome::Saved { slot, result });
        });
    }

    fn load_slot(&mut self) {
        let slot = self.slot;
        let key = self.session.save_key(slot);
        let store = self.store.clone();
        let tx = self.outcome_tx.clone();
        self.spawn(async move {
            let result = store.load(&key).await;
            let _ = tx.send(SlotOutcome::Loaded { slot, result });
        });
    }

    fn delete_slot(&mut self) {
        let slot = self.slot;
        let key = self.session.save_key(slot);
        let store = self.store.clone();
        let tx = self.outcome_tx.clone();
        self.spawn(async move {
            let result = store.delete(&key).await;
            let _ = tx.send(SlotOutcome::Deleted { slot, result });
        });
    }

    fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.queue.push(self.runtime.handle(), task);
    }

    /// Apply finished slot operations. Runs between ticks.
    fn apply_outcomes(&mut self) {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            let status = match outcome {
                SlotOutcome::Saved { slot, result: Ok(()) } => {
                    tracing::info!("Saved slot {}", slot);
                    format!("Saved slot {}", slot)
                }
                SlotOutcome::Loaded {
                    slot,
                    result: Ok(Some(state)),
                } => match self.session.restore_state(&state) {
                    Ok(()) => {
                        tracing::info!("Loaded slot {}", slot);
                        format!("Loaded slot {}", slot)
                    }
                    Err(e) => {
                        tracing::error!("Core rejected slot {}: {}", slot, e);
                        format!("Load failed: {}", e)
                    }
                },
                SlotOutcome::Loaded {
                    slot,
                    result: Ok(None),
                } => {
                    tracing::info!("Slot {} is empty", slot);
                    format!("Slot {} is empty", slot)
                }
                SlotOutcome::Deleted { slot, result: Ok(()) } => {
                    tracing::info!("Deleted slot {}", slot);
                    format!("Deleted slot {}", slot)
                }
                SlotOutcome::Saved {
                    slot,
                    result: Err(e),
                }
                | SlotOutcome::Deleted {
                    slot,
                    result: Err(e),
                }
                | SlotOutcome::Loaded {
                    slot,
                    result: Err(e),
                } => {
                    tracing::error!("Slot {} operation failed: {}", slot, e);
                    format!("Slot {} error: {}", slot, e)
                }
            };
            self.set_status(status);
        }
    }

    fn set_status(&mut self, status: String) {
        self.status = Some(status);
        if let Some(window) = &self.window {
            window.set_title(&self.title());
        }
    }

    fn title(&self) -> String {
        let base = format!("RetroBridge - {} [slot {}]", self.session.rom_id(), self.slot);
        match &self.status {
            Some(status) => format!("{} - {}", base, status),
            None => base,
        }
    }

    /// Wait for in-flight saves so quitting right after F5 keeps the slot
    fn flush(&mut self) {
        if !self.queue.is_idle() {
            tracing::info!("Waiting for pending slot operations");
        }
        let Some(tail) = self.queue.take() else {
            return;
        };
        if let Err(e) = self.runtime.block_on(tail) {
            tracing::error!("Slot task failed: {}", e);
        }
        self.apply_outcomes();
    }
}

impl ApplicationHandler for PlayerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init_window(event_loop) {
            tracing::error!("Failed to initialize window: {:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                tracing::info!("Window close requested");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(graphics) = self.graphics.as_mut() {
                    graphics.resize(size.width, size.height);
                }
            }
            WindowEvent::Focused(false) => {
                // Keys released while unfocused would otherwise stay held
                self.session.input_mut().release_all();
            }
            WindowEvent::KeyboardInput { event, .. } => self.key_event(&event, event_loop),
            WindowEvent::RedrawRequested => self.frame(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.flush();
        // Stop the device before the session goes away
        self.audio = None;
    }
}
