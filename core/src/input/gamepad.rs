//! Gamepad polling via gilrs

use gilrs::{Axis, Button as PadButton, EventType, GamepadId, Gilrs};
use tracing::{info, warn};

use super::{Button, ButtonSnapshot, GamepadSnapshot};

/// Tracks the first connected gamepad and reads it once per refresh
pub struct GamepadPoller {
    gilrs: Gilrs,
    active: Option<GamepadId>,
}

impl GamepadPoller {
    /// Returns `None` when the platform has no gamepad support
    pub fn new() -> Option<Self> {
        let gilrs = match Gilrs::new() {
            Ok(g) => g,
            Err(e) => {
                warn!(
                    "Failed to initialize gamepad support: {}. Gamepads will not be available.",
                    e
                );
                return None;
            }
        };

        // Pads already plugged in do not emit a Connected event
        let active = gilrs.gamepads().next().map(|(id, pad)| {
            info!("Using gamepad: {}", pad.name());
            id
        });

        Some(Self { gilrs, active })
    }

    /// Drain connection events and read the active pad, if any
    pub fn poll(&mut self) -> Option<GamepadSnapshot> {
        while let Some(event) = self.gilrs.next_event() {
            match event.event {
                EventType::Connected if self.active.is_none() => {
                    info!("Gamepad connected: {}", self.gilrs.gamepad(event.id).name());
                    self.active = Some(event.id);
                }
                EventType::Disconnected if self.active == Some(event.id) => {
                    info!("Gamepad disconnected");
                    self.active = self
                        .gilrs
                        .gamepads()
                        .map(|(id, _)| id)
                        .find(|&id| id != event.id);
                }
                _ => {}
            }
        }

        let pad = self.gilrs.connected_gamepad(self.active?)?;
        let btn = |button: PadButton| pad.is_pressed(button);

        let buttons = ButtonSnapshot::NONE
            .with(Button::Up, btn(PadButton::DPadUp))
            .with(Button::Down, btn(PadButton::DPadDown))
            .with(Button::Left, btn(PadButton::DPadLeft))
            .with(Button::Right, btn(PadButton::DPadRight))
            .with(Button::A, btn(PadButton::South))
            .with(Button::B, btn(PadButton::East))
            .with(Button::Start, btn(PadButton::Start))
            .with(Button::Select, btn(PadButton::Select));

        Some(GamepadSnapshot {
            buttons,
            stick_x: pad.value(Axis::LeftStickX),
            // gilrs reports up as positive
            stick_y: -pad.value(Axis::LeftStickY),
        })
    }
}
