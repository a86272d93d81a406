//! Input state bridge
//!
//! Host input sources (keyboard events, polled gamepads) are folded into a
//! [`ButtonTable`] of level states. The frame pump snapshots the table once
//! per tick and pushes every button to the core. There is no event queue:
//! a button is either held or not at the moment the snapshot is taken.

mod bridge;
#[cfg(feature = "gamepad")]
mod gamepad;
mod keyboard_mapping;
mod keycode_serde;

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

pub use bridge::InputBridge;
#[cfg(feature = "gamepad")]
pub use gamepad::GamepadPoller;
pub use keyboard_mapping::KeyboardMapping;

/// Stick magnitude at which a direction registers as pressed
pub const DEFAULT_AXIS_THRESHOLD: f32 = 0.5;

/// Buttons of the emulated controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    Start,
    Select,
}

impl Button {
    pub const COUNT: usize = 8;

    /// Every button, in core index order
    pub const ALL: [Button; Self::COUNT] = [
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::A,
        Button::B,
        Button::Start,
        Button::Select,
    ];

    /// Index passed to the core's `set_button`
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The other direction of a d-pad pair
    pub const fn opposite(self) -> Option<Button> {
        match self {
            Button::Up => Some(Button::Down),
            Button::Down => Some(Button::Up),
            Button::Left => Some(Button::Right),
            Button::Right => Some(Button::Left),
            _ => None,
        }
    }

    const fn bit(self) -> u8 {
        1 << self.index()
    }
}

/// Plain copy of the button levels, one bit per [`Button`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ButtonSnapshot(u8);

impl ButtonSnapshot {
    pub const NONE: ButtonSnapshot = ButtonSnapshot(0);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_pressed(self, button: Button) -> bool {
        self.0 & button.bit() != 0
    }

    pub fn set(&mut self, button: Button, pressed: bool) {
        if pressed {
            self.0 |= button.bit();
        } else {
            self.0 &= !button.bit();
        }
    }

    #[must_use]
    pub fn with(mut self, button: Button, pressed: bool) -> Self {
        self.set(button, pressed);
        self
    }

    /// Held buttons, in core index order
    pub fn pressed(self) -> impl Iterator<Item = Button> {
        Button::ALL
            .into_iter()
            .filter(move |&button| self.is_pressed(button))
    }
}

impl FromIterator<Button> for ButtonSnapshot {
    fn from_iter<T: IntoIterator<Item = Button>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::NONE, |snapshot, button| snapshot.with(button, true))
    }
}

/// Shared level state, one atomic per button.
///
/// Written by [`InputBridge`] and read by the frame pump; typically held in
/// an `Arc`.
#[derive(Debug, Default)]
pub struct ButtonTable {
    states: [AtomicBool; Button::COUNT],
}

impl ButtonTable {
    pub fn set(&self, button: Button, pressed: bool) {
        self.states[button.index()].store(pressed, Ordering::Release);
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.states[button.index()].load(Ordering::Acquire)
    }

    /// Copy every button's level
    pub fn snapshot(&self) -> ButtonSnapshot {
        Button::ALL
            .into_iter()
            .filter(|&button| self.is_pressed(button))
            .collect()
    }

    /// Overwrite every button from a snapshot
    pub fn store(&self, snapshot: ButtonSnapshot) {
        for button in Button::ALL {
            self.set(button, snapshot.is_pressed(button));
        }
    }
}

/// Analog axes that drive d-pad directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// Positive is right
    Horizontal,
    /// Positive is down
    Vertical,
}

impl Axis {
    /// Directions selected by a negative and a positive deflection
    pub const fn directions(self) -> (Button, Button) {
        match self {
            Axis::Horizontal => (Button::Left, Button::Right),
            Axis::Vertical => (Button::Up, Button::Down),
        }
    }
}

/// One polled reading of a gamepad
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GamepadSnapshot {
    /// Digital buttons, including the d-pad
    pub buttons: ButtonSnapshot,
    /// Left stick X, positive right
    pub stick_x: f32,
    /// Left stick Y, positive down
    pub stick_y: f32,
}

/// Input configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    #[serde(default)]
    pub keyboard: KeyboardMapping,
    #[serde(default = "default_axis_threshold")]
    pub axis_threshold: f32,
}

fn default_axis_threshold() -> f32 {
    DEFAULT_AXIS_THRESHOLD
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            keyboard: KeyboardMapping::default(),
            axis_threshold: default_axis_threshold(),
        }
    }
}

impl InputConfig {
    /// Axis threshold in effect. Values outside `(0, 1]` would press a
    /// direction at rest or never press one, so they fall back to the default.
    pub fn threshold(&self) -> f32 {
        if self.threshold_is_valid() {
            self.axis_threshold
        } else {
            DEFAULT_AXIS_THRESHOLD
        }
    }

    pub fn threshold_is_valid(&self) -> bool {
        self.axis_threshold > 0.0 && self.axis_threshold <= 1.0
    }
}
