//! Keyboard and gamepad layers folded into the shared button table

use std::sync::Arc;

use hashbrown::HashSet;
use winit::keyboard::KeyCode;

#[cfg(feature = "gamepad")]
use super::GamepadPoller;
use super::{Axis, Button, ButtonSnapshot, ButtonTable, GamepadSnapshot, InputConfig};

/// Maintains the [`ButtonTable`] from host input.
///
/// Published level per button is `keyboard || gamepad`, except that a
/// deflected stick forces the opposite direction of its pair released.
pub struct InputBridge {
    table: Arc<ButtonTable>,
    config: InputConfig,

    /// Keys currently held, mapped or not
    held_keys: HashSet<KeyCode>,
    /// Gamepad digital buttons from the last poll
    pad_buttons: ButtonSnapshot,
    /// Direction currently selected by each stick axis
    horizontal: Option<Button>,
    vertical: Option<Button>,

    #[cfg(feature = "gamepad")]
    poller: Option<GamepadPoller>,
}

impl InputBridge {
    /// Create a bridge with its own button table. Gamepads are not polled
    /// until [`enable_gamepads`](Self::enable_gamepads) is called.
    pub fn new(config: InputConfig) -> Self {
        Self::with_table(config, Arc::default())
    }

    pub fn with_table(config: InputConfig, table: Arc<ButtonTable>) -> Self {
        Self {
            table,
            config,
            held_keys: HashSet::new(),
            pad_buttons: ButtonSnapshot::NONE,
            horizontal: None,
            vertical: None,
            #[cfg(feature = "gamepad")]
            poller: None,
        }
    }

    /// Shared table the frame pump reads from
    pub fn table(&self) -> &Arc<ButtonTable> {
        &self.table
    }

    pub fn config(&self) -> &InputConfig {
        &self.config
    }

    /// Record a key transition. Returns `false` for unmapped keys.
    ///
    /// Key repeat re-asserts the same level and changes nothing.
    pub fn key_event(&mut self, key: KeyCode, pressed: bool) -> bool {
        if self.config.keyboard.button_for(key).is_none() {
            return false;
        }

        if pressed {
            self.held_keys.insert(key);
        } else {
            self.held_keys.remove(&key);
        }
        self.publish();
        true
    }

    /// Set the direction selected by an analog axis.
    ///
    /// Below the threshold (or NaN) both directions of the pair are released.
    pub fn apply_axis(&mut self, axis: Axis, value: f32) {
        let (negative, positive) = axis.directions();
        let threshold = self.config.threshold();

        let direction = if value >= threshold {
            Some(positive)
        } else if value <= -threshold {
            Some(negative)
        } else {
            None
        };

        match axis {
            Axis::Horizontal => self.horizontal = direction,
            Axis::Vertical => self.vertical = direction,
        }
        self.publish();
    }

    /// Replace the gamepad layer with a polled reading
    pub fn apply_gamepad(&mut self, snapshot: &GamepadSnapshot) {
        self.pad_buttons = snapshot.buttons;
        self.apply_axis(Axis::Horizontal, snapshot.stick_x);
        self.apply_axis(Axis::Vertical, snapshot.stick_y);
    }

    /// Start polling connected gamepads on each [`poll_gamepads`](Self::poll_gamepads)
    #[cfg(feature = "gamepad")]
    pub fn enable_gamepads(&mut self) {
        if self.poller.is_none() {
            self.poller = GamepadPoller::new();
        }
    }

    /// Drain gamepad events and apply the active pad.
    ///
    /// Without a connected pad the gamepad layer is released.
    #[cfg(feature = "gamepad")]
    pub fn poll_gamepads(&mut self) {
        let Some(poller) = self.poller.as_mut() else {
            return;
        };
        let snapshot = poller.poll().unwrap_or_default();
        self.apply_gamepad(&snapshot);
    }

    /// Release everything, e.g. when the window loses focus
    pub fn release_all(&mut self) {
        self.held_keys.clear();
        self.pad_buttons = ButtonSnapshot::NONE;
        self.horizontal = None;
        self.vertical = None;
        self.publish();
    }

    /// Buttons held through the keyboard layer
    pub fn keyboard_buttons(&self) -> ButtonSnapshot {
        Button::ALL
            .into_iter()
            .filter(|&button| {
                self.config
                    .keyboard
                    .keys(button)
                    .iter()
                    .any(|key| self.held_keys.contains(key))
            })
            .collect()
    }

    /// Combined level state, as it is published to the table
    pub fn resolved(&self) -> ButtonSnapshot {
        let mut state = ButtonSnapshot::from_bits(
            self.keyboard_buttons().bits() | self.pad_buttons.bits(),
        );

        for direction in [self.horizontal, self.vertical].into_iter().flatten() {
            state.set(direction, true);
            if let Some(opposite) = direction.opposite() {
                state.set(opposite, false);
            }
        }
        state
    }

    fn publish(&self) {
        self.table.store(self.resolved());
    }
}
