//! Keyboard to button mapping

use serde::{Deserialize, Serialize};
use winit::keyboard::KeyCode;

use super::Button;
use super::keycode_serde::{deserialize_keys, serialize_keys};

/// Keys bound to each button. Several keys may drive one button.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardMapping {
    #[serde(serialize_with = "serialize_keys", deserialize_with = "deserialize_keys")]
    pub up: Vec<KeyCode>,
    #[serde(serialize_with = "serialize_keys", deserialize_with = "deserialize_keys")]
    pub down: Vec<KeyCode>,
    #[serde(serialize_with = "serialize_keys", deserialize_with = "deserialize_keys")]
    pub left: Vec<KeyCode>,
    #[serde(serialize_with = "serialize_keys", deserialize_with = "deserialize_keys")]
    pub right: Vec<KeyCode>,
    #[serde(serialize_with = "serialize_keys", deserialize_with = "deserialize_keys")]
    pub a: Vec<KeyCode>,
    #[serde(serialize_with = "serialize_keys", deserialize_with = "deserialize_keys")]
    pub b: Vec<KeyCode>,
    #[serde(serialize_with = "serialize_keys", deserialize_with = "deserialize_keys")]
    pub start: Vec<KeyCode>,
    #[serde(serialize_with = "serialize_keys", deserialize_with = "deserialize_keys")]
    pub select: Vec<KeyCode>,
}

impl Default for KeyboardMapping {
    fn default() -> Self {
        Self {
            up: vec![KeyCode::ArrowUp],
            down: vec![KeyCode::ArrowDown],
            left: vec![KeyCode::ArrowLeft],
            right: vec![KeyCode::ArrowRight],
            a: vec![KeyCode::KeyZ],
            b: vec![KeyCode::KeyX],
            start: vec![KeyCode::Enter],
            select: vec![KeyCode::ShiftLeft, KeyCode::ShiftRight],
        }
    }
}

impl KeyboardMapping {
    /// Keys bound to a button
    pub fn keys(&self, button: Button) -> &[KeyCode] {
        match button {
            Button::Up => &self.up,
            Button::Down => &self.down,
            Button::Left => &self.left,
            Button::Right => &self.right,
            Button::A => &self.a,
            Button::B => &self.b,
            Button::Start => &self.start,
            Button::Select => &self.select,
        }
    }

    /// Button a key is bound to, if any.
    ///
    /// When a key is bound twice, the first button in [`Button::ALL`] order wins.
    pub fn button_for(&self, key: KeyCode) -> Option<Button> {
        Button::ALL
            .into_iter()
            .find(|&button| self.keys(button).contains(&key))
    }
}
