//! Configuration management (`config.toml`)
//!
//! Settings live in TOML in the platform-specific config directory. A
//! missing or unparsable file yields defaults; unknown keys are ignored and
//! missing keys take their default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use winit::keyboard::KeyCode;

use crate::input::{Button, InputConfig};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub video: VideoConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Scaling mode for the core's framebuffer in the window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ScaleMode {
    /// Fill the window (may distort aspect ratio)
    Stretch,
    /// Largest size that keeps aspect ratio (letterboxed)
    Fit,
    /// Largest integer multiple that fits
    #[default]
    PixelPerfect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoConfig {
    #[serde(default)]
    pub fullscreen: bool,
    /// Initial window size as a multiple of the core's resolution
    #[serde(default = "default_scale")]
    pub scale: u32,
    #[serde(default)]
    pub scale_mode: ScaleMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Ring buffer length in milliseconds
    #[serde(default = "default_buffer_ms")]
    pub buffer_ms: u32,
    /// Output gain (0.0-1.0)
    #[serde(default = "default_volume")]
    pub master_volume: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// Save directory; defaults to `<data dir>/saves`
    #[serde(default)]
    pub save_dir: Option<PathBuf>,
}

fn default_scale() -> u32 {
    3
}
fn default_buffer_ms() -> u32 {
    1000
}
fn default_volume() -> f32 {
    0.8
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            fullscreen: false,
            scale: default_scale(),
            scale_mode: ScaleMode::default(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            buffer_ms: default_buffer_ms(),
            master_volume: default_volume(),
        }
    }
}

impl AudioConfig {
    /// Ring buffer length, at least one millisecond
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.buffer_ms.max(1)))
    }

    /// Volume clamped to 0.0-1.0; NaN is treated as muted
    pub fn volume(&self) -> f32 {
        if self.master_volume.is_nan() {
            0.0
        } else {
            self.master_volume.clamp(0.0, 1.0)
        }
    }
}

impl StorageConfig {
    /// Configured save directory, or the platform default
    pub fn resolve_save_dir(&self) -> Option<PathBuf> {
        self.save_dir
            .clone()
            .or_else(|| data_dir().map(|dir| dir.join("saves")))
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("io", "retrobridge", "RetroBridge")
}

/// Platform configuration directory, `None` if the home directory is unknown.
///
/// On Linux: `~/.config/retrobridge`
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Platform data directory, `None` if the home directory is unknown.
///
/// On Linux: `~/.local/share/retrobridge`
pub fn data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Load `config.toml` from the platform config directory
pub fn load() -> Config {
    config_dir()
        .map(|dir| load_or_create(&dir.join("config.toml")))
        .unwrap_or_default()
}

/// Load a config file, writing the defaults there first if it does not exist
pub fn load_or_create(path: &Path) -> Config {
    if path.exists() {
        return load_from(path);
    }

    let config = Config::default();
    match save_to(&config, path) {
        Ok(()) => tracing::info!("Wrote default config to {}", path.display()),
        Err(e) => tracing::warn!("Failed to write {}: {}", path.display(), e),
    }
    config
}

/// Load a config file, falling back to defaults on any error
pub fn load_from(path: &Path) -> Config {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
            }
            return Config::default();
        }
    };

    match toml::from_str(&content) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
            Config::default()
        }
    }
}

/// Write a config file, creating its directory
pub fn save_to(config: &Config, path: &Path) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let content = toml::to_string_pretty(config).map_err(std::io::Error::other)?;
    std::fs::write(path, content)
}

/// Keys the player reserves for quit, slots and quick save/load
pub const RESERVED_KEYS: [KeyCode; 8] = [
    KeyCode::Escape,
    KeyCode::F1,
    KeyCode::F2,
    KeyCode::F3,
    KeyCode::F4,
    KeyCode::F5,
    KeyCode::F8,
    KeyCode::F9,
];

/// Warnings for keyboard bindings that clash with reserved keys or with
/// each other, and for an unusable axis threshold
pub fn validate_keybindings(config: &Config) -> Vec<String> {
    let mapping = &config.input.keyboard;
    let mut warnings = Vec::new();

    if !config.input.threshold_is_valid() {
        warnings.push(format!(
            "axis_threshold {} is outside (0, 1], using {}",
            config.input.axis_threshold,
            config.input.threshold()
        ));
    }
    let mut seen: hashbrown::HashMap<KeyCode, Button> = hashbrown::HashMap::new();

    for button in Button::ALL {
        for &key in mapping.keys(button) {
            if RESERVED_KEYS.contains(&key) {
                warnings.push(format!(
                    "{:?} key {:?} is reserved by the player and will be ignored",
                    button, key
                ));
            } else if let Some(other) = seen.insert(key, button) {
                warnings.push(format!(
                    "{:?} key {:?} is also bound to {:?}",
                    button, key, other
                ));
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();

        assert_eq!(config.video.scale, 3);
        assert_eq!(config.video.scale_mode, ScaleMode::PixelPerfect);
        assert!(!config.video.fullscreen);
        assert_eq!(config.audio.buffer_ms, 1000);
        assert_eq!(config.audio.master_volume, 0.8);
        assert_eq!(config.input.axis_threshold, 0.5);
        assert_eq!(config.storage.save_dir, None);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [video]
            scale_mode = "Fit"

            [audio]
            buffer_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.video.scale_mode, ScaleMode::Fit);
        assert_eq!(config.video.scale, 3);
        assert_eq!(config.audio.buffer_duration(), Duration::from_millis(250));
        assert_eq!(config.audio.master_volume, 0.8);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.video.fullscreen = true;
        config.input.keyboard.a = vec![KeyCode::KeyJ];
        config.storage.save_dir = Some(dir.path().join("saves"));

        save_to(&config, &path).unwrap();

        assert_eq!(load_from(&path), config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_from(&dir.path().join("absent.toml")), Config::default());
    }

    #[test]
    fn test_garbage_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is [not toml").unwrap();

        assert_eq!(load_from(&path), Config::default());
    }

    #[test]
    fn test_volume_is_clamped() {
        let mut audio = AudioConfig::default();
        audio.master_volume = 3.0;
        assert_eq!(audio.volume(), 1.0);
        audio.master_volume = -1.0;
        assert_eq!(audio.volume(), 0.0);
        audio.master_volume = f32::NAN;
        assert_eq!(audio.volume(), 0.0);
    }

    #[test]
    fn test_zero_buffer_is_raised() {
        let audio = AudioConfig {
            buffer_ms: 0,
            master_volume: 1.0,
        };
        assert_eq!(audio.buffer_duration(), Duration::from_millis(1));
    }

    #[test]
    fn test_explicit_save_dir_wins() {
        let storage = StorageConfig {
            save_dir: Some(PathBuf::from("/tmp/somewhere")),
        };
        assert_eq!(
            storage.resolve_save_dir(),
            Some(PathBuf::from("/tmp/somewhere"))
        );
    }

    #[test]
    fn test_default_bindings_have_no_conflicts() {
        assert!(validate_keybindings(&Config::default()).is_empty());
    }

    #[test]
    fn test_conflicting_bindings_are_reported() {
        let mut config = Config::default();
        config.input.keyboard.a = vec![KeyCode::F5];
        config.input.keyboard.b = vec![KeyCode::ArrowUp];

        let warnings = validate_keybindings(&config);

        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().any(|w| w.contains("reserved")));
        assert!(warnings.iter().any(|w| w.contains("also bound to Up")));
    }

    #[test]
    fn test_partial_keyboard_table_keeps_other_sections() {
        let config: Config = toml::from_str(
            r#"
            [video]
            scale = 5

            [input.keyboard]
            a = "J"
            "#,
        )
        .unwrap();

        assert_eq!(config.video.scale, 5);
        assert_eq!(config.input.keyboard.a, vec![KeyCode::KeyJ]);
        assert_eq!(config.input.keyboard.up, vec![KeyCode::ArrowUp]);
        assert_eq!(config.input.keyboard.b, vec![KeyCode::KeyX]);
    }

    #[test]
    fn test_extended_key_bindings_survive_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.video.scale = 4;
        config.input.keyboard.a = vec![KeyCode::F6];
        config.input.keyboard.b = vec![KeyCode::Home, KeyCode::PageUp];

        save_to(&config, &path).unwrap();

        assert_eq!(load_from(&path), config);
    }

    #[test]
    fn test_unnamed_key_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.input.keyboard.a = vec![KeyCode::F24];

        assert!(save_to(&config, &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_first_load_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retrobridge").join("config.toml");

        assert_eq!(load_or_create(&path), Config::default());
        assert!(path.exists());
        assert_eq!(load_from(&path), Config::default());
    }

    #[test]
    fn test_existing_file_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[video]\nscale = 2\n").unwrap();

        assert_eq!(load_or_create(&path).video.scale, 2);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[video]\nscale = 2\n");
    }

    #[test]
    fn test_bad_axis_threshold_is_reported() {
        for value in [0.0, -0.3, 1.5, f32::NAN] {
            let mut config = Config::default();
            config.input.axis_threshold = value;

            let warnings = validate_keybindings(&config);

            assert_eq!(warnings.len(), 1, "threshold {}", value);
            assert!(warnings[0].contains("axis_threshold"));
        }
    }
}
