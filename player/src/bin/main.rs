//! RetroBridge - Standalone Player
//!
//! Runs a WebAssembly emulation core on a ROM in a window.
//!
//! # Usage
//!
//! ```bash
//! retrobridge cores/gb.wasm games/tetris.gb
//! retrobridge cores/gb.wasm --fullscreen        # pick the ROM in a dialog
//! retrobridge cores/gb.wasm game.gb --scale 4 --save-dir ./saves
//! ```
//!
//! # Keyboard Shortcuts
//!
//! - ESC: Quit
//! - F1-F4: Select save slot
//! - F5: Save to slot
//! - F9: Load from slot
//! - F8: Delete slot

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use retrobridge_player::{PlayerConfig, run};

#[derive(Parser)]
#[command(name = "retrobridge")]
#[command(
    author,
    version,
    about = "RetroBridge - host for sandboxed WebAssembly emulation cores"
)]
struct Args {
    /// Emulation core (.wasm)
    core: PathBuf,

    /// ROM to load; a file dialog opens when omitted
    rom: Option<PathBuf>,

    /// Start in fullscreen mode (borderless window)
    #[arg(long, short = 'f')]
    fullscreen: bool,

    /// Initial window size as a multiple of the core's resolution
    #[arg(long, short = 's')]
    scale: Option<u32>,

    /// Directory for save slots (default: platform data directory)
    #[arg(long, value_name = "DIR")]
    save_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if !args.core.exists() {
        anyhow::bail!("Core file not found: {}", args.core.display());
    }

    let rom_path = match args.rom {
        Some(path) => path,
        None => pick_rom()?,
    };
    if !rom_path.exists() {
        anyhow::bail!("ROM file not found: {}", rom_path.display());
    }

    tracing::info!("Starting RetroBridge player");

    run(PlayerConfig {
        core_path: args.core,
        rom_path,
        fullscreen: args.fullscreen,
        scale: args.scale,
        save_dir: args.save_dir,
    })
}

fn pick_rom() -> Result<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("ROM files", &["gb", "gbc", "gba", "nes", "sfc", "smc", "md", "bin"])
        .add_filter("All files", &["*"])
        .set_title("Select ROM")
        .pick_file()
        .ok_or_else(|| anyhow::anyhow!("No ROM selected"))
}
