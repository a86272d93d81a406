//! RetroBridge player - window, GPU surface and audio device for a session
//!
//! The binary (`retrobridge`) parses arguments and calls [`run`]; everything
//! else lives here so the pieces with no device dependency can be tested.

pub mod app;
pub mod audio;
pub mod graphics;

pub use app::{PlayerConfig, run};
