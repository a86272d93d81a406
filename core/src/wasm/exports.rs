//! Export name resolution
//!
//! Cores built by different toolchains name the same entry point
//! differently. Each operation lists the names it accepts; the first one the
//! module exports wins. Resolution happens once, at load time.

use wasmtime::{Instance, Store, TypedFunc, WasmParams, WasmResults};

use super::CoreLoadError;

/// Accepted export names per operation, canonical name first
pub const EXPORT_ALIASES: &[(&str, &[&str])] = &[
    ("alloc", &["alloc", "malloc", "rb_alloc"]),
    ("load_rom", &["load_rom", "loadRom", "rb_load_rom"]),
    ("width", &["width", "screen_width", "get_width"]),
    ("height", &["height", "screen_height", "get_height"]),
    ("sample_rate", &["sample_rate", "audio_sample_rate", "get_sample_rate"]),
    ("step", &["step", "run_frame", "step_frame", "frame"]),
    ("framebuffer_ptr", &["framebuffer_ptr", "frame_buffer_ptr", "get_framebuffer"]),
    ("audio_samples", &["audio_samples", "audio_sample_count", "drain_audio"]),
    ("audio_left_ptr", &["audio_left_ptr", "audio_buffer_left"]),
    ("audio_right_ptr", &["audio_right_ptr", "audio_buffer_right"]),
    ("set_button", &["set_button", "set_button_state", "set_input"]),
    ("state_size", &["state_size", "save_state_size"]),
    ("save_state", &["save_state", "serialize_state"]),
    ("load_state", &["load_state", "deserialize_state"]),
];

/// Names accepted for an operation
pub fn aliases(op: &'static str) -> &'static [&'static str] {
    EXPORT_ALIASES
        .iter()
        .find(|(name, _)| *name == op)
        .map(|(_, names)| *names)
        .unwrap_or(&[])
}

/// Look up an optional export under any of its accepted names.
///
/// A name that exists with the wrong signature is an error rather than
/// a silent fallthrough to the next alias.
pub fn optional<T, P, R>(
    instance: &Instance,
    store: &mut Store<T>,
    op: &'static str,
) -> Result<Option<TypedFunc<P, R>>, CoreLoadError>
where
    P: WasmParams,
    R: WasmResults,
{
    for &name in aliases(op) {
        let Some(func) = instance.get_func(&mut *store, name) else {
            continue;
        };
        let typed = func
            .typed::<P, R>(&*store)
            .map_err(|e| CoreLoadError::Signature {
                op,
                name: name.to_string(),
                reason: format!("{:#}", e),
            })?;
        if name != op {
            tracing::debug!("Resolved core export '{}' as '{}'", op, name);
        }
        return Ok(Some(typed));
    }
    Ok(None)
}

/// Look up a required export under any of its accepted names
pub fn required<T, P, R>(
    instance: &Instance,
    store: &mut Store<T>,
    op: &'static str,
) -> Result<TypedFunc<P, R>, CoreLoadError>
where
    P: WasmParams,
    R: WasmResults,
{
    optional(instance, store, op)?.ok_or(CoreLoadError::MissingExport(op))
}
