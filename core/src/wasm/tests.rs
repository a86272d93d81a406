//! Tests for the WASM core adapter

use super::*;
use crate::emu::{CoreError, EmulatorCore};
use crate::input::Button;
use crate::rom::RomImage;

/// A 2x2 core. Each step writes the frame counter, the button bitmask and
/// the first ROM byte into pixel 0, and produces two stereo samples.
const TEST_CORE: &str = r#"
(module
    (import "env" "log" (func $log (param i32 i32)))
    (memory (export "memory") 1)
    (data (i32.const 512) "stepped")

    (global $heap (mut i32) (i32.const 1024))
    (global $frame (mut i32) (i32.const 0))
    (global $buttons (mut i32) (i32.const 0))
    (global $rom_byte (mut i32) (i32.const 0))
    (global $pending (mut i32) (i32.const 0))

    (func (export "alloc") (param $len i32) (result i32)
        (local $ptr i32)
        (local.set $ptr (global.get $heap))
        (global.set $heap (i32.add (global.get $heap) (local.get $len)))
        (local.get $ptr))

    (func (export "load_rom") (param $ptr i32) (param $len i32) (result i32)
        (global.set $rom_byte (i32.load8_u (local.get $ptr)))
        (i32.const 0))

    (func (export "width") (result i32) (i32.const 2))
    (func (export "height") (result i32) (i32.const 2))
    (func (export "sample_rate") (result i32) (i32.const 32768))

    (func (export "step")
        ;; STEP_HOOK
        (global.set $frame (i32.add (global.get $frame) (i32.const 1)))
        (i32.store8 (i32.const 4096) (global.get $frame))
        (i32.store8 (i32.const 4097) (global.get $buttons))
        (i32.store8 (i32.const 4098) (global.get $rom_byte))
        (f32.store (i32.const 8192) (f32.const 0.25))
        (f32.store (i32.const 8196) (f32.const 0.5))
        (f32.store (i32.const 8448) (f32.const -0.25))
        (f32.store (i32.const 8452) (f32.const -0.5))
        (global.set $pending (i32.const 2))
        (call $log (i32.const 512) (i32.const 7)))

    (func (export "framebuffer_ptr") (result i32) (i32.const 4096))

    (func (export "audio_samples") (result i32)
        (local $n i32)
        (local.set $n (global.get $pending))
        (global.set $pending (i32.const 0))
        (local.get $n))

    (func (export "audio_left_ptr") (result i32) (i32.const 8192))
    (func (export "audio_right_ptr") (result i32) (i32.const 8448))

    (func (export "set_button") (param $i i32) (param $p i32)
        (if (local.get $p)
            (then
                (global.set $buttons
                    (i32.or (global.get $buttons) (i32.shl (i32.const 1) (local.get $i)))))
            (else
                (global.set $buttons
                    (i32.and (global.get $buttons)
                        (i32.xor (i32.const -1) (i32.shl (i32.const 1) (local.get $i))))))))

    ;; STATE_EXPORTS
)
"#;

const STATE_EXPORTS: &str = r#"
    (func (export "state_size") (result i32) (i32.const 8))
    (func (export "save_state") (param $ptr i32)
        (i32.store (local.get $ptr) (global.get $frame))
        (i32.store offset=4 (local.get $ptr) (global.get $buttons)))
    (func (export "load_state") (param $ptr i32) (param $len i32) (result i32)
        (if (i32.ne (local.get $len) (i32.const 8))
            (then (return (i32.const 1))))
        (global.set $frame (i32.load (local.get $ptr)))
        (global.set $buttons (i32.load offset=4 (local.get $ptr)))
        (i32.const 0))
"#;

fn rom() -> RomImage {
    RomImage::from_bytes("test", vec![0x42, 0x00, 0x01]).unwrap()
}

fn load(wat_src: &str) -> Result<WasmCore, CoreLoadError> {
    let engine = WasmEngine::new();
    let wasm = wat::parse_str(wat_src).unwrap();
    WasmCore::load(&engine, &wasm, &rom(), DEFAULT_RAM_LIMIT)
}

fn with_state() -> String {
    TEST_CORE.replace(";; STATE_EXPORTS", STATE_EXPORTS)
}

#[test]
fn test_engine_rejects_invalid_module() {
    let engine = WasmEngine::new();
    assert!(matches!(
        engine.load_module(b"not valid wasm"),
        Err(CoreLoadError::Compile(_))
    ));
}

#[test]
fn test_engine_rejects_oversized_memory() {
    let engine = WasmEngine::new();
    let wasm = wat::parse_str(r#"(module (memory (export "memory") 2))"#).unwrap();
    let module = engine.load_module(&wasm).unwrap();

    assert!(WasmEngine::validate_module_memory(&module, 2 * 65536).is_ok());
    assert_eq!(
        WasmEngine::validate_module_memory(&module, 65536),
        Err(CoreLoadError::MemoryTooLarge {
            required: 2 * 65536,
            limit: 65536
        })
    );
}

#[test]
fn test_load_reports_info() {
    let core = load(TEST_CORE).unwrap();

    let info = core.info();
    assert_eq!((info.width, info.height), (2, 2));
    assert_eq!(info.sample_rate, 32768);
    assert_eq!(info.frame_len(), 16);
    assert_eq!(core.memory_size(), 65536);
}

#[test]
fn test_sample_rate_defaults_when_not_exported() {
    let src = TEST_CORE.replace(
        r#"(func (export "sample_rate") (result i32) (i32.const 32768))"#,
        "",
    );
    let core = load(&src).unwrap();

    assert_eq!(core.info().sample_rate, crate::audio::DEFAULT_SAMPLE_RATE);
}

#[test]
fn test_step_and_pull_framebuffer() {
    let mut core = load(TEST_CORE).unwrap();

    core.step().unwrap();
    core.step().unwrap();
    let frame = core.framebuffer().unwrap();

    assert_eq!(frame.len(), 16);
    assert_eq!(frame[0], 2);
    // ROM was copied into guest memory before load_rom ran
    assert_eq!(frame[2], 0x42);
}

#[test]
fn test_buttons_reach_guest() {
    let mut core = load(TEST_CORE).unwrap();

    core.set_button_state(Button::A, true).unwrap();
    core.set_button_state(Button::Left, true).unwrap();
    core.set_button_state(Button::Left, false).unwrap();
    core.step().unwrap();

    assert_eq!(core.framebuffer().unwrap()[1], 1 << Button::A.index());
}

#[test]
fn test_drain_audio_appends_and_resets() {
    let mut core = load(TEST_CORE).unwrap();
    let (mut left, mut right) = (vec![9.0], Vec::new());

    assert_eq!(core.drain_audio(&mut left, &mut right).unwrap(), 0);
    core.step().unwrap();
    assert_eq!(core.drain_audio(&mut left, &mut right).unwrap(), 2);
    assert_eq!(core.drain_audio(&mut left, &mut right).unwrap(), 0);

    assert_eq!(left, vec![9.0, 0.25, 0.5]);
    assert_eq!(right, vec![-0.25, -0.5]);
}

#[test]
fn test_aliased_exports_are_resolved() {
    let src = TEST_CORE
        .replace(r#"(export "step")"#, r#"(export "run_frame")"#)
        .replace(r#"(export "width")"#, r#"(export "screen_width")"#)
        .replace(r#"(export "set_button")"#, r#"(export "set_input")"#);
    let mut core = load(&src).unwrap();

    core.step().unwrap();
    assert_eq!(core.framebuffer().unwrap()[0], 1);
    assert!(EXPORT_ALIASES.iter().any(|(op, _)| *op == "step"));
}

#[test]
fn test_missing_export_is_reported() {
    let src = TEST_CORE.replace(r#"(export "set_button")"#, "");

    assert!(matches!(
        load(&src),
        Err(CoreLoadError::MissingExport("set_button"))
    ));
}

#[test]
fn test_wrong_signature_is_reported() {
    let src = TEST_CORE.replace(
        r#"(func (export "framebuffer_ptr") (result i32) (i32.const 4096))"#,
        r#"(func (export "framebuffer_ptr") (result i64) (i64.const 4096))"#,
    );

    assert!(matches!(
        load(&src),
        Err(CoreLoadError::Signature {
            op: "framebuffer_ptr",
            ..
        })
    ));
}

#[test]
fn test_rom_rejection() {
    let src = TEST_CORE.replace(
        "(global.set $rom_byte (i32.load8_u (local.get $ptr)))\n        (i32.const 0))",
        "(i32.const 3))",
    );

    assert_eq!(load(&src).err(), Some(CoreLoadError::RomRejected(3)));
}

#[test]
fn test_zero_dimensions_rejected() {
    let src = TEST_CORE.replace(
        r#"(func (export "height") (result i32) (i32.const 2))"#,
        r#"(func (export "height") (result i32) (i32.const 0))"#,
    );

    assert!(matches!(
        load(&src),
        Err(CoreLoadError::BadDimensions {
            width: 2,
            height: 0
        })
    ));
}

#[test]
fn test_trap_becomes_core_error() {
    let src = TEST_CORE.replace(";; STEP_HOOK", "unreachable");
    let mut core = load(&src).unwrap();

    assert!(matches!(core.step(), Err(CoreError::Trap(_))));
    // The instance stays usable after a trap
    assert!(core.framebuffer().is_ok());
}

#[test]
fn test_out_of_bounds_framebuffer() {
    let src = TEST_CORE.replace(
        r#"(func (export "framebuffer_ptr") (result i32) (i32.const 4096))"#,
        r#"(func (export "framebuffer_ptr") (result i32) (i32.const 65530))"#,
    );
    let mut core = load(&src).unwrap();

    assert!(matches!(
        core.framebuffer(),
        Err(CoreError::OutOfBounds {
            what: "framebuffer",
            offset: 65530,
            len: 16
        })
    ));
}

#[test]
fn test_save_state_unsupported_without_exports() {
    let mut core = load(TEST_CORE).unwrap();

    assert!(matches!(core.save_state(), Err(CoreError::Unsupported(_))));
    assert!(matches!(
        core.load_state(&[0; 8]),
        Err(CoreError::Unsupported(_))
    ));
}

#[test]
fn test_save_and_restore_state() {
    let mut core = load(&with_state()).unwrap();

    core.set_button_state(Button::Start, true).unwrap();
    core.step().unwrap();
    let saved = core.save_state().unwrap();
    assert_eq!(saved.len(), 8);

    core.set_button_state(Button::Start, false).unwrap();
    core.step().unwrap();
    core.step().unwrap();
    core.load_state(&saved).unwrap();
    core.step().unwrap();

    let frame = core.framebuffer().unwrap();
    assert_eq!(frame[0], 2);
    assert_eq!(frame[1], 1 << Button::Start.index());
}

#[test]
fn test_load_state_rejected_by_guest() {
    let mut core = load(&with_state()).unwrap();

    assert_eq!(
        core.load_state(&[0; 3]),
        Err(CoreError::StateRejected(1))
    );
}

#[test]
fn test_memory_limit_enforced_at_load() {
    let engine = WasmEngine::new();
    let wasm = wat::parse_str(TEST_CORE).unwrap();

    let result = WasmCore::load(&engine, &wasm, &rom(), 1024);
    assert!(matches!(result, Err(CoreLoadError::MemoryTooLarge { .. })));
}
