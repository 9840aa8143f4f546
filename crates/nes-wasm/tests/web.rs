//! Tests run in a browser or node via `wasm-pack test`

#![cfg(target_arch = "wasm32")]

use nes_wasm::NesEmulator;
use wasm_bindgen_test::wasm_bindgen_test;

/// NROM-128 image that spins at $8000
fn spin_rom() -> Vec<u8> {
    let mut image = vec![b'N', b'E', b'S', 0x1A, 1, 1, 0, 0];
    image.resize(16, 0);
    let mut prg = vec![0xEA; 0x4000];
    // JMP $8000
    prg[..3].copy_from_slice(&[0x4C, 0x00, 0x80]);
    prg[0x3FFA..].copy_from_slice(&[0x00, 0x80, 0x00, 0x80, 0x00, 0x80]);
    image.extend_from_slice(&prg);
    image.extend_from_slice(&[0; 0x2000]);
    image
}

#[wasm_bindgen_test]
fn runs_frames_after_load() {
    let mut emulator = NesEmulator::new();
    assert_eq!(emulator.framebuffer_rgba().length(), 0);

    emulator.load_rom(&spin_rom()).unwrap();
    emulator.run_frame().unwrap();
    emulator.run_frame().unwrap();
    assert_eq!(emulator.frame_count(), 2);
    assert_eq!(emulator.framebuffer_rgba().length(), 256 * 240 * 4);
}

#[wasm_bindgen_test]
fn rejects_bad_rom() {
    let mut emulator = NesEmulator::new();
    assert!(emulator.load_rom(b"not a rom").is_err());
    assert!(emulator.run_frame().is_err());
}
