//! NES WASM - WASM wrapper for NES emulator

use js_sys::Uint8Array;
use nes_core::config::NesConfig;
use nes_core::system::NesSystem;
use wasm_bindgen::prelude::wasm_bindgen;
use wasm_bindgen::JsError;

/// NES Emulator wrapper for WASM
#[wasm_bindgen]
#[derive(Default)]
pub struct NesEmulator {
    system: Option<NesSystem>,
}

#[wasm_bindgen]
impl NesEmulator {
    /// Create an emulator with no cartridge inserted
    #[wasm_bindgen(constructor)]
    pub fn new() -> NesEmulator {
        Self::default()
    }

    /// Load an iNES ROM and power on
    pub fn load_rom(&mut self, rom_data: &[u8]) -> Result<(), JsError> {
        let system = NesSystem::from_ines(rom_data, NesConfig::default())?;
        self.system = Some(system);
        Ok(())
    }

    /// Press the reset button
    pub fn reset(&mut self) -> Result<(), JsError> {
        self.system_mut()?.reset()?;
        Ok(())
    }

    /// Run until the next frame is complete
    pub fn run_frame(&mut self) -> Result<(), JsError> {
        self.system_mut()?.run_frame()?;
        Ok(())
    }

    /// Buttons held on controller `port` (bit 0 = A ... bit 7 = Right)
    pub fn set_buttons(&mut self, port: usize, mask: u8) {
        if let Some(system) = self.system.as_mut() {
            system.set_buttons(port, mask);
        }
    }

    /// Frames completed since power-on
    pub fn frame_count(&self) -> u32 {
        self.system.as_ref().map_or(0, |s| s.frame_count() as u32)
    }

    /// 256x240 RGBA pixels, ready for `ImageData`
    pub fn framebuffer_rgba(&self) -> Uint8Array {
        match &self.system {
            Some(system) => Uint8Array::from(system.frame_buffer()),
            None => Uint8Array::new_with_length(0),
        }
    }

    /// CPU cycles since power-on
    pub fn cpu_cycles(&self) -> f64 {
        self.system
            .as_ref()
            .map_or(0.0, |s| s.cpu().tick_counter() as f64)
    }

    fn system_mut(&mut self) -> Result<&mut NesSystem, JsError> {
        self.system
            .as_mut()
            .ok_or_else(|| JsError::new("no ROM loaded"))
    }
}

#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
