//! NES Desktop - Desktop NES emulator with minifb rendering
//!
//! Keyboard (controller 1):
//! - Arrow keys: D-pad
//! - Z / X: B / A
//! - Right Shift: Select, Enter: Start
//! - Escape: quit, F5: reset

use clap::Parser;
use log::{error, info};
use minifb::{Key, Window, WindowOptions};
use nes_core::config::NesConfig;
use nes_core::controller::button;
use nes_core::ppu::{FRAME_HEIGHT, FRAME_WIDTH};
use nes_core::system::NesSystem;
use std::fs;
use std::path::PathBuf;

/// NES Emulator Desktop App
#[derive(Parser, Debug)]
#[command(name = "nes-desktop")]
#[command(about = "A NES emulator desktop app", long_about = None)]
struct Args {
    /// Path to the iNES ROM file
    #[arg(short, long)]
    rom: PathBuf,

    /// Screen scale factor (1-4)
    #[arg(short, long, default_value = "2")]
    scale: usize,
}

const KEY_MAP: [(Key, u8); 8] = [
    (Key::X, button::A),
    (Key::Z, button::B),
    (Key::RightShift, button::SELECT),
    (Key::Enter, button::START),
    (Key::Up, button::UP),
    (Key::Down, button::DOWN),
    (Key::Left, button::LEFT),
    (Key::Right, button::RIGHT),
];

fn main() {
    env_logger::init();
    let args = Args::parse();

    // Load ROM file
    let rom_data = match fs::read(&args.rom) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("Failed to read ROM file: {}", e);
            std::process::exit(1);
        }
    };

    let mut system = match NesSystem::from_ines(&rom_data, NesConfig::default()) {
        Ok(system) => system,
        Err(e) => {
            eprintln!("Failed to load cartridge: {}", e);
            std::process::exit(1);
        }
    };

    let scale = args.scale.clamp(1, 4);
    let mut window = match Window::new(
        "NES Emulator",
        FRAME_WIDTH * scale,
        FRAME_HEIGHT * scale,
        WindowOptions {
            resize: false,
            ..WindowOptions::default()
        },
    ) {
        Ok(window) => window,
        Err(e) => {
            eprintln!("Failed to create window: {}", e);
            std::process::exit(1);
        }
    };
    window.set_target_fps(60);

    // minifb wants 0RGB pixels
    let mut buffer = vec![0u32; FRAME_WIDTH * FRAME_HEIGHT];

    info!("Starting emulation, press ESC or close the window to exit");

    while window.is_open() && !window.is_key_down(Key::Escape) {
        if window.is_key_pressed(Key::F5, minifb::KeyRepeat::No) {
            if let Err(e) = system.reset() {
                error!("Reset failed: {}", e);
                break;
            }
        }

        let buttons = KEY_MAP
            .iter()
            .filter(|(key, _)| window.is_key_down(*key))
            .fold(0, |mask, (_, bit)| mask | bit);
        system.set_buttons(0, buttons);

        if let Err(e) = system.run_frame() {
            error!("Emulation stopped: {}", e);
            break;
        }

        for (pixel, rgba) in buffer.iter_mut().zip(system.frame_buffer().chunks_exact(4)) {
            *pixel = (u32::from(rgba[0]) << 16) | (u32::from(rgba[1]) << 8) | u32::from(rgba[2]);
        }

        if let Err(e) = window.update_with_buffer(&buffer, FRAME_WIDTH, FRAME_HEIGHT) {
            error!("Failed to update window: {}", e);
            break;
        }
    }

    info!("Emulator closed after {} frames", system.frame_count());
}
