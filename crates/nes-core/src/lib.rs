//! NES Core - Pure Rust NES emulator library
//!
//! This crate provides the core emulation logic for a Nintendo Entertainment System (NES):
//! a cycle-stepped 2A03 CPU, the 2C02 PPU, both memory buses and the common cartridge
//! mappers. It contains no windowing, audio or web dependencies.
//!
//! ```no_run
//! use nes_core::config::NesConfig;
//! use nes_core::system::NesSystem;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let rom = std::fs::read("game.nes")?;
//! let mut nes = NesSystem::from_ines(&rom, NesConfig::default())?;
//! nes.run_frame()?;
//! let rgba = nes.frame_buffer();
//! # let _ = rgba;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

/// Emulator configuration
pub mod config;
/// CPU module containing the 2A03 (6502 variant) implementation
pub mod cpu;
/// CPU memory bus
pub mod bus;
/// PPU (Picture Processing Unit) implementation
pub mod ppu;
/// PPU address space
pub mod ppu_bus;
/// Cartridge loading
pub mod cartridge;
/// Board-specific bank switching
pub mod mapper;
/// Standard controllers
pub mod controller;
/// nestest-style instruction traces
pub mod trace;
/// Integration module for complete NES system
pub mod system;

pub use config::NesConfig;
pub use system::{NesError, NesSystem};
