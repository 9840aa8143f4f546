//! NES System Integration
//!
//! Owns the CPU and the bus tree (bus -> PPU -> PPU bus -> cartridge) and
//! keeps them in lock-step: every CPU cycle is preceded by three PPU dots.

use log::{debug, info};
use thiserror::Error;

use crate::bus::{BusError, CpuBus};
use crate::cartridge::{Cartridge, CartridgeError};
use crate::config::{ConfigError, NesConfig};
use crate::cpu::{Bus, Cpu, CpuError};
use crate::ppu::{Interrupt, Ppu};
use crate::ppu_bus::PpuBus;
use crate::trace;

/// PPU dots per CPU cycle (NTSC)
pub const PPU_DOTS_PER_CPU_CYCLE: usize = 3;

/// CPU cycles an OAM DMA holds the CPU, plus one when it starts on an odd
/// cycle.
pub const OAM_DMA_CYCLES: u16 = 513;

/// Anything that stops the machine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum NesError {
    #[error("cartridge: {0}")]
    Cartridge(#[from] CartridgeError),
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("cpu: {0}")]
    Cpu(#[from] CpuError),
    #[error("bus: {0}")]
    Bus(#[from] BusError),
}

/// NES System - integrates all components
#[derive(Debug, Clone)]
pub struct NesSystem {
    cpu: Cpu,
    bus: CpuBus,
    config: NesConfig,
    /// Set when the PPU finishes a frame, cleared by [`NesSystem::run_frame`]
    frame_ready: bool,
}

impl NesSystem {
    /// Power on a console with `cartridge` inserted.
    pub fn new(cartridge: Cartridge, config: NesConfig) -> Result<Self, NesError> {
        config.validate()?;

        let mut bus = CpuBus::new(Ppu::new(PpuBus::new(cartridge)));
        let mut cpu = Cpu::new(config.illegal_opcodes);
        cpu.power_on(&mut bus)?;

        let mut system = Self {
            cpu,
            bus,
            config,
            frame_ready: false,
        };
        system.apply_entry_point();
        Ok(system)
    }

    /// Parse an iNES image and power on.
    pub fn from_ines(rom: &[u8], config: NesConfig) -> Result<Self, NesError> {
        let cartridge = Cartridge::from_ines(rom)?;
        Self::new(cartridge, config)
    }

    /// Reset button.
    pub fn reset(&mut self) -> Result<(), NesError> {
        self.bus.ppu_mut().reset();
        self.cpu.reset(&mut self.bus)?;
        self.frame_ready = false;
        self.apply_entry_point();
        info!("System reset");
        Ok(())
    }

    fn apply_entry_point(&mut self) {
        if let Some(pc) = self.config.entry_point {
            debug!("Entry point overridden to ${pc:04X}");
            self.cpu.registers_mut().pc = pc;
        }
    }

    /// Advance one CPU cycle: three PPU dots, then the CPU, then any OAM DMA
    /// the CPU requested.
    pub fn tick(&mut self) -> Result<(), NesError> {
        for _ in 0..PPU_DOTS_PER_CPU_CYCLE {
            let ppu = self.bus.ppu_mut();
            match ppu.clock() {
                Interrupt::Nmi => self.cpu.request_nmi(),
                // The cartridge holds the line; sampled below
                Interrupt::Irq | Interrupt::None => {}
            }
            if ppu.is_frame_finished() {
                ppu.start_next_frame();
                self.frame_ready = true;
            }
        }
        self.cpu.set_irq_line(self.bus.cartridge().irq_line());

        self.cpu.tick(&mut self.bus)?;

        if let Some(page) = self.bus.take_dma_request() {
            self.oam_dma(page)?;
        }
        Ok(())
    }

    /// Copy page `page` into OAM and stall the CPU for the transfer.
    fn oam_dma(&mut self, page: u8) -> Result<(), NesError> {
        let base = u16::from(page) << 8;
        for offset in 0..=0xFF {
            let value = self.bus.read(base | offset)?;
            self.bus.ppu_mut().write_oam_data(value);
        }

        let stall = OAM_DMA_CYCLES + u16::from(self.cpu.tick_counter() % 2 == 1);
        self.cpu.stall(stall);
        debug!("OAM DMA from ${base:04X}, CPU stalled {stall} cycles");
        Ok(())
    }

    /// Run until the CPU reaches the next instruction boundary.
    pub fn step_instruction(&mut self) -> Result<(), NesError> {
        self.tick()?;
        while !self.cpu.at_instruction_boundary() {
            self.tick()?;
        }
        Ok(())
    }

    /// Run until the PPU completes a frame.
    pub fn run_frame(&mut self) -> Result<(), NesError> {
        while !self.frame_ready {
            self.tick()?;
        }
        self.frame_ready = false;
        Ok(())
    }

    /// Trace line for the instruction about to execute.
    pub fn trace(&self) -> String {
        let ppu = self.bus.ppu();
        trace::trace_line(&self.cpu, &self.bus, ppu.scanline(), ppu.dot())
    }

    /// 256x240 RGBA pixels of the last frame drawn.
    pub fn frame_buffer(&self) -> &[u8] {
        self.bus.ppu().frame_buffer()
    }

    /// Held buttons for controller `port` (0 or 1).
    pub fn set_buttons(&mut self, port: usize, mask: u8) {
        self.bus.set_buttons(port, mask);
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &CpuBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut CpuBus {
        &mut self.bus
    }

    pub fn ppu(&self) -> &Ppu {
        self.bus.ppu()
    }

    pub fn cartridge(&self) -> &Cartridge {
        self.bus.cartridge()
    }

    pub fn config(&self) -> &NesConfig {
        &self.config
    }

    /// Frames completed since power-on.
    pub fn frame_count(&self) -> u64 {
        self.bus.ppu().frame_count()
    }

    /// Side-effect-free read of CPU memory.
    pub fn peek(&self, address: u16) -> u8 {
        self.bus.peek(address)
    }
}
