//! Console configuration
//!
//! Everything a frontend can choose before power-on lives here. The core
//! never reads environment variables or files on its own.

use thiserror::Error;

/// Video region of the console.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// NTSC: 262 scanlines, three PPU dots per CPU cycle.
    #[default]
    Ntsc,
    /// PAL: 312 scanlines, 3.2 dots per CPU cycle. Not emulated.
    Pal,
}

/// What the CPU does when it fetches an opcode outside the official set.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IllegalOpcodePolicy {
    /// Stop with [`CpuError::IllegalOpcode`](crate::cpu::CpuError::IllegalOpcode).
    #[default]
    Halt,
    /// Execute the stable unofficial opcodes; unstable ones still halt.
    Execute,
}

/// Errors raised while validating a [`NesConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0:?} timing is not emulated")]
    UnsupportedRegion(Region),
}

/// Power-on configuration of a console.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NesConfig {
    /// Video region. Only NTSC runs.
    pub region: Region,
    /// Handling of unofficial opcodes.
    pub illegal_opcodes: IllegalOpcodePolicy,
    /// Start execution here instead of at the reset vector
    /// (nestest's automation mode uses $C000).
    pub entry_point: Option<u16>,
}

impl NesConfig {
    /// Check that the configuration describes something this core can run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.region {
            Region::Ntsc => Ok(()),
            Region::Pal => Err(ConfigError::UnsupportedRegion(self.region)),
        }
    }
}
