//! Cartridge mappers
//!
//! Each supported board is a small state machine implementing [`MapperOps`].
//! [`Mapper`] is the closed set of boards, chosen once from the iNES mapper
//! id. Mapper state is bank offsets into [`CartridgeMemory`], never copies of
//! it.
//!
//! | id  | board                  |
//! |-----|------------------------|
//! | 000 | NROM                   |
//! | 001 | MMC1 (SxROM)           |
//! | 002 | UxROM                  |
//! | 003 | CNROM                  |
//! | 004 | MMC3 (TxROM)           |
//! | 007 | AxROM                  |
//! | 011 | Color Dreams           |
//! | 066 | GxROM                  |

use log::{debug, warn};
use thiserror::Error;

use crate::cartridge::{CartridgeError, CartridgeMemory, Mirroring};

const PRG_8K: usize = 0x2000;
const PRG_16K: usize = 0x4000;
const PRG_32K: usize = 0x8000;
const CHR_1K: usize = 0x0400;
const CHR_4K: usize = 0x1000;
const CHR_8K: usize = 0x2000;

/// Runtime mapper faults. These halt emulation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MapperError {
    #[error("mapper {mapper:03} has no PRG-RAM (access at ${address:04X})")]
    UnsupportedPrgRam { mapper: u8, address: u16 },
}

/// Optional memories a board may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapperCapabilities {
    /// $6000-$7FFF is backed by PRG-RAM
    pub prg_ram: bool,
    /// CHR may be RAM when the image has no CHR-ROM
    pub chr_ram: bool,
}

/// The operations every board provides.
pub trait MapperOps {
    /// CPU read in $4020-$FFFF. `Ok(None)` means nothing drives the bus.
    fn read_cpu(&self, memory: &CartridgeMemory, address: u16) -> Result<Option<u8>, MapperError>;

    /// CPU write in $4020-$FFFF. Returns the new mirroring when the write
    /// changed it.
    fn write_cpu(
        &mut self,
        memory: &mut CartridgeMemory,
        address: u16,
        value: u8,
    ) -> Result<Option<Mirroring>, MapperError>;

    /// Pattern-table read in $0000-$1FFF.
    fn read_ppu(&self, memory: &CartridgeMemory, address: u16) -> u8;

    /// Pattern-table write in $0000-$1FFF.
    fn write_ppu(&mut self, memory: &mut CartridgeMemory, address: u16, value: u8);

    /// Called once per rendered scanline; true raises the CPU IRQ line.
    fn scanline_irq(&mut self) -> bool {
        false
    }

    /// Level of the board's IRQ output. Stays high until acknowledged.
    fn irq_line(&self) -> bool {
        false
    }
}

fn no_prg_ram(mapper: u8, address: u16) -> MapperError {
    MapperError::UnsupportedPrgRam { mapper, address }
}

fn ignore_rom_write(mapper: u8, address: u16, value: u8) {
    warn!("mapper {mapper:03}: write ${value:02X} to ${address:04X} ignored");
}

/// 8KB CHR window at `offset`.
fn read_chr_8k(memory: &CartridgeMemory, offset: usize, address: u16) -> u8 {
    memory.read_chr(offset + usize::from(address & 0x1FFF))
}

/// 32KB PRG window at `offset`.
fn read_prg_32k(memory: &CartridgeMemory, offset: usize, address: u16) -> u8 {
    memory.read_prg(offset + usize::from(address & 0x7FFF))
}

/// Two 16KB PRG windows.
fn read_prg_16k(memory: &CartridgeMemory, offsets: &[usize; 2], address: u16) -> u8 {
    let window = usize::from((address >> 14) & 1);
    memory.read_prg(offsets[window] + usize::from(address & 0x3FFF))
}

// ---------------------------------------------------------------------------
// 000: NROM
// ---------------------------------------------------------------------------

/// Fixed 16KB or 32KB PRG, fixed 8KB CHR.
#[derive(Debug, Clone)]
pub struct Nrom {
    prg_offsets: [usize; 2],
}

impl Nrom {
    pub fn new(memory: &CartridgeMemory) -> Self {
        Self {
            prg_offsets: [0, fixed_upper_16k(memory)],
        }
    }
}

/// Offset of the $C000 window on boards without PRG switching: NROM-128
/// mirrors its single bank, NROM-256 maps the second one.
fn fixed_upper_16k(memory: &CartridgeMemory) -> usize {
    if memory.prg_banks(PRG_16K) > 1 {
        PRG_16K
    } else {
        0
    }
}

impl MapperOps for Nrom {
    fn read_cpu(&self, memory: &CartridgeMemory, address: u16) -> Result<Option<u8>, MapperError> {
        Ok(match address {
            0x6000..=0x7FFF => Some(memory.read_prg_ram(address)),
            0x8000..=0xFFFF => Some(read_prg_16k(memory, &self.prg_offsets, address)),
            _ => None,
        })
    }

    fn write_cpu(
        &mut self,
        memory: &mut CartridgeMemory,
        address: u16,
        value: u8,
    ) -> Result<Option<Mirroring>, MapperError> {
        match address {
            0x6000..=0x7FFF => memory.write_prg_ram(address, value),
            _ => ignore_rom_write(0, address, value),
        }
        Ok(None)
    }

    fn read_ppu(&self, memory: &CartridgeMemory, address: u16) -> u8 {
        read_chr_8k(memory, 0, address)
    }

    fn write_ppu(&mut self, memory: &mut CartridgeMemory, address: u16, value: u8) {
        memory.write_chr(usize::from(address & 0x1FFF), value);
    }
}

// ---------------------------------------------------------------------------
// 001: MMC1
// ---------------------------------------------------------------------------

/// Serially loaded registers: five writes, LSB first, select and fill one of
/// control / CHR bank 0 / CHR bank 1 / PRG bank.
#[derive(Debug, Clone)]
pub struct Mmc1 {
    shift: u8,
    shift_count: u8,
    control: u8,
    chr_bank_0: u8,
    chr_bank_1: u8,
    prg_bank: u8,
    prg_banks: usize,
    chr_banks: usize,
    prg_offsets: [usize; 2],
    chr_offsets: [usize; 2],
}

impl Mmc1 {
    pub fn new(memory: &CartridgeMemory) -> Self {
        let mut mapper = Self {
            shift: 0,
            shift_count: 0,
            // PRG mode 3: $C000 fixed to the last bank
            control: 0x0C,
            chr_bank_0: 0,
            chr_bank_1: 0,
            prg_bank: 0,
            prg_banks: memory.prg_banks(PRG_16K),
            chr_banks: memory.chr_banks(CHR_4K),
            prg_offsets: [0; 2],
            chr_offsets: [0; 2],
        };
        mapper.set_prg_banks();
        mapper.set_chr_banks();
        mapper
    }

    /// Offsets of the $8000 and $C000 windows.
    pub fn prg_offsets(&self) -> [usize; 2] {
        self.prg_offsets
    }

    /// Offsets of the $0000 and $1000 windows.
    pub fn chr_offsets(&self) -> [usize; 2] {
        self.chr_offsets
    }

    pub fn control(&self) -> u8 {
        self.control
    }

    /// Recompute PRG offsets from the PRG mode (control bits 2-3).
    pub fn set_prg_banks(&mut self) {
        let bank = usize::from(self.prg_bank & 0x0F) % self.prg_banks;
        let last = self.prg_banks - 1;
        self.prg_offsets = match (self.control >> 2) & 0x03 {
            0 | 1 => {
                let low = bank & !1;
                [low * PRG_16K, ((low | 1) % self.prg_banks) * PRG_16K]
            }
            2 => [0, bank * PRG_16K],
            _ => [bank * PRG_16K, last * PRG_16K],
        };
        debug!("MMC1 PRG offsets {:05X?}", self.prg_offsets);
    }

    /// Recompute CHR offsets from the CHR mode (control bit 4).
    pub fn set_chr_banks(&mut self) {
        let banks = self.chr_banks;
        self.chr_offsets = if self.control & 0x10 == 0 {
            let low = usize::from(self.chr_bank_0 & 0x1E);
            [(low % banks) * CHR_4K, ((low | 1) % banks) * CHR_4K]
        } else {
            [
                (usize::from(self.chr_bank_0) % banks) * CHR_4K,
                (usize::from(self.chr_bank_1) % banks) * CHR_4K,
            ]
        };
        debug!("MMC1 CHR offsets {:05X?}", self.chr_offsets);
    }

    fn mirroring(&self) -> Mirroring {
        match self.control & 0x03 {
            0 => Mirroring::SingleScreenLower,
            1 => Mirroring::SingleScreenUpper,
            2 => Mirroring::Vertical,
            _ => Mirroring::Horizontal,
        }
    }

    fn prg_ram_enabled(&self) -> bool {
        self.prg_bank & 0x10 == 0
    }

    fn load_register(&mut self, address: u16, value: u8) -> Option<Mirroring> {
        if value & 0x80 != 0 {
            self.shift = 0;
            self.shift_count = 0;
            self.control |= 0x0C;
            self.set_prg_banks();
            return None;
        }

        self.shift |= (value & 0x01) << self.shift_count;
        self.shift_count += 1;
        if self.shift_count < 5 {
            return None;
        }

        let data = self.shift;
        self.shift = 0;
        self.shift_count = 0;

        match (address >> 13) & 0x03 {
            0 => {
                self.control = data;
                self.set_prg_banks();
                self.set_chr_banks();
                return Some(self.mirroring());
            }
            1 => {
                self.chr_bank_0 = data;
                self.set_chr_banks();
            }
            2 => {
                self.chr_bank_1 = data;
                self.set_chr_banks();
            }
            _ => {
                self.prg_bank = data;
                self.set_prg_banks();
            }
        }
        None
    }
}

impl MapperOps for Mmc1 {
    fn read_cpu(&self, memory: &CartridgeMemory, address: u16) -> Result<Option<u8>, MapperError> {
        Ok(match address {
            0x6000..=0x7FFF if self.prg_ram_enabled() => Some(memory.read_prg_ram(address)),
            0x8000..=0xFFFF => Some(read_prg_16k(memory, &self.prg_offsets, address)),
            _ => None,
        })
    }

    fn write_cpu(
        &mut self,
        memory: &mut CartridgeMemory,
        address: u16,
        value: u8,
    ) -> Result<Option<Mirroring>, MapperError> {
        Ok(match address {
            0x6000..=0x7FFF => {
                if self.prg_ram_enabled() {
                    memory.write_prg_ram(address, value);
                }
                None
            }
            0x8000..=0xFFFF => self.load_register(address, value),
            _ => {
                ignore_rom_write(1, address, value);
                None
            }
        })
    }

    fn read_ppu(&self, memory: &CartridgeMemory, address: u16) -> u8 {
        let window = usize::from((address >> 12) & 1);
        memory.read_chr(self.chr_offsets[window] + usize::from(address & 0x0FFF))
    }

    fn write_ppu(&mut self, memory: &mut CartridgeMemory, address: u16, value: u8) {
        let window = usize::from((address >> 12) & 1);
        memory.write_chr(self.chr_offsets[window] + usize::from(address & 0x0FFF), value);
    }
}

// ---------------------------------------------------------------------------
// 002: UxROM
// ---------------------------------------------------------------------------

/// Switchable 16KB at $8000, last bank fixed at $C000.
#[derive(Debug, Clone)]
pub struct UxRom {
    prg_banks: usize,
    prg_offsets: [usize; 2],
}

impl UxRom {
    pub fn new(memory: &CartridgeMemory) -> Self {
        let prg_banks = memory.prg_banks(PRG_16K);
        Self {
            prg_banks,
            prg_offsets: [0, (prg_banks - 1) * PRG_16K],
        }
    }
}

impl MapperOps for UxRom {
    fn read_cpu(&self, memory: &CartridgeMemory, address: u16) -> Result<Option<u8>, MapperError> {
        match address {
            0x6000..=0x7FFF => Err(no_prg_ram(2, address)),
            0x8000..=0xFFFF => Ok(Some(read_prg_16k(memory, &self.prg_offsets, address))),
            _ => Ok(None),
        }
    }

    fn write_cpu(
        &mut self,
        _memory: &mut CartridgeMemory,
        address: u16,
        value: u8,
    ) -> Result<Option<Mirroring>, MapperError> {
        match address {
            0x6000..=0x7FFF => return Err(no_prg_ram(2, address)),
            0x8000..=0xFFFF => {
                self.prg_offsets[0] = (usize::from(value) % self.prg_banks) * PRG_16K;
                debug!("UxROM PRG bank {value}");
            }
            _ => ignore_rom_write(2, address, value),
        }
        Ok(None)
    }

    fn read_ppu(&self, memory: &CartridgeMemory, address: u16) -> u8 {
        read_chr_8k(memory, 0, address)
    }

    fn write_ppu(&mut self, memory: &mut CartridgeMemory, address: u16, value: u8) {
        memory.write_chr(usize::from(address & 0x1FFF), value);
    }
}

// ---------------------------------------------------------------------------
// 003: CNROM
// ---------------------------------------------------------------------------

/// Fixed PRG, switchable 8KB CHR.
#[derive(Debug, Clone)]
pub struct CnRom {
    prg_offsets: [usize; 2],
    chr_banks: usize,
    chr_offset: usize,
}

impl CnRom {
    pub fn new(memory: &CartridgeMemory) -> Self {
        Self {
            prg_offsets: [0, fixed_upper_16k(memory)],
            chr_banks: memory.chr_banks(CHR_8K),
            chr_offset: 0,
        }
    }
}

impl MapperOps for CnRom {
    fn read_cpu(&self, memory: &CartridgeMemory, address: u16) -> Result<Option<u8>, MapperError> {
        match address {
            0x6000..=0x7FFF => Err(no_prg_ram(3, address)),
            0x8000..=0xFFFF => Ok(Some(read_prg_16k(memory, &self.prg_offsets, address))),
            _ => Ok(None),
        }
    }

    fn write_cpu(
        &mut self,
        _memory: &mut CartridgeMemory,
        address: u16,
        value: u8,
    ) -> Result<Option<Mirroring>, MapperError> {
        match address {
            0x6000..=0x7FFF => return Err(no_prg_ram(3, address)),
            0x8000..=0xFFFF => {
                self.chr_offset = (usize::from(value) % self.chr_banks) * CHR_8K;
                debug!("CNROM CHR bank {value}");
            }
            _ => ignore_rom_write(3, address, value),
        }
        Ok(None)
    }

    fn read_ppu(&self, memory: &CartridgeMemory, address: u16) -> u8 {
        read_chr_8k(memory, self.chr_offset, address)
    }

    fn write_ppu(&mut self, memory: &mut CartridgeMemory, address: u16, value: u8) {
        memory.write_chr(self.chr_offset + usize::from(address & 0x1FFF), value);
    }
}

// ---------------------------------------------------------------------------
// 004: MMC3
// ---------------------------------------------------------------------------

/// Eight bank registers behind a select/data pair, with a scanline counter
/// clocked by the PPU.
#[derive(Debug, Clone)]
pub struct Mmc3 {
    bank_select: u8,
    registers: [u8; 8],
    prg_banks: usize,
    chr_banks: usize,
    prg_offsets: [usize; 4],
    chr_offsets: [usize; 8],
    prg_ram_enabled: bool,
    prg_ram_write_protect: bool,
    irq_latch: u8,
    irq_counter: u8,
    irq_reload: bool,
    irq_enabled: bool,
    irq_pending: bool,
}

impl Mmc3 {
    pub fn new(memory: &CartridgeMemory) -> Self {
        let mut mapper = Self {
            bank_select: 0,
            registers: [0, 2, 4, 5, 6, 7, 0, 1],
            prg_banks: memory.prg_banks(PRG_8K),
            chr_banks: memory.chr_banks(CHR_1K),
            prg_offsets: [0; 4],
            chr_offsets: [0; 8],
            prg_ram_enabled: true,
            prg_ram_write_protect: false,
            irq_latch: 0,
            irq_counter: 0,
            irq_reload: false,
            irq_enabled: false,
            irq_pending: false,
        };
        mapper.update_offsets();
        mapper
    }

    /// Offsets of the four 8KB PRG windows.
    pub fn prg_offsets(&self) -> [usize; 4] {
        self.prg_offsets
    }

    /// Offsets of the eight 1KB CHR windows.
    pub fn chr_offsets(&self) -> [usize; 8] {
        self.chr_offsets
    }

    pub fn irq_counter(&self) -> u8 {
        self.irq_counter
    }

    /// IRQ asserted and not yet acknowledged through $E000.
    pub fn irq_pending(&self) -> bool {
        self.irq_pending
    }

    fn update_offsets(&mut self) {
        let prg = |bank: usize| (bank % self.prg_banks) * PRG_8K;
        let second_last = prg(self.prg_banks.saturating_sub(2));
        let last = prg(self.prg_banks - 1);
        let r6 = prg(usize::from(self.registers[6]));
        let r7 = prg(usize::from(self.registers[7]));
        self.prg_offsets = if self.bank_select & 0x40 == 0 {
            [r6, r7, second_last, last]
        } else {
            [second_last, r7, r6, last]
        };

        let chr = |bank: u8| (usize::from(bank) % self.chr_banks) * CHR_1K;
        let r = &self.registers;
        let pairs = [
            chr(r[0] & 0xFE),
            chr(r[0] | 0x01),
            chr(r[1] & 0xFE),
            chr(r[1] | 0x01),
        ];
        let singles = [chr(r[2]), chr(r[3]), chr(r[4]), chr(r[5])];
        let (low, high) = if self.bank_select & 0x80 == 0 {
            (pairs, singles)
        } else {
            (singles, pairs)
        };
        self.chr_offsets[..4].copy_from_slice(&low);
        self.chr_offsets[4..].copy_from_slice(&high);
    }
}

impl MapperOps for Mmc3 {
    fn read_cpu(&self, memory: &CartridgeMemory, address: u16) -> Result<Option<u8>, MapperError> {
        Ok(match address {
            0x6000..=0x7FFF if self.prg_ram_enabled => Some(memory.read_prg_ram(address)),
            0x8000..=0xFFFF => {
                let window = usize::from((address >> 13) & 0x03);
                Some(memory.read_prg(self.prg_offsets[window] + usize::from(address & 0x1FFF)))
            }
            _ => None,
        })
    }

    fn write_cpu(
        &mut self,
        memory: &mut CartridgeMemory,
        address: u16,
        value: u8,
    ) -> Result<Option<Mirroring>, MapperError> {
        match address {
            0x6000..=0x7FFF => {
                if self.prg_ram_enabled && !self.prg_ram_write_protect {
                    memory.write_prg_ram(address, value);
                }
            }
            0x8000..=0xFFFF => match address & 0xE001 {
                0x8000 => {
                    self.bank_select = value;
                    self.update_offsets();
                }
                0x8001 => {
                    self.registers[usize::from(self.bank_select & 0x07)] = value;
                    self.update_offsets();
                }
                0xA000 => {
                    return Ok(Some(if value & 0x01 == 0 {
                        Mirroring::Vertical
                    } else {
                        Mirroring::Horizontal
                    }));
                }
                0xA001 => {
                    self.prg_ram_enabled = value & 0x80 != 0;
                    self.prg_ram_write_protect = value & 0x40 != 0;
                }
                0xC000 => self.irq_latch = value,
                0xC001 => {
                    self.irq_counter = 0;
                    self.irq_reload = true;
                }
                0xE000 => {
                    self.irq_enabled = false;
                    self.irq_pending = false;
                }
                _ => self.irq_enabled = true,
            },
            _ => ignore_rom_write(4, address, value),
        }
        Ok(None)
    }

    fn read_ppu(&self, memory: &CartridgeMemory, address: u16) -> u8 {
        let window = usize::from((address >> 10) & 0x07);
        memory.read_chr(self.chr_offsets[window] + usize::from(address & 0x03FF))
    }

    fn write_ppu(&mut self, memory: &mut CartridgeMemory, address: u16, value: u8) {
        let window = usize::from((address >> 10) & 0x07);
        memory.write_chr(self.chr_offsets[window] + usize::from(address & 0x03FF), value);
    }

    fn scanline_irq(&mut self) -> bool {
        if self.irq_counter == 0 || self.irq_reload {
            self.irq_counter = self.irq_latch;
            self.irq_reload = false;
        } else {
            self.irq_counter -= 1;
        }

        if self.irq_counter == 0 && self.irq_enabled {
            self.irq_pending = true;
            true
        } else {
            false
        }
    }

    fn irq_line(&self) -> bool {
        self.irq_pending
    }
}

// ---------------------------------------------------------------------------
// 007: AxROM
// ---------------------------------------------------------------------------

/// 32KB PRG switching and a one-screen nametable select.
#[derive(Debug, Clone)]
pub struct AxRom {
    prg_banks: usize,
    prg_offset: usize,
}

impl AxRom {
    pub fn new(memory: &CartridgeMemory) -> Self {
        Self {
            prg_banks: memory.prg_banks(PRG_32K),
            prg_offset: 0,
        }
    }
}

impl MapperOps for AxRom {
    fn read_cpu(&self, memory: &CartridgeMemory, address: u16) -> Result<Option<u8>, MapperError> {
        match address {
            0x6000..=0x7FFF => Err(no_prg_ram(7, address)),
            0x8000..=0xFFFF => Ok(Some(read_prg_32k(memory, self.prg_offset, address))),
            _ => Ok(None),
        }
    }

    fn write_cpu(
        &mut self,
        _memory: &mut CartridgeMemory,
        address: u16,
        value: u8,
    ) -> Result<Option<Mirroring>, MapperError> {
        match address {
            0x6000..=0x7FFF => Err(no_prg_ram(7, address)),
            0x8000..=0xFFFF => {
                self.prg_offset = (usize::from(value & 0x07) % self.prg_banks) * PRG_32K;
                Ok(Some(if value & 0x10 == 0 {
                    Mirroring::SingleScreenLower
                } else {
                    Mirroring::SingleScreenUpper
                }))
            }
            _ => {
                ignore_rom_write(7, address, value);
                Ok(None)
            }
        }
    }

    fn read_ppu(&self, memory: &CartridgeMemory, address: u16) -> u8 {
        read_chr_8k(memory, 0, address)
    }

    fn write_ppu(&mut self, memory: &mut CartridgeMemory, address: u16, value: u8) {
        memory.write_chr(usize::from(address & 0x1FFF), value);
    }
}

// ---------------------------------------------------------------------------
// 011 / 066: Color Dreams, GxROM
// ---------------------------------------------------------------------------

/// Bit positions of the PRG/CHR bank numbers in the latch byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LatchLayout {
    /// PRG in bits 0-1, CHR in bits 4-7
    ColorDreams,
    /// PRG in bits 4-5, CHR in bits 0-1
    GxRom,
}

/// One write-only latch selecting a 32KB PRG bank and an 8KB CHR bank.
#[derive(Debug, Clone)]
pub struct LatchedBanks {
    layout: LatchLayout,
    prg_banks: usize,
    chr_banks: usize,
    prg_offset: usize,
    chr_offset: usize,
}

impl LatchedBanks {
    fn new(layout: LatchLayout, memory: &CartridgeMemory) -> Self {
        Self {
            layout,
            prg_banks: memory.prg_banks(PRG_32K),
            chr_banks: memory.chr_banks(CHR_8K),
            prg_offset: 0,
            chr_offset: 0,
        }
    }

    pub fn color_dreams(memory: &CartridgeMemory) -> Self {
        Self::new(LatchLayout::ColorDreams, memory)
    }

    pub fn gxrom(memory: &CartridgeMemory) -> Self {
        Self::new(LatchLayout::GxRom, memory)
    }

    fn id(&self) -> u8 {
        match self.layout {
            LatchLayout::ColorDreams => 11,
            LatchLayout::GxRom => 66,
        }
    }

    pub fn prg_offset(&self) -> usize {
        self.prg_offset
    }

    pub fn chr_offset(&self) -> usize {
        self.chr_offset
    }
}

impl MapperOps for LatchedBanks {
    fn read_cpu(&self, memory: &CartridgeMemory, address: u16) -> Result<Option<u8>, MapperError> {
        match address {
            0x6000..=0x7FFF => Err(no_prg_ram(self.id(), address)),
            0x8000..=0xFFFF => Ok(Some(read_prg_32k(memory, self.prg_offset, address))),
            _ => Ok(None),
        }
    }

    fn write_cpu(
        &mut self,
        _memory: &mut CartridgeMemory,
        address: u16,
        value: u8,
    ) -> Result<Option<Mirroring>, MapperError> {
        match address {
            0x6000..=0x7FFF => return Err(no_prg_ram(self.id(), address)),
            0x8000..=0xFFFF => {
                let (prg, chr) = match self.layout {
                    LatchLayout::ColorDreams => (value & 0x03, value >> 4),
                    LatchLayout::GxRom => ((value >> 4) & 0x03, value & 0x03),
                };
                self.prg_offset = (usize::from(prg) % self.prg_banks) * PRG_32K;
                self.chr_offset = (usize::from(chr) % self.chr_banks) * CHR_8K;
            }
            _ => ignore_rom_write(self.id(), address, value),
        }
        Ok(None)
    }

    fn read_ppu(&self, memory: &CartridgeMemory, address: u16) -> u8 {
        read_chr_8k(memory, self.chr_offset, address)
    }

    fn write_ppu(&mut self, memory: &mut CartridgeMemory, address: u16, value: u8) {
        memory.write_chr(self.chr_offset + usize::from(address & 0x1FFF), value);
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Every board this core emulates.
#[derive(Debug, Clone)]
pub enum Mapper {
    Nrom(Nrom),
    Mmc1(Mmc1),
    UxRom(UxRom),
    CnRom(CnRom),
    Mmc3(Mmc3),
    AxRom(AxRom),
    ColorDreams(LatchedBanks),
    GxRom(LatchedBanks),
}

macro_rules! dispatch {
    ($mapper:expr, $inner:ident => $call:expr) => {
        match $mapper {
            Mapper::Nrom($inner) => $call,
            Mapper::Mmc1($inner) => $call,
            Mapper::UxRom($inner) => $call,
            Mapper::CnRom($inner) => $call,
            Mapper::Mmc3($inner) => $call,
            Mapper::AxRom($inner) => $call,
            Mapper::ColorDreams($inner) => $call,
            Mapper::GxRom($inner) => $call,
        }
    };
}

impl Mapper {
    /// Board capabilities, or `None` for an unsupported mapper id.
    pub const fn capabilities(id: u8) -> Option<MapperCapabilities> {
        let (prg_ram, chr_ram) = match id {
            0 | 1 | 4 => (true, true),
            2 | 7 => (false, true),
            3 | 11 | 66 => (false, false),
            _ => return None,
        };
        Some(MapperCapabilities { prg_ram, chr_ram })
    }

    /// Build the board for `id` over `memory`.
    pub fn new(id: u8, memory: &CartridgeMemory) -> Result<Self, CartridgeError> {
        Ok(match id {
            0 => Self::Nrom(Nrom::new(memory)),
            1 => Self::Mmc1(Mmc1::new(memory)),
            2 => Self::UxRom(UxRom::new(memory)),
            3 => Self::CnRom(CnRom::new(memory)),
            4 => Self::Mmc3(Mmc3::new(memory)),
            7 => Self::AxRom(AxRom::new(memory)),
            11 => Self::ColorDreams(LatchedBanks::color_dreams(memory)),
            66 => Self::GxRom(LatchedBanks::gxrom(memory)),
            _ => return Err(CartridgeError::UnsupportedMapper(id)),
        })
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::Nrom(_) => 0,
            Self::Mmc1(_) => 1,
            Self::UxRom(_) => 2,
            Self::CnRom(_) => 3,
            Self::Mmc3(_) => 4,
            Self::AxRom(_) => 7,
            Self::ColorDreams(_) => 11,
            Self::GxRom(_) => 66,
        }
    }

    /// Mirroring the board forces at power-on, overriding the header.
    pub fn initial_mirroring(&self) -> Option<Mirroring> {
        match self {
            Self::AxRom(_) => Some(Mirroring::SingleScreenLower),
            _ => None,
        }
    }
}

impl MapperOps for Mapper {
    fn read_cpu(&self, memory: &CartridgeMemory, address: u16) -> Result<Option<u8>, MapperError> {
        dispatch!(self, m => m.read_cpu(memory, address))
    }

    fn write_cpu(
        &mut self,
        memory: &mut CartridgeMemory,
        address: u16,
        value: u8,
    ) -> Result<Option<Mirroring>, MapperError> {
        dispatch!(self, m => m.write_cpu(memory, address, value))
    }

    fn read_ppu(&self, memory: &CartridgeMemory, address: u16) -> u8 {
        dispatch!(self, m => m.read_ppu(memory, address))
    }

    fn write_ppu(&mut self, memory: &mut CartridgeMemory, address: u16, value: u8) {
        dispatch!(self, m => m.write_ppu(memory, address, value))
    }

    fn scanline_irq(&mut self) -> bool {
        dispatch!(self, m => m.scanline_irq())
    }

    fn irq_line(&self) -> bool {
        dispatch!(self, m => m.irq_line())
    }
}
