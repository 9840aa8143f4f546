//! Cartridge loading and memory ownership
//!
//! The cartridge owns every byte of PRG-ROM, PRG-RAM and CHR memory. Mappers
//! never copy those buffers; they hold bank offsets into them and receive the
//! buffers by reference on each access.

use log::{info, warn};
use thiserror::Error;

use crate::mapper::{Mapper, MapperError, MapperOps};

/// iNES header size
pub const HEADER_SIZE: usize = 16;
/// Trainer size, present when flags 6 bit 2 is set
pub const TRAINER_SIZE: usize = 512;
/// PRG-ROM header unit
pub const PRG_ROM_UNIT: usize = 0x4000;
/// CHR-ROM header unit
pub const CHR_ROM_UNIT: usize = 0x2000;
/// PRG-RAM header unit
pub const PRG_RAM_UNIT: usize = 0x2000;

const MAGIC: [u8; 4] = [b'N', b'E', b'S', 0x1A];

/// Errors raised while loading a cartridge. All of them are fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartridgeError {
    #[error("image is {0} bytes, shorter than the 16-byte header")]
    TooShort(usize),
    #[error("missing NES<EOF> magic")]
    BadMagic,
    #[error("{0:?} images are not supported")]
    UnsupportedFormat(RomFormat),
    #[error("{0:?} cartridges are not supported")]
    UnsupportedTvSystem(TvSystem),
    #[error("mapper {0:03} is not supported")]
    UnsupportedMapper(u8),
    #[error("image truncated: {section} needs {expected} bytes, {actual} available")]
    Truncated {
        section: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("image has no PRG-ROM")]
    EmptyPrgRom,
    #[error("mapper {0:03} has no CHR-RAM but the image carries no CHR-ROM")]
    ChrRamUnsupported(u8),
}

/// Header dialect, decided from flags 7 bits 2-3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomFormat {
    Ines,
    Nes20,
    ArchaicInes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TvSystem {
    Ntsc,
    Pal,
}

/// Nametable arrangement. The variant decides which 1KB page of VRAM each of
/// the four logical nametables resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    SingleScreenLower,
    SingleScreenUpper,
    FourScreen,
}

impl Mirroring {
    /// VRAM offset of each nametable quadrant ($2000, $2400, $2800, $2C00).
    pub const fn nametable_offsets(self) -> [u16; 4] {
        match self {
            Self::Horizontal => [0x000, 0x000, 0x400, 0x400],
            Self::Vertical => [0x000, 0x400, 0x000, 0x400],
            Self::SingleScreenLower => [0x000; 4],
            Self::SingleScreenUpper => [0x400; 4],
            Self::FourScreen => [0x000, 0x400, 0x800, 0xC00],
        }
    }
}

/// Decoded iNES header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InesHeader {
    pub format: RomFormat,
    pub tv_system: TvSystem,
    pub mirroring: Mirroring,
    /// Battery-backed PRG-RAM
    pub battery: bool,
    pub trainer: bool,
    pub vs_unisystem: bool,
    pub playchoice_10: bool,
    pub mapper_id: u8,
    /// PRG-ROM size in 16KB units
    pub prg_rom_banks: u8,
    /// CHR-ROM size in 8KB units (0 means the board carries 8KB of CHR-RAM)
    pub chr_rom_banks: u8,
    /// PRG-RAM size in 8KB units, at least 1
    pub prg_ram_units: u8,
}

impl InesHeader {
    /// Decode the 16-byte header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, CartridgeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CartridgeError::TooShort(bytes.len()));
        }
        if bytes[0..4] != MAGIC {
            return Err(CartridgeError::BadMagic);
        }

        let flags_6 = bytes[6];
        let flags_7 = bytes[7];

        let format = match (flags_7 >> 2) & 0x03 {
            0b10 => RomFormat::Nes20,
            0b00 if bytes[12..16].iter().all(|&b| b == 0) => RomFormat::Ines,
            _ => RomFormat::ArchaicInes,
        };

        let mirroring = if flags_6 & 0x08 != 0 {
            Mirroring::FourScreen
        } else if flags_6 & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        let tv_system = if bytes[9] & 0x01 != 0 {
            TvSystem::Pal
        } else {
            TvSystem::Ntsc
        };

        Ok(Self {
            format,
            tv_system,
            mirroring,
            battery: flags_6 & 0x02 != 0,
            trainer: flags_6 & 0x04 != 0,
            vs_unisystem: flags_7 & 0x01 != 0,
            playchoice_10: flags_7 & 0x02 != 0,
            mapper_id: (flags_7 & 0xF0) | (flags_6 >> 4),
            prg_rom_banks: bytes[4],
            chr_rom_banks: bytes[5],
            prg_ram_units: bytes[8].max(1),
        })
    }

    pub fn prg_rom_size(&self) -> usize {
        usize::from(self.prg_rom_banks) * PRG_ROM_UNIT
    }

    pub fn chr_rom_size(&self) -> usize {
        usize::from(self.chr_rom_banks) * CHR_ROM_UNIT
    }

    /// PRG-RAM bytes; a unit count of 0 means one 8KB unit.
    pub fn prg_ram_size(&self) -> usize {
        usize::from(self.prg_ram_units.max(1)) * PRG_RAM_UNIT
    }
}

/// Memory owned by the cartridge board.
#[derive(Debug, Clone)]
pub struct CartridgeMemory {
    prg_rom: Vec<u8>,
    prg_ram: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
}

impl CartridgeMemory {
    /// Wrap the raw buffers. An empty `chr` becomes 8KB of CHR-RAM, and
    /// PRG-RAM is never smaller than 8KB.
    pub fn new(prg_rom: Vec<u8>, chr: Vec<u8>, prg_ram_size: usize) -> Self {
        let chr_is_ram = chr.is_empty();
        let chr = if chr_is_ram { vec![0; CHR_ROM_UNIT] } else { chr };
        Self {
            prg_rom,
            prg_ram: vec![0; prg_ram_size.max(PRG_RAM_UNIT)],
            chr,
            chr_is_ram,
        }
    }

    pub fn prg_rom(&self) -> &[u8] {
        &self.prg_rom
    }

    pub fn chr(&self) -> &[u8] {
        &self.chr
    }

    pub fn chr_is_ram(&self) -> bool {
        self.chr_is_ram
    }

    /// Number of whole PRG banks of `bank_size` bytes (at least 1).
    pub fn prg_banks(&self, bank_size: usize) -> usize {
        (self.prg_rom.len() / bank_size).max(1)
    }

    /// Number of whole CHR banks of `bank_size` bytes (at least 1).
    pub fn chr_banks(&self, bank_size: usize) -> usize {
        (self.chr.len() / bank_size).max(1)
    }

    /// Read PRG-ROM at an absolute offset, wrapped to the image size.
    pub fn read_prg(&self, offset: usize) -> u8 {
        self.prg_rom[offset % self.prg_rom.len()]
    }

    pub fn read_chr(&self, offset: usize) -> u8 {
        self.chr[offset % self.chr.len()]
    }

    /// Write CHR memory. Writes to CHR-ROM are dropped.
    pub fn write_chr(&mut self, offset: usize, value: u8) {
        if self.chr_is_ram {
            let len = self.chr.len();
            self.chr[offset % len] = value;
        } else {
            warn!("write ${value:02X} to CHR-ROM offset ${offset:05X} ignored");
        }
    }

    /// Read PRG-RAM through the $6000-$7FFF window.
    pub fn read_prg_ram(&self, address: u16) -> u8 {
        self.prg_ram[usize::from(address - 0x6000) % self.prg_ram.len()]
    }

    pub fn write_prg_ram(&mut self, address: u16, value: u8) {
        let len = self.prg_ram.len();
        self.prg_ram[usize::from(address - 0x6000) % len] = value;
    }
}

/// A loaded cartridge: header, owned memory, mapper state and the
/// nametable-offset table the PPU bus consults.
#[derive(Debug, Clone)]
pub struct Cartridge {
    header: InesHeader,
    memory: CartridgeMemory,
    mapper: Mapper,
    mirroring: Mirroring,
    nametable_offsets: [u16; 4],
}

impl Cartridge {
    /// Load a complete iNES image.
    pub fn from_ines(bytes: &[u8]) -> Result<Self, CartridgeError> {
        let header = InesHeader::parse(bytes)?;

        let mut offset = HEADER_SIZE;
        if header.trainer {
            offset += TRAINER_SIZE;
        }

        let prg_rom = take(bytes, &mut offset, header.prg_rom_size(), "PRG-ROM")?;
        let chr_rom = take(bytes, &mut offset, header.chr_rom_size(), "CHR-ROM")?;

        Self::from_parts(header, prg_rom.to_vec(), chr_rom.to_vec())
    }

    /// Build a cartridge from an already decoded header and raw ROM bytes.
    pub fn from_parts(
        header: InesHeader,
        prg_rom: Vec<u8>,
        chr_rom: Vec<u8>,
    ) -> Result<Self, CartridgeError> {
        if header.format != RomFormat::Ines {
            return Err(CartridgeError::UnsupportedFormat(header.format));
        }
        if header.tv_system != TvSystem::Ntsc {
            return Err(CartridgeError::UnsupportedTvSystem(header.tv_system));
        }
        if prg_rom.is_empty() {
            return Err(CartridgeError::EmptyPrgRom);
        }

        let capabilities = Mapper::capabilities(header.mapper_id)
            .ok_or(CartridgeError::UnsupportedMapper(header.mapper_id))?;
        if chr_rom.is_empty() && !capabilities.chr_ram {
            return Err(CartridgeError::ChrRamUnsupported(header.mapper_id));
        }

        let memory = CartridgeMemory::new(prg_rom, chr_rom, header.prg_ram_size());
        let mapper = Mapper::new(header.mapper_id, &memory)?;

        // AxROM boards drive A10 themselves from power-on.
        let mirroring = mapper.initial_mirroring().unwrap_or(header.mirroring);

        info!(
            "cartridge: mapper {:03}, PRG-ROM {}KB, CHR-{} {}KB, PRG-RAM {}KB, {:?} mirroring",
            header.mapper_id,
            memory.prg_rom().len() / 1024,
            if memory.chr_is_ram() { "RAM" } else { "ROM" },
            memory.chr().len() / 1024,
            header.prg_ram_size() / 1024,
            mirroring,
        );

        Ok(Self {
            header,
            memory,
            mapper,
            mirroring,
            nametable_offsets: mirroring.nametable_offsets(),
        })
    }

    pub fn header(&self) -> &InesHeader {
        &self.header
    }

    pub fn mapper_id(&self) -> u8 {
        self.header.mapper_id
    }

    pub fn mapper(&self) -> &Mapper {
        &self.mapper
    }

    pub fn prg_rom(&self) -> &[u8] {
        self.memory.prg_rom()
    }

    pub fn chr(&self) -> &[u8] {
        self.memory.chr()
    }

    pub fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    /// Switch the nametable arrangement and recompute the offset table.
    /// A four-screen board ignores mapper requests.
    pub fn set_mirroring(&mut self, mirroring: Mirroring) {
        if self.header.mirroring == Mirroring::FourScreen {
            return;
        }
        self.mirroring = mirroring;
        self.nametable_offsets = mirroring.nametable_offsets();
    }

    /// VRAM offset of nametable quadrant `quadrant` (0-3).
    pub fn nametable_offset(&self, quadrant: usize) -> u16 {
        self.nametable_offsets[quadrant & 3]
    }

    /// CPU read in $4020-$FFFF.
    pub fn read_cpu(&self, address: u16) -> Result<u8, MapperError> {
        match self.mapper.read_cpu(&self.memory, address)? {
            Some(value) => Ok(value),
            None => {
                warn!("read from unmapped cartridge address ${address:04X}");
                Ok(0)
            }
        }
    }

    /// Side-effect-free CPU read for debuggers and tracers.
    pub fn peek_cpu(&self, address: u16) -> u8 {
        self.mapper
            .read_cpu(&self.memory, address)
            .ok()
            .flatten()
            .unwrap_or(0)
    }

    /// CPU write in $4020-$FFFF. Mirroring changes requested by the mapper
    /// are applied before this returns.
    pub fn write_cpu(&mut self, address: u16, value: u8) -> Result<(), MapperError> {
        if let Some(mirroring) = self.mapper.write_cpu(&mut self.memory, address, value)? {
            self.set_mirroring(mirroring);
        }
        Ok(())
    }

    /// Pattern-table read in $0000-$1FFF.
    pub fn read_ppu(&self, address: u16) -> u8 {
        self.mapper.read_ppu(&self.memory, address)
    }

    pub fn write_ppu(&mut self, address: u16, value: u8) {
        self.mapper.write_ppu(&mut self.memory, address, value);
    }

    /// Scanline hook, called once per rendered line. Returns true when the
    /// mapper raises its IRQ.
    pub fn scanline_irq(&mut self) -> bool {
        self.mapper.scanline_irq()
    }

    /// Current level of the cartridge IRQ output.
    pub fn irq_line(&self) -> bool {
        self.mapper.irq_line()
    }
}

fn take<'a>(
    bytes: &'a [u8],
    offset: &mut usize,
    len: usize,
    section: &'static str,
) -> Result<&'a [u8], CartridgeError> {
    let available = bytes.len().saturating_sub(*offset);
    if available < len {
        return Err(CartridgeError::Truncated {
            section,
            expected: len,
            actual: available,
        });
    }
    let slice = &bytes[*offset..*offset + len];
    *offset += len;
    Ok(slice)
}
