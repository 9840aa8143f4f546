//! PPU address space
//!
//! $0000-$1FFF - Pattern tables (cartridge CHR through the mapper)
//! $2000-$2FFF - Nametables (console VRAM through the cartridge offset table)
//! $3000-$3EFF - Mirror of $2000-$2EFF
//! $3F00-$3FFF - Palette RAM (32 bytes, mirrored)

use crate::cartridge::Cartridge;

/// Console VRAM. 2KB on the board; sized for four-screen cartridges.
pub const VRAM_SIZE: usize = 0x1000;

/// Palette RAM size
pub const PALETTE_SIZE: usize = 32;

/// The PPU's view of memory. Owns the cartridge, which the CPU bus reaches
/// through the PPU.
#[derive(Debug, Clone)]
pub struct PpuBus {
    cartridge: Cartridge,
    vram: Box<[u8; VRAM_SIZE]>,
    palette: [u8; PALETTE_SIZE],
}

impl PpuBus {
    pub fn new(cartridge: Cartridge) -> Self {
        Self {
            cartridge,
            vram: Box::new([0; VRAM_SIZE]),
            palette: [0; PALETTE_SIZE],
        }
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.cartridge
    }

    pub fn cartridge_mut(&mut self) -> &mut Cartridge {
        &mut self.cartridge
    }

    /// Read a byte from the 14-bit PPU address space.
    pub fn read(&self, address: u16) -> u8 {
        let address = address & 0x3FFF;
        match address {
            0x0000..=0x1FFF => self.cartridge.read_ppu(address),
            0x2000..=0x3EFF => self.vram[self.nametable_index(address)],
            _ => self.palette[palette_index(address)],
        }
    }

    /// Write a byte to the 14-bit PPU address space.
    pub fn write(&mut self, address: u16, value: u8) {
        let address = address & 0x3FFF;
        match address {
            0x0000..=0x1FFF => self.cartridge.write_ppu(address, value),
            0x2000..=0x3EFF => {
                let index = self.nametable_index(address);
                self.vram[index] = value;
            }
            _ => self.palette[palette_index(address)] = value & 0x3F,
        }
    }

    /// Palette entry `index` (0-31), mirroring applied.
    pub fn palette_entry(&self, index: u8) -> u8 {
        self.palette[palette_index(u16::from(index))]
    }

    /// Clock the cartridge scanline counter.
    pub fn scanline_irq(&mut self) -> bool {
        self.cartridge.scanline_irq()
    }

    fn nametable_index(&self, address: u16) -> usize {
        let address = address & 0x0FFF;
        let quadrant = usize::from(address >> 10);
        usize::from(self.cartridge.nametable_offset(quadrant) + (address & 0x03FF))
    }
}

/// $3F10/$3F14/$3F18/$3F1C alias the background entries below them.
fn palette_index(address: u16) -> usize {
    let index = usize::from(address & 0x1F);
    if index & 0x13 == 0x10 {
        index & !0x10
    } else {
        index
    }
}
