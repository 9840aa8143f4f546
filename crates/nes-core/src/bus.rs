//! CPU memory bus
//!
//! The NES memory map:
//! $0000-$07FF - 2KB Internal RAM
//! $0800-$1FFF - RAM mirroring (repeats every $0800 bytes)
//! $2000-$2007 - PPU registers
//! $2008-$3FFF - PPU registers (mirrored every $08 bytes)
//! $4000-$4017 - APU and I/O registers (APU stubbed, $4014 DMA, $4016/7 pads)
//! $4018-$401F - CPU test mode (disabled on retail consoles)
//! $4020-$FFFF - Cartridge
//!
//! Every access leaves its value on the data bus. Reads of registers that
//! drive nothing return that latched value.

use log::trace;
use thiserror::Error;

use crate::cartridge::Cartridge;
use crate::controller::StandardController;
use crate::cpu::Bus;
use crate::mapper::MapperError;
use crate::ppu::{Ppu, PpuRegister};

/// RAM size in bytes
pub const RAM_SIZE: usize = 2048;

/// Runtime bus faults. These halt emulation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("access to CPU test-mode register ${0:04X}")]
    TestMode(u16),
    #[error(transparent)]
    Mapper(#[from] MapperError),
}

/// The CPU's view of the console.
#[derive(Debug, Clone)]
pub struct CpuBus {
    ram: [u8; RAM_SIZE],
    ppu: Ppu,
    controllers: [StandardController; 2],
    /// Last value driven on the data bus
    open_bus: u8,
    /// Page written to $4014, waiting for the DMA unit
    dma_page: Option<u8>,
}

impl CpuBus {
    pub fn new(ppu: Ppu) -> Self {
        Self {
            ram: [0; RAM_SIZE],
            ppu,
            controllers: [StandardController::new(), StandardController::new()],
            open_bus: 0,
            dma_page: None,
        }
    }

    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn ppu_mut(&mut self) -> &mut Ppu {
        &mut self.ppu
    }

    pub fn cartridge(&self) -> &Cartridge {
        self.ppu.bus().cartridge()
    }

    pub fn cartridge_mut(&mut self) -> &mut Cartridge {
        self.ppu.bus_mut().cartridge_mut()
    }

    pub fn ram(&self) -> &[u8; RAM_SIZE] {
        &self.ram
    }

    pub fn open_bus(&self) -> u8 {
        self.open_bus
    }

    /// Held buttons for controller `port` (0 or 1).
    pub fn set_buttons(&mut self, port: usize, mask: u8) {
        if let Some(controller) = self.controllers.get_mut(port) {
            controller.set_buttons(mask);
        }
    }

    pub fn controller(&self, port: usize) -> Option<&StandardController> {
        self.controllers.get(port)
    }

    /// Take the page requested through $4014, if any.
    pub fn take_dma_request(&mut self) -> Option<u8> {
        self.dma_page.take()
    }

    fn read_unlatched(&mut self, address: u16) -> Result<u8, BusError> {
        Ok(match address {
            0x0000..=0x1FFF => self.ram[usize::from(address & 0x07FF)],
            0x2000..=0x3FFF => self
                .ppu
                .read_register(PpuRegister::from_address(address), self.open_bus),
            0x4016 => (self.open_bus & 0xE0) | self.controllers[0].read(),
            0x4017 => (self.open_bus & 0xE0) | self.controllers[1].read(),
            // APU registers are stubbed
            0x4000..=0x4015 => self.open_bus,
            0x4018..=0x401F => return Err(BusError::TestMode(address)),
            _ => self.cartridge().read_cpu(address)?,
        })
    }
}

impl Bus for CpuBus {
    fn read(&mut self, address: u16) -> Result<u8, BusError> {
        let value = self.read_unlatched(address)?;
        self.open_bus = value;
        Ok(value)
    }

    fn write(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        self.open_bus = value;
        match address {
            0x0000..=0x1FFF => self.ram[usize::from(address & 0x07FF)] = value,
            0x2000..=0x3FFF => self
                .ppu
                .write_register(PpuRegister::from_address(address), value),
            0x4014 => self.dma_page = Some(value),
            0x4016 => {
                for controller in &mut self.controllers {
                    controller.strobe_write(value);
                }
            }
            0x4000..=0x4017 => trace!("APU write ${value:02X} to ${address:04X} ignored"),
            0x4018..=0x401F => return Err(BusError::TestMode(address)),
            _ => self.cartridge_mut().write_cpu(address, value)?,
        }
        Ok(())
    }

    fn peek(&self, address: u16) -> u8 {
        match address {
            0x0000..=0x1FFF => self.ram[usize::from(address & 0x07FF)],
            0x2000..=0x3FFF => self
                .ppu
                .peek_register(PpuRegister::from_address(address), self.open_bus),
            0x4016 => (self.open_bus & 0xE0) | self.controllers[0].peek(),
            0x4017 => (self.open_bus & 0xE0) | self.controllers[1].peek(),
            0x4000..=0x401F => self.open_bus,
            _ => self.cartridge().peek_cpu(address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::button;
    use crate::ppu_bus::PpuBus;

    fn bus() -> CpuBus {
        let mut image = vec![b'N', b'E', b'S', 0x1A, 1, 1, 0, 0];
        image.resize(16 + 0x4000 + 0x2000, 0);
        image[16] = 0xEA;
        let cartridge = Cartridge::from_ines(&image).unwrap();
        CpuBus::new(Ppu::new(PpuBus::new(cartridge)))
    }

    #[test]
    fn test_ram_mirroring() {
        let mut bus = bus();
        bus.write(0x0001, 0x42).unwrap();
        assert_eq!(bus.read(0x0801).unwrap(), 0x42);
        assert_eq!(bus.read(0x1801).unwrap(), 0x42);
    }

    #[test]
    fn test_write_only_ppu_port_returns_open_bus() {
        let mut bus = bus();
        bus.write(0x2000, 0x5A).unwrap();
        assert_eq!(bus.read(0x2005).unwrap(), 0x5A);
        assert_eq!(bus.read(0x3FF8).unwrap(), 0x5A);
    }

    #[test]
    fn test_status_low_bits_from_open_bus() {
        let mut bus = bus();
        bus.write(0x2001, 0x1F).unwrap();
        assert_eq!(bus.read(0x2002).unwrap(), 0x1F);
    }

    #[test]
    fn test_cartridge_read_updates_latch() {
        let mut bus = bus();
        assert_eq!(bus.read(0x8000).unwrap(), 0xEA);
        assert_eq!(bus.open_bus(), 0xEA);
        assert_eq!(bus.read(0x4000).unwrap(), 0xEA);
    }

    #[test]
    fn test_test_mode_is_fatal() {
        let mut bus = bus();
        assert_eq!(bus.read(0x4018), Err(BusError::TestMode(0x4018)));
        assert_eq!(bus.write(0x401F, 0), Err(BusError::TestMode(0x401F)));
    }

    #[test]
    fn test_dma_request_latched() {
        let mut bus = bus();
        bus.write(0x4014, 0x02).unwrap();
        assert_eq!(bus.take_dma_request(), Some(0x02));
        assert_eq!(bus.take_dma_request(), None);
    }

    #[test]
    fn test_controller_read_keeps_upper_open_bus_bits() {
        let mut bus = bus();
        bus.set_buttons(0, button::A);
        bus.write(0x4016, 1).unwrap();
        bus.write(0x4016, 0).unwrap();
        assert_eq!(bus.read(0x4016).unwrap(), 0x01);
        bus.write(0x0000, 0x40).unwrap();
        assert_eq!(bus.read(0x4016).unwrap(), 0x40);
    }

    #[test]
    fn test_peek_has_no_side_effects() {
        let mut bus = bus();
        bus.write(0x0010, 0x99).unwrap();
        bus.write(0x2001, 0x00).unwrap();
        assert_eq!(bus.peek(0x0010), 0x99);
        assert_eq!(bus.peek(0x8000), 0xEA);
        assert_eq!(bus.open_bus(), 0x00);
    }
}
