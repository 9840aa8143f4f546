//! Cartridge loading and mapper tests

use nes_core::cartridge::{
    Cartridge, CartridgeError, InesHeader, Mirroring, RomFormat, TvSystem, PRG_RAM_UNIT,
};
use nes_core::mapper::MapperError;

/// iNES image with `prg_banks` 16KB banks and `chr_banks` 8KB banks. Every
/// PRG bank is filled with its own index, every CHR bank with 0x80 | index.
fn image(mapper: u8, prg_banks: u8, chr_banks: u8, flags_6: u8) -> Vec<u8> {
    let mut bytes = vec![
        b'N',
        b'E',
        b'S',
        0x1A,
        prg_banks,
        chr_banks,
        (mapper << 4) | flags_6,
        mapper & 0xF0,
    ];
    bytes.resize(16, 0);
    for bank in 0..prg_banks {
        bytes.extend(std::iter::repeat(bank).take(0x4000));
    }
    for bank in 0..chr_banks {
        bytes.extend(std::iter::repeat(0x80 | bank).take(0x2000));
    }
    bytes
}

#[test]
fn test_rejects_bad_magic_and_short_images() {
    assert_eq!(Cartridge::from_ines(&[0; 8]).unwrap_err(), CartridgeError::TooShort(8));
    let mut bytes = image(0, 1, 1, 0);
    bytes[3] = 0;
    assert_eq!(Cartridge::from_ines(&bytes).unwrap_err(), CartridgeError::BadMagic);
}

#[test]
fn test_rejects_nes20_archaic_and_pal() {
    let mut nes20 = image(0, 1, 1, 0);
    nes20[7] |= 0x08;
    assert_eq!(
        Cartridge::from_ines(&nes20).unwrap_err(),
        CartridgeError::UnsupportedFormat(RomFormat::Nes20)
    );

    let mut archaic = image(0, 1, 1, 0);
    archaic[12..16].copy_from_slice(b"DISK");
    assert_eq!(
        Cartridge::from_ines(&archaic).unwrap_err(),
        CartridgeError::UnsupportedFormat(RomFormat::ArchaicInes)
    );

    let mut pal = image(0, 1, 1, 0);
    pal[9] = 0x01;
    assert_eq!(
        Cartridge::from_ines(&pal).unwrap_err(),
        CartridgeError::UnsupportedTvSystem(TvSystem::Pal)
    );
}

#[test]
fn test_rejects_unknown_mapper_and_truncation() {
    assert_eq!(
        Cartridge::from_ines(&image(5, 1, 1, 0)).unwrap_err(),
        CartridgeError::UnsupportedMapper(5)
    );

    let mut short = image(0, 2, 1, 0);
    short.truncate(16 + 0x4000);
    assert_eq!(
        Cartridge::from_ines(&short).unwrap_err(),
        CartridgeError::Truncated {
            section: "PRG-ROM",
            expected: 0x8000,
            actual: 0x4000,
        }
    );
}

#[test]
fn test_trainer_is_skipped() {
    let plain = image(0, 1, 1, 0);
    let mut with_trainer = plain[..16].to_vec();
    with_trainer[6] |= 0x04;
    with_trainer.extend_from_slice(&[0xEE; 512]);
    with_trainer.extend_from_slice(&plain[16..]);

    let cartridge = Cartridge::from_ines(&with_trainer).unwrap();
    assert_eq!(cartridge.read_cpu(0x8000).unwrap(), 0x00);
    assert_eq!(cartridge.read_ppu(0x0000), 0x80);
}

#[test]
fn test_nrom_128_mirrors_prg() {
    let cartridge = Cartridge::from_ines(&image(0, 1, 1, 0)).unwrap();
    assert_eq!(cartridge.read_cpu(0xC000).unwrap(), cartridge.read_cpu(0x8000).unwrap());
    assert_eq!(cartridge.mirroring(), Mirroring::Horizontal);
}

#[test]
fn test_chr_rom_is_read_only() {
    let mut cartridge = Cartridge::from_ines(&image(0, 1, 1, 0)).unwrap();
    cartridge.write_ppu(0x0010, 0x00);
    assert_eq!(cartridge.read_ppu(0x0010), 0x80);
}

#[test]
fn test_uxrom_switches_low_window() {
    let mut cartridge = Cartridge::from_ines(&image(2, 4, 0, 0)).unwrap();
    assert_eq!(cartridge.read_cpu(0x8000).unwrap(), 0);
    assert_eq!(cartridge.read_cpu(0xC000).unwrap(), 3);

    cartridge.write_cpu(0x8000, 2).unwrap();
    assert_eq!(cartridge.read_cpu(0x8000).unwrap(), 2);
    assert_eq!(cartridge.read_cpu(0xFFFF).unwrap(), 3);
}

#[test]
fn test_prg_ram_access_without_ram_is_fatal() {
    let mut cartridge = Cartridge::from_ines(&image(2, 2, 0, 0)).unwrap();
    assert_eq!(
        cartridge.read_cpu(0x6000),
        Err(MapperError::UnsupportedPrgRam { mapper: 2, address: 0x6000 })
    );
    assert!(cartridge.write_cpu(0x7FFF, 1).is_err());
}

#[test]
fn test_cnrom_without_chr_rom_is_rejected() {
    assert_eq!(
        Cartridge::from_ines(&image(3, 1, 0, 0)).unwrap_err(),
        CartridgeError::ChrRamUnsupported(3)
    );
}

/// Five serial writes of `value` to an MMC1 register.
fn mmc1_write(cartridge: &mut Cartridge, address: u16, value: u8) {
    for bit in 0..5 {
        cartridge.write_cpu(address, (value >> bit) & 0x01).unwrap();
    }
}

#[test]
fn test_mmc1_control_sets_mirroring() {
    let mut cartridge = Cartridge::from_ines(&image(1, 2, 1, 0)).unwrap();
    mmc1_write(&mut cartridge, 0x8000, 0x0E);
    assert_eq!(cartridge.mirroring(), Mirroring::Vertical);
    mmc1_write(&mut cartridge, 0x8000, 0x0F);
    assert_eq!(cartridge.mirroring(), Mirroring::Horizontal);
    mmc1_write(&mut cartridge, 0x8000, 0x0C);
    assert_eq!(cartridge.mirroring(), Mirroring::SingleScreenLower);
    assert_eq!(cartridge.nametable_offset(3), 0x000);
}

#[test]
fn test_mmc1_prg_bank_and_reset_bit() {
    let mut cartridge = Cartridge::from_ines(&image(1, 4, 1, 0)).unwrap();
    assert_eq!(cartridge.read_cpu(0xC000).unwrap(), 3);
    mmc1_write(&mut cartridge, 0xE000, 2);
    assert_eq!(cartridge.read_cpu(0x8000).unwrap(), 2);

    // A partial load is discarded by the reset bit
    cartridge.write_cpu(0xE000, 1).unwrap();
    cartridge.write_cpu(0xE000, 0x80).unwrap();
    mmc1_write(&mut cartridge, 0xE000, 1);
    assert_eq!(cartridge.read_cpu(0x8000).unwrap(), 1);
}

#[test]
fn test_mmc1_prg_ram() {
    let mut cartridge = Cartridge::from_ines(&image(1, 2, 1, 0)).unwrap();
    cartridge.write_cpu(0x6123, 0x5A).unwrap();
    assert_eq!(cartridge.read_cpu(0x6123).unwrap(), 0x5A);
}

#[test]
fn test_from_parts_with_zero_prg_ram_units() {
    let bytes = image(0, 1, 1, 0);
    let mut header = InesHeader::parse(&bytes).unwrap();
    header.prg_ram_units = 0;
    assert_eq!(header.prg_ram_size(), PRG_RAM_UNIT);

    let prg = bytes[16..16 + 0x4000].to_vec();
    let chr = bytes[16 + 0x4000..].to_vec();
    let mut cartridge = Cartridge::from_parts(header, prg, chr).unwrap();
    cartridge.write_cpu(0x7FFF, 0x42).unwrap();
    assert_eq!(cartridge.read_cpu(0x6000).unwrap(), 0x00);
    assert_eq!(cartridge.read_cpu(0x7FFF).unwrap(), 0x42);
}

#[test]
fn test_mmc3_scanline_irq() {
    let mut cartridge = Cartridge::from_ines(&image(4, 2, 1, 0)).unwrap();
    cartridge.write_cpu(0xC000, 2).unwrap();
    cartridge.write_cpu(0xC001, 0).unwrap();
    cartridge.write_cpu(0xE001, 0).unwrap();

    // Reload to 2, then 1, then 0 raises the IRQ
    assert!(!cartridge.scanline_irq());
    assert!(!cartridge.scanline_irq());
    assert!(cartridge.scanline_irq());
    assert!(cartridge.irq_line());
    // The line stays high until $E000 acknowledges it
    assert!(!cartridge.scanline_irq());
    assert!(cartridge.irq_line());

    cartridge.write_cpu(0xE000, 0).unwrap();
    assert!(!cartridge.irq_line());
    assert!(!cartridge.scanline_irq());
}

#[test]
fn test_mmc3_mirroring_register() {
    let mut cartridge = Cartridge::from_ines(&image(4, 2, 1, 0)).unwrap();
    cartridge.write_cpu(0xA000, 0).unwrap();
    assert_eq!(cartridge.mirroring(), Mirroring::Vertical);
    cartridge.write_cpu(0xA000, 1).unwrap();
    assert_eq!(cartridge.mirroring(), Mirroring::Horizontal);
}

#[test]
fn test_four_screen_ignores_mapper_mirroring() {
    let mut cartridge = Cartridge::from_ines(&image(4, 2, 1, 0x08)).unwrap();
    cartridge.write_cpu(0xA000, 0).unwrap();
    assert_eq!(cartridge.mirroring(), Mirroring::FourScreen);
    assert_eq!(cartridge.nametable_offset(3), 0xC00);
}

#[test]
fn test_axrom_starts_single_screen() {
    let mut cartridge = Cartridge::from_ines(&image(7, 4, 0, 0x01)).unwrap();
    assert_eq!(cartridge.mirroring(), Mirroring::SingleScreenLower);
    cartridge.write_cpu(0x8000, 0x11).unwrap();
    assert_eq!(cartridge.mirroring(), Mirroring::SingleScreenUpper);
    assert_eq!(cartridge.read_cpu(0x8000).unwrap(), 2);
}

#[test]
fn test_gxrom_latch() {
    let mut cartridge = Cartridge::from_ines(&image(66, 4, 4, 0)).unwrap();
    cartridge.write_cpu(0x8000, 0x12).unwrap();
    assert_eq!(cartridge.read_cpu(0x8000).unwrap(), 2);
    assert_eq!(cartridge.read_ppu(0x0000), 0x82);
}
