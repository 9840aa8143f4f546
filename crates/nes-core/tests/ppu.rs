//! PPU tests for the NES emulator

use nes_core::cartridge::Cartridge;
use nes_core::ppu::{
    Interrupt, Ppu, PpuRegister, RenderState, DOTS_PER_SCANLINE, PRE_RENDER_SCANLINE,
    SCANLINES_PER_FRAME,
};
use nes_core::ppu_bus::PpuBus;

/// NROM cartridge whose CHR tile 0 is solid colour 1.
fn ppu() -> Ppu {
    let mut image = vec![b'N', b'E', b'S', 0x1A, 1, 1, 0, 0];
    image.resize(16 + 0x4000, 0);
    let mut chr = vec![0; 0x2000];
    chr[..8].fill(0xFF);
    image.extend_from_slice(&chr);
    Ppu::new(PpuBus::new(Cartridge::from_ines(&image).unwrap()))
}

/// Clock until (scanline, dot) is the next dot to be processed.
fn clock_to(ppu: &mut Ppu, scanline: u16, dot: u16) -> Vec<Interrupt> {
    let mut interrupts = Vec::new();
    while !(ppu.scanline() == scanline && ppu.dot() == dot) {
        if ppu.is_frame_finished() {
            ppu.start_next_frame();
        }
        let interrupt = ppu.clock();
        if interrupt != Interrupt::None {
            interrupts.push(interrupt);
        }
    }
    interrupts
}

#[test]
fn test_ppu_power_on() {
    let ppu = ppu();
    assert_eq!(ppu.scanline(), 0);
    assert_eq!(ppu.dot(), 0);
    assert_eq!(ppu.state(), RenderState::Render);
    assert!(!ppu.status().vblank());
}

#[test]
fn test_state_sequence() {
    let mut ppu = ppu();
    clock_to(&mut ppu, 240, 0);
    assert_eq!(ppu.state(), RenderState::PostRender);
    clock_to(&mut ppu, 241, 0);
    assert_eq!(ppu.state(), RenderState::VerticalBlanking);

    clock_to(&mut ppu, 260, DOTS_PER_SCANLINE - 1);
    ppu.clock();
    assert_eq!(ppu.state(), RenderState::Finished);
    assert_eq!(ppu.frame_count(), 1);

    // Finished holds until released
    assert_eq!(ppu.clock(), Interrupt::None);
    assert_eq!(ppu.state(), RenderState::Finished);

    ppu.start_next_frame();
    assert_eq!(ppu.state(), RenderState::PreRender);
    assert_eq!(ppu.scanline(), PRE_RENDER_SCANLINE);
}

#[test]
fn test_vblank_sets_at_241_dot_1() {
    let mut ppu = ppu();
    clock_to(&mut ppu, 241, 1);
    assert!(!ppu.status().vblank());
    ppu.clock();
    assert!(ppu.status().vblank());
}

#[test]
fn test_vblank_nmi_only_when_enabled() {
    let mut ppu = ppu();
    let interrupts = clock_to(&mut ppu, 242, 0);
    assert!(interrupts.is_empty());

    let mut ppu = self::ppu();
    ppu.write_register(PpuRegister::PpuCtrl, 0x80);
    let interrupts = clock_to(&mut ppu, 242, 0);
    assert_eq!(interrupts, vec![Interrupt::Nmi]);
}

#[test]
fn test_pre_render_clears_flags() {
    let mut ppu = ppu();
    clock_to(&mut ppu, 250, 0);
    assert!(ppu.status().vblank());
    clock_to(&mut ppu, PRE_RENDER_SCANLINE, 2);
    assert!(!ppu.status().vblank());
}

#[test]
fn test_frame_length_without_rendering() {
    let mut ppu = ppu();
    let mut dots = 0u32;
    while !ppu.is_frame_finished() {
        ppu.clock();
        dots += 1;
    }
    // Scanlines 0-260
    assert_eq!(dots, u32::from(DOTS_PER_SCANLINE) * u32::from(SCANLINES_PER_FRAME - 1));

    ppu.start_next_frame();
    let mut dots = 0;
    while ppu.scanline() != 0 || ppu.dot() != 0 {
        ppu.clock();
        dots += 1;
    }
    assert_eq!(dots, DOTS_PER_SCANLINE);
}

#[test]
fn test_odd_frame_skips_a_dot_when_rendering() {
    let mut ppu = ppu();
    ppu.write_register(PpuRegister::PpuMask, 0x08);

    // Frame 1 ends odd
    clock_to(&mut ppu, PRE_RENDER_SCANLINE, 0);
    assert!(ppu.odd_frame());
    ppu.start_next_frame();
    let mut dots = 0;
    while ppu.scanline() != 0 || ppu.dot() != 0 {
        ppu.clock();
        dots += 1;
    }
    assert_eq!(dots, DOTS_PER_SCANLINE - 1);

    // Frame 2 ends even: full pre-render line
    clock_to(&mut ppu, PRE_RENDER_SCANLINE, 0);
    assert!(!ppu.odd_frame());
    ppu.start_next_frame();
    let mut dots = 0;
    while ppu.scanline() != 0 || ppu.dot() != 0 {
        ppu.clock();
        dots += 1;
    }
    assert_eq!(dots, DOTS_PER_SCANLINE);
}

#[test]
fn test_sprite_zero_hit() {
    let mut ppu = ppu();
    // Sprite 0 at Y=10 (drawn from line 11), X=20, tile 0
    ppu.write_register(PpuRegister::OamAddr, 0);
    for byte in [10, 0, 0, 20] {
        ppu.write_register(PpuRegister::OamData, byte);
    }
    // Background tiles are all tile 0, which is opaque
    ppu.write_register(PpuRegister::PpuMask, 0x1E);

    clock_to(&mut ppu, 11, 0);
    assert!(!ppu.status().sprite_zero_hit());
    clock_to(&mut ppu, 11, 30);
    assert!(ppu.status().sprite_zero_hit());

    clock_to(&mut ppu, PRE_RENDER_SCANLINE, 2);
    assert!(!ppu.status().sprite_zero_hit());
}

/// Sprite 0 at (x, y) using the solid tile 0, both layers on.
fn place_sprite_zero(ppu: &mut Ppu, x: u8, y: u8) {
    ppu.write_register(PpuRegister::OamAddr, 0);
    for byte in [y, 0, 0, x] {
        ppu.write_register(PpuRegister::OamData, byte);
    }
    ppu.write_register(PpuRegister::PpuMask, 0x1E);
}

#[test]
fn test_no_sprite_zero_hit_at_x_255() {
    let mut ppu = ppu();
    // Only column 255 of the sprite is on screen
    place_sprite_zero(&mut ppu, 255, 10);

    clock_to(&mut ppu, 20, 0);
    assert!(!ppu.status().sprite_zero_hit());
    clock_to(&mut ppu, 240, 0);
    assert!(!ppu.status().sprite_zero_hit());
}

#[test]
fn test_sprite_zero_hit_latches_once_per_frame() {
    let mut ppu = ppu();
    place_sprite_zero(&mut ppu, 20, 10);

    clock_to(&mut ppu, 11, 30);
    assert!(ppu.status().sprite_zero_hit());

    // A status read clears vblank only; the hit holds until pre-render
    clock_to(&mut ppu, 245, 0);
    let status = ppu.read_register(PpuRegister::PpuStatus, 0);
    assert_ne!(status & 0x40, 0);
    assert!(ppu.status().sprite_zero_hit());

    clock_to(&mut ppu, PRE_RENDER_SCANLINE, 2);
    assert!(!ppu.status().sprite_zero_hit());

    // Next frame: clear until the first overlap, then set again
    clock_to(&mut ppu, 11, 0);
    assert!(!ppu.status().sprite_zero_hit());
    clock_to(&mut ppu, 11, 30);
    assert!(ppu.status().sprite_zero_hit());
}

#[test]
fn test_backdrop_fills_frame_when_rendering_off() {
    let mut ppu = ppu();
    ppu.write_register(PpuRegister::PpuAddr, 0x3F);
    ppu.write_register(PpuRegister::PpuAddr, 0x00);
    ppu.write_register(PpuRegister::PpuData, 0x30);
    ppu.write_register(PpuRegister::PpuAddr, 0x00);
    ppu.write_register(PpuRegister::PpuAddr, 0x00);

    clock_to(&mut ppu, 240, 0);
    let pixel = &ppu.frame_buffer()[..4];
    assert_eq!(pixel, &[236u8, 238, 236, 255]);
}

#[test]
fn test_greyscale_masks_palette_index() {
    let mut ppu = ppu();
    ppu.write_register(PpuRegister::PpuAddr, 0x3F);
    ppu.write_register(PpuRegister::PpuAddr, 0x00);
    ppu.write_register(PpuRegister::PpuData, 0x16);
    ppu.write_register(PpuRegister::PpuAddr, 0x00);
    ppu.write_register(PpuRegister::PpuAddr, 0x00);
    ppu.write_register(PpuRegister::PpuMask, 0x01);

    clock_to(&mut ppu, 1, 0);
    // $16 & $30 = $10
    assert_eq!(&ppu.frame_buffer()[..3], &[152u8, 150, 152]);
}
