//! PPU (Picture Processing Unit) implementation
//!
//! The 2C02 is stepped one dot at a time by [`Ppu::clock`]. A frame is 262
//! scanlines of 341 dots:
//!
//! | scanlines | state                          |
//! |-----------|--------------------------------|
//! | 0-239     | [`RenderState::Render`]        |
//! | 240       | [`RenderState::PostRender`]    |
//! | 241-260   | [`RenderState::VerticalBlanking`] |
//! | -         | [`RenderState::Finished`]      |
//! | 261       | [`RenderState::PreRender`]     |
//!
//! `Finished` is reached when scanline 260 ends. The PPU stops there until
//! the owner calls [`Ppu::start_next_frame`], which gives it a chance to hand
//! the completed frame buffer to a frontend.
//!
//! Scrolling uses the "loopy" register model: `v` is the current VRAM
//! address, `t` the temporary address, `x` the fine X scroll and `w` the
//! shared write toggle of $2005/$2006.
//!
//! ```text
//! v/t: yyy NN YYYYY XXXXX
//!      ||| || ||||| +++++-- coarse X scroll
//!      ||| || +++++-------- coarse Y scroll
//!      ||| ++-------------- nametable select
//!      +++----------------- fine Y scroll
//! ```

use crate::ppu_bus::PpuBus;

/// OAM size in bytes (64 sprites of 4 bytes)
pub const OAM_SIZE: usize = 256;
/// Visible width in pixels
pub const FRAME_WIDTH: usize = 256;
/// Visible height in pixels
pub const FRAME_HEIGHT: usize = 240;
/// Dots per scanline
pub const DOTS_PER_SCANLINE: u16 = 341;
/// Scanlines per NTSC frame
pub const SCANLINES_PER_FRAME: u16 = 262;
/// First scanline after the visible picture
pub const POST_RENDER_SCANLINE: u16 = 240;
/// Scanline on which VBlank begins
pub const VBLANK_SCANLINE: u16 = 241;
/// Pre-render scanline
pub const PRE_RENDER_SCANLINE: u16 = 261;
/// Sprites the PPU can draw on a single scanline
pub const MAX_SPRITES_PER_LINE: usize = 8;

/// NTSC 2C02 palette as RGB triplets.
#[rustfmt::skip]
pub const NES_PALETTE: [[u8; 3]; 64] = [
    [84, 84, 84],    [0, 30, 116],    [8, 16, 144],    [48, 0, 136],
    [68, 0, 100],    [92, 0, 48],     [84, 4, 0],      [60, 24, 0],
    [32, 42, 0],     [8, 58, 0],      [0, 64, 0],      [0, 60, 0],
    [0, 50, 60],     [0, 0, 0],       [0, 0, 0],       [0, 0, 0],
    [152, 150, 152], [8, 76, 196],    [48, 50, 236],   [92, 30, 228],
    [136, 20, 176],  [160, 20, 100],  [152, 34, 32],   [120, 60, 0],
    [84, 90, 0],     [40, 114, 0],    [8, 124, 0],     [0, 118, 40],
    [0, 102, 120],   [0, 0, 0],       [0, 0, 0],       [0, 0, 0],
    [236, 238, 236], [76, 154, 236],  [120, 124, 236], [176, 98, 236],
    [228, 84, 236],  [236, 88, 180],  [236, 106, 100], [212, 136, 32],
    [160, 170, 0],   [116, 196, 0],   [76, 208, 32],   [56, 204, 108],
    [56, 180, 204],  [60, 60, 60],    [0, 0, 0],       [0, 0, 0],
    [236, 238, 236], [168, 204, 236], [188, 188, 236], [212, 178, 236],
    [236, 174, 236], [236, 174, 212], [236, 180, 176], [228, 196, 144],
    [204, 210, 120], [180, 222, 120], [168, 226, 144], [152, 226, 180],
    [160, 214, 228], [160, 162, 160], [0, 0, 0],       [0, 0, 0],
];

/// PPU registers as seen from the CPU at $2000-$2007 (mirrored to $3FFF)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpuRegister {
    /// $2000 - PPUCTRL (Control)
    PpuCtrl,
    /// $2001 - PPUMASK (Mask)
    PpuMask,
    /// $2002 - PPUSTATUS (Status)
    PpuStatus,
    /// $2003 - OAMADDR (Sprite Address)
    OamAddr,
    /// $2004 - OAMDATA (Sprite Data)
    OamData,
    /// $2005 - PPUSCROLL (Scroll)
    PpuScroll,
    /// $2006 - PPUADDR (Address)
    PpuAddr,
    /// $2007 - PPUDATA (Data)
    PpuData,
}

impl PpuRegister {
    /// Decode a CPU address in $2000-$3FFF.
    pub fn from_address(address: u16) -> Self {
        match address & 0x0007 {
            0 => Self::PpuCtrl,
            1 => Self::PpuMask,
            2 => Self::PpuStatus,
            3 => Self::OamAddr,
            4 => Self::OamData,
            5 => Self::PpuScroll,
            6 => Self::PpuAddr,
            _ => Self::PpuData,
        }
    }
}

/// PPU control flags ($2000)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuCtrl(u8);

impl PpuCtrl {
    pub const NMI_ENABLE: u8 = 0b1000_0000;
    pub const MASTER_SLAVE: u8 = 0b0100_0000;
    pub const SPRITE_SIZE: u8 = 0b0010_0000;
    pub const BG_PATTERN_TABLE: u8 = 0b0001_0000;
    pub const SPR_PATTERN_TABLE: u8 = 0b0000_1000;
    pub const VRAM_INC: u8 = 0b0000_0100;
    pub const NAMETABLE: u8 = 0b0000_0011;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn nmi_enable(&self) -> bool {
        self.0 & Self::NMI_ENABLE != 0
    }

    /// 8x16 sprites
    pub fn tall_sprites(&self) -> bool {
        self.0 & Self::SPRITE_SIZE != 0
    }

    pub fn sprite_height(&self) -> u16 {
        if self.tall_sprites() {
            16
        } else {
            8
        }
    }

    pub fn background_table(&self) -> u16 {
        if self.0 & Self::BG_PATTERN_TABLE != 0 {
            0x1000
        } else {
            0x0000
        }
    }

    /// Pattern table for 8x8 sprites (ignored in 8x16 mode)
    pub fn sprite_table(&self) -> u16 {
        if self.0 & Self::SPR_PATTERN_TABLE != 0 {
            0x1000
        } else {
            0x0000
        }
    }

    pub fn vram_increment(&self) -> u16 {
        if self.0 & Self::VRAM_INC != 0 {
            32
        } else {
            1
        }
    }

    pub fn nametable(&self) -> u8 {
        self.0 & Self::NAMETABLE
    }
}

/// PPU mask flags ($2001)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuMask(u8);

impl PpuMask {
    pub const GREYSCALE: u8 = 0b0000_0001;
    pub const BG_LEFT: u8 = 0b0000_0010;
    pub const SPR_LEFT: u8 = 0b0000_0100;
    pub const RENDER_BG: u8 = 0b0000_1000;
    pub const RENDER_SPR: u8 = 0b0001_0000;
    pub const EMPHASIZE_RED: u8 = 0b0010_0000;
    pub const EMPHASIZE_GREEN: u8 = 0b0100_0000;
    pub const EMPHASIZE_BLUE: u8 = 0b1000_0000;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn greyscale(&self) -> bool {
        self.0 & Self::GREYSCALE != 0
    }

    pub fn background_left(&self) -> bool {
        self.0 & Self::BG_LEFT != 0
    }

    pub fn sprites_left(&self) -> bool {
        self.0 & Self::SPR_LEFT != 0
    }

    pub fn render_background(&self) -> bool {
        self.0 & Self::RENDER_BG != 0
    }

    pub fn render_sprites(&self) -> bool {
        self.0 & Self::RENDER_SPR != 0
    }

    /// Emphasis bits as an RGB triple of flags.
    pub fn emphasis(&self) -> [bool; 3] {
        [
            self.0 & Self::EMPHASIZE_RED != 0,
            self.0 & Self::EMPHASIZE_GREEN != 0,
            self.0 & Self::EMPHASIZE_BLUE != 0,
        ]
    }
}

/// PPU status flags ($2002)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PpuStatus(u8);

impl PpuStatus {
    pub const VBLANK: u8 = 0b1000_0000;
    pub const SPRITE_ZERO_HIT: u8 = 0b0100_0000;
    pub const SPRITE_OVERFLOW: u8 = 0b0010_0000;

    pub fn new(val: u8) -> Self {
        Self(val)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn vblank(&self) -> bool {
        self.0 & Self::VBLANK != 0
    }

    pub fn sprite_zero_hit(&self) -> bool {
        self.0 & Self::SPRITE_ZERO_HIT != 0
    }

    pub fn sprite_overflow(&self) -> bool {
        self.0 & Self::SPRITE_OVERFLOW != 0
    }

    fn set(&mut self, flag: u8, on: bool) {
        if on {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }
}

/// Phase of the frame the PPU is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Render,
    PostRender,
    VerticalBlanking,
    PreRender,
    /// Frame complete; waiting for [`Ppu::start_next_frame`].
    Finished,
}

/// Interrupt request produced by one PPU dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    None,
    Nmi,
    Irq,
}

/// One sprite selected for the current scanline, patterns pre-fetched.
#[derive(Debug, Clone, Copy, Default)]
struct SpriteSlot {
    oam_index: u8,
    x: u8,
    attributes: u8,
    pattern_lo: u8,
    pattern_hi: u8,
}

/// Opaque sprite pixel found at a dot.
#[derive(Debug, Clone, Copy)]
struct SpritePixel {
    color: u8,
    palette: u8,
    behind_background: bool,
    sprite_zero: bool,
}

/// Pattern and palette of the background tile under `v`.
#[derive(Debug, Clone, Copy, Default)]
struct TileRow {
    pattern_lo: u8,
    pattern_hi: u8,
    palette: u8,
}

/// PPU internal state
#[derive(Debug, Clone)]
pub struct Ppu {
    bus: PpuBus,
    oam: [u8; OAM_SIZE],
    control: PpuCtrl,
    mask: PpuMask,
    status: PpuStatus,
    oam_addr: u8,
    /// Current VRAM address (15 bits)
    v: u16,
    /// Temporary VRAM address (15 bits)
    t: u16,
    /// Fine X scroll (3 bits)
    fine_x: u8,
    /// Write toggle for PPUSCROLL and PPUADDR
    w: bool,
    /// Read buffer (for PPUDATA)
    read_buffer: u8,
    /// NMI raised by a PPUCTRL write during VBlank, delivered next dot
    nmi_pending: bool,
    state: RenderState,
    scanline: u16,
    dot: u16,
    odd_frame: bool,
    frame_count: u64,
    /// Secondary OAM: sprites for the scanline being drawn, in OAM order
    sprites: [SpriteSlot; MAX_SPRITES_PER_LINE],
    sprite_count: usize,
    tile: TileRow,
    tile_valid: bool,
    /// Pixel column within the current background tile (0-7)
    tile_pixel: u8,
    frame_buffer: Vec<u8>,
}

impl Ppu {
    /// Power-on PPU drawing from `bus`. The first dot clocked is scanline 0,
    /// dot 0.
    pub fn new(bus: PpuBus) -> Self {
        Self {
            bus,
            oam: [0; OAM_SIZE],
            control: PpuCtrl::default(),
            mask: PpuMask::default(),
            status: PpuStatus::default(),
            oam_addr: 0,
            v: 0,
            t: 0,
            fine_x: 0,
            w: false,
            read_buffer: 0,
            nmi_pending: false,
            state: RenderState::Render,
            scanline: 0,
            dot: 0,
            odd_frame: false,
            frame_count: 0,
            sprites: [SpriteSlot::default(); MAX_SPRITES_PER_LINE],
            sprite_count: 0,
            tile: TileRow::default(),
            tile_valid: false,
            tile_pixel: 0,
            frame_buffer: vec![0; FRAME_WIDTH * FRAME_HEIGHT * 4],
        }
    }

    /// Reset button: registers cleared, frame restarted. OAM, VRAM and
    /// palette survive.
    pub fn reset(&mut self) {
        self.control = PpuCtrl::default();
        self.mask = PpuMask::default();
        self.status = PpuStatus::default();
        self.w = false;
        self.fine_x = 0;
        self.t = 0;
        self.read_buffer = 0;
        self.nmi_pending = false;
        self.state = RenderState::Render;
        self.scanline = 0;
        self.dot = 0;
        self.odd_frame = false;
        self.sprite_count = 0;
        self.tile_valid = false;
    }

    pub fn bus(&self) -> &PpuBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut PpuBus {
        &mut self.bus
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn scanline(&self) -> u16 {
        self.scanline
    }

    pub fn dot(&self) -> u16 {
        self.dot
    }

    /// Frames completed since power-on.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn odd_frame(&self) -> bool {
        self.odd_frame
    }

    pub fn control(&self) -> PpuCtrl {
        self.control
    }

    pub fn mask(&self) -> PpuMask {
        self.mask
    }

    pub fn status(&self) -> PpuStatus {
        self.status
    }

    pub fn v(&self) -> u16 {
        self.v
    }

    pub fn t(&self) -> u16 {
        self.t
    }

    pub fn fine_x(&self) -> u8 {
        self.fine_x
    }

    pub fn write_toggle(&self) -> bool {
        self.w
    }

    pub fn oam(&self) -> &[u8; OAM_SIZE] {
        &self.oam
    }

    pub fn oam_addr(&self) -> u8 {
        self.oam_addr
    }

    /// OAM indices held in secondary OAM for the current scanline.
    pub fn secondary_oam(&self) -> impl Iterator<Item = u8> + '_ {
        self.sprites[..self.sprite_count].iter().map(|s| s.oam_index)
    }

    /// 256x240 RGBA pixels, row-major.
    pub fn frame_buffer(&self) -> &[u8] {
        &self.frame_buffer
    }

    pub fn rendering_enabled(&self) -> bool {
        self.mask.render_background() || self.mask.render_sprites()
    }

    pub fn is_frame_finished(&self) -> bool {
        self.state == RenderState::Finished
    }

    /// Leave [`RenderState::Finished`] and begin the pre-render scanline.
    pub fn start_next_frame(&mut self) {
        if self.state == RenderState::Finished {
            self.state = RenderState::PreRender;
            self.scanline = PRE_RENDER_SCANLINE;
            self.dot = 0;
        }
    }

    /// Advance one dot.
    pub fn clock(&mut self) -> Interrupt {
        let mut interrupt = match self.state {
            RenderState::Render => self.render_dot(),
            RenderState::PostRender => Interrupt::None,
            RenderState::VerticalBlanking => self.vertical_blanking_dot(),
            RenderState::PreRender => self.pre_render_dot(),
            RenderState::Finished => return Interrupt::None,
        };

        if self.nmi_pending && interrupt == Interrupt::None {
            self.nmi_pending = false;
            interrupt = Interrupt::Nmi;
        }

        self.advance();
        interrupt
    }

    fn advance(&mut self) {
        let skip_last_dot = self.state == RenderState::PreRender
            && self.dot == DOTS_PER_SCANLINE - 2
            && self.odd_frame
            && self.rendering_enabled();

        self.dot += 1;
        if self.dot < DOTS_PER_SCANLINE && !skip_last_dot {
            return;
        }

        self.dot = 0;
        if self.state == RenderState::PreRender {
            self.scanline = 0;
            self.state = RenderState::Render;
            return;
        }

        self.scanline += 1;
        self.state = match self.scanline {
            0..=239 => RenderState::Render,
            POST_RENDER_SCANLINE => RenderState::PostRender,
            VBLANK_SCANLINE..=260 => RenderState::VerticalBlanking,
            _ => {
                self.frame_count += 1;
                self.odd_frame = !self.odd_frame;
                RenderState::Finished
            }
        };
    }

    fn render_dot(&mut self) -> Interrupt {
        let rendering = self.rendering_enabled();
        match self.dot {
            1..=256 => {
                if self.dot == 1 {
                    self.tile_pixel = self.fine_x;
                    self.tile_valid = false;
                }
                let x = usize::from(self.dot - 1);
                if rendering {
                    self.render_pixel(x);
                    if self.dot == 256 {
                        self.increment_y();
                    }
                } else {
                    self.render_backdrop(x);
                }
            }
            257 if rendering => self.copy_horizontal(),
            260 if rendering => return self.clock_scanline_irq(),
            340 => {
                if rendering {
                    self.evaluate_sprites(self.scanline + 1);
                } else {
                    self.sprite_count = 0;
                }
            }
            _ => {}
        }
        Interrupt::None
    }

    fn vertical_blanking_dot(&mut self) -> Interrupt {
        if self.scanline == VBLANK_SCANLINE && self.dot == 1 {
            self.status.set(PpuStatus::VBLANK, true);
            if self.control.nmi_enable() {
                return Interrupt::Nmi;
            }
        }
        Interrupt::None
    }

    fn pre_render_dot(&mut self) -> Interrupt {
        let rendering = self.rendering_enabled();
        match self.dot {
            1 => {
                self.status.set(
                    PpuStatus::VBLANK | PpuStatus::SPRITE_ZERO_HIT | PpuStatus::SPRITE_OVERFLOW,
                    false,
                );
            }
            257 if rendering => self.copy_horizontal(),
            260 if rendering => return self.clock_scanline_irq(),
            280..=304 if rendering => self.copy_vertical(),
            // Sprites never appear on scanline 0
            340 => self.sprite_count = 0,
            _ => {}
        }
        Interrupt::None
    }

    fn clock_scanline_irq(&mut self) -> Interrupt {
        if self.bus.scanline_irq() {
            Interrupt::Irq
        } else {
            Interrupt::None
        }
    }

    // -----------------------------------------------------------------------
    // Loopy address arithmetic
    // -----------------------------------------------------------------------

    fn increment_coarse_x(&mut self) {
        if self.v & 0x001F == 31 {
            self.v &= !0x001F;
            self.v ^= 0x0400;
        } else {
            self.v += 1;
        }
    }

    fn increment_y(&mut self) {
        if self.v & 0x7000 != 0x7000 {
            self.v += 0x1000;
            return;
        }
        self.v &= !0x7000;
        let mut coarse_y = (self.v & 0x03E0) >> 5;
        if coarse_y == 29 {
            coarse_y = 0;
            self.v ^= 0x0800;
        } else if coarse_y == 31 {
            coarse_y = 0;
        } else {
            coarse_y += 1;
        }
        self.v = (self.v & !0x03E0) | (coarse_y << 5);
    }

    fn copy_horizontal(&mut self) {
        self.v = (self.v & !0x041F) | (self.t & 0x041F);
    }

    fn copy_vertical(&mut self) {
        self.v = (self.v & !0x7BE0) | (self.t & 0x7BE0);
    }

    // -----------------------------------------------------------------------
    // Pixel pipeline
    // -----------------------------------------------------------------------

    fn fetch_tile(&mut self) {
        let v = self.v;
        let tile = self.bus.read(0x2000 | (v & 0x0FFF));
        let attribute = self
            .bus
            .read(0x23C0 | (v & 0x0C00) | ((v >> 4) & 0x38) | ((v >> 2) & 0x07));
        let shift = ((v >> 4) & 0x04) | (v & 0x02);
        let fine_y = (v >> 12) & 0x07;
        let address = self.control.background_table() + u16::from(tile) * 16 + fine_y;

        self.tile = TileRow {
            pattern_lo: self.bus.read(address),
            pattern_hi: self.bus.read(address + 8),
            palette: (attribute >> shift) & 0x03,
        };
        self.tile_valid = true;
    }

    /// Background colour (0-3) and palette at this dot; advances coarse X at
    /// the tile boundary.
    fn background_pixel(&mut self) -> (u8, u8) {
        if !self.tile_valid {
            self.fetch_tile();
        }
        let bit = 7 - self.tile_pixel;
        let color = (((self.tile.pattern_hi >> bit) & 1) << 1) | ((self.tile.pattern_lo >> bit) & 1);
        let palette = self.tile.palette;

        self.tile_pixel += 1;
        if self.tile_pixel == 8 {
            self.tile_pixel = 0;
            self.increment_coarse_x();
            self.tile_valid = false;
        }
        (color, palette)
    }

    fn sprite_pixel(&self, x: usize) -> Option<SpritePixel> {
        self.sprites[..self.sprite_count].iter().find_map(|sprite| {
            let offset = x.checked_sub(usize::from(sprite.x))?;
            if offset >= 8 {
                return None;
            }
            let bit = if sprite.attributes & 0x40 != 0 {
                offset
            } else {
                7 - offset
            };
            let color = (((sprite.pattern_hi >> bit) & 1) << 1) | ((sprite.pattern_lo >> bit) & 1);
            (color != 0).then_some(SpritePixel {
                color,
                palette: sprite.attributes & 0x03,
                behind_background: sprite.attributes & 0x20 != 0,
                sprite_zero: sprite.oam_index == 0,
            })
        })
    }

    fn render_pixel(&mut self, x: usize) {
        let (mut bg_color, bg_palette) = self.background_pixel();
        if !self.mask.render_background() || (x < 8 && !self.mask.background_left()) {
            bg_color = 0;
        }

        let sprite = if self.mask.render_sprites() && (x >= 8 || self.mask.sprites_left()) {
            self.sprite_pixel(x)
        } else {
            None
        };

        let palette_index = match (bg_color, sprite) {
            (0, None) => 0,
            (0, Some(s)) => 0x10 | (s.palette << 2) | s.color,
            (_, None) => (bg_palette << 2) | bg_color,
            (_, Some(s)) => {
                if s.sprite_zero && x != 255 {
                    self.status.set(PpuStatus::SPRITE_ZERO_HIT, true);
                }
                if s.behind_background {
                    (bg_palette << 2) | bg_color
                } else {
                    0x10 | (s.palette << 2) | s.color
                }
            }
        };

        let entry = self.bus.palette_entry(palette_index);
        self.put_pixel(x, entry);
    }

    /// Rendering disabled: the backdrop colour, or the palette entry `v`
    /// points at when it addresses palette RAM.
    fn render_backdrop(&mut self, x: usize) {
        let index = if self.v & 0x3F00 == 0x3F00 {
            (self.v & 0x1F) as u8
        } else {
            0
        };
        let entry = self.bus.palette_entry(index);
        self.put_pixel(x, entry);
    }

    fn put_pixel(&mut self, x: usize, entry: u8) {
        let y = usize::from(self.scanline);
        let entry = if self.mask.greyscale() {
            entry & 0x30
        } else {
            entry & 0x3F
        };
        let mut rgb = NES_PALETTE[usize::from(entry)];

        let emphasis = self.mask.emphasis();
        if emphasis.contains(&true) {
            for (channel, emphasized) in rgb.iter_mut().zip(emphasis) {
                if !emphasized {
                    *channel = (u16::from(*channel) * 3 / 4) as u8;
                }
            }
        }

        let offset = (y * FRAME_WIDTH + x) * 4;
        self.frame_buffer[offset..offset + 3].copy_from_slice(&rgb);
        self.frame_buffer[offset + 3] = 0xFF;
    }

    /// Fill secondary OAM for `line`. A ninth in-range sprite sets the
    /// overflow flag.
    fn evaluate_sprites(&mut self, line: u16) {
        let height = self.control.sprite_height();
        self.sprite_count = 0;

        for index in 0..64u8 {
            let base = usize::from(index) * 4;
            let top = u16::from(self.oam[base]) + 1;
            if line < top || line >= top + height {
                continue;
            }
            if self.sprite_count == MAX_SPRITES_PER_LINE {
                self.status.set(PpuStatus::SPRITE_OVERFLOW, true);
                break;
            }

            let tile = self.oam[base + 1];
            let attributes = self.oam[base + 2];
            let mut row = line - top;
            if attributes & 0x80 != 0 {
                row = height - 1 - row;
            }

            let address = if height == 16 {
                let table = u16::from(tile & 0x01) * 0x1000;
                let tile = u16::from(tile & 0xFE) + (row >> 3);
                table + tile * 16 + (row & 0x07)
            } else {
                self.control.sprite_table() + u16::from(tile) * 16 + row
            };

            self.sprites[self.sprite_count] = SpriteSlot {
                oam_index: index,
                x: self.oam[base + 3],
                attributes,
                pattern_lo: self.bus.read(address),
                pattern_hi: self.bus.read(address + 8),
            };
            self.sprite_count += 1;
        }
    }

    // -----------------------------------------------------------------------
    // CPU-facing registers
    // -----------------------------------------------------------------------

    /// CPU read of a PPU register. Write-only registers return `open_bus`.
    pub fn read_register(&mut self, register: PpuRegister, open_bus: u8) -> u8 {
        match register {
            PpuRegister::PpuStatus => {
                let value = (self.status.bits() & 0xE0) | (open_bus & 0x1F);
                self.status.set(PpuStatus::VBLANK, false);
                self.w = false;
                value
            }
            PpuRegister::OamData => self.oam[usize::from(self.oam_addr)],
            PpuRegister::PpuData => {
                let address = self.v & 0x3FFF;
                let value = if address >= 0x3F00 {
                    // Palette reads bypass the buffer, which picks up the
                    // nametable byte underneath instead.
                    self.read_buffer = self.bus.read(address - 0x1000);
                    self.bus.read(address) | (open_bus & 0xC0)
                } else {
                    let buffered = self.read_buffer;
                    self.read_buffer = self.bus.read(address);
                    buffered
                };
                self.increment_v();
                value
            }
            _ => open_bus,
        }
    }

    /// Side-effect-free register read for debuggers.
    pub fn peek_register(&self, register: PpuRegister, open_bus: u8) -> u8 {
        match register {
            PpuRegister::PpuStatus => (self.status.bits() & 0xE0) | (open_bus & 0x1F),
            PpuRegister::OamData => self.oam[usize::from(self.oam_addr)],
            PpuRegister::PpuData => self.read_buffer,
            _ => open_bus,
        }
    }

    /// CPU write of a PPU register.
    pub fn write_register(&mut self, register: PpuRegister, value: u8) {
        match register {
            PpuRegister::PpuCtrl => {
                let was_enabled = self.control.nmi_enable();
                self.control = PpuCtrl::new(value);
                self.t = (self.t & !0x0C00) | (u16::from(value & 0x03) << 10);
                if !was_enabled && self.control.nmi_enable() && self.status.vblank() {
                    self.nmi_pending = true;
                }
            }
            PpuRegister::PpuMask => self.mask = PpuMask::new(value),
            PpuRegister::PpuStatus => {}
            PpuRegister::OamAddr => self.oam_addr = value,
            PpuRegister::OamData => self.write_oam_data(value),
            PpuRegister::PpuScroll => {
                if !self.w {
                    self.t = (self.t & !0x001F) | u16::from(value >> 3);
                    self.fine_x = value & 0x07;
                } else {
                    self.t = (self.t & !0x73E0)
                        | (u16::from(value & 0x07) << 12)
                        | (u16::from(value & 0xF8) << 2);
                }
                self.w = !self.w;
            }
            PpuRegister::PpuAddr => {
                if !self.w {
                    self.t = (self.t & 0x00FF) | (u16::from(value & 0x3F) << 8);
                } else {
                    self.t = (self.t & 0xFF00) | u16::from(value);
                    self.v = self.t;
                    self.tile_valid = false;
                }
                self.w = !self.w;
            }
            PpuRegister::PpuData => {
                self.bus.write(self.v & 0x3FFF, value);
                self.increment_v();
            }
        }
    }

    /// OAMDATA write semantics, also used by OAM DMA.
    pub fn write_oam_data(&mut self, value: u8) {
        self.oam[usize::from(self.oam_addr)] = value;
        self.oam_addr = self.oam_addr.wrapping_add(1);
    }

    fn increment_v(&mut self) {
        self.v = (self.v + self.control.vram_increment()) & 0x7FFF;
        self.tile_valid = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cartridge::Cartridge;

    fn ppu() -> Ppu {
        let mut image = vec![b'N', b'E', b'S', 0x1A, 1, 0, 0, 0];
        image.resize(16 + 0x4000, 0);
        let cartridge = Cartridge::from_ines(&image).unwrap();
        Ppu::new(PpuBus::new(cartridge))
    }

    #[test]
    fn test_register_decode_mirrors_every_8() {
        assert_eq!(PpuRegister::from_address(0x2002), PpuRegister::PpuStatus);
        assert_eq!(PpuRegister::from_address(0x3FFF), PpuRegister::PpuData);
        assert_eq!(PpuRegister::from_address(0x2008), PpuRegister::PpuCtrl);
    }

    #[test]
    fn test_ctrl_sets_nametable_bits_in_t() {
        let mut ppu = ppu();
        ppu.write_register(PpuRegister::PpuCtrl, 0x03);
        assert_eq!(ppu.t(), 0x0C00);
        ppu.write_register(PpuRegister::PpuCtrl, 0x01);
        assert_eq!(ppu.t(), 0x0400);
    }

    #[test]
    fn test_scroll_writes() {
        let mut ppu = ppu();
        ppu.write_register(PpuRegister::PpuScroll, 0x7D);
        assert_eq!(ppu.t() & 0x001F, 0x0F);
        assert_eq!(ppu.fine_x(), 0x05);
        assert!(ppu.write_toggle());

        ppu.write_register(PpuRegister::PpuScroll, 0x5E);
        assert_eq!(ppu.t(), 0x616F);
        assert!(!ppu.write_toggle());
    }

    #[test]
    fn test_addr_writes_copy_t_to_v() {
        let mut ppu = ppu();
        ppu.write_register(PpuRegister::PpuAddr, 0xFF);
        assert_eq!(ppu.t(), 0x3F00);
        assert_eq!(ppu.v(), 0x0000);
        ppu.write_register(PpuRegister::PpuAddr, 0x21);
        assert_eq!(ppu.v(), 0x3F21);
    }

    #[test]
    fn test_status_read_resets_toggle_and_vblank() {
        let mut ppu = ppu();
        ppu.status.set(PpuStatus::VBLANK, true);
        ppu.write_register(PpuRegister::PpuAddr, 0x21);
        let value = ppu.read_register(PpuRegister::PpuStatus, 0x1F);
        assert_eq!(value, 0x9F);
        assert!(!ppu.status().vblank());
        assert!(!ppu.write_toggle());
    }

    #[test]
    fn test_data_read_is_buffered() {
        let mut ppu = ppu();
        ppu.write_register(PpuRegister::PpuAddr, 0x24);
        ppu.write_register(PpuRegister::PpuAddr, 0x00);
        ppu.write_register(PpuRegister::PpuData, 0xAB);
        ppu.write_register(PpuRegister::PpuData, 0xCD);

        ppu.write_register(PpuRegister::PpuAddr, 0x24);
        ppu.write_register(PpuRegister::PpuAddr, 0x00);
        assert_eq!(ppu.read_register(PpuRegister::PpuData, 0), 0x00);
        assert_eq!(ppu.read_register(PpuRegister::PpuData, 0), 0xAB);
        assert_eq!(ppu.read_register(PpuRegister::PpuData, 0), 0xCD);
    }

    #[test]
    fn test_palette_read_unbuffered() {
        let mut ppu = ppu();
        ppu.write_register(PpuRegister::PpuAddr, 0x3F);
        ppu.write_register(PpuRegister::PpuAddr, 0x01);
        ppu.write_register(PpuRegister::PpuData, 0x2A);
        ppu.write_register(PpuRegister::PpuAddr, 0x3F);
        ppu.write_register(PpuRegister::PpuAddr, 0x01);
        assert_eq!(ppu.read_register(PpuRegister::PpuData, 0), 0x2A);
    }

    #[test]
    fn test_vram_increment_32() {
        let mut ppu = ppu();
        ppu.write_register(PpuRegister::PpuCtrl, PpuCtrl::VRAM_INC);
        ppu.write_register(PpuRegister::PpuAddr, 0x20);
        ppu.write_register(PpuRegister::PpuAddr, 0x00);
        ppu.write_register(PpuRegister::PpuData, 0x00);
        assert_eq!(ppu.v(), 0x2020);
    }

    #[test]
    fn test_increment_y_wraps_row_29_with_nametable_switch() {
        let mut ppu = ppu();
        ppu.v = 0x7000 | (29 << 5);
        ppu.increment_y();
        assert_eq!(ppu.v, 0x0800);
    }

    #[test]
    fn test_increment_y_wraps_row_31_without_switch() {
        let mut ppu = ppu();
        ppu.v = 0x7000 | (31 << 5);
        ppu.increment_y();
        assert_eq!(ppu.v, 0x0000);
    }

    #[test]
    fn test_coarse_x_wraps_into_next_nametable() {
        let mut ppu = ppu();
        ppu.v = 0x001F;
        ppu.increment_coarse_x();
        assert_eq!(ppu.v, 0x0400);
    }

    #[test]
    fn test_copy_masks() {
        let mut ppu = ppu();
        ppu.t = 0x7FFF;
        ppu.v = 0;
        ppu.copy_horizontal();
        assert_eq!(ppu.v, 0x041F);
        ppu.copy_vertical();
        assert_eq!(ppu.v, 0x7FFF);
    }

    #[test]
    fn test_oam_data_increments_address() {
        let mut ppu = ppu();
        ppu.write_register(PpuRegister::OamAddr, 0xFF);
        ppu.write_register(PpuRegister::OamData, 0x11);
        ppu.write_register(PpuRegister::OamData, 0x22);
        assert_eq!(ppu.oam()[0xFF], 0x11);
        assert_eq!(ppu.oam()[0x00], 0x22);
        assert_eq!(ppu.oam_addr(), 0x01);
    }

    #[test]
    fn test_ctrl_write_in_vblank_raises_nmi() {
        let mut ppu = ppu();
        ppu.status.set(PpuStatus::VBLANK, true);
        ppu.write_register(PpuRegister::PpuCtrl, PpuCtrl::NMI_ENABLE);
        assert_eq!(ppu.clock(), Interrupt::Nmi);
        assert_eq!(ppu.clock(), Interrupt::None);
    }

    #[test]
    fn test_sprite_overflow_on_ninth_sprite() {
        let mut ppu = ppu();
        for i in 0..9 {
            ppu.oam[i * 4] = 10;
        }
        ppu.evaluate_sprites(11);
        assert_eq!(ppu.secondary_oam().count(), 8);
        assert!(ppu.status().sprite_overflow());
    }

    #[test]
    fn test_sprite_out_of_range_rows() {
        let mut ppu = ppu();
        ppu.oam[0] = 10;
        ppu.evaluate_sprites(10);
        assert_eq!(ppu.secondary_oam().count(), 0);
        ppu.evaluate_sprites(18);
        assert_eq!(ppu.secondary_oam().count(), 1);
        ppu.evaluate_sprites(19);
        assert_eq!(ppu.secondary_oam().count(), 0);
    }
}
