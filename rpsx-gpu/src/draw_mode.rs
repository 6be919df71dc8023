// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Draw-mode registers set by the command decoder: texture page, palette
//! (CLUT) location and texture window.

use rpsx_common::{Rect, TEXTURE_PAGE_HEIGHT, VRAM_HEIGHT, VRAM_WIDTH};

use crate::types::{TextureColorMode, TransparencyMode};

/// Clip a rectangle that may run off the right edge of VRAM. A rectangle that
/// would wrap is widened to the full width.
fn wrap_to_vram(mut rect: Rect) -> Rect {
    if rect.right > VRAM_WIDTH {
        rect.left = 0;
        rect.right = VRAM_WIDTH;
    }
    if rect.bottom > VRAM_HEIGHT {
        rect.top = 0;
        rect.bottom = VRAM_HEIGHT;
    }
    rect
}

// ── Texture page ─────────────────────────────────────────────────────────────

/// Texture page register (GP0 E1h layout, low 9 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TexturePage(pub u16);

impl TexturePage {
    pub const MASK: u16 = 0x1FF;

    /// Page base X in VRAM pixels.
    pub fn base_x(self) -> u32 {
        (self.0 as u32 & 0xF) * 64
    }

    /// Page base Y in VRAM pixels.
    pub fn base_y(self) -> u32 {
        ((self.0 as u32 >> 4) & 1) * TEXTURE_PAGE_HEIGHT
    }

    pub fn transparency_mode(self) -> TransparencyMode {
        TransparencyMode::from_raw(self.0 as u32 >> 5)
    }

    pub fn color_mode_bits(self) -> u32 {
        (self.0 as u32 >> 7) & 3
    }

    pub fn color_mode(self) -> TextureColorMode {
        TextureColorMode::from_raw(self.color_mode_bits())
    }

    /// VRAM area this page can sample.
    pub fn rect(self) -> Rect {
        let width = match self.color_mode() {
            TextureColorMode::Palette4Bit => 64,
            TextureColorMode::Palette8Bit => 128,
            TextureColorMode::Direct16Bit => 256,
        };
        wrap_to_vram(Rect::from_extents(
            self.base_x(),
            self.base_y(),
            width,
            TEXTURE_PAGE_HEIGHT,
        ))
    }
}

/// Palette (CLUT) register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Palette(pub u16);

impl Palette {
    pub const MASK: u16 = 0x7FFF;

    pub fn x(self) -> u32 {
        (self.0 as u32 & 0x3F) * 16
    }

    pub fn y(self) -> u32 {
        (self.0 as u32 >> 6) & 0x1FF
    }

    /// VRAM area read by a palette lookup in the given color mode.
    pub fn rect(self, mode: TextureColorMode) -> Rect {
        let width = match mode {
            TextureColorMode::Palette4Bit => 16,
            TextureColorMode::Palette8Bit => 256,
            TextureColorMode::Direct16Bit => return Rect::INVALID,
        };
        wrap_to_vram(Rect::from_extents(self.x(), self.y(), width, 1))
    }
}

/// Combined texpage/palette word stored in every batch vertex.
#[inline]
pub fn texpage_word(page: TexturePage, palette: Palette) -> u32 {
    page.0 as u32 | ((palette.0 as u32) << 16)
}

/// Split a vertex texpage word back into its registers.
#[inline]
pub fn split_texpage_word(word: u32) -> (TexturePage, Palette) {
    (
        TexturePage((word & TexturePage::MASK as u32) as u16),
        Palette(((word >> 16) & Palette::MASK as u32) as u16),
    )
}

// ── Texture window ───────────────────────────────────────────────────────────

/// Texture window (GP0 E2h), in 8-texel units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureWindow {
    pub mask_x: u8,
    pub mask_y: u8,
    pub offset_x: u8,
    pub offset_y: u8,
}

impl TextureWindow {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            mask_x: (bits & 0x1F) as u8,
            mask_y: ((bits >> 5) & 0x1F) as u8,
            offset_x: ((bits >> 10) & 0x1F) as u8,
            offset_y: ((bits >> 15) & 0x1F) as u8,
        }
    }

    /// `(and_x, and_y)` applied to texture coordinates.
    pub fn and_mask(&self) -> [u32; 2] {
        [
            !(self.mask_x as u32 * 8) & 0xFF,
            !(self.mask_y as u32 * 8) & 0xFF,
        ]
    }

    /// `(or_x, or_y)` applied after the AND.
    pub fn or_mask(&self) -> [u32; 2] {
        [
            (self.offset_x & self.mask_x) as u32 * 8,
            (self.offset_y & self.mask_y) as u32 * 8,
        ]
    }

    pub fn is_identity(&self) -> bool {
        self.mask_x == 0 && self.mask_y == 0
    }
}

/// Apply a texture window to one coordinate.
#[inline]
pub fn apply_texture_window(coord: u32, and: u32, or: u32) -> u32 {
    (coord & and) | or
}

// ── Draw mode ────────────────────────────────────────────────────────────────

/// Current texturing state with change tracking for the hazard detector.
#[derive(Debug, Clone)]
pub struct DrawMode {
    pub texture_page: TexturePage,
    pub palette: Palette,
    pub texture_window: TextureWindow,
    texture_page_changed: bool,
    texture_window_changed: bool,
}

impl DrawMode {
    pub fn new() -> Self {
        Self {
            texture_page: TexturePage::default(),
            palette: Palette::default(),
            texture_window: TextureWindow::default(),
            texture_page_changed: true,
            texture_window_changed: true,
        }
    }

    /// Returns true if the register changed.
    pub fn set_texture_page(&mut self, page: TexturePage) -> bool {
        let page = TexturePage(page.0 & TexturePage::MASK);
        if self.texture_page == page {
            return false;
        }
        self.texture_page = page;
        self.texture_page_changed = true;
        true
    }

    pub fn set_palette(&mut self, palette: Palette) -> bool {
        let palette = Palette(palette.0 & Palette::MASK);
        if self.palette == palette {
            return false;
        }
        self.palette = palette;
        self.texture_page_changed = true;
        true
    }

    pub fn set_texture_window(&mut self, window: TextureWindow) -> bool {
        if self.texture_window == window {
            return false;
        }
        self.texture_window = window;
        self.texture_window_changed = true;
        true
    }

    pub fn texpage_word(&self) -> u32 {
        texpage_word(self.texture_page, self.palette)
    }

    pub fn is_using_palette(&self) -> bool {
        self.texture_page.color_mode() != TextureColorMode::Direct16Bit
    }

    pub fn texture_page_rect(&self) -> Rect {
        self.texture_page.rect()
    }

    pub fn palette_rect(&self) -> Rect {
        self.palette.rect(self.texture_page.color_mode())
    }

    pub fn is_texture_page_changed(&self) -> bool {
        self.texture_page_changed
    }

    pub fn set_texture_page_changed(&mut self) {
        self.texture_page_changed = true;
    }

    pub fn clear_texture_page_changed(&mut self) {
        self.texture_page_changed = false;
    }

    pub fn is_texture_window_changed(&self) -> bool {
        self.texture_window_changed
    }

    pub fn clear_texture_window_changed(&mut self) {
        self.texture_window_changed = false;
    }
}

impl Default for DrawMode {
    fn default() -> Self {
        Self::new()
    }
}
