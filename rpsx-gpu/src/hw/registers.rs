// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Drawing registers written by the command decoder.
//!
//! Every setter flushes the open batch before a change takes effect, so
//! buffered vertices are always drawn with the state they were submitted
//! under.

use rpsx_common::{VRAM_HEIGHT, VRAM_WIDTH};

use super::HardwareRenderer;
use crate::backend::GpuDevice;
use crate::draw_mode::{DrawMode, Palette, TexturePage, TextureWindow};

/// Drawing area in native pixels, all edges inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawingArea {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl DrawingArea {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left: left.min(VRAM_WIDTH - 1),
            top: top.min(VRAM_HEIGHT - 1),
            right: right.min(VRAM_WIDTH - 1),
            bottom: bottom.min(VRAM_HEIGHT - 1),
        }
    }

    /// Nothing can be drawn when an edge is inverted.
    pub fn is_valid(&self) -> bool {
        self.left <= self.right && self.top <= self.bottom
    }
}

impl Default for DrawingArea {
    fn default() -> Self {
        Self::new(0, 0, VRAM_WIDTH - 1, VRAM_HEIGHT - 1)
    }
}

/// Signed offset added to every vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawingOffset {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct DrawRegisters {
    pub draw_mode: DrawMode,
    pub drawing_area: DrawingArea,
    pub drawing_offset: DrawingOffset,
    /// The scissor needs updating before the next draw.
    pub drawing_area_changed: bool,
    pub dither_enable: bool,
    pub set_mask_while_drawing: bool,
    pub check_mask_before_draw: bool,
    /// Skip lines of the field currently being displayed.
    pub interlaced_rendering: bool,
    /// Field currently being displayed.
    pub active_line_lsb: u32,
}

impl<D: GpuDevice> HardwareRenderer<D> {
    pub fn set_texture_page(&mut self, page: TexturePage) {
        let masked = TexturePage(page.0 & TexturePage::MASK);
        if self.regs.draw_mode.texture_page != masked {
            self.flush_render();
            self.regs.draw_mode.set_texture_page(masked);
        }
    }

    pub fn set_palette(&mut self, palette: Palette) {
        let masked = Palette(palette.0 & Palette::MASK);
        if self.regs.draw_mode.palette != masked {
            self.flush_render();
            self.regs.draw_mode.set_palette(masked);
        }
    }

    pub fn set_texture_window(&mut self, window: TextureWindow) {
        if self.regs.draw_mode.texture_window != window {
            self.flush_render();
            self.regs.draw_mode.set_texture_window(window);
        }
    }

    pub fn set_drawing_area(&mut self, area: DrawingArea) {
        if self.regs.drawing_area != area {
            self.flush_render();
            self.regs.drawing_area = area;
            self.regs.drawing_area_changed = true;
        }
    }

    pub fn set_drawing_offset(&mut self, offset: DrawingOffset) {
        self.regs.drawing_offset = offset;
    }

    pub fn set_mask_settings(&mut self, set_mask_while_drawing: bool, check_mask_before_draw: bool) {
        if self.regs.set_mask_while_drawing != set_mask_while_drawing
            || self.regs.check_mask_before_draw != check_mask_before_draw
        {
            self.flush_render();
            self.regs.set_mask_while_drawing = set_mask_while_drawing;
            self.regs.check_mask_before_draw = check_mask_before_draw;
        }
    }

    pub fn set_dither_enable(&mut self, enable: bool) {
        if self.regs.dither_enable != enable {
            self.flush_render();
            self.regs.dither_enable = enable;
        }
    }

    /// Interlaced rendering skips the lines of `active_line_lsb`.
    pub fn set_interlaced_rendering(&mut self, enable: bool, active_line_lsb: u32) {
        let active_line_lsb = active_line_lsb & 1;
        if self.regs.interlaced_rendering != enable || self.regs.active_line_lsb != active_line_lsb {
            self.flush_render();
            self.regs.interlaced_rendering = enable;
            self.regs.active_line_lsb = active_line_lsb;
        }
    }

    pub fn drawing_area(&self) -> DrawingArea {
        self.regs.drawing_area
    }

    pub fn drawing_offset(&self) -> DrawingOffset {
        self.regs.drawing_offset
    }

    pub fn draw_mode(&self) -> &DrawMode {
        &self.regs.draw_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drawing_area_clamped() {
        let area = DrawingArea::new(0, 0, 2000, 600);
        assert_eq!(area.right, VRAM_WIDTH - 1);
        assert_eq!(area.bottom, VRAM_HEIGHT - 1);
        assert!(area.is_valid());
        assert!(!DrawingArea::new(10, 0, 5, 10).is_valid());
        assert_eq!(DrawingArea::default(), area);
    }
}
