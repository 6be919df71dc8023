// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Shared GPU command queue.
//!
//! The command decoder pushes [`GpuCommand`]s from any thread via
//! [`GpuContext::submit`], and the render loop drains the queue into a
//! [`HardwareRenderer`] in submission order via [`GpuContext::flush`].

use parking_lot::Mutex;

use rpsx_common::GpuResult;

use crate::backend::GpuDevice;
use crate::draw_mode::{Palette, TexturePage, TextureWindow};
use crate::hw::{DisplayConfig, DrawingArea, DrawingOffset, HardwareRenderer};
use crate::primitive::{DrawLine, DrawPolygon, DrawRectangle};

/// One decoded GPU command.
#[derive(Debug, Clone)]
pub enum GpuCommand {
    SetTexturePage(TexturePage),
    SetPalette(Palette),
    SetTextureWindow(TextureWindow),
    SetDrawingArea(DrawingArea),
    SetDrawingOffset(DrawingOffset),
    SetMaskSettings { set_mask: bool, check_mask: bool },
    SetDitherEnable(bool),
    SetInterlacedRendering { enable: bool, active_line_lsb: u32 },
    Polygon(DrawPolygon),
    Rectangle(DrawRectangle),
    Line(DrawLine),
    FillVram { x: u32, y: u32, width: u32, height: u32, color: u32 },
    UpdateVram {
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: Vec<u16>,
        set_mask: bool,
        check_mask: bool,
    },
    CopyVram {
        src_x: u32,
        src_y: u32,
        dst_x: u32,
        dst_y: u32,
        width: u32,
        height: u32,
    },
    ReadVram { x: u32, y: u32, width: u32, height: u32 },
    ClearFramebuffer,
    SetDisplayConfig(DisplayConfig),
    UpdateDisplay,
}

impl GpuCommand {
    /// Apply this command to a renderer.
    pub fn execute<D: GpuDevice>(self, renderer: &mut HardwareRenderer<D>) -> GpuResult<()> {
        match self {
            Self::SetTexturePage(page) => renderer.set_texture_page(page),
            Self::SetPalette(palette) => renderer.set_palette(palette),
            Self::SetTextureWindow(window) => renderer.set_texture_window(window),
            Self::SetDrawingArea(area) => renderer.set_drawing_area(area),
            Self::SetDrawingOffset(offset) => renderer.set_drawing_offset(offset),
            Self::SetMaskSettings { set_mask, check_mask } => renderer.set_mask_settings(set_mask, check_mask),
            Self::SetDitherEnable(enable) => renderer.set_dither_enable(enable),
            Self::SetInterlacedRendering { enable, active_line_lsb } => {
                renderer.set_interlaced_rendering(enable, active_line_lsb)
            }
            Self::Polygon(cmd) => renderer.draw_polygon(&cmd),
            Self::Rectangle(cmd) => renderer.draw_rectangle(&cmd),
            Self::Line(cmd) => renderer.draw_line(&cmd),
            Self::FillVram {
                x,
                y,
                width,
                height,
                color,
            } => renderer.fill_vram(x, y, width, height, color),
            Self::UpdateVram {
                x,
                y,
                width,
                height,
                data,
                set_mask,
                check_mask,
            } => renderer.update_vram(x, y, width, height, &data, set_mask, check_mask)?,
            Self::CopyVram {
                src_x,
                src_y,
                dst_x,
                dst_y,
                width,
                height,
            } => renderer.copy_vram(src_x, src_y, dst_x, dst_y, width, height),
            Self::ReadVram { x, y, width, height } => renderer.read_vram(x, y, width, height)?,
            Self::ClearFramebuffer => renderer.clear_framebuffer(),
            Self::SetDisplayConfig(config) => renderer.set_display_config(config)?,
            Self::UpdateDisplay => renderer.update_display(),
        }
        Ok(())
    }
}

/// Command queue shared between the decoder and the render loop.
#[derive(Default)]
pub struct GpuContext {
    queue: Mutex<Vec<GpuCommand>>,
}

impl GpuContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue commands for the next flush.
    pub fn submit(&self, commands: impl IntoIterator<Item = GpuCommand>) {
        let mut queue = self.queue.lock();
        let before = queue.len();
        queue.extend(commands);
        log::trace!("GpuContext: submit {} commands", queue.len() - before);
    }

    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Execute every queued command in order and return how many ran. On
    /// error the remaining commands of this flush are dropped.
    pub fn flush<D: GpuDevice>(&self, renderer: &mut HardwareRenderer<D>) -> GpuResult<usize> {
        let commands = std::mem::take(&mut *self.queue.lock());
        if commands.is_empty() {
            return Ok(0);
        }

        log::debug!("GpuContext: flush {} commands", commands.len());
        let count = commands.len();
        for command in commands {
            command.execute(renderer)?;
        }
        renderer.flush_render();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::null_backend::NullDevice;
    use crate::primitive::{PolygonVertex, RenderFlags};
    use rpsx_common::settings::Settings;

    fn triangle() -> GpuCommand {
        GpuCommand::Polygon(DrawPolygon::triangle(
            RenderFlags::empty(),
            [
                PolygonVertex::new(0, 0, 0xFF),
                PolygonVertex::new(10, 0, 0xFF),
                PolygonVertex::new(0, 10, 0xFF),
            ],
        ))
    }

    #[test]
    fn test_flush_empty() {
        let ctx = GpuContext::new();
        let mut renderer = HardwareRenderer::new(NullDevice::new(), &Settings::default()).unwrap();
        assert_eq!(ctx.flush(&mut renderer).unwrap(), 0);
    }

    #[test]
    fn test_flush_drains_queue_in_order() {
        let ctx = GpuContext::new();
        let mut renderer = HardwareRenderer::new(NullDevice::new(), &Settings::default()).unwrap();

        ctx.submit([triangle(), triangle()]);
        ctx.submit([GpuCommand::SetDitherEnable(true), triangle()]);
        assert_eq!(ctx.pending(), 4);

        assert_eq!(ctx.flush(&mut renderer).unwrap(), 4);
        assert_eq!(ctx.pending(), 0);
        assert_eq!(renderer.pending_vertices(), 0);
        // The dither change splits the triangles into two batches.
        assert_eq!(renderer.stats().num_batches, 2);
    }

    #[test]
    fn test_short_upload_stops_flush() {
        let ctx = GpuContext::new();
        let mut renderer = HardwareRenderer::new(NullDevice::new(), &Settings::default()).unwrap();
        ctx.submit([
            GpuCommand::UpdateVram {
                x: 0,
                y: 0,
                width: 4,
                height: 4,
                data: vec![0; 3],
                set_mask: false,
                check_mask: false,
            },
            triangle(),
        ]);
        assert!(ctx.flush(&mut renderer).is_err());
        assert_eq!(ctx.pending(), 0);
    }
}
