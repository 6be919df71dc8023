// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Deterministic test scene.
//!
//! Exercises every kind of work the renderer accepts: fills, CPU uploads,
//! textured and shaded polygons, sprites, lines, masked drawing, VRAM copies
//! and render-to-texture feedback.

use std::io::Write;

use anyhow::{Context, Result};
use byteorder::{LittleEndian, WriteBytesExt};

use rpsx_common::unpack_rgba8;
use rpsx_gpu::draw_mode::{Palette, TexturePage, TextureWindow};
use rpsx_gpu::hw::{DisplayConfig, DrawingArea, DrawingOffset};
use rpsx_gpu::primitive::{DrawLine, DrawPolygon, DrawRectangle, LineVertex, PolygonVertex, RenderFlags};
use rpsx_gpu::GpuCommand;

/// Where the demo keeps its 16-bit texture.
const TEXTURE_X: u32 = 640;
const TEXTURE_Y: u32 = 0;
const TEXTURE_SIZE: u32 = 32;

/// 16-bit texture page at (640, 0).
fn texture_page() -> TexturePage {
    TexturePage(((TEXTURE_X / 64) | (2 << 7)) as u16)
}

fn checkerboard(frame: u32) -> Vec<u16> {
    let mut texels = Vec::with_capacity((TEXTURE_SIZE * TEXTURE_SIZE) as usize);
    for y in 0..TEXTURE_SIZE {
        for x in 0..TEXTURE_SIZE {
            let on = ((x / 4) + (y / 4) + frame) % 2 == 0;
            texels.push(if on { 0x7FFF } else { 0x001F | ((frame as u16 & 0x1F) << 5) });
        }
    }
    texels
}

/// Commands for one frame of the scene.
pub fn frame_commands(frame: u32) -> Vec<GpuCommand> {
    let page = texture_page();
    let t = frame as i32;
    vec![
        GpuCommand::SetDrawingArea(DrawingArea::new(0, 0, 319, 239)),
        GpuCommand::SetDrawingOffset(DrawingOffset { x: 0, y: 0 }),
        GpuCommand::SetMaskSettings {
            set_mask: false,
            check_mask: false,
        },
        GpuCommand::FillVram {
            x: 0,
            y: 0,
            width: 320,
            height: 240,
            color: 0x0040_2010,
        },
        GpuCommand::UpdateVram {
            x: TEXTURE_X,
            y: TEXTURE_Y,
            width: TEXTURE_SIZE,
            height: TEXTURE_SIZE,
            data: checkerboard(frame),
            set_mask: false,
            check_mask: false,
        },
        GpuCommand::SetDitherEnable(true),
        GpuCommand::Polygon(DrawPolygon::triangle(
            RenderFlags::SHADED,
            [
                PolygonVertex::new(20 + t, 20, 0x0000FF),
                PolygonVertex::new(150, 40 + t, 0x00FF00),
                PolygonVertex::new(60, 200, 0xFF0000),
            ],
        )),
        GpuCommand::SetTexturePage(page),
        GpuCommand::SetPalette(Palette::default()),
        GpuCommand::SetTextureWindow(TextureWindow::default()),
        GpuCommand::Polygon(DrawPolygon::quad(
            RenderFlags::TEXTURED | RenderFlags::RAW_TEXTURE,
            [
                PolygonVertex::textured(180, 20, 0x808080, 0, 0),
                PolygonVertex::textured(300, 30, 0x808080, 31, 0),
                PolygonVertex::textured(170, 120, 0x808080, 0, 31),
                PolygonVertex::textured(290, 130, 0x808080, 31, 31),
            ],
        )),
        GpuCommand::Rectangle(DrawRectangle {
            flags: RenderFlags::TEXTURED | RenderFlags::TRANSPARENT,
            x: 200 + t,
            y: 150,
            width: 48,
            height: 48,
            color: 0x808080,
            u: 0,
            v: 0,
        }),
        GpuCommand::Line(DrawLine::polyline(
            RenderFlags::SHADED,
            vec![
                LineVertex::new(10, 230, 0xFFFFFF),
                LineVertex::new(100, 180 - t, 0x00FFFF),
                LineVertex::new(160, 230, 0xFF00FF),
            ],
        )),
        // Masked sprite: the second one must not overwrite the first.
        GpuCommand::SetMaskSettings {
            set_mask: true,
            check_mask: true,
        },
        GpuCommand::Rectangle(DrawRectangle {
            flags: RenderFlags::empty(),
            x: 120,
            y: 120,
            width: 40,
            height: 40,
            color: 0x00FFFF,
            u: 0,
            v: 0,
        }),
        GpuCommand::Rectangle(DrawRectangle {
            flags: RenderFlags::empty(),
            x: 130,
            y: 130,
            width: 40,
            height: 40,
            color: 0xFF00FF,
            u: 0,
            v: 0,
        }),
        GpuCommand::SetMaskSettings {
            set_mask: false,
            check_mask: false,
        },
        // Copy part of the frame into the texture page and sample it back.
        GpuCommand::CopyVram {
            src_x: 20,
            src_y: 20,
            dst_x: TEXTURE_X,
            dst_y: TEXTURE_Y + TEXTURE_SIZE,
            width: 32,
            height: 32,
        },
        GpuCommand::Rectangle(DrawRectangle {
            flags: RenderFlags::TEXTURED | RenderFlags::RAW_TEXTURE,
            x: 260,
            y: 200,
            width: 32,
            height: 32,
            color: 0x808080,
            u: 0,
            v: TEXTURE_SIZE as u8,
        }),
        GpuCommand::SetDisplayConfig(DisplayConfig::default()),
        GpuCommand::UpdateDisplay,
    ]
}

/// Write packed RGBA8 pixels as a 24-bit bottom-up BMP.
pub fn write_bmp<W: Write>(w: &mut W, width: u32, height: u32, pixels: &[u32]) -> Result<()> {
    let row_size = (width * 3).div_ceil(4) * 4;
    let image_size = row_size * height;
    let header_size = 14 + 40;

    w.write_all(b"BM")?;
    w.write_u32::<LittleEndian>(header_size + image_size)?;
    w.write_u32::<LittleEndian>(0)?;
    w.write_u32::<LittleEndian>(header_size)?;

    w.write_u32::<LittleEndian>(40)?;
    w.write_i32::<LittleEndian>(width as i32)?;
    w.write_i32::<LittleEndian>(height as i32)?;
    w.write_u16::<LittleEndian>(1)?;
    w.write_u16::<LittleEndian>(24)?;
    w.write_u32::<LittleEndian>(0)?;
    w.write_u32::<LittleEndian>(image_size)?;
    w.write_i32::<LittleEndian>(2835)?;
    w.write_i32::<LittleEndian>(2835)?;
    w.write_u32::<LittleEndian>(0)?;
    w.write_u32::<LittleEndian>(0)?;

    let padding = (row_size - width * 3) as usize;
    for y in (0..height).rev() {
        let start = (y * width) as usize;
        let row = pixels
            .get(start..start + width as usize)
            .context("display image is smaller than its dimensions")?;
        for &p in row {
            let [r, g, b, _] = unpack_rgba8(p);
            w.write_all(&[b, g, r])?;
        }
        w.write_all(&[0u8; 3][..padding])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_commands_are_deterministic() {
        let a = format!("{:?}", frame_commands(3));
        let b = format!("{:?}", frame_commands(3));
        assert_eq!(a, b);
        assert_ne!(a, format!("{:?}", frame_commands(4)));
    }

    #[test]
    fn test_texture_page_location() {
        let page = texture_page();
        assert_eq!(page.base_x(), TEXTURE_X);
        assert_eq!(page.base_y(), TEXTURE_Y);
    }

    #[test]
    fn test_bmp_layout() {
        let mut out = Vec::new();
        write_bmp(&mut out, 3, 2, &[0x00FF_0000; 6]).unwrap();
        // 3 pixels * 3 bytes padded to 12 bytes per row.
        assert_eq!(out.len(), 54 + 12 * 2);
        assert_eq!(&out[0..2], b"BM");
        assert_eq!(&out[54..57], &[0xFF, 0, 0]);
    }
}
