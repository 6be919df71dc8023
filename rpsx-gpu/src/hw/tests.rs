// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! End-to-end renderer tests against the reference and null devices.

use std::sync::Arc;

use parking_lot::Mutex;

use rpsx_common::settings::{DownsampleMode, Settings, TextureFilter};
use rpsx_common::{rgba5551_to_rgba8888, rgba8888_to_rgba5551, GpuError, Rect, VRAM_HEIGHT, VRAM_WIDTH};

use super::*;
use crate::backend::null_backend::NullDevice;
use crate::backend::reference::ReferenceDevice;
use crate::backend::{DeviceFeatures, GpuDevice, TextureDesc, TextureFormat, TextureKind};
use crate::draw_mode::{Palette, TexturePage, TextureWindow};
use crate::host::{HostInterface, RecordingHost};
use crate::primitive::{DrawLine, DrawPolygon, DrawRectangle, LineVertex, PolygonVertex, RenderFlags};
use crate::types::InterlacedRenderMode;

/// 16-bit page at (512, 0).
const PAGE_16BIT: TexturePage = TexturePage(8 | (2 << 7));
/// 4-bit page at (576, 256).
const PAGE_4BIT: TexturePage = TexturePage(9 | (1 << 4));
/// Palette at (0, 500).
const CLUT: Palette = Palette(500 << 6);

const WHITE: u32 = 0xFFFFFF;

fn settings_with_scale(scale: u32) -> Settings {
    Settings {
        resolution_scale: scale,
        ..Settings::default()
    }
}

fn reference_renderer(settings: &Settings) -> HardwareRenderer<ReferenceDevice> {
    HardwareRenderer::new(ReferenceDevice::new(), settings).unwrap()
}

fn read_all<D: GpuDevice>(r: &mut HardwareRenderer<D>) -> Vec<u16> {
    r.read_vram_block(0, 0, VRAM_WIDTH, VRAM_HEIGHT).unwrap()
}

fn flat_triangle(points: [(i32, i32); 3], color: u32) -> DrawPolygon {
    DrawPolygon::triangle(
        RenderFlags::empty(),
        points.map(|(x, y)| PolygonVertex::new(x, y, color)),
    )
}

fn sprite(x: i32, y: i32, width: u32, height: u32, u: u8, v: u8) -> DrawRectangle {
    DrawRectangle {
        flags: RenderFlags::TEXTURED | RenderFlags::RAW_TEXTURE,
        x,
        y,
        width,
        height,
        color: 0x808080,
        u,
        v,
    }
}

/// Small deterministic generator so failures reproduce.
struct XorShift(u32);

impl XorShift {
    fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    fn below(&mut self, n: u32) -> u32 {
        self.next() % n
    }

    fn coin(&mut self) -> bool {
        self.next() & 1 != 0
    }
}

/// One random piece of work for the scene-level tests.
fn random_op<D: GpuDevice>(r: &mut HardwareRenderer<D>, rng: &mut XorShift) {
    let x = rng.below(VRAM_WIDTH - 64) as i32;
    let y = rng.below(VRAM_HEIGHT - 64) as i32;
    match rng.below(10) {
        0 => r.fill_vram(
            x as u32,
            y as u32,
            1 + rng.below(48),
            1 + rng.below(48),
            rng.next() | 0x0001_0101,
        ),
        1 | 2 => {
            let poly = flat_triangle(
                [(x, y), (x + rng.below(48) as i32, y), (x, y + rng.below(48) as i32)],
                rng.next() & WHITE,
            );
            r.draw_polygon(&poly);
        }
        3 | 4 => {
            let u = rng.below(256) as u8;
            let v = rng.below(256) as u8;
            let poly = DrawPolygon::quad(
                RenderFlags::TEXTURED | RenderFlags::RAW_TEXTURE,
                [
                    PolygonVertex::textured(x, y, WHITE, u, v),
                    PolygonVertex::textured(x + 20, y, WHITE, u.wrapping_add(20), v),
                    PolygonVertex::textured(x, y + 20, WHITE, u, v.wrapping_add(20)),
                    PolygonVertex::textured(x + 20, y + 20, WHITE, u.wrapping_add(20), v.wrapping_add(20)),
                ],
            );
            r.draw_polygon(&poly);
        }
        5 => r.draw_rectangle(&sprite(
            x,
            y,
            1 + rng.below(40),
            1 + rng.below(40),
            rng.below(256) as u8,
            rng.below(256) as u8,
        )),
        6 => {
            let page = if rng.coin() { PAGE_16BIT } else { PAGE_4BIT };
            r.set_texture_page(page);
            r.set_palette(CLUT);
        }
        7 => {
            let sx = rng.below(VRAM_WIDTH);
            let sy = rng.below(VRAM_HEIGHT);
            r.copy_vram(sx, sy, x as u32, y as u32, 1 + rng.below(32), 1 + rng.below(32));
        }
        8 => {
            let (w, h) = (1 + rng.below(16), 1 + rng.below(16));
            let data: Vec<u16> = (0..w * h).map(|_| (rng.next() as u16) | 1).collect();
            r.update_vram(x as u32, y as u32, w, h, &data, false, false).unwrap();
        }
        _ => {
            let window = if rng.coin() {
                TextureWindow::default()
            } else {
                TextureWindow::from_bits(rng.below(1 << 20))
            };
            r.set_texture_window(window);
        }
    }
}

/// Like [`random_op`], but also toggles semi-transparency, mask bits and
/// dithering in the middle of the stream.
fn random_state_op<D: GpuDevice>(r: &mut HardwareRenderer<D>, rng: &mut XorShift) {
    let x = rng.below(VRAM_WIDTH - 64) as i32;
    let y = rng.below(VRAM_HEIGHT - 64) as i32;
    let transparent = if rng.coin() {
        RenderFlags::TRANSPARENT
    } else {
        RenderFlags::empty()
    };
    match rng.below(12) {
        0 => r.fill_vram(x as u32, y as u32, 1 + rng.below(48), 1 + rng.below(48), rng.next()),
        1 => {
            let poly = DrawPolygon::triangle(
                transparent,
                [(x, y), (x + rng.below(48) as i32, y), (x, y + rng.below(48) as i32)]
                    .map(|(px, py)| PolygonVertex::new(px, py, 0x0040_6080)),
            );
            r.draw_polygon(&poly);
        }
        2 => {
            let poly = DrawPolygon::triangle(
                RenderFlags::SHADED | transparent,
                [
                    PolygonVertex::new(x, y, rng.next() & WHITE),
                    PolygonVertex::new(x + 40, y + 5, rng.next() & WHITE),
                    PolygonVertex::new(x + 8, y + 40, rng.next() & WHITE),
                ],
            );
            r.draw_polygon(&poly);
        }
        3 => {
            let u = rng.below(256) as u8;
            let v = rng.below(256) as u8;
            let color = 0x0060_80A0;
            let poly = DrawPolygon::quad(
                RenderFlags::TEXTURED | transparent,
                [
                    PolygonVertex::textured(x, y, color, u, v),
                    PolygonVertex::textured(x + 24, y, color, u.wrapping_add(24), v),
                    PolygonVertex::textured(x, y + 24, color, u, v.wrapping_add(24)),
                    PolygonVertex::textured(x + 24, y + 24, color, u.wrapping_add(24), v.wrapping_add(24)),
                ],
            );
            r.draw_polygon(&poly);
        }
        4 => {
            let mut rect = sprite(
                x,
                y,
                1 + rng.below(40),
                1 + rng.below(40),
                rng.below(256) as u8,
                rng.below(256) as u8,
            );
            rect.flags |= transparent;
            r.draw_rectangle(&rect);
        }
        5 => r.draw_line(&DrawLine::new(
            RenderFlags::SHADED | transparent,
            LineVertex::new(x, y, rng.next() & WHITE),
            LineVertex::new(x + rng.below(60) as i32, y + rng.below(60) as i32, rng.next() & WHITE),
        )),
        6 => {
            let base = if rng.coin() { PAGE_16BIT } else { PAGE_4BIT };
            r.set_texture_page(TexturePage(base.0 | ((rng.below(4) as u16) << 5)));
            r.set_palette(CLUT);
        }
        7 => r.set_mask_settings(rng.coin(), rng.coin()),
        8 => r.set_dither_enable(rng.coin()),
        9 => {
            let sx = rng.below(VRAM_WIDTH);
            let sy = rng.below(VRAM_HEIGHT);
            r.copy_vram(sx, sy, x as u32, y as u32, 1 + rng.below(32), 1 + rng.below(32));
        }
        10 => {
            let (w, h) = (1 + rng.below(16), 1 + rng.below(16));
            let data: Vec<u16> = (0..w * h).map(|_| rng.next() as u16).collect();
            r.update_vram(x as u32, y as u32, w, h, &data, rng.coin(), rng.coin()).unwrap();
        }
        _ => random_op(r, rng),
    }
}

/// Features of [`ReferenceDevice::new`], which blends with dual-source.
fn desktop_features() -> DeviceFeatures {
    ReferenceDevice::new().features()
}

/// One device per blending strategy.
fn blend_strategy_devices() -> Vec<(BlendStrategy, ReferenceDevice)> {
    let dual = desktop_features();
    let plain = dual.difference(DeviceFeatures::DUAL_SOURCE_BLEND);
    vec![
        (BlendStrategy::DualSource, ReferenceDevice::new()),
        (BlendStrategy::TwoPass, ReferenceDevice::with_features(plain)),
        (
            BlendStrategy::FramebufferFetch { dual_source: true },
            ReferenceDevice::with_features(dual | DeviceFeatures::FRAMEBUFFER_FETCH),
        ),
        (
            BlendStrategy::FramebufferFetch { dual_source: false },
            ReferenceDevice::with_features(plain | DeviceFeatures::FRAMEBUFFER_FETCH),
        ),
    ]
}

/// 5-bit gray in VRAM format.
fn gray5(v: u16) -> u16 {
    v | (v << 5) | (v << 10)
}

/// Host shared with the test so messages can be inspected after the
/// renderer has taken ownership of its half.
#[derive(Clone, Default)]
struct SharedHost(Arc<Mutex<RecordingHost>>);

impl HostInterface for SharedHost {
    fn add_osd_message(&mut self, key: &str, message: &str, duration: f32) {
        self.0.lock().add_osd_message(key, message, duration);
    }

    fn remove_osd_message(&mut self, key: &str) {
        self.0.lock().remove_osd_message(key);
    }

    fn display_loading_screen(&mut self, message: &str, min: u32, max: u32, value: u32) {
        self.0.lock().display_loading_screen(message, min, max, value);
    }
}

impl SharedHost {
    fn has(&self, key: &str) -> bool {
        self.0.lock().messages.iter().any(|(k, _)| k == key)
    }
}

#[test]
fn test_fill_reads_back_as_5551() {
    let mut r = reference_renderer(&Settings::default());
    r.fill_vram(0, 0, 64, 64, 0x8000_FFFF);
    let block = r.read_vram_block(0, 0, 64, 64).unwrap();
    assert_eq!(block.len(), 64 * 64);
    assert!(block.iter().all(|&p| p == 0x83FF), "{:04X?}", &block[..8]);
    assert_eq!(r.read_vram_block(64, 0, 1, 1).unwrap(), vec![0]);
    assert_eq!(r.read_vram_block(0, 64, 1, 1).unwrap(), vec![0]);
}

#[test]
fn test_fill_wraps_horizontally() {
    let mut r = reference_renderer(&Settings::default());
    r.fill_vram(1020, 0, 8, 1, 0x0000_00FF);
    let expected = rgba8888_to_rgba5551(0x0000_00FF);
    assert_eq!(r.read_vram_block(1020, 0, 8, 1).unwrap(), vec![expected; 8]);
    assert_eq!(r.read_vram_block(4, 0, 1, 1).unwrap(), vec![0]);
}

#[test]
fn test_upload_then_sprite_copies_texels() {
    let mut r = reference_renderer(&settings_with_scale(2));
    let texels: Vec<u16> = (0..16 * 16).map(|i| 0x0400 | i as u16).collect();
    r.update_vram(512, 0, 16, 16, &texels, false, false).unwrap();
    r.set_texture_page(PAGE_16BIT);
    r.draw_rectangle(&sprite(100, 100, 16, 16, 0, 0));

    assert_eq!(r.read_vram_block(100, 100, 16, 16).unwrap(), texels);
    assert_eq!(r.device().stats().stale_samples, 0);
}

#[test]
fn test_draw_into_texture_page_resyncs_read_copy() {
    let mut r = reference_renderer(&Settings::default());
    let texels = vec![0x0421u16; 64 * 64];
    r.update_vram(512, 0, 64, 64, &texels, false, false).unwrap();
    r.set_texture_page(PAGE_16BIT);
    r.draw_rectangle(&sprite(0, 300, 8, 8, 0, 0));
    r.flush_render();
    let before = r.stats().num_vram_read_texture_updates;

    // Render into the page, then sample the rendered texels.
    r.draw_polygon(&flat_triangle([(512, 0), (560, 0), (512, 48)], WHITE));
    r.draw_rectangle(&sprite(0, 300, 64, 64, 0, 0));

    assert_eq!(r.read_vram_block(1, 301, 1, 1).unwrap(), vec![0x7FFF]);
    assert_eq!(r.read_vram_block(60, 360, 1, 1).unwrap(), vec![0x0421]);
    assert!(r.stats().num_vram_read_texture_updates > before);
    assert_eq!(r.device().stats().stale_samples, 0);
}

#[test]
fn test_degenerate_line_draws_one_pixel() {
    let mut r = reference_renderer(&Settings::default());
    let p = LineVertex::new(5, 5, WHITE);
    r.draw_line(&DrawLine::new(RenderFlags::empty(), p, p));
    assert_eq!(r.read_vram_block(4, 4, 3, 3).unwrap(), vec![0, 0, 0, 0, 0x7FFF, 0, 0, 0, 0]);
}

#[test]
fn test_polyline_segments() {
    let mut r = reference_renderer(&Settings::default());
    r.draw_line(&DrawLine::polyline(
        RenderFlags::empty(),
        vec![
            LineVertex::new(0, 0, WHITE),
            LineVertex::new(9, 0, WHITE),
            LineVertex::new(9, 9, WHITE),
        ],
    ));
    let row = r.read_vram_block(0, 0, 10, 1).unwrap();
    assert!(row.iter().all(|&p| p == 0x7FFF), "{:04X?}", row);
    let column = r.read_vram_block(9, 0, 1, 10).unwrap();
    assert!(column.iter().all(|&p| p == 0x7FFF), "{:04X?}", column);
}

#[test]
fn test_rectangle_splits_at_page_edge() {
    let mut r = reference_renderer(&Settings::default());
    let row: Vec<u16> = (0..256).map(|u| 0x0400 | u as u16).collect();
    r.update_vram(512, 0, 256, 1, &row, false, false).unwrap();
    r.set_texture_page(PAGE_16BIT);
    r.flush_render();

    r.draw_rectangle(&sprite(0, 300, 100, 1, 200, 0));
    assert_eq!(r.pending_vertices(), 12);

    let out = r.read_vram_block(0, 300, 100, 1).unwrap();
    for (i, &p) in out.iter().enumerate() {
        assert_eq!(p, row[(200 + i) & 0xFF], "pixel {}", i);
    }
}

#[test]
fn test_oversized_primitives_are_culled() {
    let mut r = reference_renderer(&Settings::default());
    r.draw_polygon(&flat_triangle([(0, 0), (1024, 0), (0, 10)], WHITE));
    r.draw_rectangle(&DrawRectangle {
        flags: RenderFlags::empty(),
        x: 0,
        y: 0,
        width: 10,
        height: 512,
        color: WHITE,
        u: 0,
        v: 0,
    });
    r.flush_render();
    assert_eq!(r.pending_vertices(), 0);
    assert!(read_all(&mut r).iter().all(|&p| p == 0));
}

#[test]
fn test_batching_does_not_change_output() {
    let run = |flush_each: bool| {
        let mut r = reference_renderer(&Settings::default());
        let mut rng = XorShift(0x1234_5678);
        for _ in 0..200 {
            random_op(&mut r, &mut rng);
            if flush_each {
                r.flush_render();
            }
        }
        read_all(&mut r)
    };
    assert!(run(false) == run(true));
}

#[test]
fn test_batching_with_state_changes_does_not_change_output() {
    let run = |device: ReferenceDevice, flush_each: bool| {
        let mut r = HardwareRenderer::new(device, &Settings::default()).unwrap();
        let mut rng = XorShift(0x5EED_0001);
        r.set_texture_page(PAGE_16BIT);
        for _ in 0..300 {
            random_state_op(&mut r, &mut rng);
            if flush_each {
                r.flush_render();
            }
        }
        r.flush_render();
        assert_eq!(r.device().stats().stale_samples, 0);
        read_all(&mut r)
    };
    let small_buffer = || {
        let mut device = ReferenceDevice::new();
        device.set_vertex_capacity(96);
        device
    };

    let batched = run(ReferenceDevice::new(), false);
    assert!(batched.iter().any(|&p| p != 0));
    assert!(run(ReferenceDevice::new(), true) == batched, "per-command flush differs");
    assert!(run(small_buffer(), false) == batched, "small vertex buffer differs");
    // Two-pass draws a batch's opaque texels before its transparent ones,
    // so only the single-pass strategies are compared on a whole stream.
    for (strategy, device) in blend_strategy_devices() {
        if strategy.supports_framebuffer_fetch() {
            assert!(run(device, false) == batched, "{:?} differs", strategy);
        }
    }
}

#[test]
fn test_semi_transparency_matches_across_blend_strategies() {
    // Background 8 and foreground 4 per channel, in 5-bit units.
    let background = 0x0040_4040;
    let foreground = 0x0020_2020;
    let semi = 0x8000 | gray5(4);
    let opaque = gray5(10);
    // Half, add, subtract, add quarter.
    let blended = [6, 12, 4, 9];

    let mut images = Vec::new();
    for (strategy, device) in blend_strategy_devices() {
        let mut r = HardwareRenderer::new(device, &Settings::default()).unwrap();
        assert_eq!(r.blend_strategy(), strategy);
        r.update_vram(512, 0, 3, 1, &[semi, opaque, 0], false, false).unwrap();

        for (mode, &expected) in blended.iter().enumerate() {
            let y = mode as i32 * 4;
            r.fill_vram(0, y as u32, 16, 4, background);
            r.set_texture_page(TexturePage(PAGE_16BIT.0 | ((mode as u16) << 5)));
            r.draw_rectangle(&DrawRectangle {
                flags: RenderFlags::TRANSPARENT,
                x: 0,
                y,
                width: 4,
                height: 1,
                color: foreground,
                u: 0,
                v: 0,
            });
            let mut textured = sprite(8, y, 3, 1, 0, 0);
            textured.flags |= RenderFlags::TRANSPARENT;
            r.draw_rectangle(&textured);

            let flat = r.read_vram_block(0, y as u32, 4, 1).unwrap();
            assert_eq!(flat, vec![gray5(expected); 4], "{:?} mode {}", strategy, mode);
            // Semi-transparent texel blends and keeps its mask bit, the
            // opaque one replaces, and the transparent one leaves the
            // background alone.
            let texels = r.read_vram_block(8, y as u32, 3, 1).unwrap();
            assert_eq!(
                texels,
                vec![0x8000 | gray5(expected), opaque, gray5(8)],
                "{:?} mode {}",
                strategy,
                mode
            );
        }
        images.push(read_all(&mut r));
    }
    assert!(images.windows(2).all(|pair| pair[0] == pair[1]));
}

#[test]
fn test_two_pass_draws_each_textured_batch_twice() {
    let plain = desktop_features().difference(DeviceFeatures::DUAL_SOURCE_BLEND);
    let mut r = HardwareRenderer::new(ReferenceDevice::with_features(plain), &Settings::default()).unwrap();
    r.set_texture_page(TexturePage(PAGE_16BIT.0 | (1 << 5)));
    r.flush_render();
    r.reset_stats();

    let mut textured = sprite(0, 0, 8, 8, 0, 0);
    textured.flags |= RenderFlags::TRANSPARENT;
    r.draw_rectangle(&textured);
    r.flush_render();
    assert_eq!(r.stats().num_batches, 2);

    r.draw_rectangle(&DrawRectangle {
        flags: RenderFlags::TRANSPARENT,
        x: 0,
        y: 20,
        width: 8,
        height: 8,
        color: WHITE,
        u: 0,
        v: 0,
    });
    r.flush_render();
    assert_eq!(r.stats().num_batches, 3);
}

#[test]
fn test_dirty_rect_covers_every_write() {
    let mut r = reference_renderer(&Settings::default());
    r.update_vram_read_texture();
    assert!(!r.vram_dirty_rect().is_valid());

    let mut rng = XorShift(42);
    for _ in 0..20 {
        let x = rng.below(900) as i32;
        let y = 10 + rng.below(400) as i32;
        r.draw_polygon(&flat_triangle([(x, y), (x + 30, y + 5), (x + 10, y + 40)], WHITE));
        r.draw_line(&DrawLine::new(
            RenderFlags::empty(),
            LineVertex::new(x, y - 10, WHITE),
            LineVertex::new(x + 50, y - 3, WHITE),
        ));
    }
    let dirty = r.vram_dirty_rect();
    let pixels = read_all(&mut r);
    for (i, &p) in pixels.iter().enumerate() {
        if p != 0 {
            let (x, y) = (i as u32 % VRAM_WIDTH, i as u32 / VRAM_WIDTH);
            assert!(dirty.contains_point(x, y), "({}, {}) outside {:?}", x, y, dirty);
        }
    }
}

#[test]
fn test_read_copy_resync_is_idempotent() {
    let mut r = reference_renderer(&Settings::default());
    r.fill_vram(0, 0, 8, 8, WHITE);
    r.update_vram_read_texture();
    let stats = r.stats();
    let copies = r.device().stats().copies;

    r.update_vram_read_texture();
    assert_eq!(r.stats(), stats);
    assert_eq!(r.device().stats().copies, copies);
    assert_eq!(r.vram_dirty_rect(), Rect::INVALID);
}

#[test]
fn test_texture_hazard_fuzz() {
    for (scale, seed, ops) in [(1, 0xDEAD_BEEF, 400), (2, 0x0BAD_F00D, 150)] {
        let mut r = reference_renderer(&settings_with_scale(scale));
        let mut rng = XorShift(seed);
        r.set_texture_page(PAGE_16BIT);
        for _ in 0..ops {
            random_op(&mut r, &mut rng);
        }
        r.flush_render();
        assert_eq!(r.device().stats().stale_samples, 0, "scale {}", scale);
    }
}

#[test]
fn test_mask_check_blocks_writes() {
    let mut r = reference_renderer(&Settings::default());
    r.fill_vram(0, 0, 8, 8, 0x8000_00FF);
    r.set_mask_settings(false, true);
    r.draw_rectangle(&DrawRectangle {
        flags: RenderFlags::empty(),
        x: 4,
        y: 0,
        width: 8,
        height: 8,
        color: 0x00FF00,
        u: 0,
        v: 0,
    });
    let red = rgba8888_to_rgba5551(0x8000_00FF);
    let green = rgba8888_to_rgba5551(0x0000_FF00);
    assert_eq!(r.read_vram_block(4, 0, 4, 8).unwrap(), vec![red; 32]);
    assert_eq!(r.read_vram_block(8, 0, 4, 8).unwrap(), vec![green; 32]);
}

#[test]
fn test_set_mask_protects_later_draws() {
    let mut r = reference_renderer(&Settings::default());
    r.set_mask_settings(true, true);
    r.draw_polygon(&flat_triangle([(0, 0), (16, 0), (0, 16)], 0x0000FF));
    r.draw_polygon(&flat_triangle([(0, 0), (16, 0), (0, 16)], 0x00FF00));
    assert_eq!(r.read_vram_block(1, 1, 1, 1).unwrap(), vec![0x801F]);
}

#[test]
fn test_copy_respects_mask_and_fast_path() {
    let mut r = reference_renderer(&Settings::default());
    r.fill_vram(0, 0, 8, 8, 0x8000_00FF);
    r.fill_vram(100, 0, 8, 8, 0x0000_FF00);
    let green = rgba8888_to_rgba5551(0x0000_FF00);
    let red = rgba8888_to_rgba5551(0x8000_00FF);

    r.copy_vram(100, 0, 300, 0, 8, 8);
    assert_eq!(r.read_vram_block(300, 0, 8, 8).unwrap(), vec![green; 64]);

    r.set_mask_settings(false, true);
    r.copy_vram(100, 0, 0, 0, 8, 8);
    r.copy_vram(100, 0, 200, 0, 8, 8);
    assert_eq!(r.read_vram_block(0, 0, 8, 8).unwrap(), vec![red; 64]);
    assert_eq!(r.read_vram_block(200, 0, 8, 8).unwrap(), vec![green; 64]);
}

#[test]
fn test_copy_overlapping_source() {
    let mut r = reference_renderer(&Settings::default());
    let data: Vec<u16> = (0..32).map(|i| 0x0100 | i as u16).collect();
    r.update_vram(0, 0, 32, 1, &data, false, false).unwrap();
    r.copy_vram(0, 0, 8, 0, 24, 1);
    assert_eq!(r.read_vram_block(8, 0, 24, 1).unwrap(), data[..24].to_vec());
}

#[test]
fn test_upload_rejects_short_data() {
    let mut r = reference_renderer(&Settings::default());
    let err = r.update_vram(0, 0, 4, 4, &[0; 15], false, false).unwrap_err();
    assert!(matches!(err, GpuError::BufferCreation(_)));
}

#[test]
fn test_depth_counter_wraps_once() {
    let mut r = HardwareRenderer::new(NullDevice::new(), &Settings::default()).unwrap();
    r.set_mask_settings(false, true);
    let tri = flat_triangle([(0, 0), (4, 0), (0, 4)], WHITE);

    let budget = rpsx_common::MAX_BATCH_VERTEX_COUNTER_IDS - 3;
    for _ in 0..budget {
        r.draw_polygon(&tri);
    }
    assert_eq!(r.current_depth(), budget + 1);
    assert_eq!(r.stats().num_depth_buffer_rebuilds, 0);

    r.draw_polygon(&tri);
    assert_eq!(r.stats().num_depth_buffer_rebuilds, 1);
    assert_eq!(r.current_depth(), 2);
}

#[test]
fn test_depth_counter_wrap_keeps_mask_protection() {
    let mut r = reference_renderer(&Settings::default());
    r.fill_vram(0, 0, 4, 4, 0x8000_00FF);
    r.set_mask_settings(false, true);
    let tri = flat_triangle([(0, 0), (8, 0), (0, 8)], 0x00FF00);
    for _ in 0..rpsx_common::MAX_BATCH_VERTEX_COUNTER_IDS + 8 {
        r.draw_polygon(&tri);
    }
    r.flush_render();

    assert!(r.stats().num_depth_buffer_rebuilds >= 1);
    assert_eq!(r.read_vram_block(1, 1, 1, 1).unwrap(), vec![0x801F]);
    assert_eq!(r.read_vram_block(5, 1, 1, 1).unwrap(), vec![rgba8888_to_rgba5551(0x0000_FF00)]);
}

#[test]
fn test_state_changes_split_batches() {
    let mut r = HardwareRenderer::new(NullDevice::new(), &Settings::default()).unwrap();
    let tri = flat_triangle([(0, 0), (4, 0), (0, 4)], WHITE);
    r.draw_polygon(&tri);
    r.draw_polygon(&tri);
    r.flush_render();
    assert_eq!(r.take_stats().num_batches, 1);

    r.draw_polygon(&tri);
    r.set_mask_settings(true, false);
    r.draw_polygon(&tri);
    r.flush_render();
    assert_eq!(r.stats().num_batches, 2);
    r.reset_stats();
    assert_eq!(r.stats(), RendererStats::default());
}

#[test]
fn test_settings_change_preserves_vram() {
    let host = SharedHost::default();
    let settings = Settings {
        multisamples: 16,
        ..Settings::default()
    };
    let mut r = HardwareRenderer::with_host(
        ReferenceDevice::new(),
        Box::new(crate::shadergen::DefineShaderGen::new()),
        Box::new(host.clone()),
        &settings,
    )
    .unwrap();
    assert!(host.has("MSAAUnsupported"));
    assert_eq!(r.config().multisamples, 8);

    let settings = Settings {
        multisamples: 1,
        ..Settings::default()
    };
    r.update_settings(&settings).unwrap();
    r.fill_vram(20, 20, 10, 10, 0x8000_FF00);
    r.fill_vram(40, 20, 10, 10, 0x0000_00FF);
    let before = read_all(&mut r);

    let scaled = Settings {
        resolution_scale: 3,
        ..settings
    };
    r.update_settings(&scaled).unwrap();
    assert!(host.has("ResolutionScaleChanged"));
    assert_eq!(r.resolution_scale(), 3);
    assert_eq!(r.vram_surface_desc().map(|d| d.width), Some(VRAM_WIDTH * 3));
    assert!(read_all(&mut r) == before);

    // The mask bit survives as depth, so masked drawing still works.
    r.set_mask_settings(false, true);
    r.draw_rectangle(&DrawRectangle {
        flags: RenderFlags::empty(),
        x: 15,
        y: 15,
        width: 30,
        height: 30,
        color: WHITE,
        u: 0,
        v: 0,
    });
    assert_eq!(r.read_vram_block(25, 25, 1, 1).unwrap(), vec![rgba8888_to_rgba5551(0x8000_FF00)]);
    assert_eq!(r.read_vram_block(41, 21, 1, 1).unwrap(), vec![0x7FFF]);
}

#[test]
fn test_pipeline_failure_tears_everything_down() {
    let mut r = reference_renderer(&Settings::default());
    assert!(r.device().live_pipelines() > 0);
    r.device_mut().set_pipeline_budget(Some(0));

    let settings = Settings {
        true_color: true,
        ..Settings::default()
    };
    assert!(r.update_settings(&settings).is_err());
    assert_eq!(r.device().live_pipelines(), 0);
    assert_eq!(r.device().live_shaders(), 0);
    assert_eq!(r.device().live_textures(), 0);

    // Without surfaces every entry point degrades to a no-op.
    r.fill_vram(0, 0, 4, 4, WHITE);
    r.draw_polygon(&flat_triangle([(0, 0), (4, 0), (0, 4)], WHITE));
    r.update_display();
    assert!(r.display_output().is_none());
}

#[test]
fn test_settings_recover_after_failed_recompile() {
    let mut r = reference_renderer(&Settings::default());
    r.fill_vram(100, 100, 8, 8, 0x0000_FF00);
    let green = rgba8888_to_rgba5551(0x0000_FF00);
    let true_color = Settings {
        true_color: true,
        ..Settings::default()
    };

    r.device_mut().set_pipeline_budget(Some(0));
    assert!(r.update_settings(&true_color).is_err());
    assert_eq!(r.device().live_textures(), 0);

    // Reverting rebuilds the surfaces as well as the pipelines.
    r.device_mut().set_pipeline_budget(None);
    r.update_settings(&Settings::default()).unwrap();
    assert!(r.device().live_textures() > 0);
    assert!(r.vram_surface_desc().is_some());
    assert_eq!(r.read_vram_block(100, 100, 1, 1).unwrap(), vec![green]);
    r.fill_vram(0, 0, 64, 64, 0x8000_FFFF);
    assert_eq!(r.read_vram_block(0, 0, 64, 64).unwrap(), vec![0x83FF; 64 * 64]);

    // Retrying the very settings that failed works too.
    r.device_mut().set_pipeline_budget(Some(0));
    assert!(r.update_settings(&true_color).is_err());
    r.device_mut().set_pipeline_budget(None);
    r.update_settings(&true_color).unwrap();
    assert!(r.config().true_color);
    assert_eq!(r.read_vram_block(0, 0, 1, 1).unwrap(), vec![0x83FF]);
    assert_eq!(r.read_vram_block(100, 100, 1, 1).unwrap(), vec![green]);
    r.update_display();
    assert!(r.display_output().is_some());
}

#[test]
fn test_creation_failure_reports_error() {
    let mut device = ReferenceDevice::new();
    device.set_pipeline_budget(Some(3));
    let err = HardwareRenderer::new(device, &Settings::default()).err();
    assert!(matches!(err, Some(GpuError::PipelineCreation(_))), "{:?}", err);
}

#[test]
fn test_save_and_load_vram_surface() {
    let mut r = reference_renderer(&settings_with_scale(2));
    r.fill_vram(0, 0, 16, 16, 0x8000_00FF);
    let before = read_all(&mut r);

    let desc = r.vram_surface_desc().unwrap();
    let saved = r.device_mut().create_texture(&desc).unwrap();
    r.save_vram_surface(saved).unwrap();

    r.fill_vram(0, 0, 64, 64, 0x0000_FF00);
    r.load_vram_surface(saved).unwrap();
    assert!(read_all(&mut r) == before);
    assert_eq!(r.vram_dirty_rect(), Rect::vram());

    // The loaded mask bits are back in the depth buffer.
    r.set_mask_settings(false, true);
    r.draw_polygon(&flat_triangle([(0, 0), (8, 0), (0, 8)], WHITE));
    assert_eq!(r.read_vram_block(1, 1, 1, 1).unwrap(), vec![rgba8888_to_rgba5551(0x8000_00FF)]);

    let small = r
        .device_mut()
        .create_texture(&TextureDesc::new(16, 16, TextureKind::RenderTarget, TextureFormat::Rgba8))
        .unwrap();
    let err = r.load_vram_surface(small).unwrap_err();
    assert!(matches!(err, GpuError::SurfaceMismatch { expected_width: 2048, width: 16, .. }));
}

#[test]
fn test_vram_snapshot_round_trip() {
    let mut r = reference_renderer(&Settings::default());
    r.fill_vram(100, 100, 20, 20, 0x0080_4020);
    r.draw_polygon(&flat_triangle([(0, 0), (30, 0), (0, 30)], 0x00FFFF));
    let snapshot = r.vram_snapshot().unwrap();

    r.reset(true);
    assert!(read_all(&mut r).iter().all(|&p| p == 0));

    r.load_vram_snapshot(&snapshot).unwrap();
    assert_eq!(read_all(&mut r), snapshot.pixels);
}

fn uniform_display_color(r: &mut HardwareRenderer<ReferenceDevice>, color: u32) -> (u32, u32) {
    r.fill_vram(0, 0, 320, 240, color);
    r.update_display();
    let (width, height, pixels) = r.read_display_pixels().unwrap();
    let expected = rgba5551_to_rgba8888(rgba8888_to_rgba5551(color)) & WHITE;
    assert!(pixels.iter().all(|&p| p & WHITE == expected), "{:08X}", pixels[0]);
    (width, height)
}

#[test]
fn test_display_direct_and_disabled() {
    let mut r = reference_renderer(&settings_with_scale(2));
    assert_eq!(uniform_display_color(&mut r, 0x0040_8010), (640, 480));
    let out = r.display_output().unwrap();
    assert_eq!((out.x, out.y), (0, 0));

    r.set_display_config(DisplayConfig {
        enabled: false,
        ..DisplayConfig::default()
    })
    .unwrap();
    r.update_display();
    assert!(r.display_output().is_none());
}

#[test]
fn test_display_24bit_is_native_size() {
    let mut r = reference_renderer(&settings_with_scale(2));
    r.set_display_config(DisplayConfig {
        depth_24bit: true,
        ..DisplayConfig::default()
    })
    .unwrap();
    // Bytes 0x11 0x22 0x33 0x44 0x55 0x66 form two 24-bit pixels.
    r.update_vram(0, 0, 3, 1, &[0x2211, 0x4433, 0x6655], false, false).unwrap();
    r.update_display();
    let (width, height, pixels) = r.read_display_pixels().unwrap();
    assert_eq!((width, height), (320, 240));
    assert_eq!(pixels[0] & WHITE, 0x33_22_11);
    assert_eq!(pixels[1] & WHITE, 0x66_55_44);
}

#[test]
fn test_display_interlaced_uses_display_texture() {
    let mut r = reference_renderer(&Settings::default());
    r.set_display_config(DisplayConfig {
        interlace: InterlacedRenderMode::InterleavedFields,
        field: 1,
        vram_height: 480,
        height: 480,
        ..DisplayConfig::default()
    })
    .unwrap();
    r.fill_vram(0, 0, 320, 480, 0x0000_00FF);
    r.update_display();
    let (_, height, pixels) = r.read_display_pixels().unwrap();
    assert_eq!(height, 480);
    let red = rgba5551_to_rgba8888(rgba8888_to_rgba5551(0xFF)) & WHITE;
    // Only the odd field was scanned out.
    assert_eq!(pixels[320] & WHITE, red);
    assert_eq!(pixels[0] & WHITE, 0);
}

#[test]
fn test_box_downsample_halves_output() {
    let settings = Settings {
        resolution_scale: 2,
        downsample_mode: DownsampleMode::Box,
        downsample_scale: 1,
        ..Settings::default()
    };
    let mut r = reference_renderer(&settings);
    assert_eq!(uniform_display_color(&mut r, 0x0010_2040), (320, 240));
}

#[test]
fn test_adaptive_downsample_keeps_flat_areas() {
    let settings = Settings {
        resolution_scale: 4,
        downsample_mode: DownsampleMode::Adaptive,
        ..Settings::default()
    };
    let mut r = reference_renderer(&settings);
    assert_eq!(uniform_display_color(&mut r, 0x0060_3090), (1280, 960));
}

#[test]
fn test_show_vram_outputs_whole_surface() {
    let settings = Settings {
        resolution_scale: 2,
        multisamples: 2,
        show_vram: true,
        ..Settings::default()
    };
    let mut r = reference_renderer(&settings);
    r.update_display();
    let out = r.display_output().unwrap();
    assert_eq!((out.width, out.height), (2048, 1024));
}

#[test]
fn test_automatic_scale_follows_display_height() {
    let mut device = ReferenceDevice::new();
    device.set_window_height(960);
    let settings = Settings {
        resolution_scale: 0,
        ..Settings::default()
    };
    let mut r = HardwareRenderer::new(device, &settings).unwrap();
    assert_eq!(r.resolution_scale(), 4);

    r.set_display_config(DisplayConfig {
        height: 480,
        ..DisplayConfig::default()
    })
    .unwrap();
    assert_eq!(r.resolution_scale(), 2);
}

#[test]
fn test_texture_window_and_palette_modes() {
    let mut r = reference_renderer(&Settings::default());
    // CLUT entry 1 is white, entry 0 stays transparent black.
    r.update_vram(0, 500, 2, 1, &[0, 0x7FFF], false, false).unwrap();
    // 4-bit texels, all index 1.
    r.update_vram(576, 256, 4, 4, &[0x1111; 16], false, false).unwrap();
    r.set_texture_page(PAGE_4BIT);
    r.set_palette(CLUT);
    r.set_texture_window(TextureWindow::from_bits(0));
    r.draw_rectangle(&sprite(0, 0, 16, 4, 0, 0));
    assert_eq!(r.read_vram_block(0, 0, 16, 4).unwrap(), vec![0x7FFF; 64]);

    // Rewriting the palette must be seen by the next sprite.
    r.update_vram(0, 500, 2, 1, &[0, 0x001F], false, false).unwrap();
    r.draw_rectangle(&sprite(0, 10, 16, 4, 0, 0));
    assert_eq!(r.read_vram_block(0, 10, 16, 4).unwrap(), vec![0x001F; 64]);
    assert_eq!(r.device().stats().stale_samples, 0);
}

#[test]
fn test_filtered_texture_clamps_uvs() {
    let settings = Settings {
        texture_filter: TextureFilter::Bilinear,
        ..Settings::default()
    };
    let r = reference_renderer(&settings);
    assert!(r.config().clamp_uvs);
}
