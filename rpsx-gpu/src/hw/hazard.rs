// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Texture hazard detection.
//!
//! Draws sample the read copy of VRAM, not the render target. Anything
//! written since the last sync is covered by the dirty rectangle; before a
//! primitive samples texels inside it, the batch is flushed and the read
//! copy refreshed.

use rpsx_common::{Rect, TEXTURE_PAGE_HEIGHT, TEXTURE_PAGE_WIDTH, VRAM_HEIGHT, VRAM_WIDTH};

use super::HardwareRenderer;
use crate::backend::{DeviceFeatures, GpuDevice};
use crate::draw_mode::{TexturePage, TextureWindow};
use crate::types::{pack_uv_limits, BatchVertex};

/// Range of texels one axis of a window can reach from `[min, max]`.
///
/// An identity window maps coordinates straight through. Any other window
/// folds coordinates, so the whole reachable span is returned.
fn windowed_span(min: u32, max: u32, and: u32, or: u32) -> (u32, u32) {
    if and == 0xFF && or == 0 {
        (min, max)
    } else {
        (or, (0xFF & and) | or)
    }
}

/// VRAM pixels a primitive may read for texture coordinates in
/// `[min_u, max_u] x [min_v, max_v]`, right and bottom exclusive.
pub(crate) fn texel_footprint(
    page: TexturePage,
    window: &TextureWindow,
    min_u: u32,
    min_v: u32,
    max_u: u32,
    max_v: u32,
) -> Rect {
    let [and_x, and_y] = window.and_mask();
    let [or_x, or_y] = window.or_mask();

    // Coordinates past the page wrap, which can reach any texel of it.
    let (min_u, max_u) = if max_u >= TEXTURE_PAGE_WIDTH {
        (0, TEXTURE_PAGE_WIDTH - 1)
    } else {
        (min_u, max_u)
    };
    let (min_v, max_v) = if max_v >= TEXTURE_PAGE_HEIGHT {
        (0, TEXTURE_PAGE_HEIGHT - 1)
    } else {
        (min_v, max_v)
    };

    let (min_u, max_u) = windowed_span(min_u, max_u, and_x, or_x);
    let (min_v, max_v) = windowed_span(min_v, max_v, and_y, or_y);

    let shift = page.color_mode().texel_shift();
    let add = (1 << shift) - 1;
    let mut rect = Rect::new(
        (min_u >> shift) + page.base_x(),
        min_v + page.base_y(),
        ((max_u + add) >> shift) + page.base_x() + 1,
        max_v + page.base_y() + 1,
    );
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

impl<D: GpuDevice> HardwareRenderer<D> {
    /// Record a write to VRAM. If it touches the current texture page or
    /// palette, the page is re-examined before the next textured draw.
    pub(super) fn include_vram_dirty_rect(&mut self, rect: Rect) {
        self.vram_dirty_rect.include(&rect);

        let mode = &mut self.regs.draw_mode;
        if !mode.is_texture_page_changed()
            && (mode.texture_page_rect().intersects(&rect)
                || (mode.is_using_palette() && mode.palette_rect().intersects(&rect)))
        {
            mode.set_texture_page_changed();
        }
    }

    /// Called before the first textured draw after a texture page, palette
    /// or overlapping VRAM change.
    pub(super) fn on_texture_page_changed(&mut self) {
        let dirty = self.vram_dirty_rect;
        if !dirty.is_valid() {
            self.compute_uv_range = self.config.clamp_uvs;
            self.texpage_dirty = false;
            return;
        }

        let mode = &self.regs.draw_mode;
        let page_rect = mode.texture_page_rect();
        if mode.is_using_palette() && mode.palette_rect().intersects(&dirty) {
            // Every texel goes through the palette, so the UV range can't
            // narrow the hazard down.
            log::trace!("HwRenderer: palette is in dirty area, updating read texture");
            if !self.batch.is_empty() {
                self.flush_render();
            }
            self.update_vram_read_texture();
        }

        if self.vram_dirty_rect.is_valid() && page_rect.intersects(&self.vram_dirty_rect) {
            log::trace!("HwRenderer: texture page is in dirty area, tracking UV ranges");
            self.compute_uv_range = true;
            self.texpage_dirty = true;
            self.current_uv_range = Rect::INVALID;
        } else {
            self.compute_uv_range = self.config.clamp_uvs;
            self.texpage_dirty = false;
        }
    }

    /// Grow the UV range sampled from the dirty texture page, syncing the
    /// read copy if it now reaches dirty texels.
    pub(super) fn check_for_texpage_overlap(&mut self, page: TexturePage, min_u: u32, min_v: u32, max_u: u32, max_v: u32) {
        if !self.texpage_dirty {
            return;
        }

        let window = self.regs.draw_mode.texture_window;
        let footprint = texel_footprint(page, &window, min_u, min_v, max_u, max_v);
        if self.current_uv_range.contains(&footprint) {
            return;
        }

        self.current_uv_range.include(&footprint);
        if self.current_uv_range.intersects(&self.vram_dirty_rect) {
            log::trace!(
                "HwRenderer: UV range {:?} intersects dirty {:?}, updating read texture",
                self.current_uv_range,
                self.vram_dirty_rect
            );
            if !self.batch.is_empty() {
                self.flush_render();
                self.ensure_vertex_space_for_current_command();
            }
            self.update_vram_read_texture();
        }
    }

    /// Copy (or resolve) the dirty area of the render target into the read
    /// copy and clear the dirty rectangle.
    pub(super) fn update_vram_read_texture(&mut self) {
        self.texpage_dirty = false;

        let Some(s) = self.surfaces else {
            return;
        };
        if !self.vram_dirty_rect.is_valid() {
            return;
        }

        let rect = self.vram_dirty_rect.scaled(self.config.resolution_scale);
        if self.is_using_multisampling() {
            if self.device.features().contains(DeviceFeatures::PARTIAL_MSAA_RESOLVE) {
                self.device.resolve_texture_region(
                    s.read,
                    rect.left,
                    rect.top,
                    s.vram,
                    rect.left,
                    rect.top,
                    rect.width(),
                    rect.height(),
                );
            } else {
                let full = self.scaled_vram_rect();
                self.device
                    .resolve_texture_region(s.read, 0, 0, s.vram, 0, 0, full.width(), full.height());
            }
        } else {
            self.device.copy_texture_region(
                s.read,
                rect.left,
                rect.top,
                0,
                s.vram,
                rect.left,
                rect.top,
                0,
                rect.width(),
                rect.height(),
            );
        }

        self.stats.num_vram_read_texture_updates += 1;
        self.vram_dirty_rect = Rect::INVALID;
    }

    /// Clamp limits of a textured polygon, checked against the dirty area.
    pub(super) fn compute_polygon_uv_limits(&mut self, page: TexturePage, vertices: &mut [BatchVertex]) {
        let Some(first) = vertices.first() else {
            return;
        };
        let (mut min_u, mut max_u) = (first.u as u32, first.u as u32);
        let (mut min_v, mut max_v) = (first.v as u32, first.v as u32);
        for v in &vertices[1..] {
            min_u = min_u.min(v.u as u32);
            max_u = max_u.max(v.u as u32);
            min_v = min_v.min(v.v as u32);
            max_v = max_v.max(v.v as u32);
        }

        // The far edge is exclusive.
        if min_u != max_u {
            max_u -= 1;
        }
        if min_v != max_v {
            max_v -= 1;
        }

        self.check_for_texpage_overlap(page, min_u, min_v, max_u, max_v);

        let limits = pack_uv_limits(min_u & 0xFF, min_v & 0xFF, max_u.min(0xFF), max_v.min(0xFF));
        for v in vertices.iter_mut() {
            v.uv_limits = limits;
        }
    }
}
