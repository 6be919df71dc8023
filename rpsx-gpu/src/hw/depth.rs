// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Depth buffer upkeep.
//!
//! Without precise geometry the depth buffer holds the mask bit: every
//! primitive drawn with mask checking gets a fresh, nearer depth value, and
//! the buffer is rebuilt from the VRAM alpha channel whenever the counter
//! runs out. With the geometry depth buffer it holds real depth and is
//! cleared when a frame appears to start over.

use rpsx_common::MAX_BATCH_VERTEX_COUNTER_IDS;

use super::HardwareRenderer;
use crate::backend::{GpuDevice, SamplerKind};
use crate::types::BatchVertex;

/// Mean perspective term of a polygon, clamped to the far plane.
fn average_depth(vertices: &[BatchVertex]) -> f32 {
    if vertices.is_empty() {
        return 1.0;
    }
    let sum: f32 = vertices.iter().map(|v| v.w).sum();
    (sum / vertices.len() as f32).min(1.0)
}

impl<D: GpuDevice> HardwareRenderer<D> {
    /// Regenerate the depth buffer from the mask bit of the render target.
    pub(super) fn update_depth_buffer_from_mask_bit(&mut self) {
        if self.config.pgxp_depth_buffer {
            return;
        }
        let (Some(s), Some(pipeline)) = (self.surfaces, self.pipelines.as_ref().map(|p| p.vram_update_depth)) else {
            return;
        };

        let full = self.scaled_vram_rect();
        self.device.set_scissor(0, 0, full.width(), full.height());
        self.device.invalidate_render_target(s.depth);
        self.device.set_render_target(None, Some(s.depth));
        self.device.set_pipeline(pipeline);
        self.device.set_texture(0, Some(s.vram), SamplerKind::Nearest);
        self.device.draw(3, 0);

        self.device.set_texture(0, Some(s.read), SamplerKind::Nearest);
        self.device.set_render_target(Some(s.vram), Some(s.depth));
        self.set_scissor();
    }

    pub(super) fn clear_depth_buffer(&mut self) {
        debug_assert!(self.config.pgxp_depth_buffer);
        if let Some(s) = self.surfaces {
            self.device.clear_depth(s.depth, 1.0);
        }
        self.last_depth_z = 1.0;
    }

    /// Clear the geometry depth buffer when a polygon is much further away
    /// than the previous one, which usually means a new scene started.
    pub(super) fn check_for_depth_clear(&mut self, vertices: &[BatchVertex]) {
        let average_z = average_depth(vertices);
        if average_z - self.last_depth_z >= self.settings.pgxp_depth_clear_threshold {
            if !self.batch.is_empty() {
                self.flush_render();
                self.ensure_vertex_space_for_current_command();
            }
            self.clear_depth_buffer();
        }
        self.last_depth_z = average_z;
    }

    /// Start the depth counter over. In mask mode the depth buffer is then
    /// rebuilt from the mask bit, since old depth values would compare
    /// nearer than new ones.
    pub(super) fn reset_batch_vertex_depth(&mut self) {
        if self.config.pgxp_depth_buffer {
            self.current_depth = 1;
            return;
        }

        log::debug!(
            "HwRenderer: depth counter reached {}, rebuilding depth buffer",
            self.current_depth
        );
        self.flush_render();
        self.update_depth_buffer_from_mask_bit();
        self.current_depth = 1;
        self.stats.num_depth_buffer_rebuilds += 1;
    }

    /// Advance the counter for a masked draw or transfer.
    pub(super) fn increment_depth(&mut self) {
        self.current_depth += 1;
        if self.current_depth >= MAX_BATCH_VERTEX_COUNTER_IDS {
            self.reset_batch_vertex_depth();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_depth_clamped() {
        let mut v = [BatchVertex::default(); 3];
        v[0].w = 0.5;
        v[1].w = 1.0;
        v[2].w = 0.0;
        assert_eq!(average_depth(&v), 0.5);
        for x in v.iter_mut() {
            x.w = 3.0;
        }
        assert_eq!(average_depth(&v), 1.0);
        assert_eq!(average_depth(&[]), 1.0);
    }
}
