// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Save-state hooks.

use rpsx_common::{GpuError, GpuResult, VRAM_HEIGHT, VRAM_PIXEL_COUNT, VRAM_WIDTH};

use super::HardwareRenderer;
use crate::backend::{GpuDevice, TextureDesc, TextureHandle};
use crate::vram::VramSnapshot;

impl<D: GpuDevice> HardwareRenderer<D> {
    /// Check that `texture` can hold the VRAM render target as-is.
    fn check_state_surface(&self, texture: TextureHandle) -> GpuResult<TextureDesc> {
        let (Some(vram), Some(other)) = (self.vram_surface_desc(), self.device.texture_desc(texture)) else {
            return Err(GpuError::NoSurfaces);
        };
        if vram.width != other.width || vram.height != other.height || vram.samples != other.samples {
            log::error!(
                "HwRenderer: save state surface is {}x{}x{}, VRAM is {}x{}x{}",
                other.width,
                other.height,
                other.samples,
                vram.width,
                vram.height,
                vram.samples
            );
            return Err(GpuError::SurfaceMismatch {
                expected_width: vram.width,
                expected_height: vram.height,
                expected_samples: vram.samples,
                width: other.width,
                height: other.height,
                samples: other.samples,
            });
        }
        Ok(vram)
    }

    /// Copy the VRAM render target into a caller-owned texture of the same
    /// size and sample count.
    pub fn save_vram_surface(&mut self, dst: TextureHandle) -> GpuResult<()> {
        self.flush_render();
        let desc = self.check_state_surface(dst)?;
        let Some(s) = self.surfaces else {
            return Err(GpuError::NoSurfaces);
        };
        self.device
            .copy_texture_region(dst, 0, 0, 0, s.vram, 0, 0, 0, desc.width, desc.height);
        Ok(())
    }

    /// Replace the VRAM render target with a surface saved earlier. The read
    /// copy and the depth buffer are both stale afterwards.
    pub fn load_vram_surface(&mut self, src: TextureHandle) -> GpuResult<()> {
        self.flush_render();
        let desc = self.check_state_surface(src)?;
        let Some(s) = self.surfaces else {
            return Err(GpuError::NoSurfaces);
        };
        self.device
            .copy_texture_region(s.vram, 0, 0, 0, src, 0, 0, 0, desc.width, desc.height);
        self.after_state_load();
        Ok(())
    }

    /// Read all of VRAM back and return it at native resolution.
    pub fn vram_snapshot(&mut self) -> GpuResult<VramSnapshot> {
        self.read_vram(0, 0, VRAM_WIDTH, VRAM_HEIGHT)?;
        Ok(self.vram_shadow.snapshot())
    }

    /// Upload native VRAM contents, e.g. from a save state.
    pub fn load_vram_snapshot(&mut self, snapshot: &VramSnapshot) -> GpuResult<()> {
        if snapshot.pixels.len() != VRAM_PIXEL_COUNT {
            return Err(GpuError::InvalidSnapshot(format!(
                "{} pixels, expected {}",
                snapshot.pixels.len(),
                VRAM_PIXEL_COUNT
            )));
        }
        self.update_vram(0, 0, VRAM_WIDTH, VRAM_HEIGHT, &snapshot.pixels, false, false)?;
        self.vram_shadow
            .write_block(0, 0, VRAM_WIDTH, VRAM_HEIGHT, &snapshot.pixels);
        self.after_state_load();
        Ok(())
    }

    fn after_state_load(&mut self) {
        self.set_full_vram_dirty_rect();
        self.current_depth = 1;
        if self.config.pgxp_depth_buffer {
            self.clear_depth_buffer();
        } else {
            self.update_depth_buffer_from_mask_bit();
        }
        self.restore_device_context();
    }
}
