// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! VRAM transfers: fills, CPU uploads, VRAM-to-VRAM copies and readback.
//!
//! Each transfer flushes the open batch first so it lands after every
//! primitive submitted before it, then draws a full-screen utility program
//! clipped to the destination.

use rpsx_common::{
    rgba5551_to_rgba8888, rgba8888_to_rgba5551, vram_transfer_bounds, GpuError, GpuResult, VRAM_HEIGHT,
    VRAM_WIDTH,
};

use super::HardwareRenderer;
use crate::backend::{DeviceFeatures, GpuDevice, PushConstants, SamplerKind};

/// Whether a `width` x `height` block at `(x, y)` runs off either VRAM edge.
fn wraps(x: u32, y: u32, width: u32, height: u32) -> bool {
    (x % VRAM_WIDTH) + width > VRAM_WIDTH || (y % VRAM_HEIGHT) + height > VRAM_HEIGHT
}

impl<D: GpuDevice> HardwareRenderer<D> {
    /// Fill a rectangle with a packed RGBA8 color. Fills ignore the mask
    /// settings and the drawing area.
    pub fn fill_vram(&mut self, x: u32, y: u32, width: u32, height: u32, color: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.flush_render();
        let (Some(_), Some(pipelines)) = (self.surfaces, self.pipelines.as_ref()) else {
            return;
        };
        log::trace!("HwRenderer: fill {}x{} at {},{} with {:08X}", width, height, x, y, color);

        let wrapped = wraps(x, y, width, height);
        let interlaced = self.regs.interlaced_rendering;
        let pipeline = pipelines.vram_fill[wrapped as usize][interlaced as usize];

        let bounds = vram_transfer_bounds(x, y, width, height);
        self.include_vram_dirty_rect(bounds);

        let scale = self.config.resolution_scale;
        let scaled = bounds.scaled(scale);
        self.device.set_pipeline(pipeline);
        self.device
            .set_viewport_and_scissor(scaled.left, scaled.top, scaled.width(), scaled.height());

        // Drop precision unless rendering in true color.
        let color = if self.config.true_color {
            color
        } else {
            rgba5551_to_rgba8888(rgba8888_to_rgba5551(color))
        };
        self.device.push_constants(&PushConstants::VramFill {
            dst_x: (x % VRAM_WIDTH) * scale,
            dst_y: (y % VRAM_HEIGHT) * scale,
            end_x: ((x + width) % VRAM_WIDTH) * scale,
            end_y: ((y + height) % VRAM_HEIGHT) * scale,
            color,
            interlaced_displayed_field: self.regs.active_line_lsb,
        });
        self.device.draw(3, 0);

        self.restore_device_context();
    }

    /// Bring the CPU shadow up to date for a (possibly wrapping) area.
    pub fn read_vram(&mut self, x: u32, y: u32, width: u32, height: u32) -> GpuResult<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.flush_render();
        let (Some(s), Some(pipeline)) = (self.surfaces, self.pipelines.as_ref().map(|p| p.vram_readback)) else {
            return Ok(());
        };

        let bounds = vram_transfer_bounds(x, y, width, height);
        let encoded_width = bounds.width().div_ceil(2);
        let encoded_height = bounds.height();

        // Pack two 16-bit pixels into each texel of the readback target.
        self.device.set_render_target(Some(s.readback), None);
        self.device.set_pipeline(pipeline);
        self.device.set_texture(0, Some(s.vram), SamplerKind::Nearest);
        self.device
            .set_viewport_and_scissor(0, 0, encoded_width, encoded_height);
        self.device.push_constants(&PushConstants::VramReadback {
            left: bounds.left,
            top: bounds.top,
            width: bounds.width(),
            height: bounds.height(),
        });
        self.device.draw(3, 0);

        let mut packed = vec![0u32; (encoded_width * encoded_height) as usize];
        let ok = self
            .device
            .download_texture(s.readback, 0, 0, encoded_width, encoded_height, &mut packed);
        self.restore_device_context();
        if !ok {
            log::error!("HwRenderer: failed to download VRAM area {:?}", bounds);
            return Err(GpuError::Readback {
                x: bounds.left,
                y: bounds.top,
                width: bounds.width(),
                height: bounds.height(),
            });
        }

        let mut pixels = Vec::with_capacity((bounds.width() * bounds.height()) as usize);
        for row in packed.chunks_exact(encoded_width as usize) {
            let unpacked = row
                .iter()
                .flat_map(|&texel| [texel as u16, (texel >> 16) as u16])
                .take(bounds.width() as usize);
            pixels.extend(unpacked);
        }
        self.vram_shadow
            .write_block(bounds.left, bounds.top, bounds.width(), bounds.height(), &pixels);
        Ok(())
    }

    /// Read back an area and return its native pixels, row-major.
    pub fn read_vram_block(&mut self, x: u32, y: u32, width: u32, height: u32) -> GpuResult<Vec<u16>> {
        self.read_vram(x, y, width, height)?;
        Ok(self.vram_shadow.read_block(x, y, width, height))
    }

    /// Write CPU-supplied pixels, optionally forcing the mask bit on and
    /// skipping pixels whose mask bit is already set.
    #[allow(clippy::too_many_arguments)]
    pub fn update_vram(
        &mut self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u16],
        set_mask: bool,
        check_mask: bool,
    ) -> GpuResult<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.flush_render();
        let (Some(_), Some(pipelines)) = (self.surfaces, self.pipelines.as_ref()) else {
            return Ok(());
        };
        let use_mask_depth = check_mask && !self.config.pgxp_depth_buffer;
        let pipeline = pipelines.vram_write[use_mask_depth as usize];

        let count = (width * height) as usize;
        let Some(pixels) = data.get(..count) else {
            log::error!(
                "HwRenderer: VRAM write of {}x{} with only {} pixels",
                width,
                height,
                data.len()
            );
            return Err(GpuError::BufferCreation("VRAM upload data too short"));
        };

        let bounds = vram_transfer_bounds(x, y, width, height);
        self.include_vram_dirty_rect(bounds);

        if check_mask {
            // Newer than every masked pixel written so far.
            self.increment_depth();
        }

        let Some(offset) = self.device.upload_texture_buffer(pixels) else {
            log::error!("HwRenderer: failed to upload {} pixels for VRAM write", count);
            return Err(GpuError::BufferCreation("VRAM upload buffer"));
        };

        let scaled = bounds.scaled(self.config.resolution_scale);
        self.device
            .set_scissor(scaled.left, scaled.top, scaled.width(), scaled.height());
        self.device.set_pipeline(pipeline);
        self.device.push_constants(&PushConstants::VramWrite {
            base_x: x % VRAM_WIDTH,
            base_y: y % VRAM_HEIGHT,
            end_x: (x + width) % VRAM_WIDTH,
            end_y: (y + height) % VRAM_HEIGHT,
            width,
            height,
            buffer_base_offset: offset,
            mask_or_bits: if set_mask { 0x8000 } else { 0 },
            depth_value: self.current_normalized_depth(),
        });
        self.device.draw(3, 0);

        self.restore_device_context();
        Ok(())
    }

    /// Copy a block within VRAM, honoring the current mask settings.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_vram(&mut self, src_x: u32, src_y: u32, dst_x: u32, dst_y: u32, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.flush_render();
        let (Some(s), Some(pipelines)) = (self.surfaces, self.pipelines.as_ref()) else {
            return;
        };

        let set_mask = self.regs.set_mask_while_drawing;
        let check_mask = self.regs.check_mask_before_draw;
        let src_bounds = vram_transfer_bounds(src_x, src_y, width, height);
        let dst_bounds = vram_transfer_bounds(dst_x, dst_y, width, height);
        let overlaps = src_bounds.intersects(&dst_bounds);
        let copy_to_self = self.device.features().contains(DeviceFeatures::TEXTURE_COPY_TO_SELF);

        let use_shader = set_mask
            || check_mask
            || wraps(src_x, src_y, width, height)
            || wraps(dst_x, dst_y, width, height)
            || overlaps
            || !copy_to_self
            || self.is_using_multisampling();

        if use_shader {
            let use_mask_depth = check_mask && !self.config.pgxp_depth_buffer;
            let pipeline = pipelines.vram_copy[use_mask_depth as usize];

            // The shader samples the read copy.
            if self.vram_dirty_rect.intersects(&src_bounds) {
                self.update_vram_read_texture();
            }
            self.include_vram_dirty_rect(dst_bounds);

            let scale = self.config.resolution_scale;
            let scaled = dst_bounds.scaled(scale);
            self.device
                .set_viewport_and_scissor(scaled.left, scaled.top, scaled.width(), scaled.height());
            self.device.set_pipeline(pipeline);
            self.device.push_constants(&PushConstants::VramCopy {
                src_x: (src_x % VRAM_WIDTH) * scale,
                src_y: (src_y % VRAM_HEIGHT) * scale,
                dst_x: (dst_x % VRAM_WIDTH) * scale,
                dst_y: (dst_y % VRAM_HEIGHT) * scale,
                end_x: ((dst_x + width) % VRAM_WIDTH) * scale,
                end_y: ((dst_y + height) % VRAM_HEIGHT) * scale,
                width: width * scale,
                height: height * scale,
                set_mask_bit: set_mask,
                depth_value: self.current_normalized_depth(),
            });
            self.device.draw(3, 0);
            self.restore_device_context();

            if use_mask_depth {
                self.increment_depth();
            }
            return;
        }

        // Plain copy within the render target; the mask bit travels in
        // alpha, so carry the matching depth along with it.
        self.include_vram_dirty_rect(dst_bounds);
        let scale = self.config.resolution_scale;
        let src = src_bounds.scaled(scale);
        let dst = dst_bounds.scaled(scale);
        self.device
            .copy_texture_region(s.vram, dst.left, dst.top, 0, s.vram, src.left, src.top, 0, src.width(), src.height());
        if !self.config.pgxp_depth_buffer {
            self.device.copy_texture_region(
                s.depth,
                dst.left,
                dst.top,
                0,
                s.depth,
                src.left,
                src.top,
                0,
                src.width(),
                src.height(),
            );
        }
    }
}
