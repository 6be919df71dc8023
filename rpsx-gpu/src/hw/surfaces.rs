// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! VRAM surfaces on the device and the render state that points at them.

use rpsx_common::settings::DownsampleMode;
use rpsx_common::{GpuError, GpuResult, Rect, VRAM_HEIGHT, VRAM_WIDTH};

use super::HardwareRenderer;
use crate::backend::{GpuDevice, SamplerKind, TextureDesc, TextureFormat, TextureHandle, TextureKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DownsampleSurfaces {
    None,
    Box {
        render: TextureHandle,
    },
    Adaptive {
        /// Mip chain of the scaled display area.
        mip: TextureHandle,
        render: TextureHandle,
        /// Edge weights at the coarsest level.
        weight: TextureHandle,
        levels: u32,
    },
}

/// Device textures backing VRAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Surfaces {
    /// Scaled render target.
    pub vram: TextureHandle,
    /// Mask bit (or precise depth) of every render-target pixel.
    pub depth: TextureHandle,
    /// Single-sampled copy of `vram` that draws sample from.
    pub read: TextureHandle,
    /// Native-size target for packed 16-bit readback, two pixels per texel.
    pub readback: TextureHandle,
    pub downsample: DownsampleSurfaces,
}

impl Surfaces {
    fn handles(&self) -> Vec<TextureHandle> {
        let mut out = vec![self.vram, self.depth, self.read, self.readback];
        match self.downsample {
            DownsampleSurfaces::None => {}
            DownsampleSurfaces::Box { render } => out.push(render),
            DownsampleSurfaces::Adaptive { mip, render, weight, .. } => out.extend([mip, render, weight]),
        }
        out
    }
}

/// Mip levels needed to take a scaled surface back down to native width.
pub(crate) fn adaptive_mip_levels(resolution_scale: u32) -> u32 {
    let mut levels = 0;
    let mut width = VRAM_WIDTH * resolution_scale;
    while width >= VRAM_WIDTH {
        levels += 1;
        width /= 2;
    }
    levels
}

/// Creates textures, releasing all of them if any one fails.
struct SurfaceBuilder<'a, D: GpuDevice> {
    device: &'a mut D,
    created: Vec<TextureHandle>,
}

impl<'a, D: GpuDevice> SurfaceBuilder<'a, D> {
    fn texture(&mut self, what: &'static str, desc: TextureDesc) -> GpuResult<TextureHandle> {
        let Some(texture) = self.device.create_texture(&desc) else {
            for t in self.created.drain(..) {
                self.device.destroy_texture(t);
            }
            return Err(GpuError::TextureCreation {
                what,
                width: desc.width,
                height: desc.height,
            });
        };
        self.created.push(texture);
        Ok(texture)
    }
}

impl<D: GpuDevice> HardwareRenderer<D> {
    /// Allocate every VRAM surface for the current configuration.
    pub(super) fn create_buffers(&mut self) -> GpuResult<()> {
        self.destroy_buffers();

        let scale = self.config.resolution_scale;
        let width = VRAM_WIDTH * scale;
        let height = VRAM_HEIGHT * scale;
        let samples = self.config.multisamples;

        let mut b = SurfaceBuilder {
            device: &mut self.device,
            created: Vec::new(),
        };
        let vram = b.texture(
            "VRAM",
            TextureDesc::new(width, height, TextureKind::RenderTarget, TextureFormat::Rgba8).with_samples(samples),
        )?;
        let depth = b.texture(
            "VRAM depth",
            TextureDesc::new(width, height, TextureKind::DepthStencil, TextureFormat::D16).with_samples(samples),
        )?;
        let read = b.texture(
            "VRAM read",
            TextureDesc::new(width, height, TextureKind::Texture, TextureFormat::Rgba8),
        )?;
        let readback = b.texture(
            "VRAM readback",
            TextureDesc::new(VRAM_WIDTH / 2, VRAM_HEIGHT, TextureKind::RenderTarget, TextureFormat::Rgba8),
        )?;

        let downsample = match self.config.downsample_mode {
            DownsampleMode::Adaptive => {
                let levels = adaptive_mip_levels(scale);
                let mip = b.texture(
                    "downsample",
                    TextureDesc::new(width, height, TextureKind::Texture, TextureFormat::Rgba8).with_levels(levels),
                )?;
                let render = b.texture(
                    "downsample render",
                    TextureDesc::new(width, height, TextureKind::RenderTarget, TextureFormat::Rgba8),
                )?;
                let shift = levels.saturating_sub(1);
                let weight = b.texture(
                    "downsample weight",
                    TextureDesc::new(width >> shift, height >> shift, TextureKind::RenderTarget, TextureFormat::R8),
                )?;
                DownsampleSurfaces::Adaptive {
                    mip,
                    render,
                    weight,
                    levels,
                }
            }
            DownsampleMode::Box => {
                let box_scale = self.config.box_downsample_scale;
                let render = b.texture(
                    "box downsample",
                    TextureDesc::new(
                        VRAM_WIDTH * box_scale,
                        VRAM_HEIGHT * box_scale,
                        TextureKind::RenderTarget,
                        TextureFormat::Rgba8,
                    ),
                )?;
                DownsampleSurfaces::Box { render }
            }
            DownsampleMode::Disabled => DownsampleSurfaces::None,
        };

        log::info!("HwRenderer: created framebuffer of {}x{}", width, height);

        self.surfaces = Some(Surfaces {
            vram,
            depth,
            read,
            readback,
            downsample,
        });
        self.device.set_render_target(Some(vram), Some(depth));
        self.device
            .clear_depth(depth, if self.config.pgxp_depth_buffer { 1.0 } else { 0.0 });
        self.set_full_vram_dirty_rect();
        Ok(())
    }

    pub(super) fn destroy_buffers(&mut self) {
        self.display_output = None;
        if let Some(texture) = self.display_texture.take() {
            self.device.destroy_texture(texture);
        }
        if let Some(surfaces) = self.surfaces.take() {
            self.device.set_render_target(None, None);
            self.device.set_texture(0, None, SamplerKind::Nearest);
            self.device.set_texture(1, None, SamplerKind::Nearest);
            for texture in surfaces.handles() {
                self.device.destroy_texture(texture);
            }
        }
    }

    /// Clear VRAM, its depth and the display.
    pub fn clear_framebuffer(&mut self) {
        let Some(s) = self.surfaces else {
            return;
        };
        self.device.clear_render_target(s.vram, 0);
        self.device
            .clear_depth(s.depth, if self.config.pgxp_depth_buffer { 1.0 } else { 0.0 });
        // The read copy still holds the old contents.
        self.set_full_vram_dirty_rect();
        if let Some(texture) = self.display_texture {
            self.device.clear_render_target(texture, 0);
        }
        self.last_depth_z = 1.0;
    }

    /// Rebind VRAM state on the device, e.g. after another user of the
    /// device changed it.
    pub fn restore_device_context(&mut self) {
        let Some(s) = self.surfaces else {
            return;
        };
        let rect = self.scaled_vram_rect();
        self.device.set_texture(0, Some(s.read), SamplerKind::Nearest);
        self.device.set_render_target(Some(s.vram), Some(s.depth));
        self.device.set_viewport(0, 0, rect.width(), rect.height());
        self.set_scissor();
        self.batch.uniforms_dirty = true;
    }

    /// Clip batch draws to the drawing area.
    pub(super) fn set_scissor(&mut self) {
        let scale = self.config.resolution_scale;
        let area = self.regs.drawing_area;
        let left = area.left * scale;
        let top = area.top * scale;
        let right = ((area.right + 1) * scale).max(left + 1);
        let bottom = ((area.bottom + 1) * scale).max(top + 1);
        self.device.set_scissor(left, top, right - left, bottom - top);
    }

    /// Invalidate the whole read copy.
    pub fn set_full_vram_dirty_rect(&mut self) {
        self.vram_dirty_rect = Rect::vram();
        self.regs.draw_mode.set_texture_page_changed();
    }

    /// Dimensions and sample count of the VRAM render target.
    pub fn vram_surface_desc(&self) -> Option<TextureDesc> {
        self.surfaces.and_then(|s| self.device.texture_desc(s.vram))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adaptive_mip_levels() {
        assert_eq!(adaptive_mip_levels(1), 1);
        assert_eq!(adaptive_mip_levels(2), 2);
        assert_eq!(adaptive_mip_levels(4), 3);
        assert_eq!(adaptive_mip_levels(8), 4);
    }
}
