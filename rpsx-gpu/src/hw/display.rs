// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Display scanout.
//!
//! The visible area of VRAM is either shown straight from the render
//! target, or reinterpreted by a display pass (24-bit color, interlaced
//! fields, unaligned crop) into a separate display texture. Either result
//! can then be downsampled back toward native resolution.

use rpsx_common::{GpuResult, VRAM_HEIGHT, VRAM_WIDTH};

use super::surfaces::DownsampleSurfaces;
use super::HardwareRenderer;
use super::pipelines::DownsamplePipelines;
use crate::backend::{
    GpuDevice, PipelineHandle, PushConstants, SamplerKind, TextureDesc, TextureFormat, TextureHandle, TextureKind,
};
use crate::types::InterlacedRenderMode;

/// What the video timing says is on screen, in native VRAM pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayConfig {
    pub enabled: bool,
    /// First visible VRAM column and row.
    pub vram_left: u32,
    pub vram_top: u32,
    pub vram_width: u32,
    pub vram_height: u32,
    /// Column scanout starts from; `vram_left - x_start` is cropped.
    pub x_start: u32,
    pub depth_24bit: bool,
    pub interlace: InterlacedRenderMode,
    /// Field being displayed when interlaced.
    pub field: u32,
    /// Output height, used to pick an automatic resolution scale.
    pub height: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            vram_left: 0,
            vram_top: 0,
            vram_width: 320,
            vram_height: 240,
            x_start: 0,
            depth_24bit: false,
            interlace: InterlacedRenderMode::None,
            field: 0,
            height: 240,
        }
    }
}

/// The region of a device texture that should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOutput {
    pub texture: TextureHandle,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl<D: GpuDevice> HardwareRenderer<D> {
    /// Change the display area. An automatic resolution scale follows the
    /// display height.
    pub fn set_display_config(&mut self, config: DisplayConfig) -> GpuResult<()> {
        let height_changed = config.height != self.display_config.height;
        self.display_config = config;
        if height_changed && self.settings.resolution_scale == 0 {
            self.update_resolution_scale()?;
        }
        Ok(())
    }

    pub fn display_config(&self) -> &DisplayConfig {
        &self.display_config
    }

    /// Texture region produced by the last [`update_display`](Self::update_display),
    /// or `None` when the display is blanked.
    pub fn display_output(&self) -> Option<DisplayOutput> {
        self.display_output
    }

    fn is_using_downsampling(&self) -> bool {
        self.surfaces
            .is_some_and(|s| s.downsample != DownsampleSurfaces::None)
    }

    /// Produce the presentable image for the current display area.
    pub fn update_display(&mut self) {
        self.flush_render();
        let (Some(s), Some(pipelines)) = (self.surfaces, self.pipelines.as_ref()) else {
            self.display_output = None;
            return;
        };
        let cfg = self.display_config;
        let scale = self.config.resolution_scale;

        if self.settings.show_vram {
            let full = self.scaled_vram_rect();
            let texture = if self.is_using_multisampling() {
                self.update_vram_read_texture();
                s.read
            } else {
                s.vram
            };
            self.display_output = Some(DisplayOutput {
                texture,
                x: 0,
                y: 0,
                width: full.width(),
                height: full.height(),
            });
            return;
        }

        if !cfg.enabled || cfg.vram_width == 0 || cfg.vram_height == 0 {
            self.display_output = None;
            return;
        }

        let left = cfg.vram_left * scale;
        let top = cfg.vram_top * scale;
        let width = cfg.vram_width * scale;
        let height = cfg.vram_height * scale;

        let fits = cfg.vram_left + cfg.vram_width <= VRAM_WIDTH && cfg.vram_top + cfg.vram_height <= VRAM_HEIGHT;
        if !cfg.depth_24bit && cfg.interlace == InterlacedRenderMode::None && !self.is_using_multisampling() && fits {
            if self.is_using_downsampling() {
                self.downsample_framebuffer(s.vram, left, top, width, height);
            } else {
                self.display_output = Some(DisplayOutput {
                    texture: s.vram,
                    x: left,
                    y: top,
                    width,
                    height,
                });
            }
            return;
        }

        // 24-bit pixels are reinterpreted at native resolution.
        let (out_width, out_height) = if cfg.depth_24bit {
            (cfg.vram_width, cfg.vram_height)
        } else {
            (width, height)
        };
        let pipeline = pipelines.display[cfg.depth_24bit as usize][cfg.interlace as usize];

        let Some(texture) = self.ensure_display_texture(out_width, out_height) else {
            self.display_output = None;
            return;
        };
        if cfg.interlace == InterlacedRenderMode::None {
            // Interlaced output keeps the other field from the last frame.
            self.device.invalidate_render_target(texture);
        }

        let (vram_offset_x, vram_offset_y, crop_left) = if cfg.depth_24bit {
            (cfg.x_start, cfg.vram_top, cfg.vram_left.saturating_sub(cfg.x_start))
        } else {
            (
                cfg.x_start * scale,
                top,
                cfg.vram_left.saturating_sub(cfg.x_start) * scale,
            )
        };

        self.device.set_render_target(Some(texture), None);
        self.device.set_pipeline(pipeline);
        self.device.set_texture(0, Some(s.vram), SamplerKind::Nearest);
        self.device.push_constants(&PushConstants::Display {
            vram_offset_x,
            vram_offset_y,
            crop_left,
            field_offset: cfg.field & 1,
        });
        self.device.set_viewport_and_scissor(0, 0, out_width, out_height);
        self.device.draw(3, 0);

        if self.is_using_downsampling() && !cfg.depth_24bit {
            self.downsample_framebuffer(texture, 0, 0, out_width, out_height);
        } else {
            self.display_output = Some(DisplayOutput {
                texture,
                x: 0,
                y: 0,
                width: out_width,
                height: out_height,
            });
        }
        self.restore_device_context();
    }

    /// The display texture at the requested size, recreated if needed.
    fn ensure_display_texture(&mut self, width: u32, height: u32) -> Option<TextureHandle> {
        if let Some(texture) = self.display_texture {
            let same = self
                .device
                .texture_desc(texture)
                .is_some_and(|d| d.width == width && d.height == height);
            if same {
                return Some(texture);
            }
            self.device.destroy_texture(texture);
            self.display_texture = None;
        }

        let desc = TextureDesc::new(width, height, TextureKind::RenderTarget, TextureFormat::Rgba8);
        match self.device.create_texture(&desc) {
            Some(texture) => {
                log::debug!("HwRenderer: created {}x{} display texture", width, height);
                self.display_texture = Some(texture);
                Some(texture)
            }
            None => {
                log::error!("HwRenderer: failed to create {}x{} display texture", width, height);
                None
            }
        }
    }

    fn downsample_framebuffer(&mut self, source: TextureHandle, left: u32, top: u32, width: u32, height: u32) {
        let (Some(s), Some(pipelines)) = (self.surfaces, self.pipelines.as_ref()) else {
            return;
        };
        match (s.downsample, pipelines.downsample) {
            (DownsampleSurfaces::Box { render }, DownsamplePipelines::Box(pipeline)) => {
                self.downsample_box(pipeline, render, source, left, top, width, height)
            }
            (
                DownsampleSurfaces::Adaptive {
                    mip,
                    render,
                    weight,
                    levels,
                },
                DownsamplePipelines::Adaptive {
                    first_pass,
                    mid_pass,
                    blur_pass,
                    composite_pass,
                },
            ) => {
                self.device
                    .copy_texture_region(mip, 0, 0, 0, source, left, top, 0, width, height);
                self.device.set_texture(0, Some(mip), SamplerKind::LinearMipNearest);

                for level in 1..levels {
                    let (lw, lh) = ((width >> level).max(1), (height >> level).max(1));
                    self.device.clear_render_target(render, 0);
                    self.device.set_render_target(Some(render), None);
                    self.device.set_viewport_and_scissor(0, 0, lw, lh);
                    self.device
                        .set_pipeline(if level == 1 { first_pass } else { mid_pass });
                    self.device.push_constants(&PushConstants::Downsample { lod: level - 1 });
                    self.device.draw(3, 0);
                    self.device
                        .copy_texture_region(mip, 0, 0, level, render, 0, 0, 0, lw, lh);
                }

                // Smooth the edge weights of the coarsest level.
                let last = levels.saturating_sub(1);
                let (lw, lh) = ((width >> last).max(1), (height >> last).max(1));
                self.device.clear_render_target(weight, 0);
                self.device.set_render_target(Some(weight), None);
                self.device.set_texture(0, Some(render), SamplerKind::Nearest);
                self.device.set_viewport_and_scissor(0, 0, lw, lh);
                self.device.set_pipeline(blur_pass);
                self.device.push_constants(&PushConstants::Downsample { lod: 0 });
                self.device.draw(3, 0);

                // Blend the fine and coarse levels by edge weight.
                self.device.clear_render_target(render, 0);
                self.device.set_render_target(Some(render), None);
                self.device.set_texture(0, Some(mip), SamplerKind::Linear);
                self.device.set_texture(1, Some(weight), SamplerKind::Linear);
                self.device.set_viewport_and_scissor(0, 0, width, height);
                self.device.set_pipeline(composite_pass);
                self.device.push_constants(&PushConstants::Downsample { lod: last });
                self.device.draw(3, 0);
                self.device.set_texture(1, None, SamplerKind::Nearest);

                self.restore_device_context();
                self.display_output = Some(DisplayOutput {
                    texture: render,
                    x: 0,
                    y: 0,
                    width,
                    height,
                });
            }
            _ => {
                self.display_output = Some(DisplayOutput {
                    texture: source,
                    x: left,
                    y: top,
                    width,
                    height,
                });
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn downsample_box(
        &mut self,
        pipeline: PipelineHandle,
        render: TextureHandle,
        source: TextureHandle,
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    ) {
        let factor = (self.config.resolution_scale / self.config.box_downsample_scale.max(1)).max(1);
        let ds_left = left / factor;
        let ds_top = top / factor;
        let ds_width = (width / factor).max(1);
        let ds_height = (height / factor).max(1);

        self.device.clear_render_target(render, 0);
        self.device.set_render_target(Some(render), None);
        self.device.set_texture(0, Some(source), SamplerKind::Nearest);
        self.device.set_pipeline(pipeline);
        self.device
            .set_viewport_and_scissor(ds_left, ds_top, ds_width, ds_height);
        self.device.draw(3, 0);
        self.restore_device_context();

        self.display_output = Some(DisplayOutput {
            texture: render,
            x: ds_left,
            y: ds_top,
            width: ds_width,
            height: ds_height,
        });
    }

    /// Download the current display output as packed RGBA8, row-major.
    pub fn read_display_pixels(&mut self) -> Option<(u32, u32, Vec<u32>)> {
        let out = self.display_output?;
        let mut pixels = vec![0u32; (out.width * out.height) as usize];
        if !self
            .device
            .download_texture(out.texture, out.x, out.y, out.width, out.height, &mut pixels)
        {
            log::error!("HwRenderer: failed to download display texture");
            return None;
        }
        Some((out.width, out.height, pixels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_display_is_enabled() {
        let cfg = DisplayConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.interlace, InterlacedRenderMode::None);
        assert_eq!((cfg.vram_width, cfg.vram_height), (320, 240));
    }
}
