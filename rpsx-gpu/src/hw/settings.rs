// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Effective renderer configuration: user settings reconciled with what the
//! device can do, plus runtime settings changes.

use rpsx_common::settings::{DownsampleMode, Settings, TextureFilter, WireframeMode};
use rpsx_common::{GpuResult, Rect, VRAM_HEIGHT, VRAM_WIDTH};

use super::HardwareRenderer;
use crate::backend::{DeviceFeatures, GpuDevice};
use crate::host::{HostInterface, OSD_INFO_DURATION, OSD_WARNING_DURATION};

/// Display height assumed for automatic scaling before the display is set up.
const DEFAULT_DISPLAY_HEIGHT: u32 = 240;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    pub resolution_scale: u32,
    pub multisamples: u32,
    pub per_sample_shading: bool,
    pub true_color: bool,
    pub scaled_dithering: bool,
    pub texture_filter: TextureFilter,
    pub clamp_uvs: bool,
    pub chroma_smoothing: bool,
    pub downsample_mode: DownsampleMode,
    pub box_downsample_scale: u32,
    pub wireframe_mode: WireframeMode,
    pub disable_color_perspective: bool,
    pub pgxp_depth_buffer: bool,
}

/// Largest scale whose VRAM surface fits in a texture.
pub fn max_resolution_scale(max_texture_size: u32) -> u32 {
    (max_texture_size / VRAM_WIDTH).max(1)
}

fn previous_pow2(v: u32) -> u32 {
    if v == 0 {
        0
    } else {
        1 << (31 - v.leading_zeros())
    }
}

/// Resolution scale for the given settings, before any other validation.
fn calculate_resolution_scale(
    settings: &Settings,
    device: &dyn GpuDevice,
    host: &mut dyn HostInterface,
    display_height: u32,
) -> u32 {
    let max_scale = max_resolution_scale(device.max_texture_size());

    let mut scale = if settings.resolution_scale != 0 {
        settings.resolution_scale.clamp(1, max_scale)
    } else {
        let height = if display_height != 0 {
            display_height
        } else {
            DEFAULT_DISPLAY_HEIGHT
        };
        let preferred = device.window_height().div_ceil(height);
        log::trace!("HwRenderer: height = {}, preferred scale = {}", height, preferred);
        preferred.clamp(1, max_scale)
    };

    if settings.downsample_mode == DownsampleMode::Adaptive && scale > 1 && !scale.is_power_of_two() {
        let new_scale = previous_pow2(scale);
        log::warn!(
            "HwRenderer: resolution scale {}x not supported for adaptive downsampling, using {}x",
            scale,
            new_scale
        );
        if settings.resolution_scale != 0 {
            host.add_osd_message(
                "ResolutionNotPow2",
                &format!(
                    "Resolution scale {}x not supported for adaptive downsampling, using {}x.",
                    scale, new_scale
                ),
                OSD_WARNING_DURATION,
            );
        }
        scale = new_scale;
    }
    scale
}

/// Largest box factor not above the configured one that divides `scale`.
pub fn box_downsample_scale(configured: u32, scale: u32) -> u32 {
    let mut box_scale = configured.max(1).min(scale);
    while box_scale > 1 && scale % box_scale != 0 {
        box_scale -= 1;
    }
    box_scale.max(1)
}

impl RenderConfig {
    /// Resolve settings against device capabilities, notifying the host of
    /// every fallback.
    pub fn resolve<D: GpuDevice>(
        settings: &Settings,
        device: &D,
        host: &mut dyn HostInterface,
        display_height: u32,
    ) -> Self {
        let features = device.features();
        let dual_source = features.contains(DeviceFeatures::DUAL_SOURCE_BLEND);
        let fbfetch = features.contains(DeviceFeatures::FRAMEBUFFER_FETCH);

        let resolution_scale = calculate_resolution_scale(settings, device, host, display_height);
        let multisamples = settings.multisamples.min(device.max_multisamples()).max(1);
        let per_sample_shading =
            settings.per_sample_shading && features.contains(DeviceFeatures::PER_SAMPLE_SHADING);
        let disable_color_perspective = features.contains(DeviceFeatures::NOPERSPECTIVE_INTERPOLATION)
            && settings.pgxp_enable
            && settings.pgxp_texture_correction
            && !settings.pgxp_color_correction;

        if multisamples != settings.multisamples {
            host.add_osd_message(
                "MSAAUnsupported",
                &format!(
                    "{}x MSAA is not supported, using {}x instead.",
                    settings.multisamples, multisamples
                ),
                OSD_WARNING_DURATION,
            );
        } else {
            host.remove_osd_message("MSAAUnsupported");
        }

        if settings.per_sample_shading && !per_sample_shading {
            host.add_osd_message("SSAAUnsupported", "SSAA is not supported, using MSAA instead.", OSD_WARNING_DURATION);
        }

        let mut texture_filter = settings.texture_filter;
        if !dual_source && !fbfetch && texture_filter.is_blended() {
            host.add_osd_message(
                "TextureFilterUnsupported",
                &format!("Texture filter '{}' is not supported with the current device.", texture_filter.name()),
                OSD_WARNING_DURATION,
            );
            texture_filter = TextureFilter::Nearest;
        }

        let mut wireframe_mode = settings.wireframe_mode;
        if wireframe_mode != WireframeMode::Disabled && !features.contains(DeviceFeatures::GEOMETRY_SHADERS) {
            host.add_osd_message(
                "GeometryShadersUnsupported",
                "Geometry shaders are not supported by the device, and are required for wireframe rendering.",
                OSD_WARNING_DURATION,
            );
            wireframe_mode = WireframeMode::Disabled;
        }

        let mut downsample_mode = if resolution_scale == 1 {
            DownsampleMode::Disabled
        } else {
            settings.downsample_mode
        };
        let box_scale = box_downsample_scale(settings.downsample_scale, resolution_scale);
        if downsample_mode == DownsampleMode::Box {
            if box_scale != settings.downsample_scale || box_scale == resolution_scale {
                host.add_osd_message(
                    "BoxDownsampleUnsupported",
                    &format!(
                        "Resolution scale {}x is not divisible by downsample scale {}x, using {}x instead.",
                        resolution_scale, settings.downsample_scale, box_scale
                    ),
                    OSD_WARNING_DURATION,
                );
            } else {
                host.remove_osd_message("BoxDownsampleUnsupported");
            }
            if box_scale == resolution_scale {
                downsample_mode = DownsampleMode::Disabled;
            }
        }

        Self {
            resolution_scale,
            multisamples,
            per_sample_shading,
            true_color: settings.true_color,
            scaled_dithering: settings.scaled_dithering,
            texture_filter,
            clamp_uvs: settings.pgxp_enable || texture_filter != TextureFilter::Nearest,
            chroma_smoothing: settings.chroma_smoothing_24bit,
            downsample_mode,
            box_downsample_scale: box_scale,
            wireframe_mode,
            disable_color_perspective,
            pgxp_depth_buffer: settings.using_pgxp_depth_buffer(),
        }
    }

    /// Changes that require new surfaces.
    pub fn framebuffer_differs(&self, other: &Self) -> bool {
        self.resolution_scale != other.resolution_scale
            || self.multisamples != other.multisamples
            || self.downsample_mode != other.downsample_mode
            || (self.downsample_mode == DownsampleMode::Box && self.box_downsample_scale != other.box_downsample_scale)
    }
}

impl<D: GpuDevice> HardwareRenderer<D> {
    /// Apply new settings, recreating surfaces and pipelines as needed.
    /// VRAM contents survive a surface change.
    pub fn update_settings(&mut self, settings: &Settings) -> GpuResult<()> {
        let new = RenderConfig::resolve(settings, &self.device, self.host.as_mut(), self.display_config.height);
        let old = self.config;
        // A failed update leaves nothing behind, so rebuild whatever is missing.
        let framebuffer_changed = self.surfaces.is_none() || new.framebuffer_differs(&old);
        let shaders_changed = self.pipelines.is_none() || new != old;

        if new.resolution_scale != old.resolution_scale {
            let s = new.resolution_scale;
            self.host.add_osd_message(
                "ResolutionScaleChanged",
                &format!(
                    "Resolution scale set to {}x (display {}x{}, VRAM {}x{})",
                    s,
                    self.display_config.vram_width * s,
                    self.display_config.vram_height * s,
                    VRAM_WIDTH * s,
                    VRAM_HEIGHT * s
                ),
                OSD_INFO_DURATION,
            );
        }
        if new.multisamples != old.multisamples || new.per_sample_shading != old.per_sample_shading {
            let message = if new.per_sample_shading {
                format!("Multisample anti-aliasing set to {}x (SSAA).", new.multisamples)
            } else {
                format!("Multisample anti-aliasing set to {}x.", new.multisamples)
            };
            self.host.add_osd_message("MultisamplingChanged", &message, OSD_INFO_DURATION);
        }

        self.flush_render();

        // The shadow is what gets re-uploaded, whether the surfaces are
        // replaced now or torn down by a failed recompile.
        if framebuffer_changed || shaders_changed {
            self.restore_device_context();
            self.read_vram(0, 0, VRAM_WIDTH, VRAM_HEIGHT)?;
        }
        if framebuffer_changed {
            self.destroy_buffers();
        }

        let pgxp_toggled = new.pgxp_depth_buffer != old.pgxp_depth_buffer;
        self.settings = settings.clone();
        self.config = new;
        self.compute_uv_range = new.clamp_uvs;

        if pgxp_toggled {
            self.batch.config.use_depth_buffer = false;
            if new.pgxp_depth_buffer && self.surfaces.is_some() {
                self.clear_depth_buffer();
            }
        }

        self.print_settings_to_log();

        if shaders_changed {
            self.destroy_pipelines();
            if let Err(e) = self.compile_pipelines() {
                log::error!("HwRenderer: failed to recompile pipelines: {}", e);
                self.destroy_buffers();
                return Err(e);
            }
        }

        if framebuffer_changed {
            if let Err(e) = self.create_buffers() {
                log::error!("HwRenderer: failed to recreate framebuffer: {}", e);
                self.destroy_pipelines();
                return Err(e);
            }
            self.restore_device_context();
            let shadow = self.vram_shadow.pixels().to_vec();
            self.update_vram(0, 0, VRAM_WIDTH, VRAM_HEIGHT, &shadow, false, false)?;
            self.update_depth_buffer_from_mask_bit();
            self.update_display();
        }
        Ok(())
    }

    /// Re-evaluate an automatic resolution scale, e.g. after the window or
    /// display height changed.
    pub fn update_resolution_scale(&mut self) -> GpuResult<()> {
        let settings = self.settings.clone();
        let scale = calculate_resolution_scale(
            &settings,
            &self.device,
            self.host.as_mut(),
            self.display_config.height,
        );
        if scale != self.config.resolution_scale {
            self.update_settings(&settings)?;
        }
        Ok(())
    }

    pub(super) fn print_settings_to_log(&self) {
        let c = &self.config;
        log::info!(
            "HwRenderer: resolution scale {} ({}x{}), maximum {}",
            c.resolution_scale,
            VRAM_WIDTH * c.resolution_scale,
            VRAM_HEIGHT * c.resolution_scale,
            max_resolution_scale(self.device.max_texture_size())
        );
        log::info!(
            "HwRenderer: multisampling {}x{}",
            c.multisamples,
            if c.per_sample_shading { " (per sample shading)" } else { "" }
        );
        log::info!(
            "HwRenderer: dithering {}{}",
            if c.true_color { "disabled" } else { "enabled" },
            if !c.true_color && c.scaled_dithering { " (scaled)" } else { "" }
        );
        log::info!("HwRenderer: texture filtering {}", c.texture_filter.name());
        log::info!("HwRenderer: blending {:?}", self.blend);
        log::info!("HwRenderer: clamping UVs {}", if c.clamp_uvs { "yes" } else { "no" });
        log::info!("HwRenderer: depth buffer {}", if c.pgxp_depth_buffer { "yes" } else { "no" });
        log::info!("HwRenderer: downsampling {:?}", c.downsample_mode);
        log::info!("HwRenderer: wireframe rendering {:?}", c.wireframe_mode);
    }

    /// The full VRAM area in render-target pixels.
    pub(super) fn scaled_vram_rect(&self) -> Rect {
        Rect::vram().scaled(self.config.resolution_scale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::reference::ReferenceDevice;
    use crate::host::RecordingHost;

    fn keys(host: &RecordingHost) -> Vec<&str> {
        host.messages.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn test_box_downsample_scale_divides() {
        assert_eq!(box_downsample_scale(2, 4), 2);
        assert_eq!(box_downsample_scale(3, 4), 2);
        assert_eq!(box_downsample_scale(8, 4), 4);
        assert_eq!(box_downsample_scale(0, 3), 1);
        assert_eq!(box_downsample_scale(5, 6), 3);
    }

    #[test]
    fn test_automatic_scale_from_window_height() {
        let mut device = ReferenceDevice::new();
        device.set_window_height(1080);
        device.set_max_texture_size(8192);
        let mut host = RecordingHost::default();
        let settings = Settings {
            resolution_scale: 0,
            ..Settings::default()
        };
        let config = RenderConfig::resolve(&settings, &device, &mut host, 0);
        assert_eq!(config.resolution_scale, 5);

        device.set_max_texture_size(4096);
        let config = RenderConfig::resolve(&settings, &device, &mut host, 0);
        assert_eq!(config.resolution_scale, 4);
    }

    #[test]
    fn test_adaptive_requires_power_of_two() {
        let mut device = ReferenceDevice::new();
        device.set_max_texture_size(8192);
        let mut host = RecordingHost::default();
        let settings = Settings {
            resolution_scale: 3,
            downsample_mode: DownsampleMode::Adaptive,
            ..Settings::default()
        };
        let config = RenderConfig::resolve(&settings, &device, &mut host, 240);
        assert_eq!(config.resolution_scale, 2);
        assert_eq!(config.downsample_mode, DownsampleMode::Adaptive);
        assert!(keys(&host).contains(&"ResolutionNotPow2"));
    }

    #[test]
    fn test_capability_fallbacks() {
        let mut device = ReferenceDevice::with_features(DeviceFeatures::empty());
        device.set_max_multisamples(4);
        let mut host = RecordingHost::default();
        let settings = Settings {
            multisamples: 8,
            per_sample_shading: true,
            texture_filter: TextureFilter::Bilinear,
            wireframe_mode: WireframeMode::OverlayWireframe,
            ..Settings::default()
        };
        let config = RenderConfig::resolve(&settings, &device, &mut host, 240);
        assert_eq!(config.multisamples, 4);
        assert!(!config.per_sample_shading);
        assert_eq!(config.texture_filter, TextureFilter::Nearest);
        assert!(!config.clamp_uvs);
        assert_eq!(config.wireframe_mode, WireframeMode::Disabled);
        let k = keys(&host);
        for key in ["MSAAUnsupported", "SSAAUnsupported", "TextureFilterUnsupported", "GeometryShadersUnsupported"] {
            assert!(k.contains(&key), "missing {}", key);
        }
    }

    #[test]
    fn test_box_downsample_validation() {
        let mut device = ReferenceDevice::new();
        device.set_max_texture_size(8192);
        let mut host = RecordingHost::default();
        let settings = Settings {
            resolution_scale: 4,
            downsample_mode: DownsampleMode::Box,
            downsample_scale: 3,
            ..Settings::default()
        };
        let config = RenderConfig::resolve(&settings, &device, &mut host, 240);
        assert_eq!(config.box_downsample_scale, 2);
        assert_eq!(config.downsample_mode, DownsampleMode::Box);
        assert!(keys(&host).contains(&"BoxDownsampleUnsupported"));

        let mut host = RecordingHost::default();
        let settings = Settings {
            downsample_scale: 4,
            ..settings
        };
        let config = RenderConfig::resolve(&settings, &device, &mut host, 240);
        assert_eq!(config.downsample_mode, DownsampleMode::Disabled);
        assert!(keys(&host).contains(&"BoxDownsampleUnsupported"));
    }

    #[test]
    fn test_downsample_disabled_at_native_scale() {
        let device = ReferenceDevice::new();
        let mut host = RecordingHost::default();
        let settings = Settings {
            downsample_mode: DownsampleMode::Adaptive,
            ..Settings::default()
        };
        let config = RenderConfig::resolve(&settings, &device, &mut host, 240);
        assert_eq!(config.downsample_mode, DownsampleMode::Disabled);
    }
}
