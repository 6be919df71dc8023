// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

/// Divisor applied to the configured PGXP depth clear threshold.
pub const PGXP_DEPTH_THRESHOLD_SCALE: f32 = 4096.0;

/// Default PGXP depth clear threshold, before scaling.
pub const DEFAULT_PGXP_DEPTH_THRESHOLD: f32 = 300.0;

/// Renderer settings, populated from the config INI and command line.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    // Renderer
    pub renderer_backend: RendererBackend,
    /// Internal resolution multiplier. 0 selects a scale from the window height.
    pub resolution_scale: u32,
    pub multisamples: u32,
    pub per_sample_shading: bool,
    pub true_color: bool,
    pub scaled_dithering: bool,
    pub texture_filter: TextureFilter,
    pub chroma_smoothing_24bit: bool,
    pub downsample_mode: DownsampleMode,
    pub downsample_scale: u32,
    pub wireframe_mode: WireframeMode,

    // PGXP
    pub pgxp_enable: bool,
    pub pgxp_texture_correction: bool,
    pub pgxp_color_correction: bool,
    pub pgxp_depth_buffer: bool,
    /// Already divided by [`PGXP_DEPTH_THRESHOLD_SCALE`].
    pub pgxp_depth_clear_threshold: f32,

    // Debug
    pub show_vram: bool,
    pub use_debug_logging: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            renderer_backend: RendererBackend::Reference,
            resolution_scale: 1,
            multisamples: 1,
            per_sample_shading: false,
            true_color: false,
            scaled_dithering: true,
            texture_filter: TextureFilter::Nearest,
            chroma_smoothing_24bit: false,
            downsample_mode: DownsampleMode::Disabled,
            downsample_scale: 1,
            wireframe_mode: WireframeMode::Disabled,
            pgxp_enable: false,
            pgxp_texture_correction: true,
            pgxp_color_correction: false,
            pgxp_depth_buffer: false,
            pgxp_depth_clear_threshold: DEFAULT_PGXP_DEPTH_THRESHOLD
                / PGXP_DEPTH_THRESHOLD_SCALE,
            show_vram: false,
            use_debug_logging: false,
        }
    }
}

impl Settings {
    /// PGXP depth testing is only meaningful with PGXP itself enabled.
    pub fn using_pgxp_depth_buffer(&self) -> bool {
        self.pgxp_enable && self.pgxp_depth_buffer
    }

    /// Parse a boolean the way INI files tend to spell them.
    pub fn parse_bool(s: &str) -> Option<bool> {
        match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Some(true),
            "0" | "false" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererBackend {
    /// CPU-executed device, pixel-exact.
    Reference,
    Null,
}

impl RendererBackend {
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "0" | "reference" | "software" => Self::Reference,
            "1" | "null" => Self::Null,
            _ => {
                log::warn!("Unknown renderer backend {:?}, using reference", s);
                Self::Reference
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    Nearest,
    Bilinear,
    BilinearBinAlpha,
    JINC2,
    JINC2BinAlpha,
    XBR,
    XBRBinAlpha,
}

impl TextureFilter {
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "0" | "nearest" => Self::Nearest,
            "1" | "bilinear" => Self::Bilinear,
            "2" | "bilinearbinalpha" => Self::BilinearBinAlpha,
            "3" | "jinc2" => Self::JINC2,
            "4" | "jinc2binalpha" => Self::JINC2BinAlpha,
            "5" | "xbr" => Self::XBR,
            "6" | "xbrbinalpha" => Self::XBRBinAlpha,
            _ => {
                log::warn!("Unknown texture filter {:?}, using nearest", s);
                Self::Nearest
            }
        }
    }

    /// Filters that produce partially transparent edge texels, which need
    /// shader blending when dual-source blending is unavailable.
    pub fn is_blended(self) -> bool {
        matches!(self, Self::Bilinear | Self::JINC2 | Self::XBR)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Nearest => "Nearest",
            Self::Bilinear => "Bilinear",
            Self::BilinearBinAlpha => "Bilinear (No Edge Blending)",
            Self::JINC2 => "JINC2",
            Self::JINC2BinAlpha => "JINC2 (No Edge Blending)",
            Self::XBR => "xBR",
            Self::XBRBinAlpha => "xBR (No Edge Blending)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownsampleMode {
    Disabled,
    Box,
    Adaptive,
}

impl DownsampleMode {
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "0" | "disabled" | "none" => Self::Disabled,
            "1" | "box" => Self::Box,
            "2" | "adaptive" => Self::Adaptive,
            _ => {
                log::warn!("Unknown downsample mode {:?}, disabling", s);
                Self::Disabled
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireframeMode {
    Disabled,
    OverlayWireframe,
    OnlyWireframe,
}

impl WireframeMode {
    pub fn from_str_or_default(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "0" | "disabled" => Self::Disabled,
            "1" | "overlay" | "overlaywireframe" => Self::OverlayWireframe,
            "2" | "only" | "onlywireframe" => Self::OnlyWireframe,
            _ => {
                log::warn!("Unknown wireframe mode {:?}, disabling", s);
                Self::Disabled
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_parsing() {
        assert_eq!(TextureFilter::from_str_or_default(" JINC2 "), TextureFilter::JINC2);
        assert_eq!(TextureFilter::from_str_or_default("garbage"), TextureFilter::Nearest);
        assert_eq!(DownsampleMode::from_str_or_default("2"), DownsampleMode::Adaptive);
        assert_eq!(WireframeMode::from_str_or_default("overlay"), WireframeMode::OverlayWireframe);
        assert_eq!(RendererBackend::from_str_or_default("null"), RendererBackend::Null);
    }

    #[test]
    fn test_pgxp_depth_buffer_requires_pgxp() {
        let mut s = Settings {
            pgxp_depth_buffer: true,
            ..Settings::default()
        };
        assert!(!s.using_pgxp_depth_buffer());
        s.pgxp_enable = true;
        assert!(s.using_pgxp_depth_buffer());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(Settings::parse_bool("True"), Some(true));
        assert_eq!(Settings::parse_bool("0"), Some(false));
        assert_eq!(Settings::parse_bool("maybe"), None);
    }
}
