// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use ini::{Ini, Properties};
use log::{debug, info, warn};
use rpsx_common::settings::{
    DownsampleMode, RendererBackend, Settings, TextureFilter, WireframeMode, PGXP_DEPTH_THRESHOLD_SCALE,
};
use std::path::{Path, PathBuf};

/// Locate `rpsx.ini` in the usual config directories.
pub fn find_config_path() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(&xdg).join("rpsx").join("rpsx.ini");
        if path.exists() {
            return Some(path);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let path = PathBuf::from(&home).join(".config").join("rpsx").join("rpsx.ini");
        if path.exists() {
            return Some(path);
        }
    }

    // Windows: %APPDATA%\rpsx\rpsx.ini
    if let Ok(appdata) = std::env::var("APPDATA") {
        let path = PathBuf::from(&appdata).join("rpsx").join("rpsx.ini");
        if path.exists() {
            return Some(path);
        }
    }

    None
}

fn get_bool(section: &Properties, key: &str, out: &mut bool) {
    if let Some(value) = section.get(key) {
        match Settings::parse_bool(value) {
            Some(b) => *out = b,
            None => warn!("Ignoring {} = {:?}, expected a boolean", key, value),
        }
    }
}

fn get_u32(section: &Properties, key: &str, out: &mut u32) {
    if let Some(value) = section.get(key) {
        match value.trim().parse() {
            Ok(v) => *out = v,
            Err(_) => warn!("Ignoring {} = {:?}, expected a number", key, value),
        }
    }
}

/// Apply the `[GPU]` and `[Debug]` sections of a parsed INI.
pub fn apply_ini(conf: &Ini, settings: &mut Settings) {
    // [GPU]
    if let Some(section) = conf.section(Some("GPU")) {
        if let Some(backend) = section.get("Renderer") {
            settings.renderer_backend = RendererBackend::from_str_or_default(backend);
            debug!("Renderer backend: {:?}", settings.renderer_backend);
        }
        get_u32(section, "ResolutionScale", &mut settings.resolution_scale);
        get_u32(section, "Multisamples", &mut settings.multisamples);
        get_bool(section, "PerSampleShading", &mut settings.per_sample_shading);
        get_bool(section, "TrueColor", &mut settings.true_color);
        get_bool(section, "ScaledDithering", &mut settings.scaled_dithering);
        if let Some(filter) = section.get("TextureFilter") {
            settings.texture_filter = TextureFilter::from_str_or_default(filter);
        }
        get_bool(section, "ChromaSmoothing24Bit", &mut settings.chroma_smoothing_24bit);
        if let Some(mode) = section.get("DownsampleMode") {
            settings.downsample_mode = DownsampleMode::from_str_or_default(mode);
        }
        get_u32(section, "DownsampleScale", &mut settings.downsample_scale);
        if let Some(mode) = section.get("WireframeMode") {
            settings.wireframe_mode = WireframeMode::from_str_or_default(mode);
        }
        get_bool(section, "PGXPEnable", &mut settings.pgxp_enable);
        get_bool(section, "PGXPTextureCorrection", &mut settings.pgxp_texture_correction);
        get_bool(section, "PGXPColorCorrection", &mut settings.pgxp_color_correction);
        get_bool(section, "PGXPDepthBuffer", &mut settings.pgxp_depth_buffer);
        if let Some(value) = section.get("PGXPDepthClearThreshold") {
            match value.trim().parse::<f32>() {
                Ok(v) => settings.pgxp_depth_clear_threshold = v / PGXP_DEPTH_THRESHOLD_SCALE,
                Err(_) => warn!("Ignoring PGXPDepthClearThreshold = {:?}", value),
            }
        }
    }

    // [Debug]
    if let Some(section) = conf.section(Some("Debug")) {
        get_bool(section, "ShowVRAM", &mut settings.show_vram);
        get_bool(section, "DebugLogging", &mut settings.use_debug_logging);
    }
}

/// Load settings from an INI file. Missing or broken files leave the
/// defaults in place.
pub fn load_config(path: Option<&Path>) -> Settings {
    let mut settings = Settings::default();

    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                warn!("Config file not found: {}", p.display());
                return settings;
            }
            p.to_path_buf()
        }
        None => match find_config_path() {
            Some(p) => p,
            None => {
                info!("No rpsx config found, using defaults");
                return settings;
            }
        },
    };

    info!("Loading config from: {}", config_path.display());

    let conf = match Ini::load_from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to parse config: {}", e);
            return settings;
        }
    };

    apply_ini(&conf, &mut settings);
    settings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_ini_sections() {
        let conf = Ini::load_from_str(
            "[GPU]\n\
             Renderer = null\n\
             ResolutionScale = 4\n\
             TrueColor = true\n\
             TextureFilter = bilinear\n\
             DownsampleMode = box\n\
             DownsampleScale = 2\n\
             PGXPDepthClearThreshold = 4096\n\
             [Debug]\n\
             ShowVRAM = 1\n",
        )
        .unwrap();
        let mut settings = Settings::default();
        apply_ini(&conf, &mut settings);
        assert_eq!(settings.renderer_backend, RendererBackend::Null);
        assert_eq!(settings.resolution_scale, 4);
        assert!(settings.true_color);
        assert_eq!(settings.texture_filter, TextureFilter::Bilinear);
        assert_eq!(settings.downsample_mode, DownsampleMode::Box);
        assert_eq!(settings.downsample_scale, 2);
        assert_eq!(settings.pgxp_depth_clear_threshold, 1.0);
        assert!(settings.show_vram);
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let conf = Ini::load_from_str("[GPU]\nResolutionScale = lots\nTrueColor = maybe\n").unwrap();
        let mut settings = Settings::default();
        apply_ini(&conf, &mut settings);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let settings = load_config(Some(Path::new("/nonexistent/rpsx.ini")));
        assert_eq!(settings, Settings::default());
    }
}
