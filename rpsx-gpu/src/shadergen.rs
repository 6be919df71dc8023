// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Shading-language generator interface.
//!
//! The engine asks a [`ShaderGenerator`] for the program text of every
//! pipeline it builds. [`DefineShaderGen`] produces a compact preamble of
//! `#define`s describing the permutation, which is all the bundled devices
//! need; a backend targeting a real shading language plugs in its own
//! generator.

use std::fmt::Write;

use rpsx_common::settings::TextureFilter;

use crate::types::{InterlacedRenderMode, PipelineKey};

/// Settings that affect generated program text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderGenConfig {
    pub resolution_scale: u32,
    pub multisamples: u32,
    pub per_sample_shading: bool,
    pub true_color: bool,
    pub scaled_dithering: bool,
    pub texture_filter: TextureFilter,
    pub uv_limits: bool,
    pub pgxp_depth: bool,
    pub disable_color_perspective: bool,
    pub dual_source_blend: bool,
    pub framebuffer_fetch: bool,
    pub use_texture_buffer: bool,
}

pub trait ShaderGenerator: Send {
    fn batch_vertex_shader(&self, config: &ShaderGenConfig, textured: bool) -> String;

    fn batch_fragment_shader(&self, config: &ShaderGenConfig, key: &PipelineKey, shader_blending: bool) -> String;

    fn wireframe_geometry_shader(&self, config: &ShaderGenConfig) -> String;

    fn wireframe_fragment_shader(&self, config: &ShaderGenConfig) -> String;

    fn screen_quad_vertex_shader(&self, config: &ShaderGenConfig) -> String;

    fn fill_fragment_shader(&self, config: &ShaderGenConfig, wrapped: bool, interlaced: bool) -> String;

    fn copy_fragment_shader(&self, config: &ShaderGenConfig) -> String;

    fn write_fragment_shader(&self, config: &ShaderGenConfig) -> String;

    fn update_depth_fragment_shader(&self, config: &ShaderGenConfig) -> String;

    fn readback_fragment_shader(&self, config: &ShaderGenConfig) -> String;

    fn display_fragment_shader(
        &self,
        config: &ShaderGenConfig,
        depth_24bit: bool,
        interlace: InterlacedRenderMode,
        chroma_smoothing: bool,
    ) -> String;

    fn adaptive_mip_fragment_shader(&self, first_pass: bool) -> String;

    fn adaptive_blur_fragment_shader(&self) -> String;

    fn adaptive_composite_fragment_shader(&self) -> String;

    fn box_downsample_fragment_shader(&self, factor: u32) -> String;
}

/// Emits `#define` preambles naming the program and its parameters.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefineShaderGen;

impl DefineShaderGen {
    pub fn new() -> Self {
        Self
    }

    fn header(program: &str, config: Option<&ShaderGenConfig>) -> String {
        let mut ss = String::new();
        let _ = writeln!(ss, "// {}", program);
        if let Some(c) = config {
            define(&mut ss, "RESOLUTION_SCALE", c.resolution_scale);
            define(&mut ss, "MULTISAMPLES", c.multisamples);
            define_bool(&mut ss, "PER_SAMPLE_SHADING", c.per_sample_shading);
            define_bool(&mut ss, "TRUE_COLOR", c.true_color);
        }
        ss
    }

    fn finish(mut ss: String) -> String {
        ss.push_str("void main() {}\n");
        ss
    }
}

fn define(ss: &mut String, name: &str, value: impl std::fmt::Display) {
    let _ = writeln!(ss, "#define {} {}", name, value);
}

fn define_bool(ss: &mut String, name: &str, value: bool) {
    define(ss, name, value as u32);
}

impl ShaderGenerator for DefineShaderGen {
    fn batch_vertex_shader(&self, config: &ShaderGenConfig, textured: bool) -> String {
        let mut ss = Self::header("batch vertex", Some(config));
        define_bool(&mut ss, "TEXTURED", textured);
        define_bool(&mut ss, "UV_LIMITS", config.uv_limits);
        define_bool(&mut ss, "PGXP_DEPTH", config.pgxp_depth);
        define_bool(&mut ss, "COLOR_NOPERSPECTIVE", config.disable_color_perspective);
        Self::finish(ss)
    }

    fn batch_fragment_shader(&self, config: &ShaderGenConfig, key: &PipelineKey, shader_blending: bool) -> String {
        let mut ss = Self::header("batch fragment", Some(config));
        define(&mut ss, "DEPTH_TEST", key.depth_test as u8);
        define(&mut ss, "RENDER_MODE", key.render_mode as u8);
        define(&mut ss, "TEXTURE_MODE", key.texture_mode as u8);
        define(&mut ss, "TRANSPARENCY_MODE", key.transparency_mode as u8);
        define_bool(&mut ss, "DITHERING", key.dithering);
        define_bool(&mut ss, "INTERLACING", key.interlacing);
        define_bool(&mut ss, "SCALED_DITHERING", config.scaled_dithering);
        define(&mut ss, "TEXTURE_FILTER", config.texture_filter.name());
        define_bool(&mut ss, "UV_LIMITS", config.uv_limits);
        define_bool(&mut ss, "DUAL_SOURCE", config.dual_source_blend);
        define_bool(&mut ss, "SHADER_BLENDING", shader_blending);
        define_bool(&mut ss, "FRAMEBUFFER_FETCH", config.framebuffer_fetch);
        Self::finish(ss)
    }

    fn wireframe_geometry_shader(&self, config: &ShaderGenConfig) -> String {
        Self::finish(Self::header("wireframe geometry", Some(config)))
    }

    fn wireframe_fragment_shader(&self, config: &ShaderGenConfig) -> String {
        Self::finish(Self::header("wireframe fragment", Some(config)))
    }

    fn screen_quad_vertex_shader(&self, config: &ShaderGenConfig) -> String {
        Self::finish(Self::header("screen quad vertex", Some(config)))
    }

    fn fill_fragment_shader(&self, config: &ShaderGenConfig, wrapped: bool, interlaced: bool) -> String {
        let mut ss = Self::header("vram fill", Some(config));
        define_bool(&mut ss, "WRAPPED", wrapped);
        define_bool(&mut ss, "INTERLACED", interlaced);
        Self::finish(ss)
    }

    fn copy_fragment_shader(&self, config: &ShaderGenConfig) -> String {
        Self::finish(Self::header("vram copy", Some(config)))
    }

    fn write_fragment_shader(&self, config: &ShaderGenConfig) -> String {
        let mut ss = Self::header("vram write", Some(config));
        define_bool(&mut ss, "USE_TEXTURE_BUFFER", config.use_texture_buffer);
        Self::finish(ss)
    }

    fn update_depth_fragment_shader(&self, config: &ShaderGenConfig) -> String {
        Self::finish(Self::header("vram update depth", Some(config)))
    }

    fn readback_fragment_shader(&self, config: &ShaderGenConfig) -> String {
        Self::finish(Self::header("vram readback", Some(config)))
    }

    fn display_fragment_shader(
        &self,
        config: &ShaderGenConfig,
        depth_24bit: bool,
        interlace: InterlacedRenderMode,
        chroma_smoothing: bool,
    ) -> String {
        let mut ss = Self::header("display", Some(config));
        define_bool(&mut ss, "DEPTH_24BIT", depth_24bit);
        define(&mut ss, "INTERLACE_MODE", interlace as u8);
        define_bool(&mut ss, "CHROMA_SMOOTHING", chroma_smoothing);
        Self::finish(ss)
    }

    fn adaptive_mip_fragment_shader(&self, first_pass: bool) -> String {
        let mut ss = Self::header("adaptive downsample mip", None);
        define_bool(&mut ss, "FIRST_PASS", first_pass);
        Self::finish(ss)
    }

    fn adaptive_blur_fragment_shader(&self) -> String {
        Self::finish(Self::header("adaptive downsample blur", None))
    }

    fn adaptive_composite_fragment_shader(&self) -> String {
        Self::finish(Self::header("adaptive downsample composite", None))
    }

    fn box_downsample_fragment_shader(&self, factor: u32) -> String {
        let mut ss = Self::header("box downsample", None);
        define(&mut ss, "FACTOR", factor);
        Self::finish(ss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BatchRenderMode, DepthTest, TextureMode, TransparencyMode};

    fn config() -> ShaderGenConfig {
        ShaderGenConfig {
            resolution_scale: 2,
            multisamples: 1,
            per_sample_shading: false,
            true_color: false,
            scaled_dithering: true,
            texture_filter: TextureFilter::Nearest,
            uv_limits: false,
            pgxp_depth: false,
            disable_color_perspective: false,
            dual_source_blend: true,
            framebuffer_fetch: false,
            use_texture_buffer: true,
        }
    }

    #[test]
    fn test_batch_fragment_defines() {
        let key = PipelineKey {
            depth_test: DepthTest::GreaterEqual,
            render_mode: BatchRenderMode::OnlyTransparent,
            texture_mode: TextureMode::RawPalette8Bit,
            transparency_mode: TransparencyMode::BackgroundMinusForeground,
            dithering: true,
            interlacing: false,
        };
        let src = DefineShaderGen::new().batch_fragment_shader(&config(), &key, false);
        assert!(src.contains("#define RESOLUTION_SCALE 2"));
        assert!(src.contains("#define DEPTH_TEST 1"));
        assert!(src.contains("#define RENDER_MODE 3"));
        assert!(src.contains("#define TEXTURE_MODE 5"));
        assert!(src.contains("#define TRANSPARENCY_MODE 2"));
        assert!(src.contains("#define DITHERING 1"));
        assert!(src.contains("#define INTERLACING 0"));
        assert!(src.ends_with("void main() {}\n"));
    }

    #[test]
    fn test_box_downsample_factor() {
        let src = DefineShaderGen::new().box_downsample_fragment_shader(3);
        assert!(src.contains("#define FACTOR 3"));
    }
}
