// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Pipeline permutations and the blending strategy that selects them.

use std::collections::HashMap;

use rpsx_common::settings::{DownsampleMode, TextureFilter, WireframeMode};
use rpsx_common::{GpuError, GpuResult};

use super::settings::RenderConfig;
use super::HardwareRenderer;
use crate::backend::{
    BatchShaderOptions, BlendFactor, BlendOp, BlendState, DepthFunc, DepthState, DeviceFeatures, GpuDevice,
    GraphicsConfig, PipelineHandle, ProgramDesc, ShaderHandle, ShaderStage, TextureFormat, VertexLayout,
};
use crate::host::HostInterface;
use crate::progress::CompileProgress;
use crate::shadergen::{ShaderGenConfig, ShaderGenerator};
use crate::types::{
    BatchRenderMode, DepthTest, InterlacedRenderMode, PipelineKey, TextureMode, TransparencyMode,
};

/// Objects created by a full compile, including skipped permutations.
const COMPILE_STEPS: u32 = 2
    + (4 * 5 * 9 * 2 * 2)
    + (3 * 4 * 5 * 9 * 2 * 2)
    + 1
    + (2 * 2)
    + 2
    + 2
    + 1
    + 1
    + (2 * 3)
    + 1;

/// Number of fragment shader permutations per `[render][transparency]` pair.
const FRAGMENT_PERMUTATIONS_PER_MODE: u32 = (TextureMode::COUNT * 2 * 2) as u32;

// ── Blend strategy ───────────────────────────────────────────────────────────

/// How semi-transparency is blended, chosen once from the device features.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendStrategy {
    /// Fixed-function blending weighted by a second fragment output.
    DualSource,
    /// Blending in the fragment shader from the current framebuffer value.
    FramebufferFetch { dual_source: bool },
    /// Fixed-function blending with constant factors. Textured
    /// semi-transparent batches are drawn as an opaque and a transparent pass.
    TwoPass,
}

impl BlendStrategy {
    pub fn select(features: DeviceFeatures) -> Self {
        let dual_source = features.contains(DeviceFeatures::DUAL_SOURCE_BLEND);
        if features.contains(DeviceFeatures::FRAMEBUFFER_FETCH) {
            Self::FramebufferFetch { dual_source }
        } else if dual_source {
            Self::DualSource
        } else {
            Self::TwoPass
        }
    }

    pub fn supports_dual_source(self) -> bool {
        matches!(self, Self::DualSource | Self::FramebufferFetch { dual_source: true })
    }

    pub fn supports_framebuffer_fetch(self) -> bool {
        matches!(self, Self::FramebufferFetch { .. })
    }

    /// Textured batches whose per-texel transparency can't be expressed by
    /// one fixed-function blend are split into opaque and transparent passes.
    pub fn needs_two_pass(self, texture_mode: TextureMode, transparency: TransparencyMode) -> bool {
        texture_mode.is_enabled()
            && !self.supports_framebuffer_fetch()
            && (transparency == TransparencyMode::BackgroundMinusForeground
                || (!self.supports_dual_source() && transparency != TransparencyMode::Disabled))
    }

    pub fn needs_shader_blending(self, transparency: TransparencyMode, filter: TextureFilter) -> bool {
        self.supports_framebuffer_fetch()
            && (transparency == TransparencyMode::BackgroundMinusForeground
                || (!self.supports_dual_source()
                    && (transparency != TransparencyMode::Disabled || filter.is_blended())))
    }

    /// Fixed-function blend state of a batch pipeline.
    fn batch_blend_state(self, key: &PipelineKey, filter: TextureFilter, shader_blending: bool) -> BlendState {
        let transparent_pass = !matches!(
            key.render_mode,
            BatchRenderMode::TransparencyDisabled | BatchRenderMode::OnlyOpaque
        );
        let blended = (key.transparency_mode != TransparencyMode::Disabled && transparent_pass)
            || (key.is_textured() && filter.is_blended());
        if shader_blending || !blended {
            return BlendState::NO_BLENDING;
        }

        let op = if key.transparency_mode == TransparencyMode::BackgroundMinusForeground && transparent_pass {
            BlendOp::ReverseSubtract
        } else {
            BlendOp::Add
        };
        if self.supports_dual_source() {
            BlendState {
                enable: true,
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::Src1Alpha,
                op,
                constant: 0,
                write_mask: 0xF,
            }
        } else if key.transparency_mode == TransparencyMode::HalfBackgroundPlusHalfForeground {
            BlendState {
                enable: true,
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::ConstantColor,
                op,
                constant: 0x0080_8080,
                write_mask: 0xF,
            }
        } else {
            BlendState {
                enable: true,
                src_factor: BlendFactor::One,
                dst_factor: BlendFactor::One,
                op,
                constant: 0,
                write_mask: 0xF,
            }
        }
    }
}

// ── Pipeline cache ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub(crate) enum DownsamplePipelines {
    None,
    Box(PipelineHandle),
    Adaptive {
        first_pass: PipelineHandle,
        mid_pass: PipelineHandle,
        blur_pass: PipelineHandle,
        composite_pass: PipelineHandle,
    },
}

/// Every pipeline the renderer draws with.
#[derive(Debug)]
pub(crate) struct PipelineCache {
    pub(super) batch_pipelines: HashMap<PipelineKey, PipelineHandle>,
    pub(super) wireframe: Option<PipelineHandle>,
    /// `[wrapped][interlaced]`
    pub(super) vram_fill: [[PipelineHandle; 2]; 2],
    /// `[check_mask]`
    pub(super) vram_copy: [PipelineHandle; 2],
    /// `[check_mask]`
    pub(super) vram_write: [PipelineHandle; 2],
    pub(super) vram_update_depth: PipelineHandle,
    pub(super) vram_readback: PipelineHandle,
    /// `[depth_24bit][interlace mode]`
    pub(super) display: [[PipelineHandle; InterlacedRenderMode::COUNT]; 2],
    pub(super) downsample: DownsamplePipelines,
}

impl PipelineCache {
    pub fn batch(&self, key: &PipelineKey) -> Option<PipelineHandle> {
        self.batch_pipelines.get(key).copied()
    }

    pub fn batch_count(&self) -> usize {
        self.batch_pipelines.len()
    }

    fn handles(&self) -> Vec<PipelineHandle> {
        let mut out: Vec<PipelineHandle> = self.batch_pipelines.values().copied().collect();
        out.extend(self.wireframe);
        out.extend(self.vram_fill.iter().flatten().copied());
        out.extend(self.vram_copy);
        out.extend(self.vram_write);
        out.push(self.vram_update_depth);
        out.push(self.vram_readback);
        out.extend(self.display.iter().flatten().copied());
        match self.downsample {
            DownsamplePipelines::None => {}
            DownsamplePipelines::Box(p) => out.push(p),
            DownsamplePipelines::Adaptive {
                first_pass,
                mid_pass,
                blur_pass,
                composite_pass,
            } => out.extend([first_pass, mid_pass, blur_pass, composite_pass]),
        }
        out
    }
}

// ── Compilation ──────────────────────────────────────────────────────────────

/// Tracks everything created during one compile so a failure can release it.
struct PipelineCompiler<'a, D: GpuDevice> {
    device: &'a mut D,
    host: &'a mut dyn HostInterface,
    progress: CompileProgress,
    shaders: Vec<ShaderHandle>,
    pipelines: Vec<PipelineHandle>,
}

impl<'a, D: GpuDevice> PipelineCompiler<'a, D> {
    fn new(device: &'a mut D, host: &'a mut dyn HostInterface) -> Self {
        Self {
            device,
            host,
            progress: CompileProgress::new(COMPILE_STEPS),
            shaders: Vec::new(),
            pipelines: Vec::new(),
        }
    }

    fn shader(&mut self, stage: ShaderStage, name: &str, source: &str) -> GpuResult<ShaderHandle> {
        let shader = self
            .device
            .create_shader(stage, name, source)
            .ok_or_else(|| GpuError::ShaderCompilation {
                stage,
                name: name.to_string(),
            })?;
        self.shaders.push(shader);
        Ok(shader)
    }

    fn pipeline(&mut self, config: &GraphicsConfig) -> GpuResult<PipelineHandle> {
        let pipeline = self
            .device
            .create_pipeline(config)
            .ok_or_else(|| GpuError::PipelineCreation(format!("{:?}", config.program)))?;
        self.pipelines.push(pipeline);
        Ok(pipeline)
    }

    fn step(&mut self) {
        self.progress.increment(&mut *self.host);
    }

    fn skip(&mut self, count: u32) {
        for _ in 0..count {
            self.step();
        }
    }

    /// Shaders are only needed while pipelines are created.
    fn release_shaders(&mut self) {
        for shader in self.shaders.drain(..) {
            self.device.destroy_shader(shader);
        }
    }

    fn abandon(mut self) {
        self.release_shaders();
        for pipeline in self.pipelines.drain(..) {
            self.device.destroy_pipeline(pipeline);
        }
    }
}

fn screen_quad_config(vertex_shader: ShaderHandle, fragment_shader: ShaderHandle, program: ProgramDesc) -> GraphicsConfig {
    GraphicsConfig {
        layout: VertexLayout::None,
        vertex_shader,
        geometry_shader: None,
        fragment_shader,
        depth: DepthState::DISABLED,
        blend: BlendState::NO_BLENDING,
        color_format: Some(TextureFormat::Rgba8),
        depth_format: None,
        samples: 1,
        per_sample_shading: false,
        program,
    }
}

fn build_pipelines<D: GpuDevice>(
    c: &mut PipelineCompiler<'_, D>,
    shadergen: &dyn ShaderGenerator,
    gen: &ShaderGenConfig,
    config: &RenderConfig,
    blend: BlendStrategy,
) -> GpuResult<PipelineCache> {
    let fbfetch = blend.supports_framebuffer_fetch();

    // vertex shaders - [textured]
    let mut batch_vertex_shaders = [ShaderHandle(0); 2];
    for textured in [false, true] {
        let src = shadergen.batch_vertex_shader(gen, textured);
        batch_vertex_shaders[textured as usize] = c.shader(ShaderStage::Vertex, "batch vertex", &src)?;
        c.step();
    }

    // fragment shaders - [render_mode][transparency_mode][texture_mode][dithering][interlacing]
    let mut batch_fragment_shaders: HashMap<PipelineKey, ShaderHandle> = HashMap::new();
    for render_mode in BatchRenderMode::ALL {
        for transparency_mode in TransparencyMode::ALL {
            let skip = if fbfetch {
                !matches!(
                    render_mode,
                    BatchRenderMode::TransparencyDisabled | BatchRenderMode::TransparentAndOpaque
                )
            } else {
                transparency_mode != TransparencyMode::Disabled
            };
            if skip {
                c.skip(FRAGMENT_PERMUTATIONS_PER_MODE);
                continue;
            }

            for texture_mode in TextureMode::ALL {
                for dithering in [false, true] {
                    for interlacing in [false, true] {
                        let key = PipelineKey {
                            depth_test: DepthTest::Always,
                            render_mode,
                            texture_mode,
                            transparency_mode,
                            dithering,
                            interlacing,
                        };
                        let shader_blending =
                            texture_mode.is_enabled() && blend.needs_shader_blending(transparency_mode, config.texture_filter);
                        let src = shadergen.batch_fragment_shader(gen, &key, shader_blending);
                        let fs = c.shader(ShaderStage::Fragment, "batch fragment", &src)?;
                        batch_fragment_shaders.insert(key, fs);
                        c.step();
                    }
                }
            }
        }
    }

    let options = BatchShaderOptions {
        true_color: config.true_color,
        scaled_dithering: config.scaled_dithering,
        clamp_uvs: config.clamp_uvs,
        pgxp_depth: config.pgxp_depth_buffer,
        shader_blending: false,
    };

    // [depth_test][render_mode][transparency_mode][texture_mode][dithering][interlacing]
    let mut batch_pipelines = HashMap::new();
    for depth_test in DepthTest::ALL {
        for render_mode in BatchRenderMode::ALL {
            if fbfetch
                && !matches!(
                    render_mode,
                    BatchRenderMode::TransparencyDisabled | BatchRenderMode::TransparentAndOpaque
                )
            {
                c.skip(FRAGMENT_PERMUTATIONS_PER_MODE * TransparencyMode::COUNT as u32);
                continue;
            }

            for transparency_mode in TransparencyMode::ALL {
                for texture_mode in TextureMode::ALL {
                    for dithering in [false, true] {
                        for interlacing in [false, true] {
                            let key = PipelineKey {
                                depth_test,
                                render_mode,
                                texture_mode,
                                transparency_mode,
                                dithering,
                                interlacing,
                            };
                            let textured = key.is_textured();
                            let shader_blending =
                                textured && blend.needs_shader_blending(transparency_mode, config.texture_filter);
                            let fs_key = PipelineKey {
                                depth_test: DepthTest::Always,
                                transparency_mode: if shader_blending {
                                    transparency_mode
                                } else {
                                    TransparencyMode::Disabled
                                },
                                ..key
                            };
                            let Some(&fragment_shader) = batch_fragment_shaders.get(&fs_key) else {
                                return Err(GpuError::PipelineCreation(format!("no fragment shader for {:?}", fs_key)));
                            };

                            let depth = DepthState {
                                func: match depth_test {
                                    DepthTest::Always => DepthFunc::Always,
                                    DepthTest::GreaterEqual => DepthFunc::GreaterEqual,
                                    DepthTest::LessEqual => DepthFunc::LessEqual,
                                },
                                write: !config.pgxp_depth_buffer || depth_test != DepthTest::Always,
                            };
                            let plconfig = GraphicsConfig {
                                layout: VertexLayout::Batch {
                                    textured,
                                    uv_limits: textured && config.clamp_uvs,
                                },
                                vertex_shader: batch_vertex_shaders[textured as usize],
                                geometry_shader: None,
                                fragment_shader,
                                depth,
                                blend: blend.batch_blend_state(&key, config.texture_filter, shader_blending),
                                color_format: Some(TextureFormat::Rgba8),
                                depth_format: Some(TextureFormat::D16),
                                samples: config.multisamples,
                                per_sample_shading: config.per_sample_shading,
                                program: ProgramDesc::Batch {
                                    key,
                                    options: BatchShaderOptions {
                                        shader_blending,
                                        ..options
                                    },
                                },
                            };
                            batch_pipelines.insert(key, c.pipeline(&plconfig)?);
                            c.step();
                        }
                    }
                }
            }
        }
    }

    let wireframe = if config.wireframe_mode != WireframeMode::Disabled {
        let gs_src = shadergen.wireframe_geometry_shader(gen);
        let gs = c.shader(ShaderStage::Geometry, "wireframe geometry", &gs_src)?;
        let fs_src = shadergen.wireframe_fragment_shader(gen);
        let fs = c.shader(ShaderStage::Fragment, "wireframe fragment", &fs_src)?;
        let blend_state = if config.wireframe_mode == WireframeMode::OverlayWireframe {
            BlendState {
                enable: true,
                src_factor: BlendFactor::SrcAlpha,
                dst_factor: BlendFactor::InvSrcAlpha,
                op: BlendOp::Add,
                constant: 0,
                write_mask: 0x7,
            }
        } else {
            BlendState {
                write_mask: 0x7,
                ..BlendState::NO_BLENDING
            }
        };
        Some(c.pipeline(&GraphicsConfig {
            layout: VertexLayout::Batch {
                textured: false,
                uv_limits: false,
            },
            vertex_shader: batch_vertex_shaders[0],
            geometry_shader: Some(gs),
            fragment_shader: fs,
            depth: DepthState::DISABLED,
            blend: blend_state,
            color_format: Some(TextureFormat::Rgba8),
            depth_format: Some(TextureFormat::D16),
            samples: config.multisamples,
            per_sample_shading: config.per_sample_shading,
            program: ProgramDesc::Wireframe,
        })?)
    } else {
        None
    };

    // Batch shaders are no longer needed.
    c.release_shaders();

    let vs_src = shadergen.screen_quad_vertex_shader(gen);
    let screen_quad_vs = c.shader(ShaderStage::Vertex, "screen quad", &vs_src)?;
    c.step();

    // Utility passes on the VRAM render target.
    let vram_target = |fs: ShaderHandle, depth: DepthState, program: ProgramDesc| GraphicsConfig {
        depth,
        depth_format: Some(TextureFormat::D16),
        samples: config.multisamples,
        ..screen_quad_config(screen_quad_vs, fs, program)
    };
    let mask_depth = |check_mask: bool| DepthState {
        func: if check_mask {
            DepthFunc::GreaterEqual
        } else {
            DepthFunc::Always
        },
        write: true,
    };

    let mut vram_fill = [[PipelineHandle(0); 2]; 2];
    for wrapped in [false, true] {
        for interlaced in [false, true] {
            let src = shadergen.fill_fragment_shader(gen, wrapped, interlaced);
            let fs = c.shader(ShaderStage::Fragment, "vram fill", &src)?;
            let program = ProgramDesc::VramFill { wrapped, interlaced };
            vram_fill[wrapped as usize][interlaced as usize] =
                c.pipeline(&vram_target(fs, DepthState::ALWAYS_WRITE, program))?;
            c.step();
        }
    }

    let mut vram_copy = [PipelineHandle(0); 2];
    let src = shadergen.copy_fragment_shader(gen);
    let fs = c.shader(ShaderStage::Fragment, "vram copy", &src)?;
    for check_mask in [false, true] {
        vram_copy[check_mask as usize] = c.pipeline(&vram_target(fs, mask_depth(check_mask), ProgramDesc::VramCopy))?;
        c.step();
    }

    let mut vram_write = [PipelineHandle(0); 2];
    let src = shadergen.write_fragment_shader(gen);
    let fs = c.shader(ShaderStage::Fragment, "vram write", &src)?;
    for check_mask in [false, true] {
        vram_write[check_mask as usize] =
            c.pipeline(&vram_target(fs, mask_depth(check_mask), ProgramDesc::VramWrite))?;
        c.step();
    }

    let src = shadergen.update_depth_fragment_shader(gen);
    let fs = c.shader(ShaderStage::Fragment, "vram update depth", &src)?;
    let vram_update_depth = c.pipeline(&GraphicsConfig {
        color_format: None,
        blend: BlendState {
            write_mask: 0,
            ..BlendState::NO_BLENDING
        },
        ..vram_target(fs, DepthState::ALWAYS_WRITE, ProgramDesc::VramUpdateDepth)
    })?;
    c.step();

    // Single-sampled color-only passes.
    let src = shadergen.readback_fragment_shader(gen);
    let fs = c.shader(ShaderStage::Fragment, "vram readback", &src)?;
    let vram_readback = c.pipeline(&screen_quad_config(screen_quad_vs, fs, ProgramDesc::VramReadback))?;
    c.step();

    let mut display = [[PipelineHandle(0); InterlacedRenderMode::COUNT]; 2];
    for depth_24bit in [false, true] {
        for interlace in InterlacedRenderMode::ALL {
            let src = shadergen.display_fragment_shader(gen, depth_24bit, interlace, config.chroma_smoothing);
            let fs = c.shader(ShaderStage::Fragment, "display", &src)?;
            let program = ProgramDesc::Display {
                depth_24bit,
                interlace,
                chroma_smoothing: config.chroma_smoothing,
            };
            display[depth_24bit as usize][interlace as usize] =
                c.pipeline(&screen_quad_config(screen_quad_vs, fs, program))?;
            c.step();
        }
    }

    let downsample = match config.downsample_mode {
        DownsampleMode::Adaptive => {
            let mut mip = [PipelineHandle(0); 2];
            for first_pass in [true, false] {
                let src = shadergen.adaptive_mip_fragment_shader(first_pass);
                let fs = c.shader(ShaderStage::Fragment, "downsample mip", &src)?;
                let program = ProgramDesc::AdaptiveDownsampleMip { first_pass };
                mip[first_pass as usize] = c.pipeline(&screen_quad_config(screen_quad_vs, fs, program))?;
            }

            let src = shadergen.adaptive_blur_fragment_shader();
            let fs = c.shader(ShaderStage::Fragment, "downsample blur", &src)?;
            let blur_pass = c.pipeline(&GraphicsConfig {
                color_format: Some(TextureFormat::R8),
                ..screen_quad_config(screen_quad_vs, fs, ProgramDesc::AdaptiveDownsampleBlur)
            })?;

            let src = shadergen.adaptive_composite_fragment_shader();
            let fs = c.shader(ShaderStage::Fragment, "downsample composite", &src)?;
            let composite_pass =
                c.pipeline(&screen_quad_config(screen_quad_vs, fs, ProgramDesc::AdaptiveDownsampleComposite))?;

            DownsamplePipelines::Adaptive {
                first_pass: mip[1],
                mid_pass: mip[0],
                blur_pass,
                composite_pass,
            }
        }
        DownsampleMode::Box => {
            let factor = config.resolution_scale / config.box_downsample_scale.max(1);
            let src = shadergen.box_downsample_fragment_shader(factor);
            let fs = c.shader(ShaderStage::Fragment, "box downsample", &src)?;
            let program = ProgramDesc::BoxDownsample { factor };
            DownsamplePipelines::Box(c.pipeline(&screen_quad_config(screen_quad_vs, fs, program))?)
        }
        DownsampleMode::Disabled => DownsamplePipelines::None,
    };
    c.step();

    Ok(PipelineCache {
        batch_pipelines,
        wireframe,
        vram_fill,
        vram_copy,
        vram_write,
        vram_update_depth,
        vram_readback,
        display,
        downsample,
    })
}

impl<D: GpuDevice> HardwareRenderer<D> {
    pub(super) fn shader_gen_config(&self) -> ShaderGenConfig {
        let features = self.device.features();
        ShaderGenConfig {
            resolution_scale: self.config.resolution_scale,
            multisamples: self.config.multisamples,
            per_sample_shading: self.config.per_sample_shading,
            true_color: self.config.true_color,
            scaled_dithering: self.config.scaled_dithering,
            texture_filter: self.config.texture_filter,
            uv_limits: self.config.clamp_uvs,
            pgxp_depth: self.config.pgxp_depth_buffer,
            disable_color_perspective: self.config.disable_color_perspective,
            dual_source_blend: self.blend.supports_dual_source(),
            framebuffer_fetch: self.blend.supports_framebuffer_fetch(),
            use_texture_buffer: features.contains(DeviceFeatures::TEXTURE_BUFFERS),
        }
    }

    /// Build every pipeline for the current configuration. On failure all
    /// objects created by this call are destroyed again.
    pub(super) fn compile_pipelines(&mut self) -> GpuResult<()> {
        let gen = self.shader_gen_config();
        let config = self.config;
        let blend = self.blend;

        let mut compiler = PipelineCompiler::new(&mut self.device, self.host.as_mut());
        match build_pipelines(&mut compiler, self.shadergen.as_ref(), &gen, &config, blend) {
            Ok(cache) => {
                compiler.release_shaders();
                log::info!("HwRenderer: compiled {} batch pipelines", cache.batch_count());
                self.pipelines = Some(cache);
                Ok(())
            }
            Err(e) => {
                compiler.abandon();
                Err(e)
            }
        }
    }

    pub(super) fn destroy_pipelines(&mut self) {
        let Some(cache) = self.pipelines.take() else {
            return;
        };
        for pipeline in cache.handles() {
            self.device.destroy_pipeline(pipeline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(transparency_mode: TransparencyMode, render_mode: BatchRenderMode, texture_mode: TextureMode) -> PipelineKey {
        PipelineKey {
            depth_test: DepthTest::Always,
            render_mode,
            texture_mode,
            transparency_mode,
            dithering: false,
            interlacing: false,
        }
    }

    #[test]
    fn test_strategy_selection() {
        assert_eq!(BlendStrategy::select(DeviceFeatures::DUAL_SOURCE_BLEND), BlendStrategy::DualSource);
        assert_eq!(BlendStrategy::select(DeviceFeatures::empty()), BlendStrategy::TwoPass);
        assert_eq!(
            BlendStrategy::select(DeviceFeatures::FRAMEBUFFER_FETCH | DeviceFeatures::DUAL_SOURCE_BLEND),
            BlendStrategy::FramebufferFetch { dual_source: true }
        );
    }

    #[test]
    fn test_two_pass_requirements() {
        let bg_minus_fg = TransparencyMode::BackgroundMinusForeground;
        let add = TransparencyMode::BackgroundPlusForeground;
        let tex = TextureMode::Direct16Bit;

        assert!(BlendStrategy::DualSource.needs_two_pass(tex, bg_minus_fg));
        assert!(!BlendStrategy::DualSource.needs_two_pass(tex, add));
        assert!(!BlendStrategy::DualSource.needs_two_pass(TextureMode::Disabled, bg_minus_fg));
        assert!(BlendStrategy::TwoPass.needs_two_pass(tex, add));
        assert!(!BlendStrategy::FramebufferFetch { dual_source: false }.needs_two_pass(tex, bg_minus_fg));
    }

    #[test]
    fn test_shader_blending_requirements() {
        let fbfetch = BlendStrategy::FramebufferFetch { dual_source: false };
        assert!(fbfetch.needs_shader_blending(TransparencyMode::BackgroundPlusForeground, TextureFilter::Nearest));
        assert!(fbfetch.needs_shader_blending(TransparencyMode::Disabled, TextureFilter::Bilinear));
        assert!(!fbfetch.needs_shader_blending(TransparencyMode::Disabled, TextureFilter::Nearest));

        let both = BlendStrategy::FramebufferFetch { dual_source: true };
        assert!(both.needs_shader_blending(TransparencyMode::BackgroundMinusForeground, TextureFilter::Nearest));
        assert!(!both.needs_shader_blending(TransparencyMode::BackgroundPlusForeground, TextureFilter::Nearest));
        assert!(!BlendStrategy::DualSource.needs_shader_blending(
            TransparencyMode::BackgroundMinusForeground,
            TextureFilter::Nearest
        ));
    }

    #[test]
    fn test_batch_blend_states() {
        let k = key(
            TransparencyMode::BackgroundMinusForeground,
            BatchRenderMode::TransparentAndOpaque,
            TextureMode::Disabled,
        );
        let state = BlendStrategy::DualSource.batch_blend_state(&k, TextureFilter::Nearest, false);
        assert!(state.enable);
        assert_eq!(state.dst_factor, BlendFactor::Src1Alpha);
        assert_eq!(state.op, BlendOp::ReverseSubtract);

        let k = key(
            TransparencyMode::HalfBackgroundPlusHalfForeground,
            BatchRenderMode::OnlyTransparent,
            TextureMode::Palette4Bit,
        );
        let state = BlendStrategy::TwoPass.batch_blend_state(&k, TextureFilter::Nearest, false);
        assert_eq!(state.dst_factor, BlendFactor::ConstantColor);
        assert_eq!(state.constant, 0x0080_8080);

        let k = key(
            TransparencyMode::BackgroundPlusForeground,
            BatchRenderMode::OnlyOpaque,
            TextureMode::Palette4Bit,
        );
        assert!(!BlendStrategy::TwoPass.batch_blend_state(&k, TextureFilter::Nearest, false).enable);
        assert!(!BlendStrategy::DualSource
            .batch_blend_state(&key(TransparencyMode::BackgroundPlusForeground, BatchRenderMode::TransparentAndOpaque, TextureMode::Disabled), TextureFilter::Nearest, true)
            .enable);
    }

    #[test]
    fn test_compile_step_count() {
        assert_eq!(COMPILE_STEPS, 2900);
    }
}
