// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Graphics device abstraction.
//!
//! The engine talks to the GPU only through [`GpuDevice`]: object creation,
//! vertex/uniform uploads, copies, downloads and draws. Two devices are
//! provided: a null device that discards everything, and a reference device
//! that executes every pipeline program on the CPU.

pub mod null_backend;
pub mod reference;

use bitflags::bitflags;

pub use rpsx_common::error::ShaderStage;

use crate::types::{BatchUniforms, BatchVertex, InterlacedRenderMode, PipelineKey};

/// Backend type selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Null,
    Reference,
}

bitflags! {
    /// Optional device capabilities the engine adapts to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DeviceFeatures: u32 {
        const DUAL_SOURCE_BLEND = 1 << 0;
        const FRAMEBUFFER_FETCH = 1 << 1;
        const PER_SAMPLE_SHADING = 1 << 2;
        const NOPERSPECTIVE_INTERPOLATION = 1 << 3;
        const GEOMETRY_SHADERS = 1 << 4;
        const PARTIAL_MSAA_RESOLVE = 1 << 5;
        const TEXTURE_COPY_TO_SELF = 1 << 6;
        const TEXTURE_BUFFERS = 1 << 7;
    }
}

// ── Object handles ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub u32);

// ── Textures ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8,
    R8,
    D16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    Texture,
    RenderTarget,
    DepthStencil,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub samples: u32,
    pub kind: TextureKind,
    pub format: TextureFormat,
}

impl TextureDesc {
    pub fn new(width: u32, height: u32, kind: TextureKind, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            levels: 1,
            samples: 1,
            kind,
            format,
        }
    }

    pub fn with_levels(mut self, levels: u32) -> Self {
        self.levels = levels;
        self
    }

    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    Nearest,
    Linear,
    /// Linear within a level, nearest between levels.
    LinearMipNearest,
}

// ── Pipeline description ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepthFunc {
    Always,
    GreaterEqual,
    LessEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthState {
    pub func: DepthFunc,
    pub write: bool,
}

impl DepthState {
    pub const DISABLED: Self = Self {
        func: DepthFunc::Always,
        write: false,
    };

    pub const ALWAYS_WRITE: Self = Self {
        func: DepthFunc::Always,
        write: true,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    InvSrcAlpha,
    Src1Alpha,
    ConstantColor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    ReverseSubtract,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub enable: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub op: BlendOp,
    /// Packed RGBA8 constant for [`BlendFactor::ConstantColor`].
    pub constant: u32,
    /// RGBA write mask, bit 0 = red.
    pub write_mask: u8,
}

impl BlendState {
    pub const NO_BLENDING: Self = Self {
        enable: false,
        src_factor: BlendFactor::One,
        dst_factor: BlendFactor::Zero,
        op: BlendOp::Add,
        constant: 0,
        write_mask: 0xF,
    };
}

/// Which specialization options the batch shaders were generated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BatchShaderOptions {
    pub true_color: bool,
    pub scaled_dithering: bool,
    pub clamp_uvs: bool,
    pub pgxp_depth: bool,
    /// Blending is done in the fragment shader from the framebuffer value.
    pub shader_blending: bool,
}

/// What a pipeline's programs implement.
///
/// Devices that compile the generated program text may ignore this; devices
/// that interpret pipelines directly (the reference device) execute it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramDesc {
    Batch {
        key: PipelineKey,
        options: BatchShaderOptions,
    },
    Wireframe,
    VramFill {
        wrapped: bool,
        interlaced: bool,
    },
    VramCopy,
    VramWrite,
    VramUpdateDepth,
    VramReadback,
    Display {
        depth_24bit: bool,
        interlace: InterlacedRenderMode,
        chroma_smoothing: bool,
    },
    AdaptiveDownsampleMip {
        first_pass: bool,
    },
    AdaptiveDownsampleBlur,
    AdaptiveDownsampleComposite,
    BoxDownsample {
        factor: u32,
    },
}

/// Vertex input of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// Full-screen triangle generated from the vertex index.
    None,
    /// [`BatchVertex`] stream.
    Batch { textured: bool, uv_limits: bool },
}

/// A graphics pipeline description.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsConfig {
    pub layout: VertexLayout,
    pub vertex_shader: ShaderHandle,
    pub geometry_shader: Option<ShaderHandle>,
    pub fragment_shader: ShaderHandle,
    pub depth: DepthState,
    pub blend: BlendState,
    pub color_format: Option<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
    pub samples: u32,
    pub per_sample_shading: bool,
    pub program: ProgramDesc,
}

// ── Push constants ───────────────────────────────────────────────────────────

/// Small per-draw constants for the utility programs. Coordinates are in
/// render-target pixels unless noted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PushConstants {
    VramFill {
        dst_x: u32,
        dst_y: u32,
        end_x: u32,
        end_y: u32,
        /// Packed RGBA8; alpha carries the mask bit.
        color: u32,
        interlaced_displayed_field: u32,
    },
    /// Native VRAM coordinates; the source is the last uploaded texture buffer.
    VramWrite {
        base_x: u32,
        base_y: u32,
        end_x: u32,
        end_y: u32,
        width: u32,
        height: u32,
        buffer_base_offset: u32,
        mask_or_bits: u16,
        depth_value: f32,
    },
    VramCopy {
        src_x: u32,
        src_y: u32,
        dst_x: u32,
        dst_y: u32,
        end_x: u32,
        end_y: u32,
        width: u32,
        height: u32,
        set_mask_bit: bool,
        depth_value: f32,
    },
    /// Native VRAM coordinates.
    VramReadback {
        left: u32,
        top: u32,
        width: u32,
        height: u32,
    },
    Display {
        vram_offset_x: u32,
        vram_offset_y: u32,
        crop_left: u32,
        field_offset: u32,
    },
    Downsample {
        lod: u32,
    },
}

/// Vertex buffer space returned by [`GpuDevice::map_vertex_buffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferMap {
    /// Index of the first vertex written in this mapping.
    pub base_vertex: u32,
    /// Number of vertices that fit.
    pub space: u32,
}

/// The graphics device the engine renders through.
pub trait GpuDevice: Send {
    fn name(&self) -> &str;

    fn features(&self) -> DeviceFeatures;

    fn max_texture_size(&self) -> u32;

    fn max_multisamples(&self) -> u32;

    /// Height of the presentation surface, used for automatic scaling.
    fn window_height(&self) -> u32 {
        480
    }

    // Objects

    fn create_texture(&mut self, desc: &TextureDesc) -> Option<TextureHandle>;

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc>;

    fn create_shader(&mut self, stage: ShaderStage, name: &str, source: &str) -> Option<ShaderHandle>;

    fn destroy_shader(&mut self, shader: ShaderHandle);

    fn create_pipeline(&mut self, config: &GraphicsConfig) -> Option<PipelineHandle>;

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle);

    // Streaming uploads

    /// Reserve space for at least `required` vertices. The returned space may
    /// be smaller only if the device cannot ever hold `required` vertices.
    fn map_vertex_buffer(&mut self, required: u32) -> VertexBufferMap;

    /// Make the vertices written since the last map visible to draws.
    fn unmap_vertex_buffer(&mut self, vertices: &[BatchVertex]);

    /// Upload 16-bit pixels for a VRAM write; returns the element offset.
    fn upload_texture_buffer(&mut self, data: &[u16]) -> Option<u32>;

    fn upload_uniform_buffer(&mut self, uniforms: &BatchUniforms);

    fn push_constants(&mut self, constants: &PushConstants);

    // State

    fn set_pipeline(&mut self, pipeline: PipelineHandle);

    fn set_render_target(&mut self, color: Option<TextureHandle>, depth: Option<TextureHandle>);

    fn set_texture(&mut self, slot: u32, texture: Option<TextureHandle>, sampler: SamplerKind);

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32);

    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32);

    fn set_viewport_and_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.set_viewport(x, y, width, height);
        self.set_scissor(x, y, width, height);
    }

    // Commands

    fn draw(&mut self, vertex_count: u32, base_vertex: u32);

    fn clear_render_target(&mut self, texture: TextureHandle, color: u32);

    fn clear_depth(&mut self, texture: TextureHandle, depth: f32);

    fn invalidate_render_target(&mut self, _texture: TextureHandle) {}

    #[allow(clippy::too_many_arguments)]
    fn copy_texture_region(
        &mut self,
        dst: TextureHandle,
        dst_x: u32,
        dst_y: u32,
        dst_level: u32,
        src: TextureHandle,
        src_x: u32,
        src_y: u32,
        src_level: u32,
        width: u32,
        height: u32,
    );

    #[allow(clippy::too_many_arguments)]
    fn resolve_texture_region(
        &mut self,
        dst: TextureHandle,
        dst_x: u32,
        dst_y: u32,
        src: TextureHandle,
        src_x: u32,
        src_y: u32,
        width: u32,
        height: u32,
    );

    /// Read back RGBA8 texels into `out`, row-major with `width` texels per row.
    #[allow(clippy::too_many_arguments)]
    fn download_texture(
        &mut self,
        texture: TextureHandle,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        out: &mut [u32],
    ) -> bool;
}

impl<T: GpuDevice + ?Sized> GpuDevice for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }
    fn features(&self) -> DeviceFeatures {
        (**self).features()
    }
    fn max_texture_size(&self) -> u32 {
        (**self).max_texture_size()
    }
    fn max_multisamples(&self) -> u32 {
        (**self).max_multisamples()
    }
    fn window_height(&self) -> u32 {
        (**self).window_height()
    }
    fn create_texture(&mut self, desc: &TextureDesc) -> Option<TextureHandle> {
        (**self).create_texture(desc)
    }
    fn destroy_texture(&mut self, texture: TextureHandle) {
        (**self).destroy_texture(texture)
    }
    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        (**self).texture_desc(texture)
    }
    fn create_shader(&mut self, stage: ShaderStage, name: &str, source: &str) -> Option<ShaderHandle> {
        (**self).create_shader(stage, name, source)
    }
    fn destroy_shader(&mut self, shader: ShaderHandle) {
        (**self).destroy_shader(shader)
    }
    fn create_pipeline(&mut self, config: &GraphicsConfig) -> Option<PipelineHandle> {
        (**self).create_pipeline(config)
    }
    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        (**self).destroy_pipeline(pipeline)
    }
    fn map_vertex_buffer(&mut self, required: u32) -> VertexBufferMap {
        (**self).map_vertex_buffer(required)
    }
    fn unmap_vertex_buffer(&mut self, vertices: &[BatchVertex]) {
        (**self).unmap_vertex_buffer(vertices)
    }
    fn upload_texture_buffer(&mut self, data: &[u16]) -> Option<u32> {
        (**self).upload_texture_buffer(data)
    }
    fn upload_uniform_buffer(&mut self, uniforms: &BatchUniforms) {
        (**self).upload_uniform_buffer(uniforms)
    }
    fn push_constants(&mut self, constants: &PushConstants) {
        (**self).push_constants(constants)
    }
    fn set_pipeline(&mut self, pipeline: PipelineHandle) {
        (**self).set_pipeline(pipeline)
    }
    fn set_render_target(&mut self, color: Option<TextureHandle>, depth: Option<TextureHandle>) {
        (**self).set_render_target(color, depth)
    }
    fn set_texture(&mut self, slot: u32, texture: Option<TextureHandle>, sampler: SamplerKind) {
        (**self).set_texture(slot, texture, sampler)
    }
    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        (**self).set_viewport(x, y, width, height)
    }
    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        (**self).set_scissor(x, y, width, height)
    }
    fn draw(&mut self, vertex_count: u32, base_vertex: u32) {
        (**self).draw(vertex_count, base_vertex)
    }
    fn clear_render_target(&mut self, texture: TextureHandle, color: u32) {
        (**self).clear_render_target(texture, color)
    }
    fn clear_depth(&mut self, texture: TextureHandle, depth: f32) {
        (**self).clear_depth(texture, depth)
    }
    fn invalidate_render_target(&mut self, texture: TextureHandle) {
        (**self).invalidate_render_target(texture)
    }
    fn copy_texture_region(
        &mut self,
        dst: TextureHandle,
        dst_x: u32,
        dst_y: u32,
        dst_level: u32,
        src: TextureHandle,
        src_x: u32,
        src_y: u32,
        src_level: u32,
        width: u32,
        height: u32,
    ) {
        (**self).copy_texture_region(dst, dst_x, dst_y, dst_level, src, src_x, src_y, src_level, width, height)
    }
    fn resolve_texture_region(
        &mut self,
        dst: TextureHandle,
        dst_x: u32,
        dst_y: u32,
        src: TextureHandle,
        src_x: u32,
        src_y: u32,
        width: u32,
        height: u32,
    ) {
        (**self).resolve_texture_region(dst, dst_x, dst_y, src, src_x, src_y, width, height)
    }
    fn download_texture(
        &mut self,
        texture: TextureHandle,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        out: &mut [u32],
    ) -> bool {
        (**self).download_texture(texture, x, y, width, height, out)
    }
}
