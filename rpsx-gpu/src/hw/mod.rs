// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Hardware renderer.
//!
//! [`HardwareRenderer`] turns decoded drawing commands into batched
//! triangles and full-screen utility passes on a [`GpuDevice`]. VRAM lives
//! on the device as a scaled render target with a matching depth surface
//! that encodes the mask bit. Textured draws sample a second "read" copy of
//! VRAM, which is re-synchronized from the render target whenever a draw
//! would read texels written since the last copy.

mod batch;
mod depth;
mod display;
mod hazard;
mod pipelines;
mod primitives;
mod registers;
mod settings;
mod state;
mod surfaces;
mod transfer;

#[cfg(test)]
mod tests;

use rpsx_common::settings::Settings;
use rpsx_common::{GpuResult, Rect};

use crate::backend::{GpuDevice, TextureHandle};
use crate::host::{HostInterface, LogHost};
use crate::shadergen::{DefineShaderGen, ShaderGenerator};
use crate::vram::VramShadow;

pub use batch::BatchConfig;
pub use display::{DisplayConfig, DisplayOutput};
pub use pipelines::BlendStrategy;
pub use registers::{DrawingArea, DrawingOffset};
pub use settings::RenderConfig;

use batch::VertexBatch;
use pipelines::PipelineCache;
use registers::DrawRegisters;
use surfaces::Surfaces;

/// Per-frame counters, reset by [`HardwareRenderer::reset_stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub num_batches: u32,
    pub num_vram_read_texture_updates: u32,
    pub num_uniform_buffer_updates: u32,
    pub num_depth_buffer_rebuilds: u32,
}

pub struct HardwareRenderer<D: GpuDevice> {
    device: D,
    shadergen: Box<dyn ShaderGenerator>,
    host: Box<dyn HostInterface>,

    settings: Settings,
    config: RenderConfig,
    blend: BlendStrategy,

    surfaces: Option<Surfaces>,
    pipelines: Option<PipelineCache>,
    display_texture: Option<TextureHandle>,
    display_output: Option<DisplayOutput>,
    display_config: DisplayConfig,

    regs: DrawRegisters,
    vram_shadow: VramShadow,

    /// Native VRAM area written since the read texture was last synced.
    vram_dirty_rect: Rect,
    /// Texels the current batch may sample, when the texture page is dirty.
    current_uv_range: Rect,
    compute_uv_range: bool,
    texpage_dirty: bool,

    batch: VertexBatch,
    current_depth: u32,
    last_depth_z: f32,

    stats: RendererStats,
}

impl<D: GpuDevice> HardwareRenderer<D> {
    /// Create a renderer with the bundled shader generator, reporting
    /// notifications to the log.
    pub fn new(device: D, settings: &Settings) -> GpuResult<Self> {
        Self::with_host(device, Box::new(DefineShaderGen::new()), Box::new(LogHost), settings)
    }

    /// Create a renderer, compile every pipeline and allocate the VRAM
    /// surfaces. Everything created so far is released again on failure.
    pub fn with_host(
        device: D,
        shadergen: Box<dyn ShaderGenerator>,
        mut host: Box<dyn HostInterface>,
        settings: &Settings,
    ) -> GpuResult<Self> {
        let blend = BlendStrategy::select(device.features());
        let display_config = DisplayConfig::default();
        let config = RenderConfig::resolve(settings, &device, host.as_mut(), display_config.height);

        let mut renderer = Self {
            device,
            shadergen,
            host,
            settings: settings.clone(),
            config,
            blend,
            surfaces: None,
            pipelines: None,
            display_texture: None,
            display_output: None,
            display_config,
            regs: DrawRegisters::default(),
            vram_shadow: VramShadow::new(),
            vram_dirty_rect: Rect::INVALID,
            current_uv_range: Rect::INVALID,
            compute_uv_range: config.clamp_uvs,
            texpage_dirty: false,
            batch: VertexBatch::default(),
            current_depth: 1,
            last_depth_z: 1.0,
            stats: RendererStats::default(),
        };

        renderer.print_settings_to_log();
        if let Err(e) = renderer.compile_pipelines() {
            log::error!("HwRenderer: failed to compile pipelines: {}", e);
            return Err(e);
        }
        if let Err(e) = renderer.create_buffers() {
            log::error!("HwRenderer: failed to create framebuffer: {}", e);
            return Err(e);
        }
        renderer.restore_device_context();
        Ok(renderer)
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Effective configuration after device fallbacks.
    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn blend_strategy(&self) -> BlendStrategy {
        self.blend
    }

    pub fn resolution_scale(&self) -> u32 {
        self.config.resolution_scale
    }

    pub fn vram_shadow(&self) -> &VramShadow {
        &self.vram_shadow
    }

    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    /// Return the counters gathered since the last call and start over.
    pub fn take_stats(&mut self) -> RendererStats {
        std::mem::take(&mut self.stats)
    }

    pub fn reset_stats(&mut self) {
        self.stats = RendererStats::default();
    }

    /// Current depth-counter value used for mask emulation.
    pub fn current_depth(&self) -> u32 {
        self.current_depth
    }

    /// Native VRAM area not yet copied to the read texture.
    pub fn vram_dirty_rect(&self) -> Rect {
        self.vram_dirty_rect
    }

    /// Number of vertices buffered in the open batch.
    pub fn pending_vertices(&self) -> u32 {
        self.batch.len()
    }

    /// Drop pending work and return to power-on state, optionally clearing
    /// VRAM contents.
    pub fn reset(&mut self, clear_vram: bool) {
        log::debug!("HwRenderer: reset (clear_vram={})", clear_vram);
        self.batch.discard();
        self.vram_shadow.clear();
        self.regs = DrawRegisters::default();
        self.batch.config = BatchConfig::default();
        self.batch.reset_uniforms();
        self.current_depth = 1;

        if clear_vram {
            self.clear_framebuffer();
        }
    }

    /// Normalized depth of the current counter; newer draws are nearer 0.
    fn current_normalized_depth(&self) -> f32 {
        1.0 - self.current_depth as f32 / rpsx_common::MAX_BATCH_VERTEX_COUNTER_IDS as f32
    }

    fn is_using_multisampling(&self) -> bool {
        self.config.multisamples > 1
    }
}

impl<D: GpuDevice> Drop for HardwareRenderer<D> {
    fn drop(&mut self) {
        self.batch.unmap(&mut self.device);
        self.destroy_buffers();
        self.destroy_pipelines();
    }
}
