// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Batch accumulation and submission.
//!
//! Primitives that share a pipeline state are appended to one mapped region
//! of the device vertex buffer and drawn with a single call when the state
//! changes or something needs the render target to be up to date.

use rpsx_common::MAX_BATCH_VERTEX_COUNTER_IDS;

use super::HardwareRenderer;
use crate::backend::GpuDevice;
use crate::primitive::{PrimitiveKind, RenderFlags};
use crate::types::{
    BatchRenderMode, BatchUniforms, BatchVertex, DepthTest, PipelineKey, TextureMode, TransparencyMode,
};

/// Pipeline-selecting state shared by every vertex of the open batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    pub texture_mode: TextureMode,
    pub transparency_mode: TransparencyMode,
    pub dithering: bool,
    pub interlacing: bool,
    pub set_mask_while_drawing: bool,
    pub check_mask_before_draw: bool,
    pub use_depth_buffer: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            texture_mode: TextureMode::Disabled,
            transparency_mode: TransparencyMode::Disabled,
            dithering: false,
            interlacing: false,
            set_mask_while_drawing: false,
            check_mask_before_draw: false,
            use_depth_buffer: false,
        }
    }
}

impl BatchConfig {
    pub fn render_mode(&self) -> BatchRenderMode {
        BatchRenderMode::for_transparency(self.transparency_mode)
    }

    pub fn depth_test(&self) -> DepthTest {
        if self.use_depth_buffer {
            DepthTest::LessEqual
        } else if self.check_mask_before_draw {
            DepthTest::GreaterEqual
        } else {
            DepthTest::Always
        }
    }

    pub fn pipeline_key(&self, render_mode: BatchRenderMode) -> PipelineKey {
        PipelineKey {
            depth_test: self.depth_test(),
            render_mode,
            texture_mode: self.texture_mode,
            transparency_mode: self.transparency_mode,
            dithering: self.dithering,
            interlacing: self.interlacing,
        }
    }
}

/// The open batch: its state, uniforms, and the vertices written into the
/// currently mapped vertex buffer region.
///
/// Vertices are staged here and handed to the device on unmap. Writes past
/// the mapped space are rejected.
#[derive(Debug, Default)]
pub(crate) struct VertexBatch {
    pub(super) config: BatchConfig,
    pub(super) uniforms: BatchUniforms,
    pub(super) uniforms_dirty: bool,
    /// Worst-case vertex count of the command being decoded.
    pub(super) command_vertices: u32,
    vertices: Vec<BatchVertex>,
    base_vertex: u32,
    space: u32,
    mapped: bool,
}

impl VertexBatch {
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn len(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Vertices that still fit in the mapped region.
    pub fn space_left(&self) -> u32 {
        if self.mapped {
            self.space - self.len()
        } else {
            0
        }
    }

    pub fn map<D: GpuDevice>(&mut self, device: &mut D, required: u32) {
        debug_assert!(!self.mapped);
        let map = device.map_vertex_buffer(required);
        self.base_vertex = map.base_vertex;
        self.space = map.space;
        self.vertices.clear();
        self.mapped = true;
    }

    /// Release the mapping, handing the written vertices to the device.
    /// Returns `(count, base_vertex)` if a region was mapped.
    pub fn unmap<D: GpuDevice>(&mut self, device: &mut D) -> Option<(u32, u32)> {
        if !self.mapped {
            return None;
        }
        device.unmap_vertex_buffer(&self.vertices);
        let count = self.len();
        self.vertices.clear();
        self.mapped = false;
        Some((count, self.base_vertex))
    }

    /// Forget written vertices without releasing the mapping.
    pub fn discard(&mut self) {
        self.vertices.clear();
    }

    pub fn push(&mut self, vertex: BatchVertex) {
        if self.space_left() == 0 {
            log::error!("HwRenderer: vertex written outside the mapped batch region");
            debug_assert!(false, "batch overflow");
            return;
        }
        self.vertices.push(vertex);
    }

    pub fn reset_uniforms(&mut self) {
        self.uniforms = BatchUniforms::default();
        self.uniforms_dirty = true;
    }
}

impl<D: GpuDevice> HardwareRenderer<D> {
    /// Draw everything buffered so far.
    pub fn flush_render(&mut self) {
        let Some((vertex_count, base_vertex)) = self.batch.unmap(&mut self.device) else {
            return;
        };
        if vertex_count == 0 {
            return;
        }

        if self.batch.uniforms_dirty {
            self.device.upload_uniform_buffer(&self.batch.uniforms);
            self.stats.num_uniform_buffer_updates += 1;
            self.batch.uniforms_dirty = false;
        }

        let wireframe = self.config.wireframe_mode;
        if wireframe != rpsx_common::settings::WireframeMode::OnlyWireframe {
            if self.blend.needs_two_pass(self.batch.config.texture_mode, self.batch.config.transparency_mode) {
                self.stats.num_batches += 2;
                self.draw_batch_vertices(BatchRenderMode::OnlyOpaque, vertex_count, base_vertex);
                self.draw_batch_vertices(BatchRenderMode::OnlyTransparent, vertex_count, base_vertex);
            } else {
                self.stats.num_batches += 1;
                let mode = self.batch.config.render_mode();
                self.draw_batch_vertices(mode, vertex_count, base_vertex);
            }
        }

        if wireframe != rpsx_common::settings::WireframeMode::Disabled {
            if let Some(pipeline) = self.pipelines.as_ref().and_then(|p| p.wireframe) {
                self.stats.num_batches += 1;
                self.device.set_pipeline(pipeline);
                self.device.draw(vertex_count, base_vertex);
            }
        }
    }

    fn draw_batch_vertices(&mut self, render_mode: BatchRenderMode, vertex_count: u32, base_vertex: u32) {
        let key = self.batch.config.pipeline_key(render_mode);
        let Some(pipeline) = self.pipelines.as_ref().and_then(|p| p.batch(&key)) else {
            log::error!("HwRenderer: no pipeline for {:?}", key);
            return;
        };
        self.device.set_pipeline(pipeline);
        self.device.draw(vertex_count, base_vertex);
    }

    /// Make room for the worst case of the command being decoded, resetting
    /// the depth counter first if it would run out.
    pub(super) fn ensure_vertex_space_for_current_command(&mut self) {
        let required = self.batch.command_vertices;
        if self.current_depth + required > MAX_BATCH_VERTEX_COUNTER_IDS {
            self.reset_batch_vertex_depth();
        }

        if self.batch.is_mapped() {
            if self.batch.space_left() >= required {
                return;
            }
            self.flush_render();
        }

        self.batch.map(&mut self.device, required);
    }

    /// Switch the open batch between mask and geometry depth testing,
    /// splitting it if vertices were already written with the other mode.
    pub(super) fn set_batch_depth_buffer(&mut self, enabled: bool) {
        if self.batch.config.use_depth_buffer == enabled {
            return;
        }
        if !self.batch.is_empty() {
            self.flush_render();
            self.ensure_vertex_space_for_current_command();
        }
        self.batch.config.use_depth_buffer = enabled;
    }

    /// Bring the open batch in line with the state a primitive needs,
    /// flushing on any incompatible change, and reserve its vertex space.
    pub(super) fn dispatch_render_command(&mut self, kind: PrimitiveKind, flags: RenderFlags, required_vertices: u32) {
        self.batch.command_vertices = required_vertices;

        let texture_mode = if flags.contains(RenderFlags::TEXTURED) {
            if self.regs.draw_mode.is_texture_page_changed() {
                self.regs.draw_mode.clear_texture_page_changed();
                self.on_texture_page_changed();
            }
            let page = self.regs.draw_mode.texture_page;
            TextureMode::from_texpage_bits(page.color_mode_bits(), flags.contains(RenderFlags::RAW_TEXTURE))
        } else {
            TextureMode::Disabled
        };

        let transparency_mode = if flags.contains(RenderFlags::TRANSPARENT) {
            self.regs.draw_mode.texture_page.transparency_mode()
        } else {
            TransparencyMode::Disabled
        };
        let dithering = !self.config.true_color && kind.dithering_enabled(flags) && self.regs.dither_enable;
        let check_mask = self.regs.check_mask_before_draw;
        let set_mask = self.regs.set_mask_while_drawing;
        let interlacing = self.regs.interlaced_rendering;

        let current = self.batch.config;
        if texture_mode != current.texture_mode
            || transparency_mode != current.transparency_mode
            || (transparency_mode == TransparencyMode::BackgroundMinusForeground
                && !self.blend.supports_framebuffer_fetch())
            || dithering != current.dithering
            || check_mask != current.check_mask_before_draw
            || set_mask != current.set_mask_while_drawing
            || interlacing != current.interlacing
        {
            self.flush_render();
        }

        self.ensure_vertex_space_for_current_command();
        if !self.batch.is_empty() {
            return;
        }

        let uniforms = &mut self.batch.uniforms;
        let mut dirty = false;
        if transparency_mode != TransparencyMode::Disabled
            && (texture_mode == TextureMode::Disabled
                || !self.blend.needs_shader_blending(transparency_mode, self.config.texture_filter))
        {
            let (src, dst) = transparency_mode.alpha_factors();
            dirty |= uniforms.src_alpha_factor != src || uniforms.dst_alpha_factor != dst;
            uniforms.src_alpha_factor = src;
            uniforms.dst_alpha_factor = dst;
        }

        dirty |= uniforms.set_mask_while_drawing != set_mask;
        uniforms.set_mask_while_drawing = set_mask;

        if interlacing {
            let field = self.regs.active_line_lsb;
            dirty |= uniforms.interlaced_displayed_field != field;
            uniforms.interlaced_displayed_field = field;
        }

        if self.regs.draw_mode.is_texture_window_changed() {
            self.regs.draw_mode.clear_texture_window_changed();
            let window = self.regs.draw_mode.texture_window;
            uniforms.texture_window_and = window.and_mask();
            uniforms.texture_window_or = window.or_mask();
            dirty = true;
        }
        self.batch.uniforms_dirty |= dirty;

        let config = &mut self.batch.config;
        config.texture_mode = texture_mode;
        config.transparency_mode = transparency_mode;
        config.dithering = dithering;
        config.check_mask_before_draw = check_mask;
        config.set_mask_while_drawing = set_mask;
        config.interlacing = interlacing;

        if self.regs.drawing_area_changed {
            self.regs.drawing_area_changed = false;
            self.set_scissor();
            if self.config.pgxp_depth_buffer && self.last_depth_z < 1.0 {
                self.clear_depth_buffer();
            }
        }
    }
}
