// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Reference device that executes every pipeline program on the CPU.
//!
//! Pipelines are interpreted from their [`ProgramDesc`] instead of compiling
//! shader text. Triangles are rasterized with edge functions at pixel
//! centers using a top-left fill rule, attributes are interpolated with
//! barycentric coordinates (perspective-correct when `w` varies), and the
//! batch program reproduces the console's texel fetch, modulation, dithering,
//! semi-transparency and mask-bit depth semantics.
//!
//! Multisampled textures are stored with one sample per pixel; resolves are
//! plain copies.
//!
//! Every texel carries a write generation. When a batch or copy samples the
//! read texture, the device compares the sampled texel's generation against
//! the render target's generation at the same position; a mismatch written
//! by an earlier draw is counted as a stale sample.

use std::collections::HashMap;

use rpsx_common::{
    expand5, pack_rgba8, rgba5551_to_rgba8888, rgba8888_to_rgba5551, unpack_rgba8, VRAM_HEIGHT,
    VRAM_WIDTH,
};

use super::{
    DepthFunc, DeviceFeatures, GpuDevice, GraphicsConfig, PipelineHandle, ProgramDesc,
    PushConstants, SamplerKind, ShaderHandle, ShaderStage, TextureDesc, TextureFormat,
    TextureHandle, VertexBufferMap,
};
use crate::draw_mode::{apply_texture_window, split_texpage_word};
use crate::types::{
    unpack_uv_limits, BatchRenderMode, BatchUniforms, BatchVertex, InterlacedRenderMode,
    PipelineKey, TextureColorMode, TransparencyMode,
};

/// Default vertex buffer size in vertices.
pub const DEFAULT_VERTEX_CAPACITY: u32 = 1 << 16;

/// Console dither offsets, indexed `[y & 3][x & 3]`.
const DITHER_MATRIX: [[i32; 4]; 4] = [[-4, 0, -3, 1], [2, -2, 3, -1], [-3, 1, -4, 0], [3, -1, 2, -2]];

// ── Storage ──────────────────────────────────────────────────────────────────

struct Level {
    width: u32,
    height: u32,
    color: Vec<u32>,
    depth: Vec<f32>,
    gens: Vec<u64>,
}

impl Level {
    fn new(width: u32, height: u32, format: TextureFormat) -> Self {
        let n = (width * height) as usize;
        let (color, depth) = match format {
            TextureFormat::D16 => (Vec::new(), vec![0.0; n]),
            TextureFormat::Rgba8 | TextureFormat::R8 => (vec![0; n], Vec::new()),
        };
        Self {
            width,
            height,
            color,
            depth,
            gens: vec![0; n],
        }
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize
    }

    #[inline]
    fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }
}

struct Texture {
    desc: TextureDesc,
    levels: Vec<Level>,
}

impl Texture {
    fn new(desc: TextureDesc) -> Self {
        let levels = (0..desc.levels.max(1))
            .map(|l| Level::new((desc.width >> l).max(1), (desc.height >> l).max(1), desc.format))
            .collect();
        Self { desc, levels }
    }

    fn level(&self, level: u32) -> Option<&Level> {
        self.levels.get(level as usize)
    }

    /// VRAM scale factor of a surface sized in multiples of VRAM.
    fn vram_scale(&self) -> u32 {
        (self.desc.width / VRAM_WIDTH).max(1)
    }

    /// Color at a native VRAM coordinate with a sub-texel offset, plus its
    /// write generation.
    #[inline]
    fn fetch_vram(&self, x: u32, y: u32, sub_x: u32, sub_y: u32) -> (u32, u64) {
        let scale = self.vram_scale();
        let level = &self.levels[0];
        let px = (x & (VRAM_WIDTH - 1)) * scale + sub_x.min(scale - 1);
        let py = (y & (VRAM_HEIGHT - 1)) * scale + sub_y.min(scale - 1);
        if !level.contains(px, py) {
            return (0, 0);
        }
        let i = level.index(px, py);
        (level.color[i], level.gens[i])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Region {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// Counters exposed for tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferenceStats {
    pub draw_calls: u64,
    pub triangles: u64,
    pub copies: u64,
    pub downloads: u64,
    pub stale_samples: u64,
}

#[derive(Debug, Clone, Copy)]
struct Interp {
    r: f32,
    g: f32,
    b: f32,
    u: f32,
    v: f32,
    z: f32,
    w: f32,
}

pub struct ReferenceDevice {
    features: DeviceFeatures,
    max_texture_size: u32,
    max_multisamples: u32,
    window_height: u32,

    next_handle: u32,
    textures: HashMap<u32, Texture>,
    shaders: HashMap<u32, ShaderStage>,
    pipelines: HashMap<u32, GraphicsConfig>,
    pipeline_budget: Option<usize>,
    pipelines_created: usize,

    vertex_capacity: u32,
    vertices: Vec<BatchVertex>,
    texture_buffer: Vec<u16>,
    uniforms: BatchUniforms,
    push: Option<PushConstants>,

    current_pipeline: Option<u32>,
    color_target: Option<TextureHandle>,
    depth_target: Option<TextureHandle>,
    bound: [Option<TextureHandle>; 2],
    viewport: Region,
    scissor: Region,

    generation: u64,
    stats: ReferenceStats,
}

impl ReferenceDevice {
    /// A device with dual-source blending, texture buffers and copy-to-self,
    /// the common desktop feature set.
    pub fn new() -> Self {
        Self::with_features(
            DeviceFeatures::DUAL_SOURCE_BLEND
                | DeviceFeatures::PER_SAMPLE_SHADING
                | DeviceFeatures::NOPERSPECTIVE_INTERPOLATION
                | DeviceFeatures::GEOMETRY_SHADERS
                | DeviceFeatures::PARTIAL_MSAA_RESOLVE
                | DeviceFeatures::TEXTURE_COPY_TO_SELF
                | DeviceFeatures::TEXTURE_BUFFERS,
        )
    }

    pub fn with_features(features: DeviceFeatures) -> Self {
        Self {
            features,
            max_texture_size: 8192,
            max_multisamples: 8,
            window_height: 480,
            next_handle: 1,
            textures: HashMap::new(),
            shaders: HashMap::new(),
            pipelines: HashMap::new(),
            pipeline_budget: None,
            pipelines_created: 0,
            vertex_capacity: DEFAULT_VERTEX_CAPACITY,
            vertices: Vec::new(),
            texture_buffer: Vec::new(),
            uniforms: BatchUniforms::default(),
            push: None,
            current_pipeline: None,
            color_target: None,
            depth_target: None,
            bound: [None; 2],
            viewport: Region::default(),
            scissor: Region::default(),
            generation: 0,
            stats: ReferenceStats::default(),
        }
    }

    pub fn set_vertex_capacity(&mut self, capacity: u32) {
        self.vertex_capacity = capacity;
        self.vertices.clear();
    }

    pub fn set_max_multisamples(&mut self, samples: u32) {
        self.max_multisamples = samples;
    }

    pub fn set_max_texture_size(&mut self, size: u32) {
        self.max_texture_size = size;
    }

    pub fn set_window_height(&mut self, height: u32) {
        self.window_height = height;
    }

    /// Fail pipeline creation once `budget` pipelines have been created.
    pub fn set_pipeline_budget(&mut self, budget: Option<usize>) {
        self.pipeline_budget = budget;
    }

    pub fn stats(&self) -> ReferenceStats {
        self.stats
    }

    pub fn live_pipelines(&self) -> usize {
        self.pipelines.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.shaders.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    fn alloc_handle(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn take(&mut self, handle: Option<TextureHandle>) -> Option<(u32, Texture)> {
        let id = handle?.0;
        self.textures.remove(&id).map(|t| (id, t))
    }

    fn put_back(&mut self, texture: Option<(u32, Texture)>) {
        if let Some((id, tex)) = texture {
            self.textures.insert(id, tex);
        }
    }

    fn bound_texture(&self, slot: usize) -> Option<&Texture> {
        self.bound.get(slot).copied().flatten().and_then(|h| self.textures.get(&h.0))
    }

    /// Viewport ∩ scissor ∩ surface bounds, as `(x0, y0, x1, y1)`.
    fn clip(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x0 = self.viewport.x.max(self.scissor.x);
        let y0 = self.viewport.y.max(self.scissor.y);
        let x1 = (self.viewport.x + self.viewport.width)
            .min(self.scissor.x + self.scissor.width)
            .min(width);
        let y1 = (self.viewport.y + self.viewport.height)
            .min(self.scissor.y + self.scissor.height)
            .min(height);
        (x0 < x1 && y0 < y1).then_some((x0, y0, x1, y1))
    }

    // ── Batch program ────────────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    fn draw_batch(
        &mut self,
        config: &GraphicsConfig,
        key: PipelineKey,
        options: super::BatchShaderOptions,
        color: &mut Texture,
        mut depth: Option<&mut Texture>,
        vertex_count: u32,
        base_vertex: u32,
    ) {
        let start = base_vertex as usize;
        let end = (start + vertex_count as usize).min(self.vertices.len());
        if start >= end {
            return;
        }
        let Some((cx0, cy0, cx1, cy1)) = self.clip(color.levels[0].width, color.levels[0].height) else {
            return;
        };
        let scale_x = self.viewport.width as f64 / VRAM_WIDTH as f64;
        let scale_y = self.viewport.height as f64 / VRAM_HEIGHT as f64;
        let scale = color.vram_scale();
        let uniforms = self.uniforms;

        let tris: Vec<[BatchVertex; 3]> = self.vertices[start..end]
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();

        for tri in tris {
            let gen = self.next_generation();
            self.stats.triangles += 1;

            let mut p = [(0.0f64, 0.0f64); 3];
            for (i, v) in tri.iter().enumerate() {
                p[i] = (
                    self.viewport.x as f64 + v.x as f64 * scale_x,
                    self.viewport.y as f64 + v.y as f64 * scale_y,
                );
            }
            let mut order = [0usize, 1, 2];
            let mut area = edge(p[0], p[1], p[2]);
            if area == 0.0 {
                continue;
            }
            if area < 0.0 {
                order = [0, 2, 1];
                area = -area;
            }
            let (q0, q1, q2) = (p[order[0]], p[order[1]], p[order[2]]);
            let (t0, t1, t2) = (tri[order[0]], tri[order[1]], tri[order[2]]);

            let min_x = q0.0.min(q1.0).min(q2.0).floor().max(cx0 as f64) as u32;
            let min_y = q0.1.min(q1.1).min(q2.1).floor().max(cy0 as f64) as u32;
            let max_x = (q0.0.max(q1.0).max(q2.0).ceil() as i64).clamp(0, cx1 as i64) as u32;
            let max_y = (q0.1.max(q1.1).max(q2.1).ceil() as i64).clamp(0, cy1 as i64) as u32;

            let tl0 = is_top_left(q1, q2);
            let tl1 = is_top_left(q2, q0);
            let tl2 = is_top_left(q0, q1);

            for py in min_y..max_y {
                for px in min_x..max_x {
                    let c = (px as f64 + 0.5, py as f64 + 0.5);
                    let w0 = edge(q1, q2, c);
                    let w1 = edge(q2, q0, c);
                    let w2 = edge(q0, q1, c);
                    if !inside(w0, tl0) || !inside(w1, tl1) || !inside(w2, tl2) {
                        continue;
                    }
                    let b = [w0 / area, w1 / area, w2 / area];
                    let attrs = interpolate(&[t0, t1, t2], b);
                    self.shade_batch_pixel(
                        config, key, options, &uniforms, &t0, attrs, px, py, scale, gen, color,
                        depth.as_deref_mut(),
                    );
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn shade_batch_pixel(
        &mut self,
        config: &GraphicsConfig,
        key: PipelineKey,
        options: super::BatchShaderOptions,
        uniforms: &BatchUniforms,
        provoking: &BatchVertex,
        attrs: Interp,
        px: u32,
        py: u32,
        scale: u32,
        gen: u64,
        color: &mut Texture,
        depth: Option<&mut Texture>,
    ) {
        let nx = px / scale;
        let ny = py / scale;
        if key.interlacing && (ny & 1) == uniforms.interlaced_displayed_field {
            return;
        }

        let transparency_enabled = key.transparency_mode != TransparencyMode::Disabled;
        let mut rgb: [i32; 3];
        let semi_transparent;
        let mask_out;

        if let Some(color_mode) = key.texture_mode.color_mode() {
            let mut u = attrs.u.floor() as i32;
            let mut v = attrs.v.floor() as i32;
            if options.clamp_uvs {
                let (min_u, min_v, max_u, max_v) = unpack_uv_limits(provoking.uv_limits);
                u = u.clamp(min_u as i32, max_u as i32);
                v = v.clamp(min_v as i32, max_v as i32);
            }
            let u = apply_texture_window(
                (u as u32) & 0xFF,
                uniforms.texture_window_and[0],
                uniforms.texture_window_or[0],
            );
            let v = apply_texture_window(
                (v as u32) & 0xFF,
                uniforms.texture_window_and[1],
                uniforms.texture_window_or[1],
            );
            let sub_x = ((attrs.u - attrs.u.floor()) * scale as f32) as u32;
            let sub_y = ((attrs.v - attrs.v.floor()) * scale as f32) as u32;
            let texel = self.sample_texel(provoking.texpage, color_mode, u, v, sub_x, sub_y, gen, color);
            if texel == 0 {
                return;
            }
            semi_transparent = transparency_enabled && texel & 0x8000 != 0;
            mask_out = uniforms.set_mask_while_drawing || texel & 0x8000 != 0;
            let t = [
                (texel as u32 & 31) as i32,
                ((texel as u32 >> 5) & 31) as i32,
                ((texel as u32 >> 10) & 31) as i32,
            ];
            rgb = [0; 3];
            let vc = [attrs.r, attrs.g, attrs.b];
            for i in 0..3 {
                rgb[i] = if key.texture_mode.is_raw() {
                    t[i] << 3
                } else {
                    (((t[i] << 3) * vc[i].round() as i32) >> 7).min(255)
                };
            }
        } else {
            semi_transparent = transparency_enabled;
            mask_out = uniforms.set_mask_while_drawing;
            rgb = [attrs.r.round() as i32, attrs.g.round() as i32, attrs.b.round() as i32];
        }

        match key.render_mode {
            BatchRenderMode::OnlyOpaque if semi_transparent => return,
            BatchRenderMode::OnlyTransparent if !semi_transparent => return,
            _ => {}
        }
        let blend = semi_transparent && key.render_mode != BatchRenderMode::TransparencyDisabled;

        if key.dithering && !options.true_color {
            let (dx, dy) = if options.scaled_dithering { (nx, ny) } else { (px, py) };
            let d = DITHER_MATRIX[(dy & 3) as usize][(dx & 3) as usize];
            for c in rgb.iter_mut() {
                *c = (*c + d).clamp(0, 255);
            }
        }

        // Depth test and write.
        let frag_depth = if options.pgxp_depth {
            attrs.w.clamp(0.0, 1.0)
        } else if mask_out {
            attrs.z
        } else {
            0.0
        };
        if let Some(depth) = depth {
            let level = &mut depth.levels[0];
            if level.contains(px, py) {
                let i = level.index(px, py);
                if !depth_passes(config.depth.func, frag_depth, level.depth[i]) {
                    return;
                }
                if config.depth.write {
                    level.depth[i] = frag_depth;
                    level.gens[i] = gen;
                }
            }
        }

        let level = &mut color.levels[0];
        let i = level.index(px, py);
        let bg = unpack_rgba8(level.color[i]);
        let out = if options.true_color {
            let mut out = [0u8; 3];
            for c in 0..3 {
                let f = rgb[c];
                let b = bg[c] as i32;
                let v = if blend { blend_channel(key.transparency_mode, b, f, 255) } else { f };
                out[c] = v.clamp(0, 255) as u8;
            }
            out
        } else {
            let mut out = [0u8; 3];
            for c in 0..3 {
                let f = rgb[c] >> 3;
                let b = bg[c] as i32 >> 3;
                let v = if blend { blend_channel(key.transparency_mode, b, f, 31) } else { f };
                out[c] = expand5(v.clamp(0, 31) as u32) as u8;
            }
            out
        };
        let alpha = if mask_out { 0xFF } else { 0 };
        level.color[i] = pack_rgba8([out[0], out[1], out[2], alpha]);
        level.gens[i] = gen;
    }

    /// Fetch a 16-bit texel through the texpage/palette of the primitive,
    /// auditing every read against the render target.
    #[allow(clippy::too_many_arguments)]
    fn sample_texel(
        &mut self,
        texpage: u32,
        mode: TextureColorMode,
        u: u32,
        v: u32,
        sub_x: u32,
        sub_y: u32,
        gen: u64,
        target: &Texture,
    ) -> u16 {
        let (page, palette) = split_texpage_word(texpage);
        let Some(read) = self.bound_texture(0) else {
            return 0;
        };
        let mut stale = 0;
        let mut fetch = |x: u32, y: u32, sx: u32, sy: u32| -> u16 {
            let (value, src_gen) = read.fetch_vram(x, y, sx, sy);
            let (_, dst_gen) = target.fetch_vram(x, y, sx, sy);
            if read.desc.width == target.desc.width && dst_gen != src_gen && dst_gen < gen {
                stale += 1;
            }
            rgba8888_to_rgba5551(value)
        };
        let base_y = page.base_y() + v;
        let texel = match mode {
            TextureColorMode::Palette4Bit => {
                let raw = fetch(page.base_x() + u / 4, base_y, 0, 0);
                let index = (raw as u32 >> ((u & 3) * 4)) & 0xF;
                fetch(palette.x() + index, palette.y(), 0, 0)
            }
            TextureColorMode::Palette8Bit => {
                let raw = fetch(page.base_x() + u / 2, base_y, 0, 0);
                let index = (raw as u32 >> ((u & 1) * 8)) & 0xFF;
                fetch(palette.x() + index, palette.y(), 0, 0)
            }
            TextureColorMode::Direct16Bit => fetch(page.base_x() + u, base_y, sub_x, sub_y),
        };
        self.stats.stale_samples += stale;
        texel
    }

    fn draw_wireframe(&mut self, color: &mut Texture, vertex_count: u32, base_vertex: u32) {
        let start = base_vertex as usize;
        let end = (start + vertex_count as usize).min(self.vertices.len());
        let Some((cx0, cy0, cx1, cy1)) = self.clip(color.levels[0].width, color.levels[0].height) else {
            return;
        };
        let scale_x = self.viewport.width as f32 / VRAM_WIDTH as f32;
        let scale_y = self.viewport.height as f32 / VRAM_HEIGHT as f32;
        let gen = self.next_generation();
        let level = &mut color.levels[0];
        for tri in self.vertices[start.min(end)..end].chunks_exact(3) {
            for (a, b) in [(0, 1), (1, 2), (2, 0)] {
                let (x0, y0) = (tri[a].x * scale_x, tri[a].y * scale_y);
                let (x1, y1) = (tri[b].x * scale_x, tri[b].y * scale_y);
                let steps = (x1 - x0).abs().max((y1 - y0).abs()).ceil().max(1.0) as u32;
                for s in 0..=steps {
                    let t = s as f32 / steps as f32;
                    let x = (x0 + (x1 - x0) * t).floor();
                    let y = (y0 + (y1 - y0) * t).floor();
                    if x < cx0 as f32 || y < cy0 as f32 || x >= cx1 as f32 || y >= cy1 as f32 {
                        continue;
                    }
                    let i = level.index(x as u32, y as u32);
                    level.color[i] = (level.color[i] & 0xFF00_0000) | 0x00FF_FFFF;
                    level.gens[i] = gen;
                }
            }
        }
    }

    // ── Utility programs ─────────────────────────────────────────────────────

    fn draw_fill(&mut self, config: &GraphicsConfig, wrapped: bool, interlaced: bool, color: &mut Texture, depth: Option<&mut Texture>) {
        let Some(PushConstants::VramFill {
            dst_x,
            dst_y,
            end_x,
            end_y,
            color: fill,
            interlaced_displayed_field,
        }) = self.push
        else {
            return;
        };
        let Some((x0, y0, x1, y1)) = self.clip(color.levels[0].width, color.levels[0].height) else {
            return;
        };
        let scale = color.vram_scale();
        let gen = self.next_generation();
        let fill_depth = if fill >> 31 != 0 { 1.0 } else { 0.0 };
        let mut depth = depth;
        for py in y0..y1 {
            if interlaced && ((py / scale) & 1) == interlaced_displayed_field {
                continue;
            }
            for px in x0..x1 {
                if wrapped && ((px < dst_x && px >= end_x) || (py < dst_y && py >= end_y)) {
                    continue;
                }
                if !write_depth(config, depth.as_deref_mut(), px, py, fill_depth, gen) {
                    continue;
                }
                let level = &mut color.levels[0];
                let i = level.index(px, py);
                level.color[i] = fill;
                level.gens[i] = gen;
            }
        }
    }

    fn draw_vram_write(&mut self, config: &GraphicsConfig, color: &mut Texture, depth: Option<&mut Texture>) {
        let Some(PushConstants::VramWrite {
            base_x,
            base_y,
            end_x,
            end_y,
            width,
            height,
            buffer_base_offset,
            mask_or_bits,
            depth_value,
        }) = self.push
        else {
            return;
        };
        let Some((x0, y0, x1, y1)) = self.clip(color.levels[0].width, color.levels[0].height) else {
            return;
        };
        let scale = color.vram_scale();
        let gen = self.next_generation();
        let mut depth = depth;
        for py in y0..y1 {
            for px in x0..x1 {
                let (nx, ny) = (px / scale, py / scale);
                if (nx < base_x && nx >= end_x) || (ny < base_y && ny >= end_y) {
                    continue;
                }
                let ox = if nx < base_x { VRAM_WIDTH - base_x + nx } else { nx - base_x };
                let oy = if ny < base_y { VRAM_HEIGHT - base_y + ny } else { ny - base_y };
                if ox >= width || oy >= height {
                    continue;
                }
                let offset = (buffer_base_offset + oy * width + ox) as usize;
                let Some(&value) = self.texture_buffer.get(offset) else {
                    continue;
                };
                let value = value | mask_or_bits;
                let frag_depth = if value & 0x8000 != 0 { depth_value } else { 0.0 };
                if !write_depth(config, depth.as_deref_mut(), px, py, frag_depth, gen) {
                    continue;
                }
                let level = &mut color.levels[0];
                let i = level.index(px, py);
                level.color[i] = rgba5551_to_rgba8888(value);
                level.gens[i] = gen;
            }
        }
    }

    fn draw_vram_copy(&mut self, config: &GraphicsConfig, color: &mut Texture, depth: Option<&mut Texture>) {
        let Some(PushConstants::VramCopy {
            src_x,
            src_y,
            dst_x,
            dst_y,
            end_x,
            end_y,
            width,
            height,
            set_mask_bit,
            depth_value,
        }) = self.push
        else {
            return;
        };
        let Some((x0, y0, x1, y1)) = self.clip(color.levels[0].width, color.levels[0].height) else {
            return;
        };
        let vram_w = color.levels[0].width;
        let vram_h = color.levels[0].height;
        let gen = self.next_generation();

        // Gather first: the source may be this render target's read copy.
        let mut writes = Vec::new();
        let mut stale = 0;
        {
            let Some(src) = self.bound_texture(0) else {
                return;
            };
            let src_level = &src.levels[0];
            for py in y0..y1 {
                for px in x0..x1 {
                    if (px < dst_x && px >= end_x) || (py < dst_y && py >= end_y) {
                        continue;
                    }
                    let ox = if px < dst_x { vram_w - dst_x + px } else { px - dst_x };
                    let oy = if py < dst_y { vram_h - dst_y + py } else { py - dst_y };
                    if ox >= width || oy >= height {
                        continue;
                    }
                    let sx = (src_x + ox) % vram_w;
                    let sy = (src_y + oy) % vram_h;
                    if !src_level.contains(sx, sy) {
                        continue;
                    }
                    let si = src_level.index(sx, sy);
                    if src.desc.width == color.desc.width && color.levels[0].contains(sx, sy) {
                        let dst_gen = color.levels[0].gens[color.levels[0].index(sx, sy)];
                        if dst_gen != src_level.gens[si] && dst_gen < gen {
                            stale += 1;
                        }
                    }
                    let mut value = src_level.color[si];
                    if set_mask_bit {
                        value |= 0xFF00_0000;
                    }
                    writes.push((px, py, value));
                }
            }
        }
        self.stats.stale_samples += stale;

        let mut depth = depth;
        for (px, py, value) in writes {
            let frag_depth = if value >> 31 != 0 { depth_value } else { 0.0 };
            if !write_depth(config, depth.as_deref_mut(), px, py, frag_depth, gen) {
                continue;
            }
            let level = &mut color.levels[0];
            let i = level.index(px, py);
            level.color[i] = value;
            level.gens[i] = gen;
        }
    }

    fn draw_update_depth(&mut self, depth: &mut Texture) {
        let Some((x0, y0, x1, y1)) = self.clip(depth.levels[0].width, depth.levels[0].height) else {
            return;
        };
        let gen = self.next_generation();
        let Some(src) = self.bound_texture(0) else {
            return;
        };
        let src_level = &src.levels[0];
        let level = &mut depth.levels[0];
        for py in y0..y1 {
            for px in x0..x1 {
                if !src_level.contains(px, py) {
                    continue;
                }
                let masked = src_level.color[src_level.index(px, py)] >> 31 != 0;
                let i = level.index(px, py);
                level.depth[i] = if masked { 1.0 } else { 0.0 };
                level.gens[i] = gen;
            }
        }
    }

    fn draw_readback(&mut self, color: &mut Texture) {
        let Some(PushConstants::VramReadback { left, top, .. }) = self.push else {
            return;
        };
        let Some((x0, y0, x1, y1)) = self.clip(color.levels[0].width, color.levels[0].height) else {
            return;
        };
        let gen = self.next_generation();
        let Some(src) = self.bound_texture(0) else {
            return;
        };
        let level = &mut color.levels[0];
        for oy in y0..y1 {
            for ox in x0..x1 {
                let nx = left + ox * 2;
                let ny = top + oy;
                let (lo, _) = src.fetch_vram(nx, ny, 0, 0);
                let (hi, _) = src.fetch_vram(nx + 1, ny, 0, 0);
                let packed = rgba8888_to_rgba5551(lo) as u32 | ((rgba8888_to_rgba5551(hi) as u32) << 16);
                let i = level.index(ox, oy);
                level.color[i] = packed;
                level.gens[i] = gen;
            }
        }
    }

    fn draw_display(&mut self, depth_24bit: bool, interlace: InterlacedRenderMode, chroma_smoothing: bool, color: &mut Texture) {
        let Some(PushConstants::Display {
            vram_offset_x,
            vram_offset_y,
            crop_left,
            field_offset,
        }) = self.push
        else {
            return;
        };
        let Some((x0, y0, x1, y1)) = self.clip(color.levels[0].width, color.levels[0].height) else {
            return;
        };
        let gen = self.next_generation();
        let Some(src) = self.bound_texture(0) else {
            return;
        };
        let src_scale = src.vram_scale();
        // 24-bit output is produced at native resolution.
        let out_scale = if depth_24bit { 1 } else { src_scale };
        let src_level = &src.levels[0];
        let level = &mut color.levels[0];

        let fetch_24 = |x: u32, row: u32| -> [i32; 3] {
            let bytes = (crop_left + x) * 3;
            let base = vram_offset_x + bytes / 2;
            let (s0, _) = src.fetch_vram(base, row, 0, 0);
            let (s1, _) = src.fetch_vram(base + 1, row, 0, 0);
            let combined = rgba8888_to_rgba5551(s0) as u32 | ((rgba8888_to_rgba5551(s1) as u32) << 16);
            let rgb = combined >> ((bytes & 1) * 8);
            [(rgb & 0xFF) as i32, ((rgb >> 8) & 0xFF) as i32, ((rgb >> 16) & 0xFF) as i32]
        };

        for y in y0..y1 {
            let native_line = y / out_scale;
            let (row, sub_row) = match interlace {
                InterlacedRenderMode::None => (native_line, y % out_scale),
                InterlacedRenderMode::InterleavedFields => {
                    if (native_line & 1) != field_offset {
                        continue;
                    }
                    (native_line, y % out_scale)
                }
                InterlacedRenderMode::SeparateFields => {
                    if (native_line & 1) != field_offset {
                        continue;
                    }
                    (native_line >> 1, y % out_scale)
                }
            };
            for x in x0..x1 {
                let value = if depth_24bit {
                    let row = vram_offset_y + row;
                    let mut rgb = fetch_24(x, row);
                    if chroma_smoothing {
                        let left = fetch_24(x.saturating_sub(1), row);
                        let right = fetch_24(x + 1, row);
                        rgb = smooth_chroma(left, rgb, right);
                    }
                    pack_rgba8([rgb[0] as u8, rgb[1] as u8, rgb[2] as u8, 0xFF])
                } else {
                    let sx = vram_offset_x + crop_left + x;
                    let sy = vram_offset_y + row * src_scale + sub_row;
                    let sx = sx % src_level.width;
                    let sy = sy % src_level.height;
                    src_level.color[src_level.index(sx, sy)] | 0xFF00_0000
                };
                let i = level.index(x, y);
                level.color[i] = value;
                level.gens[i] = gen;
            }
        }
    }

    fn draw_box_downsample(&mut self, factor: u32, color: &mut Texture) {
        let Some((x0, y0, x1, y1)) = self.clip(color.levels[0].width, color.levels[0].height) else {
            return;
        };
        let gen = self.next_generation();
        let Some(src) = self.bound_texture(0) else {
            return;
        };
        let src_level = &src.levels[0];
        let level = &mut color.levels[0];
        let factor = factor.max(1);
        let n = factor * factor;
        for y in y0..y1 {
            for x in x0..x1 {
                let mut sum = [0u32; 3];
                for j in 0..factor {
                    for i in 0..factor {
                        let sx = (x * factor + i).min(src_level.width - 1);
                        let sy = (y * factor + j).min(src_level.height - 1);
                        let c = unpack_rgba8(src_level.color[src_level.index(sx, sy)]);
                        for k in 0..3 {
                            sum[k] += c[k] as u32;
                        }
                    }
                }
                let avg = sum.map(|s| ((s + n / 2) / n) as u8);
                let idx = level.index(x, y);
                level.color[idx] = pack_rgba8([avg[0], avg[1], avg[2], 0xFF]);
                level.gens[idx] = gen;
            }
        }
    }

    fn draw_adaptive_mip(&mut self, first_pass: bool, color: &mut Texture) {
        let lod = match self.push {
            Some(PushConstants::Downsample { lod }) => lod,
            _ => 0,
        };
        let Some((x0, y0, x1, y1)) = self.clip(color.levels[0].width, color.levels[0].height) else {
            return;
        };
        let gen = self.next_generation();
        let Some(src) = self.bound_texture(0).and_then(|t| t.level(lod)) else {
            return;
        };
        let level = &mut color.levels[0];
        for y in y0..y1 {
            for x in x0..x1 {
                let mut samples = [[0u8; 4]; 4];
                for (k, (i, j)) in [(0, 0), (1, 0), (0, 1), (1, 1)].into_iter().enumerate() {
                    let sx = (x * 2 + i).min(src.width - 1);
                    let sy = (y * 2 + j).min(src.height - 1);
                    samples[k] = unpack_rgba8(src.color[src.index(sx, sy)]);
                }
                let mut out = [0u8; 4];
                for c in 0..3 {
                    let sum: u32 = samples.iter().map(|s| s[c] as u32).sum();
                    out[c] = ((sum + 2) / 4) as u8;
                }
                out[3] = if first_pass {
                    // Edge strength: largest per-channel spread.
                    (0..3)
                        .map(|c| {
                            let hi = samples.iter().map(|s| s[c]).max().unwrap_or(0);
                            let lo = samples.iter().map(|s| s[c]).min().unwrap_or(0);
                            hi - lo
                        })
                        .max()
                        .unwrap_or(0)
                } else {
                    samples.iter().map(|s| s[3]).max().unwrap_or(0)
                };
                let idx = level.index(x, y);
                level.color[idx] = pack_rgba8(out);
                level.gens[idx] = gen;
            }
        }
    }

    fn draw_adaptive_blur(&mut self, color: &mut Texture) {
        let Some((x0, y0, x1, y1)) = self.clip(color.levels[0].width, color.levels[0].height) else {
            return;
        };
        let gen = self.next_generation();
        let Some(src) = self.bound_texture(0).and_then(|t| t.level(0)) else {
            return;
        };
        let level = &mut color.levels[0];
        for y in y0..y1 {
            for x in x0..x1 {
                let mut sum = 0u32;
                let mut n = 0u32;
                for j in -1i32..=1 {
                    for i in -1i32..=1 {
                        let sx = x as i32 + i;
                        let sy = y as i32 + j;
                        if sx < 0 || sy < 0 || !src.contains(sx as u32, sy as u32) {
                            continue;
                        }
                        sum += src.color[src.index(sx as u32, sy as u32)] >> 24;
                        n += 1;
                    }
                }
                let idx = level.index(x, y);
                level.color[idx] = sum / n.max(1);
                level.gens[idx] = gen;
            }
        }
    }

    fn draw_adaptive_composite(&mut self, color: &mut Texture) {
        let lod = match self.push {
            Some(PushConstants::Downsample { lod }) => lod,
            _ => 0,
        };
        let Some((x0, y0, x1, y1)) = self.clip(color.levels[0].width, color.levels[0].height) else {
            return;
        };
        let gen = self.next_generation();
        let (Some(src), Some(weights)) = (self.bound_texture(0), self.bound_texture(1)) else {
            return;
        };
        let (Some(fine), Some(coarse), Some(weight)) = (src.level(0), src.level(lod), weights.level(0)) else {
            return;
        };
        let level = &mut color.levels[0];
        for y in y0..y1 {
            for x in x0..x1 {
                let fx = x.min(fine.width - 1);
                let fy = y.min(fine.height - 1);
                let cx = (x >> lod).min(coarse.width - 1);
                let cy = (y >> lod).min(coarse.height - 1);
                let wx = (x >> lod).min(weight.width - 1);
                let wy = (y >> lod).min(weight.height - 1);
                let w = (weight.color[weight.index(wx, wy)] & 0xFF) as f32 / 255.0;
                let f = unpack_rgba8(fine.color[fine.index(fx, fy)]);
                let c = unpack_rgba8(coarse.color[coarse.index(cx, cy)]);
                let mut out = [0u8; 4];
                for k in 0..3 {
                    out[k] = (c[k] as f32 + (f[k] as f32 - c[k] as f32) * w).round().clamp(0.0, 255.0) as u8;
                }
                out[3] = 0xFF;
                let idx = level.index(x, y);
                level.color[idx] = pack_rgba8(out);
                level.gens[idx] = gen;
            }
        }
    }
}

impl Default for ReferenceDevice {
    fn default() -> Self {
        Self::new()
    }
}

// ── Rasterization helpers ────────────────────────────────────────────────────

#[inline]
fn edge(a: (f64, f64), b: (f64, f64), p: (f64, f64)) -> f64 {
    (b.0 - a.0) * (p.1 - a.1) - (b.1 - a.1) * (p.0 - a.0)
}

/// Top or left edge of a positively oriented triangle (y down).
#[inline]
fn is_top_left(a: (f64, f64), b: (f64, f64)) -> bool {
    let dx = b.0 - a.0;
    let dy = b.1 - a.1;
    (dy == 0.0 && dx > 0.0) || dy < 0.0
}

#[inline]
fn inside(w: f64, top_left: bool) -> bool {
    w > 0.0 || (w == 0.0 && top_left)
}

fn interpolate(v: &[BatchVertex; 3], b: [f64; 3]) -> Interp {
    // Perspective-correct weights when w differs between vertices.
    let perspective = v[0].w != v[1].w || v[1].w != v[2].w;
    let weights = if perspective {
        let pw = [
            b[0] / v[0].w.max(f32::EPSILON) as f64,
            b[1] / v[1].w.max(f32::EPSILON) as f64,
            b[2] / v[2].w.max(f32::EPSILON) as f64,
        ];
        let sum = pw[0] + pw[1] + pw[2];
        if sum > 0.0 {
            [pw[0] / sum, pw[1] / sum, pw[2] / sum]
        } else {
            b
        }
    } else {
        b
    };
    let attr = |f: fn(&BatchVertex) -> f32, w: [f64; 3]| -> f32 {
        (f(&v[0]) as f64 * w[0] + f(&v[1]) as f64 * w[1] + f(&v[2]) as f64 * w[2]) as f32
    };
    Interp {
        r: attr(|x| (x.color & 0xFF) as f32, weights),
        g: attr(|x| ((x.color >> 8) & 0xFF) as f32, weights),
        b: attr(|x| ((x.color >> 16) & 0xFF) as f32, weights),
        u: attr(|x| x.u as f32, weights),
        v: attr(|x| x.v as f32, weights),
        z: attr(|x| x.z, b),
        w: attr(|x| x.w, b),
    }
}

#[inline]
fn blend_channel(mode: TransparencyMode, b: i32, f: i32, max: i32) -> i32 {
    match mode {
        TransparencyMode::HalfBackgroundPlusHalfForeground => (b + f) / 2,
        TransparencyMode::BackgroundPlusForeground => (b + f).min(max),
        TransparencyMode::BackgroundMinusForeground => (b - f).max(0),
        TransparencyMode::BackgroundPlusQuarterForeground => (b + f / 4).min(max),
        TransparencyMode::Disabled => f,
    }
}

#[inline]
fn depth_passes(func: DepthFunc, frag: f32, stored: f32) -> bool {
    match func {
        DepthFunc::Always => true,
        DepthFunc::GreaterEqual => frag >= stored,
        DepthFunc::LessEqual => frag <= stored,
    }
}

/// Depth test a utility-program fragment and write it when allowed.
fn write_depth(config: &GraphicsConfig, depth: Option<&mut Texture>, px: u32, py: u32, frag: f32, gen: u64) -> bool {
    let Some(depth) = depth else {
        return true;
    };
    let level = &mut depth.levels[0];
    if !level.contains(px, py) {
        return true;
    }
    let i = level.index(px, py);
    if !depth_passes(config.depth.func, frag, level.depth[i]) {
        return false;
    }
    if config.depth.write {
        level.depth[i] = frag;
        level.gens[i] = gen;
    }
    true
}

/// Average chroma with the horizontal neighbours, keeping luma.
fn smooth_chroma(left: [i32; 3], center: [i32; 3], right: [i32; 3]) -> [i32; 3] {
    let to_yuv = |c: [i32; 3]| {
        let (r, g, b) = (c[0] as f32, c[1] as f32, c[2] as f32);
        let y = 0.299 * r + 0.587 * g + 0.114 * b;
        (y, b - y, r - y)
    };
    let (y, _, _) = to_yuv(center);
    let (_, ul, vl) = to_yuv(left);
    let (_, uc, vc) = to_yuv(center);
    let (_, ur, vr) = to_yuv(right);
    let u = (ul + uc + ur) / 3.0;
    let v = (vl + vc + vr) / 3.0;
    let r = y + v;
    let b = y + u;
    let g = (y - 0.299 * r - 0.114 * b) / 0.587;
    [r, g, b].map(|c| c.round().clamp(0.0, 255.0) as i32)
}

// ── GpuDevice ────────────────────────────────────────────────────────────────

impl GpuDevice for ReferenceDevice {
    fn name(&self) -> &str {
        "reference"
    }

    fn features(&self) -> DeviceFeatures {
        self.features
    }

    fn max_texture_size(&self) -> u32 {
        self.max_texture_size
    }

    fn max_multisamples(&self) -> u32 {
        self.max_multisamples
    }

    fn window_height(&self) -> u32 {
        self.window_height
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Option<TextureHandle> {
        if desc.width == 0 || desc.height == 0 || desc.width > self.max_texture_size || desc.height > self.max_texture_size {
            log::error!("ReferenceDevice: invalid texture size {}x{}", desc.width, desc.height);
            return None;
        }
        let h = self.alloc_handle();
        self.textures.insert(h, Texture::new(*desc));
        Some(TextureHandle(h))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
        for slot in self.bound.iter_mut() {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
    }

    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        self.textures.get(&texture.0).map(|t| t.desc)
    }

    fn create_shader(&mut self, stage: ShaderStage, name: &str, source: &str) -> Option<ShaderHandle> {
        if source.trim().is_empty() {
            log::error!("ReferenceDevice: empty {} shader '{}'", stage, name);
            return None;
        }
        let h = self.alloc_handle();
        self.shaders.insert(h, stage);
        Some(ShaderHandle(h))
    }

    fn destroy_shader(&mut self, shader: ShaderHandle) {
        self.shaders.remove(&shader.0);
    }

    fn create_pipeline(&mut self, config: &GraphicsConfig) -> Option<PipelineHandle> {
        if let Some(budget) = self.pipeline_budget {
            if self.pipelines_created >= budget {
                return None;
            }
        }
        if !self.shaders.contains_key(&config.vertex_shader.0) || !self.shaders.contains_key(&config.fragment_shader.0) {
            log::error!("ReferenceDevice: pipeline references unknown shader");
            return None;
        }
        self.pipelines_created += 1;
        let h = self.alloc_handle();
        self.pipelines.insert(h, config.clone());
        Some(PipelineHandle(h))
    }

    fn destroy_pipeline(&mut self, pipeline: PipelineHandle) {
        self.pipelines.remove(&pipeline.0);
        if self.current_pipeline == Some(pipeline.0) {
            self.current_pipeline = None;
        }
    }

    fn map_vertex_buffer(&mut self, required: u32) -> VertexBufferMap {
        if self.vertices.len() as u32 + required > self.vertex_capacity {
            self.vertices.clear();
        }
        let base_vertex = self.vertices.len() as u32;
        VertexBufferMap {
            base_vertex,
            space: self.vertex_capacity - base_vertex,
        }
    }

    fn unmap_vertex_buffer(&mut self, vertices: &[BatchVertex]) {
        self.vertices.extend_from_slice(vertices);
    }

    fn upload_texture_buffer(&mut self, data: &[u16]) -> Option<u32> {
        self.texture_buffer.clear();
        self.texture_buffer.extend_from_slice(data);
        Some(0)
    }

    fn upload_uniform_buffer(&mut self, uniforms: &BatchUniforms) {
        self.uniforms = *uniforms;
    }

    fn push_constants(&mut self, constants: &PushConstants) {
        self.push = Some(*constants);
    }

    fn set_pipeline(&mut self, pipeline: PipelineHandle) {
        self.current_pipeline = Some(pipeline.0);
    }

    fn set_render_target(&mut self, color: Option<TextureHandle>, depth: Option<TextureHandle>) {
        self.color_target = color;
        self.depth_target = depth;
    }

    fn set_texture(&mut self, slot: u32, texture: Option<TextureHandle>, _sampler: SamplerKind) {
        if let Some(s) = self.bound.get_mut(slot as usize) {
            *s = texture;
        }
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.viewport = Region { x, y, width, height };
    }

    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.scissor = Region { x, y, width, height };
    }

    fn draw(&mut self, vertex_count: u32, base_vertex: u32) {
        self.stats.draw_calls += 1;
        let Some(config) = self.current_pipeline.and_then(|p| self.pipelines.get(&p)).cloned() else {
            log::warn!("ReferenceDevice: draw without a pipeline");
            return;
        };
        let mut color = self.take(self.color_target);
        let mut depth = self.take(self.depth_target);
        let color_tex = color.as_mut().map(|(_, t)| t);
        let depth_tex = depth.as_mut().map(|(_, t)| t);

        match (config.program, color_tex) {
            (ProgramDesc::Batch { key, options }, Some(c)) => {
                self.draw_batch(&config, key, options, c, depth_tex, vertex_count, base_vertex)
            }
            (ProgramDesc::Wireframe, Some(c)) => self.draw_wireframe(c, vertex_count, base_vertex),
            (ProgramDesc::VramFill { wrapped, interlaced }, Some(c)) => {
                self.draw_fill(&config, wrapped, interlaced, c, depth_tex)
            }
            (ProgramDesc::VramWrite, Some(c)) => self.draw_vram_write(&config, c, depth_tex),
            (ProgramDesc::VramCopy, Some(c)) => self.draw_vram_copy(&config, c, depth_tex),
            (ProgramDesc::VramUpdateDepth, _) => {
                if let Some(d) = depth_tex {
                    self.draw_update_depth(d);
                }
            }
            (ProgramDesc::VramReadback, Some(c)) => self.draw_readback(c),
            (
                ProgramDesc::Display {
                    depth_24bit,
                    interlace,
                    chroma_smoothing,
                },
                Some(c),
            ) => self.draw_display(depth_24bit, interlace, chroma_smoothing, c),
            (ProgramDesc::BoxDownsample { factor }, Some(c)) => self.draw_box_downsample(factor, c),
            (ProgramDesc::AdaptiveDownsampleMip { first_pass }, Some(c)) => self.draw_adaptive_mip(first_pass, c),
            (ProgramDesc::AdaptiveDownsampleBlur, Some(c)) => self.draw_adaptive_blur(c),
            (ProgramDesc::AdaptiveDownsampleComposite, Some(c)) => self.draw_adaptive_composite(c),
            (program, None) => log::warn!("ReferenceDevice: {:?} without a color target", program),
        }

        self.put_back(color);
        self.put_back(depth);
    }

    fn clear_render_target(&mut self, texture: TextureHandle, color: u32) {
        let gen = self.next_generation();
        if let Some(tex) = self.textures.get_mut(&texture.0) {
            for level in tex.levels.iter_mut() {
                level.color.fill(color);
                level.gens.fill(gen);
            }
        }
    }

    fn clear_depth(&mut self, texture: TextureHandle, depth: f32) {
        let gen = self.next_generation();
        if let Some(tex) = self.textures.get_mut(&texture.0) {
            for level in tex.levels.iter_mut() {
                level.depth.fill(depth);
                level.gens.fill(gen);
            }
        }
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
        self.stats.copies += 1;
        // Stage through a copy so a texture may be copied onto itself.
        let Some(from) = self.textures.get(&src.0).and_then(|t| t.level(src_level)) else {
            return;
        };
        let mut rows = Vec::with_capacity(height as usize);
        for y in 0..height {
            let sy = src_y + y;
            if sy >= from.height {
                break;
            }
            let mut row = Vec::with_capacity(width as usize);
            for x in 0..width {
                let sx = src_x + x;
                if sx >= from.width {
                    break;
                }
                let i = from.index(sx, sy);
                row.push((
                    from.color.get(i).copied().unwrap_or(0),
                    from.depth.get(i).copied().unwrap_or(0.0),
                    from.gens[i],
                ));
            }
            rows.push(row);
        }
        let Some(to) = self.textures.get_mut(&dst.0).and_then(|t| t.levels.get_mut(dst_level as usize)) else {
            return;
        };
        for (y, row) in rows.into_iter().enumerate() {
            let dy = dst_y + y as u32;
            for (x, (c, d, g)) in row.into_iter().enumerate() {
                let dx = dst_x + x as u32;
                if !to.contains(dx, dy) {
                    continue;
                }
                let i = to.index(dx, dy);
                if let Some(slot) = to.color.get_mut(i) {
                    *slot = c;
                }
                if let Some(slot) = to.depth.get_mut(i) {
                    *slot = d;
                }
                to.gens[i] = g;
            }
        }
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
        self.copy_texture_region(dst, dst_x, dst_y, 0, src, src_x, src_y, 0, width, height);
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
        self.stats.downloads += 1;
        let Some(level) = self.textures.get(&texture.0).and_then(|t| t.level(0)) else {
            return false;
        };
        if x + width > level.width || y + height > level.height || out.len() < (width * height) as usize {
            return false;
        }
        for row in 0..height {
            let src = level.index(x, y + row);
            let dst = (row * width) as usize;
            out[dst..dst + width as usize].copy_from_slice(&level.color[src..src + width as usize]);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BatchShaderOptions, BlendState, DepthState, TextureKind, VertexLayout};
    use crate::types::{DepthTest, TextureMode};

    fn pipeline(dev: &mut ReferenceDevice, program: ProgramDesc, depth: DepthState) -> PipelineHandle {
        let vs = dev.create_shader(ShaderStage::Vertex, "vs", "main").unwrap();
        let fs = dev.create_shader(ShaderStage::Fragment, "fs", "main").unwrap();
        dev.create_pipeline(&GraphicsConfig {
            layout: VertexLayout::None,
            vertex_shader: vs,
            geometry_shader: None,
            fragment_shader: fs,
            depth,
            blend: BlendState::NO_BLENDING,
            color_format: Some(TextureFormat::Rgba8),
            depth_format: None,
            samples: 1,
            per_sample_shading: false,
            program,
        })
        .unwrap()
    }

    fn vram_target(dev: &mut ReferenceDevice) -> TextureHandle {
        dev.create_texture(&TextureDesc::new(VRAM_WIDTH, VRAM_HEIGHT, TextureKind::RenderTarget, TextureFormat::Rgba8))
            .unwrap()
    }

    fn untextured_key(transparency: TransparencyMode) -> PipelineKey {
        PipelineKey {
            depth_test: DepthTest::Always,
            render_mode: BatchRenderMode::for_transparency(transparency),
            texture_mode: TextureMode::Disabled,
            transparency_mode: transparency,
            dithering: false,
            interlacing: false,
        }
    }

    fn flat_vertex(x: f32, y: f32, color: u32) -> BatchVertex {
        BatchVertex::new(x, y, 1.0, 1.0, color, 0, 0, 0, 0)
    }

    fn read_pixel(dev: &mut ReferenceDevice, tex: TextureHandle, x: u32, y: u32) -> u32 {
        let mut out = [0u32; 1];
        assert!(dev.download_texture(tex, x, y, 1, 1, &mut out));
        out[0]
    }

    fn draw_quad(dev: &mut ReferenceDevice, x0: f32, y0: f32, x1: f32, y1: f32, color: u32) {
        let verts = [
            flat_vertex(x0, y0, color),
            flat_vertex(x1, y0, color),
            flat_vertex(x0, y1, color),
            flat_vertex(x0, y1, color),
            flat_vertex(x1, y0, color),
            flat_vertex(x1, y1, color),
        ];
        let map = dev.map_vertex_buffer(6);
        dev.unmap_vertex_buffer(&verts);
        dev.draw(6, map.base_vertex);
    }

    #[test]
    fn test_quad_covers_exact_pixels_once() {
        let mut dev = ReferenceDevice::new();
        let rt = vram_target(&mut dev);
        let key = untextured_key(TransparencyMode::BackgroundPlusForeground);
        let p = pipeline(
            &mut dev,
            ProgramDesc::Batch {
                key,
                options: BatchShaderOptions::default(),
            },
            DepthState::DISABLED,
        );
        dev.set_pipeline(p);
        dev.set_render_target(Some(rt), None);
        dev.set_viewport_and_scissor(0, 0, VRAM_WIDTH, VRAM_HEIGHT);
        // Additive blending would double any pixel shared by both triangles.
        draw_quad(&mut dev, 0.0, 0.0, 16.0, 16.0, 0x0000_0040);
        for y in 0..17 {
            for x in 0..17 {
                let expected = if x < 16 && y < 16 { 0x40 } else { 0 };
                assert_eq!(read_pixel(&mut dev, rt, x, y) & 0xFF, expected, "pixel {},{}", x, y);
            }
        }
    }

    #[test]
    fn test_fill_respects_wrap_window() {
        let mut dev = ReferenceDevice::new();
        let rt = vram_target(&mut dev);
        let p = pipeline(
            &mut dev,
            ProgramDesc::VramFill {
                wrapped: true,
                interlaced: false,
            },
            DepthState::DISABLED,
        );
        dev.set_pipeline(p);
        dev.set_render_target(Some(rt), None);
        dev.set_viewport_and_scissor(0, 0, VRAM_WIDTH, 4);
        dev.push_constants(&PushConstants::VramFill {
            dst_x: 1020,
            dst_y: 0,
            end_x: 4,
            end_y: 4,
            color: 0xFF00_00FF,
            interlaced_displayed_field: 0,
        });
        dev.draw(3, 0);
        assert_eq!(read_pixel(&mut dev, rt, 1023, 0), 0xFF00_00FF);
        assert_eq!(read_pixel(&mut dev, rt, 3, 1), 0xFF00_00FF);
        assert_eq!(read_pixel(&mut dev, rt, 4, 1), 0);
        assert_eq!(read_pixel(&mut dev, rt, 1019, 1), 0);
    }

    #[test]
    fn test_copy_texture_region_onto_itself() {
        let mut dev = ReferenceDevice::new();
        let rt = vram_target(&mut dev);
        dev.clear_render_target(rt, 0x11);
        let p = pipeline(
            &mut dev,
            ProgramDesc::VramFill {
                wrapped: false,
                interlaced: false,
            },
            DepthState::DISABLED,
        );
        dev.set_pipeline(p);
        dev.set_render_target(Some(rt), None);
        dev.set_viewport_and_scissor(0, 0, 2, 1);
        dev.push_constants(&PushConstants::VramFill {
            dst_x: 0,
            dst_y: 0,
            end_x: 2,
            end_y: 1,
            color: 0x22,
            interlaced_displayed_field: 0,
        });
        dev.draw(3, 0);
        dev.copy_texture_region(rt, 1, 0, 0, rt, 0, 0, 0, 3, 1);
        assert_eq!(read_pixel(&mut dev, rt, 1, 0), 0x22);
        assert_eq!(read_pixel(&mut dev, rt, 2, 0), 0x22);
        assert_eq!(read_pixel(&mut dev, rt, 3, 0), 0x11);
    }

    #[test]
    fn test_pipeline_budget() {
        let mut dev = ReferenceDevice::new();
        dev.set_pipeline_budget(Some(1));
        let _first = pipeline(&mut dev, ProgramDesc::VramCopy, DepthState::DISABLED);
        let vs = dev.create_shader(ShaderStage::Vertex, "vs", "main").unwrap();
        let fs = dev.create_shader(ShaderStage::Fragment, "fs", "main").unwrap();
        let config = GraphicsConfig {
            layout: VertexLayout::None,
            vertex_shader: vs,
            geometry_shader: None,
            fragment_shader: fs,
            depth: DepthState::DISABLED,
            blend: BlendState::NO_BLENDING,
            color_format: Some(TextureFormat::Rgba8),
            depth_format: None,
            samples: 1,
            per_sample_shading: false,
            program: ProgramDesc::VramCopy,
        };
        assert!(dev.create_pipeline(&config).is_none());
    }

    #[test]
    fn test_vertex_buffer_wraps_when_full() {
        let mut dev = ReferenceDevice::new();
        dev.set_vertex_capacity(12);
        let map = dev.map_vertex_buffer(6);
        assert_eq!(map, VertexBufferMap { base_vertex: 0, space: 12 });
        dev.unmap_vertex_buffer(&[BatchVertex::default(); 9]);
        let map = dev.map_vertex_buffer(6);
        assert_eq!(map, VertexBufferMap { base_vertex: 0, space: 12 });
    }

    #[test]
    fn test_blend_channel_modes() {
        assert_eq!(blend_channel(TransparencyMode::HalfBackgroundPlusHalfForeground, 31, 0, 31), 15);
        assert_eq!(blend_channel(TransparencyMode::BackgroundPlusForeground, 20, 20, 31), 31);
        assert_eq!(blend_channel(TransparencyMode::BackgroundMinusForeground, 5, 20, 31), 0);
        assert_eq!(blend_channel(TransparencyMode::BackgroundPlusQuarterForeground, 10, 8, 31), 12);
    }
}
