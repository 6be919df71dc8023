// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Primitive submission: polygons, rectangles and lines become batch
//! triangles.

use rpsx_common::{
    truncate_vertex_position, Rect, MAX_PRIMITIVE_HEIGHT, MAX_PRIMITIVE_WIDTH, MAX_VERTICES_FOR_RECTANGLE,
    TEXTURE_PAGE_HEIGHT, TEXTURE_PAGE_WIDTH,
};

use super::registers::DrawingArea;
use super::HardwareRenderer;
use crate::backend::GpuDevice;
use crate::primitive::{DrawLine, DrawPolygon, DrawRectangle, LineVertex, PrimitiveKind, RenderFlags};
use crate::types::{pack_uv_limits, BatchVertex, TransparencyMode};

/// Limits that never clamp.
const UNCLAMPED_UV_LIMITS: u32 = pack_uv_limits(0, 0, 0xFF, 0xFF);

const COLOR_MASK: u32 = 0x00FF_FFFF;

/// Native bounding box of a primitive, inclusive.
#[derive(Debug, Clone, Copy)]
struct Bounds {
    min_x: i32,
    min_y: i32,
    max_x: i32,
    max_y: i32,
}

impl Bounds {
    fn of(points: &[(i32, i32)]) -> Self {
        let mut b = Bounds {
            min_x: i32::MAX,
            min_y: i32::MAX,
            max_x: i32::MIN,
            max_y: i32::MIN,
        };
        for &(x, y) in points {
            b.min_x = b.min_x.min(x);
            b.min_y = b.min_y.min(y);
            b.max_x = b.max_x.max(x);
            b.max_y = b.max_y.max(y);
        }
        b
    }

    fn too_large(&self) -> bool {
        self.max_x - self.min_x >= MAX_PRIMITIVE_WIDTH as i32 || self.max_y - self.min_y >= MAX_PRIMITIVE_HEIGHT as i32
    }

    /// Area this primitive can write, clipped to the drawing area.
    fn clipped(&self, area: &DrawingArea) -> Rect {
        let clamp_x = |v: i32| v.clamp(area.left as i32, area.right as i32) as u32;
        let clamp_y = |v: i32| v.clamp(area.top as i32, area.bottom as i32) as u32;
        Rect::new(
            clamp_x(self.min_x),
            clamp_y(self.min_y),
            clamp_x(self.max_x) + 1,
            clamp_y(self.max_y) + 1,
        )
    }
}

/// Shift texture coordinates of quads whose U or V runs backwards along an
/// axis, so nearest sampling at scaled resolutions hits the same texels as
/// the console's top-left interpolation.
pub(crate) fn handle_flipped_quad_texcoords(v: &mut [BatchVertex; 4]) {
    let abx = v[1].x - v[0].x;
    let aby = v[1].y - v[0].y;
    let bcx = v[2].x - v[1].x;
    let bcy = v[2].y - v[1].y;
    let cax = v[0].x - v[2].x;
    let cay = v[0].y - v[2].y;

    // Plane derivatives; w is assumed uniform across the quad.
    let (u0, u1, u2) = (v[0].u as f32, v[1].u as f32, v[2].u as f32);
    let (v0, v1, v2) = (v[0].v as f32, v[1].v as f32, v[2].v as f32);
    let dudx = -aby * u2 - bcy * u0 - cay * u1;
    let dvdx = -aby * v2 - bcy * v0 - cay * v1;
    let dudy = abx * u2 + bcx * u0 + cax * u1;
    let dvdy = abx * v2 + bcx * v0 + cax * v1;
    let area = bcx * cay - bcy * cax;

    let tex_area = (v[1].u as i32 - v[0].u as i32) * (v[2].v as i32 - v[0].v as i32)
        - (v[2].u as i32 - v[0].u as i32) * (v[1].v as i32 - v[0].v as i32);

    // Perspective-correct polygons that merely project this way are left alone.
    let is_3d = v[0].w != v[1].w || v[0].w != v[2].w;
    if area == 0.0 || tex_area == 0 || is_3d {
        return;
    }

    let rcp_area = 1.0 / area;
    let dudx = dudx * rcp_area;
    let dudy = dudy * rcp_area;
    let dvdx = dvdx * rcp_area;
    let dvdy = dvdy * rcp_area;

    if (dudx < 0.0 && dudy == 0.0) || (dudy < 0.0 && dudx == 0.0) {
        for vertex in v.iter_mut() {
            vertex.u += 1;
        }
    }
    if (dvdx < 0.0 && dvdy == 0.0) || (dvdy < 0.0 && dvdx == 0.0) {
        for vertex in v.iter_mut() {
            vertex.v += 1;
        }
    }
}

/// Six vertices covering a line from `(x0, y0)` to `(x1, y1)`, widened by
/// one pixel across its minor axis. A zero-length line covers one pixel.
pub(crate) fn line_vertices(start: LineVertex, end: LineVertex, depth: f32) -> [BatchVertex; 6] {
    let (x0, y0) = (start.x as f32, start.y as f32);
    let (x1, y1) = (end.x as f32, end.y as f32);
    let (c0, c1) = (start.color & COLOR_MASK, end.color & COLOR_MASK);
    let vertex = |x: f32, y: f32, color: u32| BatchVertex::new(x, y, depth, 1.0, color, 0, 0, 0, 0);

    let dx = x1 - x0;
    let dy = y1 - y0;
    let quad = if dx == 0.0 && dy == 0.0 {
        [
            vertex(x0, y0, c0),
            vertex(x0 + 1.0, y0, c0),
            vertex(x1, y1 + 1.0, c0),
            vertex(x1 + 1.0, y1 + 1.0, c0),
        ]
    } else {
        let abs_dx = dx.abs();
        let abs_dy = dy.abs();
        let (mut pad_x0, mut pad_y0, mut pad_x1, mut pad_y1) = (0.0, 0.0, 0.0, 0.0);

        // Expand across the minor axis, and by one pixel at the far end of
        // the major axis.
        let (fill_dx, fill_dy) = if abs_dx > abs_dy {
            let dydk = dy / abs_dx;
            if dx > 0.0 {
                pad_x1 = 1.0;
                pad_y1 = dydk;
            } else {
                pad_x0 = 1.0;
                pad_y0 = -dydk;
            }
            (0.0, 1.0)
        } else {
            let dxdk = dx / abs_dy;
            if dy > 0.0 {
                pad_y1 = 1.0;
                pad_x1 = dxdk;
            } else {
                pad_y0 = 1.0;
                pad_x0 = -dxdk;
            }
            (1.0, 0.0)
        };

        let (ox0, oy0) = (x0 + pad_x0, y0 + pad_y0);
        let (ox1, oy1) = (x1 + pad_x1, y1 + pad_y1);
        [
            vertex(ox0, oy0, c0),
            vertex(ox0 + fill_dx, oy0 + fill_dy, c0),
            vertex(ox1, oy1, c1),
            vertex(ox1 + fill_dx, oy1 + fill_dy, c1),
        ]
    };

    [quad[0], quad[1], quad[2], quad[3], quad[2], quad[1]]
}

impl<D: GpuDevice> HardwareRenderer<D> {
    /// Draw a flat or shaded, optionally textured triangle or quad.
    pub fn draw_polygon(&mut self, cmd: &DrawPolygon) {
        let num_vertices = cmd.num_vertices();
        self.dispatch_render_command(
            PrimitiveKind::Polygon,
            cmd.flags,
            if cmd.quad { 6 } else { 3 },
        );
        if self.regs.check_mask_before_draw {
            self.current_depth += 1;
        }

        let textured = cmd.flags.contains(RenderFlags::TEXTURED);
        let shaded = cmd.flags.contains(RenderFlags::SHADED);
        let page = self.regs.draw_mode.texture_page;
        let texpage = self.regs.draw_mode.texpage_word();
        let depth = self.current_normalized_depth();
        let offset = self.regs.drawing_offset;
        let pgxp = self.settings.pgxp_enable;

        let first_color = cmd.vertices[0].color & COLOR_MASK;
        let mut vertices = [BatchVertex::default(); 4];
        let mut native = [(0i32, 0i32); 4];
        let mut valid_w = self.settings.pgxp_texture_correction;
        for (i, src) in cmd.vertices().iter().enumerate() {
            let x = offset.x + truncate_vertex_position(src.x);
            let y = offset.y + truncate_vertex_position(src.y);
            native[i] = (x, y);

            let color = if shaded { src.color & COLOR_MASK } else { first_color };
            let (u, v) = if textured { (src.u as u16, src.v as u16) } else { (0, 0) };
            let mut vertex = BatchVertex::new(x as f32, y as f32, depth, 1.0, color, texpage, u, v, UNCLAMPED_UV_LIMITS);
            if pgxp {
                match src.precise {
                    Some(p) => {
                        vertex.x = p.x;
                        vertex.y = p.y;
                        vertex.w = p.w;
                    }
                    None => valid_w = false,
                }
            }
            vertices[i] = vertex;
        }

        if pgxp {
            if !valid_w {
                self.set_batch_depth_buffer(false);
                for v in vertices.iter_mut() {
                    v.w = 1.0;
                }
            } else if self.config.pgxp_depth_buffer {
                let use_depth = self.batch.config.transparency_mode == TransparencyMode::Disabled;
                self.set_batch_depth_buffer(use_depth);
                if use_depth {
                    self.check_for_depth_clear(&vertices[..num_vertices]);
                }
            }
        }

        if cmd.quad && self.config.resolution_scale > 1 {
            handle_flipped_quad_texcoords(&mut vertices);
        }

        if self.compute_uv_range && textured {
            self.compute_polygon_uv_limits(page, &mut vertices[..num_vertices]);
        }

        let area = self.regs.drawing_area;
        if !area.is_valid() {
            return;
        }

        let first = Bounds::of(&native[..3]);
        if first.too_large() {
            log::debug!(
                "HwRenderer: culling too-large polygon: {:?} {:?} {:?}",
                native[0],
                native[1],
                native[2]
            );
        } else {
            self.include_vram_dirty_rect(first.clipped(&area));
            for v in &vertices[..3] {
                self.batch.push(*v);
            }
        }

        if cmd.quad {
            let second = Bounds::of(&native[1..4]);
            if second.too_large() {
                log::debug!(
                    "HwRenderer: culling too-large polygon (quad second half): {:?} {:?} {:?}",
                    native[2],
                    native[1],
                    native[3]
                );
            } else {
                self.include_vram_dirty_rect(second.clipped(&area));
                self.batch.push(vertices[2]);
                self.batch.push(vertices[1]);
                self.batch.push(vertices[3]);
            }
        }
    }

    /// Draw a sprite or tile. Rectangles wrap their texture coordinates
    /// every 256 texels, so they are split into quads at page boundaries.
    pub fn draw_rectangle(&mut self, cmd: &DrawRectangle) {
        self.dispatch_render_command(PrimitiveKind::Rectangle, cmd.flags, MAX_VERTICES_FOR_RECTANGLE);
        if self.regs.check_mask_before_draw {
            self.current_depth += 1;
        }

        let offset = self.regs.drawing_offset;
        let pos_x = truncate_vertex_position(offset.x + cmd.x);
        let pos_y = truncate_vertex_position(offset.y + cmd.y);
        let (width, height) = (cmd.width, cmd.height);
        if width >= MAX_PRIMITIVE_WIDTH || height >= MAX_PRIMITIVE_HEIGHT {
            log::debug!(
                "HwRenderer: culling too-large rectangle: {},{} {}x{}",
                pos_x,
                pos_y,
                width,
                height
            );
            return;
        }
        let area = self.regs.drawing_area;
        if width == 0 || height == 0 || !area.is_valid() {
            return;
        }

        self.set_batch_depth_buffer(false);

        let textured = cmd.flags.contains(RenderFlags::TEXTURED);
        let page = self.regs.draw_mode.texture_page;
        let texpage = self.regs.draw_mode.texpage_word();
        let depth = self.current_normalized_depth();
        let color = cmd.color & COLOR_MASK;
        let (orig_u, orig_v) = if textured { (cmd.u as u32, cmd.v as u32) } else { (0, 0) };

        let mut tex_top = orig_v;
        let mut y_offset = 0;
        while y_offset < height {
            let quad_height = (height - y_offset).min(TEXTURE_PAGE_HEIGHT - tex_top);
            let y0 = (pos_y + y_offset as i32) as f32;
            let y1 = y0 + quad_height as f32;
            let tex_bottom = tex_top + quad_height;

            let mut tex_left = orig_u;
            let mut x_offset = 0;
            while x_offset < width {
                let quad_width = (width - x_offset).min(TEXTURE_PAGE_WIDTH - tex_left);
                let x0 = (pos_x + x_offset as i32) as f32;
                let x1 = x0 + quad_width as f32;
                let tex_right = tex_left + quad_width;
                let uv_limits = pack_uv_limits(tex_left, tex_top, tex_right - 1, tex_bottom - 1);

                if textured {
                    self.check_for_texpage_overlap(page, tex_left, tex_top, tex_right - 1, tex_bottom - 1);
                }

                let vertex = |x: f32, y: f32, u: u32, v: u32| {
                    BatchVertex::new(x, y, depth, 1.0, color, texpage, u as u16, v as u16, uv_limits)
                };
                let top_left = vertex(x0, y0, tex_left, tex_top);
                let top_right = vertex(x1, y0, tex_right, tex_top);
                let bottom_left = vertex(x0, y1, tex_left, tex_bottom);
                let bottom_right = vertex(x1, y1, tex_right, tex_bottom);
                for v in [top_left, top_right, bottom_left, bottom_left, top_right, bottom_right] {
                    self.batch.push(v);
                }

                x_offset += quad_width;
                tex_left = 0;
            }

            y_offset += quad_height;
            tex_top = 0;
        }

        let bounds = Bounds {
            min_x: pos_x,
            min_y: pos_y,
            max_x: pos_x + width as i32,
            max_y: pos_y + height as i32,
        };
        self.include_vram_dirty_rect(bounds.clipped(&area));
    }

    /// Draw a line or polyline. Segments that are too long are skipped
    /// individually.
    pub fn draw_line(&mut self, cmd: &DrawLine) {
        let segments = cmd.num_segments() as u32;
        if segments == 0 {
            return;
        }
        let required = if cmd.vertices.len() > 2 {
            cmd.vertices.len() as u32 * 6
        } else {
            6
        };
        self.dispatch_render_command(PrimitiveKind::Line, cmd.flags, required);
        if self.regs.check_mask_before_draw {
            self.current_depth += 1;
        }

        self.set_batch_depth_buffer(false);
        let area = self.regs.drawing_area;
        if !area.is_valid() {
            return;
        }

        let shaded = cmd.flags.contains(RenderFlags::SHADED);
        let depth = self.current_normalized_depth();
        let offset = self.regs.drawing_offset;
        let first_color = cmd.vertices[0].color;
        let to_native = |v: &LineVertex| {
            LineVertex::new(
                offset.x + truncate_vertex_position(v.x),
                offset.y + truncate_vertex_position(v.y),
                if shaded { v.color } else { first_color },
            )
        };

        for pair in cmd.vertices.windows(2) {
            let start = to_native(&pair[0]);
            let end = to_native(&pair[1]);
            let bounds = Bounds::of(&[(start.x, start.y), (end.x, end.y)]);
            if bounds.too_large() {
                log::debug!(
                    "HwRenderer: culling too-large line: {},{} - {},{}",
                    start.x,
                    start.y,
                    end.x,
                    end.y
                );
                continue;
            }

            self.include_vram_dirty_rect(bounds.clipped(&area));
            for v in line_vertices(start, end, depth) {
                self.batch.push(v);
            }
        }
    }
}
