// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Primitive draw requests, as handed over by the command decoder.

use bitflags::bitflags;

bitflags! {
    /// Per-primitive render flags decoded from the command word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RenderFlags: u8 {
        /// Gouraud shading; otherwise the first vertex color is used.
        const SHADED = 1 << 0;
        const TEXTURED = 1 << 1;
        /// Texels are not modulated by the vertex color.
        const RAW_TEXTURE = 1 << 2;
        const TRANSPARENT = 1 << 3;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    Polygon,
    Rectangle,
    Line,
}

impl PrimitiveKind {
    /// Whether the hardware dithers this primitive (before the global enable).
    pub fn dithering_enabled(self, flags: RenderFlags) -> bool {
        match self {
            Self::Polygon => {
                flags.contains(RenderFlags::SHADED)
                    || (flags.contains(RenderFlags::TEXTURED) && !flags.contains(RenderFlags::RAW_TEXTURE))
            }
            Self::Line => true,
            Self::Rectangle => false,
        }
    }
}

/// Sub-pixel position and perspective term from the geometry-correction
/// subsystem. Coordinates already include the drawing offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreciseVertex {
    pub x: f32,
    pub y: f32,
    pub w: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PolygonVertex {
    pub x: i32,
    pub y: i32,
    /// `r | g << 8 | b << 16`
    pub color: u32,
    pub u: u8,
    pub v: u8,
    pub precise: Option<PreciseVertex>,
}

impl PolygonVertex {
    pub fn new(x: i32, y: i32, color: u32) -> Self {
        Self {
            x,
            y,
            color,
            ..Self::default()
        }
    }

    pub fn textured(x: i32, y: i32, color: u32, u: u8, v: u8) -> Self {
        Self {
            x,
            y,
            color,
            u,
            v,
            precise: None,
        }
    }
}

/// A triangle or quad.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawPolygon {
    pub flags: RenderFlags,
    pub vertices: [PolygonVertex; 4],
    pub quad: bool,
}

impl DrawPolygon {
    pub fn triangle(flags: RenderFlags, vertices: [PolygonVertex; 3]) -> Self {
        Self {
            flags,
            vertices: [vertices[0], vertices[1], vertices[2], PolygonVertex::default()],
            quad: false,
        }
    }

    pub fn quad(flags: RenderFlags, vertices: [PolygonVertex; 4]) -> Self {
        Self {
            flags,
            vertices,
            quad: true,
        }
    }

    pub fn num_vertices(&self) -> usize {
        if self.quad {
            4
        } else {
            3
        }
    }

    pub fn vertices(&self) -> &[PolygonVertex] {
        &self.vertices[..self.num_vertices()]
    }
}

/// A screen-aligned sprite or tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawRectangle {
    pub flags: RenderFlags,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub color: u32,
    pub u: u8,
    pub v: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineVertex {
    pub x: i32,
    pub y: i32,
    pub color: u32,
}

impl LineVertex {
    pub fn new(x: i32, y: i32, color: u32) -> Self {
        Self { x, y, color }
    }
}

/// A line, or a polyline when more than two vertices are given.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawLine {
    pub flags: RenderFlags,
    pub vertices: Vec<LineVertex>,
}

impl DrawLine {
    pub fn new(flags: RenderFlags, start: LineVertex, end: LineVertex) -> Self {
        Self {
            flags,
            vertices: vec![start, end],
        }
    }

    pub fn polyline(flags: RenderFlags, vertices: Vec<LineVertex>) -> Self {
        Self { flags, vertices }
    }

    pub fn num_segments(&self) -> usize {
        self.vertices.len().saturating_sub(1)
    }
}
