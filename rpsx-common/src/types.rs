// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! VRAM geometry, rectangles and pixel format helpers shared by the renderer
//! and the frontend.

// ── VRAM geometry ────────────────────────────────────────────────────────────

/// VRAM width in 16-bit pixels.
pub const VRAM_WIDTH: u32 = 1024;

/// VRAM height in 16-bit pixels.
pub const VRAM_HEIGHT: u32 = 512;

pub const VRAM_WIDTH_MASK: u32 = VRAM_WIDTH - 1;
pub const VRAM_HEIGHT_MASK: u32 = VRAM_HEIGHT - 1;

/// Number of 16-bit pixels in VRAM.
pub const VRAM_PIXEL_COUNT: usize = (VRAM_WIDTH * VRAM_HEIGHT) as usize;

/// Size of a texture page in texels (both axes).
pub const TEXTURE_PAGE_WIDTH: u32 = 256;
pub const TEXTURE_PAGE_HEIGHT: u32 = 256;

/// Primitives at least this wide or tall are dropped.
pub const MAX_PRIMITIVE_WIDTH: u32 = 1024;
pub const MAX_PRIMITIVE_HEIGHT: u32 = 512;

/// Exclusive upper bound of the per-primitive depth counter.
pub const MAX_BATCH_VERTEX_COUNTER_IDS: u32 = 65535;

/// Worst-case vertex count for one rectangle after splitting at texture page
/// boundaries (two triangles per piece).
pub const MAX_VERTICES_FOR_RECTANGLE: u32 = 6
    * (MAX_PRIMITIVE_WIDTH.div_ceil(TEXTURE_PAGE_WIDTH) + 1)
    * (MAX_PRIMITIVE_HEIGHT.div_ceil(TEXTURE_PAGE_HEIGHT) + 1);

/// Sign-extend an 11-bit vertex coordinate.
#[inline]
pub const fn truncate_vertex_position(v: i32) -> i32 {
    (v << 21) >> 21
}

// ── Rectangles ───────────────────────────────────────────────────────────────

/// Axis-aligned rectangle in VRAM pixel coordinates, right/bottom exclusive.
///
/// An empty rectangle is "invalid". The invalid sentinel has `left`/`top` at
/// `u32::MAX` so that including any valid rectangle replaces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub const INVALID: Self = Self {
        left: u32::MAX,
        top: u32::MAX,
        right: 0,
        bottom: 0,
    };

    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self { left, top, right, bottom }
    }

    pub const fn from_extents(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            left: x,
            top: y,
            right: x + width,
            bottom: y + height,
        }
    }

    /// The whole of VRAM.
    pub const fn vram() -> Self {
        Self::new(0, 0, VRAM_WIDTH, VRAM_HEIGHT)
    }

    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.left < self.right && self.top < self.bottom
    }

    #[inline]
    pub const fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    #[inline]
    pub const fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn set_invalid(&mut self) {
        *self = Self::INVALID;
    }

    /// Grow this rectangle to the union with `other`. Invalid inputs are ignored.
    pub fn include(&mut self, other: &Rect) {
        if !other.is_valid() {
            return;
        }
        if !self.is_valid() {
            *self = *other;
            return;
        }
        self.left = self.left.min(other.left);
        self.top = self.top.min(other.top);
        self.right = self.right.max(other.right);
        self.bottom = self.bottom.max(other.bottom);
    }

    pub const fn intersects(&self, other: &Rect) -> bool {
        self.is_valid()
            && other.is_valid()
            && self.left < other.right
            && other.left < self.right
            && self.top < other.bottom
            && other.top < self.bottom
    }

    /// True if `other` lies entirely inside this rectangle.
    pub const fn contains(&self, other: &Rect) -> bool {
        other.is_valid()
            && self.left <= other.left
            && self.top <= other.top
            && self.right >= other.right
            && self.bottom >= other.bottom
    }

    pub const fn contains_point(&self, x: u32, y: u32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Clamp each edge into `[min, max]` of the given bounds.
    pub fn clamped(&self, left: u32, top: u32, right: u32, bottom: u32) -> Rect {
        Rect {
            left: self.left.clamp(left, right),
            top: self.top.clamp(top, bottom),
            right: self.right.clamp(left, right),
            bottom: self.bottom.clamp(top, bottom),
        }
    }

    pub const fn scaled(&self, scale: u32) -> Rect {
        Rect {
            left: self.left * scale,
            top: self.top * scale,
            right: self.right * scale,
            bottom: self.bottom * scale,
        }
    }
}

impl Default for Rect {
    fn default() -> Self {
        Self::INVALID
    }
}

/// Bounds of a VRAM transfer that may wrap around either axis.
///
/// A transfer that wraps is widened to the full span of the wrapping axis, so
/// the result always covers both halves of the wrapped region.
pub fn vram_transfer_bounds(x: u32, y: u32, width: u32, height: u32) -> Rect {
    let mut out = Rect::from_extents(x % VRAM_WIDTH, y % VRAM_HEIGHT, width, height);
    if out.right > VRAM_WIDTH {
        out.left = 0;
        out.right = VRAM_WIDTH;
    }
    if out.bottom > VRAM_HEIGHT {
        out.top = 0;
        out.bottom = VRAM_HEIGHT;
    }
    out
}

// ── Pixel formats ────────────────────────────────────────────────────────────

/// Expand a 5-bit channel to 8 bits.
#[inline]
pub const fn expand5(v: u32) -> u32 {
    (v << 3) | (v & 7)
}

/// VRAM 5551 (bit 15 = mask) to packed RGBA8 (`r | g << 8 | b << 16 | a << 24`).
#[inline]
pub const fn rgba5551_to_rgba8888(color: u16) -> u32 {
    let c = color as u32;
    let r = expand5(c & 31);
    let g = expand5((c >> 5) & 31);
    let b = expand5((c >> 10) & 31);
    let a = if c & 0x8000 != 0 { 0xFF } else { 0 };
    r | (g << 8) | (b << 16) | (a << 24)
}

/// Packed RGBA8 to VRAM 5551. Alpha >= 0x80 sets the mask bit.
#[inline]
pub const fn rgba8888_to_rgba5551(color: u32) -> u16 {
    let r = (color & 0xFF) >> 3;
    let g = ((color >> 8) & 0xFF) >> 3;
    let b = ((color >> 16) & 0xFF) >> 3;
    let a = ((color >> 24) & 0xFF) >> 7;
    (r | (g << 5) | (b << 10) | (a << 15)) as u16
}

/// Split a packed RGBA8 value into channels.
#[inline]
pub const fn unpack_rgba8(color: u32) -> [u8; 4] {
    color.to_le_bytes()
}

#[inline]
pub const fn pack_rgba8(rgba: [u8; 4]) -> u32 {
    u32::from_le_bytes(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_vertices_for_rectangle() {
        assert_eq!(MAX_VERTICES_FOR_RECTANGLE, 6 * 5 * 3);
    }

    #[test]
    fn test_truncate_vertex_position() {
        assert_eq!(truncate_vertex_position(0x7FF), -1);
        assert_eq!(truncate_vertex_position(0x3FF), 0x3FF);
        assert_eq!(truncate_vertex_position(0x400), -1024);
    }

    #[test]
    fn test_rect_include_from_invalid() {
        let mut r = Rect::INVALID;
        assert!(!r.is_valid());
        r.include(&Rect::from_extents(10, 20, 5, 5));
        assert_eq!(r, Rect::new(10, 20, 15, 25));
        r.include(&Rect::from_extents(0, 0, 1, 1));
        assert_eq!(r, Rect::new(0, 0, 15, 25));
        r.include(&Rect::INVALID);
        assert_eq!(r, Rect::new(0, 0, 15, 25));
    }

    #[test]
    fn test_rect_intersects_edges() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(a.intersects(&Rect::new(9, 9, 20, 20)));
        assert!(!a.intersects(&Rect::new(10, 0, 20, 10)));
        assert!(!a.intersects(&Rect::INVALID));
        assert!(a.contains(&Rect::new(2, 2, 10, 10)));
        assert!(!a.contains(&Rect::new(2, 2, 11, 10)));
    }

    #[test]
    fn test_transfer_bounds_wrap() {
        assert_eq!(vram_transfer_bounds(10, 10, 20, 20), Rect::new(10, 10, 30, 30));
        assert_eq!(vram_transfer_bounds(1000, 10, 100, 20), Rect::new(0, 10, 1024, 30));
        assert_eq!(vram_transfer_bounds(1034, 500, 10, 20), Rect::new(10, 0, 20, 512));
    }

    #[test]
    fn test_pixel_conversion() {
        assert_eq!(rgba8888_to_rgba5551(0x8000FFFF), 0x83FF);
        assert_eq!(rgba8888_to_rgba5551(0x00FFFFFF), 0x7FFF);
        assert_eq!(rgba5551_to_rgba8888(0x83FF), 0xFF00FFFF);
        for v in [0u16, 0x1234, 0x7FFF, 0x8001, 0xFFFF] {
            assert_eq!(rgba8888_to_rgba5551(rgba5551_to_rgba8888(v)), v);
        }
    }
}
