// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Rendering-state enums, the pipeline permutation key and the batch vertex
//! layout shared between the engine and device backends.

// ── Texture modes ────────────────────────────────────────────────────────────

/// Texel color depth selected by the texture page register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureColorMode {
    Palette4Bit,
    Palette8Bit,
    Direct16Bit,
}

impl TextureColorMode {
    /// Decode texpage bits 7-8. Mode 3 behaves as 16-bit direct.
    pub fn from_raw(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Palette4Bit,
            1 => Self::Palette8Bit,
            _ => Self::Direct16Bit,
        }
    }

    /// Horizontal texels per VRAM pixel, as a shift.
    pub fn texel_shift(self) -> u32 {
        match self {
            Self::Palette4Bit => 2,
            Self::Palette8Bit => 1,
            Self::Direct16Bit => 0,
        }
    }
}

/// Texture mode of a batch: the texpage color mode plus the raw bit, or
/// disabled for untextured primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TextureMode {
    Palette4Bit = 0,
    Palette8Bit = 1,
    Direct16Bit = 2,
    Reserved16Bit = 3,
    RawPalette4Bit = 4,
    RawPalette8Bit = 5,
    RawDirect16Bit = 6,
    RawReserved16Bit = 7,
    Disabled = 8,
}

impl TextureMode {
    pub const COUNT: usize = 9;
    pub const RAW_TEXTURE_BIT: u8 = 4;

    pub const ALL: [Self; Self::COUNT] = [
        Self::Palette4Bit,
        Self::Palette8Bit,
        Self::Direct16Bit,
        Self::Reserved16Bit,
        Self::RawPalette4Bit,
        Self::RawPalette8Bit,
        Self::RawDirect16Bit,
        Self::RawReserved16Bit,
        Self::Disabled,
    ];

    /// Build from texpage color mode bits (0-3) and the raw-texture flag.
    pub fn from_texpage_bits(mode_bits: u32, raw: bool) -> Self {
        let index = (mode_bits & 3) as usize + if raw { Self::RAW_TEXTURE_BIT as usize } else { 0 };
        Self::ALL[index]
    }

    pub fn is_enabled(self) -> bool {
        self != Self::Disabled
    }

    pub fn is_raw(self) -> bool {
        self != Self::Disabled && (self as u8) & Self::RAW_TEXTURE_BIT != 0
    }

    pub fn color_mode(self) -> Option<TextureColorMode> {
        match self {
            Self::Disabled => None,
            m => Some(TextureColorMode::from_raw(m as u32)),
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

// ── Transparency ─────────────────────────────────────────────────────────────

/// Semi-transparency equation, `B` = background, `F` = foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransparencyMode {
    /// B/2 + F/2
    HalfBackgroundPlusHalfForeground = 0,
    /// B + F
    BackgroundPlusForeground = 1,
    /// B - F
    BackgroundMinusForeground = 2,
    /// B + F/4
    BackgroundPlusQuarterForeground = 3,
    Disabled = 4,
}

impl TransparencyMode {
    pub const COUNT: usize = 5;

    pub const ALL: [Self; Self::COUNT] = [
        Self::HalfBackgroundPlusHalfForeground,
        Self::BackgroundPlusForeground,
        Self::BackgroundMinusForeground,
        Self::BackgroundPlusQuarterForeground,
        Self::Disabled,
    ];

    /// Decode texpage bits 5-6.
    pub fn from_raw(bits: u32) -> Self {
        Self::ALL[(bits & 3) as usize]
    }

    /// Source and destination blend factors.
    pub fn alpha_factors(self) -> (f32, f32) {
        match self {
            Self::HalfBackgroundPlusHalfForeground => (0.5, 0.5),
            Self::BackgroundPlusForeground | Self::BackgroundMinusForeground => (1.0, 1.0),
            Self::BackgroundPlusQuarterForeground => (0.25, 1.0),
            Self::Disabled => (1.0, 0.0),
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Which pixels of a batch a draw produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BatchRenderMode {
    TransparencyDisabled = 0,
    TransparentAndOpaque = 1,
    OnlyOpaque = 2,
    OnlyTransparent = 3,
}

impl BatchRenderMode {
    pub const COUNT: usize = 4;

    pub const ALL: [Self; Self::COUNT] = [
        Self::TransparencyDisabled,
        Self::TransparentAndOpaque,
        Self::OnlyOpaque,
        Self::OnlyTransparent,
    ];

    pub fn for_transparency(mode: TransparencyMode) -> Self {
        if mode == TransparencyMode::Disabled {
            Self::TransparencyDisabled
        } else {
            Self::TransparentAndOpaque
        }
    }
}

/// Depth comparison used by a batch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DepthTest {
    Always = 0,
    /// Mask-bit check: the stored depth of masked pixels beats newer primitives.
    GreaterEqual = 1,
    /// PGXP depth buffer.
    LessEqual = 2,
}

impl DepthTest {
    pub const COUNT: usize = 3;
    pub const ALL: [Self; Self::COUNT] = [Self::Always, Self::GreaterEqual, Self::LessEqual];
}

/// How an interlaced display is recombined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum InterlacedRenderMode {
    None = 0,
    /// Both fields live in VRAM at full height.
    InterleavedFields = 1,
    /// Each field is rendered to the same lines and woven on output.
    SeparateFields = 2,
}

impl InterlacedRenderMode {
    pub const COUNT: usize = 3;
    pub const ALL: [Self; Self::COUNT] = [Self::None, Self::InterleavedFields, Self::SeparateFields];
}

// ── Pipeline key ─────────────────────────────────────────────────────────────

/// One batch pipeline permutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub depth_test: DepthTest,
    pub render_mode: BatchRenderMode,
    pub texture_mode: TextureMode,
    pub transparency_mode: TransparencyMode,
    pub dithering: bool,
    pub interlacing: bool,
}

impl PipelineKey {
    pub fn is_textured(&self) -> bool {
        self.texture_mode.is_enabled()
    }
}

// ── Vertex and uniform layout ────────────────────────────────────────────────

/// Pack per-primitive UV clamp limits.
#[inline]
pub const fn pack_uv_limits(min_u: u32, min_v: u32, max_u: u32, max_v: u32) -> u32 {
    min_u | (min_v << 8) | (max_u << 16) | (max_v << 24)
}

/// Unpack UV limits into `(min_u, min_v, max_u, max_v)`.
#[inline]
pub const fn unpack_uv_limits(limits: u32) -> (u32, u32, u32, u32) {
    (
        limits & 0xFF,
        (limits >> 8) & 0xFF,
        (limits >> 16) & 0xFF,
        limits >> 24,
    )
}

/// A vertex as written into the mapped vertex buffer.
///
/// Positions are in native (unscaled) VRAM coordinates. `z` is the ordering
/// depth, `w` the perspective term from precise geometry (1.0 otherwise).
/// `color` is packed `r | g << 8 | b << 16`; `texpage` is the texpage
/// register in the low half and the palette register in the high half.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[repr(C)]
pub struct BatchVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
    pub color: u32,
    pub texpage: u32,
    pub u: u16,
    pub v: u16,
    pub uv_limits: u32,
}

impl BatchVertex {
    #[allow(clippy::too_many_arguments)]
    pub fn new(x: f32, y: f32, z: f32, w: f32, color: u32, texpage: u32, u: u16, v: u16, uv_limits: u32) -> Self {
        Self {
            x,
            y,
            z,
            w,
            color,
            texpage,
            u,
            v,
            uv_limits,
        }
    }
}

/// Per-batch constants.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatchUniforms {
    pub texture_window_and: [u32; 2],
    pub texture_window_or: [u32; 2],
    pub src_alpha_factor: f32,
    pub dst_alpha_factor: f32,
    pub interlaced_displayed_field: u32,
    pub set_mask_while_drawing: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_mode_from_texpage() {
        assert_eq!(TextureMode::from_texpage_bits(0, false), TextureMode::Palette4Bit);
        assert_eq!(TextureMode::from_texpage_bits(2, true), TextureMode::RawDirect16Bit);
        assert_eq!(TextureMode::from_texpage_bits(3, false), TextureMode::Reserved16Bit);
        assert!(TextureMode::RawPalette8Bit.is_raw());
        assert!(!TextureMode::Disabled.is_raw());
        assert_eq!(TextureMode::Reserved16Bit.color_mode(), Some(TextureColorMode::Direct16Bit));
        assert_eq!(TextureMode::RawPalette8Bit.color_mode(), Some(TextureColorMode::Palette8Bit));
    }

    #[test]
    fn test_uv_limits_packing() {
        let packed = pack_uv_limits(1, 2, 254, 255);
        assert_eq!(packed, 0xFFFE_0201);
        assert_eq!(unpack_uv_limits(packed), (1, 2, 254, 255));
    }

    #[test]
    fn test_alpha_factors() {
        assert_eq!(TransparencyMode::BackgroundPlusQuarterForeground.alpha_factors(), (0.25, 1.0));
        assert_eq!(TransparencyMode::from_raw(2), TransparencyMode::BackgroundMinusForeground);
    }
}
