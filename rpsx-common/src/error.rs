// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

/// Shader stage, used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Geometry => write!(f, "geometry"),
            Self::Fragment => write!(f, "fragment"),
        }
    }
}

/// Errors surfaced by the renderer. All of them are fatal for the operation
/// that produced them; configuration problems are handled locally instead.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("failed to compile {stage} shader: {name}")]
    ShaderCompilation { stage: ShaderStage, name: String },

    #[error("failed to create pipeline: {0}")]
    PipelineCreation(String),

    #[error("failed to create {width}x{height} texture ({what})")]
    TextureCreation {
        what: &'static str,
        width: u32,
        height: u32,
    },

    #[error("failed to create buffer: {0}")]
    BufferCreation(&'static str),

    #[error(
        "VRAM surface mismatch: expected {expected_width}x{expected_height}x{expected_samples}, \
         got {width}x{height}x{samples}"
    )]
    SurfaceMismatch {
        expected_width: u32,
        expected_height: u32,
        expected_samples: u32,
        width: u32,
        height: u32,
        samples: u32,
    },

    #[error("VRAM readback of {width}x{height} at ({x}, {y}) failed")]
    Readback { x: u32, y: u32, width: u32, height: u32 },

    #[error("renderer has no GPU surfaces")]
    NoSurfaces,

    #[error("invalid VRAM snapshot: {0}")]
    InvalidSnapshot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type GpuResult<T> = Result<T, GpuError>;
