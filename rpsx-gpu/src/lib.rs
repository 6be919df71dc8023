// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Hardware-accelerated PS1 GPU renderer for rpsx.
//!
//! Primitives and VRAM transfers decoded from the GPU command stream are
//! batched into draws on a [`backend::GpuDevice`] at an upscaled
//! resolution, while keeping the ordering, masking and texture-feedback
//! behavior of the original hardware.

pub mod backend;
pub mod draw_mode;
pub mod gpu_context;
pub mod host;
pub mod hw;
pub mod primitive;
pub mod progress;
pub mod shadergen;
pub mod types;
pub mod vram;

pub use gpu_context::{GpuCommand, GpuContext};
pub use hw::HardwareRenderer;
