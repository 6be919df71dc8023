// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! CPU-side VRAM: the shadow buffer filled by readbacks, and a serializable
//! snapshot of native VRAM contents.
//!
//! Snapshot layout (little-endian):
//!
//! | Offset | Size      | Field                    |
//! |--------|-----------|--------------------------|
//! | 0x00   | 4         | magic `RVRM`             |
//! | 0x04   | 4         | width (1024)             |
//! | 0x08   | 4         | height (512)             |
//! | 0x0C   | 2 × w × h | RGBA5551 pixels, row-major |

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use rpsx_common::{GpuError, GpuResult, VRAM_HEIGHT, VRAM_PIXEL_COUNT, VRAM_WIDTH};

/// Snapshot magic, "RVRM".
pub const SNAPSHOT_MAGIC: u32 = 0x4D52_5652;

/// Native 16-bit copy of VRAM as last read back from the GPU.
#[derive(Clone)]
pub struct VramShadow {
    pixels: Vec<u16>,
}

impl VramShadow {
    pub fn new() -> Self {
        Self {
            pixels: vec![0; VRAM_PIXEL_COUNT],
        }
    }

    #[inline]
    fn index(x: u32, y: u32) -> usize {
        ((y % VRAM_HEIGHT) * VRAM_WIDTH + (x % VRAM_WIDTH)) as usize
    }

    pub fn get(&self, x: u32, y: u32) -> u16 {
        self.pixels[Self::index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: u16) {
        self.pixels[Self::index(x, y)] = value;
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
    }

    /// Store a row-major block read from the GPU. The block may wrap.
    pub fn write_block(&mut self, x: u32, y: u32, width: u32, height: u32, data: &[u16]) {
        for row in 0..height {
            for col in 0..width {
                if let Some(&v) = data.get((row * width + col) as usize) {
                    self.set(x + col, y + row, v);
                }
            }
        }
    }

    /// Copy out a (possibly wrapping) block.
    pub fn read_block(&self, x: u32, y: u32, width: u32, height: u32) -> Vec<u16> {
        let mut out = Vec::with_capacity((width * height) as usize);
        for row in 0..height {
            for col in 0..width {
                out.push(self.get(x + col, y + row));
            }
        }
        out
    }

    pub fn snapshot(&self) -> VramSnapshot {
        VramSnapshot {
            pixels: self.pixels.clone(),
        }
    }
}

impl Default for VramShadow {
    fn default() -> Self {
        Self::new()
    }
}

/// Native VRAM contents, as saved to disk or dumped by the frontend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VramSnapshot {
    pub pixels: Vec<u16>,
}

impl VramSnapshot {
    pub fn write_to<W: Write>(&self, w: &mut W) -> GpuResult<()> {
        w.write_u32::<LittleEndian>(SNAPSHOT_MAGIC)?;
        w.write_u32::<LittleEndian>(VRAM_WIDTH)?;
        w.write_u32::<LittleEndian>(VRAM_HEIGHT)?;
        for &p in &self.pixels {
            w.write_u16::<LittleEndian>(p)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> GpuResult<Self> {
        let magic = r.read_u32::<LittleEndian>()?;
        if magic != SNAPSHOT_MAGIC {
            return Err(GpuError::InvalidSnapshot(format!("bad magic 0x{:08X}", magic)));
        }
        let width = r.read_u32::<LittleEndian>()?;
        let height = r.read_u32::<LittleEndian>()?;
        if width != VRAM_WIDTH || height != VRAM_HEIGHT {
            return Err(GpuError::InvalidSnapshot(format!("unexpected size {}x{}", width, height)));
        }
        let mut pixels = vec![0u16; VRAM_PIXEL_COUNT];
        r.read_u16_into::<LittleEndian>(&mut pixels)?;
        Ok(Self { pixels })
    }
}
