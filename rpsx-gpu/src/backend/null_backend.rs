// SPDX-FileCopyrightText: 2025 ruzu contributors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Null device: every object is created, every command is silently dropped.
//!
//! Useful for measuring how the engine batches work without rendering it.

use std::collections::HashMap;

use super::{
    DeviceFeatures, GpuDevice, GraphicsConfig, PipelineHandle, PushConstants, SamplerKind,
    ShaderHandle, ShaderStage, TextureDesc, TextureHandle, VertexBufferMap,
};
use crate::types::{BatchUniforms, BatchVertex};

/// Vertices per mapping handed out by the null device.
const NULL_VERTEX_BUFFER_SPACE: u32 = 1 << 16;

pub struct NullDevice {
    features: DeviceFeatures,
    next_handle: u32,
    textures: HashMap<u32, TextureDesc>,
    live_pipelines: usize,
    live_shaders: usize,
    /// Number of draw calls issued.
    pub draw_calls: u64,
    /// Number of vertices made visible through unmap.
    pub vertices_uploaded: u64,
}

impl NullDevice {
    pub fn new() -> Self {
        Self::with_features(DeviceFeatures::all())
    }

    pub fn with_features(features: DeviceFeatures) -> Self {
        Self {
            features,
            next_handle: 1,
            textures: HashMap::new(),
            live_pipelines: 0,
            live_shaders: 0,
            draw_calls: 0,
            vertices_uploaded: 0,
        }
    }

    pub fn live_pipelines(&self) -> usize {
        self.live_pipelines
    }

    pub fn live_shaders(&self) -> usize {
        self.live_shaders
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    fn alloc_handle(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for NullDevice {
    fn name(&self) -> &str {
        "null"
    }

    fn features(&self) -> DeviceFeatures {
        self.features
    }

    fn max_texture_size(&self) -> u32 {
        16384
    }

    fn max_multisamples(&self) -> u32 {
        8
    }

    fn create_texture(&mut self, desc: &TextureDesc) -> Option<TextureHandle> {
        let h = self.alloc_handle();
        self.textures.insert(h, *desc);
        Some(TextureHandle(h))
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        self.textures.get(&texture.0).copied()
    }

    fn create_shader(&mut self, _stage: ShaderStage, _name: &str, _source: &str) -> Option<ShaderHandle> {
        self.live_shaders += 1;
        Some(ShaderHandle(self.alloc_handle()))
    }

    fn destroy_shader(&mut self, _shader: ShaderHandle) {
        self.live_shaders = self.live_shaders.saturating_sub(1);
    }

    fn create_pipeline(&mut self, _config: &GraphicsConfig) -> Option<PipelineHandle> {
        self.live_pipelines += 1;
        Some(PipelineHandle(self.alloc_handle()))
    }

    fn destroy_pipeline(&mut self, _pipeline: PipelineHandle) {
        self.live_pipelines = self.live_pipelines.saturating_sub(1);
    }

    fn map_vertex_buffer(&mut self, _required: u32) -> VertexBufferMap {
        VertexBufferMap {
            base_vertex: 0,
            space: NULL_VERTEX_BUFFER_SPACE,
        }
    }

    fn unmap_vertex_buffer(&mut self, vertices: &[BatchVertex]) {
        self.vertices_uploaded += vertices.len() as u64;
    }

    fn upload_texture_buffer(&mut self, _data: &[u16]) -> Option<u32> {
        Some(0)
    }

    fn upload_uniform_buffer(&mut self, _uniforms: &BatchUniforms) {}

    fn push_constants(&mut self, _constants: &PushConstants) {}

    fn set_pipeline(&mut self, _pipeline: PipelineHandle) {}

    fn set_render_target(&mut self, _color: Option<TextureHandle>, _depth: Option<TextureHandle>) {}

    fn set_texture(&mut self, _slot: u32, _texture: Option<TextureHandle>, _sampler: SamplerKind) {}

    fn set_viewport(&mut self, _x: u32, _y: u32, _width: u32, _height: u32) {}

    fn set_scissor(&mut self, _x: u32, _y: u32, _width: u32, _height: u32) {}

    fn draw(&mut self, _vertex_count: u32, _base_vertex: u32) {
        self.draw_calls += 1;
    }

    fn clear_render_target(&mut self, _texture: TextureHandle, _color: u32) {}

    fn clear_depth(&mut self, _texture: TextureHandle, _depth: f32) {}

    fn copy_texture_region(
        &mut self,
        _dst: TextureHandle,
        _dst_x: u32,
        _dst_y: u32,
        _dst_level: u32,
        _src: TextureHandle,
        _src_x: u32,
        _src_y: u32,
        _src_level: u32,
        _width: u32,
        _height: u32,
    ) {
    }

    fn resolve_texture_region(
        &mut self,
        _dst: TextureHandle,
        _dst_x: u32,
        _dst_y: u32,
        _src: TextureHandle,
        _src_x: u32,
        _src_y: u32,
        _width: u32,
        _height: u32,
    ) {
    }

    fn download_texture(
        &mut self,
        _texture: TextureHandle,
        _x: u32,
        _y: u32,
        _width: u32,
        _height: u32,
        out: &mut [u32],
    ) -> bool {
        out.fill(0);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{TextureFormat, TextureKind};

    #[test]
    fn test_null_device_tracks_objects() {
        let mut dev = NullDevice::new();
        let tex = dev
            .create_texture(&TextureDesc::new(64, 64, TextureKind::Texture, TextureFormat::Rgba8))
            .unwrap();
        assert_eq!(dev.texture_desc(tex).unwrap().width, 64);
        dev.destroy_texture(tex);
        assert_eq!(dev.live_textures(), 0);
        assert!(dev.texture_desc(tex).is_none());

        dev.draw(3, 0);
        dev.draw(6, 3);
        assert_eq!(dev.draw_calls, 2);
    }
}
