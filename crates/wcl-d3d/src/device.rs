//! Resource allocation (spec.md §3, §4.12): every create call returns an
//! opaque handle into one [`ResourceTable`]. Shaders are cached by bytes
//! so creating one with identical bytecode as an existing shader may
//! return the same handle (spec.md §4.12's "shader cache" note).

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;

use crate::dxbc;
use crate::resource::{CullMode, DepthFunc, Resource, ResourceTable, Shader, ShaderKind, Texture2d};

pub struct Device {
    pub table: ResourceTable,
    shader_cache: HashMap<(ShaderKind, Vec<u8>), usize>,
}

impl Default for Device {
    fn default() -> Self {
        Self::new()
    }
}

impl Device {
    pub fn new() -> Self {
        Self { table: ResourceTable::new(), shader_cache: HashMap::new() }
    }

    pub fn create_buffer(&mut self, data: Vec<u8>) -> usize {
        self.table.insert(Resource::Buffer(data))
    }

    pub fn create_texture2d_color(&mut self, width: u32, height: u32) -> usize {
        self.table.insert(Resource::Texture2d(Texture2d::new_color(width, height)))
    }

    pub fn create_texture2d_depth(&mut self, width: u32, height: u32) -> usize {
        self.table.insert(Resource::Texture2d(Texture2d::new_depth(width, height)))
    }

    pub fn create_render_target_view(&mut self, texture: usize) -> usize {
        self.table.insert(Resource::RenderTargetView { texture })
    }

    pub fn create_depth_stencil_view(&mut self, texture: usize) -> usize {
        self.table.insert(Resource::DepthStencilView { texture })
    }

    pub fn create_shader_resource_view(&mut self, texture: usize) -> usize {
        self.table.insert(Resource::ShaderResourceView { texture })
    }

    pub fn create_sampler_state(&mut self) -> usize {
        self.table.insert(Resource::SamplerState)
    }

    pub fn create_depth_stencil_state(&mut self, depth_enable: bool, func: DepthFunc) -> usize {
        self.table.insert(Resource::DepthStencilState { depth_enable, func })
    }

    pub fn create_rasterizer_state(&mut self, cull_mode: CullMode) -> usize {
        self.table.insert(Resource::RasterizerState { cull_mode })
    }

    pub fn create_descriptor_heap(&mut self, capacity: usize) -> usize {
        self.table.insert(Resource::DescriptorHeap { capacity })
    }

    pub fn create_fence(&mut self) -> usize {
        self.table.insert(Resource::Fence { value: AtomicU64::new(0) })
    }

    /// A malformed blob still yields a shader object (§4.12) — it just
    /// carries no parsed [`dxbc::Program`], so the rasterizer treats it
    /// as fixed-function.
    pub fn create_shader(&mut self, kind: ShaderKind, bytecode: Vec<u8>) -> usize {
        let key = (kind, bytecode.clone());
        if let Some(&handle) = self.shader_cache.get(&key) {
            return handle;
        }
        let program = match dxbc::parse(&bytecode) {
            Ok(p) => Some(p),
            Err(e) => {
                log::warn!("shader bytecode failed to parse, falling back to fixed function: {e}");
                None
            }
        };
        let handle = self.table.insert(Resource::Shader(Shader { kind, bytecode, program }));
        self.shader_cache.insert(key, handle);
        handle
    }

    pub fn create_pipeline(&mut self, vs: usize, ps: usize) -> usize {
        self.table.insert(Resource::Pipeline { vs, ps })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_shader_bytes_share_a_handle() {
        let mut device = Device::new();
        let a = device.create_shader(ShaderKind::Pixel, vec![11, 0, 0, 0]);
        let b = device.create_shader(ShaderKind::Pixel, vec![11, 0, 0, 0]);
        assert_eq!(a, b);
    }

    #[test]
    fn different_shader_kind_is_a_distinct_handle_even_with_same_bytes() {
        let mut device = Device::new();
        let a = device.create_shader(ShaderKind::Vertex, vec![11, 0, 0, 0]);
        let b = device.create_shader(ShaderKind::Pixel, vec![11, 0, 0, 0]);
        assert_ne!(a, b);
    }

    #[test]
    fn malformed_shader_still_creates_an_object() {
        let mut device = Device::new();
        let h = device.create_shader(ShaderKind::Pixel, vec![250, 0, 0, 0]);
        assert!(matches!(device.table.get(h), Some(Resource::Shader(s)) if s.program.is_none()));
    }
}
