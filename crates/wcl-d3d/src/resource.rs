//! D3D resources (spec.md §3, §4.12): a variant type over every object a
//! D3D11 device creates, stored in one slot table indexed by an opaque
//! handle. Grounded on `wcl_win32::handle::HandleTable`'s "index+1, never
//! zero" shape, reimplemented here so `wcl-d3d` has no dependency on
//! `wcl-win32` (the dependency runs the other way: `wcl-win32::d3d11`
//! wraps this crate's [`Device`](crate::device::Device) in COM vtables).

use std::collections::HashMap;

use crate::dxbc::Program;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CullMode {
    None,
    Back,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DepthFunc {
    Less,
    Always,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ShaderKind {
    Vertex,
    Pixel,
}

pub struct Shader {
    pub kind: ShaderKind,
    pub bytecode: Vec<u8>,
    /// `None` means the blob failed to parse; callers fall back to the
    /// fixed-function path rather than treating this as an error.
    pub program: Option<Program>,
}

pub struct Texture2d {
    pub width: u32,
    pub height: u32,
    /// One `f32` per texel for depth-stencil textures, one packed XRGB8888
    /// `u32` per texel for color textures; callers know which from the
    /// view that wraps this texture.
    pub color: Vec<u32>,
    pub depth: Vec<f32>,
}

impl Texture2d {
    pub fn new_color(width: u32, height: u32) -> Self {
        Self { width, height, color: vec![0; (width * height) as usize], depth: Vec::new() }
    }

    pub fn new_depth(width: u32, height: u32) -> Self {
        Self { width, height, color: Vec::new(), depth: vec![1.0; (width * height) as usize] }
    }
}

pub enum Resource {
    Buffer(Vec<u8>),
    Texture2d(Texture2d),
    RenderTargetView { texture: usize },
    DepthStencilView { texture: usize },
    ShaderResourceView { texture: usize },
    SamplerState,
    DepthStencilState { depth_enable: bool, func: DepthFunc },
    RasterizerState { cull_mode: CullMode },
    Shader(Shader),
    Pipeline { vs: usize, ps: usize },
    DescriptorHeap { capacity: usize },
    Fence { value: std::sync::atomic::AtomicU64 },
}

/// Handles are never zero; slot `n` maps to handle `n+1` (spec.md §6's
/// handle-range convention applied internally).
#[derive(Default)]
pub struct ResourceTable {
    slots: HashMap<usize, Resource>,
    next: usize,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self { slots: HashMap::new(), next: 1 }
    }

    pub fn insert(&mut self, resource: Resource) -> usize {
        let handle = self.next.max(1);
        self.next = handle + 1;
        self.slots.insert(handle, resource);
        handle
    }

    pub fn get(&self, handle: usize) -> Option<&Resource> {
        self.slots.get(&handle)
    }

    pub fn get_mut(&mut self, handle: usize) -> Option<&mut Resource> {
        self.slots.get_mut(&handle)
    }

    pub fn remove(&mut self, handle: usize) -> Option<Resource> {
        self.slots.remove(&handle)
    }
}
