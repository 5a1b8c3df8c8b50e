//! D3D software rasterizer (spec.md §4.12 / C12): behind the D3D11
//! device, context, swap-chain, buffer, view, shader, and state
//! interfaces `wcl_win32::d3d11` exposes to a loaded PE, a pure-Rust
//! resource table, command recorder, DXBC interpreter, and triangle
//! rasterizer. Grounded on `wgpu-hal::dx12`'s resource/command/fence
//! shape (`other_examples/.../dx12/mod.rs`), reimplemented against a
//! software framebuffer instead of a real GPU.

pub mod command;
pub mod context;
pub mod device;
pub mod dxbc;
pub mod error;
pub mod fence;
pub mod resource;
