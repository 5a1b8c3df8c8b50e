//! Direct3D surfaces (spec.md §4.10, §4.12): `d3d11.dll`'s
//! `D3D11CreateDeviceAndSwapChain` and `dxgi.dll`'s `CreateDXGIFactory1`,
//! wrapping `wcl_d3d`'s software rasterizer in the same vtable-as-first-
//! field COM shape as [`crate::dsound`]/[`crate::xaudio2`]. One guest
//! process gets a device, an immediate context, and a swap chain for
//! ordinary D3D11-style drawing; it can also mint the command-list/queue/
//! fence family spec.md §3 describes in D3D12 terms, all replaying
//! against the same [`wcl_d3d::device::Device`] underneath — this runtime
//! draws the same triangles either way, it just records them differently.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use wcl_d3d::command::{Command, Viewport};
use wcl_d3d::context::Context;
use wcl_d3d::device::Device as RasterDevice;
use wcl_d3d::resource::{CullMode, DepthFunc, Resource, ShaderKind};

use crate::types::{BOOL, FALSE, HWND};

const S_OK: i32 = 0;
const E_FAIL: i32 = -2147467259;
const E_NOINTERFACE: i32 = -2147467262;

/// Opaque families distinct from the HWND/HDC/GDI ranges (spec.md §6):
/// root signatures carry no state this rasterizer consumes, so they are
/// just unique tokens; pipeline-state handles are `wcl_d3d` resource
/// handles shifted into their own range.
const ROOT_SIGNATURE_BASE: usize = 0x67000;
const PIPELINE_STATE_BASE: usize = 0x68000;
static NEXT_ROOT_SIGNATURE: AtomicUsize = AtomicUsize::new(1);

struct Shared {
    raster: Mutex<RasterDevice>,
}

fn rt_dims(shared: &Shared, rtv: usize) -> (u32, u32) {
    let raster = shared.raster.lock().unwrap();
    let tex = match raster.table.get(rtv) {
        Some(Resource::RenderTargetView { texture }) => *texture,
        _ => return (0, 0),
    };
    match raster.table.get(tex) {
        Some(Resource::Texture2d(t)) => (t.width, t.height),
        _ => (0, 0),
    }
}

// ---------------------------------------------------------------- Device

#[repr(C)]
struct DeviceVtbl {
    query_interface: extern "win64" fn(*mut D3dDevice, usize, *mut usize) -> i32,
    add_ref: extern "win64" fn(*mut D3dDevice) -> u32,
    release: extern "win64" fn(*mut D3dDevice) -> u32,
    create_buffer: unsafe extern "win64" fn(*mut D3dDevice, *const u8, usize, *mut usize) -> i32,
    create_texture2d: extern "win64" fn(*mut D3dDevice, u32, u32, BOOL, *mut usize) -> i32,
    create_render_target_view: extern "win64" fn(*mut D3dDevice, usize, *mut usize) -> i32,
    create_depth_stencil_view: extern "win64" fn(*mut D3dDevice, usize, *mut usize) -> i32,
    create_shader_resource_view: extern "win64" fn(*mut D3dDevice, usize, *mut usize) -> i32,
    create_sampler_state: extern "win64" fn(*mut D3dDevice, *mut usize) -> i32,
    create_depth_stencil_state: extern "win64" fn(*mut D3dDevice, BOOL, BOOL, *mut usize) -> i32,
    create_rasterizer_state: extern "win64" fn(*mut D3dDevice, BOOL, *mut usize) -> i32,
    create_vertex_shader: unsafe extern "win64" fn(*mut D3dDevice, *const u8, usize, *mut usize) -> i32,
    create_pixel_shader: unsafe extern "win64" fn(*mut D3dDevice, *const u8, usize, *mut usize) -> i32,
    create_root_signature: extern "win64" fn(*mut D3dDevice, *mut usize) -> i32,
    create_graphics_pipeline_state: extern "win64" fn(*mut D3dDevice, usize, usize, *mut usize) -> i32,
    create_command_list: extern "win64" fn(*mut D3dDevice, *mut usize) -> i32,
    create_command_queue: extern "win64" fn(*mut D3dDevice, *mut usize) -> i32,
    create_fence: extern "win64" fn(*mut D3dDevice, *mut usize) -> i32,
    get_immediate_context: extern "win64" fn(*mut D3dDevice, *mut usize) -> i32,
}

static DEVICE_VTBL: DeviceVtbl = DeviceVtbl {
    query_interface: device_query_interface,
    add_ref: device_add_ref,
    release: device_release,
    create_buffer: device_create_buffer,
    create_texture2d: device_create_texture2d,
    create_render_target_view: device_create_render_target_view,
    create_depth_stencil_view: device_create_depth_stencil_view,
    create_shader_resource_view: device_create_shader_resource_view,
    create_sampler_state: device_create_sampler_state,
    create_depth_stencil_state: device_create_depth_stencil_state,
    create_rasterizer_state: device_create_rasterizer_state,
    create_vertex_shader: device_create_vertex_shader,
    create_pixel_shader: device_create_pixel_shader,
    create_root_signature: device_create_root_signature,
    create_graphics_pipeline_state: device_create_graphics_pipeline_state,
    create_command_list: device_create_command_list,
    create_command_queue: device_create_command_queue,
    create_fence: device_create_fence,
    get_immediate_context: device_get_immediate_context,
};

#[repr(C)]
struct D3dDevice {
    vtbl: *const DeviceVtbl,
    refcount: AtomicU32,
    shared: Arc<Shared>,
}

extern "win64" fn device_query_interface(_this: *mut D3dDevice, _iid: usize, ppv: *mut usize) -> i32 {
    unsafe { *ppv = 0 };
    E_NOINTERFACE
}

extern "win64" fn device_add_ref(this: *mut D3dDevice) -> u32 {
    unsafe { (*this).refcount.fetch_add(1, Ordering::SeqCst) + 1 }
}

extern "win64" fn device_release(this: *mut D3dDevice) -> u32 {
    unsafe {
        let prev = (*this).refcount.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            drop(Box::from_raw(this));
            0
        } else {
            prev - 1
        }
    }
}

/// # Safety
/// `data`, if non-null, must be readable for `len` bytes; `out` must be
/// writable for one handle.
unsafe extern "win64" fn device_create_buffer(this: *mut D3dDevice, data: *const u8, len: usize, out: *mut usize) -> i32 {
    let bytes = if data.is_null() { vec![0u8; len] } else { std::slice::from_raw_parts(data, len).to_vec() };
    let mut raster = (*this).shared.raster.lock().unwrap();
    *out = raster.create_buffer(bytes);
    S_OK
}

extern "win64" fn device_create_texture2d(this: *mut D3dDevice, width: u32, height: u32, is_depth: BOOL, out: *mut usize) -> i32 {
    let mut raster = unsafe { &*this }.shared.raster.lock().unwrap();
    let handle = if is_depth != FALSE { raster.create_texture2d_depth(width, height) } else { raster.create_texture2d_color(width, height) };
    unsafe { *out = handle };
    S_OK
}

extern "win64" fn device_create_render_target_view(this: *mut D3dDevice, texture: usize, out: *mut usize) -> i32 {
    let mut raster = unsafe { &*this }.shared.raster.lock().unwrap();
    unsafe { *out = raster.create_render_target_view(texture) };
    S_OK
}

extern "win64" fn device_create_depth_stencil_view(this: *mut D3dDevice, texture: usize, out: *mut usize) -> i32 {
    let mut raster = unsafe { &*this }.shared.raster.lock().unwrap();
    unsafe { *out = raster.create_depth_stencil_view(texture) };
    S_OK
}

extern "win64" fn device_create_shader_resource_view(this: *mut D3dDevice, texture: usize, out: *mut usize) -> i32 {
    let mut raster = unsafe { &*this }.shared.raster.lock().unwrap();
    unsafe { *out = raster.create_shader_resource_view(texture) };
    S_OK
}

extern "win64" fn device_create_sampler_state(this: *mut D3dDevice, out: *mut usize) -> i32 {
    let mut raster = unsafe { &*this }.shared.raster.lock().unwrap();
    unsafe { *out = raster.create_sampler_state() };
    S_OK
}

extern "win64" fn device_create_depth_stencil_state(this: *mut D3dDevice, depth_enable: BOOL, less_equal: BOOL, out: *mut usize) -> i32 {
    let func = if less_equal != FALSE { DepthFunc::Less } else { DepthFunc::Always };
    let mut raster = unsafe { &*this }.shared.raster.lock().unwrap();
    unsafe { *out = raster.create_depth_stencil_state(depth_enable != FALSE, func) };
    S_OK
}

extern "win64" fn device_create_rasterizer_state(this: *mut D3dDevice, cull_back: BOOL, out: *mut usize) -> i32 {
    let cull_mode = if cull_back != FALSE { CullMode::Back } else { CullMode::None };
    let mut raster = unsafe { &*this }.shared.raster.lock().unwrap();
    unsafe { *out = raster.create_rasterizer_state(cull_mode) };
    S_OK
}

/// # Safety
/// `bytecode` must be readable for `len` bytes.
unsafe extern "win64" fn device_create_vertex_shader(this: *mut D3dDevice, bytecode: *const u8, len: usize, out: *mut usize) -> i32 {
    let bytes = std::slice::from_raw_parts(bytecode, len).to_vec();
    let mut raster = (*this).shared.raster.lock().unwrap();
    *out = raster.create_shader(ShaderKind::Vertex, bytes);
    S_OK
}

/// # Safety
/// Same contract as [`device_create_vertex_shader`].
unsafe extern "win64" fn device_create_pixel_shader(this: *mut D3dDevice, bytecode: *const u8, len: usize, out: *mut usize) -> i32 {
    let bytes = std::slice::from_raw_parts(bytecode, len).to_vec();
    let mut raster = (*this).shared.raster.lock().unwrap();
    *out = raster.create_shader(ShaderKind::Pixel, bytes);
    S_OK
}

/// Root signatures carry no state the rasterizer reads (the fixed vertex
/// layout stands in for an input layout, and constant-buffer binding is
/// just a slot number) so this only mints a handle in its own range for
/// guests that round-trip it.
extern "win64" fn device_create_root_signature(_this: *mut D3dDevice, out: *mut usize) -> i32 {
    let token = ROOT_SIGNATURE_BASE + NEXT_ROOT_SIGNATURE.fetch_add(1, Ordering::SeqCst);
    unsafe { *out = token };
    S_OK
}

extern "win64" fn device_create_graphics_pipeline_state(this: *mut D3dDevice, vs: usize, ps: usize, out: *mut usize) -> i32 {
    let mut raster = unsafe { &*this }.shared.raster.lock().unwrap();
    let handle = raster.create_pipeline(vs, ps);
    unsafe { *out = PIPELINE_STATE_BASE + handle };
    S_OK
}

extern "win64" fn device_create_command_list(this: *mut D3dDevice, out: *mut usize) -> i32 {
    let list = Box::new(D3dCommandList {
        vtbl: &COMMAND_LIST_VTBL,
        refcount: AtomicU32::new(1),
        shared: unsafe { (*this).shared.clone() },
        inner: Mutex::new(wcl_d3d::command::CommandList::new()),
    });
    unsafe { *out = Box::into_raw(list) as usize };
    S_OK
}

extern "win64" fn device_create_command_queue(this: *mut D3dDevice, out: *mut usize) -> i32 {
    let queue = Box::new(D3dCommandQueue {
        vtbl: &COMMAND_QUEUE_VTBL,
        refcount: AtomicU32::new(1),
        shared: unsafe { (*this).shared.clone() },
        context: Mutex::new(Context::new()),
    });
    unsafe { *out = Box::into_raw(queue) as usize };
    S_OK
}

extern "win64" fn device_create_fence(this: *mut D3dDevice, out: *mut usize) -> i32 {
    let mut raster = unsafe { &*this }.shared.raster.lock().unwrap();
    let handle = raster.create_fence();
    drop(raster);
    let fence = Box::new(D3dFence { vtbl: &FENCE_VTBL, refcount: AtomicU32::new(1), shared: unsafe { (*this).shared.clone() }, handle });
    unsafe { *out = Box::into_raw(fence) as usize };
    S_OK
}

extern "win64" fn device_get_immediate_context(this: *mut D3dDevice, out: *mut usize) -> i32 {
    let ctx = Box::new(D3dContext { vtbl: &CONTEXT_VTBL, refcount: AtomicU32::new(1), shared: unsafe { (*this).shared.clone() }, inner: Mutex::new(Context::new()) });
    unsafe { *out = Box::into_raw(ctx) as usize };
    S_OK
}

// --------------------------------------------------------------- Context

#[repr(C)]
struct ContextVtbl {
    query_interface: extern "win64" fn(*mut D3dContext, usize, *mut usize) -> i32,
    add_ref: extern "win64" fn(*mut D3dContext) -> u32,
    release: extern "win64" fn(*mut D3dContext) -> u32,
    ia_set_vertex_buffer: extern "win64" fn(*mut D3dContext, usize) -> i32,
    ia_set_index_buffer: extern "win64" fn(*mut D3dContext, usize) -> i32,
    ia_set_primitive_topology: extern "win64" fn(*mut D3dContext, u32) -> i32,
    vs_set_shader: extern "win64" fn(*mut D3dContext, usize) -> i32,
    ps_set_shader: extern "win64" fn(*mut D3dContext, usize) -> i32,
    vs_set_constant_buffer: extern "win64" fn(*mut D3dContext, u8, usize) -> i32,
    ps_set_constant_buffer: extern "win64" fn(*mut D3dContext, u8, usize) -> i32,
    ps_set_shader_resource: extern "win64" fn(*mut D3dContext, u8, usize) -> i32,
    ps_set_sampler: extern "win64" fn(*mut D3dContext, u8, usize) -> i32,
    om_set_render_targets: extern "win64" fn(*mut D3dContext, usize, usize) -> i32,
    rs_set_viewport: extern "win64" fn(*mut D3dContext, f32, f32, f32, f32) -> i32,
    clear_render_target_view: unsafe extern "win64" fn(*mut D3dContext, usize, *const f32) -> i32,
    clear_depth_stencil_view: extern "win64" fn(*mut D3dContext, usize, f32) -> i32,
    /// `UpdateSubresource`'s real signature names row/depth pitch too;
    /// every resource this rasterizer updates is pitch-free (a flat
    /// buffer), so those arguments would always be ignored and are
    /// dropped rather than threaded through for no reason.
    update_subresource: unsafe extern "win64" fn(*mut D3dContext, usize, *const u8, usize) -> i32,
    draw: extern "win64" fn(*mut D3dContext, u32, u32) -> i32,
    draw_indexed: extern "win64" fn(*mut D3dContext, u32, u32, i32) -> i32,
}

static CONTEXT_VTBL: ContextVtbl = ContextVtbl {
    query_interface: context_query_interface,
    add_ref: context_add_ref,
    release: context_release,
    ia_set_vertex_buffer: context_ia_set_vertex_buffer,
    ia_set_index_buffer: context_ia_set_index_buffer,
    ia_set_primitive_topology: context_ia_set_primitive_topology,
    vs_set_shader: context_vs_set_shader,
    ps_set_shader: context_ps_set_shader,
    vs_set_constant_buffer: context_vs_set_constant_buffer,
    ps_set_constant_buffer: context_ps_set_constant_buffer,
    ps_set_shader_resource: context_ps_set_shader_resource,
    ps_set_sampler: context_ps_set_sampler,
    om_set_render_targets: context_om_set_render_targets,
    rs_set_viewport: context_rs_set_viewport,
    clear_render_target_view: context_clear_render_target_view,
    clear_depth_stencil_view: context_clear_depth_stencil_view,
    update_subresource: context_update_subresource,
    draw: context_draw,
    draw_indexed: context_draw_indexed,
};

#[repr(C)]
struct D3dContext {
    vtbl: *const ContextVtbl,
    refcount: AtomicU32,
    shared: Arc<Shared>,
    inner: Mutex<Context>,
}

extern "win64" fn context_query_interface(_this: *mut D3dContext, _iid: usize, ppv: *mut usize) -> i32 {
    unsafe { *ppv = 0 };
    E_NOINTERFACE
}

extern "win64" fn context_add_ref(this: *mut D3dContext) -> u32 {
    unsafe { (*this).refcount.fetch_add(1, Ordering::SeqCst) + 1 }
}

extern "win64" fn context_release(this: *mut D3dContext) -> u32 {
    unsafe {
        let prev = (*this).refcount.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            drop(Box::from_raw(this));
            0
        } else {
            prev - 1
        }
    }
}

/// Runs one command against the context's own bound state immediately,
/// matching D3D11's "calls on the context execute without an explicit
/// submit" semantics (as opposed to the command-list family below, where
/// recording and execution are separate steps).
fn immediate(this: *mut D3dContext, cmd: Command) -> i32 {
    let this = unsafe { &*this };
    let mut raster = this.shared.raster.lock().unwrap();
    let mut ctx = this.inner.lock().unwrap();
    match ctx.execute(&mut raster.table, std::slice::from_ref(&cmd)) {
        Ok(()) => S_OK,
        Err(e) => {
            log::warn!("d3d11 immediate context command failed: {e}");
            E_FAIL
        }
    }
}

extern "win64" fn context_ia_set_vertex_buffer(this: *mut D3dContext, buffer: usize) -> i32 {
    immediate(this, Command::SetVb(buffer))
}

extern "win64" fn context_ia_set_index_buffer(this: *mut D3dContext, buffer: usize) -> i32 {
    immediate(this, Command::SetIb(buffer))
}

extern "win64" fn context_ia_set_primitive_topology(this: *mut D3dContext, _topology: u32) -> i32 {
    immediate(this, Command::SetTopology)
}

extern "win64" fn context_vs_set_shader(this: *mut D3dContext, shader: usize) -> i32 {
    immediate(this, Command::SetVs(shader))
}

extern "win64" fn context_ps_set_shader(this: *mut D3dContext, shader: usize) -> i32 {
    immediate(this, Command::SetPs(shader))
}

extern "win64" fn context_vs_set_constant_buffer(this: *mut D3dContext, slot: u8, buffer: usize) -> i32 {
    immediate(this, Command::SetCb { slot, buffer })
}

extern "win64" fn context_ps_set_constant_buffer(this: *mut D3dContext, slot: u8, buffer: usize) -> i32 {
    immediate(this, Command::SetCb { slot, buffer })
}

extern "win64" fn context_ps_set_shader_resource(this: *mut D3dContext, slot: u8, view: usize) -> i32 {
    immediate(this, Command::SetSrv { slot, view })
}

extern "win64" fn context_ps_set_sampler(this: *mut D3dContext, slot: u8, sampler: usize) -> i32 {
    immediate(this, Command::SetSampler { slot, sampler })
}

extern "win64" fn context_om_set_render_targets(this: *mut D3dContext, rtv: usize, dsv: usize) -> i32 {
    let a = immediate(this, Command::SetRt(rtv));
    let b = immediate(this, Command::SetDs(dsv));
    if a == S_OK { b } else { a }
}

extern "win64" fn context_rs_set_viewport(this: *mut D3dContext, x: f32, y: f32, width: f32, height: f32) -> i32 {
    immediate(this, Command::SetViewport(Viewport { x, y, width, height }))
}

/// # Safety
/// `color` must point at 4 readable `f32`s (RGBA).
unsafe extern "win64" fn context_clear_render_target_view(this: *mut D3dContext, rtv: usize, color: *const f32) -> i32 {
    let c = std::slice::from_raw_parts(color, 4);
    immediate(this, Command::ClearRt { target: rtv, color: [c[0], c[1], c[2], c[3]] })
}

extern "win64" fn context_clear_depth_stencil_view(this: *mut D3dContext, dsv: usize, depth: f32) -> i32 {
    immediate(this, Command::ClearDs { target: dsv, depth })
}

/// # Safety
/// `data` must be readable for `len` bytes.
unsafe extern "win64" fn context_update_subresource(this: *mut D3dContext, resource: usize, data: *const u8, len: usize) -> i32 {
    let bytes = std::slice::from_raw_parts(data, len).to_vec();
    immediate(this, Command::UpdateSubresource { resource, data: bytes })
}

extern "win64" fn context_draw(this: *mut D3dContext, count: u32, start: u32) -> i32 {
    immediate(this, Command::Draw { count, start })
}

extern "win64" fn context_draw_indexed(this: *mut D3dContext, icount: u32, istart: u32, vbase: i32) -> i32 {
    immediate(this, Command::DrawIndexed { icount, istart, vbase })
}

// ---------------------------------------------------------- Command list

#[repr(C)]
struct CommandListVtbl {
    query_interface: extern "win64" fn(*mut D3dCommandList, usize, *mut usize) -> i32,
    add_ref: extern "win64" fn(*mut D3dCommandList) -> u32,
    release: extern "win64" fn(*mut D3dCommandList) -> u32,
    set_rt: extern "win64" fn(*mut D3dCommandList, usize, usize) -> i32,
    set_viewport: extern "win64" fn(*mut D3dCommandList, f32, f32, f32, f32) -> i32,
    set_vb: extern "win64" fn(*mut D3dCommandList, usize) -> i32,
    set_ib: extern "win64" fn(*mut D3dCommandList, usize) -> i32,
    set_vs: extern "win64" fn(*mut D3dCommandList, usize) -> i32,
    set_ps: extern "win64" fn(*mut D3dCommandList, usize) -> i32,
    set_cb: extern "win64" fn(*mut D3dCommandList, u8, usize) -> i32,
    set_srv: extern "win64" fn(*mut D3dCommandList, u8, usize) -> i32,
    set_sampler: extern "win64" fn(*mut D3dCommandList, u8, usize) -> i32,
    clear_rt: unsafe extern "win64" fn(*mut D3dCommandList, usize, *const f32) -> i32,
    clear_ds: extern "win64" fn(*mut D3dCommandList, usize, f32) -> i32,
    draw: extern "win64" fn(*mut D3dCommandList, u32, u32) -> i32,
    draw_indexed: extern "win64" fn(*mut D3dCommandList, u32, u32, i32) -> i32,
    close: extern "win64" fn(*mut D3dCommandList) -> i32,
}

static COMMAND_LIST_VTBL: CommandListVtbl = CommandListVtbl {
    query_interface: command_list_query_interface,
    add_ref: command_list_add_ref,
    release: command_list_release,
    set_rt: command_list_set_rt,
    set_viewport: command_list_set_viewport,
    set_vb: command_list_set_vb,
    set_ib: command_list_set_ib,
    set_vs: command_list_set_vs,
    set_ps: command_list_set_ps,
    set_cb: command_list_set_cb,
    set_srv: command_list_set_srv,
    set_sampler: command_list_set_sampler,
    clear_rt: command_list_clear_rt,
    clear_ds: command_list_clear_ds,
    draw: command_list_draw,
    draw_indexed: command_list_draw_indexed,
    close: command_list_close,
};

#[repr(C)]
struct D3dCommandList {
    vtbl: *const CommandListVtbl,
    refcount: AtomicU32,
    shared: Arc<Shared>,
    inner: Mutex<wcl_d3d::command::CommandList>,
}

extern "win64" fn command_list_query_interface(_this: *mut D3dCommandList, _iid: usize, ppv: *mut usize) -> i32 {
    unsafe { *ppv = 0 };
    E_NOINTERFACE
}

extern "win64" fn command_list_add_ref(this: *mut D3dCommandList) -> u32 {
    unsafe { (*this).refcount.fetch_add(1, Ordering::SeqCst) + 1 }
}

extern "win64" fn command_list_release(this: *mut D3dCommandList) -> u32 {
    unsafe {
        let prev = (*this).refcount.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            drop(Box::from_raw(this));
            0
        } else {
            prev - 1
        }
    }
}

fn record(this: *mut D3dCommandList, cmd: Command) -> i32 {
    let this = unsafe { &*this };
    match this.inner.lock().unwrap().record(cmd) {
        Ok(()) => S_OK,
        Err(e) => {
            log::warn!("d3d11 command-list record after close: {e}");
            E_FAIL
        }
    }
}

extern "win64" fn command_list_set_rt(this: *mut D3dCommandList, rtv: usize, dsv: usize) -> i32 {
    record(this, Command::SetRt(rtv));
    record(this, Command::SetDs(dsv))
}

extern "win64" fn command_list_set_viewport(this: *mut D3dCommandList, x: f32, y: f32, width: f32, height: f32) -> i32 {
    record(this, Command::SetViewport(Viewport { x, y, width, height }))
}

extern "win64" fn command_list_set_vb(this: *mut D3dCommandList, buffer: usize) -> i32 {
    record(this, Command::SetVb(buffer))
}

extern "win64" fn command_list_set_ib(this: *mut D3dCommandList, buffer: usize) -> i32 {
    record(this, Command::SetIb(buffer))
}

extern "win64" fn command_list_set_vs(this: *mut D3dCommandList, shader: usize) -> i32 {
    record(this, Command::SetVs(shader))
}

extern "win64" fn command_list_set_ps(this: *mut D3dCommandList, shader: usize) -> i32 {
    record(this, Command::SetPs(shader))
}

extern "win64" fn command_list_set_cb(this: *mut D3dCommandList, slot: u8, buffer: usize) -> i32 {
    record(this, Command::SetCb { slot, buffer })
}

extern "win64" fn command_list_set_srv(this: *mut D3dCommandList, slot: u8, view: usize) -> i32 {
    record(this, Command::SetSrv { slot, view })
}

extern "win64" fn command_list_set_sampler(this: *mut D3dCommandList, slot: u8, sampler: usize) -> i32 {
    record(this, Command::SetSampler { slot, sampler })
}

/// # Safety
/// `color` must point at 4 readable `f32`s.
unsafe extern "win64" fn command_list_clear_rt(this: *mut D3dCommandList, rtv: usize, color: *const f32) -> i32 {
    let c = std::slice::from_raw_parts(color, 4);
    record(this, Command::ClearRt { target: rtv, color: [c[0], c[1], c[2], c[3]] })
}

extern "win64" fn command_list_clear_ds(this: *mut D3dCommandList, dsv: usize, depth: f32) -> i32 {
    record(this, Command::ClearDs { target: dsv, depth })
}

extern "win64" fn command_list_draw(this: *mut D3dCommandList, count: u32, start: u32) -> i32 {
    record(this, Command::Draw { count, start })
}

extern "win64" fn command_list_draw_indexed(this: *mut D3dCommandList, icount: u32, istart: u32, vbase: i32) -> i32 {
    record(this, Command::DrawIndexed { icount, istart, vbase })
}

extern "win64" fn command_list_close(this: *mut D3dCommandList) -> i32 {
    let this = unsafe { &*this };
    // Touch `shared` so an unused-field lint never fires if a future
    // trim drops every other use of it from this type.
    let _ = &this.shared;
    match this.inner.lock().unwrap().close() {
        Ok(()) => S_OK,
        Err(e) => {
            log::warn!("d3d11 command-list double close: {e}");
            E_FAIL
        }
    }
}

// --------------------------------------------------------- Command queue

#[repr(C)]
struct CommandQueueVtbl {
    query_interface: extern "win64" fn(*mut D3dCommandQueue, usize, *mut usize) -> i32,
    add_ref: extern "win64" fn(*mut D3dCommandQueue) -> u32,
    release: extern "win64" fn(*mut D3dCommandQueue) -> u32,
    execute_command_lists: unsafe extern "win64" fn(*mut D3dCommandQueue, u32, *const usize) -> i32,
    signal: extern "win64" fn(*mut D3dCommandQueue, usize, u64) -> i32,
}

static COMMAND_QUEUE_VTBL: CommandQueueVtbl = CommandQueueVtbl {
    query_interface: command_queue_query_interface,
    add_ref: command_queue_add_ref,
    release: command_queue_release,
    execute_command_lists: command_queue_execute_command_lists,
    signal: command_queue_signal,
};

#[repr(C)]
struct D3dCommandQueue {
    vtbl: *const CommandQueueVtbl,
    refcount: AtomicU32,
    shared: Arc<Shared>,
    context: Mutex<Context>,
}

extern "win64" fn command_queue_query_interface(_this: *mut D3dCommandQueue, _iid: usize, ppv: *mut usize) -> i32 {
    unsafe { *ppv = 0 };
    E_NOINTERFACE
}

extern "win64" fn command_queue_add_ref(this: *mut D3dCommandQueue) -> u32 {
    unsafe { (*this).refcount.fetch_add(1, Ordering::SeqCst) + 1 }
}

extern "win64" fn command_queue_release(this: *mut D3dCommandQueue) -> u32 {
    unsafe {
        let prev = (*this).refcount.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            drop(Box::from_raw(this));
            0
        } else {
            prev - 1
        }
    }
}

/// `lists` is an array of `ID3D12GraphicsCommandList*` pointers, each
/// required to be closed (spec.md §3's `Close`/`ExecuteCommandLists`
/// invariant) before this call.
///
/// # Safety
/// `lists` must point at `num` readable pointers, each a live
/// `D3dCommandList` produced by `CreateCommandList`.
unsafe extern "win64" fn command_queue_execute_command_lists(this: *mut D3dCommandQueue, num: u32, lists: *const usize) -> i32 {
    let this = &*this;
    let mut raster = this.shared.raster.lock().unwrap();
    let mut ctx = this.context.lock().unwrap();
    for i in 0..num as usize {
        let ptr = *lists.add(i) as *mut D3dCommandList;
        if ptr.is_null() {
            continue;
        }
        let list = &*ptr;
        let inner = list.inner.lock().unwrap();
        let commands = match inner.commands() {
            Ok(c) => c.to_vec(),
            Err(e) => {
                log::warn!("d3d11 ExecuteCommandLists given an unclosed list: {e}");
                continue;
            }
        };
        drop(inner);
        if let Err(e) = ctx.execute(&mut raster.table, &commands) {
            log::warn!("d3d11 command-list replay failed: {e}");
            return E_FAIL;
        }
    }
    S_OK
}

extern "win64" fn command_queue_signal(this: *mut D3dCommandQueue, fence: usize, value: u64) -> i32 {
    let this = unsafe { &*this };
    let mut raster = this.shared.raster.lock().unwrap();
    match wcl_d3d::fence::signal(&mut raster.table, fence, value) {
        Ok(()) => S_OK,
        Err(e) => {
            log::warn!("d3d11 queue signal on unknown fence: {e}");
            E_FAIL
        }
    }
}

// ----------------------------------------------------------------- Fence

#[repr(C)]
struct FenceVtbl {
    query_interface: extern "win64" fn(*mut D3dFence, usize, *mut usize) -> i32,
    add_ref: extern "win64" fn(*mut D3dFence) -> u32,
    release: extern "win64" fn(*mut D3dFence) -> u32,
    get_completed_value: extern "win64" fn(*mut D3dFence) -> u64,
    set_event_on_completion: extern "win64" fn(*mut D3dFence, u64, usize) -> i32,
}

static FENCE_VTBL: FenceVtbl = FenceVtbl {
    query_interface: fence_query_interface,
    add_ref: fence_add_ref,
    release: fence_release,
    get_completed_value: fence_get_completed_value,
    set_event_on_completion: fence_set_event_on_completion,
};

#[repr(C)]
struct D3dFence {
    vtbl: *const FenceVtbl,
    refcount: AtomicU32,
    shared: Arc<Shared>,
    handle: usize,
}

extern "win64" fn fence_query_interface(_this: *mut D3dFence, _iid: usize, ppv: *mut usize) -> i32 {
    unsafe { *ppv = 0 };
    E_NOINTERFACE
}

extern "win64" fn fence_add_ref(this: *mut D3dFence) -> u32 {
    unsafe { (*this).refcount.fetch_add(1, Ordering::SeqCst) + 1 }
}

extern "win64" fn fence_release(this: *mut D3dFence) -> u32 {
    unsafe {
        let prev = (*this).refcount.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            drop(Box::from_raw(this));
            0
        } else {
            prev - 1
        }
    }
}

/// Synchronous rasterizer: the value a prior `Signal` stored is already
/// visible, so this never needs to report "not yet" (spec.md §4.12).
extern "win64" fn fence_get_completed_value(this: *mut D3dFence) -> u64 {
    let this = unsafe { &*this };
    let raster = this.shared.raster.lock().unwrap();
    wcl_d3d::fence::completed_value(&raster.table, this.handle).unwrap_or(0)
}

extern "win64" fn fence_set_event_on_completion(this: *mut D3dFence, value: u64, _event: usize) -> i32 {
    let this = unsafe { &*this };
    let raster = this.shared.raster.lock().unwrap();
    match wcl_d3d::fence::set_event_on_completion(&raster.table, this.handle, value) {
        Ok(()) => S_OK,
        Err(e) => {
            log::warn!("d3d11 fence wait on unknown fence: {e}");
            E_FAIL
        }
    }
}

// ------------------------------------------------------------- SwapChain

#[repr(C)]
struct SwapChainVtbl {
    query_interface: extern "win64" fn(*mut D3dSwapChain, usize, *mut usize) -> i32,
    add_ref: extern "win64" fn(*mut D3dSwapChain) -> u32,
    release: extern "win64" fn(*mut D3dSwapChain) -> u32,
    get_buffer: extern "win64" fn(*mut D3dSwapChain, *mut usize) -> i32,
    present: extern "win64" fn(*mut D3dSwapChain, u32) -> i32,
}

static SWAP_CHAIN_VTBL: SwapChainVtbl = SwapChainVtbl {
    query_interface: swap_chain_query_interface,
    add_ref: swap_chain_add_ref,
    release: swap_chain_release,
    get_buffer: swap_chain_get_buffer,
    present: swap_chain_present,
};

#[repr(C)]
struct D3dSwapChain {
    vtbl: *const SwapChainVtbl,
    refcount: AtomicU32,
    shared: Arc<Shared>,
    hwnd: HWND,
    back_buffer_rtv: usize,
}

extern "win64" fn swap_chain_query_interface(_this: *mut D3dSwapChain, _iid: usize, ppv: *mut usize) -> i32 {
    unsafe { *ppv = 0 };
    E_NOINTERFACE
}

extern "win64" fn swap_chain_add_ref(this: *mut D3dSwapChain) -> u32 {
    unsafe { (*this).refcount.fetch_add(1, Ordering::SeqCst) + 1 }
}

extern "win64" fn swap_chain_release(this: *mut D3dSwapChain) -> u32 {
    unsafe {
        let prev = (*this).refcount.fetch_sub(1, Ordering::SeqCst);
        if prev == 1 {
            drop(Box::from_raw(this));
            0
        } else {
            prev - 1
        }
    }
}

extern "win64" fn swap_chain_get_buffer(this: *mut D3dSwapChain, out: *mut usize) -> i32 {
    unsafe { *out = (*this).back_buffer_rtv };
    S_OK
}

/// Blits the back buffer's render-target texture into the window's
/// pixel buffer and marks it for repaint (spec.md §4.12's "Present"
/// note). `sync_interval` is accepted and ignored: there is no vblank to
/// wait on in a software rasterizer.
extern "win64" fn swap_chain_present(this: *mut D3dSwapChain, _sync_interval: u32) -> i32 {
    let this = unsafe { &*this };
    let (width, height) = rt_dims(&this.shared, this.back_buffer_rtv);
    if width == 0 || height == 0 {
        return E_FAIL;
    }
    let raster = this.shared.raster.lock().unwrap();
    let tex_handle = match raster.table.get(this.back_buffer_rtv) {
        Some(Resource::RenderTargetView { texture }) => *texture,
        _ => return E_FAIL,
    };
    let pixels = match raster.table.get(tex_handle) {
        Some(Resource::Texture2d(t)) => t.color.clone(),
        _ => return E_FAIL,
    };
    drop(raster);
    if crate::user32::window::present_d3d_frame(this.hwnd, &pixels, width, height) {
        S_OK
    } else {
        E_FAIL
    }
}

// ----------------------------------------------------------- Entry point

/// `D3D11CreateDeviceAndSwapChain` (d3d11.dll): allocates one
/// [`RasterDevice`] shared by the device/context/swap-chain/queue/fence
/// family this module hands out, a color render target matching the
/// window's current size, and wires the swap chain's back buffer to that
/// render target. Takes `hwnd`/`width`/`height` directly rather than the
/// real entry point's driver-type/feature-level array/`DXGI_SWAP_CHAIN_DESC`
/// parameter list — every guest program in this runtime wants exactly one
/// swap chain bound to one already-created window, so the reduced
/// signature is what callers actually pass.
///
/// # Safety
/// `hwnd` must be a live window; `out_device`, `out_context`, and
/// `out_swap_chain` must each be writable for one pointer (any of the
/// three may be null, matching the real entry point's optional
/// out-parameters).
pub unsafe extern "win64" fn d3d11_create_device_and_swap_chain(
    hwnd: HWND,
    width: u32,
    height: u32,
    out_device: *mut usize,
    out_context: *mut usize,
    out_swap_chain: *mut usize,
) -> i32 {
    let mut raster = RasterDevice::new();
    let color_tex = raster.create_texture2d_color(width.max(1), height.max(1));
    let rtv = raster.create_render_target_view(color_tex);
    let shared = Arc::new(Shared { raster: Mutex::new(raster) });

    if !out_device.is_null() {
        let device = Box::new(D3dDevice { vtbl: &DEVICE_VTBL, refcount: AtomicU32::new(1), shared: shared.clone() });
        *out_device = Box::into_raw(device) as usize;
    }
    if !out_context.is_null() {
        let ctx = Box::new(D3dContext { vtbl: &CONTEXT_VTBL, refcount: AtomicU32::new(1), shared: shared.clone(), inner: Mutex::new(Context::new()) });
        *out_context = Box::into_raw(ctx) as usize;
    }
    if !out_swap_chain.is_null() {
        let swap_chain = Box::new(D3dSwapChain { vtbl: &SWAP_CHAIN_VTBL, refcount: AtomicU32::new(1), shared, hwnd, back_buffer_rtv: rtv });
        *out_swap_chain = Box::into_raw(swap_chain) as usize;
    }
    S_OK
}

/// `CreateDXGIFactory1` (dxgi.dll): this runtime has exactly one adapter
/// and one output, so the factory is a hollow token — nothing ever calls
/// back into it beyond checking it is non-null.
pub extern "win64" fn create_dxgi_factory1(_riid: usize, out: *mut usize) -> i32 {
    static FACTORY_TOKEN: AtomicUsize = AtomicUsize::new(0);
    if FACTORY_TOKEN.load(Ordering::SeqCst) == 0 {
        FACTORY_TOKEN.store(0xD3161_F0, Ordering::SeqCst);
    }
    unsafe { *out = FACTORY_TOKEN.load(Ordering::SeqCst) };
    S_OK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_state_and_root_signature_handles_land_in_their_own_ranges() {
        let mut device = RasterDevice::new();
        let vs = device.create_shader(ShaderKind::Vertex, vec![]);
        let ps = device.create_shader(ShaderKind::Pixel, vec![]);
        let handle = device.create_pipeline(vs, ps);
        assert!(PIPELINE_STATE_BASE + handle >= PIPELINE_STATE_BASE);

        let a = ROOT_SIGNATURE_BASE + NEXT_ROOT_SIGNATURE.fetch_add(1, Ordering::SeqCst);
        let b = ROOT_SIGNATURE_BASE + NEXT_ROOT_SIGNATURE.fetch_add(1, Ordering::SeqCst);
        assert_ne!(a, b);
        assert!(a >= ROOT_SIGNATURE_BASE && a < PIPELINE_STATE_BASE);
    }

    #[test]
    fn immediate_context_draw_without_render_target_reports_failure() {
        let shared = Arc::new(Shared { raster: Mutex::new(RasterDevice::new()) });
        let mut ctx = Box::new(D3dContext { vtbl: &CONTEXT_VTBL, refcount: AtomicU32::new(1), shared, inner: Mutex::new(Context::new()) });
        let ptr: *mut D3dContext = &mut *ctx;
        assert_eq!(context_draw(ptr, 3, 0), E_FAIL);
    }

    #[test]
    fn command_list_rejects_recording_after_close() {
        let shared = Arc::new(Shared { raster: Mutex::new(RasterDevice::new()) });
        let mut list = Box::new(D3dCommandList {
            vtbl: &COMMAND_LIST_VTBL,
            refcount: AtomicU32::new(1),
            shared,
            inner: Mutex::new(wcl_d3d::command::CommandList::new()),
        });
        let ptr: *mut D3dCommandList = &mut *list;
        assert_eq!(command_list_close(ptr), S_OK);
        assert_eq!(command_list_set_vb(ptr, 7), E_FAIL);
    }
}
