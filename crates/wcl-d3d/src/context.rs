//! The immediate context: bound pipeline state plus the rasterizer
//! (spec.md §4.12). `ExecuteCommandLists`/`Present` replay a closed
//! [`CommandList`](crate::command::CommandList) against this state.
//!
//! Vertex format is fixed (position `[f32;3]`, color `[f32;4]`, uv
//! `[f32;2]`, 36-byte stride) — the spec names no input-layout object, so
//! one fixed layout stands in for D3D11's general `ID3D11InputLayout`.

use crate::command::{Command, Viewport};
use crate::dxbc::{self, ExecCtx};
use crate::error::D3dError;
use crate::resource::{CullMode, DepthFunc, Resource, ResourceTable};

pub const VERTEX_STRIDE: usize = 36;
const MAX_CB_SLOTS: usize = 4;
const MAX_SRV_SLOTS: usize = 4;

#[derive(Default, Clone, Copy)]
struct Binding {
    rt: usize,
    ds: usize,
    vb: usize,
    ib: usize,
    vs: usize,
    ps: usize,
    sampler: usize,
}

pub struct Context {
    bound: Binding,
    viewport: Viewport,
    cbs: [usize; MAX_CB_SLOTS],
    srvs: [usize; MAX_SRV_SLOTS],
    rasterizer_handle: usize,
    depth_state_handle: usize,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            bound: Binding::default(),
            viewport: Viewport { x: 0.0, y: 0.0, width: 0.0, height: 0.0 },
            cbs: [0; MAX_CB_SLOTS],
            srvs: [0; MAX_SRV_SLOTS],
            rasterizer_handle: 0,
            depth_state_handle: 0,
        }
    }
}

fn read_vertex(vb: &[u8], index: usize) -> ([f32; 3], [f32; 4], [f32; 2]) {
    let base = index * VERTEX_STRIDE;
    let f = |off: usize| f32::from_le_bytes(vb[base + off..base + off + 4].try_into().unwrap());
    ([f(0), f(4), f(8)], [f(12), f(16), f(20), f(24)], [f(28), f(32)])
}

fn constant_buffer_floats(buf: &[u8]) -> Vec<[f32; 4]> {
    buf.chunks_exact(16)
        .map(|c| {
            [
                f32::from_le_bytes(c[0..4].try_into().unwrap()),
                f32::from_le_bytes(c[4..8].try_into().unwrap()),
                f32::from_le_bytes(c[8..12].try_into().unwrap()),
                f32::from_le_bytes(c[12..16].try_into().unwrap()),
            ]
        })
        .collect()
}

fn sample_nearest(tex: &crate::resource::Texture2d, u: f32, v: f32) -> u32 {
    if tex.width == 0 || tex.height == 0 {
        return 0;
    }
    let x = ((u.clamp(0.0, 1.0)) * (tex.width - 1) as f32).round() as u32;
    let y = ((v.clamp(0.0, 1.0)) * (tex.height - 1) as f32).round() as u32;
    tex.color[(y * tex.width + x) as usize]
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs every command in a closed list, in order (spec.md §3's
    /// `Close`/`ExecuteCommandLists` invariant).
    pub fn execute(&mut self, table: &mut ResourceTable, commands: &[Command]) -> Result<(), D3dError> {
        for cmd in commands {
            self.apply(table, cmd)?;
        }
        Ok(())
    }

    fn apply(&mut self, table: &mut ResourceTable, cmd: &Command) -> Result<(), D3dError> {
        match cmd {
            Command::SetRt(h) => self.bound.rt = *h,
            Command::SetDs(h) => self.bound.ds = *h,
            Command::SetViewport(vp) => self.viewport = *vp,
            Command::SetVb(h) => self.bound.vb = *h,
            Command::SetIb(h) => self.bound.ib = *h,
            Command::SetTopology => {}
            Command::SetVs(h) => self.bound.vs = *h,
            Command::SetPs(h) => self.bound.ps = *h,
            Command::SetCb { slot, buffer } => self.cbs[*slot as usize % MAX_CB_SLOTS] = *buffer,
            Command::SetSrv { slot, view } => self.srvs[*slot as usize % MAX_SRV_SLOTS] = *view,
            Command::SetSampler { sampler, .. } => self.bound.sampler = *sampler,
            Command::ClearRt { target, color } => self.clear_rt(table, *target, *color)?,
            Command::ClearDs { target, depth } => self.clear_ds(table, *target, *depth)?,
            Command::Draw { count, start } => self.draw(table, *count, *start)?,
            Command::DrawIndexed { icount, istart, vbase } => self.draw_indexed(table, *icount, *istart, *vbase)?,
            Command::UpdateSubresource { resource, data } => self.update_subresource(table, *resource, data)?,
        }
        Ok(())
    }

    fn rt_texture(&self, table: &mut ResourceTable, handle: usize) -> Result<usize, D3dError> {
        match table.get(handle).ok_or(D3dError::UnknownHandle(handle))? {
            Resource::RenderTargetView { texture } => Ok(*texture),
            _ => Err(D3dError::WrongKind(handle, "RenderTargetView")),
        }
    }

    fn ds_texture(&self, table: &mut ResourceTable, handle: usize) -> Result<usize, D3dError> {
        match table.get(handle).ok_or(D3dError::UnknownHandle(handle))? {
            Resource::DepthStencilView { texture } => Ok(*texture),
            _ => Err(D3dError::WrongKind(handle, "DepthStencilView")),
        }
    }

    fn clear_rt(&mut self, table: &mut ResourceTable, target: usize, color: [f32; 4]) -> Result<(), D3dError> {
        let tex = self.rt_texture(table, target)?;
        let packed = pack_xrgb8888(color);
        match table.get_mut(tex).ok_or(D3dError::UnknownHandle(tex))? {
            Resource::Texture2d(t) => t.color.iter_mut().for_each(|p| *p = packed),
            _ => return Err(D3dError::WrongKind(tex, "Texture2d")),
        }
        Ok(())
    }

    fn clear_ds(&mut self, table: &mut ResourceTable, target: usize, depth: f32) -> Result<(), D3dError> {
        let tex = self.ds_texture(table, target)?;
        match table.get_mut(tex).ok_or(D3dError::UnknownHandle(tex))? {
            Resource::Texture2d(t) => t.depth.iter_mut().for_each(|d| *d = depth),
            _ => return Err(D3dError::WrongKind(tex, "Texture2d")),
        }
        Ok(())
    }

    fn update_subresource(&mut self, table: &mut ResourceTable, resource: usize, data: &[u8]) -> Result<(), D3dError> {
        match table.get_mut(resource).ok_or(D3dError::UnknownHandle(resource))? {
            Resource::Buffer(buf) => {
                buf.clear();
                buf.extend_from_slice(data);
                Ok(())
            }
            _ => Err(D3dError::WrongKind(resource, "Buffer")),
        }
    }

    fn draw(&mut self, table: &mut ResourceTable, count: u32, start: u32) -> Result<(), D3dError> {
        let indices: Vec<u32> = (start..start + count).collect();
        self.rasterize(table, &indices)
    }

    fn draw_indexed(&mut self, table: &mut ResourceTable, icount: u32, istart: u32, vbase: i32) -> Result<(), D3dError> {
        let ib_handle = self.bound.ib;
        let ib = match table.get(ib_handle).ok_or(D3dError::UnknownHandle(ib_handle))? {
            Resource::Buffer(b) => b.clone(),
            _ => return Err(D3dError::WrongKind(ib_handle, "Buffer")),
        };
        let mut indices = Vec::with_capacity(icount as usize);
        for i in 0..icount {
            let off = (istart as usize + i as usize) * 4;
            let raw = u32::from_le_bytes(ib[off..off + 4].try_into().unwrap());
            indices.push((raw as i64 + vbase as i64) as u32);
        }
        self.rasterize(table, &indices)
    }

    fn rasterize(&mut self, table: &mut ResourceTable, indices: &[u32]) -> Result<(), D3dError> {
        if self.bound.rt == 0 {
            return Err(D3dError::NoRenderTarget);
        }
        let vb_handle = self.bound.vb;
        let vb = match table.get(vb_handle).ok_or(D3dError::UnknownHandle(vb_handle))? {
            Resource::Buffer(b) => b.clone(),
            _ => return Err(D3dError::WrongKind(vb_handle, "Buffer")),
        };

        let cb_bufs: Vec<Vec<[f32; 4]>> = self
            .cbs
            .iter()
            .map(|&h| match table.get(h) {
                Some(Resource::Buffer(b)) => constant_buffer_floats(b),
                _ => Vec::new(),
            })
            .collect();
        let cb_refs: Vec<&[[f32; 4]]> = cb_bufs.iter().map(|v| v.as_slice()).collect();

        let vs_program = self.shader_program(table, self.bound.vs);
        let ps_program = self.shader_program(table, self.bound.ps);
        let cull_mode = self.rasterizer_state(table);
        let (depth_enable, depth_func) = self.depth_state(table);

        let rt_tex = self.rt_texture(table, self.bound.rt)?;
        let ds_tex = if self.bound.ds != 0 { Some(self.ds_texture(table, self.bound.ds)?) } else { None };

        let (rt_w, rt_h) = match table.get(rt_tex) {
            Some(Resource::Texture2d(t)) => (t.width, t.height),
            _ => return Err(D3dError::WrongKind(rt_tex, "Texture2d")),
        };

        for tri in indices.chunks(3) {
            if tri.len() < 3 {
                break;
            }
            let verts: Vec<_> = tri.iter().map(|&i| read_vertex(&vb, i as usize)).collect();
            let shaded: Vec<_> = verts
                .iter()
                .map(|(pos, color, uv)| shade_vertex(vs_program.as_ref(), &cb_refs, *pos, *color, *uv))
                .collect();

            let screen: Vec<(f32, f32, f32, [f32; 4], [f32; 2])> = shaded
                .iter()
                .map(|(clip, color, uv)| {
                    let sx = (clip[0] * 0.5 + 0.5) * self.viewport.width + self.viewport.x;
                    let sy = (1.0 - (clip[1] * 0.5 + 0.5)) * self.viewport.height + self.viewport.y;
                    (sx, sy, clip[2], *color, *uv)
                })
                .collect();

            if cull_mode == CullMode::Back && signed_area(&screen) <= 0.0 {
                continue;
            }

            rasterize_triangle(
                table,
                rt_tex,
                ds_tex,
                rt_w,
                rt_h,
                &screen,
                depth_enable,
                depth_func,
                ps_program.as_ref(),
                &cb_refs,
                self.srvs[0],
            )?;
        }
        Ok(())
    }

    fn shader_program(&self, table: &ResourceTable, handle: usize) -> Option<dxbc::Program> {
        match table.get(handle) {
            Some(Resource::Shader(s)) => s.program.clone(),
            _ => None,
        }
    }

    fn rasterizer_state(&self, table: &ResourceTable) -> CullMode {
        match table.get(self.rasterizer_handle) {
            Some(Resource::RasterizerState { cull_mode }) => *cull_mode,
            _ => CullMode::None,
        }
    }

    fn depth_state(&self, table: &ResourceTable) -> (bool, DepthFunc) {
        match table.get(self.depth_state_handle) {
            Some(Resource::DepthStencilState { depth_enable, func }) => (*depth_enable, *func),
            _ => (false, DepthFunc::Always),
        }
    }

    /// Binds the rasterizer state used by subsequent draws. Not a
    /// `Command` variant of its own — the spec models it as part of the
    /// pipeline object bound alongside VS/PS — so it is set directly
    /// rather than recorded into a command list.
    pub fn set_rasterizer_state(&mut self, handle: usize) {
        self.rasterizer_handle = handle;
    }

    pub fn set_depth_stencil_state(&mut self, handle: usize) {
        self.depth_state_handle = handle;
    }
}

fn shade_vertex(
    program: Option<&dxbc::Program>,
    cbs: &[&[[f32; 4]]],
    pos: [f32; 3],
    color: [f32; 4],
    uv: [f32; 2],
) -> ([f32; 4], [f32; 4], [f32; 2]) {
    match program {
        Some(prog) => {
            let inputs = [[pos[0], pos[1], pos[2], 1.0], color, [uv[0], uv[1], 0.0, 0.0]];
            let mut outputs = [[0.0; 4]; 3];
            {
                let mut ctx = ExecCtx { temps: [[0.0; 4]; 16], inputs: &inputs, outputs: &mut outputs, cbs };
                dxbc::execute(prog, &mut ctx);
            }
            (outputs[0], outputs[1], [outputs[2][0], outputs[2][1]])
        }
        None => ([pos[0], pos[1], pos[2], 1.0], color, uv),
    }
}

fn shade_pixel(program: Option<&dxbc::Program>, cbs: &[&[[f32; 4]]], color: [f32; 4], uv: [f32; 2]) -> [f32; 4] {
    match program {
        Some(prog) => {
            let inputs = [color, [uv[0], uv[1], 0.0, 0.0]];
            let mut outputs = [[0.0; 4]; 1];
            {
                let mut ctx = ExecCtx { temps: [[0.0; 4]; 16], inputs: &inputs, outputs: &mut outputs, cbs };
                dxbc::execute(prog, &mut ctx);
            }
            outputs[0]
        }
        None => color,
    }
}

fn signed_area(screen: &[(f32, f32, f32, [f32; 4], [f32; 2])]) -> f32 {
    let (x0, y0, ..) = screen[0];
    let (x1, y1, ..) = screen[1];
    let (x2, y2, ..) = screen[2];
    (x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0)
}

fn pack_xrgb8888(c: [f32; 4]) -> u32 {
    let to_u8 = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
    (to_u8(c[0]) << 16) | (to_u8(c[1]) << 8) | to_u8(c[2])
}

#[allow(clippy::too_many_arguments)]
fn rasterize_triangle(
    table: &mut ResourceTable,
    rt_tex: usize,
    ds_tex: Option<usize>,
    rt_w: u32,
    rt_h: u32,
    screen: &[(f32, f32, f32, [f32; 4], [f32; 2])],
    depth_enable: bool,
    depth_func: DepthFunc,
    ps_program: Option<&dxbc::Program>,
    cbs: &[&[[f32; 4]]],
    srv: usize,
) -> Result<(), D3dError> {
    let (x0, y0, z0, c0, uv0) = screen[0];
    let (x1, y1, z1, c1, uv1) = screen[1];
    let (x2, y2, z2, c2, uv2) = screen[2];

    let min_x = x0.min(x1).min(x2).floor().max(0.0) as i32;
    let max_x = x0.max(x1).max(x2).ceil().min(rt_w as f32) as i32;
    let min_y = y0.min(y1).min(y2).floor().max(0.0) as i32;
    let max_y = y0.max(y1).max(y2).ceil().min(rt_h as f32) as i32;

    let area = (x1 - x0) * (y2 - y0) - (x2 - x0) * (y1 - y0);
    if area == 0.0 {
        return Ok(());
    }

    let srv_tex = match table.get(srv) {
        Some(Resource::ShaderResourceView { texture }) => Some(*texture),
        _ => None,
    };

    for py in min_y..max_y {
        for px in min_x..max_x {
            let fx = px as f32 + 0.5;
            let fy = py as f32 + 0.5;
            let w0 = ((x1 - fx) * (y2 - fy) - (x2 - fx) * (y1 - fy)) / area;
            let w1 = ((x2 - fx) * (y0 - fy) - (x0 - fx) * (y2 - fy)) / area;
            let w2 = 1.0 - w0 - w1;
            if w0 < 0.0 || w1 < 0.0 || w2 < 0.0 {
                continue;
            }
            let depth = w0 * z0 + w1 * z1 + w2 * z2;
            let idx = (py as u32 * rt_w + px as u32) as usize;

            if depth_enable {
                if let Some(ds_tex) = ds_tex {
                    let pass = match table.get(ds_tex) {
                        Some(Resource::Texture2d(t)) => match depth_func {
                            DepthFunc::Less => depth < t.depth[idx],
                            DepthFunc::Always => true,
                        },
                        _ => true,
                    };
                    if !pass {
                        continue;
                    }
                    if let Some(Resource::Texture2d(t)) = table.get_mut(ds_tex) {
                        t.depth[idx] = depth;
                    }
                }
            }

            let color = [
                w0 * c0[0] + w1 * c1[0] + w2 * c2[0],
                w0 * c0[1] + w1 * c1[1] + w2 * c2[1],
                w0 * c0[2] + w1 * c1[2] + w2 * c2[2],
                w0 * c0[3] + w1 * c1[3] + w2 * c2[3],
            ];
            let uv = [w0 * uv0[0] + w1 * uv1[0] + w2 * uv2[0], w0 * uv0[1] + w1 * uv1[1] + w2 * uv2[1]];

            let sampled = if ps_program.is_none() {
                match srv_tex.and_then(|t| table.get(t)) {
                    Some(Resource::Texture2d(t)) if !t.color.is_empty() => {
                        let packed = sample_nearest(t, uv[0], uv[1]);
                        [
                            ((packed >> 16) & 0xFF) as f32 / 255.0,
                            ((packed >> 8) & 0xFF) as f32 / 255.0,
                            (packed & 0xFF) as f32 / 255.0,
                            1.0,
                        ]
                    }
                    _ => color,
                }
            } else {
                color
            };

            let shaded = shade_pixel(ps_program, cbs, sampled, uv);
            if let Some(Resource::Texture2d(t)) = table.get_mut(rt_tex) {
                t.color[idx] = pack_xrgb8888(shaded);
            }
        }
    }
    Ok(())
}
