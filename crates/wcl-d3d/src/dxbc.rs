//! A minimal DXBC interpreter (spec.md §4.12): `mov`, `add`, `mul`, `dp4`,
//! `ge`, `lt`, `min`, `max`, `movc`, structured `if_nz`/`else`/`endif`,
//! `ret`. Operand encoding follows the shader-model-4 token shape
//! described in the spec — constant-buffer indirection `cb0[k]`, temp
//! registers `r#`, input `v#`, output `o#`, 4-component immediates,
//! swizzle/write-mask — packed here as one `u32` header per operand (two
//! file-selector bits, a slot and an index field, an 8-bit swizzle, a
//! 4-bit write mask, and an immediate flag) rather than the real binary
//! DXBC container, since no real compiler ever produces bytecode for this
//! runtime. Grounded on the resource-and-command shape of
//! `wgpu-hal::dx12` (`other_examples/.../dx12/mod.rs`), generalized from
//! "translate WebGPU IR to real DXBC/DXIL" to "interpret our own encoding
//! directly" since there is no downstream GPU to hand real bytecode to.

use crate::error::ShaderError;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegisterFile {
    Temp,
    Input,
    Output,
    ConstantBuffer,
}

impl RegisterFile {
    fn from_bits(bits: u32) -> Result<Self, ShaderError> {
        match bits {
            0 => Ok(Self::Temp),
            1 => Ok(Self::Input),
            2 => Ok(Self::Output),
            3 => Ok(Self::ConstantBuffer),
            other => Err(ShaderError::UnknownRegisterFile(other)),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Operand {
    Register { file: RegisterFile, slot: u8, index: u16, swizzle: [u8; 4], write_mask: u8 },
    Immediate([f32; 4]),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpCode {
    Mov,
    Add,
    Mul,
    Dp4,
    Ge,
    Lt,
    Min,
    Max,
    Movc,
    IfNz,
    Else,
    EndIf,
    Ret,
}

impl OpCode {
    fn from_tag(tag: u32) -> Result<Self, ShaderError> {
        Ok(match tag {
            0 => Self::Mov,
            1 => Self::Add,
            2 => Self::Mul,
            3 => Self::Dp4,
            4 => Self::Ge,
            5 => Self::Lt,
            6 => Self::Min,
            7 => Self::Max,
            8 => Self::Movc,
            9 => Self::IfNz,
            10 => Self::Else,
            11 => Self::EndIf,
            12 => Self::Ret,
            other => return Err(ShaderError::UnknownOpcode(other)),
        })
    }

    fn arity(self) -> usize {
        match self {
            Self::Mov => 2,
            Self::Add | Self::Mul | Self::Dp4 | Self::Ge | Self::Lt | Self::Min | Self::Max => 3,
            Self::Movc => 4,
            Self::IfNz => 1,
            Self::Else | Self::EndIf | Self::Ret => 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Instruction {
    pub op: OpCode,
    pub operands: Vec<Operand>,
}

#[derive(Clone, Debug, Default)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn read_u32(&mut self) -> Result<u32, ShaderError> {
        let end = self.pos + 4;
        let slice = self.bytes.get(self.pos..end).ok_or(ShaderError::Truncated)?;
        self.pos = end;
        Ok(u32::from_le_bytes(slice.try_into().unwrap()))
    }

    fn read_f32(&mut self) -> Result<f32, ShaderError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

fn decode_operand(r: &mut Reader) -> Result<Operand, ShaderError> {
    let header = r.read_u32()?;
    let is_immediate = header & 1 != 0;
    if is_immediate {
        let mut v = [0f32; 4];
        for slot in v.iter_mut() {
            *slot = r.read_f32()?;
        }
        return Ok(Operand::Immediate(v));
    }
    let file = RegisterFile::from_bits((header >> 1) & 0x3)?;
    let slot = ((header >> 3) & 0xF) as u8;
    let index = ((header >> 7) & 0xFFF) as u16;
    let swizzle_bits = (header >> 19) & 0xFF;
    let swizzle = [
        (swizzle_bits & 0x3) as u8,
        ((swizzle_bits >> 2) & 0x3) as u8,
        ((swizzle_bits >> 4) & 0x3) as u8,
        ((swizzle_bits >> 6) & 0x3) as u8,
    ];
    let write_mask = ((header >> 27) & 0xF) as u8;
    Ok(Operand::Register { file, slot, index, swizzle, write_mask })
}

/// Parses a shader blob into a [`Program`]. Any decode failure is
/// reported to the caller, who is expected to fall back to a fixed
/// function pipeline rather than abort (spec.md §4.12).
pub fn parse(bytecode: &[u8]) -> Result<Program, ShaderError> {
    let mut r = Reader::new(bytecode);
    let mut instructions = Vec::new();
    while !r.eof() {
        let tag = r.read_u32()?;
        let op = OpCode::from_tag(tag)?;
        let mut operands = Vec::with_capacity(op.arity());
        for _ in 0..op.arity() {
            operands.push(decode_operand(&mut r)?);
        }
        instructions.push(Instruction { op, operands });
    }
    Ok(Program { instructions })
}

/// Register file backing one shader invocation: temps are scratch,
/// inputs/outputs are the current vertex or pixel's attribute vectors,
/// constant buffers are read-only and indexed `cb0[k]`-style by
/// `(slot, index)`.
pub struct ExecCtx<'a> {
    pub temps: [[f32; 4]; 16],
    pub inputs: &'a [[f32; 4]],
    pub outputs: &'a mut [[f32; 4]],
    pub cbs: &'a [&'a [[f32; 4]]],
}

fn swizzled(v: [f32; 4], swizzle: [u8; 4]) -> [f32; 4] {
    [v[swizzle[0] as usize], v[swizzle[1] as usize], v[swizzle[2] as usize], v[swizzle[3] as usize]]
}

fn read_operand(op: &Operand, ctx: &ExecCtx) -> [f32; 4] {
    match op {
        Operand::Immediate(v) => *v,
        Operand::Register { file, slot, index, swizzle, .. } => {
            let raw = match file {
                RegisterFile::Temp => ctx.temps.get(*index as usize).copied().unwrap_or([0.0; 4]),
                RegisterFile::Input => ctx.inputs.get(*index as usize).copied().unwrap_or([0.0; 4]),
                RegisterFile::Output => ctx.outputs.get(*index as usize).copied().unwrap_or([0.0; 4]),
                RegisterFile::ConstantBuffer => ctx
                    .cbs
                    .get(*slot as usize)
                    .and_then(|cb| cb.get(*index as usize))
                    .copied()
                    .unwrap_or([0.0; 4]),
            };
            swizzled(raw, *swizzle)
        }
    }
}

fn write_operand<'a, 'b>(op: &Operand, ctx: &'b mut ExecCtx<'a>) -> Option<(&'b mut [f32; 4], u8)> {
    match op {
        Operand::Immediate(_) => None,
        Operand::Register { file, index, write_mask, .. } => match file {
            RegisterFile::Temp => ctx.temps.get_mut(*index as usize).map(|r| (r, *write_mask)),
            RegisterFile::Output => ctx.outputs.get_mut(*index as usize).map(|r| (r, *write_mask)),
            RegisterFile::Input | RegisterFile::ConstantBuffer => None,
        },
    }
}

fn apply_masked(dst: &mut [f32; 4], mask: u8, value: [f32; 4]) {
    for (c, slot) in dst.iter_mut().enumerate() {
        if mask & (1 << c) != 0 {
            *slot = value[c];
        }
    }
}

/// Runs `program` to completion against `ctx`. `if_nz` tests the `.x`
/// component of its operand; nesting is supported via a condition stack.
pub fn execute(program: &Program, ctx: &mut ExecCtx) {
    let mut cond_stack: Vec<bool> = Vec::new();
    let active = |stack: &[bool]| stack.iter().all(|&c| c);

    for inst in &program.instructions {
        match inst.op {
            OpCode::IfNz => {
                let cond = active(&cond_stack) && read_operand(&inst.operands[0], ctx)[0] != 0.0;
                cond_stack.push(cond);
                continue;
            }
            OpCode::Else => {
                if let Some(top) = cond_stack.last_mut() {
                    *top = !*top && active(&cond_stack[..cond_stack.len() - 1]);
                }
                continue;
            }
            OpCode::EndIf => {
                cond_stack.pop();
                continue;
            }
            OpCode::Ret => {
                if active(&cond_stack) {
                    return;
                }
                continue;
            }
            _ => {}
        }
        if !active(&cond_stack) {
            continue;
        }
        match inst.op {
            OpCode::Mov => {
                let src = read_operand(&inst.operands[1], ctx);
                if let Some((dst, mask)) = write_operand(&inst.operands[0], ctx) {
                    apply_masked(dst, mask, src);
                }
            }
            OpCode::Add | OpCode::Mul | OpCode::Ge | OpCode::Lt | OpCode::Min | OpCode::Max => {
                let a = read_operand(&inst.operands[1], ctx);
                let b = read_operand(&inst.operands[2], ctx);
                let result = match inst.op {
                    OpCode::Add => [a[0] + b[0], a[1] + b[1], a[2] + b[2], a[3] + b[3]],
                    OpCode::Mul => [a[0] * b[0], a[1] * b[1], a[2] * b[2], a[3] * b[3]],
                    OpCode::Ge => std::array::from_fn(|i| if a[i] >= b[i] { 1.0 } else { 0.0 }),
                    OpCode::Lt => std::array::from_fn(|i| if a[i] < b[i] { 1.0 } else { 0.0 }),
                    OpCode::Min => std::array::from_fn(|i| a[i].min(b[i])),
                    OpCode::Max => std::array::from_fn(|i| a[i].max(b[i])),
                    _ => unreachable!(),
                };
                if let Some((dst, mask)) = write_operand(&inst.operands[0], ctx) {
                    apply_masked(dst, mask, result);
                }
            }
            OpCode::Dp4 => {
                let a = read_operand(&inst.operands[1], ctx);
                let b = read_operand(&inst.operands[2], ctx);
                let dot = a[0] * b[0] + a[1] * b[1] + a[2] * b[2] + a[3] * b[3];
                if let Some((dst, mask)) = write_operand(&inst.operands[0], ctx) {
                    apply_masked(dst, mask, [dot; 4]);
                }
            }
            OpCode::Movc => {
                let cond = read_operand(&inst.operands[1], ctx);
                let a = read_operand(&inst.operands[2], ctx);
                let b = read_operand(&inst.operands[3], ctx);
                let result = std::array::from_fn(|i| if cond[i] != 0.0 { a[i] } else { b[i] });
                if let Some((dst, mask)) = write_operand(&inst.operands[0], ctx) {
                    apply_masked(dst, mask, result);
                }
            }
            OpCode::IfNz | OpCode::Else | OpCode::EndIf | OpCode::Ret => unreachable!(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reg(file: RegisterFile, index: u16) -> Operand {
        Operand::Register { file, slot: 0, index, swizzle: [0, 1, 2, 3], write_mask: 0b1111 }
    }

    #[test]
    fn mov_copies_input_to_output() {
        let program = Program {
            instructions: vec![Instruction { op: OpCode::Mov, operands: vec![reg(RegisterFile::Output, 0), reg(RegisterFile::Input, 0)] }],
        };
        let inputs = [[1.0, 2.0, 3.0, 4.0]];
        let mut outputs = [[0.0; 4]];
        let mut ctx = ExecCtx { temps: [[0.0; 4]; 16], inputs: &inputs, outputs: &mut outputs, cbs: &[] };
        execute(&program, &mut ctx);
        assert_eq!(outputs[0], [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn dp4_broadcasts_dot_product() {
        let program = Program {
            instructions: vec![Instruction {
                op: OpCode::Dp4,
                operands: vec![reg(RegisterFile::Output, 0), reg(RegisterFile::Input, 0), reg(RegisterFile::Input, 1)],
            }],
        };
        let inputs = [[1.0, 0.0, 0.0, 0.0], [2.0, 0.0, 0.0, 0.0]];
        let mut outputs = [[0.0; 4]];
        let mut ctx = ExecCtx { temps: [[0.0; 4]; 16], inputs: &inputs, outputs: &mut outputs, cbs: &[] };
        execute(&program, &mut ctx);
        assert_eq!(outputs[0], [2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn if_nz_else_endif_selects_branch() {
        let program = Program {
            instructions: vec![
                Instruction { op: OpCode::IfNz, operands: vec![reg(RegisterFile::Input, 0)] },
                Instruction { op: OpCode::Mov, operands: vec![reg(RegisterFile::Output, 0), Operand::Immediate([1.0; 4])] },
                Instruction { op: OpCode::Else, operands: vec![] },
                Instruction { op: OpCode::Mov, operands: vec![reg(RegisterFile::Output, 0), Operand::Immediate([2.0; 4])] },
                Instruction { op: OpCode::EndIf, operands: vec![] },
            ],
        };
        let mut outputs = [[0.0; 4]];
        {
            let inputs = [[0.0; 4]];
            let mut ctx = ExecCtx { temps: [[0.0; 4]; 16], inputs: &inputs, outputs: &mut outputs, cbs: &[] };
            execute(&program, &mut ctx);
        }
        assert_eq!(outputs[0], [2.0; 4]);

        let mut outputs = [[0.0; 4]];
        {
            let inputs = [[1.0; 4]];
            let mut ctx = ExecCtx { temps: [[0.0; 4]; 16], inputs: &inputs, outputs: &mut outputs, cbs: &[] };
            execute(&program, &mut ctx);
        }
        assert_eq!(outputs[0], [1.0; 4]);
    }

    #[test]
    fn malformed_opcode_fails_to_parse() {
        let blob = 99u32.to_le_bytes();
        assert!(matches!(parse(&blob), Err(ShaderError::UnknownOpcode(99))));
    }

    #[test]
    fn truncated_blob_fails_to_parse() {
        let blob = [0u8; 2];
        assert!(matches!(parse(&blob), Err(ShaderError::Truncated)));
    }
}
