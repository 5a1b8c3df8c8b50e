use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wcl_d3d::dxbc::{self, ExecCtx, Instruction, OpCode, Operand, Program, RegisterFile};

fn passthrough_program() -> Program {
    let reg = |file, index| Operand::Register { file, slot: 0, index, swizzle: [0, 1, 2, 3], write_mask: 0b1111 };
    Program {
        instructions: vec![
            Instruction { op: OpCode::Mov, operands: vec![reg(RegisterFile::Output, 0), reg(RegisterFile::Input, 0)] },
            Instruction { op: OpCode::Mov, operands: vec![reg(RegisterFile::Output, 1), reg(RegisterFile::Input, 1)] },
        ],
    }
}

fn bench_execute(c: &mut Criterion) {
    let program = passthrough_program();
    let inputs = [[1.0, 2.0, 3.0, 4.0], [0.5, 0.5, 0.5, 1.0]];
    c.bench_function("dxbc_execute_passthrough", |b| {
        b.iter(|| {
            let mut outputs = [[0.0; 4]; 2];
            let mut ctx = ExecCtx { temps: [[0.0; 4]; 16], inputs: &inputs, outputs: &mut outputs, cbs: &[] };
            dxbc::execute(black_box(&program), &mut ctx);
            outputs
        })
    });
}

criterion_group!(benches, bench_execute);
criterion_main!(benches);
