use citc_proto::wire::{read_frame, write_frame, Request};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_frame_round_trip(c: &mut Criterion) {
    let req = Request::CreateSurface { x: 100, y: 100, w: 300, h: 200 };
    let (t, payload) = req.encode().expect("encode request");

    c.bench_function("write_frame_create_surface", |b| {
        b.iter(|| {
            let mut buf = Vec::new();
            write_frame(&mut buf, t, &payload).expect("write frame");
        })
    });

    let mut encoded = Vec::new();
    write_frame(&mut encoded, t, &payload).unwrap();
    c.bench_function("read_frame_create_surface", |b| {
        b.iter(|| {
            let mut cursor = std::io::Cursor::new(&encoded);
            let _ = read_frame(&mut cursor).expect("read frame");
        })
    });
}

criterion_group!(benches, bench_frame_round_trip);
criterion_main!(benches);
