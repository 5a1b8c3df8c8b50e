use citc_compositor::fb::Framebuffer;
use citc_compositor::render::composite_frame;
use citc_compositor::wintable::{Content, Geometry, WindowTable};
use criterion::{criterion_group, criterion_main, Criterion};

fn bench_composite_1080p(c: &mut Criterion) {
    let mut fb = Framebuffer::new_headless(1920, 1080);
    let mut windows = WindowTable::new();
    windows.set_screen_size(1920, 1080);
    for i in 0..8 {
        let g = Geometry { x: i * 100, y: i * 60, w: 400, h: 300 };
        windows.create(g, format!("window-{i}"), 0x00303030, Content::Internal(String::new()));
    }
    let surfaces: Vec<Option<citc_compositor::server::Surface>> = Vec::new();

    c.bench_function("composite_8_windows_1080p", |b| {
        b.iter(|| {
            composite_frame(&mut fb, &windows, &surfaces, (960, 540));
        })
    });
}

criterion_group!(benches, bench_composite_1080p);
criterion_main!(benches);
