use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rayos_compositor::region::ClipRegion;
use rayos_compositor::window::WindowLook;
use rayos_compositor::{CompositorConfig, Desktop, Rect, WindowSpec};

/// A staircase of overlapping rectangles, the usual shape of a cascade.
fn cascade(count: i32) -> Vec<Rect> {
    (0..count).map(|i| Rect::new(i * 17, i * 11, 240, 180)).collect()
}

fn bench_region_algebra(c: &mut Criterion) {
    let mut group = c.benchmark_group("region");
    for count in [8, 32, 128] {
        let rects = cascade(count);
        group.bench_with_input(BenchmarkId::new("include", count), &rects, |b, rects| {
            b.iter(|| {
                let mut region = ClipRegion::new();
                for r in rects {
                    region.include(*r);
                }
                black_box(region.len())
            })
        });
        group.bench_with_input(BenchmarkId::new("exclude", count), &rects, |b, rects| {
            b.iter(|| {
                let mut region = ClipRegion::from_rect(Rect::new(0, 0, 4096, 4096));
                for r in rects {
                    region.exclude(*r);
                }
                black_box(region.len())
            })
        });
    }
    group.finish();
}

fn bench_visible_regions(c: &mut Criterion) {
    let desktop = Desktop::headless(CompositorConfig::default());
    let ids: Vec<_> = cascade(24)
        .into_iter()
        .enumerate()
        .map(|(i, frame)| {
            let spec = WindowSpec::new(format!("w{}", i), frame).look(WindowLook::NoBorder);
            desktop.create_window(spec).expect("window")
        })
        .collect();

    c.bench_function("visible_regions_cold", |b| {
        b.iter(|| {
            desktop.clip().invalidate_all();
            for id in &ids {
                black_box(desktop.visible_region(*id).expect("region").area());
            }
        })
    });
    c.bench_function("render_frame", |b| b.iter(|| black_box(desktop.render_frame().expect("frame").presented)));
}

criterion_group!(benches, bench_region_algebra, bench_visible_regions);
criterion_main!(benches);
