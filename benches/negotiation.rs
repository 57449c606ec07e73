use criterion::{black_box, criterion_group, criterion_main, Criterion};
use still_capture::negotiation::{DisplayExtent, SelectionMode, Size, SizeNegotiator};

fn advertised_sizes() -> Vec<Size> {
    let mut sizes = Vec::new();
    for &(w, h) in &[(4, 3), (16, 9), (3, 2), (1, 1)] {
        for scale in 1..=40u32 {
            sizes.push(Size::new(w * 80 * scale / 4, h * 80 * scale / 4));
        }
    }
    sizes
}

fn bench_select_best(c: &mut Criterion) {
    let sizes = advertised_sizes();
    let negotiator = SizeNegotiator::default();
    let target = DisplayExtent::new(2400, 1080).unwrap();

    c.bench_function("select_best_preview", |b| {
        b.iter(|| negotiator.select_best(black_box(&sizes), SelectionMode::Preview, target))
    });
    c.bench_function("select_best_capture", |b| {
        b.iter(|| negotiator.select_best(black_box(&sizes), SelectionMode::Capture, target))
    });
}

criterion_group!(benches, bench_select_best);
criterion_main!(benches);
