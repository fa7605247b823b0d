use criterion::{criterion_group, criterion_main, Criterion};
use detdecode::lowlevel::ScalarKernel;
use detdecode::{DecodeConfig, HostDevice, ParallelDecoder, PredictionView, SequentialDecoder};
use std::hint::black_box;

/// Deterministic YOLOv5-shaped tensor: 25200 anchors, 80 classes.
fn make_predictions(rows: usize, cols: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(rows * cols);
    for i in 0..rows {
        let hash = i.wrapping_mul(2654435761) & 0xFFFF;
        data.push((i % 80) as f32 * 8.0);
        data.push((i / 80 % 80) as f32 * 8.0);
        data.push(16.0 + (hash % 48) as f32);
        data.push(16.0 + (hash / 48 % 48) as f32);
        // Roughly one anchor in 64 clears the threshold.
        data.push(if hash % 64 == 0 { 0.9 } else { 0.05 });
        for class in 0..cols - 5 {
            data.push(if class == i % (cols - 5) { 0.8 } else { 0.01 });
        }
    }
    data
}

fn bench_decoders(c: &mut Criterion) {
    let rows = 25200;
    let cols = 85;
    let data = make_predictions(rows, cols);
    let view = PredictionView::new(&data, rows, cols).unwrap();
    let cfg = DecodeConfig {
        max_objects: 1024,
        ..DecodeConfig::default()
    };

    let sequential = SequentialDecoder::new(cfg.clone());
    c.bench_function("decode_sequential", |b| {
        b.iter(|| black_box(sequential.decode_view(view)));
    });

    let scalar = ParallelDecoder::with_kernel(HostDevice::new(), ScalarKernel, cfg.clone());
    c.bench_function("decode_device_scalar_kernel", |b| {
        b.iter(|| black_box(scalar.decode_view(view).unwrap()));
    });

    if cfg!(feature = "rayon") {
        let parallel = ParallelDecoder::new(cfg);
        c.bench_function("decode_device_default_kernel", |b| {
            b.iter(|| black_box(parallel.decode_view(view).unwrap()));
        });
    }
}

criterion_group!(benches, bench_decoders);
criterion_main!(benches);
