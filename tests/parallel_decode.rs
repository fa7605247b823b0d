use detdecode::lowlevel::{DecodeKernel, KernelArgs, ScalarKernel};
use detdecode::{
    iou, Backend, Decode, DecodeConfig, DecodeError, DecodeResult, Decoder, DetectionBox,
    DeviceConfig, HostDevice, ParallelDecoder, PredictionView, SequentialDecoder,
};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const NUM_CLASSES: usize = 3;
const COLS: usize = 5 + NUM_CLASSES;

fn push_row(data: &mut Vec<f32>, cx: f32, cy: f32, size: f32, objectness: f32, label: usize) {
    data.extend_from_slice(&[cx, cy, size, size, objectness]);
    for class in 0..NUM_CLASSES {
        data.push(if class == label { 1.0 } else { 0.05 });
    }
}

/// Well-separated clusters of heavily overlapping boxes, plus rows below the
/// threshold. Within a cluster every same-label pair overlaps beyond 0.45,
/// and all confidences are distinct, so greedy and pairwise suppression keep
/// the same boxes.
fn clustered_tensor(seed: u64) -> (Vec<f32>, usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut objectness: Vec<f32> = (0..120).map(|k| 0.30 + 0.005 * k as f32).collect();
    objectness.shuffle(&mut rng);
    let mut next_conf = objectness.into_iter();

    let mut data = Vec::new();
    let mut rows = 0;
    for cluster in 0..12 {
        let cx = 50.0 + 100.0 * (cluster % 4) as f32;
        let cy = 50.0 + 100.0 * (cluster / 4) as f32;
        for _ in 0..rng.random_range(2..6) {
            let label = rng.random_range(0..NUM_CLASSES);
            let jx = rng.random_range(-1.0f32..1.0);
            let jy = rng.random_range(-1.0f32..1.0);
            let conf = next_conf.next().unwrap();
            push_row(&mut data, cx + jx, cy + jy, 20.0, conf, label);
            rows += 1;
        }
        for _ in 0..3 {
            let noise = rng.random_range(0.0f32..0.2);
            push_row(&mut data, cx, cy, 20.0, noise, 0);
            rows += 1;
        }
    }
    (data, rows)
}

fn sorted_by_label_conf(mut boxes: Vec<DetectionBox>) -> Vec<DetectionBox> {
    boxes.sort_by(|a, b| {
        a.label
            .cmp(&b.label)
            .then(b.confidence.total_cmp(&a.confidence))
    });
    boxes
}

fn assert_same_set(a: Vec<DetectionBox>, b: Vec<DetectionBox>) {
    let a = sorted_by_label_conf(a);
    let b = sorted_by_label_conf(b);
    assert_eq!(a.len(), b.len());
    let tol = 1e-5;
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.label, y.label);
        assert!((x.confidence - y.confidence).abs() <= tol);
        assert!((x.left - y.left).abs() <= tol);
        assert!((x.top - y.top).abs() <= tol);
        assert!((x.right - y.right).abs() <= tol);
        assert!((x.bottom - y.bottom).abs() <= tol);
    }
}

fn parallel_cfg() -> DecodeConfig {
    DecodeConfig {
        backend: Backend::Parallel,
        ..DecodeConfig::default()
    }
}

#[test]
fn parallel_reproduces_reference_scenarios() {
    let decoder = Decoder::new(parallel_cfg());
    let mut data = Vec::new();
    push_row(&mut data, 10.0, 10.0, 4.0, 0.9, 0);
    let boxes = decoder.decode(&data, 1, COLS).unwrap();
    assert_eq!(boxes.len(), 1);
    assert_eq!(
        (boxes[0].left, boxes[0].top, boxes[0].right, boxes[0].bottom),
        (8.0, 8.0, 12.0, 12.0)
    );

    push_row(&mut data, 10.2, 10.0, 4.0, 0.5, 0);
    let boxes = decoder.decode(&data, 2, COLS).unwrap();
    assert_eq!(boxes.len(), 1);
    assert!((boxes[0].confidence - 0.9).abs() < 1e-6);

    let mut data = Vec::new();
    push_row(&mut data, 10.0, 10.0, 4.0, 0.1, 0);
    assert!(decoder.decode(&data, 1, COLS).unwrap().is_empty());

    let mut data = Vec::new();
    push_row(&mut data, 10.0, 10.0, 4.0, 0.9, 0);
    push_row(&mut data, 10.0, 10.0, 4.0, 0.8, 1);
    assert_eq!(decoder.decode(&data, 2, COLS).unwrap().len(), 2);
}

#[test]
fn parallel_matches_sequential_as_a_set() {
    for seed in [1u64, 2, 3] {
        let (data, rows) = clustered_tensor(seed);
        let view = PredictionView::new(&data, rows, COLS).unwrap();
        let cfg = DecodeConfig::default();
        let sequential = SequentialDecoder::new(cfg.clone()).decode_view(view);
        let parallel = ParallelDecoder::with_kernel(HostDevice::new(), ScalarKernel, cfg)
            .decode_view(view)
            .unwrap();
        assert!(!sequential.is_empty());
        assert_same_set(sequential, parallel);
    }
}

#[test]
fn parallel_output_respects_floor_and_label_scoped_overlap() {
    let (data, rows) = clustered_tensor(9);
    let view = PredictionView::new(&data, rows, COLS).unwrap();
    let cfg = DecodeConfig::default();
    let boxes = ParallelDecoder::new(cfg.clone()).decode_view(view).unwrap();
    for (i, a) in boxes.iter().enumerate() {
        assert!(a.confidence >= cfg.confidence_threshold);
        for b in &boxes[i + 1..] {
            if a.label == b.label {
                assert!(iou(a, b) < cfg.nms_threshold);
            }
        }
    }
}

#[test]
fn parallel_result_never_exceeds_capacity() {
    let mut data = Vec::new();
    for idx in 0..50 {
        push_row(&mut data, 30.0 * idx as f32, 0.0, 10.0, 0.9, idx % NUM_CLASSES);
    }
    let cfg = DecodeConfig {
        max_objects: 8,
        ..parallel_cfg()
    };
    let boxes = Decoder::new(cfg).decode(&data, 50, COLS).unwrap();
    assert_eq!(boxes.len(), 8);
}

#[test]
fn successful_call_releases_device_resources() {
    let device = HostDevice::new();
    let decoder = ParallelDecoder::with_device(device.clone(), DecodeConfig::default());
    let (data, rows) = clustered_tensor(4);
    let view = PredictionView::new(&data, rows, COLS).unwrap();
    decoder.decode_view(view).unwrap();
    assert_eq!(device.bytes_in_use(), 0);
    assert_eq!(device.pinned_bytes_in_use(), 0);
    assert_eq!(device.live_streams(), 0);
}

#[test]
fn allocation_failure_is_reported_and_released() {
    let device = HostDevice::with_config(DeviceConfig {
        memory_limit: Some(256),
        pinned_limit: None,
    });
    let decoder = Decoder::with_device(parallel_cfg(), device.clone());
    let (data, rows) = clustered_tensor(5);
    let err = decoder.decode(&data, rows, COLS).unwrap_err();
    assert!(matches!(err, DecodeError::OutOfMemory { pool: "device", .. }));
    assert_eq!(device.bytes_in_use(), 0);
    assert_eq!(device.live_streams(), 0);
}

struct FailingKernel;

impl DecodeKernel for FailingKernel {
    fn decode_and_suppress(&self, _args: &KernelArgs) -> DecodeResult<()> {
        Err(DecodeError::KernelFailed {
            reason: "injected".to_owned(),
        })
    }
}

#[test]
fn kernel_failure_surfaces_at_synchronize_and_releases() {
    let device = HostDevice::new();
    let decoder =
        ParallelDecoder::with_kernel(device.clone(), FailingKernel, DecodeConfig::default());
    let (data, rows) = clustered_tensor(6);
    let view = PredictionView::new(&data, rows, COLS).unwrap();
    let err = decoder.decode_view(view).unwrap_err();
    assert_eq!(
        err,
        DecodeError::KernelFailed {
            reason: "injected".to_owned(),
        }
    );
    assert_eq!(device.bytes_in_use(), 0);
    assert_eq!(device.pinned_bytes_in_use(), 0);
    assert_eq!(device.live_streams(), 0);
}

#[test]
fn invalid_capacity_is_rejected_before_allocation() {
    let device = HostDevice::new();
    let cfg = DecodeConfig {
        max_objects: 0,
        ..DecodeConfig::default()
    };
    let decoder = ParallelDecoder::with_device(device.clone(), cfg);
    let data = [0.0f32; COLS];
    let view = PredictionView::new(&data, 1, COLS).unwrap();
    assert!(matches!(
        decoder.decode_view(view),
        Err(DecodeError::InvalidConfig(_))
    ));
    assert_eq!(device.live_streams(), 0);
}

#[test]
fn decoders_are_substitutable_behind_the_trait() {
    let (data, rows) = clustered_tensor(7);
    let view = PredictionView::new(&data, rows, COLS).unwrap();
    let decoders: Vec<Box<dyn Decode>> = vec![
        Box::new(SequentialDecoder::default()),
        Box::new(ParallelDecoder::new(DecodeConfig::default())),
    ];
    let results: Vec<_> = decoders
        .iter()
        .map(|decoder| decoder.decode(view).unwrap())
        .collect();
    assert_same_set(results[0].clone(), results[1].clone());
}

#[test]
fn unbackable_capacity_reports_out_of_memory() {
    let device = HostDevice::new();
    let cfg = DecodeConfig {
        max_objects: u32::MAX as usize,
        ..DecodeConfig::default()
    };
    let decoder = ParallelDecoder::with_kernel(device.clone(), ScalarKernel, cfg);
    let mut data = Vec::new();
    push_row(&mut data, 10.0, 10.0, 4.0, 0.9, 0);
    let view = PredictionView::new(&data, 1, COLS).unwrap();
    let err = decoder.decode_view(view).unwrap_err();
    assert!(matches!(err, DecodeError::OutOfMemory { .. }));
    assert_eq!(device.bytes_in_use(), 0);
    assert_eq!(device.pinned_bytes_in_use(), 0);
    assert_eq!(device.live_streams(), 0);
}

#[test]
fn equal_confidence_keeps_the_lower_slot() {
    let mut data = Vec::new();
    push_row(&mut data, 10.0, 10.0, 10.0, 0.7, 0);
    push_row(&mut data, 11.0, 10.0, 10.0, 0.7, 0);
    let view = PredictionView::new(&data, 2, COLS).unwrap();
    let cfg = DecodeConfig::default();
    let sequential = SequentialDecoder::new(cfg.clone()).decode_view(view);
    let parallel = ParallelDecoder::with_kernel(HostDevice::new(), ScalarKernel, cfg)
        .decode_view(view)
        .unwrap();
    assert_eq!(parallel.len(), 1);
    assert_eq!(parallel[0].left, 5.0);
    assert_eq!(sequential, parallel);
}

#[test]
fn suppressed_box_still_suppresses_in_parallel() {
    // b overlaps a and c; c overlaps only b.
    let mut data = Vec::new();
    push_row(&mut data, 20.0, 10.0, 10.0, 0.9, 0);
    push_row(&mut data, 24.0, 10.0, 10.0, 0.8, 0);
    push_row(&mut data, 28.0, 10.0, 10.0, 0.7, 0);
    let view = PredictionView::new(&data, 3, COLS).unwrap();
    let cfg = DecodeConfig {
        nms_threshold: 0.4,
        ..DecodeConfig::default()
    };

    let sequential = SequentialDecoder::new(cfg.clone()).decode_view(view);
    assert_eq!(sequential.len(), 2);
    assert_eq!((sequential[0].left, sequential[1].left), (15.0, 23.0));

    let parallel = ParallelDecoder::new(cfg).decode_view(view).unwrap();
    assert_eq!(parallel.len(), 1);
    assert_eq!(parallel[0].left, 15.0);
}
