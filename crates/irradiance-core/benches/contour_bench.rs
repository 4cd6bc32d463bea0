#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use bumpalo::Bump;
use divan::bench;
use irradiance_core::contour::{ContourTracer, outer_loop};
use irradiance_core::refine::refine_outline;
use irradiance_core::segmentation::RegionLabeler;
use irradiance_core::test_utils::{random_mask, rect_mask};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn main() {
    divan::main();
}

fn values_of(mask: &[u8]) -> Vec<f64> {
    mask.iter().map(|&m| f64::from(m)).collect()
}

#[bench(args = [32, 128, 256])]
fn bench_trace_centre_square(bencher: divan::Bencher, size: usize) {
    let q = size / 4;
    let values = values_of(&rect_mask(size, size, &[(q, q, size / 2, size / 2)]));
    let mut labeler = RegionLabeler::new(size, size);
    let result = labeler.label(&values, 0.5, 2);
    let mut tracer = ContourTracer::new(size, size);
    let mut arena = Bump::new();

    bencher.bench_local(|| {
        arena.reset();
        tracer.trace(&arena, result.labels, &result.regions[0]).len()
    });
}

#[bench]
fn bench_trace_random_regions(bencher: divan::Bencher) {
    let size = 128;
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let values = values_of(&random_mask(&mut rng, size, size, 0.55));
    let mut labeler = RegionLabeler::new(size, size);
    let result = labeler.label(&values, 0.5, 2);
    let mut tracer = ContourTracer::new(size, size);
    let mut arena = Bump::new();

    bencher.bench_local(|| {
        arena.reset();
        let mut total = 0;
        for region in &result.regions {
            total += tracer.trace(&arena, result.labels, region).len();
        }
        total
    });
}

#[bench(args = [32, 128])]
fn bench_refine_square_outline(bencher: divan::Bencher, size: usize) {
    let q = size / 4;
    let values = values_of(&rect_mask(size, size, &[(q, q, size / 2, size / 2)]));
    let mut labeler = RegionLabeler::new(size, size);
    let result = labeler.label(&values, 0.5, 2);
    let mut tracer = ContourTracer::new(size, size);
    let trace_arena = Bump::new();
    let loops = tracer.trace(&trace_arena, result.labels, &result.regions[0]);
    let outline = outer_loop(&loops).unwrap().points.to_vec();
    let mut arena = Bump::new();

    bencher.bench_local(|| {
        arena.reset();
        refine_outline(&arena, &outline).map(|ring| ring.len())
    });
}
