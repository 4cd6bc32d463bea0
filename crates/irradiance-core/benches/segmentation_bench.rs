#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use divan::bench;
use irradiance_core::segmentation::RegionLabeler;
use irradiance_core::test_utils::random_mask;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn main() {
    divan::main();
}

fn checkerboard(size: usize, cell: usize) -> Vec<f64> {
    (0..size * size)
        .map(|idx| {
            let (x, y) = (idx % size, idx / size);
            if ((x / cell) + (y / cell)) % 2 == 0 { 1.0 } else { 0.0 }
        })
        .collect()
}

#[bench(args = [32, 64, 128, 256])]
fn bench_label_uniform(bencher: divan::Bencher, size: usize) {
    let values = vec![1.0; size * size];
    let mut labeler = RegionLabeler::new(size, size);

    bencher.bench_local(|| {
        labeler.label(&values, 0.5, 2).regions.len()
    });
}

#[bench(args = [32, 64, 128, 256])]
fn bench_label_checkered(bencher: divan::Bencher, size: usize) {
    // 4x4 tiles give many small regions
    let values = checkerboard(size, 4);
    let mut labeler = RegionLabeler::new(size, size);

    bencher.bench_local(|| {
        labeler.label(&values, 0.5, 2).regions.len()
    });
}

#[bench(args = [64, 256])]
fn bench_label_random(bencher: divan::Bencher, size: usize) {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let values: Vec<f64> = random_mask(&mut rng, size, size, 0.55)
        .into_iter()
        .map(f64::from)
        .collect();
    let mut labeler = RegionLabeler::new(size, size);

    bencher.bench_local(|| {
        labeler.label(&values, 0.5, 2).regions.len()
    });
}
