// Measures candidate probing, the fixed cost every network run pays before full
// training, across marker counts typical of small and medium panels.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use genomic_neuralnet::candidate::{NET_TRIES, probe_pool};
use genomic_neuralnet::config::NetworkConfig;
use genomic_neuralnet::trainer::PROBE_EPOCHS;

/// Number of training samples in every benchmark case.
const NUM_SAMPLES: usize = 200;
/// Marker counts to benchmark.
const MARKER_COUNTS: [usize; 3] = [50, 200, 800];

fn simulated_panel(samples: usize, markers: usize) -> (Array2<f64>, Array1<f64>) {
    let mut rng = StdRng::seed_from_u64(42);
    let x = Array2::from_shape_simple_fn((samples, markers), || rng.gen_range(-1..=1) as f64);
    let effects = Array1::from_shape_simple_fn(markers, || rng.gen_range(-0.1..0.1));
    let y = x.dot(&effects);
    (x, y)
}

fn bench_probe_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("probe_pool");
    group.sample_size(10);
    let config = NetworkConfig::default();

    for markers in MARKER_COUNTS {
        let (x, y) = simulated_panel(NUM_SAMPLES, markers);
        group.throughput(Throughput::Elements((NUM_SAMPLES * PROBE_EPOCHS) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(markers), &markers, |b, _| {
            b.iter(|| {
                probe_pool(
                    black_box(&config),
                    x.view(),
                    y.view(),
                    0,
                    NET_TRIES,
                    PROBE_EPOCHS,
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_probe_pool);
criterion_main!(benches);
