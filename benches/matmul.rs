use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ndkernel::{dot, Shape, Storage};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_matrix(rng: &mut StdRng, rows: usize, cols: usize) -> Storage {
    let data: Vec<f64> = (0..rows * cols).map(|_| rng.gen_range(-1.0..1.0)).collect();
    Storage::from_vec(data, Shape::new(vec![rows, cols])).unwrap()
}

fn bench_rank2_matmul(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank2_matmul");
    let mut rng = StdRng::seed_from_u64(17);
    for size in [32usize, 128, 256] {
        group.throughput(Throughput::Elements((size * size * size) as u64));
        let a = random_matrix(&mut rng, size, size);
        let b = random_matrix(&mut rng, size, size);

        group.bench_with_input(BenchmarkId::new("f64", size), &size, |bench, _| {
            bench.iter(|| dot(&a, &b).unwrap());
        });
    }
    group.finish();
}

fn bench_batched_matmul(c: &mut Criterion) {
    let mut group = c.benchmark_group("batched_matmul");
    let mut rng = StdRng::seed_from_u64(29);
    for batch in [4usize, 16] {
        let m = 64;
        group.throughput(Throughput::Elements((batch * m * m * m) as u64));

        let left_data: Vec<f64> = (0..batch * m * m).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let right_data: Vec<f64> = (0..m * m).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let left = Storage::from_vec(left_data, Shape::new(vec![batch, m, m])).unwrap();
        // A single shared right matrix broadcasts across every batch.
        let right = Storage::from_vec(right_data, Shape::new(vec![1, m, m])).unwrap();

        group.bench_with_input(BenchmarkId::new("shared_rhs", batch), &batch, |bench, _| {
            bench.iter(|| dot(&left, &right).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rank2_matmul, bench_batched_matmul);
criterion_main!(benches);
