//! Insert and k-NN search throughput on a temp-dir database.

use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use tempfile::TempDir;
use vectoria::{DistanceMetric, NewPoint, SearchParams, Settings, VectorDb};

const DIMENSION: usize = 16;

fn random_vector(rng: &mut StdRng) -> Vec<f64> {
    (0..DIMENSION).map(|_| rng.random_range(-1.0..1.0)).collect()
}

fn open_db(dir: &TempDir) -> VectorDb {
    VectorDb::open(Settings::with_storage_path(dir.path().join("collections"))).unwrap()
}

fn bench_insert(c: &mut Criterion) {
    c.bench_function("insert_1000_vectors_16d", |b| {
        b.iter_batched(
            || {
                let dir = TempDir::new().unwrap();
                let db = open_db(&dir);
                let collection = db
                    .add_collection("bench", DIMENSION, DistanceMetric::Euclidean)
                    .unwrap();
                let mut rng = StdRng::seed_from_u64(1);
                let points: Vec<NewPoint> = (0..1000)
                    .map(|i| NewPoint::new(format!("v{i}"), random_vector(&mut rng)))
                    .collect();
                (dir, db, collection, points)
            },
            |(_dir, _db, collection, points)| {
                black_box(collection.insert_batch(points).unwrap());
            },
            BatchSize::PerIteration,
        );
    });
}

fn bench_search(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let db = open_db(&dir);
    let collection = db
        .add_collection("bench", DIMENSION, DistanceMetric::Euclidean)
        .unwrap();
    let mut rng = StdRng::seed_from_u64(2);
    for i in 0..5000 {
        collection
            .insert(NewPoint::new(format!("v{i}"), random_vector(&mut rng)))
            .unwrap();
    }
    let queries: Vec<Vec<f64>> = (0..32).map(|_| random_vector(&mut rng)).collect();

    let mut group = c.benchmark_group("search_5000_vectors_16d");
    for pruning_factor in [0.1, f64::INFINITY] {
        let params = SearchParams::default()
            .with_k(10)
            .with_pruning_factor(pruning_factor);
        group.bench_with_input(
            BenchmarkId::new("pruning", pruning_factor),
            &params,
            |b, params| {
                let mut next = 0;
                b.iter(|| {
                    let query = &queries[next % queries.len()];
                    next += 1;
                    black_box(collection.search(black_box(query), params).unwrap());
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_insert, bench_search);
criterion_main!(benches);
