// Criterion benchmarks for Vibe Match

use chrono::{Duration, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use vibe_match::core::{cosine_similarity, rank_candidates, CosineScorer, MatchingConfig, MatchingEngine};
use vibe_match::models::{Candidate, Embedding, NewCandidate};
use vibe_match::services::InMemoryCandidateStore;

const DIMS: usize = 512;

/// Cheap deterministic pseudo-embedding
fn embedding(seed: usize) -> Embedding {
    Embedding::new(
        (0..DIMS)
            .map(|i| (((seed * 31 + i * 17) % 97) as f32 / 97.0) - 0.5)
            .collect(),
    )
}

fn create_pool(size: usize) -> Vec<Candidate> {
    let now = Utc::now();
    (0..size)
        .map(|i| {
            NewCandidate::new(i.to_string(), embedding(i), now - Duration::seconds((i % 300) as i64))
                .into_candidate()
        })
        .collect()
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a = embedding(1);
    let b = embedding(2);
    c.bench_function("cosine_similarity_512", |bench| {
        bench.iter(|| cosine_similarity(black_box(a.as_slice()), black_box(b.as_slice())))
    });
}

fn bench_rank_candidates(c: &mut Criterion) {
    let mut group = c.benchmark_group("rank_candidates");
    let query = embedding(0);

    for size in [10, 100, 1000].iter() {
        let pool = create_pool(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |bench, _| {
            bench.iter(|| rank_candidates(&CosineScorer, black_box(&query), pool.clone()))
        });
    }

    group.finish();
}

fn bench_engine_submit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("engine_submit");

    for size in [100, 1000].iter() {
        let store = Arc::new(InMemoryCandidateStore::new());
        runtime.block_on(async {
            for candidate in create_pool(*size) {
                store.seed(candidate).await;
            }
        });
        // Nothing in the pool clears this, so every submission scores the full pool
        let config = MatchingConfig {
            threshold: 1.0,
            ..MatchingConfig::default()
        };
        let engine = MatchingEngine::with_store(store, config);

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |bench, _| {
            bench.to_async(&runtime).iter(|| async {
                engine
                    .submit(embedding(7), "bench-user", Utc::now())
                    .await
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_cosine_similarity,
    bench_rank_candidates,
    bench_engine_submit,
);
criterion_main!(benches);
