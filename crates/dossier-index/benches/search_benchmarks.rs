//! Benchmarks for lexical, vector, and hybrid retrieval.
//!
//! Uses 1,000 chunks by default so the bench stays quick in CI. Set
//! `BENCH_FULL_SCALE=1` to run against 100,000 chunks:
//!
//! ```bash
//! BENCH_FULL_SCALE=1 cargo bench -p dossier-index
//! ```

use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};

use dossier_core::config::SearchConfig;
use dossier_core::types::SearchMode;
use dossier_index::embedding::{EmbeddingService, HashEmbedding};
use dossier_index::index::HybridIndex;
use dossier_index::search::{SearchEngine, SearchRequest};
use dossier_storage::{ChunkRepository, Database, FileRepository, NewChunk};

/// Number of chunks to index for CI benchmarks.
const CI_CHUNK_COUNT: usize = 1_000;

/// Number of chunks for full-scale benchmarks.
const FULL_SCALE_CHUNK_COUNT: usize = 100_000;

fn chunk_count() -> usize {
    if std::env::var("BENCH_FULL_SCALE").is_ok() {
        FULL_SCALE_CHUNK_COUNT
    } else {
        CI_CHUNK_COUNT
    }
}

/// Realistic resume-style chunk (~70 words), made unique per index so the
/// hash embedder produces distinct vectors.
fn generate_chunk_text(index: usize) -> String {
    format!(
        "Led the migration of a monolithic billing service to event-driven \
         workers, cutting settlement latency by forty percent. Mentored four \
         junior engineers through their first production incidents and owned \
         the on-call rotation for the payments cluster. Built dashboards for \
         throughput, error budgets, and queue depth, and drove the quarterly \
         capacity reviews with the infrastructure team. Applicant reference \
         number {}",
        index
    )
}

/// Build a populated engine plus a handle on its index: one file whose
/// chunks are stored, embedded, and indexed the way the ingest path does it.
fn build_fixture(count: usize) -> (SearchEngine, HybridIndex) {
    let db = Arc::new(Database::in_memory().expect("open database"));
    let files = FileRepository::new(Arc::clone(&db));
    let chunks = Arc::new(ChunkRepository::new(Arc::clone(&db)));
    let index = HybridIndex::new();
    let embedder = HashEmbedding::new();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build tokio runtime");

    let file = files
        .create("bench.txt", "bench-applicant")
        .expect("create file");
    let drafts: Vec<NewChunk> = (0..count)
        .map(|i| {
            let content = generate_chunk_text(i);
            NewChunk {
                token_count: (content.len() as u32).div_ceil(4),
                content,
            }
        })
        .collect();
    let created = chunks
        .insert_many(file.file_id, &drafts)
        .expect("insert chunks");

    for chunk in created {
        let vector = rt.block_on(embedder.embed(&chunk.content)).expect("embed");
        chunks
            .set_embedded(chunk.chunk_id, &vector)
            .expect("store embedding");
        let reloaded = chunks
            .find_by_id(chunk.chunk_id)
            .expect("load chunk")
            .expect("chunk exists");
        index.upsert(&reloaded, "bench-applicant").expect("index chunk");
    }
    assert_eq!(index.len(), count);

    let engine = SearchEngine::new(
        index.clone(),
        chunks,
        Box::new(HashEmbedding::new()),
        SearchConfig::default(),
        Duration::from_secs(5),
    );
    (engine, index)
}

fn bench_lexical_search(c: &mut Criterion) {
    let count = chunk_count();
    let (_engine, index) = build_fixture(count);

    let mut group = c.benchmark_group("lexical_search");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function(format!("bm25_top10_{}chunks", count), |b| {
        b.iter(|| {
            let hits = index
                .lexical_search("billing settlement latency", None, 10)
                .expect("search failed");
            assert!(!hits.is_empty());
            hits
        });
    });

    group.finish();
}

fn bench_vector_search(c: &mut Criterion) {
    let count = chunk_count();
    let (_engine, index) = build_fixture(count);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build tokio runtime");
    let query_vec = rt
        .block_on(HashEmbedding::new().embed("payments capacity review"))
        .expect("embed query");

    let mut group = c.benchmark_group("vector_search");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function(format!("cosine_top10_{}chunks", count), |b| {
        b.iter(|| {
            let hits = index
                .vector_search(&query_vec, None, 10)
                .expect("search failed");
            assert!(!hits.is_empty());
            hits
        });
    });

    group.finish();
}

fn bench_hybrid_search(c: &mut Criterion) {
    let count = chunk_count();
    let (engine, _index) = build_fixture(count);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("build tokio runtime");

    let mut group = c.benchmark_group("hybrid_search");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(10));

    let request = SearchRequest {
        text: "incident dashboards error budgets".to_string(),
        applicant: None,
        top_k: 10,
        mode: SearchMode::Hybrid,
    };
    group.bench_function(format!("fused_top10_{}chunks", count), |b| {
        b.iter(|| {
            let results = rt.block_on(engine.search(&request)).expect("search failed");
            assert!(!results.is_empty());
            results
        });
    });

    let filtered = SearchRequest {
        applicant: Some("bench-applicant".to_string()),
        ..request.clone()
    };
    group.bench_function(format!("filtered_top10_{}chunks", count), |b| {
        b.iter(|| {
            let results = rt.block_on(engine.search(&filtered)).expect("search failed");
            results
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_lexical_search,
    bench_vector_search,
    bench_hybrid_search,
);
criterion_main!(benches);
