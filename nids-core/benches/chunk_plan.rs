//! Splitter and session bookkeeping benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nids_core::*;

fn benchmark_split(c: &mut Criterion) {
    let mut group = c.benchmark_group("split");

    for chunks in &[1u64, 16, 256, 4096] {
        let file_size = chunks * 1024 * 1024 - 1;
        group.bench_with_input(BenchmarkId::from_parameter(chunks), &file_size, |b, &size| {
            b.iter(|| split(black_box(size), black_box(1024 * 1024)).unwrap());
        });
    }
    group.finish();
}

fn benchmark_session_completion(c: &mut Criterion) {
    let filename = Filename::new("bench.pcap").unwrap();

    c.bench_function("session_complete_4096_chunks", |b| {
        b.iter(|| {
            let plan = ChunkPlan::new(filename.clone(), 4096 * 1024, 1024).unwrap();
            let mut session = UploadSession::new(plan);
            for index in (0..4096).rev() {
                black_box(session.record_delivered(index).unwrap());
            }
        });
    });
}

criterion_group!(benches, benchmark_split, benchmark_session_completion);
criterion_main!(benches);
