//! Criterion benchmarks for the CR LF line framer.
//!
//! Measures how long `LineFramer::read_frame` takes to reassemble a typical
//! instrument response from chunks of various sizes, and the cost of the
//! escaping decoder on garbage input.
//!
//! Run with:
//! ```bash
//! cargo bench --package bench-core --bench framer_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use bench_core::scpi::decode_escaped;
use bench_core::transport::mock::MockStream;
use bench_core::LineFramer;

// ── Fixtures ──────────────────────────────────────────────────────────────────

const IDN_RESPONSE: &[u8] = b"Siglent Technologies,SPD3303X,SPD3XIDD4R1234,1.01.01.02.05,V3.0\r\n";

fn chunked(message: &[u8], chunk: usize) -> MockStream {
    MockStream::with_chunks(message.chunks(chunk))
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

/// Reassembly cost as a function of the transport's delivery granularity.
fn bench_read_frame(c: &mut Criterion) {
    let framer = LineFramer::new();
    let mut group = c.benchmark_group("read_frame");
    for chunk in [1usize, 8, 64] {
        group.bench_with_input(BenchmarkId::new("chunk", chunk), &chunk, |b, &chunk| {
            b.iter_batched(
                || chunked(IDN_RESPONSE, chunk),
                |mut stream| {
                    framer
                        .read_frame(black_box(&mut stream))
                        .expect("mock never fails")
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

/// Escaping decoder on clean and on noisy input.
fn bench_decode_escaped(c: &mut Criterion) {
    let noisy: Vec<u8> = IDN_RESPONSE
        .iter()
        .enumerate()
        .map(|(i, &b)| if i % 7 == 0 { 0xFF } else { b })
        .collect();

    let mut group = c.benchmark_group("decode_escaped");
    group.bench_function("clean", |b| b.iter(|| decode_escaped(black_box(IDN_RESPONSE))));
    group.bench_function("noisy", |b| b.iter(|| decode_escaped(black_box(&noisy))));
    group.finish();
}

criterion_group!(benches, bench_read_frame, bench_decode_escaped);
criterion_main!(benches);
