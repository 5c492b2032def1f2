//! Criterion benchmarks for telemetry line framing and command parsing.
//!
//! The serial owner thread runs `LineFramer::feed` on every read, so the
//! framer must keep up with a 115200-baud device (roughly 11.5 KB/s) with a
//! wide margin; in practice it should process megabytes per second.
//!
//! Run with:
//! ```bash
//! cargo bench --package rf-telemetry-core --bench framing_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rf_telemetry_core::{encode_command, CommandBatch, LineFramer};

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// Builds `lines` telemetry records, every tenth one malformed.
fn make_stream(lines: usize) -> Vec<u8> {
    let mut out = Vec::new();
    for i in 0..lines {
        if i % 10 == 9 {
            out.extend_from_slice(b"?? garbled radio output ??\n");
        } else {
            out.extend_from_slice(
                format!(
                    "{{\"seq\":{i},\"mbps\":12.3,\"freq\":915000000,\"rssi\":-71,\"snr\":9.5}}\n"
                )
                .as_bytes(),
            );
        }
    }
    out
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_feed_chunked(c: &mut Criterion) {
    let stream = make_stream(1_000);
    let mut group = c.benchmark_group("framer_feed");
    group.throughput(Throughput::Bytes(stream.len() as u64));

    // Typical serial read sizes.
    for chunk in [32usize, 256, 1024] {
        group.bench_with_input(BenchmarkId::from_parameter(chunk), &chunk, |b, &chunk| {
            b.iter(|| {
                let mut framer = LineFramer::new();
                let mut accepted = 0usize;
                for piece in stream.chunks(chunk) {
                    accepted += framer
                        .feed(black_box(piece))
                        .iter()
                        .filter(|r| r.is_ok())
                        .count();
                }
                accepted
            });
        });
    }
    group.finish();
}

fn bench_command_parse(c: &mut Criterion) {
    let json = r#"{"cmds": ["AT+ID?", "AT+FREQ=915000000", "AT+PWR=20", 42, ""]}"#;
    c.bench_function("command_batch_parse", |b| {
        b.iter(|| CommandBatch::parse(black_box(json)))
    });
}

fn bench_command_encode(c: &mut Criterion) {
    c.bench_function("encode_command", |b| {
        b.iter(|| encode_command(black_box("AT+FREQ=915000000")))
    });
}

criterion_group!(
    benches,
    bench_feed_chunked,
    bench_command_parse,
    bench_command_encode
);
criterion_main!(benches);
