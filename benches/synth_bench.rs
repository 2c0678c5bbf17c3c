//! Benchmarks for the synth core.
//!
//! Run with: cargo bench
//!
//! Reference timing at 44.1kHz:
//!   - 256 samples  = 5.80ms deadline
//!   - 1024 samples = 23.2ms deadline
//!
//! Benchmark groups:
//!   - synth/render   Voice chains of increasing weight, 1 to 32 voices
//!   - encode/*       Patch encoding and score compaction

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sointu::encode::{compact, encode, AllFeatures, NecessaryFeatures};
use sointu::{Instrument, Patch, Score, Synth, Track, Unit, UnitKind};

/// Common buffer sizes used in audio applications.
const BLOCK_SIZES: &[usize] = &[256, 1024];

const VOICE_COUNTS: &[usize] = &[1, 8, 32];

/// A lead-style voice: envelope-gated oscillator through a filter, panned
/// out through a stereo delay.
fn lead(voices: usize) -> Patch {
    Patch(vec![Instrument::new(
        "lead",
        voices,
        vec![
            Unit::new(UnitKind::Envelope),
            Unit::new(UnitKind::Oscillator).with_param("type", 2),
            Unit::new(UnitKind::Mulp),
            Unit::new(UnitKind::Filter).with_param("frequency", 48),
            Unit::new(UnitKind::Pan),
            Unit::new(UnitKind::Delay)
                .with_param("stereo", 1)
                .with_param("notetracking", 0)
                .with_var_args(vec![1116, 1188]),
            Unit::new(UnitKind::Out),
        ],
    )])
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("synth/render");
    for &voices in VOICE_COUNTS {
        for &size in BLOCK_SIZES {
            let mut synth = Synth::new(&lead(voices), 120).expect("bench patch encodes");
            for v in 0..voices {
                synth.trigger(v, 48 + v as u8);
            }
            let mut buffer = vec![[0.0f32; 2]; size];
            let id = BenchmarkId::new(format!("lead x{voices}"), size);
            group.bench_with_input(id, &size, |b, &size| {
                b.iter(|| synth.render(black_box(&mut buffer), size as i32))
            });
        }
    }
    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let patch = lead(8);
    c.bench_function("encode/all_features", |b| {
        b.iter(|| encode(black_box(&patch), &AllFeatures, 120))
    });
    c.bench_function("encode/necessary_features", |b| {
        b.iter(|| {
            let features = NecessaryFeatures::from_patch(black_box(&patch));
            encode(&patch, &features, 120)
        })
    });

    let patterns: Vec<Vec<u8>> = (0..16u8)
        .map(|i| (0..16).map(|r| if r % 4 == 0 { 40 + i + r } else { 1 }).collect())
        .collect();
    let score = Score {
        rows_per_pattern: 16,
        length: 64,
        tracks: (0..4)
            .map(|t| {
                let order = (0..64).map(|p| (p * (t + 1)) % 16).collect();
                Track::new(1, order, patterns.clone())
            })
            .collect(),
    };
    c.bench_function("encode/compact_score", |b| b.iter(|| compact(black_box(&score))));
}

criterion_group!(benches, bench_render, bench_encode);
criterion_main!(benches);
