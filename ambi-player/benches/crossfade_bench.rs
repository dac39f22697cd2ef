//! Seam blending and chunk ingestion benchmark
//!
//! Measures the per-unit cost of the equal-power seam blend, WAV wrapping, and
//! cutting units out of the inbound stream.
//!
//! **Goal:** Cutting a 4 s unit should cost well under a millisecond

use ambi_common::AudioFormat;
use ambi_player::audio::{crossfade, wav};
use ambi_player::playback::ChunkBuffer;
use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

/// Deterministic non-silent PCM
fn pcm(len: usize) -> Vec<u8> {
    (0..len / 2)
        .flat_map(|i| (((i * 37) % 20_000) as i16 - 10_000).to_le_bytes())
        .collect()
}

fn bench_seam_blend(c: &mut Criterion) {
    let format = AudioFormat::PCM16_STEREO_48K;
    let mut group = c.benchmark_group("seam_blend");

    for ms in [10u64, 50, 200] {
        let len = format.ms_to_bytes(ms);
        let tail = pcm(len);
        let head = pcm(len);
        group.throughput(Throughput::Bytes(len as u64));
        group.bench_function(format!("blend_{}ms", ms), |b| {
            b.iter(|| black_box(crossfade::blend(black_box(&tail), black_box(&head))));
        });
    }
    group.finish();
}

fn bench_wrap(c: &mut Criterion) {
    let payload = pcm(768_000);
    c.bench_function("wav_wrap_4s", |b| {
        b.iter(|| black_box(wav::wrap(black_box(&payload))));
    });
}

fn bench_chunk_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_ingest");
    let chunk = pcm(96_000);
    group.throughput(Throughput::Bytes(768_000));

    // Eight 0.5 s chunks make one default-size unit
    group.bench_function("cut_unit_from_8_chunks", |b| {
        let mut buffer = ChunkBuffer::default();
        b.iter(|| {
            let mut produced = None;
            for _ in 0..8 {
                if let Some(unit) = buffer.ingest(chunk.clone(), Utc::now()) {
                    produced = Some(unit);
                }
            }
            black_box(produced)
        });
    });
    group.finish();
}

criterion_group!(benches, bench_seam_blend, bench_wrap, bench_chunk_ingest);
criterion_main!(benches);
