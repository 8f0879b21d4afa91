//! Criterion benchmarks for midibridge_core translators
//!
//! Run with: cargo bench -p midibridge_core
//!
//! Each iteration processes one 512-sample block, with the host batch
//! delivered at the block start.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use midibridge_core::midi::{InboundConfig, InboundTranslator, OutboundInputs, OutboundTranslator, PolyMode};
use midibridge_core::{BlockInput, PolyVoltage, ProcessArgs, TimestampedMessage};

const BLOCK: u32 = 512;

/// A dense block: chords on and off plus wheel movement.
fn busy_batch(events: u32) -> Vec<TimestampedMessage> {
    (0..events)
        .map(|i| {
            let frame = i * BLOCK / events.max(1);
            let note = 36 + (i % 48) as u8;
            match i % 4 {
                0 | 1 => TimestampedMessage::note_on(frame, 0, note, 100),
                2 => TimestampedMessage::pitch_wheel(frame, 0, (i * 97 % 0x3fff) as u16),
                _ => TimestampedMessage::note_off(frame, 0, note.saturating_sub(1), 0),
            }
        })
        .collect()
}

fn bench_inbound(c: &mut Criterion) {
    let args = ProcessArgs::default();
    let mut group = c.benchmark_group("inbound");
    group.throughput(Throughput::Elements(BLOCK as u64));

    for events in [0u32, 16, 128] {
        for mode in [PolyMode::Rotate, PolyMode::Reuse, PolyMode::Mpe] {
            let batch = busy_batch(events);
            let mut translator = InboundTranslator::new(InboundConfig {
                channels: 16,
                poly_mode: mode,
                ..InboundConfig::default()
            });
            let mut generation = 0u64;
            group.bench_with_input(
                BenchmarkId::new(format!("{mode:?}"), events),
                &batch,
                |b, batch| {
                    b.iter(|| {
                        generation += 1;
                        for _ in 0..BLOCK {
                            translator.process_block(&args, BlockInput::new(generation, batch));
                            black_box(translator.outputs().pitch.get(0));
                        }
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_outbound(c: &mut Criterion) {
    let mut group = c.benchmark_group("outbound");
    group.throughput(Throughput::Elements(BLOCK as u64));

    for channels in [1usize, 8, 16] {
        let pitches: Vec<f32> = (0..channels).map(|c| c as f32 / 12.0).collect();
        let pitch = PolyVoltage::poly(&pitches);
        let gate_on = PolyVoltage::poly(&vec![10.0; channels]);
        let gate_off = PolyVoltage::poly(&vec![0.0; channels]);
        let mut sink = Vec::with_capacity(4096);
        let mut translator = OutboundTranslator::default();
        let mut generation = 0u64;
        group.bench_function(BenchmarkId::new("gate_toggle", channels), |b| {
            b.iter(|| {
                generation += 1;
                sink.clear();
                for frame in 0..BLOCK {
                    let gate = if frame % 64 < 32 { gate_on } else { gate_off };
                    let inputs = OutboundInputs {
                        pitch,
                        gate,
                        mod_wheel: PolyVoltage::mono(frame as f32 / BLOCK as f32 * 10.0),
                        ..OutboundInputs::default()
                    };
                    translator.process(generation, &inputs, &mut sink);
                }
                black_box(sink.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_inbound, bench_outbound);
criterion_main!(benches);
