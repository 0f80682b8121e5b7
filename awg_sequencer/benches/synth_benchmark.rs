//! Waveform synthesis micro-benchmark.
//!
//! Measures the cost of the three segment actions at full sample rate:
//! - 20-trap static granule (the common hold segment)
//! - 10-tone 100 us move
//! - 10-tone 100 us ramp with calibration
//! - static tone count scaling

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;

use awg_sequencer::config::AodConfig;
use awg_sequencer::synth::{
    Action, Calibration, MoveParams, RampParams, StaticParams, SynthContext, ToneSpec, synthesize,
};

const RATE_HZ: u64 = 625_000_000;

fn context<'a>(aod: &'a AodConfig, calibration: &'a Calibration) -> SynthContext<'a> {
    SynthContext {
        sample_rate_hz: RATE_HZ,
        channels: 1,
        max_output_mv: 282,
        aod,
        calibration,
    }
}

fn bench_static(c: &mut Criterion) {
    let aod = AodConfig::default();
    let calibration = Calibration::default();
    let ctx = context(&aod, &calibration);
    let action = Action::Static(StaticParams::comb(130.0, 20, 0.329 * 4.0, 200.0));

    c.bench_function("static_20_traps_granule", |b| {
        b.iter(|| synthesize(black_box(&action), 0.002, &ctx))
    });
}

fn bench_move(c: &mut Criterion) {
    let aod = AodConfig::default();
    let calibration = Calibration::default();
    let ctx = context(&aod, &calibration);
    let starts: Vec<f64> = (0..10).map(|k| 130.0 + 5.0 * k as f64).collect();
    let ends: Vec<f64> = starts.iter().map(|f| f + 2.5).collect();
    let action = Action::Move(MoveParams::between(starts, ends, 0.3, 200.0));

    c.bench_function("move_10_tones_100us", |b| {
        b.iter(|| synthesize(black_box(&action), 0.1, &ctx))
    });
}

fn bench_ramp_calibrated(c: &mut Criterion) {
    let aod = AodConfig::default();
    let calibration = Calibration::new(vec![[120.0, 0.62], [170.0, 1.0], [225.0, 0.58]]);
    let ctx = context(&aod, &calibration);
    let action = Action::Ramp(RampParams {
        tones: ToneSpec::Comb {
            start_mhz: 130.0,
            count: 10,
            spacing_um: 0.329 * 5.0,
        },
        total_amp_mv: 200.0,
        start_amps: vec![1.0; 10],
        end_amps: vec![0.0; 10],
        phases_deg: vec![0.0; 10],
        freq_adjust: true,
        amp_adjust: true,
    });

    c.bench_function("ramp_10_tones_100us_calibrated", |b| {
        b.iter(|| synthesize(black_box(&action), 0.1, &ctx))
    });
}

fn bench_tone_scaling(c: &mut Criterion) {
    let aod = AodConfig::default();
    let calibration = Calibration::default();
    let ctx = context(&aod, &calibration);
    let mut group = c.benchmark_group("static_tone_count");
    for traps in [1usize, 8, 32] {
        let action = Action::Static(StaticParams::comb(125.0, traps, 0.329 * 3.0, 200.0));
        group.bench_with_input(BenchmarkId::from_parameter(traps), &action, |b, action| {
            b.iter(|| synthesize(black_box(action), 0.02, &ctx))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_static,
    bench_move,
    bench_ramp_calibrated,
    bench_tone_scaling,
);
criterion_main!(benches);
