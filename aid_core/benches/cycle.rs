use std::sync::Arc;

use aid_core::mocks::inputs_at;
use aid_core::{GateRequest, HypoVerdict, LoopCfg, LoopController, LoopState, SafetyDecision};
use aid_core::{DoseCapper, mocks::context_at};
use aid_traits::ManualClock;
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

const NOW: i64 = 1_700_000_000_000;

fn configure(g: &mut criterion::BenchmarkGroup<'_, criterion::measurement::WallTime>) {
    //   BENCH_SAMPLE_SIZE=10 BENCH_MEAS_MS=50 cargo bench -p aid_core --bench cycle
    if let Ok(ss) = std::env::var("BENCH_SAMPLE_SIZE") {
        if let Ok(n) = ss.parse::<usize>() {
            g.sample_size(n.max(1));
        }
    } else {
        g.sample_size(50);
    }
    if let Ok(ms) = std::env::var("BENCH_MEAS_MS")
        && let Ok(ms_u64) = ms.parse::<u64>()
    {
        g.measurement_time(std::time::Duration::from_millis(ms_u64));
    }
}

pub fn bench_decide(c: &mut Criterion) {
    let mut g = c.benchmark_group("decide");
    configure(&mut g);

    let clock = ManualClock::new(NOW);
    let controller = LoopController::builder()
        .with_config(LoopCfg::default())
        .with_clock(Arc::new(clock))
        .build()
        .expect("default config builds");
    let state = LoopState::default();

    for &(label, bg, delta) in &[("halt", 60.0, -3.0), ("fallback", 200.0, 0.0), ("autodrive", 180.0, 6.0)] {
        let inputs = inputs_at(NOW, bg, delta);
        g.bench_function(label, |b| {
            b.iter(|| {
                let d = controller.decide(black_box(&inputs), NOW, &state);
                black_box(d.directive.bolus_units);
            })
        });
    }
    g.finish();
}

pub fn bench_gate(c: &mut Criterion) {
    let mut g = c.benchmark_group("dose_gate");
    configure(&mut g);

    let capper = DoseCapper::default();
    let ctx = context_at(150.0, 0.0);
    let safety = SafetyDecision::neutral();
    g.bench_function("automated", |b| {
        b.iter_batched(
            || GateRequest::automated(0.8),
            |req| {
                let (u, audit) = capper.gate(req, black_box(&ctx), &HypoVerdict::Clear, &safety);
                black_box((u, audit));
            },
            BatchSize::SmallInput,
        )
    });
    g.finish();
}

criterion_group!(cycle, bench_decide, bench_gate);
criterion_main!(cycle);
