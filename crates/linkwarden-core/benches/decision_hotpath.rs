//! Per-tick latency benchmarks for the decision engine (§4.5), the one
//! call on the polling path that runs once per member on every tick.
//!
//! Run with: cargo bench --package linkwarden-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use linkwarden_common::{Class, MemberId, Score};
use linkwarden_core::decision::{Candidate, DecisionEngine};

fn candidate(id: &str, class: Class, weight: u32, finalv: f64) -> Candidate {
    Candidate {
        id: MemberId::from(id),
        class,
        weight,
        score: Score::new(finalv, finalv, finalv),
        is_bad: finalv < 40.0,
        is_good: finalv > 70.0,
        capacity_kbps: None,
    }
}

/// Parks the engine on its best candidate so the benchmarked tick measures
/// steady-state cost, not the one-time bootstrap switch.
fn settled_engine(candidates: &[Candidate]) -> DecisionEngine {
    let mut engine = DecisionEngine::new();
    let best = candidates
        .iter()
        .max_by(|a, b| a.score.finalv().partial_cmp(&b.score.finalv()).unwrap())
        .unwrap();
    engine.commit_switch(0, best.id.clone());
    engine
}

fn bench_tick_no_change(c: &mut Criterion) {
    let candidates = vec![
        candidate("starlink", Class::Satellite, 100, 80.0),
        candidate("lte", Class::Cellular, 100, 60.0),
    ];
    let mut engine = settled_engine(&candidates);

    c.bench_function("decision_tick_2members_no_change", |b| {
        b.iter(|| {
            black_box(engine.tick(60_000, &candidates, 10.0, 5, 5, 10, 0, None));
        });
    });
}

fn bench_tick_margin_building(c: &mut Criterion) {
    let mut candidates = vec![
        candidate("starlink", Class::Satellite, 100, 80.0),
        candidate("lte", Class::Cellular, 100, 60.0),
    ];
    let mut engine = settled_engine(&candidates);
    candidates[0].score = Score::new(20.0, 20.0, 20.0);
    candidates[0].is_bad = true;

    c.bench_function("decision_tick_2members_margin_building", |b| {
        let mut now_ms = 60_000;
        b.iter(|| {
            now_ms += 1_000;
            black_box(engine.tick(now_ms, &candidates, 10.0, 5, 5, 10, 0, None));
        });
    });
}

fn bench_tick_8members_ranked(c: &mut Criterion) {
    let candidates: Vec<Candidate> = (0..8)
        .map(|i| {
            let class = match i % 4 {
                0 => Class::Lan,
                1 => Class::Wifi,
                2 => Class::Cellular,
                _ => Class::Satellite,
            };
            candidate(&format!("member-{i}"), class, 100, 50.0 + i as f64)
        })
        .collect();
    let mut engine = settled_engine(&candidates);

    c.bench_function("decision_tick_8members_ranked", |b| {
        b.iter(|| {
            black_box(engine.tick(60_000, &candidates, 10.0, 5, 5, 10, 0, None));
        });
    });
}

fn bench_tick_predictive_fire(c: &mut Criterion) {
    let candidates = vec![
        candidate("starlink", Class::Satellite, 100, 75.0),
        candidate("lte", Class::Cellular, 100, 70.0),
    ];
    let mut engine = settled_engine(&candidates);

    c.bench_function("decision_tick_predictive_fire", |b| {
        let mut now_ms = 60_000;
        b.iter(|| {
            now_ms += 1_000;
            black_box(engine.tick(now_ms, &candidates, 10.0, 5, 5, 10, 0, Some("starlink")));
        });
    });
}

criterion_group!(
    benches,
    bench_tick_no_change,
    bench_tick_margin_building,
    bench_tick_8members_ranked,
    bench_tick_predictive_fire,
);
criterion_main!(benches);
