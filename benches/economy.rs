//! Yield and transition benchmarks

use chrono::{Duration, TimeZone, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use idle_economy::core::rng::DeterministicRng;
use idle_economy::game::anticheat::assess_lifetime;
use idle_economy::game::economy::compute_yields;
use idle_economy::game::progression::sync;
use idle_economy::{Catalog, GameRules, ProgressionState, SessionId};

fn late_game_state(catalog: &Catalog) -> ProgressionState {
    let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let mut state = ProgressionState::new(SessionId::from("session-1700000000-benchbenchbench0"), start, catalog);
    for (i, upgrade) in state.upgrades.values_mut().enumerate() {
        upgrade.owned = (i as u32 % 7) * 5;
    }
    state.prestige_currency = 120;
    state.prestige_count = 3;
    state
}

fn bench_compute_yields(c: &mut Criterion) {
    let catalog = Catalog::standard();
    let rules = GameRules::default();
    let state = late_game_state(&catalog);

    c.bench_function("compute_yields_late_game", |b| {
        b.iter(|| compute_yields(black_box(&state), &catalog, &[], &rules))
    });
}

fn bench_sync(c: &mut Criterion) {
    let catalog = Catalog::standard();
    let rules = GameRules::default();
    let state = late_game_state(&catalog);
    let now = state.last_sync + Duration::seconds(5);
    let mut rng = DeterministicRng::new(1);

    c.bench_function("sync_5s", |b| {
        b.iter(|| sync(black_box(&state), 80, now, &[], &mut rng, &catalog, &rules))
    });
}

fn bench_lifetime_bound(c: &mut Criterion) {
    let catalog = Catalog::standard();
    let rules = GameRules::default();
    let state = late_game_state(&catalog);
    let now = state.created_at + Duration::hours(2);

    c.bench_function("assess_lifetime", |b| {
        b.iter(|| assess_lifetime(black_box(&state), &catalog, &[], &rules, now))
    });
}

criterion_group!(benches, bench_compute_yields, bench_sync, bench_lifetime_bound);
criterion_main!(benches);
