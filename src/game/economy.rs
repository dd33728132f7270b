//! Economy Engine
//!
//! Pure functions from (owned upgrades, achievements, prestige state,
//! active boosts) to costs and yields. Nothing here reads elapsed time or
//! click counts.

use serde::{Serialize, Deserialize};

use crate::game::achievements::achievement_bonus;
use crate::game::catalog::{Catalog, UpgradeCategory, UpgradeDefinition, UpgradeEffect};
use crate::game::events::{ActiveBoost, BoostScope};
use crate::game::rules::GameRules;
use crate::game::state::ProgressionState;

/// Derived yields of a session.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Yields {
    /// Currency per click.
    pub per_click: u64,
    /// Currency per second.
    pub per_second: f64,
}

/// Price of the next unit when `owned` are already held.
///
/// Non-prestige upgrades cost `floor(base x growth^owned)`; prestige
/// upgrades cost a flat `base` in prestige currency.
pub fn upgrade_cost(def: &UpgradeDefinition, owned: u32, rules: &GameRules) -> u64 {
    if def.is_prestige() {
        return def.base_cost;
    }
    // `as` saturates, so absurd counts price at u64::MAX instead of wrapping
    (def.base_cost as f64 * rules.cost_growth.powi(owned as i32)).floor() as u64
}

/// Sum of every historical purchase price for `owned` units.
pub fn cumulative_cost(def: &UpgradeDefinition, owned: u32, rules: &GameRules) -> f64 {
    (0..owned).map(|n| upgrade_cost(def, n, rules) as f64).sum()
}

/// Global multiplier.
///
/// Additive terms are summed first (`1 + prestige bonus + achievement
/// bonuses`), then each multiplicative term is applied in turn (prestige
/// multiplier upgrades in catalog order, then global boosts).
pub fn global_multiplier(
    state: &ProgressionState,
    catalog: &Catalog,
    boosts: &[ActiveBoost],
    rules: &GameRules,
) -> f64 {
    let mut multiplier = 1.0
        + state.prestige_currency as f64 * rules.prestige_bonus_per_unit
        + achievement_bonus(state);

    for def in catalog.upgrades.iter().filter(|d| d.effect == UpgradeEffect::GlobalMultiplier) {
        let owned = state.owned(&def.id);
        if owned > 0 {
            multiplier *= (def.magnitude as f64).powi(owned as i32);
        }
    }

    for boost in boosts.iter().filter(|b| b.scope == BoostScope::Global) {
        multiplier *= boost.multiplier;
    }

    multiplier
}

/// Per-click yield.
pub fn per_click_yield(
    state: &ProgressionState,
    catalog: &Catalog,
    boosts: &[ActiveBoost],
    rules: &GameRules,
) -> u64 {
    let mut total: u64 = 1;

    for def in catalog.upgrades.iter().filter(|d| d.category == UpgradeCategory::Click) {
        total = total.saturating_add(def.magnitude.saturating_mul(state.owned(&def.id) as u64));
    }

    let auto_owned: u64 = catalog
        .upgrades
        .iter()
        .filter(|d| d.category == UpgradeCategory::Auto)
        .map(|d| state.owned(&d.id) as u64)
        .sum();

    for def in &catalog.upgrades {
        if let UpgradeEffect::ClickSynergy { rate } = def.effect {
            if state.owned(&def.id) > 0 {
                total = total.saturating_add((auto_owned as f64 * rate * total as f64).floor() as u64);
            }
        }
    }

    (total as f64 * global_multiplier(state, catalog, boosts, rules)).floor() as u64
}

/// Per-second yield. Depends on the per-click yield for auto-clickers.
pub fn per_second_yield(
    state: &ProgressionState,
    catalog: &Catalog,
    boosts: &[ActiveBoost],
    rules: &GameRules,
) -> f64 {
    let mut total = 0.0;

    for def in catalog.upgrades.iter().filter(|d| d.category == UpgradeCategory::Auto) {
        total += def.magnitude as f64 * state.owned(&def.id) as f64;
    }

    for def in catalog.upgrades.iter().filter(|d| d.effect == UpgradeEffect::AutoClicker) {
        let owned = state.owned(&def.id) as u64;
        if owned > 0 {
            let per_click = per_click_yield(state, catalog, boosts, rules);
            total += (per_click.saturating_mul(owned) / 10) as f64;
        }
    }

    for def in catalog.upgrades.iter().filter(|d| d.effect == UpgradeEffect::AutoMultiplier) {
        let owned = state.owned(&def.id);
        if owned > 0 {
            total *= (def.magnitude as f64).powi(owned as i32);
        }
    }

    total * global_multiplier(state, catalog, boosts, rules)
}

/// Compute both yields. Per-click first, per-second depends on it.
pub fn compute_yields(
    state: &ProgressionState,
    catalog: &Catalog,
    boosts: &[ActiveBoost],
    rules: &GameRules,
) -> Yields {
    let per_click = per_click_yield(state, catalog, boosts, rules);
    let per_second = per_second_yield(state, catalog, boosts, rules);
    Yields { per_click, per_second }
}

/// Recompute and store the cached yields.
pub fn refresh_yields(
    state: &mut ProgressionState,
    catalog: &Catalog,
    boosts: &[ActiveBoost],
    rules: &GameRules,
) -> Yields {
    let yields = compute_yields(state, catalog, boosts, rules);
    state.per_click = yields.per_click;
    state.per_second = yields.per_second;
    yields
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::game::events::{ActiveEvent, EventKind};
    use crate::game::state::SessionId;

    fn setup() -> (ProgressionState, Catalog, GameRules) {
        let catalog = Catalog::standard();
        let state = ProgressionState::new(SessionId::from("test"), Utc::now(), &catalog);
        (state, catalog, GameRules::default())
    }

    fn set_owned(state: &mut ProgressionState, id: &str, owned: u32) {
        state.upgrades.get_mut(id).unwrap().owned = owned;
    }

    #[test]
    fn test_cost_curve() {
        let (_, catalog, rules) = setup();
        let fingers = catalog.upgrade("click_1").unwrap();

        assert_eq!(upgrade_cost(fingers, 0, &rules), 10);
        assert_eq!(upgrade_cost(fingers, 1, &rules), 11); // 11.5
        assert_eq!(upgrade_cost(fingers, 2, &rules), 13); // 13.225
        assert_eq!(upgrade_cost(fingers, 10, &rules), 40); // 40.455...
    }

    #[test]
    fn test_prestige_cost_is_flat() {
        let (_, catalog, rules) = setup();
        let blessing = catalog.upgrade("prestige_1").unwrap();

        for owned in [0, 1, 5, 50] {
            assert_eq!(upgrade_cost(blessing, owned, &rules), 10);
        }
    }

    #[test]
    fn test_cumulative_cost() {
        let (_, catalog, rules) = setup();
        let fingers = catalog.upgrade("click_1").unwrap();

        assert_eq!(cumulative_cost(fingers, 0, &rules), 0.0);
        assert_eq!(cumulative_cost(fingers, 3, &rules), 10.0 + 11.0 + 13.0);
    }

    #[test]
    fn test_base_yields() {
        let (state, catalog, rules) = setup();
        let yields = compute_yields(&state, &catalog, &[], &rules);

        assert_eq!(yields.per_click, 1);
        assert_eq!(yields.per_second, 0.0);
        assert_eq!(global_multiplier(&state, &catalog, &[], &rules), 1.0);
    }

    #[test]
    fn test_linear_upgrades() {
        let (mut state, catalog, rules) = setup();
        set_owned(&mut state, "click_1", 3);
        set_owned(&mut state, "click_2", 2);
        set_owned(&mut state, "auto_1", 4);
        set_owned(&mut state, "auto_2", 1);

        let yields = compute_yields(&state, &catalog, &[], &rules);
        assert_eq!(yields.per_click, 1 + 3 + 10);
        assert_eq!(yields.per_second, 4.0 + 5.0);
    }

    #[test]
    fn test_multiplier_sums_then_multiplies() {
        let (mut state, catalog, rules) = setup();
        state.prestige_currency = 10; // +0.10
        state.achievements[0].unlocked = true; // +0.01
        set_owned(&mut state, "prestige_1", 2); // x25

        let boost = ActiveEvent::boost("b".into(), state.session_id.clone(), 2.0, 60, Utc::now());
        let multiplier = global_multiplier(&state, &catalog, &[boost], &rules);

        let expected = (1.0 + 0.10 + 0.01) * 25.0 * 2.0;
        assert!((multiplier - expected).abs() < 1e-9, "{}", multiplier);
    }

    #[test]
    fn test_non_global_events_ignored_by_multiplier() {
        let (state, catalog, rules) = setup();
        let rain = ActiveEvent::new("r".into(), EventKind::Rain, state.session_id.clone(), Utc::now());
        assert_eq!(global_multiplier(&state, &catalog, &[rain], &rules), 1.0);
    }

    #[test]
    fn test_click_synergy() {
        let (mut state, catalog, rules) = setup();
        set_owned(&mut state, "click_3", 1); // 1 + 10 = 11
        set_owned(&mut state, "auto_1", 5);
        set_owned(&mut state, "auto_2", 5);
        set_owned(&mut state, "synergy_2", 1);

        // 11 + floor(10 * 0.1 * 11) = 22
        assert_eq!(per_click_yield(&state, &catalog, &[], &rules), 22);
    }

    #[test]
    fn test_auto_clicker_uses_per_click() {
        let (mut state, catalog, rules) = setup();
        set_owned(&mut state, "click_3", 3); // per click 31
        set_owned(&mut state, "synergy_1", 4);

        // floor(31 * 4 / 10) = 12
        assert_eq!(per_second_yield(&state, &catalog, &[], &rules), 12.0);
    }

    #[test]
    fn test_auto_multiplier() {
        let (mut state, catalog, rules) = setup();
        set_owned(&mut state, "auto_2", 2); // 10/s
        set_owned(&mut state, "prestige_2", 3); // x8

        assert_eq!(per_second_yield(&state, &catalog, &[], &rules), 80.0);
    }

    #[test]
    fn test_global_multiplier_floors_click() {
        let (mut state, catalog, rules) = setup();
        set_owned(&mut state, "click_1", 2); // 3 per click
        state.prestige_currency = 50; // x1.5

        assert_eq!(per_click_yield(&state, &catalog, &[], &rules), 4); // floor(4.5)
        set_owned(&mut state, "auto_1", 3);
        assert!((per_second_yield(&state, &catalog, &[], &rules) - 4.5).abs() < 1e-9);
    }

    #[test]
    fn test_refresh_writes_cache() {
        let (mut state, catalog, rules) = setup();
        set_owned(&mut state, "click_2", 1);
        set_owned(&mut state, "auto_1", 1);

        let yields = refresh_yields(&mut state, &catalog, &[], &rules);
        assert_eq!(state.per_click, yields.per_click);
        assert_eq!(state.per_click, 6);
        assert_eq!(state.per_second, 1.0);
    }
}
