//! Progression State Machine
//!
//! Transitions of a single session's [`ProgressionState`]. Each transition
//! takes the current state by reference and returns the next state plus an
//! outcome, or an error with the input left untouched.
//!
//! ```text
//!   new ──sync──▶ sync ──purchase──▶ ... ──prestige──▶ (counters zeroed,
//!    ▲                                                  prestige upgrades kept)
//!    └────────────────────── reset ◀────────────────── any state
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::rng::DeterministicRng;
use crate::game::achievements::check_achievements;
use crate::game::anticheat::{clamp_clicks, ClickClamp};
use crate::game::catalog::Catalog;
use crate::game::economy::{compute_yields, refresh_yields, upgrade_cost};
use crate::game::events::{idle_multiplier, roll_event, ActiveEvent, EventKind};
use crate::game::rules::GameRules;
use crate::game::state::{default_upgrades, seconds_between, OwnedUpgrade, ProgressionState};

/// Which balance pays for an upgrade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Regular currency.
    Regular,
    /// Prestige currency.
    Prestige,
}

/// Transition errors. All are recoverable and leave the state unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProgressionError {
    /// Upgrade id not in the catalog.
    #[error("Unknown upgrade: {0}")]
    UnknownUpgrade(String),

    /// Prestige-tier gate not met.
    #[error("Upgrade {id} requires {required} prestige(s)")]
    LockedUpgrade {
        /// Upgrade id.
        id: String,
        /// Prestige count required.
        required: u32,
    },

    /// Balance below cost.
    #[error("Need {cost} {currency:?}, have {balance}")]
    InsufficientFunds {
        /// Price of the next unit.
        cost: u64,
        /// Balance at the time of purchase.
        balance: f64,
        /// Balance that was checked.
        currency: Currency,
    },

    /// Lifetime earnings below the prestige threshold.
    #[error("Need {required} lifetime currency to prestige, have {lifetime}")]
    ThresholdNotMet {
        /// Lifetime earned this run.
        lifetime: f64,
        /// Threshold.
        required: f64,
    },

    /// Event id unknown, expired or owned by another session.
    #[error("Unknown or expired event: {0}")]
    UnknownEvent(String),

    /// Event exists but has no click reward.
    #[error("Event not clickable: {0}")]
    NotClickable(String),

    /// Player name empty after trimming.
    #[error("Name cannot be empty")]
    EmptyName,
}

/// Next state plus what happened.
#[derive(Debug, Clone)]
pub struct Transition<T> {
    /// State after the transition.
    pub state: ProgressionState,
    /// Outcome details.
    pub outcome: T,
}

// =============================================================================
// SYNC
// =============================================================================

/// Result of a sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOutcome {
    /// Seconds since the previous sync.
    pub elapsed_secs: f64,
    /// Click clamping details.
    pub clicks: ClickClamp,
    /// Currency from clicks.
    pub click_earnings: f64,
    /// Currency from idle production.
    pub idle_earnings: f64,
    /// Achievements unlocked by this sync.
    pub unlocked: Vec<String>,
    /// Event spawned by this sync's roll.
    pub spawned_event: Option<ActiveEvent>,
}

/// Credit clicks and idle production since the last sync.
///
/// `events` are the session's live events at `now`; `rng` is used only if
/// an event roll is due.
pub fn sync(
    state: &ProgressionState,
    pending_clicks: u64,
    now: DateTime<Utc>,
    events: &[ActiveEvent],
    rng: &mut DeterministicRng,
    catalog: &Catalog,
    rules: &GameRules,
) -> Transition<SyncOutcome> {
    let mut next = state.clone();
    let elapsed_secs = seconds_between(state.last_sync, now);

    // Earn at the yields in force before this sync's unlocks
    let yields = compute_yields(state, catalog, events, rules);
    let clicks = clamp_clicks(pending_clicks, elapsed_secs, rules);
    let click_earnings = clicks.accepted as f64 * yields.per_click as f64;
    let idle_earnings =
        yields.per_second * elapsed_secs.min(rules.offline_cap_secs) * idle_multiplier(events);

    next.credit(click_earnings + idle_earnings);
    next.total_clicks += clicks.accepted;
    next.all_time_clicks += clicks.accepted;
    if now > next.last_sync {
        next.last_sync = now;
    }

    let unlocked = check_achievements(&mut next, now);
    refresh_yields(&mut next, catalog, events, rules);

    let mut spawned_event = None;
    if now - next.last_event_check > Duration::seconds(rules.event_check_interval_secs) {
        spawned_event = roll_event(&next.session_id, now, rng, rules);
        next.last_event_check = now;
    }

    Transition {
        state: next,
        outcome: SyncOutcome {
            elapsed_secs,
            clicks,
            click_earnings,
            idle_earnings,
            unlocked,
            spawned_event,
        },
    }
}

// =============================================================================
// PURCHASE
// =============================================================================

/// Result of a purchase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOutcome {
    /// Upgrade bought.
    pub upgrade_id: String,
    /// Price paid.
    pub cost: u64,
    /// Balance debited.
    pub currency: Currency,
    /// Owned count after the purchase.
    pub owned: u32,
}

/// Buy one unit of `upgrade_id`.
pub fn purchase(
    state: &ProgressionState,
    upgrade_id: &str,
    events: &[ActiveEvent],
    catalog: &Catalog,
    rules: &GameRules,
) -> Result<Transition<PurchaseOutcome>, ProgressionError> {
    let def = catalog
        .upgrade(upgrade_id)
        .ok_or_else(|| ProgressionError::UnknownUpgrade(upgrade_id.to_string()))?;

    if let Some(req) = def.unlock {
        if state.prestige_count < req.min_prestige_count {
            return Err(ProgressionError::LockedUpgrade {
                id: def.id.clone(),
                required: req.min_prestige_count,
            });
        }
    }

    let owned = state.owned(&def.id);
    let cost = upgrade_cost(def, owned, rules);
    let mut next = state.clone();

    let currency = if def.is_prestige() {
        if next.prestige_currency < cost {
            return Err(ProgressionError::InsufficientFunds {
                cost,
                balance: next.prestige_currency as f64,
                currency: Currency::Prestige,
            });
        }
        next.prestige_currency -= cost;
        Currency::Prestige
    } else {
        if next.currency < cost as f64 {
            return Err(ProgressionError::InsufficientFunds {
                cost,
                balance: next.currency,
                currency: Currency::Regular,
            });
        }
        next.currency -= cost as f64;
        Currency::Regular
    };

    let entry = next
        .upgrades
        .entry(def.id.clone())
        .or_insert_with(|| OwnedUpgrade { id: def.id.clone(), owned: 0 });
    entry.owned += 1;
    let owned = entry.owned;

    refresh_yields(&mut next, catalog, events, rules);

    Ok(Transition {
        state: next,
        outcome: PurchaseOutcome {
            upgrade_id: def.id.clone(),
            cost,
            currency,
            owned,
        },
    })
}

// =============================================================================
// PRESTIGE
// =============================================================================

/// Result of a prestige.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrestigeOutcome {
    /// Prestige currency awarded.
    pub prestige_gained: u64,
    /// Prestige count after.
    pub prestige_count: u32,
    /// Achievements unlocked by the prestige.
    pub unlocked: Vec<String>,
}

/// Trade this run's lifetime earnings for prestige currency.
///
/// Zeroes currency, clicks and run lifetime; non-prestige upgrades return
/// to catalog defaults while prestige upgrades, achievements, name and
/// cosmetics carry over.
pub fn prestige(
    state: &ProgressionState,
    now: DateTime<Utc>,
    events: &[ActiveEvent],
    catalog: &Catalog,
    rules: &GameRules,
) -> Result<Transition<PrestigeOutcome>, ProgressionError> {
    if state.lifetime_earned < rules.prestige_threshold {
        return Err(ProgressionError::ThresholdNotMet {
            lifetime: state.lifetime_earned,
            required: rules.prestige_threshold,
        });
    }

    let prestige_gained = (state.lifetime_earned / rules.prestige_divisor).floor() as u64;
    let mut next = state.clone();

    next.currency = 0.0;
    next.lifetime_earned = 0.0;
    next.total_clicks = 0;
    next.per_click = 1;
    next.per_second = 0.0;
    next.prestige_currency += prestige_gained;
    next.prestige_count += 1;
    next.last_sync = now;

    let mut upgrades = default_upgrades(catalog);
    for def in catalog.upgrades.iter().filter(|d| d.is_prestige()) {
        if let Some(kept) = state.upgrades.get(&def.id) {
            upgrades.insert(def.id.clone(), kept.clone());
        }
    }
    next.upgrades = upgrades;

    let unlocked = check_achievements(&mut next, now);
    refresh_yields(&mut next, catalog, events, rules);

    let prestige_count = next.prestige_count;
    Ok(Transition {
        state: next,
        outcome: PrestigeOutcome { prestige_gained, prestige_count, unlocked },
    })
}

// =============================================================================
// RESET / RENAME / EVENT REWARD
// =============================================================================

/// Hard wipe back to a fresh session.
///
/// Keeps identity (id, creation time), player name and cosmetics. Prestige
/// progress is not preserved.
pub fn reset(state: &ProgressionState, now: DateTime<Utc>, catalog: &Catalog) -> Transition<()> {
    let mut next = ProgressionState::new(state.session_id.clone(), now, catalog);
    next.created_at = state.created_at;
    next.player_name = state.player_name.clone();
    next.cosmetics = state.cosmetics.clone();
    Transition { state: next, outcome: () }
}

/// Set the leaderboard name: trimmed, truncated to `rules.max_name_len`.
pub fn rename(
    state: &ProgressionState,
    name: &str,
    rules: &GameRules,
) -> Result<Transition<String>, ProgressionError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ProgressionError::EmptyName);
    }
    let name: String = trimmed.chars().take(rules.max_name_len).collect();

    let mut next = state.clone();
    next.player_name = name.clone();
    Ok(Transition { state: next, outcome: name })
}

/// Credit the reward of a claimed clickable event.
///
/// Golden: `max(floor(currency x fraction), min)`.
pub fn claim_event_reward(
    state: &ProgressionState,
    event: &ActiveEvent,
    now: DateTime<Utc>,
    events: &[ActiveEvent],
    catalog: &Catalog,
    rules: &GameRules,
) -> Result<Transition<u64>, ProgressionError> {
    if event.kind != EventKind::Golden {
        return Err(ProgressionError::NotClickable(event.id.clone()));
    }

    let reward = ((state.currency * rules.golden_reward_fraction).floor() as u64)
        .max(rules.golden_reward_min);

    let mut next = state.clone();
    next.credit(reward as f64);
    check_achievements(&mut next, now);
    refresh_yields(&mut next, catalog, events, rules);

    Ok(Transition { state: next, outcome: reward })
}
