//! Tunable game rules.
//!
//! Every constant the economy, the validator and the event engine read lives
//! here, so tests can tighten or loosen a single knob.

/// Maximum admissible click rate (clicks per second).
pub const MAX_CLICK_RATE: f64 = 20.0;

/// Offline accrual cap (8 hours, in seconds).
pub const OFFLINE_CAP_SECS: f64 = 8.0 * 60.0 * 60.0;

/// Lifetime currency needed before prestige is allowed.
pub const PRESTIGE_THRESHOLD: f64 = 1_000_000_000.0;

/// Lifetime currency per unit of prestige currency awarded.
pub const PRESTIGE_DIVISOR: f64 = 100_000_000.0;

/// Per-purchase cost growth of non-prestige upgrades.
pub const COST_GROWTH: f64 = 1.15;

/// Rules for economy, validation and events.
#[derive(Debug, Clone)]
pub struct GameRules {
    /// Maximum clicks per second accepted on sync.
    pub max_click_rate: f64,
    /// Cap on elapsed seconds that earn idle income.
    pub offline_cap_secs: f64,
    /// Slack applied to the idle part of the lifetime bound.
    pub plausibility_tolerance: f64,
    /// Allowed absolute drift between declared and recomputed per-second yield.
    pub per_second_tolerance: f64,
    /// Lifetime currency needed to prestige.
    pub prestige_threshold: f64,
    /// Lifetime currency per prestige currency unit.
    pub prestige_divisor: f64,
    /// Additive global multiplier per unit of prestige currency.
    pub prestige_bonus_per_unit: f64,
    /// Cost growth per owned unit.
    pub cost_growth: f64,
    /// Minimum seconds between event rolls for one session.
    pub event_check_interval_secs: i64,
    /// Probability of spawning an event on a roll.
    pub event_probability: f64,
    /// Golden event reward as a fraction of current currency.
    pub golden_reward_fraction: f64,
    /// Floor of the golden event reward.
    pub golden_reward_min: u64,
    /// Leaderboard capacity.
    pub leaderboard_size: usize,
    /// Maximum player name length (characters).
    pub max_name_len: usize,
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            max_click_rate: MAX_CLICK_RATE,
            offline_cap_secs: OFFLINE_CAP_SECS,
            plausibility_tolerance: 0.10,
            per_second_tolerance: 0.1,
            prestige_threshold: PRESTIGE_THRESHOLD,
            prestige_divisor: PRESTIGE_DIVISOR,
            prestige_bonus_per_unit: 0.01,
            cost_growth: COST_GROWTH,
            event_check_interval_secs: 60,
            event_probability: 0.05,
            golden_reward_fraction: 0.01,
            golden_reward_min: 100,
            leaderboard_size: 10,
            max_name_len: 20,
        }
    }
}
