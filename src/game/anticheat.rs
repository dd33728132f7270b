//! Anti-Cheat Validator
//!
//! Bounds on what a session could legitimately have earned:
//!
//! - **Click-rate bound**: clicks reported on sync are clamped to
//!   `ceil(elapsed x max_click_rate)`; the excess is dropped silently.
//! - **Lifetime bound**: `currency + total_spent` must not exceed
//!   `clicks x per_click + per_second x min(session_age, offline_cap) x (1 + tolerance)`.
//!   Session age is measured from creation, not from the last sync.
//! - **Yield invariant**: a client-declared or cached yield must match the
//!   server's recomputation; the server value always wins.
//!
//! A [`PlausibilityReport`] keeps hard findings in `errors` and soft ones in
//! `warnings`. [`AuditSummary`] folds many reports into valid/invalid counts.

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;

use std::collections::BTreeMap;

use crate::game::catalog::Catalog;
use crate::game::economy::{compute_yields, cumulative_cost, Yields};
use crate::game::events::ActiveBoost;
use crate::game::rules::GameRules;
use crate::game::state::{ProgressionState, SessionId};

// =============================================================================
// CLICK RATE
// =============================================================================

/// Result of clamping reported clicks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickClamp {
    /// Clicks the client reported.
    pub requested: u64,
    /// Clicks accepted.
    pub accepted: u64,
    /// Clicks dropped.
    pub dropped: u64,
    /// Upper bound for the interval.
    pub bound: u64,
}

/// Clamp `pending` clicks to what `elapsed_secs` allows.
pub fn clamp_clicks(pending: u64, elapsed_secs: f64, rules: &GameRules) -> ClickClamp {
    let bound = (elapsed_secs.max(0.0) * rules.max_click_rate).ceil() as u64;
    let accepted = pending.min(bound);
    ClickClamp {
        requested: pending,
        accepted,
        dropped: pending - accepted,
        bound,
    }
}

// =============================================================================
// LIFETIME PLAUSIBILITY
// =============================================================================

/// Currency spent on every owned non-prestige upgrade, priced at each
/// historical purchase step.
///
/// Prestige upgrades are paid in prestige currency and do not count.
pub fn total_spent(state: &ProgressionState, catalog: &Catalog, rules: &GameRules) -> f64 {
    catalog
        .upgrades
        .iter()
        .filter(|def| !def.is_prestige())
        .map(|def| cumulative_cost(def, state.owned(&def.id), rules))
        .sum()
}

/// Detailed lifetime-bound assessment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlausibilityReport {
    /// `total_clicks x per_click`.
    pub max_from_clicks: f64,
    /// `per_second x min(session_age, offline_cap)`.
    pub max_from_time: f64,
    /// Historical spend on owned upgrades.
    pub total_spent: f64,
    /// `currency + total_spent`.
    pub current_with_spending: f64,
    /// `max_from_clicks + max_from_time x (1 + tolerance)`.
    pub allowance: f64,
    /// Seconds since the session was created.
    pub session_age_secs: f64,
    /// Within the allowance?
    pub valid: bool,
    /// Hard findings: cached yields that disagree with the recomputation,
    /// and balances over the allowance.
    pub errors: Vec<String>,
    /// Non-fatal observations.
    pub warnings: Vec<String>,
}

impl PlausibilityReport {
    /// Highest score the bound can vouch for:
    /// `max(0, max_from_clicks + max_from_time - total_spent)`.
    pub fn score_cap(&self) -> u64 {
        (self.max_from_clicks + self.max_from_time - self.total_spent)
            .max(0.0)
            .floor() as u64
    }

    /// No hard findings?
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Evaluate the lifetime bound for `state` at `now`.
///
/// `boosts` are the session's live events; cached yields are compared
/// against a recomputation under the same boosts.
pub fn assess_lifetime(
    state: &ProgressionState,
    catalog: &Catalog,
    boosts: &[ActiveBoost],
    rules: &GameRules,
    now: DateTime<Utc>,
) -> PlausibilityReport {
    let session_age_secs = state.age_secs(now);
    let max_from_clicks = state.total_clicks as f64 * state.per_click as f64;
    let max_from_time = state.per_second * session_age_secs.min(rules.offline_cap_secs);
    let total_spent = total_spent(state, catalog, rules);
    let current_with_spending = state.currency + total_spent;
    let allowance = max_from_clicks + max_from_time * (1.0 + rules.plausibility_tolerance);
    let valid = current_with_spending <= allowance;

    let mut errors = Vec::new();
    let expected = compute_yields(state, catalog, boosts, rules);
    if expected.per_click != state.per_click {
        errors.push(format!(
            "per_click mismatch: expected {}, got {}",
            expected.per_click, state.per_click
        ));
    }
    if (expected.per_second - state.per_second).abs() > rules.per_second_tolerance {
        errors.push(format!(
            "per_second mismatch: expected {}, got {}",
            expected.per_second, state.per_second
        ));
    }
    if !valid {
        errors.push(format!(
            "impossible balance: allowance={:.2}, current_with_spending={:.2}",
            allowance, current_with_spending
        ));
    }

    let mut warnings = Vec::new();
    if session_age_secs > rules.offline_cap_secs {
        warnings.push(format!(
            "session older than offline cap ({:.1}h)",
            session_age_secs / 3600.0
        ));
    }
    let max_possible = max_from_clicks + max_from_time;
    if valid && max_possible > 0.0 && current_with_spending > max_possible * 0.5 {
        warnings.push("close to maximum possible".to_string());
    }

    PlausibilityReport {
        max_from_clicks,
        max_from_time,
        total_spent,
        current_with_spending,
        allowance,
        session_age_secs,
        valid,
        errors,
        warnings,
    }
}

/// Score a session may place on the leaderboard.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreVerdict {
    /// Score the session's currency claims.
    pub claimed: u64,
    /// Score to record.
    pub score: u64,
    /// Was the claim accepted as-is?
    pub accepted: bool,
    /// Underlying assessment.
    pub report: PlausibilityReport,
}

/// Validate the session's score. Implausible claims are capped; the
/// session's currency is left untouched.
pub fn validate_score(
    state: &ProgressionState,
    catalog: &Catalog,
    boosts: &[ActiveBoost],
    rules: &GameRules,
    now: DateTime<Utc>,
) -> ScoreVerdict {
    let report = assess_lifetime(state, catalog, boosts, rules, now);
    let claimed = state.currency.max(0.0).floor() as u64;
    let (score, accepted) = if report.valid {
        (claimed, true)
    } else {
        (report.score_cap(), false)
    };
    ScoreVerdict { claimed, score, accepted, report }
}

// =============================================================================
// BATCH AUDIT
// =============================================================================

/// Plausibility reports for many sessions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditSummary {
    /// Sessions examined.
    pub total: usize,
    /// Sessions without errors.
    pub valid: usize,
    /// Sessions with at least one error.
    pub invalid: usize,
    /// Report of every session.
    pub reports: BTreeMap<SessionId, PlausibilityReport>,
}

impl AuditSummary {
    /// Add one session's report.
    pub fn record(&mut self, session_id: SessionId, report: PlausibilityReport) {
        self.total += 1;
        if report.is_clean() {
            self.valid += 1;
        } else {
            self.invalid += 1;
        }
        self.reports.insert(session_id, report);
    }

    /// Reports with errors.
    pub fn flagged(&self) -> impl Iterator<Item = (&SessionId, &PlausibilityReport)> {
        self.reports.iter().filter(|(_, r)| !r.is_clean())
    }
}

// =============================================================================
// YIELD INVARIANT
// =============================================================================

/// Declared and recomputed yields disagree.
#[derive(Clone, Copy, Debug, PartialEq, Error, Serialize, Deserialize)]
#[error("state corruption: expected {expected:?}, found {found:?}")]
pub struct YieldMismatch {
    /// Server recomputation (authoritative).
    pub expected: Yields,
    /// Declared or cached values.
    pub found: Yields,
}

/// Compare `declared` against the authoritative `expected` yields.
///
/// Per-click must match exactly; per-second within
/// `rules.per_second_tolerance`.
pub fn check_yields(expected: Yields, declared: Yields, rules: &GameRules) -> Result<(), YieldMismatch> {
    let click_ok = expected.per_click == declared.per_click;
    let second_ok = (expected.per_second - declared.per_second).abs() <= rules.per_second_tolerance;
    if click_ok && second_ok {
        Ok(())
    } else {
        Err(YieldMismatch { expected, found: declared })
    }
}
