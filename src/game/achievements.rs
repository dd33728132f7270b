//! Achievement Checker
//!
//! Unlocks achievements whose metric has reached its threshold. Rewards are
//! read by the economy on the next yield recomputation.

use chrono::{DateTime, Utc};

use crate::game::state::ProgressionState;

/// Unlock every satisfied, still-locked achievement.
///
/// Returns the ids unlocked by this call, in catalog order.
pub fn check_achievements(state: &mut ProgressionState, now: DateTime<Utc>) -> Vec<String> {
    let metrics: Vec<f64> = state
        .achievements
        .iter()
        .map(|a| state.metric(a.requirement.metric))
        .collect();

    let mut unlocked = Vec::new();
    for (achievement, value) in state.achievements.iter_mut().zip(metrics) {
        if achievement.unlocked {
            continue;
        }
        if value >= achievement.requirement.threshold {
            achievement.unlocked = true;
            achievement.unlocked_at = Some(now);
            unlocked.push(achievement.id.clone());
        }
    }
    unlocked
}

/// Sum of additive multiplier rewards of unlocked achievements.
pub fn achievement_bonus(state: &ProgressionState) -> f64 {
    state.achievements.iter().map(|a| a.multiplier_bonus()).sum()
}
