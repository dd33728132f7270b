//! Upgrade Catalog
//!
//! Static definitions of purchasable upgrades and unlockable achievements.
//! Nothing here is mutated at runtime; sessions reference entries by id.

use serde::{Serialize, Deserialize};

/// Upgrade category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeCategory {
    /// Adds to per-click yield.
    Click,
    /// Adds to per-second yield.
    Auto,
    /// Effect depends on a different category's owned count.
    Synergy,
    /// Bought with prestige currency, survives prestige.
    Prestige,
}

/// What owning an upgrade does to the yields.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpgradeEffect {
    /// `magnitude x owned` added to the category's yield.
    Linear,
    /// Simulated auto-clicks: `floor(per_click x owned / 10)` per second.
    AutoClicker,
    /// Each owned auto upgrade adds `rate` of the running click total.
    ClickSynergy {
        /// Fraction of click power added per owned auto upgrade.
        rate: f64,
    },
    /// Global multiplier `magnitude ^ owned`.
    GlobalMultiplier,
    /// Per-second multiplier `magnitude ^ owned`.
    AutoMultiplier,
}

/// Gate on buying an upgrade.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRequirement {
    /// Prestige count the session must have reached.
    pub min_prestige_count: u32,
}

/// Immutable upgrade definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpgradeDefinition {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Player-facing description.
    pub description: String,
    /// Cost of the first unit (prestige currency for prestige upgrades).
    pub base_cost: u64,
    /// Effect magnitude.
    pub magnitude: u64,
    /// Category.
    pub category: UpgradeCategory,
    /// Effect on yields.
    pub effect: UpgradeEffect,
    /// Optional purchase gate.
    pub unlock: Option<UnlockRequirement>,
}

impl UpgradeDefinition {
    fn new(
        id: &str,
        name: &str,
        description: &str,
        base_cost: u64,
        magnitude: u64,
        category: UpgradeCategory,
        effect: UpgradeEffect,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            base_cost,
            magnitude,
            category,
            effect,
            unlock: None,
        }
    }

    fn click(id: &str, name: &str, base_cost: u64, magnitude: u64) -> Self {
        let description = format!("+{} per click", magnitude);
        Self::new(id, name, &description, base_cost, magnitude, UpgradeCategory::Click, UpgradeEffect::Linear)
    }

    fn auto(id: &str, name: &str, base_cost: u64, magnitude: u64) -> Self {
        let description = format!("+{} per second", magnitude);
        Self::new(id, name, &description, base_cost, magnitude, UpgradeCategory::Auto, UpgradeEffect::Linear)
    }

    fn requires_prestige(mut self, count: u32) -> Self {
        self.unlock = Some(UnlockRequirement { min_prestige_count: count });
        self
    }

    /// Whether a session with `prestige_count` may buy this.
    pub fn is_unlocked(&self, prestige_count: u32) -> bool {
        self.unlock
            .map(|req| prestige_count >= req.min_prestige_count)
            .unwrap_or(true)
    }

    /// Paid with prestige currency?
    #[inline]
    pub fn is_prestige(&self) -> bool {
        self.category == UpgradeCategory::Prestige
    }
}

// =============================================================================
// ACHIEVEMENTS
// =============================================================================

/// Metric an achievement is measured against. All are non-decreasing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementMetric {
    /// All-time clicks.
    Clicks,
    /// All-time currency earned.
    CurrencyEarned,
    /// Number of prestiges.
    PrestigeCount,
}

/// Unlock predicate: `metric >= threshold`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AchievementRequirement {
    /// Measured metric.
    pub metric: AchievementMetric,
    /// Threshold (inclusive).
    pub threshold: f64,
}

/// Reward granted once unlocked.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AchievementReward {
    /// Additive bonus on the global multiplier.
    Multiplier(f64),
}

/// Immutable achievement definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AchievementDefinition {
    /// Stable identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Player-facing description.
    pub description: String,
    /// Unlock predicate.
    pub requirement: AchievementRequirement,
    /// Reward.
    pub reward: AchievementReward,
}

impl AchievementDefinition {
    fn new(id: &str, name: &str, description: &str, metric: AchievementMetric, threshold: f64, bonus: f64) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            description: description.to_string(),
            requirement: AchievementRequirement { metric, threshold },
            reward: AchievementReward::Multiplier(bonus),
        }
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// Every upgrade and achievement the server knows about.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    /// Upgrades in display order.
    pub upgrades: Vec<UpgradeDefinition>,
    /// Achievements in display order.
    pub achievements: Vec<AchievementDefinition>,
}

impl Catalog {
    /// The standard game catalog.
    pub fn standard() -> Self {
        use AchievementMetric::*;
        use UpgradeCategory::*;

        let upgrades = vec![
            UpgradeDefinition::click("click_1", "Better Fingers", 10, 1),
            UpgradeDefinition::click("click_2", "Stronger Arms", 100, 5),
            UpgradeDefinition::click("click_3", "Banana Gloves", 1_000, 10),
            UpgradeDefinition::click("click_4", "Banana Peeler", 10_000, 25),
            UpgradeDefinition::click("click_5", "Golden Banana Touch", 100_000, 100),
            UpgradeDefinition::auto("auto_1", "Banana Tree", 50, 1),
            UpgradeDefinition::auto("auto_2", "Banana Harvester Bot", 500, 5),
            UpgradeDefinition::auto("auto_3", "Banana Plantation", 5_000, 20),
            UpgradeDefinition::auto("auto_4", "Banana Factory", 50_000, 60),
            UpgradeDefinition::auto("auto_5", "Banana Enrichment Center", 500_000, 120),
            UpgradeDefinition::auto("auto_6", "Banana Shipping Fleet", 5_000_000, 500),
            UpgradeDefinition::auto("auto_7", "Banana Space Program", 50_000_000, 2_000),
            UpgradeDefinition::auto("auto_8", "Banana Multiverse Farm", 500_000_000, 10_000),
            UpgradeDefinition::new(
                "synergy_1",
                "Auto-clicker Bots",
                "Automatically clicks once every 10 seconds",
                1_000_000,
                1,
                Synergy,
                UpgradeEffect::AutoClicker,
            ),
            UpgradeDefinition::new(
                "synergy_2",
                "Photosynthetic Bananas",
                "Auto upgrades boost click power by 10%",
                100_000_000,
                1,
                Synergy,
                UpgradeEffect::ClickSynergy { rate: 0.1 },
            ),
            UpgradeDefinition::new(
                "prestige_1",
                "Banana Deity Blessing",
                "x5 global multiplier (costs prestige currency)",
                10,
                5,
                Prestige,
                UpgradeEffect::GlobalMultiplier,
            )
            .requires_prestige(1),
            UpgradeDefinition::new(
                "prestige_2",
                "Quantum Peel Generator",
                "Doubles auto production (costs prestige currency)",
                50,
                2,
                Prestige,
                UpgradeEffect::AutoMultiplier,
            )
            .requires_prestige(1),
        ];

        let achievements = vec![
            AchievementDefinition::new("ach_clicks_1", "First Steps", "Click 100 times", Clicks, 100.0, 0.01),
            AchievementDefinition::new("ach_clicks_2", "Click Master", "Click 1,000 times", Clicks, 1_000.0, 0.01),
            AchievementDefinition::new("ach_currency_1", "Hoarder", "Collect 10,000 bananas", CurrencyEarned, 10_000.0, 0.01),
            AchievementDefinition::new("ach_currency_2", "Millionaire", "Collect 1,000,000 bananas", CurrencyEarned, 1_000_000.0, 0.01),
            AchievementDefinition::new("ach_prestige_1", "Ascended", "Prestige once", PrestigeCount, 1.0, 0.05),
            AchievementDefinition::new("ach_prestige_2", "Ascension Addict", "Prestige 10 times", PrestigeCount, 10.0, 0.05),
            AchievementDefinition::new("ach_prestige_3", "Deity", "Prestige 100 times", PrestigeCount, 100.0, 0.05),
        ];

        Self { upgrades, achievements }
    }

    /// Look up an upgrade by id.
    pub fn upgrade(&self, id: &str) -> Option<&UpgradeDefinition> {
        self.upgrades.iter().find(|u| u.id == id)
    }

    /// Look up an achievement by id.
    pub fn achievement(&self, id: &str) -> Option<&AchievementDefinition> {
        self.achievements.iter().find(|a| a.id == id)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn test_ids_are_unique() {
        let catalog = Catalog::standard();

        let upgrade_ids: BTreeSet<_> = catalog.upgrades.iter().map(|u| &u.id).collect();
        assert_eq!(upgrade_ids.len(), catalog.upgrades.len());

        let achievement_ids: BTreeSet<_> = catalog.achievements.iter().map(|a| &a.id).collect();
        assert_eq!(achievement_ids.len(), catalog.achievements.len());
    }

    #[test]
    fn test_effects_match_categories() {
        for def in &Catalog::standard().upgrades {
            let ok = match def.category {
                UpgradeCategory::Click | UpgradeCategory::Auto => def.effect == UpgradeEffect::Linear,
                UpgradeCategory::Synergy => matches!(
                    def.effect,
                    UpgradeEffect::AutoClicker | UpgradeEffect::ClickSynergy { .. }
                ),
                UpgradeCategory::Prestige => matches!(
                    def.effect,
                    UpgradeEffect::GlobalMultiplier | UpgradeEffect::AutoMultiplier
                ),
            };
            assert!(ok, "{} has effect {:?}", def.id, def.effect);
        }
    }

    #[test]
    fn test_prestige_upgrades_are_gated() {
        let catalog = Catalog::standard();
        let blessing = catalog.upgrade("prestige_1").unwrap();

        assert!(blessing.is_prestige());
        assert!(!blessing.is_unlocked(0));
        assert!(blessing.is_unlocked(1));
        assert!(catalog.upgrade("click_1").unwrap().is_unlocked(0));
    }

    #[test]
    fn test_lookup_unknown() {
        let catalog = Catalog::standard();
        assert!(catalog.upgrade("nope").is_none());
        assert!(catalog.achievement("nope").is_none());
    }
}
