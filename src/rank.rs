use serde::{Deserialize, Serialize};

/// A single rank tier with the minimum totals required to hold it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankTier {
    pub name: String,
    pub pc_points: i64,
    pub pcon_points: i64,
}

impl RankTier {
    pub fn new(name: &str, pc_points: i64, pcon_points: i64) -> Self {
        Self {
            name: name.to_string(),
            pc_points,
            pcon_points,
        }
    }

    fn is_satisfied_by(&self, pc_points: i64, pcon_points: i64) -> bool {
        pc_points >= self.pc_points && pcon_points >= self.pcon_points
    }
}

/// Ordered rank tier table, lowest tier first
///
/// A user's rank is the highest tier whose PC and PCon minimums BOTH hold.
/// The first tier is the baseline and applies when nothing else does.
#[derive(Debug, Clone)]
pub struct RankTable {
    tiers: Vec<RankTier>,
}

impl RankTable {
    pub fn new(tiers: Vec<RankTier>) -> Self {
        Self { tiers }
    }

    /// Name of the baseline tier (the implicit default)
    pub fn baseline(&self) -> &str {
        self.tiers.first().map(|t| t.name.as_str()).unwrap_or("")
    }

    /// Evaluate the rank for the given totals
    pub fn evaluate(&self, pc_points: i64, pcon_points: i64) -> &str {
        let mut current = self.baseline();
        for tier in &self.tiers {
            if tier.is_satisfied_by(pc_points, pcon_points) {
                current = &tier.name;
            }
        }
        current
    }

    pub fn tiers(&self) -> &[RankTier] {
        &self.tiers
    }
}
