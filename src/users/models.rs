use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Database model for the gamification slice of a user record
///
/// User identity is issued by the upstream identity collaborator; this
/// service only maintains the totals, the derived rank, and the social
/// counters consumed by achievement criteria.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserModel {
    pub id: String,
    pub username: String,
    pub pc_points: i64,
    pub pcon_points: i64,
    pub rank: String,
    pub followers: i64,
    pub following: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserModel {
    /// Creates a fresh user at zero points holding the given baseline rank
    pub fn new(id: String, username: String, baseline_rank: &str) -> Self {
        let now = Utc::now();
        Self {
            id,
            username,
            pc_points: 0,
            pcon_points: 0,
            rank: baseline_rank.to_string(),
            followers: 0,
            following: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the user has earned points in either currency
    pub fn is_active(&self) -> bool {
        self.pc_points > 0 || self.pcon_points > 0
    }

    /// Level derived from PC points: one level per 100 points, minimum 1
    pub fn level(&self) -> i64 {
        (self.pc_points / 100).max(1)
    }
}
