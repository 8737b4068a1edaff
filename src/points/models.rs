use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Well-known action keys shared with the Q&A services.
/// An action missing from both point tables is a logged no-op, so this
/// list does not need to be exhaustive.
pub mod actions {
    pub const QUESTION_CREATED: &str = "question_created";
    pub const ANSWER_CREATED: &str = "answer_created";
    pub const ANSWER_ACCEPTED: &str = "answer_accepted";
    pub const QUESTION_SOLVED: &str = "question_solved";
    pub const RECEIVED_UPVOTE: &str = "received_upvote";
    pub const RECEIVED_DOWNVOTE: &str = "received_downvote";
    pub const DAILY_LOGIN: &str = "daily_login";
    pub const PROFILE_COMPLETED: &str = "profile_completed";
    pub const ACHIEVEMENT_UNLOCKED: &str = "achievement_unlocked";
    pub const STREAK_MILESTONE: &str = "streak_milestone";
    pub const REFERRAL_SIGNUP: &str = "referral_signup";
    pub const REFERRAL_MILESTONE: &str = "referral_milestone";
}

/// The two point currencies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointKind {
    Pc,
    Pcon,
}

impl fmt::Display for PointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                PointKind::Pc => "pc",
                PointKind::Pcon => "pcon",
            }
        )
    }
}

/// Optional reference to the entity an award was triggered by
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetRef {
    pub target_id: String,
    pub target_type: String,
}

impl TargetRef {
    pub fn new(target_id: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            target_type: target_type.into(),
        }
    }
}

/// Append-only ledger entry carrying both deltas and both post-change totals
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PointsEntryModel {
    pub id: String,
    pub user_id: String,
    pub action: String,
    pub pc_points_change: i64,
    pub pcon_points_change: i64,
    pub pc_points_total: i64,
    pub pcon_points_total: i64,
    pub target_id: Option<String>,
    pub target_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PointsEntryModel {
    pub fn new(
        user_id: &str,
        action: &str,
        pc_change: i64,
        pcon_change: i64,
        pc_total: i64,
        pcon_total: i64,
        target: Option<&TargetRef>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            action: action.to_string(),
            pc_points_change: pc_change,
            pcon_points_change: pcon_change,
            pc_points_total: pc_total,
            pcon_points_total: pcon_total,
            target_id: target.map(|t| t.target_id.clone()),
            target_type: target.map(|t| t.target_type.clone()),
            created_at: Utc::now(),
        }
    }
}

/// Outcome of an award call: the applied deltas and the resulting totals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointsAward {
    pub action: String,
    pub pc_points: i64,
    pub pcon_points: i64,
    pub total_pc: i64,
    pub total_pcon: i64,
}

impl PointsAward {
    /// A zero-effect award for an action configured in neither table
    pub fn noop(action: &str, total_pc: i64, total_pcon: i64) -> Self {
        Self {
            action: action.to_string(),
            pc_points: 0,
            pcon_points: 0,
            total_pc,
            total_pcon,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.pc_points == 0 && self.pcon_points == 0
    }
}

/// Global distribution totals across the whole ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointsDistribution {
    pub total_pc_distributed: i64,
    pub total_pcon_distributed: i64,
    pub total_transactions: i64,
}
