use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::EnumIter;
use uuid::Uuid;

/// Milestones a referred user can reach, each paying the referrer once
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum ReferralMilestone {
    Signup,
    FirstQuestion,
    FirstAnswer,
    ActiveUser,
}

impl fmt::Display for ReferralMilestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ReferralMilestone::Signup => "signup",
                ReferralMilestone::FirstQuestion => "first_question",
                ReferralMilestone::FirstAnswer => "first_answer",
                ReferralMilestone::ActiveUser => "active_user",
            }
        )
    }
}

impl ReferralMilestone {
    pub fn parse(value: &str) -> Option<ReferralMilestone> {
        match value {
            "signup" => Some(ReferralMilestone::Signup),
            "first_question" => Some(ReferralMilestone::FirstQuestion),
            "first_answer" => Some(ReferralMilestone::FirstAnswer),
            "active_user" => Some(ReferralMilestone::ActiveUser),
            _ => None,
        }
    }
}

/// Database model for a referral reward record.
/// The `signup` record doubles as the referral relationship itself;
/// later milestones add one record each.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralRewardModel {
    pub id: String,
    pub referrer_id: String,
    pub referred_id: String,
    pub milestone: ReferralMilestone,
    pub pc_reward: i64,
    pub pcon_reward: i64,
    pub created_at: DateTime<Utc>,
}

impl ReferralRewardModel {
    pub fn new(
        referrer_id: &str,
        referred_id: &str,
        milestone: ReferralMilestone,
        pc_reward: i64,
        pcon_reward: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            referrer_id: referrer_id.to_string(),
            referred_id: referred_id.to_string(),
            milestone,
            pc_reward,
            pcon_reward,
            created_at: Utc::now(),
        }
    }
}
