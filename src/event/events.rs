use serde::{Deserialize, Serialize};

/// Events that can occur in the gamification engine
///
/// Events represent facts about things that have already happened.
/// They are used to communicate state changes between different parts
/// of the system without tight coupling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GamificationEvent {
    /// Points were credited or debited on a user's totals
    PointsAwarded {
        user_id: String,
        action: String,
        pc_change: i64,
        pcon_change: i64,
        pc_total: i64,
        pcon_total: i64,
    },

    /// A user's rank moved to a different tier
    RankChanged {
        user_id: String,
        previous_rank: String,
        new_rank: String,
    },

    /// A user earned an achievement for the first time
    AchievementEarned {
        user_id: String,
        achievement_id: String,
    },

    /// A badge was added to a user's collection
    BadgeAwarded { user_id: String, badge_id: String },

    /// A streak hit a configured milestone
    StreakMilestoneReached {
        user_id: String,
        streak_type: String,
        milestone: i64,
    },

    /// A leaderboard snapshot was regenerated
    LeaderboardGenerated {
        leaderboard_type: String,
        entry_count: usize,
    },

    /// A referral milestone paid out to the referrer
    ReferralMilestoneReached {
        referrer_id: String,
        referred_id: String,
        milestone: String,
    },
}

impl GamificationEvent {
    /// Get the user the event is primarily about, if any.
    /// Leaderboard snapshots are global and carry no single user.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            GamificationEvent::PointsAwarded { user_id, .. } => Some(user_id),
            GamificationEvent::RankChanged { user_id, .. } => Some(user_id),
            GamificationEvent::AchievementEarned { user_id, .. } => Some(user_id),
            GamificationEvent::BadgeAwarded { user_id, .. } => Some(user_id),
            GamificationEvent::StreakMilestoneReached { user_id, .. } => Some(user_id),
            GamificationEvent::LeaderboardGenerated { .. } => None,
            GamificationEvent::ReferralMilestoneReached { referrer_id, .. } => Some(referrer_id),
        }
    }

    /// Get a human-readable description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            GamificationEvent::PointsAwarded { .. } => "points_awarded",
            GamificationEvent::RankChanged { .. } => "rank_changed",
            GamificationEvent::AchievementEarned { .. } => "achievement_earned",
            GamificationEvent::BadgeAwarded { .. } => "badge_awarded",
            GamificationEvent::StreakMilestoneReached { .. } => "streak_milestone_reached",
            GamificationEvent::LeaderboardGenerated { .. } => "leaderboard_generated",
            GamificationEvent::ReferralMilestoneReached { .. } => "referral_milestone_reached",
        }
    }
}
