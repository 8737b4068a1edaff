use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use strum_macros::EnumIter;
use uuid::Uuid;

use crate::leaderboards::models::LeaderboardType;
use crate::streaks::models::StreakType;

/// Achievement categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum AchievementCategory {
    Beginner,
    Contributor,
    Expert,
    Social,
    Special,
    Milestone,
    Streak,
    Competitive,
}

impl fmt::Display for AchievementCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AchievementCategory::Beginner => "beginner",
                AchievementCategory::Contributor => "contributor",
                AchievementCategory::Expert => "expert",
                AchievementCategory::Social => "social",
                AchievementCategory::Special => "special",
                AchievementCategory::Milestone => "milestone",
                AchievementCategory::Streak => "streak",
                AchievementCategory::Competitive => "competitive",
            }
        )
    }
}

impl AchievementCategory {
    pub fn parse(value: &str) -> Option<AchievementCategory> {
        match value {
            "beginner" => Some(AchievementCategory::Beginner),
            "contributor" => Some(AchievementCategory::Contributor),
            "expert" => Some(AchievementCategory::Expert),
            "social" => Some(AchievementCategory::Social),
            "special" => Some(AchievementCategory::Special),
            "milestone" => Some(AchievementCategory::Milestone),
            "streak" => Some(AchievementCategory::Streak),
            "competitive" => Some(AchievementCategory::Competitive),
            _ => None,
        }
    }
}

/// Achievement rarity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum AchievementRarity {
    Common,
    Rare,
    Epic,
    Legendary,
}

impl fmt::Display for AchievementRarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AchievementRarity::Common => "common",
                AchievementRarity::Rare => "rare",
                AchievementRarity::Epic => "epic",
                AchievementRarity::Legendary => "legendary",
            }
        )
    }
}

impl AchievementRarity {
    pub fn parse(value: &str) -> Option<AchievementRarity> {
        match value {
            "common" => Some(AchievementRarity::Common),
            "rare" => Some(AchievementRarity::Rare),
            "epic" => Some(AchievementRarity::Epic),
            "legendary" => Some(AchievementRarity::Legendary),
            _ => None,
        }
    }
}

/// Fields of the statistics snapshot that criteria can reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum StatField {
    PcPoints,
    PconPoints,
    QuestionsCreated,
    AnswersCreated,
    AcceptedAnswers,
    TotalUpvotes,
    Followers,
    Following,
    DaysSinceRegistration,
}

impl fmt::Display for StatField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                StatField::PcPoints => "pc_points",
                StatField::PconPoints => "pcon_points",
                StatField::QuestionsCreated => "questions_created",
                StatField::AnswersCreated => "answers_created",
                StatField::AcceptedAnswers => "accepted_answers",
                StatField::TotalUpvotes => "total_upvotes",
                StatField::Followers => "followers",
                StatField::Following => "following",
                StatField::DaysSinceRegistration => "days_since_registration",
            }
        )
    }
}

/// A fresh per-user statistics snapshot, recomputed on every evaluation
/// pass by querying the collaborator stores
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStatistics {
    pub user_id: String,
    pub pc_points: i64,
    pub pcon_points: i64,
    pub questions_created: i64,
    pub answers_created: i64,
    pub accepted_answers: i64,
    pub total_upvotes: i64,
    pub followers: i64,
    pub following: i64,
    pub days_since_registration: i64,
    /// Current count per streak type
    #[serde(default)]
    pub streaks: HashMap<StreakType, i64>,
    /// Position on the most recent snapshot per board, where present
    #[serde(default)]
    pub leaderboard_positions: HashMap<LeaderboardType, i64>,
}

impl UserStatistics {
    pub fn field(&self, field: StatField) -> i64 {
        match field {
            StatField::PcPoints => self.pc_points,
            StatField::PconPoints => self.pcon_points,
            StatField::QuestionsCreated => self.questions_created,
            StatField::AnswersCreated => self.answers_created,
            StatField::AcceptedAnswers => self.accepted_answers,
            StatField::TotalUpvotes => self.total_upvotes,
            StatField::Followers => self.followers,
            StatField::Following => self.following,
            StatField::DaysSinceRegistration => self.days_since_registration,
        }
    }

    pub fn streak(&self, streak_type: StreakType) -> i64 {
        self.streaks.get(&streak_type).copied().unwrap_or(0)
    }

    pub fn leaderboard_position(&self, board: LeaderboardType) -> Option<i64> {
        self.leaderboard_positions.get(&board).copied()
    }
}

/// One condition inside an `AllOf` criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatCondition {
    pub field: StatField,
    pub required: i64,
}

/// Achievement earning criteria as a closed set of variants, evaluated by
/// exhaustive matching against the statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "condition_type", rename_all = "snake_case")]
pub enum AchievementCriteria {
    /// A snapshot counter reaching a threshold
    Count { field: StatField, target_value: i64 },
    /// A point total reaching a threshold
    Points { field: StatField, target_value: i64 },
    /// A streak's current count reaching a threshold
    Streak {
        streak: StreakType,
        target_value: i64,
    },
    /// Account age in days reaching a threshold
    RegistrationAge { target_value: i64 },
    /// Holding position <= target on the most recent snapshot of a board;
    /// never satisfied before the board has been generated
    LeaderboardPosition {
        board: LeaderboardType,
        target_value: i64,
    },
    /// Every listed condition must hold simultaneously
    AllOf {
        target_value: i64,
        conditions: Vec<StatCondition>,
    },
}

impl AchievementCriteria {
    pub fn target_value(&self) -> i64 {
        match self {
            AchievementCriteria::Count { target_value, .. }
            | AchievementCriteria::Points { target_value, .. }
            | AchievementCriteria::Streak { target_value, .. }
            | AchievementCriteria::RegistrationAge { target_value }
            | AchievementCriteria::LeaderboardPosition { target_value, .. }
            | AchievementCriteria::AllOf { target_value, .. } => *target_value,
        }
    }

    /// Whether the snapshot satisfies the criterion
    pub fn is_satisfied_by(&self, stats: &UserStatistics) -> bool {
        match self {
            AchievementCriteria::Count {
                field,
                target_value,
            }
            | AchievementCriteria::Points {
                field,
                target_value,
            } => stats.field(*field) >= *target_value,
            AchievementCriteria::Streak {
                streak,
                target_value,
            } => stats.streak(*streak) >= *target_value,
            AchievementCriteria::RegistrationAge { target_value } => {
                stats.days_since_registration >= *target_value
            }
            AchievementCriteria::LeaderboardPosition {
                board,
                target_value,
            } => stats
                .leaderboard_position(*board)
                .is_some_and(|position| position <= *target_value),
            AchievementCriteria::AllOf { conditions, .. } => conditions
                .iter()
                .all(|c| stats.field(c.field) >= c.required),
        }
    }

    /// Progress toward the criterion for display purposes. Leaderboard
    /// and composite criteria report no partial progress.
    pub fn progress_in(&self, stats: &UserStatistics) -> i64 {
        match self {
            AchievementCriteria::Count { field, .. }
            | AchievementCriteria::Points { field, .. } => stats.field(*field),
            AchievementCriteria::Streak { streak, .. } => stats.streak(*streak),
            AchievementCriteria::RegistrationAge { .. } => stats.days_since_registration,
            AchievementCriteria::LeaderboardPosition { .. }
            | AchievementCriteria::AllOf { .. } => 0,
        }
    }
}

/// Catalog entry for an achievement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Achievement {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: AchievementCategory,
    pub rarity: AchievementRarity,
    pub badge_icon: String,
    pub badge_color: String,
    pub criteria: AchievementCriteria,
    #[serde(default)]
    pub points_reward: i64,
    #[serde(default)]
    pub pcon_reward: i64,
    #[serde(default)]
    pub is_hidden: bool,
    #[serde(default)]
    pub is_repeatable: bool,
    #[serde(default)]
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

impl Achievement {
    pub fn has_reward(&self) -> bool {
        self.points_reward > 0 || self.pcon_reward > 0
    }
}

/// A user's record for one achievement; flips to earned exactly once
/// unless the achievement is repeatable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAchievementModel {
    pub id: String,
    pub user_id: String,
    pub achievement_id: String,
    pub progress: i64,
    pub earned_at: Option<DateTime<Utc>>,
    pub is_earned: bool,
    pub created_at: DateTime<Utc>,
}

impl UserAchievementModel {
    pub fn earned(user_id: &str, achievement_id: &str, progress: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            achievement_id: achievement_id.to_string(),
            progress,
            earned_at: Some(now),
            is_earned: true,
            created_at: now,
        }
    }
}

/// Progress report row for one catalog achievement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementProgress {
    pub achievement: Achievement,
    pub current_progress: i64,
    pub target_progress: i64,
    pub percentage: f64,
    pub is_earned: bool,
    pub earned_at: Option<DateTime<Utc>>,
}

/// Achievement listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AchievementFilters {
    pub category: Option<AchievementCategory>,
    pub rarity: Option<AchievementRarity>,
    pub is_earned: Option<bool>,
    pub is_hidden: Option<bool>,
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn stats() -> UserStatistics {
        UserStatistics {
            user_id: "u1".to_string(),
            pc_points: 120,
            questions_created: 5,
            followers: 25,
            following: 24,
            days_since_registration: 400,
            streaks: HashMap::from([(StreakType::DailyLogin, 7)]),
            leaderboard_positions: HashMap::from([(LeaderboardType::MonthlyPc, 8)]),
            ..UserStatistics::default()
        }
    }

    #[rstest]
    #[case(5, true)]
    #[case(6, false)]
    fn count_criterion_compares_against_target(#[case] target: i64, #[case] expected: bool) {
        let criteria = AchievementCriteria::Count {
            field: StatField::QuestionsCreated,
            target_value: target,
        };
        assert_eq!(criteria.is_satisfied_by(&stats()), expected);
    }

    #[test]
    fn streak_criterion_reads_the_matching_streak() {
        let criteria = AchievementCriteria::Streak {
            streak: StreakType::DailyLogin,
            target_value: 7,
        };
        assert!(criteria.is_satisfied_by(&stats()));

        let other = AchievementCriteria::Streak {
            streak: StreakType::DailyActivity,
            target_value: 7,
        };
        assert!(!other.is_satisfied_by(&stats()));
    }

    #[test]
    fn all_of_requires_every_condition() {
        let criteria = AchievementCriteria::AllOf {
            target_value: 25,
            conditions: vec![
                StatCondition {
                    field: StatField::Followers,
                    required: 25,
                },
                StatCondition {
                    field: StatField::Following,
                    required: 25,
                },
            ],
        };
        // following is 24: the conjunction fails
        assert!(!criteria.is_satisfied_by(&stats()));

        let mut social = stats();
        social.following = 25;
        assert!(criteria.is_satisfied_by(&social));
    }

    #[test]
    fn leaderboard_position_requires_a_snapshot() {
        let criteria = AchievementCriteria::LeaderboardPosition {
            board: LeaderboardType::MonthlyPc,
            target_value: 10,
        };
        assert!(criteria.is_satisfied_by(&stats()));

        let unranked = AchievementCriteria::LeaderboardPosition {
            board: LeaderboardType::WeeklyPc,
            target_value: 10,
        };
        assert!(!unranked.is_satisfied_by(&stats()));
    }

    #[test]
    fn criteria_serialize_with_a_condition_type_tag() {
        let criteria = AchievementCriteria::Count {
            field: StatField::QuestionsCreated,
            target_value: 1,
        };
        let json = serde_json::to_value(&criteria).unwrap();
        assert_eq!(json["condition_type"], "count");
        assert_eq!(json["target_value"], 1);

        let parsed: AchievementCriteria = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, criteria);
    }
}
