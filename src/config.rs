use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::points::models::actions;
use crate::rank::{RankTable, RankTier};
use crate::referrals::models::ReferralMilestone;
use crate::streaks::models::StreakType;

/// Environment variable naming an optional JSON file overriding the defaults
pub const CONFIG_PATH_ENV: &str = "KUDOS_CONFIG";

/// Bonus paid to the referrer when the referred user reaches a milestone
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReferralBonus {
    pub pc_reward: i64,
    pub pcon_reward: i64,
}

/// One streak milestone: a bonus paid exactly when `current_count`
/// lands on `milestone`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakMilestone {
    pub milestone: i64,
    #[serde(default)]
    pub pc_bonus: i64,
    #[serde(default)]
    pub pcon_bonus: i64,
    #[serde(default)]
    pub badge_reward: Option<String>,
    #[serde(default)]
    pub recheck_achievements: bool,
}

/// Static gamification configuration loaded at startup.
/// The achievement and badge catalogs are seeded separately by the
/// idempotent initializers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamificationConfig {
    /// PC point value per action
    #[serde(default)]
    pub pc_points: HashMap<String, i64>,
    /// PCon point value per action
    #[serde(default)]
    pub pcon_points: HashMap<String, i64>,
    /// Rank tiers ordered lowest to highest
    #[serde(default)]
    pub rank_tiers: Vec<RankTier>,
    /// Milestone tables per streak type
    #[serde(default)]
    pub streak_milestones: HashMap<StreakType, Vec<StreakMilestone>>,
    /// Referrer bonuses per referral milestone
    #[serde(default)]
    pub referral_rewards: HashMap<ReferralMilestone, ReferralBonus>,
    /// Start of the all-time leaderboard window
    #[serde(default = "default_leaderboard_epoch")]
    pub leaderboard_epoch: NaiveDate,
    /// Days without activity before the maintenance sweep flags a streak
    /// inactive
    #[serde(default = "default_streak_inactivity_days")]
    pub streak_inactivity_days: i64,
}

fn default_leaderboard_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

fn default_streak_inactivity_days() -> i64 {
    30
}

impl Default for GamificationConfig {
    fn default() -> Self {
        let pc_points = HashMap::from([
            (actions::QUESTION_CREATED.to_string(), 5),
            (actions::ANSWER_CREATED.to_string(), 10),
            (actions::ANSWER_ACCEPTED.to_string(), 25),
            (actions::RECEIVED_UPVOTE.to_string(), 3),
            (actions::RECEIVED_DOWNVOTE.to_string(), -1),
            (actions::DAILY_LOGIN.to_string(), 1),
            (actions::PROFILE_COMPLETED.to_string(), 10),
        ]);

        let pcon_points = HashMap::from([
            (actions::QUESTION_SOLVED.to_string(), 2),
            (actions::ANSWER_ACCEPTED.to_string(), 5),
            (actions::ACHIEVEMENT_UNLOCKED.to_string(), 10),
        ]);

        let rank_tiers = vec![
            RankTier::new("Iniciante", 0, 0),
            RankTier::new("Colaborador", 50, 25),
            RankTier::new("Especialista", 150, 75),
            RankTier::new("Veterano", 300, 150),
            RankTier::new("Mestre", 1000, 400),
            RankTier::new("Lenda", 5000, 2000),
        ];

        let streak_milestones = HashMap::from([
            (
                StreakType::DailyLogin,
                vec![
                    StreakMilestone {
                        milestone: 7,
                        pc_bonus: 10,
                        pcon_bonus: 5,
                        badge_reward: Some("week_warrior".to_string()),
                        recheck_achievements: false,
                    },
                    StreakMilestone {
                        milestone: 30,
                        pc_bonus: 50,
                        pcon_bonus: 25,
                        badge_reward: Some("month_master".to_string()),
                        recheck_achievements: false,
                    },
                    StreakMilestone {
                        milestone: 100,
                        pc_bonus: 200,
                        pcon_bonus: 100,
                        badge_reward: None,
                        recheck_achievements: true,
                    },
                ],
            ),
            (
                StreakType::DailyActivity,
                vec![
                    StreakMilestone {
                        milestone: 14,
                        pc_bonus: 20,
                        pcon_bonus: 10,
                        badge_reward: None,
                        recheck_achievements: false,
                    },
                    StreakMilestone {
                        milestone: 60,
                        pc_bonus: 100,
                        pcon_bonus: 50,
                        badge_reward: None,
                        recheck_achievements: false,
                    },
                ],
            ),
        ]);

        let referral_rewards = HashMap::from([
            (
                ReferralMilestone::Signup,
                ReferralBonus {
                    pc_reward: 10,
                    pcon_reward: 5,
                },
            ),
            (
                ReferralMilestone::FirstQuestion,
                ReferralBonus {
                    pc_reward: 5,
                    pcon_reward: 3,
                },
            ),
            (
                ReferralMilestone::FirstAnswer,
                ReferralBonus {
                    pc_reward: 10,
                    pcon_reward: 5,
                },
            ),
            (
                ReferralMilestone::ActiveUser,
                ReferralBonus {
                    pc_reward: 25,
                    pcon_reward: 15,
                },
            ),
        ]);

        Self {
            pc_points,
            pcon_points,
            rank_tiers,
            streak_milestones,
            referral_rewards,
            leaderboard_epoch: default_leaderboard_epoch(),
            streak_inactivity_days: default_streak_inactivity_days(),
        }
    }
}

impl GamificationConfig {
    /// Loads configuration from the file named by KUDOS_CONFIG, falling
    /// back to the built-in defaults when unset or unreadable
    pub fn load() -> Self {
        let Ok(path) = std::env::var(CONFIG_PATH_ENV) else {
            info!("No {} set, using default gamification config", CONFIG_PATH_ENV);
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    info!(path = %path, "Loaded gamification config");
                    config
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Invalid gamification config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path, error = %e, "Unreadable gamification config, using defaults");
                Self::default()
            }
        }
    }

    pub fn pc_value(&self, action: &str) -> i64 {
        self.pc_points.get(action).copied().unwrap_or(0)
    }

    pub fn pcon_value(&self, action: &str) -> i64 {
        self.pcon_points.get(action).copied().unwrap_or(0)
    }

    pub fn rank_table(&self) -> RankTable {
        RankTable::new(self.rank_tiers.clone())
    }

    /// The milestone whose threshold exactly equals `count`, if any
    pub fn streak_milestone(&self, streak_type: StreakType, count: i64) -> Option<&StreakMilestone> {
        self.streak_milestones
            .get(&streak_type)?
            .iter()
            .find(|m| m.milestone == count)
    }

    /// The next milestone strictly above `count`, for progress displays
    pub fn next_streak_milestone(&self, streak_type: StreakType, count: i64) -> Option<i64> {
        self.streak_milestones
            .get(&streak_type)?
            .iter()
            .map(|m| m.milestone)
            .filter(|m| *m > count)
            .min()
    }

    pub fn referral_bonus(&self, milestone: ReferralMilestone) -> Option<ReferralBonus> {
        self.referral_rewards.get(&milestone).copied()
    }
}
