use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use super::catalog::default_achievements;
use super::models::{
    Achievement, AchievementCriteria, AchievementFilters, AchievementProgress,
    UserAchievementModel, UserStatistics,
};
use super::repository::{AchievementAwardOutcome, AchievementRepository};
use crate::content::ContentStats;
use crate::event::{EventBus, GamificationEvent};
use crate::leaderboards::models::LeaderboardType;
use crate::leaderboards::repository::LeaderboardRepository;
use crate::shared::AppError;
use crate::streaks::models::StreakType;
use crate::streaks::repository::StreakRepository;
use crate::users::UserRepository;

/// Achievement engine: snapshots user statistics, evaluates catalog
/// criteria, and records earns exactly once. Reward payouts are
/// orchestrated by the engine facade so the evaluation pass cannot
/// re-enter itself.
pub struct AchievementService {
    repository: Arc<dyn AchievementRepository>,
    users: Arc<dyn UserRepository>,
    content: Arc<dyn ContentStats>,
    streaks: Arc<dyn StreakRepository>,
    leaderboards: Arc<dyn LeaderboardRepository>,
    event_bus: EventBus,
}

fn or_zero(result: Result<i64, AppError>, field: &str, user_id: &str) -> i64 {
    match result {
        Ok(value) => value,
        Err(e) => {
            // A failed statistic must not abort the whole pass; the
            // criterion fails naturally at zero
            warn!(error = %e, field = %field, user_id = %user_id, "Statistic unavailable, using 0");
            0
        }
    }
}

impl AchievementService {
    pub fn new(
        repository: Arc<dyn AchievementRepository>,
        users: Arc<dyn UserRepository>,
        content: Arc<dyn ContentStats>,
        streaks: Arc<dyn StreakRepository>,
        leaderboards: Arc<dyn LeaderboardRepository>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            repository,
            users,
            content,
            streaks,
            leaderboards,
            event_bus,
        }
    }

    /// Seeds the built-in catalog; safe to call repeatedly
    #[instrument(skip(self))]
    pub async fn initialize_achievements(&self) -> Result<usize, AppError> {
        let mut inserted = 0;
        for achievement in default_achievements() {
            if self
                .repository
                .insert_achievement_if_absent(&achievement)
                .await?
            {
                inserted += 1;
            }
        }
        info!(inserted, "Achievement catalog initialized");
        Ok(inserted)
    }

    /// The whole catalog in sort order, for administrative listings
    pub async fn list_achievements(&self) -> Result<Vec<Achievement>, AppError> {
        self.repository.list_achievements().await
    }

    /// Builds a fresh statistics snapshot for the user, or None when the
    /// user does not exist. Individual statistic failures degrade to 0.
    #[instrument(skip(self, boards))]
    pub async fn collect_statistics(
        &self,
        user_id: &str,
        boards: &HashSet<LeaderboardType>,
    ) -> Result<Option<UserStatistics>, AppError> {
        let Some(user) = self.users.get_user(user_id).await? else {
            return Ok(None);
        };

        let questions_created = or_zero(
            self.content.questions_created(user_id).await,
            "questions_created",
            user_id,
        );
        let answers_created = or_zero(
            self.content.answers_created(user_id).await,
            "answers_created",
            user_id,
        );
        let accepted_answers = or_zero(
            self.content.accepted_answers(user_id).await,
            "accepted_answers",
            user_id,
        );
        let total_upvotes = or_zero(
            self.content.upvotes_received(user_id).await,
            "total_upvotes",
            user_id,
        );

        let streaks: HashMap<StreakType, i64> = match self.streaks.user_streaks(user_id).await {
            Ok(streaks) => streaks
                .into_iter()
                .map(|s| (s.streak_type, s.current_count))
                .collect(),
            Err(e) => {
                warn!(error = %e, user_id = %user_id, "Streaks unavailable, using empty set");
                HashMap::new()
            }
        };

        let mut leaderboard_positions = HashMap::new();
        for board in boards {
            match self.leaderboards.get_snapshot(*board).await {
                Ok(Some(snapshot)) => {
                    if let Some(entry) =
                        snapshot.entries.iter().find(|entry| entry.user_id == user_id)
                    {
                        leaderboard_positions.insert(*board, entry.position);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, board = %board, "Leaderboard snapshot unavailable");
                }
            }
        }

        let days_since_registration =
            (chrono::Utc::now() - user.created_at).num_days().max(0);

        Ok(Some(UserStatistics {
            user_id: user_id.to_string(),
            pc_points: user.pc_points,
            pcon_points: user.pcon_points,
            questions_created,
            answers_created,
            accepted_answers,
            total_upvotes,
            followers: user.followers,
            following: user.following,
            days_since_registration,
            streaks,
            leaderboard_positions,
        }))
    }

    /// Evaluates every catalog achievement against a fresh snapshot and
    /// records the newly satisfied ones. Returns the earns made by this
    /// call, paired with their definitions for reward payout.
    #[instrument(skip(self))]
    pub async fn check_achievements(
        &self,
        user_id: &str,
    ) -> Result<Vec<(UserAchievementModel, Achievement)>, AppError> {
        let achievements = self.repository.list_achievements().await?;

        let Some(stats) = self
            .collect_statistics(user_id, &referenced_boards(&achievements))
            .await?
        else {
            return Ok(Vec::new());
        };

        let earned_ids: HashSet<String> = self
            .repository
            .earned_by_user(user_id)
            .await?
            .into_iter()
            .map(|record| record.achievement_id)
            .collect();

        let mut newly_earned = Vec::new();

        for achievement in achievements {
            if earned_ids.contains(&achievement.id) && !achievement.is_repeatable {
                continue;
            }
            if !achievement.criteria.is_satisfied_by(&stats) {
                continue;
            }

            let record = UserAchievementModel::earned(
                user_id,
                &achievement.id,
                achievement.criteria.target_value(),
            );

            match self
                .repository
                .try_award(&record, achievement.is_repeatable)
                .await?
            {
                AchievementAwardOutcome::Awarded(record) => {
                    info!(
                        user_id = %user_id,
                        achievement = %achievement.name,
                        "Achievement earned"
                    );
                    self.event_bus.emit(GamificationEvent::AchievementEarned {
                        user_id: user_id.to_string(),
                        achievement_id: achievement.id.clone(),
                    });
                    newly_earned.push((record, achievement));
                }
                // A concurrent pass recorded it first; no double payout
                AchievementAwardOutcome::AlreadyEarned(_) => {}
            }
        }

        Ok(newly_earned)
    }

    /// Progress across the catalog, filtered, unearned-first then by
    /// descending percentage. Advisory data: failures degrade to empty.
    #[instrument(skip(self, filters))]
    pub async fn get_user_achievement_progress(
        &self,
        user_id: &str,
        filters: &AchievementFilters,
    ) -> Vec<AchievementProgress> {
        let achievements = match self.repository.list_achievements().await {
            Ok(achievements) => achievements,
            Err(e) => {
                error!(error = %e, "Failed to load achievement catalog");
                return Vec::new();
            }
        };

        let stats = match self
            .collect_statistics(user_id, &referenced_boards(&achievements))
            .await
        {
            Ok(Some(stats)) => stats,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!(error = %e, user_id = %user_id, "Failed to snapshot statistics");
                return Vec::new();
            }
        };

        let earned: HashMap<String, UserAchievementModel> =
            match self.repository.earned_by_user(user_id).await {
                Ok(records) => records
                    .into_iter()
                    .map(|record| (record.achievement_id.clone(), record))
                    .collect(),
                Err(e) => {
                    error!(error = %e, user_id = %user_id, "Failed to load earned achievements");
                    HashMap::new()
                }
            };

        let mut progress_list: Vec<AchievementProgress> = achievements
            .into_iter()
            .filter(|a| filters.category.map_or(true, |c| a.category == c))
            .filter(|a| filters.rarity.map_or(true, |r| a.rarity == r))
            .filter(|a| filters.is_hidden.map_or(true, |h| a.is_hidden == h))
            .filter(|a| match &filters.search {
                Some(search) => {
                    let needle = search.to_lowercase();
                    a.name.to_lowercase().contains(&needle)
                        || a.description.to_lowercase().contains(&needle)
                }
                None => true,
            })
            .map(|achievement| {
                let record = earned.get(&achievement.id);
                let is_earned = record.is_some();
                let target = achievement.criteria.target_value();
                let current = achievement.criteria.progress_in(&stats).min(target);
                let percentage = ((current as f64 / target as f64) * 100.0).min(100.0);

                AchievementProgress {
                    current_progress: current,
                    target_progress: target,
                    percentage,
                    is_earned,
                    earned_at: record.and_then(|r| r.earned_at),
                    achievement,
                }
            })
            .filter(|p| filters.is_earned.map_or(true, |e| p.is_earned == e))
            .collect();

        progress_list.sort_by(|a, b| {
            a.is_earned.cmp(&b.is_earned).then_with(|| {
                b.percentage
                    .partial_cmp(&a.percentage)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        progress_list
    }

    /// The user's most recent earns joined with their definitions
    pub async fn recent_earned(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Vec<(UserAchievementModel, Achievement)> {
        let records = match self.repository.earned_by_user(user_id).await {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, user_id = %user_id, "Failed to load earned achievements");
                return Vec::new();
            }
        };

        let mut joined = Vec::new();
        for record in records.into_iter().take(limit) {
            match self.repository.get_achievement(&record.achievement_id).await {
                Ok(Some(achievement)) => joined.push((record, achievement)),
                Ok(None) => {
                    warn!(
                        achievement_id = %record.achievement_id,
                        "Earned achievement missing from catalog"
                    );
                }
                Err(e) => error!(error = %e, "Failed to join achievement definition"),
            }
        }
        joined
    }

    pub async fn earned_count_for(&self, user_id: &str) -> usize {
        self.repository
            .earned_by_user(user_id)
            .await
            .map(|records| records.len())
            .unwrap_or(0)
    }

    pub async fn total_earned(&self) -> i64 {
        self.repository.count_earned().await.unwrap_or(0)
    }
}

/// Leaderboard types referenced by catalog criteria; only these snapshots
/// are loaded during a pass
fn referenced_boards(achievements: &[Achievement]) -> HashSet<LeaderboardType> {
    achievements
        .iter()
        .filter_map(|a| match a.criteria {
            AchievementCriteria::LeaderboardPosition { board, .. } => Some(board),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::InMemoryContentStats;
    use crate::leaderboards::repository::InMemoryLeaderboardRepository;
    use crate::streaks::repository::InMemoryStreakRepository;
    use crate::users::{InMemoryUserRepository, UserModel};

    struct Fixture {
        service: AchievementService,
        users: Arc<InMemoryUserRepository>,
        content: Arc<InMemoryContentStats>,
        streaks: Arc<InMemoryStreakRepository>,
    }

    async fn fixture() -> Fixture {
        let users = Arc::new(InMemoryUserRepository::with_users(vec![UserModel::new(
            "u1".to_string(),
            "user-u1".to_string(),
            "Iniciante",
        )]));
        let content = Arc::new(InMemoryContentStats::new());
        let streaks = Arc::new(InMemoryStreakRepository::new());
        let service = AchievementService::new(
            Arc::new(InMemoryAchievementRepository::new()),
            users.clone(),
            content.clone(),
            streaks.clone(),
            Arc::new(InMemoryLeaderboardRepository::new()),
            EventBus::with_default_capacity(),
        );
        service.initialize_achievements().await.unwrap();
        Fixture {
            service,
            users,
            content,
            streaks,
        }
    }

    use crate::achievements::repository::InMemoryAchievementRepository;

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let fx = fixture().await;
        let second = fx.service.initialize_achievements().await.unwrap();
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn first_answer_is_earned_once() {
        let fx = fixture().await;
        fx.content.record_answer("u1", false, chrono::Utc::now());

        let earned = fx.service.check_achievements("u1").await.unwrap();
        assert_eq!(earned.len(), 1);
        assert_eq!(earned[0].1.id, "first_answer");

        let again = fx.service.check_achievements("u1").await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn unknown_user_earns_nothing() {
        let fx = fixture().await;
        let earned = fx.service.check_achievements("ghost").await.unwrap();
        assert!(earned.is_empty());
    }

    #[tokio::test]
    async fn social_criterion_needs_every_condition() {
        let fx = fixture().await;
        fx.users.set_social_counts("u1", 25, 24);

        let earned = fx.service.check_achievements("u1").await.unwrap();
        assert!(earned.iter().all(|(_, a)| a.id != "social_butterfly"));

        fx.users.set_social_counts("u1", 25, 25);
        let earned = fx.service.check_achievements("u1").await.unwrap();
        assert!(earned.iter().any(|(_, a)| a.id == "social_butterfly"));
    }

    #[tokio::test]
    async fn streak_criterion_reads_streak_state() {
        let fx = fixture().await;
        let today = chrono::Utc::now().date_naive();

        for offset in (0..7).rev() {
            fx.streaks
                .record_activity(
                    "u1",
                    StreakType::DailyLogin,
                    today - chrono::Duration::days(offset),
                )
                .await
                .unwrap();
        }

        let earned = fx.service.check_achievements("u1").await.unwrap();
        assert!(earned.iter().any(|(_, a)| a.id == "week_warrior"));
    }

    #[tokio::test]
    async fn progress_sorts_unearned_first_by_percentage() {
        let fx = fixture().await;
        fx.content.record_answer("u1", false, chrono::Utc::now());
        fx.content.set_questions_created("u1", 0);

        // Earn first_answer, leave everything else in progress
        fx.service.check_achievements("u1").await.unwrap();
        fx.content.record_answer("u1", true, chrono::Utc::now());

        let progress = fx
            .service
            .get_user_achievement_progress("u1", &AchievementFilters::default())
            .await;

        assert!(!progress.is_empty());
        let first_earned_index = progress.iter().position(|p| p.is_earned).unwrap();
        assert!(progress[..first_earned_index].iter().all(|p| !p.is_earned));
        for pair in progress[..first_earned_index].windows(2) {
            assert!(pair[0].percentage >= pair[1].percentage);
        }
    }

    #[tokio::test]
    async fn progress_percentage_caps_at_100() {
        let fx = fixture().await;
        fx.content.set_questions_created("u1", 40);

        let progress = fx
            .service
            .get_user_achievement_progress("u1", &AchievementFilters::default())
            .await;

        let first_question = progress
            .iter()
            .find(|p| p.achievement.id == "first_question")
            .unwrap();
        assert_eq!(first_question.current_progress, 1);
        assert_eq!(first_question.percentage, 100.0);
    }
}
