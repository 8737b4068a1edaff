use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::models::{
    LeaderboardEntry, LeaderboardModel, LeaderboardType, ScoreSource, TimeWindow,
};
use super::repository::LeaderboardRepository;
use crate::config::GamificationConfig;
use crate::content::ContentStats;
use crate::event::{EventBus, GamificationEvent};
use crate::points::repository::PointsLedgerRepository;
use crate::shared::AppError;
use crate::users::UserRepository;

/// Leaderboard generator: resolves a board type to a scoring dimension
/// and time window, computes the ranked snapshot, and swaps it into the
/// snapshot store.
pub struct LeaderboardService {
    repository: Arc<dyn LeaderboardRepository>,
    ledger: Arc<dyn PointsLedgerRepository>,
    users: Arc<dyn UserRepository>,
    content: Arc<dyn ContentStats>,
    config: Arc<GamificationConfig>,
    event_bus: EventBus,
}

impl LeaderboardService {
    pub fn new(
        repository: Arc<dyn LeaderboardRepository>,
        ledger: Arc<dyn PointsLedgerRepository>,
        users: Arc<dyn UserRepository>,
        content: Arc<dyn ContentStats>,
        config: Arc<GamificationConfig>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            repository,
            ledger,
            users,
            content,
            config,
            event_bus,
        }
    }

    /// Generates and stores a fresh snapshot for the board
    #[instrument(skip(self))]
    pub async fn generate(
        &self,
        leaderboard_type: LeaderboardType,
        limit: i64,
    ) -> Result<LeaderboardModel, AppError> {
        self.generate_at(leaderboard_type, limit, Utc::now()).await
    }

    /// Generation anchored at an explicit instant. Exposed for
    /// deterministic tests.
    pub async fn generate_at(
        &self,
        leaderboard_type: LeaderboardType,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<LeaderboardModel, AppError> {
        let window = leaderboard_type.window(now, self.config.leaderboard_epoch);
        let scores = self.resolve_scores(leaderboard_type, &window, limit).await?;
        let entries = self.build_entries(scores).await;

        let board = LeaderboardModel {
            leaderboard_type,
            entries,
            period_start: window.start,
            period_end: window.end,
            last_updated: now,
        };

        self.repository.replace_snapshot(&board).await?;

        info!(
            leaderboard_type = %leaderboard_type,
            entries = board.entries.len(),
            "Leaderboard generated"
        );
        self.event_bus.emit(GamificationEvent::LeaderboardGenerated {
            leaderboard_type: leaderboard_type.to_string(),
            entry_count: board.entries.len(),
        });

        Ok(board)
    }

    async fn resolve_scores(
        &self,
        leaderboard_type: LeaderboardType,
        window: &TimeWindow,
        limit: i64,
    ) -> Result<Vec<(String, i64)>, AppError> {
        match leaderboard_type.score_source() {
            ScoreSource::WindowedPoints(kind) => {
                self.ledger
                    .sum_deltas_by_user(kind, window.start, window.end, limit)
                    .await
            }
            ScoreSource::StoredPoints(kind) => {
                let users = self.users.top_by_points(kind, limit).await?;
                Ok(users
                    .into_iter()
                    .map(|user| {
                        let score = match kind {
                            crate::points::models::PointKind::Pc => user.pc_points,
                            crate::points::models::PointKind::Pcon => user.pcon_points,
                        };
                        (user.id, score)
                    })
                    .collect())
            }
            ScoreSource::AnswerCount { accepted_only } => {
                self.content
                    .top_answer_authors(window.start, window.end, accepted_only, limit)
                    .await
            }
        }
    }

    /// Enriches ranked (user, score) pairs with username and rank.
    /// Users that vanished from the user store keep their row with a
    /// placeholder name.
    async fn build_entries(&self, scores: Vec<(String, i64)>) -> Vec<LeaderboardEntry> {
        let mut entries = Vec::with_capacity(scores.len());

        for (index, (user_id, score)) in scores.into_iter().enumerate() {
            let (username, rank) = match self.users.get_user(&user_id).await {
                Ok(Some(user)) => (user.username, Some(user.rank)),
                Ok(None) => ("Unknown".to_string(), None),
                Err(e) => {
                    error!(error = %e, user_id = %user_id, "Failed to enrich leaderboard entry");
                    ("Unknown".to_string(), None)
                }
            };

            entries.push(LeaderboardEntry {
                position: (index + 1) as i64,
                user_id,
                username,
                score,
                rank,
                badges: Vec::new(),
            });
        }

        entries
    }

    /// The stored snapshot, if one has been generated. Advisory data:
    /// failures degrade to None.
    #[instrument(skip(self))]
    pub async fn get_snapshot(
        &self,
        leaderboard_type: LeaderboardType,
    ) -> Option<LeaderboardModel> {
        match self.repository.get_snapshot(leaderboard_type).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Failed to load leaderboard snapshot");
                None
            }
        }
    }

    /// Linear scan of the stored snapshot for the user's position;
    /// None when absent or when no snapshot exists yet
    #[instrument(skip(self))]
    pub async fn user_position(
        &self,
        user_id: &str,
        leaderboard_type: LeaderboardType,
    ) -> Option<i64> {
        self.user_entry(user_id, leaderboard_type)
            .await
            .map(|entry| entry.position)
    }

    /// The user's full snapshot row, for dashboards
    pub async fn user_entry(
        &self,
        user_id: &str,
        leaderboard_type: LeaderboardType,
    ) -> Option<LeaderboardEntry> {
        let snapshot = self.get_snapshot(leaderboard_type).await?;
        snapshot
            .entries
            .into_iter()
            .find(|entry| entry.user_id == user_id)
    }
}
