use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{LeaderboardModel, LeaderboardType};
use crate::shared::AppError;

/// Trait for leaderboard snapshot storage: one current snapshot per type
#[async_trait]
pub trait LeaderboardRepository: Send + Sync {
    /// Atomically replaces the stored snapshot for the board's type
    async fn replace_snapshot(&self, board: &LeaderboardModel) -> Result<(), AppError>;

    async fn get_snapshot(
        &self,
        leaderboard_type: LeaderboardType,
    ) -> Result<Option<LeaderboardModel>, AppError>;
}

/// In-memory implementation of LeaderboardRepository for development and
/// testing
#[derive(Default)]
pub struct InMemoryLeaderboardRepository {
    snapshots: Mutex<HashMap<LeaderboardType, LeaderboardModel>>,
}

impl InMemoryLeaderboardRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LeaderboardRepository for InMemoryLeaderboardRepository {
    #[instrument(skip(self, board))]
    async fn replace_snapshot(&self, board: &LeaderboardModel) -> Result<(), AppError> {
        let mut snapshots = self.snapshots.lock().unwrap();
        debug!(
            leaderboard_type = %board.leaderboard_type,
            entries = board.entries.len(),
            "Replacing leaderboard snapshot in memory"
        );
        snapshots.insert(board.leaderboard_type, board.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_snapshot(
        &self,
        leaderboard_type: LeaderboardType,
    ) -> Result<Option<LeaderboardModel>, AppError> {
        let snapshots = self.snapshots.lock().unwrap();
        Ok(snapshots.get(&leaderboard_type).cloned())
    }
}

/// PostgreSQL implementation of leaderboard snapshot storage
///
/// The snapshot is one JSONB document per type; the upsert swaps it in a
/// single statement so readers never observe a half-written board.
pub struct PostgresLeaderboardRepository {
    pool: PgPool,
}

impl PostgresLeaderboardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaderboardRepository for PostgresLeaderboardRepository {
    #[instrument(skip(self, board))]
    async fn replace_snapshot(&self, board: &LeaderboardModel) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO leaderboards (leaderboard_type, snapshot, last_updated) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (leaderboard_type) \
             DO UPDATE SET snapshot = EXCLUDED.snapshot, last_updated = EXCLUDED.last_updated",
        )
        .bind(board.leaderboard_type.to_string())
        .bind(Json(board))
        .bind(board.last_updated)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to replace leaderboard snapshot");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_snapshot(
        &self,
        leaderboard_type: LeaderboardType,
    ) -> Result<Option<LeaderboardModel>, AppError> {
        let row = sqlx::query("SELECT snapshot FROM leaderboards WHERE leaderboard_type = $1")
            .bind(leaderboard_type.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to fetch leaderboard snapshot");
                AppError::DatabaseError(e.to_string())
            })?;

        Ok(row.map(|r| {
            let Json(board): Json<LeaderboardModel> = r.get("snapshot");
            board
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(leaderboard_type: LeaderboardType, scores: Vec<(&str, i64)>) -> LeaderboardModel {
        let now = Utc::now();
        LeaderboardModel {
            leaderboard_type,
            entries: scores
                .into_iter()
                .enumerate()
                .map(|(i, (user_id, score))| super::super::models::LeaderboardEntry {
                    position: (i + 1) as i64,
                    user_id: user_id.to_string(),
                    username: user_id.to_string(),
                    score,
                    rank: None,
                    badges: Vec::new(),
                })
                .collect(),
            period_start: now,
            period_end: now,
            last_updated: now,
        }
    }

    #[tokio::test]
    async fn replace_overwrites_previous_snapshot() {
        let repo = InMemoryLeaderboardRepository::new();

        repo.replace_snapshot(&snapshot(LeaderboardType::WeeklyPc, vec![("a", 10)]))
            .await
            .unwrap();
        repo.replace_snapshot(&snapshot(LeaderboardType::WeeklyPc, vec![("b", 20)]))
            .await
            .unwrap();

        let stored = repo
            .get_snapshot(LeaderboardType::WeeklyPc)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.entries.len(), 1);
        assert_eq!(stored.entries[0].user_id, "b");
    }

    #[tokio::test]
    async fn snapshots_are_independent_per_type() {
        let repo = InMemoryLeaderboardRepository::new();

        repo.replace_snapshot(&snapshot(LeaderboardType::WeeklyPc, vec![("a", 10)]))
            .await
            .unwrap();

        assert!(repo
            .get_snapshot(LeaderboardType::MonthlyPc)
            .await
            .unwrap()
            .is_none());
    }
}
