use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{StreakModel, StreakTransition, StreakType};
use crate::shared::AppError;

/// Trait for streak persistence
///
/// `record_activity` owns the whole read-advance-write cycle so two
/// concurrent activity events for the same (user, streak type) can never
/// double-increment a day.
#[async_trait]
pub trait StreakRepository: Send + Sync {
    /// Applies the day state machine for an activity on `today`,
    /// creating the streak when it does not exist yet
    async fn record_activity(
        &self,
        user_id: &str,
        streak_type: StreakType,
        today: NaiveDate,
    ) -> Result<(StreakModel, StreakTransition), AppError>;

    async fn get_streak(
        &self,
        user_id: &str,
        streak_type: StreakType,
    ) -> Result<Option<StreakModel>, AppError>;

    async fn user_streaks(&self, user_id: &str) -> Result<Vec<StreakModel>, AppError>;

    /// Flags streaks with no activity since `cutoff` as inactive without
    /// touching their counters. Returns how many were flagged.
    async fn deactivate_stale(&self, cutoff: NaiveDate) -> Result<u64, AppError>;

    async fn count_active(&self) -> Result<i64, AppError>;
}

/// In-memory implementation of StreakRepository for development and testing
#[derive(Default)]
pub struct InMemoryStreakRepository {
    streaks: Mutex<HashMap<(String, StreakType), StreakModel>>,
}

impl InMemoryStreakRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StreakRepository for InMemoryStreakRepository {
    #[instrument(skip(self))]
    async fn record_activity(
        &self,
        user_id: &str,
        streak_type: StreakType,
        today: NaiveDate,
    ) -> Result<(StreakModel, StreakTransition), AppError> {
        let mut streaks = self.streaks.lock().unwrap();
        let key = (user_id.to_string(), streak_type);

        match streaks.get_mut(&key) {
            Some(streak) => {
                let transition = streak.advance(today);
                debug!(
                    user_id = %user_id,
                    streak_type = %streak_type,
                    current = streak.current_count,
                    ?transition,
                    "Streak activity recorded in memory"
                );
                Ok((streak.clone(), transition))
            }
            None => {
                let streak = StreakModel::start(user_id, streak_type, today);
                streaks.insert(key, streak.clone());
                Ok((streak, StreakTransition::Started))
            }
        }
    }

    #[instrument(skip(self))]
    async fn get_streak(
        &self,
        user_id: &str,
        streak_type: StreakType,
    ) -> Result<Option<StreakModel>, AppError> {
        let streaks = self.streaks.lock().unwrap();
        Ok(streaks.get(&(user_id.to_string(), streak_type)).cloned())
    }

    #[instrument(skip(self))]
    async fn user_streaks(&self, user_id: &str) -> Result<Vec<StreakModel>, AppError> {
        let streaks = self.streaks.lock().unwrap();
        let mut result: Vec<StreakModel> = streaks
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        result.sort_by_key(|s| s.streak_type.to_string());
        Ok(result)
    }

    #[instrument(skip(self))]
    async fn deactivate_stale(&self, cutoff: NaiveDate) -> Result<u64, AppError> {
        let mut streaks = self.streaks.lock().unwrap();
        let mut flagged = 0;
        for streak in streaks.values_mut() {
            if streak.is_active && streak.last_activity_date < cutoff {
                streak.is_active = false;
                streak.updated_at = chrono::Utc::now();
                flagged += 1;
            }
        }
        Ok(flagged)
    }

    #[instrument(skip(self))]
    async fn count_active(&self) -> Result<i64, AppError> {
        let streaks = self.streaks.lock().unwrap();
        Ok(streaks.values().filter(|s| s.is_active).count() as i64)
    }
}

/// PostgreSQL implementation of streak repository
pub struct PostgresStreakRepository {
    pool: PgPool,
}

impl PostgresStreakRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_streak(row: &sqlx::postgres::PgRow) -> Result<StreakModel, AppError> {
    let streak_type: String = row.get("streak_type");
    Ok(StreakModel {
        id: row.get("id"),
        user_id: row.get("user_id"),
        streak_type: StreakType::parse(&streak_type)
            .ok_or_else(|| AppError::DatabaseError(format!("Unknown streak type {streak_type}")))?,
        current_count: row.get("current_count"),
        best_count: row.get("best_count"),
        last_activity_date: row.get("last_activity_date"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

const STREAK_COLUMNS: &str = "id, user_id, streak_type, current_count, best_count, \
                              last_activity_date, is_active, created_at, updated_at";

#[async_trait]
impl StreakRepository for PostgresStreakRepository {
    #[instrument(skip(self))]
    async fn record_activity(
        &self,
        user_id: &str,
        streak_type: StreakType,
        today: NaiveDate,
    ) -> Result<(StreakModel, StreakTransition), AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            warn!(error = %e, "Failed to begin streak transaction");
            AppError::DatabaseError(e.to_string())
        })?;

        // Row lock serializes concurrent activity events for the same
        // (user, streak type)
        let select = format!(
            "SELECT {STREAK_COLUMNS} FROM streaks \
             WHERE user_id = $1 AND streak_type = $2 FOR UPDATE"
        );
        let mut row = sqlx::query(&select)
            .bind(user_id)
            .bind(streak_type.to_string())
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to lock streak row");
                AppError::DatabaseError(e.to_string())
            })?;

        if row.is_none() {
            let fresh = StreakModel::start(user_id, streak_type, today);
            let inserted = sqlx::query(
                "INSERT INTO streaks (id, user_id, streak_type, current_count, best_count, \
                                      last_activity_date, is_active, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
                 ON CONFLICT (user_id, streak_type) DO NOTHING",
            )
            .bind(&fresh.id)
            .bind(&fresh.user_id)
            .bind(streak_type.to_string())
            .bind(fresh.current_count)
            .bind(fresh.best_count)
            .bind(fresh.last_activity_date)
            .bind(fresh.is_active)
            .bind(fresh.created_at)
            .bind(fresh.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to insert streak");
                AppError::DatabaseError(e.to_string())
            })?;

            if inserted.rows_affected() > 0 {
                tx.commit().await.map_err(|e| {
                    warn!(error = %e, "Failed to commit streak transaction");
                    AppError::DatabaseError(e.to_string())
                })?;
                return Ok((fresh, StreakTransition::Started));
            }

            // Another transaction created the row first; lock and advance it
            row = sqlx::query(&select)
                .bind(user_id)
                .bind(streak_type.to_string())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    warn!(error = %e, "Failed to re-lock streak row");
                    AppError::DatabaseError(e.to_string())
                })?;
        }

        let row = row.ok_or_else(|| {
            AppError::DatabaseError("Streak row vanished during update".to_string())
        })?;
        let mut streak = row_to_streak(&row)?;
        let transition = streak.advance(today);

        sqlx::query(
            "UPDATE streaks SET current_count = $2, best_count = $3, last_activity_date = $4, \
                                is_active = $5, updated_at = $6 \
             WHERE id = $1",
        )
        .bind(&streak.id)
        .bind(streak.current_count)
        .bind(streak.best_count)
        .bind(streak.last_activity_date)
        .bind(streak.is_active)
        .bind(streak.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to update streak");
            AppError::DatabaseError(e.to_string())
        })?;

        tx.commit().await.map_err(|e| {
            warn!(error = %e, "Failed to commit streak transaction");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok((streak, transition))
    }

    #[instrument(skip(self))]
    async fn get_streak(
        &self,
        user_id: &str,
        streak_type: StreakType,
    ) -> Result<Option<StreakModel>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {STREAK_COLUMNS} FROM streaks WHERE user_id = $1 AND streak_type = $2"
        ))
        .bind(user_id)
        .bind(streak_type.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch streak");
            AppError::DatabaseError(e.to_string())
        })?;

        row.map(|r| row_to_streak(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn user_streaks(&self, user_id: &str) -> Result<Vec<StreakModel>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {STREAK_COLUMNS} FROM streaks WHERE user_id = $1 ORDER BY streak_type ASC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to list streaks");
            AppError::DatabaseError(e.to_string())
        })?;

        rows.iter().map(row_to_streak).collect()
    }

    #[instrument(skip(self))]
    async fn deactivate_stale(&self, cutoff: NaiveDate) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE streaks SET is_active = FALSE, updated_at = NOW() \
             WHERE is_active AND last_activity_date < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to deactivate stale streaks");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn count_active(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM streaks WHERE is_active")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to count active streaks");
                AppError::DatabaseError(e.to_string())
            })?;

        Ok(row.get("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    #[tokio::test]
    async fn first_activity_starts_at_one() {
        let repo = InMemoryStreakRepository::new();

        let (streak, transition) = repo
            .record_activity("u1", StreakType::DailyLogin, today())
            .await
            .unwrap();

        assert_eq!(transition, StreakTransition::Started);
        assert_eq!(streak.current_count, 1);
        assert_eq!(streak.best_count, 1);
    }

    #[tokio::test]
    async fn same_day_activity_is_idempotent() {
        let repo = InMemoryStreakRepository::new();

        repo.record_activity("u1", StreakType::DailyLogin, today())
            .await
            .unwrap();
        let (streak, transition) = repo
            .record_activity("u1", StreakType::DailyLogin, today())
            .await
            .unwrap();

        assert_eq!(transition, StreakTransition::AlreadyCountedToday);
        assert_eq!(streak.current_count, 1);
    }

    #[tokio::test]
    async fn consecutive_days_extend_the_run() {
        let repo = InMemoryStreakRepository::new();
        let start = today() - Duration::days(2);

        repo.record_activity("u1", StreakType::DailyActivity, start)
            .await
            .unwrap();
        repo.record_activity("u1", StreakType::DailyActivity, start + Duration::days(1))
            .await
            .unwrap();
        let (streak, transition) = repo
            .record_activity("u1", StreakType::DailyActivity, start + Duration::days(2))
            .await
            .unwrap();

        assert_eq!(transition, StreakTransition::Extended);
        assert_eq!(streak.current_count, 3);
        assert_eq!(streak.best_count, 3);
    }

    #[tokio::test]
    async fn sweep_flags_stale_without_resetting_counts() {
        let repo = InMemoryStreakRepository::new();
        let long_ago = today() - Duration::days(40);

        repo.record_activity("u1", StreakType::DailyLogin, long_ago)
            .await
            .unwrap();
        repo.record_activity("u2", StreakType::DailyLogin, today())
            .await
            .unwrap();

        let flagged = repo
            .deactivate_stale(today() - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(flagged, 1);

        let stale = repo
            .get_streak("u1", StreakType::DailyLogin)
            .await
            .unwrap()
            .unwrap();
        assert!(!stale.is_active);
        assert_eq!(stale.current_count, 1);
        assert_eq!(repo.count_active().await.unwrap(), 1);
    }
}
