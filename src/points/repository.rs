use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::{Arc, Mutex};
use tracing::{debug, instrument, warn};

use super::models::{PointKind, PointsDistribution, PointsEntryModel, TargetRef};
use crate::shared::AppError;
use crate::users::InMemoryUserRepository;

/// Trait for the points ledger: user totals and the append-only history
/// written together as one unit
#[async_trait]
pub trait PointsLedgerRepository: Send + Sync {
    /// Atomically applies the clamped deltas to the user's totals and
    /// appends the history entry carrying the post-change totals.
    /// Fails with NotFound (and writes nothing) when the user is unknown.
    async fn record_award(
        &self,
        user_id: &str,
        action: &str,
        pc_delta: i64,
        pcon_delta: i64,
        target: Option<&TargetRef>,
    ) -> Result<PointsEntryModel, AppError>;

    /// A user's history, most recent first
    async fn list_recent(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<PointsEntryModel>, AppError>;

    /// Per-user delta sums over a half-open time window, highest first,
    /// ties broken by ascending user id. Feeds the windowed leaderboards.
    async fn sum_deltas_by_user(
        &self,
        kind: PointKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<(String, i64)>, AppError>;

    /// Whether the user already has an entry for the action on the given
    /// UTC calendar day
    async fn has_action_on_day(
        &self,
        user_id: &str,
        action: &str,
        day: chrono::NaiveDate,
    ) -> Result<bool, AppError>;

    /// Ledger-wide distribution totals
    async fn distribution_totals(&self) -> Result<PointsDistribution, AppError>;
}

/// In-memory implementation of the points ledger for development and testing
///
/// Shares the user map with the in-memory user repository so totals and
/// history stay consistent; the award gate serializes whole awards.
pub struct InMemoryPointsLedger {
    users: Arc<InMemoryUserRepository>,
    entries: Mutex<Vec<PointsEntryModel>>,
    award_gate: Mutex<()>,
}

impl InMemoryPointsLedger {
    pub fn new(users: Arc<InMemoryUserRepository>) -> Self {
        Self {
            users,
            entries: Mutex::new(Vec::new()),
            award_gate: Mutex::new(()),
        }
    }

    /// Returns the total number of ledger entries
    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl PointsLedgerRepository for InMemoryPointsLedger {
    #[instrument(skip(self, target))]
    async fn record_award(
        &self,
        user_id: &str,
        action: &str,
        pc_delta: i64,
        pcon_delta: i64,
        target: Option<&TargetRef>,
    ) -> Result<PointsEntryModel, AppError> {
        debug!(user_id = %user_id, action = %action, "Recording award in memory");

        let _gate = self.award_gate.lock().unwrap();

        let (pc_total, pcon_total) = self
            .users
            .apply_points_delta(user_id, pc_delta, pcon_delta)
            .ok_or_else(|| {
                warn!(user_id = %user_id, "User not found for award");
                AppError::NotFound("User not found".to_string())
            })?;

        let entry = PointsEntryModel::new(
            user_id, action, pc_delta, pcon_delta, pc_total, pcon_total, target,
        );
        self.entries.lock().unwrap().push(entry.clone());

        Ok(entry)
    }

    #[instrument(skip(self))]
    async fn list_recent(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<PointsEntryModel>, AppError> {
        let entries = self.entries.lock().unwrap();
        let mut recent: Vec<PointsEntryModel> = entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(limit.max(0) as usize);
        Ok(recent)
    }

    #[instrument(skip(self))]
    async fn sum_deltas_by_user(
        &self,
        kind: PointKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<(String, i64)>, AppError> {
        let entries = self.entries.lock().unwrap();
        let mut totals: std::collections::HashMap<String, i64> = std::collections::HashMap::new();

        for entry in entries
            .iter()
            .filter(|e| e.created_at >= start && e.created_at < end)
        {
            let delta = match kind {
                PointKind::Pc => entry.pc_points_change,
                PointKind::Pcon => entry.pcon_points_change,
            };
            *totals.entry(entry.user_id.clone()).or_insert(0) += delta;
        }

        let mut ranked: Vec<(String, i64)> = totals.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit.max(0) as usize);
        Ok(ranked)
    }

    #[instrument(skip(self))]
    async fn has_action_on_day(
        &self,
        user_id: &str,
        action: &str,
        day: chrono::NaiveDate,
    ) -> Result<bool, AppError> {
        let entries = self.entries.lock().unwrap();
        Ok(entries.iter().any(|e| {
            e.user_id == user_id && e.action == action && e.created_at.date_naive() == day
        }))
    }

    #[instrument(skip(self))]
    async fn distribution_totals(&self) -> Result<PointsDistribution, AppError> {
        let entries = self.entries.lock().unwrap();
        Ok(PointsDistribution {
            total_pc_distributed: entries.iter().map(|e| e.pc_points_change).sum(),
            total_pcon_distributed: entries.iter().map(|e| e.pcon_points_change).sum(),
            total_transactions: entries.len() as i64,
        })
    }
}

/// PostgreSQL implementation of the points ledger
pub struct PostgresPointsLedger {
    pool: PgPool,
}

impl PostgresPointsLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &sqlx::postgres::PgRow) -> PointsEntryModel {
    PointsEntryModel {
        id: row.get("id"),
        user_id: row.get("user_id"),
        action: row.get("action"),
        pc_points_change: row.get("pc_points_change"),
        pcon_points_change: row.get("pcon_points_change"),
        pc_points_total: row.get("pc_points_total"),
        pcon_points_total: row.get("pcon_points_total"),
        target_id: row.get("target_id"),
        target_type: row.get("target_type"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl PointsLedgerRepository for PostgresPointsLedger {
    #[instrument(skip(self, target))]
    async fn record_award(
        &self,
        user_id: &str,
        action: &str,
        pc_delta: i64,
        pcon_delta: i64,
        target: Option<&TargetRef>,
    ) -> Result<PointsEntryModel, AppError> {
        debug!(user_id = %user_id, action = %action, "Recording award in database");

        let mut tx = self.pool.begin().await.map_err(|e| {
            warn!(error = %e, "Failed to begin award transaction");
            AppError::DatabaseError(e.to_string())
        })?;

        // Clamped increment in one statement so concurrent awards never
        // lose an update
        let row = sqlx::query(
            "UPDATE users SET \
                 pc_points = GREATEST(0, pc_points + $2), \
                 pcon_points = GREATEST(0, pcon_points + $3), \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING pc_points, pcon_points",
        )
        .bind(user_id)
        .bind(pc_delta)
        .bind(pcon_delta)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to adjust user totals");
            AppError::DatabaseError(e.to_string())
        })?;

        let row = match row {
            Some(row) => row,
            None => {
                warn!(user_id = %user_id, "User not found for award");
                return Err(AppError::NotFound("User not found".to_string()));
            }
        };

        let entry = PointsEntryModel::new(
            user_id,
            action,
            pc_delta,
            pcon_delta,
            row.get("pc_points"),
            row.get("pcon_points"),
            target,
        );

        sqlx::query(
            "INSERT INTO points_history \
                 (id, user_id, action, pc_points_change, pcon_points_change, \
                  pc_points_total, pcon_points_total, target_id, target_type, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.action)
        .bind(entry.pc_points_change)
        .bind(entry.pcon_points_change)
        .bind(entry.pc_points_total)
        .bind(entry.pcon_points_total)
        .bind(&entry.target_id)
        .bind(&entry.target_type)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to append points history entry");
            AppError::DatabaseError(e.to_string())
        })?;

        tx.commit().await.map_err(|e| {
            warn!(error = %e, "Failed to commit award transaction");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(entry)
    }

    #[instrument(skip(self))]
    async fn list_recent(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<PointsEntryModel>, AppError> {
        let rows = sqlx::query(
            "SELECT id, user_id, action, pc_points_change, pcon_points_change, \
                    pc_points_total, pcon_points_total, target_id, target_type, created_at \
             FROM points_history WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to fetch points history");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(rows.iter().map(row_to_entry).collect())
    }

    #[instrument(skip(self))]
    async fn sum_deltas_by_user(
        &self,
        kind: PointKind,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<(String, i64)>, AppError> {
        let delta_column = match kind {
            PointKind::Pc => "pc_points_change",
            PointKind::Pcon => "pcon_points_change",
        };

        let rows = sqlx::query(&format!(
            "SELECT user_id, COALESCE(SUM({delta_column}), 0)::BIGINT AS total \
             FROM points_history \
             WHERE created_at >= $1 AND created_at < $2 \
             GROUP BY user_id ORDER BY total DESC, user_id ASC LIMIT $3"
        ))
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to aggregate points history window");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(rows
            .iter()
            .map(|row| (row.get("user_id"), row.get("total")))
            .collect())
    }

    #[instrument(skip(self))]
    async fn has_action_on_day(
        &self,
        user_id: &str,
        action: &str,
        day: chrono::NaiveDate,
    ) -> Result<bool, AppError> {
        let row = sqlx::query(
            "SELECT EXISTS(\
                 SELECT 1 FROM points_history \
                 WHERE user_id = $1 AND action = $2 AND created_at::DATE = $3\
             ) AS present",
        )
        .bind(user_id)
        .bind(action)
        .bind(day)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to probe points history for daily action");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(row.get("present"))
    }

    #[instrument(skip(self))]
    async fn distribution_totals(&self) -> Result<PointsDistribution, AppError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(pc_points_change), 0)::BIGINT AS total_pc, \
                    COALESCE(SUM(pcon_points_change), 0)::BIGINT AS total_pcon, \
                    COUNT(*) AS transactions \
             FROM points_history",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to compute distribution totals");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(PointsDistribution {
            total_pc_distributed: row.get("total_pc"),
            total_pcon_distributed: row.get("total_pcon"),
            total_transactions: row.get("transactions"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::UserModel;
    use crate::users::UserRepository;

    async fn ledger_with_user(user_id: &str) -> (InMemoryPointsLedger, Arc<InMemoryUserRepository>)
    {
        let users = Arc::new(InMemoryUserRepository::new());
        users
            .create_user(&UserModel::new(
                user_id.to_string(),
                format!("user-{}", user_id),
                "Iniciante",
            ))
            .await
            .unwrap();
        (InMemoryPointsLedger::new(users.clone()), users)
    }

    #[tokio::test]
    async fn record_award_updates_totals_and_appends_entry() {
        let (ledger, users) = ledger_with_user("u1").await;

        let entry = ledger
            .record_award("u1", "answer_created", 10, 0, None)
            .await
            .unwrap();

        assert_eq!(entry.pc_points_total, 10);
        assert_eq!(ledger.entry_count(), 1);

        let user = users.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.pc_points, 10);
    }

    #[tokio::test]
    async fn record_award_clamps_negative_totals() {
        let (ledger, users) = ledger_with_user("u1").await;

        let entry = ledger
            .record_award("u1", "received_downvote", -5, 0, None)
            .await
            .unwrap();

        assert_eq!(entry.pc_points_change, -5);
        assert_eq!(entry.pc_points_total, 0);

        let user = users.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.pc_points, 0);
    }

    #[tokio::test]
    async fn record_award_unknown_user_writes_nothing() {
        let (ledger, _users) = ledger_with_user("u1").await;

        let result = ledger.record_award("ghost", "answer_created", 10, 0, None).await;
        assert!(matches!(result.unwrap_err(), AppError::NotFound(_)));
        assert_eq!(ledger.entry_count(), 0);
    }

    #[tokio::test]
    async fn sum_deltas_by_user_respects_window_bounds() {
        let (ledger, _users) = ledger_with_user("u1").await;

        ledger
            .record_award("u1", "answer_created", 10, 0, None)
            .await
            .unwrap();
        ledger
            .record_award("u1", "received_upvote", 15, 0, None)
            .await
            .unwrap();

        let now = Utc::now();
        let within = ledger
            .sum_deltas_by_user(
                PointKind::Pc,
                now - chrono::Duration::hours(1),
                now + chrono::Duration::hours(1),
                10,
            )
            .await
            .unwrap();
        assert_eq!(within, vec![("u1".to_string(), 25)]);

        let outside = ledger
            .sum_deltas_by_user(
                PointKind::Pc,
                now - chrono::Duration::days(14),
                now - chrono::Duration::days(7),
                10,
            )
            .await
            .unwrap();
        assert!(outside.is_empty());
    }

    #[tokio::test]
    async fn distribution_totals_sums_whole_ledger() {
        let (ledger, _users) = ledger_with_user("u1").await;

        ledger
            .record_award("u1", "answer_created", 10, 0, None)
            .await
            .unwrap();
        ledger
            .record_award("u1", "answer_accepted", 25, 5, None)
            .await
            .unwrap();

        let totals = ledger.distribution_totals().await.unwrap();
        assert_eq!(totals.total_pc_distributed, 35);
        assert_eq!(totals.total_pcon_distributed, 5);
        assert_eq!(totals.total_transactions, 2);
    }
}
