use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{Achievement, AchievementCategory, AchievementRarity, UserAchievementModel};
use crate::shared::AppError;

/// Result of attempting to award an achievement
#[derive(Debug, Clone)]
pub enum AchievementAwardOutcome {
    /// The achievement was earned by this call
    Awarded(UserAchievementModel),
    /// A non-repeatable achievement was already earned; the existing
    /// record is returned
    AlreadyEarned(UserAchievementModel),
}

/// Trait for the achievement catalog and per-user earn records
#[async_trait]
pub trait AchievementRepository: Send + Sync {
    /// Inserts a catalog entry unless one with the same id exists.
    /// Returns true when a row was inserted.
    async fn insert_achievement_if_absent(&self, achievement: &Achievement)
        -> Result<bool, AppError>;

    async fn get_achievement(&self, achievement_id: &str) -> Result<Option<Achievement>, AppError>;

    /// The whole catalog ordered by sort_order
    async fn list_achievements(&self) -> Result<Vec<Achievement>, AppError>;

    /// Atomically records an earn. For non-repeatable achievements a
    /// uniqueness collision folds into AlreadyEarned; repeatable
    /// achievements refresh their record and count as awarded again.
    async fn try_award(
        &self,
        record: &UserAchievementModel,
        repeatable: bool,
    ) -> Result<AchievementAwardOutcome, AppError>;

    async fn earned_by_user(&self, user_id: &str) -> Result<Vec<UserAchievementModel>, AppError>;

    /// Earned records across all users, for global statistics
    async fn count_earned(&self) -> Result<i64, AppError>;
}

/// In-memory implementation of AchievementRepository for development and
/// testing
#[derive(Default)]
pub struct InMemoryAchievementRepository {
    catalog: Mutex<HashMap<String, Achievement>>,
    records: Mutex<Vec<UserAchievementModel>>,
}

impl InMemoryAchievementRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current number of catalog entries
    pub fn achievement_count(&self) -> usize {
        self.catalog.lock().unwrap().len()
    }
}

#[async_trait]
impl AchievementRepository for InMemoryAchievementRepository {
    #[instrument(skip(self, achievement))]
    async fn insert_achievement_if_absent(
        &self,
        achievement: &Achievement,
    ) -> Result<bool, AppError> {
        let mut catalog = self.catalog.lock().unwrap();
        if catalog.contains_key(&achievement.id) {
            return Ok(false);
        }
        catalog.insert(achievement.id.clone(), achievement.clone());
        debug!(achievement_id = %achievement.id, "Achievement inserted into catalog");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn get_achievement(&self, achievement_id: &str) -> Result<Option<Achievement>, AppError> {
        let catalog = self.catalog.lock().unwrap();
        Ok(catalog.get(achievement_id).cloned())
    }

    #[instrument(skip(self))]
    async fn list_achievements(&self) -> Result<Vec<Achievement>, AppError> {
        let catalog = self.catalog.lock().unwrap();
        let mut all: Vec<Achievement> = catalog.values().cloned().collect();
        all.sort_by_key(|a| a.sort_order);
        Ok(all)
    }

    #[instrument(skip(self, record))]
    async fn try_award(
        &self,
        record: &UserAchievementModel,
        repeatable: bool,
    ) -> Result<AchievementAwardOutcome, AppError> {
        let mut records = self.records.lock().unwrap();

        if let Some(existing) = records.iter_mut().find(|r| {
            r.user_id == record.user_id && r.achievement_id == record.achievement_id && r.is_earned
        }) {
            if repeatable {
                existing.earned_at = record.earned_at;
                existing.progress = record.progress;
                return Ok(AchievementAwardOutcome::Awarded(existing.clone()));
            }
            debug!(
                user_id = %record.user_id,
                achievement_id = %record.achievement_id,
                "Achievement already earned"
            );
            return Ok(AchievementAwardOutcome::AlreadyEarned(existing.clone()));
        }

        records.push(record.clone());
        Ok(AchievementAwardOutcome::Awarded(record.clone()))
    }

    #[instrument(skip(self))]
    async fn earned_by_user(&self, user_id: &str) -> Result<Vec<UserAchievementModel>, AppError> {
        let records = self.records.lock().unwrap();
        let mut earned: Vec<UserAchievementModel> = records
            .iter()
            .filter(|r| r.user_id == user_id && r.is_earned)
            .cloned()
            .collect();
        earned.sort_by(|a, b| b.earned_at.cmp(&a.earned_at));
        Ok(earned)
    }

    #[instrument(skip(self))]
    async fn count_earned(&self) -> Result<i64, AppError> {
        let records = self.records.lock().unwrap();
        Ok(records.iter().filter(|r| r.is_earned).count() as i64)
    }
}

/// PostgreSQL implementation of achievement repository
pub struct PostgresAchievementRepository {
    pool: PgPool,
}

impl PostgresAchievementRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_achievement(row: &sqlx::postgres::PgRow) -> Result<Achievement, AppError> {
    let category: String = row.get("category");
    let rarity: String = row.get("rarity");
    let Json(criteria): Json<super::models::AchievementCriteria> = row.get("criteria");
    Ok(Achievement {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        category: AchievementCategory::parse(&category)
            .ok_or_else(|| AppError::DatabaseError(format!("Unknown category {category}")))?,
        rarity: AchievementRarity::parse(&rarity)
            .ok_or_else(|| AppError::DatabaseError(format!("Unknown rarity {rarity}")))?,
        badge_icon: row.get("badge_icon"),
        badge_color: row.get("badge_color"),
        criteria,
        points_reward: row.get("points_reward"),
        pcon_reward: row.get("pcon_reward"),
        is_hidden: row.get("is_hidden"),
        is_repeatable: row.get("is_repeatable"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
    })
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> UserAchievementModel {
    UserAchievementModel {
        id: row.get("id"),
        user_id: row.get("user_id"),
        achievement_id: row.get("achievement_id"),
        progress: row.get("progress"),
        earned_at: row.get("earned_at"),
        is_earned: row.get("is_earned"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl AchievementRepository for PostgresAchievementRepository {
    #[instrument(skip(self, achievement))]
    async fn insert_achievement_if_absent(
        &self,
        achievement: &Achievement,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO achievements (id, name, description, category, rarity, badge_icon, \
                                       badge_color, criteria, points_reward, pcon_reward, \
                                       is_hidden, is_repeatable, sort_order, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&achievement.id)
        .bind(&achievement.name)
        .bind(&achievement.description)
        .bind(achievement.category.to_string())
        .bind(achievement.rarity.to_string())
        .bind(&achievement.badge_icon)
        .bind(&achievement.badge_color)
        .bind(Json(&achievement.criteria))
        .bind(achievement.points_reward)
        .bind(achievement.pcon_reward)
        .bind(achievement.is_hidden)
        .bind(achievement.is_repeatable)
        .bind(achievement.sort_order)
        .bind(achievement.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, achievement_id = %achievement.id, "Failed to insert achievement");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn get_achievement(&self, achievement_id: &str) -> Result<Option<Achievement>, AppError> {
        let row = sqlx::query("SELECT * FROM achievements WHERE id = $1")
            .bind(achievement_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, achievement_id = %achievement_id, "Failed to fetch achievement");
                AppError::DatabaseError(e.to_string())
            })?;

        row.map(|r| row_to_achievement(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_achievements(&self) -> Result<Vec<Achievement>, AppError> {
        let rows = sqlx::query("SELECT * FROM achievements ORDER BY sort_order ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to list achievements");
                AppError::DatabaseError(e.to_string())
            })?;

        rows.iter().map(row_to_achievement).collect()
    }

    #[instrument(skip(self, record))]
    async fn try_award(
        &self,
        record: &UserAchievementModel,
        repeatable: bool,
    ) -> Result<AchievementAwardOutcome, AppError> {
        let sql = if repeatable {
            // A repeatable earn refreshes the single record per user
            "INSERT INTO user_achievements \
                 (id, user_id, achievement_id, progress, earned_at, is_earned, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id, achievement_id) \
             DO UPDATE SET earned_at = EXCLUDED.earned_at, progress = EXCLUDED.progress"
        } else {
            "INSERT INTO user_achievements \
                 (id, user_id, achievement_id, progress, earned_at, is_earned, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (user_id, achievement_id) DO NOTHING"
        };

        let result = sqlx::query(sql)
            .bind(&record.id)
            .bind(&record.user_id)
            .bind(&record.achievement_id)
            .bind(record.progress)
            .bind(record.earned_at)
            .bind(record.is_earned)
            .bind(record.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to award achievement");
                AppError::DatabaseError(e.to_string())
            })?;

        if result.rows_affected() > 0 {
            return Ok(AchievementAwardOutcome::Awarded(record.clone()));
        }

        // Lost the race or already earned: return the existing record
        let row = sqlx::query(
            "SELECT id, user_id, achievement_id, progress, earned_at, is_earned, created_at \
             FROM user_achievements WHERE user_id = $1 AND achievement_id = $2",
        )
        .bind(&record.user_id)
        .bind(&record.achievement_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch existing user achievement");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(AchievementAwardOutcome::AlreadyEarned(row_to_record(&row)))
    }

    #[instrument(skip(self))]
    async fn earned_by_user(&self, user_id: &str) -> Result<Vec<UserAchievementModel>, AppError> {
        let rows = sqlx::query(
            "SELECT id, user_id, achievement_id, progress, earned_at, is_earned, created_at \
             FROM user_achievements WHERE user_id = $1 AND is_earned \
             ORDER BY earned_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to list user achievements");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(rows.iter().map(row_to_record).collect())
    }

    #[instrument(skip(self))]
    async fn count_earned(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM user_achievements WHERE is_earned")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to count earned achievements");
                AppError::DatabaseError(e.to_string())
            })?;

        Ok(row.get("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievements::catalog::default_achievements;

    #[tokio::test]
    async fn seeding_twice_inserts_once() {
        let repo = InMemoryAchievementRepository::new();

        for achievement in default_achievements() {
            assert!(repo
                .insert_achievement_if_absent(&achievement)
                .await
                .unwrap());
        }
        for achievement in default_achievements() {
            assert!(!repo
                .insert_achievement_if_absent(&achievement)
                .await
                .unwrap());
        }

        assert_eq!(repo.achievement_count(), default_achievements().len());
    }

    #[tokio::test]
    async fn non_repeatable_award_happens_once() {
        let repo = InMemoryAchievementRepository::new();
        let first = UserAchievementModel::earned("u1", "first_answer", 1);
        let second = UserAchievementModel::earned("u1", "first_answer", 1);

        let outcome = repo.try_award(&first, false).await.unwrap();
        assert!(matches!(outcome, AchievementAwardOutcome::Awarded(_)));

        let outcome = repo.try_award(&second, false).await.unwrap();
        match outcome {
            AchievementAwardOutcome::AlreadyEarned(existing) => assert_eq!(existing.id, first.id),
            AchievementAwardOutcome::Awarded(_) => panic!("should not award twice"),
        }

        assert_eq!(repo.count_earned().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn repeatable_award_refreshes_the_record() {
        let repo = InMemoryAchievementRepository::new();
        let first = UserAchievementModel::earned("u1", "weekly_hero", 1);
        repo.try_award(&first, true).await.unwrap();

        let second = UserAchievementModel::earned("u1", "weekly_hero", 2);
        let outcome = repo.try_award(&second, true).await.unwrap();

        match outcome {
            AchievementAwardOutcome::Awarded(record) => {
                assert_eq!(record.id, first.id);
                assert_eq!(record.progress, 2);
            }
            AchievementAwardOutcome::AlreadyEarned(_) => {
                panic!("repeatable achievements award again")
            }
        }
    }
}
