use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{BadgeModel, BadgeType, UserBadgeModel};
use crate::shared::AppError;

/// Result of attempting to award a badge
#[derive(Debug, Clone)]
pub enum BadgeAwardOutcome {
    /// First time this user received the badge
    Awarded(UserBadgeModel),
    /// The user already held the badge; the existing record is returned
    AlreadyHeld(UserBadgeModel),
}

impl BadgeAwardOutcome {
    pub fn into_record(self) -> UserBadgeModel {
        match self {
            BadgeAwardOutcome::Awarded(record) => record,
            BadgeAwardOutcome::AlreadyHeld(record) => record,
        }
    }
}

/// Trait for badge catalog and per-user award records
#[async_trait]
pub trait BadgeRepository: Send + Sync {
    /// Inserts a catalog entry unless one with the same id exists.
    /// Returns true when a row was inserted.
    async fn insert_badge_if_absent(&self, badge: &BadgeModel) -> Result<bool, AppError>;

    async fn get_badge(&self, badge_id: &str) -> Result<Option<BadgeModel>, AppError>;
    async fn list_badges(&self) -> Result<Vec<BadgeModel>, AppError>;

    /// Atomically awards the badge unless the user already holds it.
    /// A uniqueness collision is folded into AlreadyHeld, never an error.
    async fn try_award(&self, user_badge: &UserBadgeModel) -> Result<BadgeAwardOutcome, AppError>;

    async fn user_badges(&self, user_id: &str) -> Result<Vec<UserBadgeModel>, AppError>;
}

/// In-memory implementation of BadgeRepository for development and testing
#[derive(Default)]
pub struct InMemoryBadgeRepository {
    badges: Mutex<HashMap<String, BadgeModel>>,
    user_badges: Mutex<Vec<UserBadgeModel>>,
}

impl InMemoryBadgeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current number of catalog entries
    pub fn badge_count(&self) -> usize {
        self.badges.lock().unwrap().len()
    }
}

#[async_trait]
impl BadgeRepository for InMemoryBadgeRepository {
    #[instrument(skip(self, badge))]
    async fn insert_badge_if_absent(&self, badge: &BadgeModel) -> Result<bool, AppError> {
        let mut badges = self.badges.lock().unwrap();
        if badges.contains_key(&badge.id) {
            return Ok(false);
        }
        badges.insert(badge.id.clone(), badge.clone());
        debug!(badge_id = %badge.id, "Badge inserted into catalog");
        Ok(true)
    }

    #[instrument(skip(self))]
    async fn get_badge(&self, badge_id: &str) -> Result<Option<BadgeModel>, AppError> {
        let badges = self.badges.lock().unwrap();
        Ok(badges.get(badge_id).cloned())
    }

    #[instrument(skip(self))]
    async fn list_badges(&self) -> Result<Vec<BadgeModel>, AppError> {
        let badges = self.badges.lock().unwrap();
        let mut all: Vec<BadgeModel> = badges.values().cloned().collect();
        all.sort_by_key(|b| b.sort_order);
        Ok(all)
    }

    #[instrument(skip(self, user_badge))]
    async fn try_award(&self, user_badge: &UserBadgeModel) -> Result<BadgeAwardOutcome, AppError> {
        let mut user_badges = self.user_badges.lock().unwrap();

        if let Some(existing) = user_badges
            .iter()
            .find(|ub| ub.user_id == user_badge.user_id && ub.badge_id == user_badge.badge_id)
        {
            debug!(
                user_id = %user_badge.user_id,
                badge_id = %user_badge.badge_id,
                "Badge already held"
            );
            return Ok(BadgeAwardOutcome::AlreadyHeld(existing.clone()));
        }

        user_badges.push(user_badge.clone());
        Ok(BadgeAwardOutcome::Awarded(user_badge.clone()))
    }

    #[instrument(skip(self))]
    async fn user_badges(&self, user_id: &str) -> Result<Vec<UserBadgeModel>, AppError> {
        let user_badges = self.user_badges.lock().unwrap();
        Ok(user_badges
            .iter()
            .filter(|ub| ub.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// PostgreSQL implementation of badge repository
pub struct PostgresBadgeRepository {
    pool: PgPool,
}

impl PostgresBadgeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_badge(row: &sqlx::postgres::PgRow) -> Result<BadgeModel, AppError> {
    let badge_type: String = row.get("badge_type");
    let requirements: Option<Json<serde_json::Value>> = row.get("requirements");
    Ok(BadgeModel {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        icon: row.get("icon"),
        color: row.get("color"),
        badge_type: BadgeType::parse(&badge_type)
            .ok_or_else(|| AppError::DatabaseError(format!("Unknown badge type {badge_type}")))?,
        requirements: requirements.map(|j| j.0),
        is_rare: row.get("is_rare"),
        sort_order: row.get("sort_order"),
        created_at: row.get("created_at"),
    })
}

fn row_to_user_badge(row: &sqlx::postgres::PgRow) -> UserBadgeModel {
    UserBadgeModel {
        id: row.get("id"),
        user_id: row.get("user_id"),
        badge_id: row.get("badge_id"),
        earned_at: row.get("earned_at"),
        is_featured: row.get("is_featured"),
        badge: None,
    }
}

#[async_trait]
impl BadgeRepository for PostgresBadgeRepository {
    #[instrument(skip(self, badge))]
    async fn insert_badge_if_absent(&self, badge: &BadgeModel) -> Result<bool, AppError> {
        let result = sqlx::query(
            "INSERT INTO badges (id, name, description, icon, color, badge_type, requirements, is_rare, sort_order, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(&badge.id)
        .bind(&badge.name)
        .bind(&badge.description)
        .bind(&badge.icon)
        .bind(&badge.color)
        .bind(badge.badge_type.to_string())
        .bind(badge.requirements.clone().map(Json))
        .bind(badge.is_rare)
        .bind(badge.sort_order)
        .bind(badge.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, badge_id = %badge.id, "Failed to insert badge");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn get_badge(&self, badge_id: &str) -> Result<Option<BadgeModel>, AppError> {
        let row = sqlx::query("SELECT * FROM badges WHERE id = $1")
            .bind(badge_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, badge_id = %badge_id, "Failed to fetch badge");
                AppError::DatabaseError(e.to_string())
            })?;

        row.map(|r| row_to_badge(&r)).transpose()
    }

    #[instrument(skip(self))]
    async fn list_badges(&self) -> Result<Vec<BadgeModel>, AppError> {
        let rows = sqlx::query("SELECT * FROM badges ORDER BY sort_order ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to list badges");
                AppError::DatabaseError(e.to_string())
            })?;

        rows.iter().map(row_to_badge).collect()
    }

    #[instrument(skip(self, user_badge))]
    async fn try_award(&self, user_badge: &UserBadgeModel) -> Result<BadgeAwardOutcome, AppError> {
        let inserted = sqlx::query(
            "INSERT INTO user_badges (id, user_id, badge_id, earned_at, is_featured) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (user_id, badge_id) DO NOTHING",
        )
        .bind(&user_badge.id)
        .bind(&user_badge.user_id)
        .bind(&user_badge.badge_id)
        .bind(user_badge.earned_at)
        .bind(user_badge.is_featured)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to award badge");
            AppError::DatabaseError(e.to_string())
        })?;

        if inserted.rows_affected() > 0 {
            return Ok(BadgeAwardOutcome::Awarded(user_badge.clone()));
        }

        // Lost the race or already held: return the existing record
        let row = sqlx::query(
            "SELECT id, user_id, badge_id, earned_at, is_featured \
             FROM user_badges WHERE user_id = $1 AND badge_id = $2",
        )
        .bind(&user_badge.user_id)
        .bind(&user_badge.badge_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch existing user badge");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(BadgeAwardOutcome::AlreadyHeld(row_to_user_badge(&row)))
    }

    #[instrument(skip(self))]
    async fn user_badges(&self, user_id: &str) -> Result<Vec<UserBadgeModel>, AppError> {
        let rows = sqlx::query(
            "SELECT id, user_id, badge_id, earned_at, is_featured \
             FROM user_badges WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, user_id = %user_id, "Failed to list user badges");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(rows.iter().map(row_to_user_badge).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badges::catalog::default_badges;

    #[tokio::test]
    async fn seeding_twice_inserts_once() {
        let repo = InMemoryBadgeRepository::new();

        for badge in default_badges() {
            assert!(repo.insert_badge_if_absent(&badge).await.unwrap());
        }
        for badge in default_badges() {
            assert!(!repo.insert_badge_if_absent(&badge).await.unwrap());
        }

        assert_eq!(repo.badge_count(), default_badges().len());
    }

    #[tokio::test]
    async fn awarding_twice_returns_the_same_record() {
        let repo = InMemoryBadgeRepository::new();
        let first = UserBadgeModel::new("u1", "early_adopter", false);
        let second = UserBadgeModel::new("u1", "early_adopter", true);

        let outcome = repo.try_award(&first).await.unwrap();
        assert!(matches!(outcome, BadgeAwardOutcome::Awarded(_)));

        let outcome = repo.try_award(&second).await.unwrap();
        match outcome {
            BadgeAwardOutcome::AlreadyHeld(existing) => assert_eq!(existing.id, first.id),
            BadgeAwardOutcome::Awarded(_) => panic!("badge should not be awarded twice"),
        }

        assert_eq!(repo.user_badges("u1").await.unwrap().len(), 1);
    }
}
