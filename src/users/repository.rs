use async_trait::async_trait;
use chrono::Utc;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::UserModel;
use crate::points::models::PointKind;
use crate::shared::AppError;

/// Trait for user repository operations
///
/// Point totals are NOT adjusted through this trait; every totals change
/// goes through the points ledger so the history entry and the new totals
/// are written as one unit.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create_user(&self, user: &UserModel) -> Result<(), AppError>;
    async fn get_user(&self, user_id: &str) -> Result<Option<UserModel>, AppError>;

    /// Persists a newly computed rank. No-op semantics are the caller's
    /// concern; this always writes.
    async fn set_rank(&self, user_id: &str, rank: &str) -> Result<(), AppError>;

    /// Users ordered by one of the stored totals, highest first,
    /// ties broken by ascending user id
    async fn top_by_points(&self, kind: PointKind, limit: i64) -> Result<Vec<UserModel>, AppError>;

    /// Users holding points in either currency
    async fn count_active(&self) -> Result<i64, AppError>;

    /// A bounded page of users for administrative sweeps
    async fn list_users(&self, limit: i64) -> Result<Vec<UserModel>, AppError>;
}

/// In-memory implementation of UserRepository for development and testing
pub struct InMemoryUserRepository {
    users: Mutex<HashMap<String, UserModel>>,
}

impl Default for InMemoryUserRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryUserRepository {
    /// Creates a new empty in-memory repository
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }

    /// Creates an in-memory repository with pre-populated users
    pub fn with_users(users: Vec<UserModel>) -> Self {
        let mut user_map = HashMap::new();
        for user in users {
            user_map.insert(user.id.clone(), user);
        }

        Self {
            users: Mutex::new(user_map),
        }
    }

    /// Returns the current number of users in the repository
    pub fn user_count(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    /// Overwrites the social counters consumed by achievement criteria
    /// (in production these are maintained by the social service)
    pub fn set_social_counts(&self, user_id: &str, followers: i64, following: i64) {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(user_id) {
            user.followers = followers;
            user.following = following;
            user.updated_at = Utc::now();
        }
    }

    /// Atomically applies a clamped points delta, returning the new totals.
    /// Used by the in-memory points ledger; not part of the public trait.
    pub(crate) fn apply_points_delta(
        &self,
        user_id: &str,
        pc_delta: i64,
        pcon_delta: i64,
    ) -> Option<(i64, i64)> {
        let mut users = self.users.lock().unwrap();
        let user = users.get_mut(user_id)?;
        user.pc_points = (user.pc_points + pc_delta).max(0);
        user.pcon_points = (user.pcon_points + pcon_delta).max(0);
        user.updated_at = Utc::now();
        Some((user.pc_points, user.pcon_points))
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    #[instrument(skip(self, user))]
    async fn create_user(&self, user: &UserModel) -> Result<(), AppError> {
        debug!(user_id = %user.id, username = %user.username, "Creating user in memory");

        let mut users = self.users.lock().unwrap();
        if users.contains_key(&user.id) {
            warn!(user_id = %user.id, "User already exists in memory");
            return Err(AppError::Conflict("User already exists".to_string()));
        }
        users.insert(user.id.clone(), user.clone());

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_user(&self, user_id: &str) -> Result<Option<UserModel>, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.get(user_id).cloned())
    }

    #[instrument(skip(self))]
    async fn set_rank(&self, user_id: &str, rank: &str) -> Result<(), AppError> {
        debug!(user_id = %user_id, rank = %rank, "Updating rank in memory");

        let mut users = self.users.lock().unwrap();
        match users.get_mut(user_id) {
            Some(user) => {
                user.rank = rank.to_string();
                user.updated_at = Utc::now();
                Ok(())
            }
            None => {
                warn!(user_id = %user_id, "User not found for rank update in memory");
                Err(AppError::NotFound("User not found".to_string()))
            }
        }
    }

    #[instrument(skip(self))]
    async fn top_by_points(&self, kind: PointKind, limit: i64) -> Result<Vec<UserModel>, AppError> {
        let users = self.users.lock().unwrap();
        let mut all: Vec<UserModel> = users.values().cloned().collect();
        all.sort_by(|a, b| {
            let (score_a, score_b) = match kind {
                PointKind::Pc => (a.pc_points, b.pc_points),
                PointKind::Pcon => (a.pcon_points, b.pcon_points),
            };
            score_b.cmp(&score_a).then_with(|| a.id.cmp(&b.id))
        });
        all.truncate(limit.max(0) as usize);
        Ok(all)
    }

    #[instrument(skip(self))]
    async fn count_active(&self) -> Result<i64, AppError> {
        let users = self.users.lock().unwrap();
        Ok(users.values().filter(|u| u.is_active()).count() as i64)
    }

    #[instrument(skip(self))]
    async fn list_users(&self, limit: i64) -> Result<Vec<UserModel>, AppError> {
        let users = self.users.lock().unwrap();
        let mut all: Vec<UserModel> = users.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all.truncate(limit.max(0) as usize);
        Ok(all)
    }
}

/// PostgreSQL implementation of user repository
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::postgres::PgRow) -> UserModel {
    UserModel {
        id: row.get("id"),
        username: row.get("username"),
        pc_points: row.get("pc_points"),
        pcon_points: row.get("pcon_points"),
        rank: row.get("rank"),
        followers: row.get("followers"),
        following: row.get("following"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const USER_COLUMNS: &str =
    "id, username, pc_points, pcon_points, rank, followers, following, created_at, updated_at";

#[async_trait]
impl UserRepository for PostgresUserRepository {
    #[instrument(skip(self, user))]
    async fn create_user(&self, user: &UserModel) -> Result<(), AppError> {
        debug!(user_id = %user.id, username = %user.username, "Creating user in database");

        sqlx::query(
            "INSERT INTO users (id, username, pc_points, pcon_points, rank, followers, following, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(user.pc_points)
        .bind(user.pcon_points)
        .bind(&user.rank)
        .bind(user.followers)
        .bind(user.following)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create user in database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_user(&self, user_id: &str) -> Result<Option<UserModel>, AppError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, user_id = %user_id, "Failed to fetch user from database");
                AppError::DatabaseError(e.to_string())
            })?;

        Ok(row.map(|r| row_to_user(&r)))
    }

    #[instrument(skip(self))]
    async fn set_rank(&self, user_id: &str, rank: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE users SET rank = $2, updated_at = NOW() WHERE id = $1")
            .bind(user_id)
            .bind(rank)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, user_id = %user_id, "Failed to update rank in database");
                AppError::DatabaseError(e.to_string())
            })?;

        if result.rows_affected() == 0 {
            warn!(user_id = %user_id, "User not found for rank update");
            return Err(AppError::NotFound("User not found".to_string()));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    async fn top_by_points(&self, kind: PointKind, limit: i64) -> Result<Vec<UserModel>, AppError> {
        let order_column = match kind {
            PointKind::Pc => "pc_points",
            PointKind::Pcon => "pcon_points",
        };

        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY {order_column} DESC, id ASC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch top users from database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(rows.iter().map(row_to_user).collect())
    }

    #[instrument(skip(self))]
    async fn count_active(&self) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users WHERE pc_points > 0 OR pcon_points > 0")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, "Failed to count active users");
                AppError::DatabaseError(e.to_string())
            })?;

        Ok(row.get("count"))
    }

    #[instrument(skip(self))]
    async fn list_users(&self, limit: i64) -> Result<Vec<UserModel>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id ASC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to list users from database");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(rows.iter().map(row_to_user).collect())
    }
}
