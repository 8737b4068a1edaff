use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::sync::Mutex;
use tracing::{debug, instrument, warn};

use super::models::{ReferralMilestone, ReferralRewardModel};
use crate::shared::AppError;

/// Result of attempting to record a referral milestone
#[derive(Debug, Clone)]
pub enum ReferralRecordOutcome {
    /// First payout for this (referred, milestone)
    Recorded(ReferralRewardModel),
    /// The milestone was already paid; the existing record is returned
    AlreadyRecorded(ReferralRewardModel),
}

/// Trait for referral reward records
///
/// The `signup` record doubles as the referral relationship; a user can
/// be referred at most once, and each milestone pays at most once.
#[async_trait]
pub trait ReferralRepository: Send + Sync {
    /// Records the signup referral. Fails with Conflict when the referred
    /// user already has a referrer.
    async fn create_referral(
        &self,
        reward: &ReferralRewardModel,
    ) -> Result<ReferralRewardModel, AppError>;

    /// The signup record for a referred user, if any
    async fn referral_for(
        &self,
        referred_id: &str,
    ) -> Result<Option<ReferralRewardModel>, AppError>;

    /// Records a milestone payout once per (referred, milestone);
    /// a duplicate folds into AlreadyRecorded, never an error
    async fn record_milestone(
        &self,
        reward: &ReferralRewardModel,
    ) -> Result<ReferralRecordOutcome, AppError>;
}

/// In-memory implementation of ReferralRepository for development and
/// testing
#[derive(Default)]
pub struct InMemoryReferralRepository {
    rewards: Mutex<Vec<ReferralRewardModel>>,
}

impl InMemoryReferralRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of reward records
    pub fn reward_count(&self) -> usize {
        self.rewards.lock().unwrap().len()
    }
}

#[async_trait]
impl ReferralRepository for InMemoryReferralRepository {
    #[instrument(skip(self, reward))]
    async fn create_referral(
        &self,
        reward: &ReferralRewardModel,
    ) -> Result<ReferralRewardModel, AppError> {
        let mut rewards = self.rewards.lock().unwrap();

        if rewards
            .iter()
            .any(|r| r.referred_id == reward.referred_id && r.milestone == ReferralMilestone::Signup)
        {
            warn!(referred_id = %reward.referred_id, "User already referred");
            return Err(AppError::Conflict(
                "User already referred by someone".to_string(),
            ));
        }

        rewards.push(reward.clone());
        debug!(
            referrer_id = %reward.referrer_id,
            referred_id = %reward.referred_id,
            "Referral recorded in memory"
        );
        Ok(reward.clone())
    }

    #[instrument(skip(self))]
    async fn referral_for(
        &self,
        referred_id: &str,
    ) -> Result<Option<ReferralRewardModel>, AppError> {
        let rewards = self.rewards.lock().unwrap();
        Ok(rewards
            .iter()
            .find(|r| r.referred_id == referred_id && r.milestone == ReferralMilestone::Signup)
            .cloned())
    }

    #[instrument(skip(self, reward))]
    async fn record_milestone(
        &self,
        reward: &ReferralRewardModel,
    ) -> Result<ReferralRecordOutcome, AppError> {
        let mut rewards = self.rewards.lock().unwrap();

        if let Some(existing) = rewards
            .iter()
            .find(|r| r.referred_id == reward.referred_id && r.milestone == reward.milestone)
        {
            debug!(
                referred_id = %reward.referred_id,
                milestone = %reward.milestone,
                "Referral milestone already paid"
            );
            return Ok(ReferralRecordOutcome::AlreadyRecorded(existing.clone()));
        }

        rewards.push(reward.clone());
        Ok(ReferralRecordOutcome::Recorded(reward.clone()))
    }
}

/// PostgreSQL implementation of referral repository
pub struct PostgresReferralRepository {
    pool: PgPool,
}

impl PostgresReferralRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_reward(row: &sqlx::postgres::PgRow) -> Result<ReferralRewardModel, AppError> {
    let milestone: String = row.get("milestone");
    Ok(ReferralRewardModel {
        id: row.get("id"),
        referrer_id: row.get("referrer_id"),
        referred_id: row.get("referred_id"),
        milestone: ReferralMilestone::parse(&milestone).ok_or_else(|| {
            AppError::DatabaseError(format!("Unknown referral milestone {milestone}"))
        })?,
        pc_reward: row.get("pc_reward"),
        pcon_reward: row.get("pcon_reward"),
        created_at: row.get("created_at"),
    })
}

const REWARD_COLUMNS: &str =
    "id, referrer_id, referred_id, milestone, pc_reward, pcon_reward, created_at";

#[async_trait]
impl ReferralRepository for PostgresReferralRepository {
    #[instrument(skip(self, reward))]
    async fn create_referral(
        &self,
        reward: &ReferralRewardModel,
    ) -> Result<ReferralRewardModel, AppError> {
        let result = sqlx::query(
            "INSERT INTO referral_rewards \
                 (id, referrer_id, referred_id, milestone, pc_reward, pcon_reward, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (referred_id, milestone) DO NOTHING",
        )
        .bind(&reward.id)
        .bind(&reward.referrer_id)
        .bind(&reward.referred_id)
        .bind(reward.milestone.to_string())
        .bind(reward.pc_reward)
        .bind(reward.pcon_reward)
        .bind(reward.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to create referral");
            AppError::DatabaseError(e.to_string())
        })?;

        if result.rows_affected() == 0 {
            warn!(referred_id = %reward.referred_id, "User already referred");
            return Err(AppError::Conflict(
                "User already referred by someone".to_string(),
            ));
        }

        Ok(reward.clone())
    }

    #[instrument(skip(self))]
    async fn referral_for(
        &self,
        referred_id: &str,
    ) -> Result<Option<ReferralRewardModel>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {REWARD_COLUMNS} FROM referral_rewards \
             WHERE referred_id = $1 AND milestone = 'signup'"
        ))
        .bind(referred_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, referred_id = %referred_id, "Failed to fetch referral");
            AppError::DatabaseError(e.to_string())
        })?;

        row.map(|r| row_to_reward(&r)).transpose()
    }

    #[instrument(skip(self, reward))]
    async fn record_milestone(
        &self,
        reward: &ReferralRewardModel,
    ) -> Result<ReferralRecordOutcome, AppError> {
        let result = sqlx::query(
            "INSERT INTO referral_rewards \
                 (id, referrer_id, referred_id, milestone, pc_reward, pcon_reward, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (referred_id, milestone) DO NOTHING",
        )
        .bind(&reward.id)
        .bind(&reward.referrer_id)
        .bind(&reward.referred_id)
        .bind(reward.milestone.to_string())
        .bind(reward.pc_reward)
        .bind(reward.pcon_reward)
        .bind(reward.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to record referral milestone");
            AppError::DatabaseError(e.to_string())
        })?;

        if result.rows_affected() > 0 {
            return Ok(ReferralRecordOutcome::Recorded(reward.clone()));
        }

        let row = sqlx::query(&format!(
            "SELECT {REWARD_COLUMNS} FROM referral_rewards \
             WHERE referred_id = $1 AND milestone = $2"
        ))
        .bind(&reward.referred_id)
        .bind(reward.milestone.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Failed to fetch existing referral milestone");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(ReferralRecordOutcome::AlreadyRecorded(row_to_reward(&row)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signup(referrer: &str, referred: &str) -> ReferralRewardModel {
        ReferralRewardModel::new(referrer, referred, ReferralMilestone::Signup, 10, 5)
    }

    #[tokio::test]
    async fn second_referrer_conflicts() {
        let repo = InMemoryReferralRepository::new();

        repo.create_referral(&signup("alice", "carol")).await.unwrap();
        let result = repo.create_referral(&signup("bob", "carol")).await;

        assert!(matches!(result.unwrap_err(), AppError::Conflict(_)));
        assert_eq!(repo.reward_count(), 1);
    }

    #[tokio::test]
    async fn milestones_pay_once_per_referred_user() {
        let repo = InMemoryReferralRepository::new();
        repo.create_referral(&signup("alice", "carol")).await.unwrap();

        let first = ReferralRewardModel::new(
            "alice",
            "carol",
            ReferralMilestone::FirstAnswer,
            10,
            5,
        );
        let outcome = repo.record_milestone(&first).await.unwrap();
        assert!(matches!(outcome, ReferralRecordOutcome::Recorded(_)));

        let duplicate = ReferralRewardModel::new(
            "alice",
            "carol",
            ReferralMilestone::FirstAnswer,
            10,
            5,
        );
        let outcome = repo.record_milestone(&duplicate).await.unwrap();
        match outcome {
            ReferralRecordOutcome::AlreadyRecorded(existing) => assert_eq!(existing.id, first.id),
            ReferralRecordOutcome::Recorded(_) => panic!("milestone must not pay twice"),
        }
    }
}
