use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::models::{StreakModel, StreakTransition, StreakType};
use super::repository::StreakRepository;
use crate::config::{GamificationConfig, StreakMilestone};
use crate::shared::AppError;

/// Outcome of reporting an activity: the updated streak, how it moved,
/// and the milestone hit (if the new count landed exactly on one)
#[derive(Debug, Clone)]
pub struct StreakUpdate {
    pub streak: StreakModel,
    pub transition: StreakTransition,
    pub milestone: Option<StreakMilestone>,
}

/// Streak tracker: applies the day state machine and detects milestone
/// hits. Milestone payouts are orchestrated by the engine so the tracker
/// stays free of ledger and badge dependencies.
pub struct StreakService {
    repository: Arc<dyn StreakRepository>,
    config: Arc<GamificationConfig>,
}

impl StreakService {
    pub fn new(repository: Arc<dyn StreakRepository>, config: Arc<GamificationConfig>) -> Self {
        Self { repository, config }
    }

    /// Records a qualifying activity that happened today
    #[instrument(skip(self))]
    pub async fn record_activity(
        &self,
        user_id: &str,
        streak_type: StreakType,
    ) -> Result<StreakUpdate, AppError> {
        self.record_activity_on(user_id, streak_type, Utc::now().date_naive())
            .await
    }

    /// Records a qualifying activity on an explicit day. Exposed for
    /// backfills and deterministic tests.
    #[instrument(skip(self))]
    pub async fn record_activity_on(
        &self,
        user_id: &str,
        streak_type: StreakType,
        day: NaiveDate,
    ) -> Result<StreakUpdate, AppError> {
        let (streak, transition) = self
            .repository
            .record_activity(user_id, streak_type, day)
            .await?;

        // Same-day re-entry cannot land on a milestone; counts move by
        // exactly one per counted day, so equality is the whole check
        let milestone = if transition.counts() {
            self.config
                .streak_milestone(streak_type, streak.current_count)
                .cloned()
        } else {
            None
        };

        if let Some(milestone) = &milestone {
            info!(
                user_id = %user_id,
                streak_type = %streak_type,
                milestone = milestone.milestone,
                "Streak milestone reached"
            );
        }

        Ok(StreakUpdate {
            streak,
            transition,
            milestone,
        })
    }

    /// All streaks for a user. Advisory data: failures degrade to empty.
    #[instrument(skip(self))]
    pub async fn get_user_streaks(&self, user_id: &str) -> Vec<StreakModel> {
        match self.repository.user_streaks(user_id).await {
            Ok(streaks) => streaks,
            Err(e) => {
                error!(error = %e, user_id = %user_id, "Failed to load streaks");
                Vec::new()
            }
        }
    }

    pub async fn get_streak(
        &self,
        user_id: &str,
        streak_type: StreakType,
    ) -> Result<Option<StreakModel>, AppError> {
        self.repository.get_streak(user_id, streak_type).await
    }

    /// Maintenance sweep: flags streaks inactive after the configured gap
    /// (or an explicit override in days) without touching counters
    #[instrument(skip(self))]
    pub async fn sweep_inactive(&self, older_than_days: Option<i64>) -> Result<u64, AppError> {
        let days = older_than_days.unwrap_or(self.config.streak_inactivity_days);
        let cutoff = Utc::now().date_naive() - Duration::days(days);

        let flagged = self.repository.deactivate_stale(cutoff).await?;
        info!(flagged, days, "Inactive streak sweep completed");
        Ok(flagged)
    }

    /// The next milestone above the streak's current count, for progress
    /// displays
    pub fn next_milestone(&self, streak: &StreakModel) -> Option<i64> {
        self.config
            .next_streak_milestone(streak.streak_type, streak.current_count)
    }

    pub async fn count_active(&self) -> i64 {
        self.repository.count_active().await.unwrap_or(0)
    }
}
