use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use super::models::{PointsAward, PointsDistribution, TargetRef};
use super::repository::PointsLedgerRepository;
use crate::config::GamificationConfig;
use crate::event::{EventBus, GamificationEvent};
use crate::rank::RankTable;
use crate::shared::AppError;
use crate::users::UserRepository;

/// The points ledger service: resolves action values, applies awards
/// atomically through the ledger repository, and keeps the derived rank
/// in step with the totals.
pub struct PointsService {
    config: Arc<GamificationConfig>,
    ledger: Arc<dyn PointsLedgerRepository>,
    users: Arc<dyn UserRepository>,
    rank_table: RankTable,
    event_bus: EventBus,
}

impl PointsService {
    pub fn new(
        config: Arc<GamificationConfig>,
        ledger: Arc<dyn PointsLedgerRepository>,
        users: Arc<dyn UserRepository>,
        event_bus: EventBus,
    ) -> Self {
        let rank_table = config.rank_table();
        Self {
            config,
            ledger,
            users,
            rank_table,
            event_bus,
        }
    }

    /// Awards points for a configured action.
    ///
    /// An action present in neither table is a warning-level no-op, never
    /// an error; an unknown user on a configured action is NotFound with
    /// nothing written.
    #[instrument(skip(self, target))]
    pub async fn award_for_action(
        &self,
        user_id: &str,
        action: &str,
        target: Option<&TargetRef>,
    ) -> Result<PointsAward, AppError> {
        let pc_delta = self.config.pc_value(action);
        let pcon_delta = self.config.pcon_value(action);

        if pc_delta == 0 && pcon_delta == 0 {
            warn!(action = %action, "No points configured for action");
            let (pc, pcon) = self.current_totals(user_id).await;
            return Ok(PointsAward::noop(action, pc, pcon));
        }

        self.apply(user_id, action, pc_delta, pcon_delta, target)
            .await
    }

    /// Awards explicit amounts outside the action tables (achievement
    /// rewards, streak milestone bonuses, referral payouts)
    #[instrument(skip(self, target))]
    pub async fn award_bonus(
        &self,
        user_id: &str,
        action: &str,
        pc_delta: i64,
        pcon_delta: i64,
        target: Option<&TargetRef>,
    ) -> Result<PointsAward, AppError> {
        if pc_delta == 0 && pcon_delta == 0 {
            let (pc, pcon) = self.current_totals(user_id).await;
            return Ok(PointsAward::noop(action, pc, pcon));
        }

        self.apply(user_id, action, pc_delta, pcon_delta, target)
            .await
    }

    /// Awards a configured action at most once per UTC calendar day.
    /// Returns Ok(None) when the action was already recorded today.
    #[instrument(skip(self, target))]
    pub async fn award_once_per_day(
        &self,
        user_id: &str,
        action: &str,
        target: Option<&TargetRef>,
    ) -> Result<Option<PointsAward>, AppError> {
        let today = Utc::now().date_naive();
        if self.ledger.has_action_on_day(user_id, action, today).await? {
            debug!(user_id = %user_id, action = %action, "Action already awarded today");
            return Ok(None);
        }

        Ok(Some(self.award_for_action(user_id, action, target).await?))
    }

    async fn apply(
        &self,
        user_id: &str,
        action: &str,
        pc_delta: i64,
        pcon_delta: i64,
        target: Option<&TargetRef>,
    ) -> Result<PointsAward, AppError> {
        let entry = self
            .ledger
            .record_award(user_id, action, pc_delta, pcon_delta, target)
            .await?;

        self.event_bus.emit(GamificationEvent::PointsAwarded {
            user_id: user_id.to_string(),
            action: action.to_string(),
            pc_change: pc_delta,
            pcon_change: pcon_delta,
            pc_total: entry.pc_points_total,
            pcon_total: entry.pcon_points_total,
        });

        self.refresh_rank(user_id, entry.pc_points_total, entry.pcon_points_total)
            .await?;

        info!(
            user_id = %user_id,
            action = %action,
            pc = pc_delta,
            pcon = pcon_delta,
            "Points awarded"
        );

        Ok(PointsAward {
            action: action.to_string(),
            pc_points: pc_delta,
            pcon_points: pcon_delta,
            total_pc: entry.pc_points_total,
            total_pcon: entry.pcon_points_total,
        })
    }

    /// Recomputes the rank for the given totals and persists it only when
    /// it differs from the stored one
    async fn refresh_rank(
        &self,
        user_id: &str,
        pc_total: i64,
        pcon_total: i64,
    ) -> Result<String, AppError> {
        let computed = self.rank_table.evaluate(pc_total, pcon_total).to_string();

        let stored = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if stored.rank != computed {
            self.users.set_rank(user_id, &computed).await?;
            info!(user_id = %user_id, rank = %computed, "User rank updated");
            self.event_bus.emit(GamificationEvent::RankChanged {
                user_id: user_id.to_string(),
                previous_rank: stored.rank,
                new_rank: computed.clone(),
            });
        }

        Ok(computed)
    }

    /// Administrative re-sync of the stored rank from the stored totals
    #[instrument(skip(self))]
    pub async fn update_user_rank(&self, user_id: &str) -> Result<String, AppError> {
        let user = self
            .users
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        self.refresh_rank(user_id, user.pc_points, user.pcon_points)
            .await
    }

    /// A user's ledger history, most recent first. Advisory data: failures
    /// degrade to an empty list.
    #[instrument(skip(self))]
    pub async fn get_user_points_history(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Vec<super::models::PointsEntryModel> {
        match self.ledger.list_recent(user_id, limit).await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, user_id = %user_id, "Failed to load points history");
                Vec::new()
            }
        }
    }

    /// Ledger-wide distribution totals. Advisory data: failures degrade to
    /// zeroes.
    pub async fn distribution(&self) -> PointsDistribution {
        match self.ledger.distribution_totals().await {
            Ok(totals) => totals,
            Err(e) => {
                error!(error = %e, "Failed to compute distribution totals");
                PointsDistribution::default()
            }
        }
    }

    async fn current_totals(&self, user_id: &str) -> (i64, i64) {
        match self.users.get_user(user_id).await {
            Ok(Some(user)) => (user.pc_points, user.pcon_points),
            _ => (0, 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::models::actions;
    use crate::points::repository::InMemoryPointsLedger;
    use crate::users::{InMemoryUserRepository, UserModel};

    struct Fixture {
        service: PointsService,
        users: Arc<InMemoryUserRepository>,
        event_bus: EventBus,
    }

    fn fixture_with_user(user_id: &str) -> Fixture {
        let config = Arc::new(GamificationConfig::default());
        let users = Arc::new(InMemoryUserRepository::with_users(vec![UserModel::new(
            user_id.to_string(),
            format!("user-{}", user_id),
            "Iniciante",
        )]));
        let ledger = Arc::new(InMemoryPointsLedger::new(users.clone()));
        let event_bus = EventBus::with_default_capacity();
        let service = PointsService::new(config, ledger, users.clone(), event_bus.clone());
        Fixture {
            service,
            users,
            event_bus,
        }
    }

    #[tokio::test]
    async fn award_for_configured_action_updates_both_currencies() {
        let fx = fixture_with_user("u1");

        let award = fx
            .service
            .award_for_action("u1", actions::ANSWER_ACCEPTED, None)
            .await
            .unwrap();

        assert_eq!(award.pc_points, 25);
        assert_eq!(award.pcon_points, 5);
        assert_eq!(award.total_pc, 25);
        assert_eq!(award.total_pcon, 5);
    }

    #[tokio::test]
    async fn unconfigured_action_is_a_noop() {
        let fx = fixture_with_user("u1");

        let award = fx
            .service
            .award_for_action("u1", "made_coffee", None)
            .await
            .unwrap();

        assert!(award.is_noop());
        assert_eq!(award.total_pc, 0);
    }

    #[tokio::test]
    async fn award_for_unknown_user_fails_not_found() {
        let fx = fixture_with_user("u1");

        let result = fx
            .service
            .award_for_action("ghost", actions::ANSWER_CREATED, None)
            .await;
        assert!(matches!(result.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn downvotes_never_push_totals_negative() {
        let fx = fixture_with_user("u1");

        let award = fx
            .service
            .award_for_action("u1", actions::RECEIVED_DOWNVOTE, None)
            .await
            .unwrap();

        assert_eq!(award.pc_points, -1);
        assert_eq!(award.total_pc, 0);
    }

    #[tokio::test]
    async fn crossing_a_tier_boundary_updates_rank_once() {
        let fx = fixture_with_user("u1");
        let mut receiver = fx.event_bus.subscribe();

        fx.service
            .award_bonus("u1", "backfill", 60, 30, None)
            .await
            .unwrap();

        let user = fx.users.get_user("u1").await.unwrap().unwrap();
        assert_eq!(user.rank, "Colaborador");

        // PointsAwarded then RankChanged
        let first = receiver.recv().await.unwrap();
        assert_eq!(first.event_type(), "points_awarded");
        let second = receiver.recv().await.unwrap();
        assert_eq!(second.event_type(), "rank_changed");

        // Same totals, no further rank event
        fx.service
            .update_user_rank("u1")
            .await
            .unwrap();
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn once_per_day_award_pays_a_single_time() {
        let fx = fixture_with_user("u1");

        let first = fx
            .service
            .award_once_per_day("u1", actions::DAILY_LOGIN, None)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = fx
            .service
            .award_once_per_day("u1", actions::DAILY_LOGIN, None)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn history_lists_most_recent_first() {
        let fx = fixture_with_user("u1");

        fx.service
            .award_for_action("u1", actions::QUESTION_CREATED, None)
            .await
            .unwrap();
        fx.service
            .award_for_action("u1", actions::ANSWER_CREATED, None)
            .await
            .unwrap();

        let history = fx.service.get_user_points_history("u1", 10).await;
        assert_eq!(history.len(), 2);
        assert!(history[0].created_at >= history[1].created_at);
    }
}
