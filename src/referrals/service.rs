use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use super::models::{ReferralMilestone, ReferralRewardModel};
use super::repository::{ReferralRecordOutcome, ReferralRepository};
use crate::config::GamificationConfig;
use crate::event::{EventBus, GamificationEvent};
use crate::points::models::{actions, TargetRef};
use crate::points::service::PointsService;
use crate::shared::AppError;

/// Referral tracker: one referrer per referred user, a signup bonus on
/// creation, and one-time milestone payouts to the referrer
pub struct ReferralService {
    repository: Arc<dyn ReferralRepository>,
    points: Arc<PointsService>,
    config: Arc<GamificationConfig>,
    event_bus: EventBus,
}

impl ReferralService {
    pub fn new(
        repository: Arc<dyn ReferralRepository>,
        points: Arc<PointsService>,
        config: Arc<GamificationConfig>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            repository,
            points,
            config,
            event_bus,
        }
    }

    /// Records the referral relationship and pays the referrer the signup
    /// bonus. Fails with Conflict when the referred user already has a
    /// referrer. Self-referrals are rejected.
    #[instrument(skip(self))]
    pub async fn create_referral(
        &self,
        referrer_id: &str,
        referred_id: &str,
    ) -> Result<ReferralRewardModel, AppError> {
        if referrer_id == referred_id {
            return Err(AppError::Validation(
                "Users cannot refer themselves".to_string(),
            ));
        }

        let bonus = self
            .config
            .referral_bonus(ReferralMilestone::Signup)
            .unwrap_or(crate::config::ReferralBonus {
                pc_reward: 0,
                pcon_reward: 0,
            });

        let reward = ReferralRewardModel::new(
            referrer_id,
            referred_id,
            ReferralMilestone::Signup,
            bonus.pc_reward,
            bonus.pcon_reward,
        );
        let reward = self.repository.create_referral(&reward).await?;

        self.points
            .award_bonus(
                referrer_id,
                actions::REFERRAL_SIGNUP,
                reward.pc_reward,
                reward.pcon_reward,
                Some(&TargetRef::new(referred_id, "referral")),
            )
            .await?;

        info!(
            referrer_id = %referrer_id,
            referred_id = %referred_id,
            "Referral created"
        );
        self.event_bus.emit(GamificationEvent::ReferralMilestoneReached {
            referrer_id: referrer_id.to_string(),
            referred_id: referred_id.to_string(),
            milestone: ReferralMilestone::Signup.to_string(),
        });

        Ok(reward)
    }

    /// Pays the referrer when the referred user reaches a milestone.
    /// A no-op when the user was never referred or the milestone was
    /// already paid.
    #[instrument(skip(self))]
    pub async fn check_milestone(
        &self,
        user_id: &str,
        milestone: ReferralMilestone,
    ) -> Result<Option<ReferralRewardModel>, AppError> {
        let Some(referral) = self.repository.referral_for(user_id).await? else {
            debug!(user_id = %user_id, "No referral on record, nothing to pay");
            return Ok(None);
        };

        let Some(bonus) = self.config.referral_bonus(milestone) else {
            warn!(milestone = %milestone, "No reward configured for referral milestone");
            return Ok(None);
        };

        let reward = ReferralRewardModel::new(
            &referral.referrer_id,
            user_id,
            milestone,
            bonus.pc_reward,
            bonus.pcon_reward,
        );

        match self.repository.record_milestone(&reward).await? {
            ReferralRecordOutcome::Recorded(reward) => {
                self.points
                    .award_bonus(
                        &referral.referrer_id,
                        actions::REFERRAL_MILESTONE,
                        reward.pc_reward,
                        reward.pcon_reward,
                        Some(&TargetRef::new(user_id, "referral_milestone")),
                    )
                    .await?;

                info!(
                    referrer_id = %referral.referrer_id,
                    referred_id = %user_id,
                    milestone = %milestone,
                    "Referral milestone paid"
                );
                self.event_bus
                    .emit(GamificationEvent::ReferralMilestoneReached {
                        referrer_id: referral.referrer_id.clone(),
                        referred_id: user_id.to_string(),
                        milestone: milestone.to_string(),
                    });

                Ok(Some(reward))
            }
            ReferralRecordOutcome::AlreadyRecorded(_) => {
                debug!(
                    referred_id = %user_id,
                    milestone = %milestone,
                    "Milestone already paid, skipping"
                );
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::points::repository::InMemoryPointsLedger;
    use crate::referrals::repository::InMemoryReferralRepository;
    use crate::users::{InMemoryUserRepository, UserModel, UserRepository};

    struct Fixture {
        service: ReferralService,
        users: Arc<InMemoryUserRepository>,
    }

    fn fixture() -> Fixture {
        let config = Arc::new(GamificationConfig::default());
        let users = Arc::new(InMemoryUserRepository::with_users(
            ["alice", "bob", "carol"]
                .iter()
                .map(|id| UserModel::new(id.to_string(), id.to_string(), "Iniciante"))
                .collect(),
        ));
        let ledger = Arc::new(InMemoryPointsLedger::new(users.clone()));
        let event_bus = EventBus::with_default_capacity();
        let points = Arc::new(PointsService::new(
            config.clone(),
            ledger,
            users.clone(),
            event_bus.clone(),
        ));
        let service = ReferralService::new(
            Arc::new(InMemoryReferralRepository::new()),
            points,
            config,
            event_bus,
        );
        Fixture { service, users }
    }

    #[tokio::test]
    async fn signup_pays_the_referrer() {
        let fx = fixture();

        let reward = fx.service.create_referral("alice", "carol").await.unwrap();
        assert_eq!(reward.pc_reward, 10);
        assert_eq!(reward.pcon_reward, 5);

        let alice = fx.users.get_user("alice").await.unwrap().unwrap();
        assert_eq!(alice.pc_points, 10);
        assert_eq!(alice.pcon_points, 5);
    }

    #[tokio::test]
    async fn duplicate_referral_conflicts() {
        let fx = fixture();

        fx.service.create_referral("alice", "carol").await.unwrap();
        let result = fx.service.create_referral("bob", "carol").await;
        assert!(matches!(result.unwrap_err(), AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn self_referral_is_rejected() {
        let fx = fixture();
        let result = fx.service.create_referral("alice", "alice").await;
        assert!(matches!(result.unwrap_err(), AppError::Validation(_)));
    }

    #[tokio::test]
    async fn milestone_pays_once() {
        let fx = fixture();
        fx.service.create_referral("alice", "carol").await.unwrap();

        let paid = fx
            .service
            .check_milestone("carol", ReferralMilestone::FirstAnswer)
            .await
            .unwrap();
        assert!(paid.is_some());

        let repeat = fx
            .service
            .check_milestone("carol", ReferralMilestone::FirstAnswer)
            .await
            .unwrap();
        assert!(repeat.is_none());

        // signup 10 + first_answer 10
        let alice = fx.users.get_user("alice").await.unwrap().unwrap();
        assert_eq!(alice.pc_points, 20);
    }

    #[tokio::test]
    async fn milestone_without_referral_is_a_noop() {
        let fx = fixture();

        let paid = fx
            .service
            .check_milestone("bob", ReferralMilestone::FirstQuestion)
            .await
            .unwrap();
        assert!(paid.is_none());
    }
}
