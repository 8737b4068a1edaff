use std::sync::Arc;
use tracing::{error, info, instrument};

use super::catalog::default_badges;
use super::models::{BadgeFilters, UserBadgeModel};
use super::repository::{BadgeAwardOutcome, BadgeRepository};
use crate::event::{EventBus, GamificationEvent};
use crate::shared::AppError;

/// Badge registry: catalog seeding, idempotent awarding, filtered listing
pub struct BadgeService {
    repository: Arc<dyn BadgeRepository>,
    event_bus: EventBus,
}

impl BadgeService {
    pub fn new(repository: Arc<dyn BadgeRepository>, event_bus: EventBus) -> Self {
        Self {
            repository,
            event_bus,
        }
    }

    /// Seeds the built-in catalog; safe to call repeatedly
    #[instrument(skip(self))]
    pub async fn initialize_badges(&self) -> Result<usize, AppError> {
        let mut inserted = 0;
        for badge in default_badges() {
            if self.repository.insert_badge_if_absent(&badge).await? {
                inserted += 1;
            }
        }
        info!(inserted, "Badge catalog initialized");
        Ok(inserted)
    }

    /// The whole catalog in sort order, for administrative listings
    pub async fn list_badges(&self) -> Result<Vec<super::models::BadgeModel>, AppError> {
        self.repository.list_badges().await
    }

    /// Awards a badge to a user. Awarding an already-held badge returns
    /// the existing record unchanged.
    #[instrument(skip(self))]
    pub async fn award_badge(
        &self,
        user_id: &str,
        badge_id: &str,
        is_featured: bool,
    ) -> Result<UserBadgeModel, AppError> {
        let badge = self
            .repository
            .get_badge(badge_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Badge {badge_id} not found")))?;

        let outcome = self
            .repository
            .try_award(&UserBadgeModel::new(user_id, badge_id, is_featured))
            .await?;

        if let BadgeAwardOutcome::Awarded(_) = &outcome {
            info!(user_id = %user_id, badge = %badge.name, "Badge awarded");
            self.event_bus.emit(GamificationEvent::BadgeAwarded {
                user_id: user_id.to_string(),
                badge_id: badge_id.to_string(),
            });
        }

        let mut record = outcome.into_record();
        record.badge = Some(badge);
        Ok(record)
    }

    /// A user's badges joined with their catalog entries, filtered and
    /// sorted by earn date, newest first. Advisory data: failures degrade
    /// to an empty list.
    #[instrument(skip(self, filters))]
    pub async fn get_user_badges(
        &self,
        user_id: &str,
        filters: &BadgeFilters,
    ) -> Vec<UserBadgeModel> {
        let (user_badges, catalog) = match (
            self.repository.user_badges(user_id).await,
            self.repository.list_badges().await,
        ) {
            (Ok(user_badges), Ok(catalog)) => (user_badges, catalog),
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, user_id = %user_id, "Failed to load user badges");
                return Vec::new();
            }
        };

        let mut result: Vec<UserBadgeModel> = user_badges
            .into_iter()
            .filter(|ub| {
                filters
                    .is_featured
                    .map_or(true, |featured| ub.is_featured == featured)
            })
            .filter_map(|mut ub| {
                let badge = catalog.iter().find(|b| b.id == ub.badge_id)?.clone();

                if let Some(badge_type) = filters.badge_type {
                    if badge.badge_type != badge_type {
                        return None;
                    }
                }
                if let Some(search) = &filters.search {
                    let needle = search.to_lowercase();
                    if !badge.name.to_lowercase().contains(&needle)
                        && !badge.description.to_lowercase().contains(&needle)
                    {
                        return None;
                    }
                }

                ub.badge = Some(badge);
                Some(ub)
            })
            .collect();

        result.sort_by(|a, b| b.earned_at.cmp(&a.earned_at));
        result
    }

    /// Total badges held by a user, for profile summaries
    pub async fn badge_count(&self, user_id: &str) -> usize {
        self.repository
            .user_badges(user_id)
            .await
            .map(|badges| badges.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badges::models::BadgeType;
    use crate::badges::repository::InMemoryBadgeRepository;

    fn service() -> BadgeService {
        BadgeService::new(
            Arc::new(InMemoryBadgeRepository::new()),
            EventBus::with_default_capacity(),
        )
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let service = service();

        let first = service.initialize_badges().await.unwrap();
        let second = service.initialize_badges().await.unwrap();

        assert!(first > 0);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn award_unknown_badge_fails_not_found() {
        let service = service();
        service.initialize_badges().await.unwrap();

        let result = service.award_badge("u1", "no_such_badge", false).await;
        assert!(matches!(result.unwrap_err(), AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn double_award_returns_same_record() {
        let service = service();
        service.initialize_badges().await.unwrap();

        let first = service.award_badge("u1", "early_adopter", false).await.unwrap();
        let second = service.award_badge("u1", "early_adopter", false).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(service.badge_count("u1").await, 1);
    }

    #[tokio::test]
    async fn listing_filters_by_type_and_sorts_newest_first() {
        let service = service();
        service.initialize_badges().await.unwrap();

        service.award_badge("u1", "rank_iniciante", false).await.unwrap();
        service.award_badge("u1", "early_adopter", false).await.unwrap();

        let all = service.get_user_badges("u1", &BadgeFilters::default()).await;
        assert_eq!(all.len(), 2);
        assert!(all[0].earned_at >= all[1].earned_at);

        let special = service
            .get_user_badges(
                "u1",
                &BadgeFilters {
                    badge_type: Some(BadgeType::Special),
                    ..BadgeFilters::default()
                },
            )
            .await;
        assert_eq!(special.len(), 1);
        assert_eq!(special[0].badge_id, "early_adopter");
    }
}
