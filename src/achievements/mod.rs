pub mod catalog;
pub mod models;
pub mod repository;
pub mod service;

pub use models::{
    Achievement, AchievementCategory, AchievementCriteria, AchievementFilters,
    AchievementProgress, AchievementRarity, StatField, UserAchievementModel, UserStatistics,
};
pub use repository::{
    AchievementRepository, InMemoryAchievementRepository, PostgresAchievementRepository,
};
pub use service::AchievementService;
