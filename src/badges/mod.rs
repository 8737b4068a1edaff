pub mod catalog;
pub mod models;
pub mod repository;
pub mod service;

pub use models::{BadgeFilters, BadgeModel, BadgeType, UserBadgeModel};
pub use repository::{BadgeRepository, InMemoryBadgeRepository, PostgresBadgeRepository};
pub use service::BadgeService;
