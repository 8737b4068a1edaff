pub mod models;
pub mod repository;
pub mod service;

pub use models::{ReferralMilestone, ReferralRewardModel};
pub use repository::{
    InMemoryReferralRepository, PostgresReferralRepository, ReferralRepository,
};
pub use service::ReferralService;
