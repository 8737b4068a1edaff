pub mod models;
pub mod refresh_task;
pub mod repository;
pub mod service;

pub use models::{LeaderboardEntry, LeaderboardModel, LeaderboardType, TimeWindow};
pub use repository::{
    InMemoryLeaderboardRepository, LeaderboardRepository, PostgresLeaderboardRepository,
};
pub use service::LeaderboardService;
