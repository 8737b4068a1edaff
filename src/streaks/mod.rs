pub mod cleanup_task;
pub mod models;
pub mod repository;
pub mod service;

pub use models::{StreakModel, StreakTransition, StreakType};
pub use repository::{InMemoryStreakRepository, PostgresStreakRepository, StreakRepository};
pub use service::{StreakService, StreakUpdate};
