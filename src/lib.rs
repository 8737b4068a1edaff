// Library crate for the kudos gamification engine
// This file exposes the public API for integration tests

pub mod achievements;
pub mod api;
pub mod badges;
pub mod config;
pub mod content;
pub mod engine;
pub mod event;
pub mod leaderboards;
pub mod points;
pub mod rank;
pub mod referrals;
pub mod shared;
pub mod streaks;
pub mod users;

// Re-export commonly used types for easier access in tests
pub use config::GamificationConfig;
pub use engine::{GamificationEngine, InMemoryHandles};
pub use event::{EventBus, GamificationEvent};
pub use shared::{AppError, AppState};
