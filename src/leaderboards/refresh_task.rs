use std::sync::Arc;
use std::time::Duration;
use strum::IntoEnumIterator;
use tokio::time::interval;
use tracing::{info, instrument, warn};

use super::models::LeaderboardType;
use super::service::LeaderboardService;

/// Configuration for the scheduled leaderboard regeneration
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// How often to regenerate every board
    pub refresh_interval: Duration,
    /// Entries kept per board
    pub limit: i64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(15 * 60), // 15 minutes
            limit: 100,
        }
    }
}

/// Starts the background task that periodically regenerates every
/// leaderboard type. Boards are also generated on demand; this keeps the
/// snapshots fresh between requests.
#[instrument(skip(leaderboard_service))]
pub async fn start_refresh_task(leaderboard_service: Arc<LeaderboardService>, config: RefreshConfig) {
    info!(
        refresh_interval_secs = config.refresh_interval.as_secs(),
        "Starting leaderboard refresh background task"
    );

    let mut refresh_interval = interval(config.refresh_interval);

    loop {
        refresh_interval.tick().await;

        let mut refreshed = 0;
        for leaderboard_type in LeaderboardType::iter() {
            match leaderboard_service
                .generate(leaderboard_type, config.limit)
                .await
            {
                Ok(_) => refreshed += 1,
                Err(e) => {
                    warn!(
                        error = %e,
                        leaderboard_type = %leaderboard_type,
                        "Scheduled leaderboard refresh failed"
                    );
                }
            }
        }
        info!(refreshed, "Leaderboard refresh completed");
    }
}
