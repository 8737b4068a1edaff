use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, instrument};

use super::service::StreakService;

/// Configuration for the streak maintenance sweep
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// How often to run the sweep
    pub sweep_interval: Duration,
    /// Override for the inactivity threshold in days; None uses the
    /// gamification config value
    pub older_than_days: Option<i64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(6 * 60 * 60), // 6 hours
            older_than_days: None,
        }
    }
}

/// Starts the background task that periodically flags stale streaks
/// inactive. Counters are never touched; only `is_active` flips.
#[instrument(skip(streak_service))]
pub async fn start_sweep_task(streak_service: Arc<StreakService>, config: SweepConfig) {
    info!(
        sweep_interval_secs = config.sweep_interval.as_secs(),
        "Starting streak sweep background task"
    );

    let mut sweep_interval = interval(config.sweep_interval);

    loop {
        sweep_interval.tick().await;

        match streak_service.sweep_inactive(config.older_than_days).await {
            Ok(flagged) => {
                info!(flagged, "Streak sweep completed");
            }
            Err(e) => {
                error!(error = %e, "Streak sweep failed");
            }
        }
    }
}
