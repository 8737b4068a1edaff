use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kudos::api;
use kudos::config::GamificationConfig;
use kudos::engine::GamificationEngine;
use kudos::event::EventBus;
use kudos::shared::AppState;
use kudos::leaderboards::refresh_task::{start_refresh_task, RefreshConfig};
use kudos::streaks::cleanup_task::{start_sweep_task, SweepConfig};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kudos=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting kudos gamification server");

    let config = GamificationConfig::load();
    let event_bus = EventBus::with_default_capacity();

    // Storage selection: PostgreSQL when DATABASE_URL is set, in-memory
    // otherwise (development and tests)
    let engine: Arc<GamificationEngine> = match std::env::var("DATABASE_URL") {
        Ok(database_url) => {
            let pool = sqlx::PgPool::connect(&database_url)
                .await
                .expect("Failed to connect to database");
            sqlx::migrate!("./migrations")
                .run(&pool)
                .await
                .expect("Failed to run migrations");
            GamificationEngine::postgres(config, pool, event_bus.clone())
        }
        Err(_) => {
            info!("No DATABASE_URL set, using in-memory repositories");
            let (engine, _handles) = GamificationEngine::in_memory(config, event_bus.clone());
            engine
        }
    };

    // Catalogs are seeded idempotently on every boot
    engine
        .initialize_catalogs()
        .await
        .expect("Failed to seed gamification catalogs");

    // Background maintenance: flag stale streaks inactive and keep the
    // leaderboard snapshots fresh
    {
        let streaks = engine.streak_service();
        tokio::spawn(async move {
            start_sweep_task(streaks, SweepConfig::default()).await;
        });

        let leaderboards = engine.leaderboard_service();
        tokio::spawn(async move {
            start_refresh_task(leaderboards, RefreshConfig::default()).await;
        });
    }

    let app_state = AppState::new(engine, event_bus);
    let app = api::router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
    info!("Server running on http://localhost:3000");
    axum::serve(listener, app).await.unwrap();
}
