use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

use crate::achievements::models::{
    AchievementCategory, AchievementFilters, AchievementProgress, AchievementRarity,
};
use crate::badges::models::{BadgeFilters, BadgeType, UserBadgeModel};
use crate::engine::{
    AwardOutcome, BulkCheckSummary, CatalogSummary, DailyLoginOutcome, EarnedAchievement,
    GamificationDashboard, GamificationStats, StreakOutcome, UserGamificationProfile,
};
use crate::leaderboards::models::{LeaderboardModel, LeaderboardType};
use crate::points::models::{PointsEntryModel, TargetRef};
use crate::referrals::models::{ReferralMilestone, ReferralRewardModel};
use crate::shared::{AppError, AppState};
use crate::streaks::models::{StreakModel, StreakType};

/// Per-request identity injected by the upstream identity collaborator.
/// The engine trusts these headers; authentication happens upstream.
struct Identity {
    user_id: String,
    is_admin: bool,
}

fn identity(headers: &HeaderMap) -> Result<Identity, AppError> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing x-user-id header".to_string()))?;

    let is_admin = headers
        .get("x-is-admin")
        .and_then(|value| value.to_str().ok())
        .map(|value| value == "true")
        .unwrap_or(false);

    Ok(Identity {
        user_id: user_id.to_string(),
        is_admin,
    })
}

fn require_admin(identity: &Identity) -> Result<(), AppError> {
    if identity.is_admin {
        Ok(())
    } else {
        Err(AppError::Unauthorized("Admin access required".to_string()))
    }
}

/// Builds the HTTP router over the shared application state
pub fn router(state: AppState) -> Router {
    Router::new()
        // Points
        .route("/api/gamification/points/history", get(points_history))
        // Achievements
        .route("/api/gamification/achievements", get(achievement_progress))
        .route(
            "/api/gamification/achievements/check",
            post(check_achievements),
        )
        // Badges
        .route("/api/gamification/badges", get(user_badges))
        // Streaks
        .route("/api/gamification/streaks", get(user_streaks))
        .route(
            "/api/gamification/streaks/:streak_type",
            post(update_streak),
        )
        .route("/api/gamification/daily-login", post(daily_login))
        // Leaderboards
        .route("/api/gamification/leaderboards", get(list_leaderboards))
        .route(
            "/api/gamification/leaderboards/:leaderboard_type",
            get(get_leaderboard),
        )
        // Dashboard and profiles
        .route("/api/gamification/dashboard", get(dashboard))
        .route("/api/gamification/profile/:user_id", get(profile))
        .route("/api/gamification/stats", get(stats))
        // Referrals
        .route("/api/gamification/referrals", post(create_referral))
        .route(
            "/api/gamification/referrals/milestone",
            post(referral_milestone),
        )
        // Administrative surface
        .route("/api/admin/gamification/initialize", post(initialize))
        .route("/api/admin/gamification/points/award", post(admin_award_points))
        .route("/api/admin/gamification/rank/resync", post(admin_resync_rank))
        .route("/api/admin/gamification/badges/award", post(admin_award_badge))
        .route(
            "/api/admin/gamification/achievements/check-all",
            post(admin_check_all),
        )
        .route(
            "/api/admin/gamification/leaderboards/generate",
            post(admin_generate_leaderboards),
        )
        .route(
            "/api/admin/gamification/leaderboards/:leaderboard_type/generate",
            post(admin_generate_leaderboard),
        )
        .route(
            "/api/admin/gamification/streaks/inactive",
            delete(admin_sweep_streaks),
        )
        .route(
            "/api/admin/gamification/achievements/catalog",
            get(admin_achievement_catalog),
        )
        .route(
            "/api/admin/gamification/badges/catalog",
            get(admin_badge_catalog),
        )
        .with_state(state)
}

// ===========================================================================
// Points
// ===========================================================================

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    limit: i64,
}

fn default_history_limit() -> i64 {
    50
}

async fn points_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<PointsEntryModel>>, AppError> {
    let identity = identity(&headers)?;
    let history = state
        .engine
        .get_user_points_history(&identity.user_id, query.limit.clamp(1, 500))
        .await;
    Ok(Json(history))
}

// ===========================================================================
// Achievements
// ===========================================================================

#[derive(Deserialize)]
struct AchievementQuery {
    category: Option<String>,
    rarity: Option<String>,
    is_earned: Option<bool>,
    is_hidden: Option<bool>,
    search: Option<String>,
}

async fn achievement_progress(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AchievementQuery>,
) -> Result<Json<Vec<AchievementProgress>>, AppError> {
    let identity = identity(&headers)?;

    let filters = AchievementFilters {
        category: parse_filter(query.category.as_deref(), AchievementCategory::parse, "category")?,
        rarity: parse_filter(query.rarity.as_deref(), AchievementRarity::parse, "rarity")?,
        is_earned: query.is_earned,
        is_hidden: query.is_hidden,
        search: query.search,
    };

    let progress = state
        .engine
        .get_user_achievement_progress(&identity.user_id, &filters)
        .await;
    Ok(Json(progress))
}

async fn check_achievements(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<EarnedAchievement>>, AppError> {
    let identity = identity(&headers)?;
    Ok(Json(state.engine.check_achievements(&identity.user_id).await))
}

// ===========================================================================
// Badges
// ===========================================================================

#[derive(Deserialize)]
struct BadgeQuery {
    badge_type: Option<String>,
    is_featured: Option<bool>,
    search: Option<String>,
}

async fn user_badges(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BadgeQuery>,
) -> Result<Json<Vec<UserBadgeModel>>, AppError> {
    let identity = identity(&headers)?;

    let filters = BadgeFilters {
        badge_type: parse_filter(query.badge_type.as_deref(), BadgeType::parse, "badge_type")?,
        is_featured: query.is_featured,
        search: query.search,
    };

    Ok(Json(
        state.engine.get_user_badges(&identity.user_id, &filters).await,
    ))
}

// ===========================================================================
// Streaks
// ===========================================================================

async fn user_streaks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<StreakModel>>, AppError> {
    let identity = identity(&headers)?;
    Ok(Json(state.engine.get_user_streaks(&identity.user_id).await))
}

async fn update_streak(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(streak_type): Path<String>,
) -> Result<Json<StreakOutcome>, AppError> {
    let identity = identity(&headers)?;
    let streak_type = StreakType::parse(&streak_type)
        .ok_or_else(|| AppError::Validation(format!("Unknown streak type {streak_type}")))?;

    let outcome = state
        .engine
        .update_streak(&identity.user_id, streak_type)
        .await?;
    Ok(Json(outcome))
}

async fn daily_login(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DailyLoginOutcome>, AppError> {
    let identity = identity(&headers)?;
    let outcome = state.engine.award_daily_login(&identity.user_id).await?;
    Ok(Json(outcome))
}

// ===========================================================================
// Leaderboards
// ===========================================================================

async fn list_leaderboards() -> Json<Vec<String>> {
    Json(LeaderboardType::iter().map(|t| t.to_string()).collect())
}

#[derive(Serialize)]
struct LeaderboardResponse {
    leaderboard: LeaderboardModel,
    user_position: Option<i64>,
}

#[derive(Deserialize)]
struct LeaderboardQuery {
    #[serde(default = "default_leaderboard_limit")]
    limit: i64,
}

fn default_leaderboard_limit() -> i64 {
    100
}

async fn get_leaderboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(leaderboard_type): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let identity = identity(&headers)?;
    let leaderboard_type = parse_leaderboard_type(&leaderboard_type)?;

    // Serve the stored snapshot, generating the first one on demand
    let leaderboard = match state.engine.get_leaderboard(leaderboard_type).await {
        Some(snapshot) => snapshot,
        None => {
            state
                .engine
                .generate_leaderboard(leaderboard_type, query.limit.clamp(1, 500))
                .await?
        }
    };

    let user_position = leaderboard
        .entries
        .iter()
        .find(|entry| entry.user_id == identity.user_id)
        .map(|entry| entry.position);

    Ok(Json(LeaderboardResponse {
        leaderboard,
        user_position,
    }))
}

// ===========================================================================
// Dashboard, profile, stats
// ===========================================================================

async fn dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<GamificationDashboard>, AppError> {
    let identity = identity(&headers)?;
    Ok(Json(state.engine.get_dashboard(&identity.user_id).await?))
}

async fn profile(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserGamificationProfile>, AppError> {
    Ok(Json(state.engine.get_profile(&user_id).await?))
}

async fn stats(State(state): State<AppState>) -> Json<GamificationStats> {
    Json(state.engine.get_stats().await)
}

// ===========================================================================
// Referrals
// ===========================================================================

#[derive(Deserialize)]
struct CreateReferralRequest {
    referred_id: String,
}

async fn create_referral(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateReferralRequest>,
) -> Result<Json<ReferralRewardModel>, AppError> {
    let identity = identity(&headers)?;
    let reward = state
        .engine
        .create_referral(&identity.user_id, &request.referred_id)
        .await?;
    Ok(Json(reward))
}

#[derive(Deserialize)]
struct ReferralMilestoneRequest {
    milestone: String,
}

#[derive(Serialize)]
struct ReferralMilestoneResponse {
    paid: bool,
    reward: Option<ReferralRewardModel>,
}

async fn referral_milestone(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ReferralMilestoneRequest>,
) -> Result<Json<ReferralMilestoneResponse>, AppError> {
    let identity = identity(&headers)?;
    let milestone = ReferralMilestone::parse(&request.milestone).ok_or_else(|| {
        AppError::Validation(format!("Unknown referral milestone {}", request.milestone))
    })?;

    let reward = state
        .engine
        .check_referral_milestone(&identity.user_id, milestone)
        .await?;
    Ok(Json(ReferralMilestoneResponse {
        paid: reward.is_some(),
        reward,
    }))
}

// ===========================================================================
// Administrative surface
// ===========================================================================

async fn initialize(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CatalogSummary>, AppError> {
    let identity = identity(&headers)?;
    require_admin(&identity)?;
    Ok(Json(state.engine.initialize_catalogs().await?))
}

#[derive(Deserialize)]
struct AdminAwardPointsRequest {
    user_id: String,
    action: String,
    target_id: Option<String>,
    target_type: Option<String>,
}

async fn admin_award_points(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AdminAwardPointsRequest>,
) -> Result<Json<AwardOutcome>, AppError> {
    let identity = identity(&headers)?;
    require_admin(&identity)?;

    let target = match (request.target_id, request.target_type) {
        (Some(target_id), Some(target_type)) => Some(TargetRef::new(target_id, target_type)),
        _ => None,
    };

    let outcome = state
        .engine
        .award_points(&request.user_id, &request.action, target)
        .await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct AdminResyncRankRequest {
    user_id: String,
}

#[derive(Serialize)]
struct RankResponse {
    rank: String,
}

async fn admin_resync_rank(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AdminResyncRankRequest>,
) -> Result<Json<RankResponse>, AppError> {
    let identity = identity(&headers)?;
    require_admin(&identity)?;

    let rank = state.engine.update_user_rank(&request.user_id).await?;
    Ok(Json(RankResponse { rank }))
}

#[derive(Deserialize)]
struct AdminAwardBadgeRequest {
    user_id: String,
    badge_id: String,
    #[serde(default)]
    is_featured: bool,
}

async fn admin_award_badge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<AdminAwardBadgeRequest>,
) -> Result<Json<UserBadgeModel>, AppError> {
    let identity = identity(&headers)?;
    require_admin(&identity)?;

    let badge = state
        .engine
        .award_badge(&request.user_id, &request.badge_id, request.is_featured)
        .await?;
    Ok(Json(badge))
}

#[derive(Deserialize)]
struct BulkCheckQuery {
    #[serde(default = "default_bulk_limit")]
    limit: i64,
}

fn default_bulk_limit() -> i64 {
    100
}

async fn admin_check_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BulkCheckQuery>,
) -> Result<Json<BulkCheckSummary>, AppError> {
    let identity = identity(&headers)?;
    require_admin(&identity)?;
    Ok(Json(
        state.engine.check_all_users_achievements(query.limit).await?,
    ))
}

async fn admin_generate_leaderboards(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardModel>>, AppError> {
    let identity = identity(&headers)?;
    require_admin(&identity)?;
    Ok(Json(
        state
            .engine
            .generate_all_leaderboards(query.limit.clamp(1, 500))
            .await,
    ))
}

async fn admin_generate_leaderboard(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(leaderboard_type): Path<String>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardModel>, AppError> {
    let identity = identity(&headers)?;
    require_admin(&identity)?;
    let leaderboard_type = parse_leaderboard_type(&leaderboard_type)?;

    Ok(Json(
        state
            .engine
            .generate_leaderboard(leaderboard_type, query.limit.clamp(1, 500))
            .await?,
    ))
}

#[derive(Deserialize)]
struct SweepQuery {
    older_than_days: Option<i64>,
}

#[derive(Serialize)]
struct SweepResponse {
    flagged: u64,
}

async fn admin_achievement_catalog(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<crate::achievements::models::Achievement>>, AppError> {
    let identity = identity(&headers)?;
    require_admin(&identity)?;
    Ok(Json(state.engine.list_achievement_catalog().await?))
}

async fn admin_badge_catalog(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<crate::badges::models::BadgeModel>>, AppError> {
    let identity = identity(&headers)?;
    require_admin(&identity)?;
    Ok(Json(state.engine.list_badge_catalog().await?))
}

async fn admin_sweep_streaks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SweepQuery>,
) -> Result<Json<SweepResponse>, AppError> {
    let identity = identity(&headers)?;
    require_admin(&identity)?;

    let flagged = state
        .engine
        .sweep_inactive_streaks(query.older_than_days)
        .await?;
    Ok(Json(SweepResponse { flagged }))
}

// ===========================================================================
// Helpers
// ===========================================================================

fn parse_leaderboard_type(value: &str) -> Result<LeaderboardType, AppError> {
    LeaderboardType::parse(value)
        .ok_or_else(|| AppError::Validation(format!("Unknown leaderboard type {value}")))
}

fn parse_filter<T>(
    value: Option<&str>,
    parse: fn(&str) -> Option<T>,
    name: &str,
) -> Result<Option<T>, AppError> {
    match value {
        None => Ok(None),
        Some(raw) => parse(raw)
            .map(Some)
            .ok_or_else(|| AppError::Validation(format!("Unknown {name} {raw}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::test_app_state;
    use crate::users::{UserModel, UserRepository};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn request(
        router: Router,
        method: &str,
        uri: &str,
        user: Option<(&str, bool)>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((user_id, is_admin)) = user {
            builder = builder.header("x-user-id", user_id);
            if is_admin {
                builder = builder.header("x-is-admin", "true");
            }
        }

        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn missing_identity_header_is_unauthorized() {
        let (state, _) = test_app_state().await;
        let (status, _) = request(
            router(state),
            "GET",
            "/api/gamification/dashboard",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_routes_reject_regular_users() {
        let (state, _) = test_app_state().await;
        let (status, _) = request(
            router(state),
            "POST",
            "/api/admin/gamification/initialize",
            Some(("u1", false)),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn admin_award_flows_through_the_engine() {
        let (state, handles) = test_app_state().await;
        handles
            .users
            .create_user(&UserModel::new(
                "u1".to_string(),
                "user-u1".to_string(),
                "Iniciante",
            ))
            .await
            .unwrap();

        let (status, json) = request(
            router(state),
            "POST",
            "/api/admin/gamification/points/award",
            Some(("admin", true)),
            Some(serde_json::json!({
                "user_id": "u1",
                "action": "answer_created"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["award"]["pc_points"], 10);
    }

    #[tokio::test]
    async fn unknown_streak_type_is_a_validation_error() {
        let (state, handles) = test_app_state().await;
        handles
            .users
            .create_user(&UserModel::new(
                "u1".to_string(),
                "user-u1".to_string(),
                "Iniciante",
            ))
            .await
            .unwrap();

        let (status, _) = request(
            router(state),
            "POST",
            "/api/gamification/streaks/nonsense",
            Some(("u1", false)),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn admin_catalog_listing_returns_seeded_entries() {
        let (state, _) = test_app_state().await;
        let (status, json) = request(
            router(state),
            "GET",
            "/api/admin/gamification/badges/catalog",
            Some(("admin", true)),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let badges = json.as_array().unwrap();
        assert!(badges.iter().any(|b| b["id"] == "week_warrior"));
    }

    #[tokio::test]
    async fn leaderboard_listing_names_every_type() {
        let (state, _) = test_app_state().await;
        let (status, json) = request(
            router(state),
            "GET",
            "/api/gamification/leaderboards",
            Some(("u1", false)),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let names = json.as_array().unwrap();
        assert!(names.iter().any(|n| n == "weekly_pc"));
        assert!(names.iter().any(|n| n == "best_answers"));
    }
}
