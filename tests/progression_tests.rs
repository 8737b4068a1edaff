mod utils;
use utils::TestSetupBuilder;

use chrono::{Duration, Utc};

use kudos::leaderboards::models::LeaderboardType;
use kudos::points::models::actions;
use kudos::points::repository::PointsLedgerRepository;
use kudos::referrals::models::ReferralMilestone;
use kudos::streaks::models::StreakType;
use kudos::users::UserRepository;

#[tokio::test]
async fn seven_day_login_streak_pays_the_milestone_once() {
    let setup = TestSetupBuilder::new().with_single_user().build().await;
    let today = Utc::now().date_naive();

    // Walk six prior days directly through the streak service, then let
    // the engine settle today's activity (the milestone day)
    let streaks = setup.engine.streak_service();
    for offset in (1..7).rev() {
        streaks
            .record_activity_on("alice", StreakType::DailyLogin, today - Duration::days(offset))
            .await
            .unwrap();
    }

    let outcome = setup
        .engine
        .update_streak("alice", StreakType::DailyLogin)
        .await
        .unwrap();

    assert_eq!(outcome.streak.current_count, 7);
    assert_eq!(outcome.milestone, Some(7));
    assert_eq!(outcome.next_milestone, Some(30));

    // Milestone bonus: 10 PC / 5 PCon, plus the week_warrior badge and
    // the week_warrior achievement (25 PC / 15 PCon)
    let badges = setup
        .engine
        .get_user_badges("alice", &kudos::badges::models::BadgeFilters::default())
        .await;
    assert!(badges.iter().any(|b| b.badge_id == "week_warrior"));

    assert!(outcome
        .new_achievements
        .iter()
        .any(|e| e.achievement.id == "week_warrior"));

    let alice = setup
        .handles
        .users
        .get_user("alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.pc_points, 10 + 25);
    assert_eq!(alice.pcon_points, 5 + 15);

    // Same-day re-entry neither increments nor repays
    let again = setup
        .engine
        .update_streak("alice", StreakType::DailyLogin)
        .await
        .unwrap();
    assert_eq!(again.streak.current_count, 7);
    assert_eq!(again.milestone, None);

    let alice = setup
        .handles
        .users
        .get_user("alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.pc_points, 35);
}

#[tokio::test]
async fn broken_streak_restarts_but_keeps_best() {
    let setup = TestSetupBuilder::new().with_single_user().build().await;
    let today = Utc::now().date_naive();

    let streaks = setup.engine.streak_service();
    for offset in (8..13).rev() {
        streaks
            .record_activity_on("alice", StreakType::DailyActivity, today - Duration::days(offset))
            .await
            .unwrap();
    }

    let outcome = setup
        .engine
        .update_streak("alice", StreakType::DailyActivity)
        .await
        .unwrap();

    assert_eq!(outcome.streak.current_count, 1);
    assert_eq!(outcome.streak.best_count, 5);
}

#[tokio::test]
async fn daily_login_claims_once_per_calendar_day() {
    let setup = TestSetupBuilder::new().with_single_user().build().await;

    let first = setup.engine.award_daily_login("alice").await.unwrap();
    assert!(first.award.is_some());

    let second = setup.engine.award_daily_login("alice").await.unwrap();
    assert!(second.award.is_none());

    let alice = setup
        .handles
        .users
        .get_user("alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.pc_points, 1);
}

#[tokio::test]
async fn weekly_leaderboard_sums_this_weeks_deltas() {
    let setup = TestSetupBuilder::new()
        .with_users(vec!["alice", "bob"])
        .build()
        .await;

    // alice: 10 + 15 this week; bob: 3
    setup
        .handles
        .ledger
        .record_award("alice", "received_upvote", 10, 0, None)
        .await
        .unwrap();
    setup
        .handles
        .ledger
        .record_award("alice", "received_upvote", 15, 0, None)
        .await
        .unwrap();
    setup
        .engine
        .award_points("bob", actions::RECEIVED_UPVOTE, None)
        .await
        .unwrap();

    let board = setup
        .engine
        .generate_leaderboard(LeaderboardType::WeeklyPc, 50)
        .await
        .unwrap();

    assert_eq!(board.entries[0].user_id, "alice");
    assert_eq!(board.entries[0].score, 25);
    assert_eq!(board.entries[0].position, 1);
    assert_eq!(board.entries[1].user_id, "bob");

    assert_eq!(
        setup
            .engine
            .get_user_leaderboard_position("alice", LeaderboardType::WeeklyPc)
            .await,
        Some(1)
    );
    assert_eq!(
        setup
            .engine
            .get_user_leaderboard_position("carol", LeaderboardType::WeeklyPc)
            .await,
        None
    );
}

#[tokio::test]
async fn regenerating_replaces_the_snapshot() {
    let setup = TestSetupBuilder::new()
        .with_users(vec!["alice", "bob"])
        .build()
        .await;

    setup
        .engine
        .award_points("alice", actions::ANSWER_CREATED, None)
        .await
        .unwrap();
    setup
        .engine
        .generate_leaderboard(LeaderboardType::WeeklyPc, 50)
        .await
        .unwrap();

    setup
        .engine
        .award_points("bob", actions::ANSWER_ACCEPTED, None)
        .await
        .unwrap();
    let board = setup
        .engine
        .generate_leaderboard(LeaderboardType::WeeklyPc, 50)
        .await
        .unwrap();

    // bob's 25-point week now leads; exactly one snapshot exists
    assert_eq!(board.entries[0].user_id, "bob");
    let stored = setup
        .engine
        .get_leaderboard(LeaderboardType::WeeklyPc)
        .await
        .unwrap();
    assert_eq!(stored.entries[0].user_id, "bob");
}

#[tokio::test]
async fn referral_signup_and_milestones_pay_the_referrer_once() {
    let setup = TestSetupBuilder::new()
        .with_users(vec!["alice", "carol"])
        .build()
        .await;

    setup.engine.create_referral("alice", "carol").await.unwrap();

    let paid = setup
        .engine
        .check_referral_milestone("carol", ReferralMilestone::FirstAnswer)
        .await
        .unwrap();
    assert!(paid.is_some());

    let repeat = setup
        .engine
        .check_referral_milestone("carol", ReferralMilestone::FirstAnswer)
        .await
        .unwrap();
    assert!(repeat.is_none());

    // signup 10/5 + first_answer 10/5
    let alice = setup
        .handles
        .users
        .get_user("alice")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice.pc_points, 20);
    assert_eq!(alice.pcon_points, 10);

    // A second referrer for the same user is rejected
    let conflict = setup.engine.create_referral("bob", "carol").await;
    assert!(conflict.is_err());
}

#[tokio::test]
async fn dashboard_surfaces_progress_and_standings() {
    let setup = TestSetupBuilder::new().with_single_user().build().await;
    setup
        .handles
        .content
        .record_answer("alice", true, Utc::now());

    setup
        .engine
        .award_points("alice", actions::ANSWER_ACCEPTED, None)
        .await
        .unwrap();
    setup
        .engine
        .generate_leaderboard(LeaderboardType::WeeklyPc, 50)
        .await
        .unwrap();

    let dashboard = setup.engine.get_dashboard("alice").await.unwrap();

    assert_eq!(dashboard.profile.username, "user-alice");
    assert!(dashboard.profile.total_achievements >= 1);
    assert!(!dashboard.recent_achievements.is_empty());
    assert!(dashboard
        .leaderboard_standings
        .iter()
        .any(|s| s.leaderboard_type == LeaderboardType::WeeklyPc && s.entry.position == 1));
    assert!(dashboard.stats.total_pc_distributed > 0);
}
