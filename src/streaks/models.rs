use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::EnumIter;
use uuid::Uuid;

/// Kinds of consecutive-activity streaks tracked per user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum StreakType {
    DailyLogin,
    QuestionAnswered,
    DailyActivity,
    WeeklyGoal,
}

impl fmt::Display for StreakType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                StreakType::DailyLogin => "daily_login",
                StreakType::QuestionAnswered => "question_answered",
                StreakType::DailyActivity => "daily_activity",
                StreakType::WeeklyGoal => "weekly_goal",
            }
        )
    }
}

impl StreakType {
    pub fn parse(value: &str) -> Option<StreakType> {
        match value {
            "daily_login" => Some(StreakType::DailyLogin),
            "question_answered" => Some(StreakType::QuestionAnswered),
            "daily_activity" => Some(StreakType::DailyActivity),
            "weekly_goal" => Some(StreakType::WeeklyGoal),
            _ => None,
        }
    }
}

/// How an activity report moved the streak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakTransition {
    /// First activity ever for this (user, streak type)
    Started,
    /// The calendar day was already counted
    AlreadyCountedToday,
    /// Activity on the day after the last one
    Extended,
    /// A gap of more than one day reset the run
    Broken,
}

impl StreakTransition {
    /// Whether the transition changed `current_count`, and can therefore
    /// land exactly on a milestone
    pub fn counts(&self) -> bool {
        !matches!(self, StreakTransition::AlreadyCountedToday)
    }
}

/// Database model for a per-user, per-type streak
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreakModel {
    pub id: String,
    pub user_id: String,
    pub streak_type: StreakType,
    pub current_count: i64,
    pub best_count: i64,
    pub last_activity_date: NaiveDate,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreakModel {
    /// First activity for this (user, streak type)
    pub fn start(user_id: &str, streak_type: StreakType, today: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            streak_type,
            current_count: 1,
            best_count: 1,
            last_activity_date: today,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies the day-granularity state machine for an activity on `today`.
    ///
    /// Counts only ever move by one per call: same-day re-entry is a no-op,
    /// the day after the last activity extends the run, anything later
    /// resets to 1. `best_count` never decreases.
    pub fn advance(&mut self, today: NaiveDate) -> StreakTransition {
        let transition = if self.last_activity_date >= today {
            StreakTransition::AlreadyCountedToday
        } else if self.last_activity_date + Duration::days(1) == today {
            self.current_count += 1;
            self.best_count = self.best_count.max(self.current_count);
            StreakTransition::Extended
        } else {
            self.current_count = 1;
            StreakTransition::Broken
        };

        self.last_activity_date = self.last_activity_date.max(today);
        self.is_active = true;
        self.updated_at = Utc::now();
        transition
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(offset_from_today: i64) -> NaiveDate {
        Utc::now().date_naive() + Duration::days(offset_from_today)
    }

    fn streak_with(current: i64, best: i64, last_activity: NaiveDate) -> StreakModel {
        let mut streak = StreakModel::start("u1", StreakType::DailyLogin, last_activity);
        streak.current_count = current;
        streak.best_count = best;
        streak
    }

    #[test]
    fn consecutive_day_extends_and_tracks_best() {
        let today = day(0);
        let mut streak = streak_with(5, 5, day(-1));

        let transition = streak.advance(today);

        assert_eq!(transition, StreakTransition::Extended);
        assert_eq!(streak.current_count, 6);
        assert_eq!(streak.best_count, 6);
        assert_eq!(streak.last_activity_date, today);
    }

    #[test]
    fn same_day_reentry_does_not_double_count() {
        let today = day(0);
        let mut streak = streak_with(6, 6, today);

        let transition = streak.advance(today);

        assert_eq!(transition, StreakTransition::AlreadyCountedToday);
        assert_eq!(streak.current_count, 6);
    }

    #[test]
    fn gap_resets_current_but_preserves_best() {
        let mut streak = streak_with(4, 10, day(-3));

        let transition = streak.advance(day(0));

        assert_eq!(transition, StreakTransition::Broken);
        assert_eq!(streak.current_count, 1);
        assert_eq!(streak.best_count, 10);
        assert!(streak.is_active);
    }

    #[test]
    fn best_count_never_drops_below_current() {
        let mut streak = streak_with(3, 3, day(-1));
        streak.advance(day(0));
        assert!(streak.best_count >= streak.current_count);
    }

    #[test]
    fn parse_round_trips_display() {
        use strum::IntoEnumIterator;
        for streak_type in StreakType::iter() {
            assert_eq!(
                StreakType::parse(&streak_type.to_string()),
                Some(streak_type)
            );
        }
    }
}
