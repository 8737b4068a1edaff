use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::EnumIter;

use crate::points::models::PointKind;

/// Available leaderboard flavors: a scoring dimension plus a time window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardType {
    WeeklyPc,
    WeeklyPcon,
    MonthlyPc,
    MonthlyPcon,
    AllTimePc,
    AllTimePcon,
    QuestionsAnswered,
    BestAnswers,
}

impl fmt::Display for LeaderboardType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                LeaderboardType::WeeklyPc => "weekly_pc",
                LeaderboardType::WeeklyPcon => "weekly_pcon",
                LeaderboardType::MonthlyPc => "monthly_pc",
                LeaderboardType::MonthlyPcon => "monthly_pcon",
                LeaderboardType::AllTimePc => "all_time_pc",
                LeaderboardType::AllTimePcon => "all_time_pcon",
                LeaderboardType::QuestionsAnswered => "questions_answered",
                LeaderboardType::BestAnswers => "best_answers",
            }
        )
    }
}

impl LeaderboardType {
    pub fn parse(value: &str) -> Option<LeaderboardType> {
        match value {
            "weekly_pc" => Some(LeaderboardType::WeeklyPc),
            "weekly_pcon" => Some(LeaderboardType::WeeklyPcon),
            "monthly_pc" => Some(LeaderboardType::MonthlyPc),
            "monthly_pcon" => Some(LeaderboardType::MonthlyPcon),
            "all_time_pc" => Some(LeaderboardType::AllTimePc),
            "all_time_pcon" => Some(LeaderboardType::AllTimePcon),
            "questions_answered" => Some(LeaderboardType::QuestionsAnswered),
            "best_answers" => Some(LeaderboardType::BestAnswers),
            _ => None,
        }
    }

    /// How scores for this board are computed
    pub fn score_source(&self) -> ScoreSource {
        match self {
            LeaderboardType::WeeklyPc | LeaderboardType::MonthlyPc => {
                ScoreSource::WindowedPoints(PointKind::Pc)
            }
            LeaderboardType::WeeklyPcon | LeaderboardType::MonthlyPcon => {
                ScoreSource::WindowedPoints(PointKind::Pcon)
            }
            LeaderboardType::AllTimePc => ScoreSource::StoredPoints(PointKind::Pc),
            LeaderboardType::AllTimePcon => ScoreSource::StoredPoints(PointKind::Pcon),
            LeaderboardType::QuestionsAnswered => ScoreSource::AnswerCount {
                accepted_only: false,
            },
            LeaderboardType::BestAnswers => ScoreSource::AnswerCount {
                accepted_only: true,
            },
        }
    }

    /// The half-open time window covered by this board at instant `now`
    pub fn window(&self, now: DateTime<Utc>, epoch: NaiveDate) -> TimeWindow {
        match self {
            LeaderboardType::WeeklyPc | LeaderboardType::WeeklyPcon => TimeWindow::current_week(now),
            LeaderboardType::MonthlyPc | LeaderboardType::MonthlyPcon => {
                TimeWindow::current_month(now)
            }
            _ => TimeWindow::all_time(epoch, now),
        }
    }
}

/// How scores are resolved for a leaderboard type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSource {
    /// Sum of per-entry deltas from the points history inside the window
    WindowedPoints(PointKind),
    /// The user's current stored total; no history summation
    StoredPoints(PointKind),
    /// Count of answers authored inside the window
    AnswerCount { accepted_only: bool },
}

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// ISO week containing `now`: Monday 00:00 UTC through the following
    /// Monday 00:00 UTC
    pub fn current_week(now: DateTime<Utc>) -> Self {
        let date = now.date_naive();
        let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
        let start = monday.and_hms_opt(0, 0, 0).unwrap().and_utc();
        Self {
            start,
            end: start + Duration::days(7),
        }
    }

    /// Calendar month containing `now`: the 1st at 00:00 UTC through the
    /// 1st of the next month
    pub fn current_month(now: DateTime<Utc>) -> Self {
        let date = now.date_naive();
        let first = date.with_day(1).unwrap();
        let next_first = if first.month() == 12 {
            NaiveDate::from_ymd_opt(first.year() + 1, 1, 1).unwrap()
        } else {
            NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1).unwrap()
        };
        Self {
            start: first.and_hms_opt(0, 0, 0).unwrap().and_utc(),
            end: next_first.and_hms_opt(0, 0, 0).unwrap().and_utc(),
        }
    }

    /// Fixed epoch through `now`
    pub fn all_time(epoch: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            start: epoch.and_hms_opt(0, 0, 0).unwrap().and_utc(),
            end: now,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// One ranked row of a leaderboard snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub position: i64,
    pub user_id: String,
    pub username: String,
    pub score: i64,
    pub rank: Option<String>,
    #[serde(default)]
    pub badges: Vec<String>,
}

/// A cached leaderboard snapshot; regenerating replaces the previous one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardModel {
    pub leaderboard_type: LeaderboardType,
    pub entries: Vec<LeaderboardEntry>,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn weekly_window_starts_on_monday() {
        // 2024-06-12 was a Wednesday
        let wednesday = Utc.with_ymd_and_hms(2024, 6, 12, 15, 30, 0).unwrap();
        let window = TimeWindow::current_week(wednesday);

        assert_eq!(
            window.start,
            Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap()
        );
        assert_eq!(
            window.end,
            Utc.with_ymd_and_hms(2024, 6, 17, 0, 0, 0).unwrap()
        );
        assert!(window.contains(wednesday));
        assert!(!window.contains(window.end));
    }

    #[test]
    fn monthly_window_wraps_december_into_january() {
        let december = Utc.with_ymd_and_hms(2024, 12, 25, 8, 0, 0).unwrap();
        let window = TimeWindow::current_month(december);

        assert_eq!(
            window.start,
            Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            window.end,
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn parse_round_trips_display() {
        use strum::IntoEnumIterator;
        for board in LeaderboardType::iter() {
            assert_eq!(LeaderboardType::parse(&board.to_string()), Some(board));
        }
    }
}
