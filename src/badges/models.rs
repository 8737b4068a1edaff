use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::EnumIter;
use uuid::Uuid;

/// Badge categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum BadgeType {
    Achievement,
    Rank,
    Special,
    Event,
    Milestone,
}

impl fmt::Display for BadgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                BadgeType::Achievement => "achievement",
                BadgeType::Rank => "rank",
                BadgeType::Special => "special",
                BadgeType::Event => "event",
                BadgeType::Milestone => "milestone",
            }
        )
    }
}

impl BadgeType {
    pub fn parse(value: &str) -> Option<BadgeType> {
        match value {
            "achievement" => Some(BadgeType::Achievement),
            "rank" => Some(BadgeType::Rank),
            "special" => Some(BadgeType::Special),
            "event" => Some(BadgeType::Event),
            "milestone" => Some(BadgeType::Milestone),
            _ => None,
        }
    }
}

/// Catalog entry for a badge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BadgeModel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub icon: String,
    pub color: String,
    pub badge_type: BadgeType,
    /// Free-form requirements shown to users; awarding is driven by the
    /// rank/achievement/streak flows, not by this field
    #[serde(default)]
    pub requirements: Option<serde_json::Value>,
    #[serde(default)]
    pub is_rare: bool,
    #[serde(default)]
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
}

/// A badge held by a user, joined with its catalog entry when listed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserBadgeModel {
    pub id: String,
    pub user_id: String,
    pub badge_id: String,
    pub earned_at: DateTime<Utc>,
    pub is_featured: bool,
    #[serde(default)]
    pub badge: Option<BadgeModel>,
}

impl UserBadgeModel {
    pub fn new(user_id: &str, badge_id: &str, is_featured: bool) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            badge_id: badge_id.to_string(),
            earned_at: Utc::now(),
            is_featured,
            badge: None,
        }
    }
}

/// Badge listing filters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BadgeFilters {
    pub badge_type: Option<BadgeType>,
    pub is_featured: Option<bool>,
    pub search: Option<String>,
}
