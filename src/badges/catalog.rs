use chrono::Utc;
use serde_json::json;

use super::models::{BadgeModel, BadgeType};

fn badge(
    id: &str,
    name: &str,
    description: &str,
    icon: &str,
    color: &str,
    badge_type: BadgeType,
    requirements: Option<serde_json::Value>,
    is_rare: bool,
    sort_order: i64,
) -> BadgeModel {
    BadgeModel {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        icon: icon.to_string(),
        color: color.to_string(),
        badge_type,
        requirements,
        is_rare,
        sort_order,
        created_at: Utc::now(),
    }
}

/// The built-in badge catalog, seeded idempotently at startup
pub fn default_badges() -> Vec<BadgeModel> {
    vec![
        // Rank badges
        badge(
            "rank_iniciante",
            "Iniciante",
            "Badge de rank Iniciante",
            "🌱",
            "#10B981",
            BadgeType::Rank,
            Some(json!({"rank": "Iniciante"})),
            false,
            1,
        ),
        badge(
            "rank_colaborador",
            "Colaborador",
            "Badge de rank Colaborador",
            "⭐",
            "#F59E0B",
            BadgeType::Rank,
            Some(json!({"rank": "Colaborador"})),
            false,
            2,
        ),
        badge(
            "rank_especialista",
            "Especialista",
            "Badge de rank Especialista",
            "💎",
            "#3B82F6",
            BadgeType::Rank,
            Some(json!({"rank": "Especialista"})),
            false,
            3,
        ),
        badge(
            "rank_veterano",
            "Veterano",
            "Badge de rank Veterano",
            "🏆",
            "#8B5CF6",
            BadgeType::Rank,
            Some(json!({"rank": "Veterano"})),
            false,
            4,
        ),
        badge(
            "rank_mestre",
            "Mestre",
            "Badge de rank Mestre",
            "👑",
            "#EC4899",
            BadgeType::Rank,
            Some(json!({"rank": "Mestre"})),
            false,
            5,
        ),
        badge(
            "rank_lenda",
            "Lenda",
            "Badge de rank Lenda",
            "🌟",
            "#EF4444",
            BadgeType::Rank,
            Some(json!({"rank": "Lenda"})),
            false,
            6,
        ),
        // Streak badges, paid out by the milestone table
        badge(
            "week_warrior",
            "Guerreiro da Semana",
            "Sequência de 7 dias consecutivos",
            "🔥",
            "#F97316",
            BadgeType::Milestone,
            Some(json!({"daily_login_streak": 7})),
            false,
            10,
        ),
        badge(
            "month_master",
            "Mestre do Mês",
            "Sequência de 30 dias consecutivos",
            "🌟",
            "#A855F7",
            BadgeType::Milestone,
            Some(json!({"daily_login_streak": 30})),
            true,
            11,
        ),
        // Special badges
        badge(
            "early_adopter",
            "Early Adopter",
            "Um dos primeiros 100 usuários",
            "🚀",
            "#6366F1",
            BadgeType::Special,
            None,
            true,
            20,
        ),
        badge(
            "beta_tester",
            "Beta Tester",
            "Participou dos testes beta",
            "🧪",
            "#059669",
            BadgeType::Special,
            None,
            true,
            21,
        ),
        // Milestone badges
        badge(
            "question_master",
            "Mestre das Perguntas",
            "Fez 100 perguntas de qualidade",
            "❓",
            "#DC2626",
            BadgeType::Milestone,
            Some(json!({"questions_created": 100})),
            true,
            30,
        ),
        badge(
            "answer_guru",
            "Guru das Respostas",
            "Teve 50 respostas aceitas",
            "✅",
            "#7C3AED",
            BadgeType::Milestone,
            Some(json!({"accepted_answers": 50})),
            true,
            31,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique() {
        let badges = default_badges();
        let mut ids: Vec<&str> = badges.iter().map(|b| b.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), badges.len());
    }

    #[test]
    fn streak_milestone_badges_exist() {
        let badges = default_badges();
        assert!(badges.iter().any(|b| b.id == "week_warrior"));
        assert!(badges.iter().any(|b| b.id == "month_master"));
    }
}
