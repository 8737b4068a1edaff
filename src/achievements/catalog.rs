use chrono::Utc;

use super::models::{
    Achievement, AchievementCategory, AchievementCriteria, AchievementRarity, StatCondition,
    StatField,
};
use crate::leaderboards::models::LeaderboardType;
use crate::streaks::models::StreakType;

struct CatalogEntry {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    category: AchievementCategory,
    rarity: AchievementRarity,
    badge_icon: &'static str,
    badge_color: &'static str,
    criteria: AchievementCriteria,
    points_reward: i64,
    pcon_reward: i64,
    sort_order: i64,
}

impl CatalogEntry {
    fn build(self) -> Achievement {
        Achievement {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            category: self.category,
            rarity: self.rarity,
            badge_icon: self.badge_icon.to_string(),
            badge_color: self.badge_color.to_string(),
            criteria: self.criteria,
            points_reward: self.points_reward,
            pcon_reward: self.pcon_reward,
            is_hidden: false,
            is_repeatable: false,
            sort_order: self.sort_order,
            created_at: Utc::now(),
        }
    }
}

/// The built-in achievement catalog, seeded idempotently at startup.
/// Rewards must never re-satisfy their own criteria; point-threshold
/// achievements only reference totals strictly above what their own
/// reward chain can add.
pub fn default_achievements() -> Vec<Achievement> {
    let entries = vec![
        // Beginner
        CatalogEntry {
            id: "first_question",
            name: "Primeira Pergunta",
            description: "Faça sua primeira pergunta na comunidade",
            category: AchievementCategory::Beginner,
            rarity: AchievementRarity::Common,
            badge_icon: "❓",
            badge_color: "#10B981",
            criteria: AchievementCriteria::Count {
                field: StatField::QuestionsCreated,
                target_value: 1,
            },
            points_reward: 5,
            pcon_reward: 2,
            sort_order: 1,
        },
        CatalogEntry {
            id: "first_answer",
            name: "Primeira Resposta",
            description: "Dê sua primeira resposta útil",
            category: AchievementCategory::Beginner,
            rarity: AchievementRarity::Common,
            badge_icon: "💡",
            badge_color: "#F59E0B",
            criteria: AchievementCriteria::Count {
                field: StatField::AnswersCreated,
                target_value: 1,
            },
            points_reward: 5,
            pcon_reward: 2,
            sort_order: 2,
        },
        // Contributor
        CatalogEntry {
            id: "helpful_contributor",
            name: "Colaborador Útil",
            description: "Tenha 10 respostas aceitas",
            category: AchievementCategory::Contributor,
            rarity: AchievementRarity::Rare,
            badge_icon: "🤝",
            badge_color: "#3B82F6",
            criteria: AchievementCriteria::Count {
                field: StatField::AcceptedAnswers,
                target_value: 10,
            },
            points_reward: 50,
            pcon_reward: 25,
            sort_order: 10,
        },
        CatalogEntry {
            id: "community_champion",
            name: "Campeão da Comunidade",
            description: "Receba 100 upvotes em suas contribuições",
            category: AchievementCategory::Contributor,
            rarity: AchievementRarity::Epic,
            badge_icon: "🏆",
            badge_color: "#8B5CF6",
            criteria: AchievementCriteria::Count {
                field: StatField::TotalUpvotes,
                target_value: 100,
            },
            points_reward: 100,
            pcon_reward: 50,
            sort_order: 20,
        },
        // Expert
        CatalogEntry {
            id: "knowledge_master",
            name: "Mestre do Conhecimento",
            description: "Alcance 1000 pontos PC",
            category: AchievementCategory::Expert,
            rarity: AchievementRarity::Legendary,
            badge_icon: "🧠",
            badge_color: "#EF4444",
            criteria: AchievementCriteria::Points {
                field: StatField::PcPoints,
                target_value: 1000,
            },
            points_reward: 200,
            pcon_reward: 100,
            sort_order: 30,
        },
        // Social
        CatalogEntry {
            id: "social_butterfly",
            name: "Borboleta Social",
            description: "Siga 25 usuários e seja seguido por 25",
            category: AchievementCategory::Social,
            rarity: AchievementRarity::Rare,
            badge_icon: "🦋",
            badge_color: "#EC4899",
            criteria: AchievementCriteria::AllOf {
                target_value: 25,
                conditions: vec![
                    StatCondition {
                        field: StatField::Followers,
                        required: 25,
                    },
                    StatCondition {
                        field: StatField::Following,
                        required: 25,
                    },
                ],
            },
            points_reward: 30,
            pcon_reward: 15,
            sort_order: 40,
        },
        // Streak
        CatalogEntry {
            id: "week_warrior",
            name: "Guerreiro da Semana",
            description: "Mantenha uma sequência de 7 dias consecutivos",
            category: AchievementCategory::Streak,
            rarity: AchievementRarity::Rare,
            badge_icon: "🔥",
            badge_color: "#F97316",
            criteria: AchievementCriteria::Streak {
                streak: StreakType::DailyLogin,
                target_value: 7,
            },
            points_reward: 25,
            pcon_reward: 15,
            sort_order: 50,
        },
        CatalogEntry {
            id: "month_master",
            name: "Mestre do Mês",
            description: "Mantenha uma sequência de 30 dias consecutivos",
            category: AchievementCategory::Streak,
            rarity: AchievementRarity::Legendary,
            badge_icon: "🌟",
            badge_color: "#A855F7",
            criteria: AchievementCriteria::Streak {
                streak: StreakType::DailyLogin,
                target_value: 30,
            },
            points_reward: 150,
            pcon_reward: 75,
            sort_order: 60,
        },
        CatalogEntry {
            id: "streak_legend",
            name: "Lenda da Sequência",
            description: "Mantenha uma sequência de 100 dias consecutivos",
            category: AchievementCategory::Streak,
            rarity: AchievementRarity::Legendary,
            badge_icon: "⚡",
            badge_color: "#FBBF24",
            criteria: AchievementCriteria::Streak {
                streak: StreakType::DailyLogin,
                target_value: 100,
            },
            points_reward: 300,
            pcon_reward: 150,
            sort_order: 65,
        },
        // Milestone
        CatalogEntry {
            id: "veteran_member",
            name: "Membro Veterano",
            description: "Complete 1 ano como membro ativo",
            category: AchievementCategory::Milestone,
            rarity: AchievementRarity::Epic,
            badge_icon: "🎖️",
            badge_color: "#059669",
            criteria: AchievementCriteria::RegistrationAge { target_value: 365 },
            points_reward: 100,
            pcon_reward: 50,
            sort_order: 70,
        },
        // Competitive
        CatalogEntry {
            id: "top_contributor",
            name: "Top Contribuidor",
            description: "Chegue ao Top 10 no leaderboard mensal",
            category: AchievementCategory::Competitive,
            rarity: AchievementRarity::Epic,
            badge_icon: "👑",
            badge_color: "#DC2626",
            criteria: AchievementCriteria::LeaderboardPosition {
                board: LeaderboardType::MonthlyPc,
                target_value: 10,
            },
            points_reward: 75,
            pcon_reward: 40,
            sort_order: 80,
        },
    ];

    entries.into_iter().map(CatalogEntry::build).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique() {
        let achievements = default_achievements();
        let mut ids: Vec<&str> = achievements.iter().map(|a| a.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), achievements.len());
    }

    #[test]
    fn every_target_value_is_positive() {
        for achievement in default_achievements() {
            assert!(
                achievement.criteria.target_value() > 0,
                "{} has a non-positive target",
                achievement.id
            );
        }
    }

    #[test]
    fn point_criteria_sit_above_the_other_rewards_combined() {
        // Every other achievement paid at once stays short of each
        // point-threshold criterion, so reward payouts alone cannot
        // satisfy one and cascade
        let achievements = default_achievements();
        let total_rewards: i64 = achievements.iter().map(|a| a.points_reward).sum();

        for achievement in &achievements {
            if let AchievementCriteria::Points { target_value, .. } = achievement.criteria {
                assert!(
                    target_value > total_rewards - achievement.points_reward,
                    "{} could be satisfied by reward payouts alone",
                    achievement.id
                );
            }
        }
    }
}
