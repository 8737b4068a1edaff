use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::{instrument, warn};

use crate::shared::AppError;

/// Read-only counting contract over the Q&A collaborator stores
/// (questions, answers, votes). The gamification engine never writes
/// this data; it only aggregates it for achievement criteria and
/// activity leaderboards.
#[async_trait]
pub trait ContentStats: Send + Sync {
    async fn questions_created(&self, user_id: &str) -> Result<i64, AppError>;
    async fn answers_created(&self, user_id: &str) -> Result<i64, AppError>;
    async fn accepted_answers(&self, user_id: &str) -> Result<i64, AppError>;

    /// Upvotes received across the user's questions and answers
    async fn upvotes_received(&self, user_id: &str) -> Result<i64, AppError>;

    /// Answer authors ranked by answers created inside the half-open
    /// window, highest count first, ties broken by ascending author id
    async fn top_answer_authors(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        accepted_only: bool,
        limit: i64,
    ) -> Result<Vec<(String, i64)>, AppError>;
}

#[derive(Debug, Clone)]
struct AnswerRecord {
    author_id: String,
    is_accepted: bool,
    created_at: DateTime<Utc>,
}

/// In-memory implementation of ContentStats for development and testing.
/// Question and upvote counts are set directly; answers are recorded
/// individually so windowed aggregation behaves like the real store.
#[derive(Default)]
pub struct InMemoryContentStats {
    questions: Mutex<HashMap<String, i64>>,
    upvotes: Mutex<HashMap<String, i64>>,
    answers: Mutex<Vec<AnswerRecord>>,
}

impl InMemoryContentStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_questions_created(&self, user_id: &str, count: i64) {
        self.questions
            .lock()
            .unwrap()
            .insert(user_id.to_string(), count);
    }

    pub fn set_upvotes_received(&self, user_id: &str, count: i64) {
        self.upvotes
            .lock()
            .unwrap()
            .insert(user_id.to_string(), count);
    }

    pub fn record_answer(&self, author_id: &str, is_accepted: bool, created_at: DateTime<Utc>) {
        self.answers.lock().unwrap().push(AnswerRecord {
            author_id: author_id.to_string(),
            is_accepted,
            created_at,
        });
    }
}

#[async_trait]
impl ContentStats for InMemoryContentStats {
    async fn questions_created(&self, user_id: &str) -> Result<i64, AppError> {
        Ok(self
            .questions
            .lock()
            .unwrap()
            .get(user_id)
            .copied()
            .unwrap_or(0))
    }

    async fn answers_created(&self, user_id: &str) -> Result<i64, AppError> {
        let answers = self.answers.lock().unwrap();
        Ok(answers.iter().filter(|a| a.author_id == user_id).count() as i64)
    }

    async fn accepted_answers(&self, user_id: &str) -> Result<i64, AppError> {
        let answers = self.answers.lock().unwrap();
        Ok(answers
            .iter()
            .filter(|a| a.author_id == user_id && a.is_accepted)
            .count() as i64)
    }

    async fn upvotes_received(&self, user_id: &str) -> Result<i64, AppError> {
        Ok(self
            .upvotes
            .lock()
            .unwrap()
            .get(user_id)
            .copied()
            .unwrap_or(0))
    }

    async fn top_answer_authors(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        accepted_only: bool,
        limit: i64,
    ) -> Result<Vec<(String, i64)>, AppError> {
        let answers = self.answers.lock().unwrap();
        let mut counts: HashMap<String, i64> = HashMap::new();

        for answer in answers.iter().filter(|a| {
            a.created_at >= start && a.created_at < end && (!accepted_only || a.is_accepted)
        }) {
            *counts.entry(answer.author_id.clone()).or_insert(0) += 1;
        }

        let mut ranked: Vec<(String, i64)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(limit.max(0) as usize);
        Ok(ranked)
    }
}

/// PostgreSQL implementation over the Q&A tables shared with the content
/// services
pub struct PostgresContentStats {
    pool: PgPool,
}

impl PostgresContentStats {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn count(&self, sql: &str, user_id: &str) -> Result<i64, AppError> {
        let row = sqlx::query(sql)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                warn!(error = %e, user_id = %user_id, "Content count query failed");
                AppError::DatabaseError(e.to_string())
            })?;
        Ok(row.get("count"))
    }
}

#[async_trait]
impl ContentStats for PostgresContentStats {
    #[instrument(skip(self))]
    async fn questions_created(&self, user_id: &str) -> Result<i64, AppError> {
        self.count(
            "SELECT COUNT(*) AS count FROM questions WHERE author_id = $1",
            user_id,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn answers_created(&self, user_id: &str) -> Result<i64, AppError> {
        self.count(
            "SELECT COUNT(*) AS count FROM answers WHERE author_id = $1",
            user_id,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn accepted_answers(&self, user_id: &str) -> Result<i64, AppError> {
        self.count(
            "SELECT COUNT(*) AS count FROM answers WHERE author_id = $1 AND is_accepted",
            user_id,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn upvotes_received(&self, user_id: &str) -> Result<i64, AppError> {
        self.count(
            "SELECT COUNT(*) AS count FROM votes WHERE target_author_id = $1 AND vote_type = 'upvote'",
            user_id,
        )
        .await
    }

    #[instrument(skip(self))]
    async fn top_answer_authors(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        accepted_only: bool,
        limit: i64,
    ) -> Result<Vec<(String, i64)>, AppError> {
        let filter = if accepted_only { "AND is_accepted" } else { "" };

        let rows = sqlx::query(&format!(
            "SELECT author_id, COUNT(*) AS total FROM answers \
             WHERE created_at >= $1 AND created_at < $2 {filter} \
             GROUP BY author_id ORDER BY total DESC, author_id ASC LIMIT $3"
        ))
        .bind(start)
        .bind(end)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            warn!(error = %e, "Answer author aggregation failed");
            AppError::DatabaseError(e.to_string())
        })?;

        Ok(rows
            .iter()
            .map(|row| (row.get("author_id"), row.get("total")))
            .collect())
    }
}
