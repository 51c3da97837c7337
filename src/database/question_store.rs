use crate::error::Result;
use crate::models::question::{NewQuestion, Question, QuestionKey};
use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashSet;

/// Persistence seam for question rows.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Inserts every row or none of them. Returns the assigned ids in input order.
    async fn insert_all(&self, rows: &[NewQuestion]) -> Result<Vec<i32>>;

    /// Fetches the rows whose id is in `ids`, in whatever order the store yields them.
    async fn find_by_ids(&self, ids: &[i32]) -> Result<Vec<Question>>;

    /// Returns the subset of `keys` that already exists in storage.
    async fn existing_keys(&self, keys: &[QuestionKey]) -> Result<HashSet<QuestionKey>>;
}

#[derive(Clone)]
pub struct PgQuestionStore {
    pool: PgPool,
}

impl PgQuestionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionStore for PgQuestionStore {
    async fn insert_all(&self, rows: &[NewQuestion]) -> Result<Vec<i32>> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(rows.len());

        for row in rows {
            let id: i32 = sqlx::query_scalar(
                r#"
                INSERT INTO questions (
                    subject, topic, difficulty_level, question_text,
                    option_a, option_b, option_c, option_d, correct_answer,
                    created_by, created_at, updated_at
                ) VALUES (
                    $1,$2,$3,$4,
                    $5,$6,$7,$8,$9,
                    $10,$11,$12
                )
                RETURNING question_id
                "#,
            )
            .bind(&row.subject)
            .bind(&row.topic)
            .bind(&row.difficulty_level)
            .bind(&row.question_text)
            .bind(&row.option_a)
            .bind(&row.option_b)
            .bind(&row.option_c)
            .bind(&row.option_d)
            .bind(&row.correct_answer)
            .bind(row.created_by)
            .bind(row.created_at)
            .bind(row.updated_at)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn find_by_ids(&self, ids: &[i32]) -> Result<Vec<Question>> {
        let questions = sqlx::query_as::<_, Question>(
            r#"
            SELECT
                question_id,
                subject,
                topic,
                difficulty_level,
                question_text,
                option_a,
                option_b,
                option_c,
                option_d,
                correct_answer,
                created_by,
                created_at,
                updated_at
            FROM questions
            WHERE question_id = ANY($1)
            "#,
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(questions)
    }

    async fn existing_keys(&self, keys: &[QuestionKey]) -> Result<HashSet<QuestionKey>> {
        if keys.is_empty() {
            return Ok(HashSet::new());
        }

        let texts: Vec<String> = keys.iter().map(|k| k.question_text.clone()).collect();
        let rows: Vec<(Option<String>, Option<String>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT subject, topic, question_text
            FROM questions
            WHERE COALESCE(question_text, '') = ANY($1)
            "#,
        )
        .bind(texts)
        .fetch_all(&self.pool)
        .await?;

        let wanted: HashSet<&QuestionKey> = keys.iter().collect();
        let found = rows
            .into_iter()
            .map(|(subject, topic, question_text)| QuestionKey {
                subject: subject.unwrap_or_default(),
                topic: topic.unwrap_or_default(),
                question_text: question_text.unwrap_or_default(),
            })
            .filter(|key| wanted.contains(key))
            .collect();

        Ok(found)
    }
}
