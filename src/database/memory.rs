use crate::database::question_store::QuestionStore;
use crate::error::{Error, Result};
use crate::models::question::{NewQuestion, Question, QuestionKey};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// In-process question table. Rows come back in insertion order, the same
/// way a heap scan without ORDER BY would return them.
#[derive(Clone, Default)]
pub struct MemoryQuestionStore {
    inner: Arc<Mutex<Table>>,
}

#[derive(Default)]
struct Table {
    next_id: i32,
    rows: Vec<Question>,
}

impl MemoryQuestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> Result<MutexGuard<'_, Table>> {
        self.inner
            .lock()
            .map_err(|_| Error::Processing("question table lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.table().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn all(&self) -> Vec<Question> {
        self.table().map(|t| t.rows.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl QuestionStore for MemoryQuestionStore {
    async fn insert_all(&self, rows: &[NewQuestion]) -> Result<Vec<i32>> {
        let mut table = self.table()?;
        let mut ids = Vec::with_capacity(rows.len());

        for row in rows {
            table.next_id += 1;
            let id = table.next_id;
            table.rows.push(Question {
                question_id: id,
                subject: Some(row.subject.clone()),
                topic: Some(row.topic.clone()),
                difficulty_level: Some(row.difficulty_level.clone()),
                question_text: Some(row.question_text.clone()),
                option_a: Some(row.option_a.clone()),
                option_b: Some(row.option_b.clone()),
                option_c: Some(row.option_c.clone()),
                option_d: Some(row.option_d.clone()),
                correct_answer: Some(row.correct_answer.clone()),
                created_by: Some(row.created_by),
                created_at: Some(row.created_at),
                updated_at: Some(row.updated_at),
            });
            ids.push(id);
        }

        Ok(ids)
    }

    async fn find_by_ids(&self, ids: &[i32]) -> Result<Vec<Question>> {
        let wanted: HashSet<i32> = ids.iter().copied().collect();
        let table = self.table()?;
        Ok(table
            .rows
            .iter()
            .filter(|q| wanted.contains(&q.question_id))
            .cloned()
            .collect())
    }

    async fn existing_keys(&self, keys: &[QuestionKey]) -> Result<HashSet<QuestionKey>> {
        let wanted: HashSet<&QuestionKey> = keys.iter().collect();
        let table = self.table()?;
        Ok(table
            .rows
            .iter()
            .map(Question::key)
            .filter(|key| wanted.contains(key))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(text: &str) -> NewQuestion {
        let now = Utc::now();
        NewQuestion {
            subject: "Math".into(),
            topic: "Arithmetic".into(),
            difficulty_level: "Easy".into(),
            question_text: text.into(),
            option_a: "1".into(),
            option_b: "2".into(),
            option_c: "3".into(),
            option_d: "4".into(),
            correct_answer: "D".into(),
            created_by: 2,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn find_returns_store_order_not_request_order() {
        let store = MemoryQuestionStore::new();
        let ids = store.insert_all(&[row("a"), row("b"), row("c")]).await.unwrap();
        assert_eq!(ids, vec![1, 2, 3]);

        let found = store.find_by_ids(&[3, 1, 99]).await.unwrap();
        let got: Vec<i32> = found.iter().map(|q| q.question_id).collect();
        assert_eq!(got, vec![1, 3]);
    }

    #[tokio::test]
    async fn existing_keys_only_reports_stored_matches() {
        let store = MemoryQuestionStore::new();
        store.insert_all(&[row("a")]).await.unwrap();

        let keys = vec![row("a").key(), row("z").key()];
        let existing = store.existing_keys(&keys).await.unwrap();
        assert_eq!(existing.len(), 1);
        assert!(existing.contains(&row("a").key()));
    }
}
