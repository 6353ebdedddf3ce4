use async_trait::async_trait;
use sqlx::PgPool;

use super::meta;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Answer, Submission};
use crate::repositories::{AnswerRepository, StorageResult};

#[derive(Clone)]
pub struct LegacyAnswerRepository {
    pool: PgPool,
}

impl LegacyAnswerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnswerRepository for LegacyAnswerRepository {
    /// Writing the same question twice replaces the stored value.
    async fn create(
        &self,
        submission: &Submission,
        question_id: i64,
        value: &str,
    ) -> StorageResult<Answer> {
        let now = primitive_now_utc();
        let mut tx = self.pool.begin().await?;
        meta::merge_entry(
            &mut *tx,
            submission.id,
            meta::ANSWERS,
            question_id,
            serde_json::Value::String(value.to_string()),
        )
        .await?;
        meta::touch(&mut *tx, submission.id, now).await?;
        tx.commit().await?;

        Ok(Answer {
            id: question_id,
            submission_id: submission.id,
            question_id,
            value: value.to_string(),
            created_at: submission.created_at,
            updated_at: now,
        })
    }

    async fn get_all(&self, submission_id: i64) -> StorageResult<Vec<Answer>> {
        let Some(maps) =
            meta::load_maps(&self.pool, submission_id, meta::ANSWERS, meta::ANSWERS).await?
        else {
            return Ok(Vec::new());
        };

        let values = maps.decode_first::<String>()?;
        Ok(values
            .into_iter()
            .map(|(question_id, value)| Answer {
                id: question_id,
                submission_id,
                question_id,
                value,
                created_at: maps.created_at,
                updated_at: maps.updated_at,
            })
            .collect())
    }

    async fn save(&self, submission: &Submission, answer: &Answer) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        let replaced = meta::replace_existing_entry(
            &mut *tx,
            submission.id,
            meta::ANSWERS,
            answer.id,
            serde_json::Value::String(answer.value.clone()),
        )
        .await?;
        if replaced {
            meta::touch(&mut *tx, submission.id, primitive_now_utc()).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Removes the grades too: a legacy grade never outlives its answer.
    async fn delete_all(&self, submission: &Submission) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        meta::delete_keys(&mut *tx, submission.id, &[meta::ANSWERS, meta::GRADES, meta::FEEDBACK])
            .await?;
        meta::touch(&mut *tx, submission.id, primitive_now_utc()).await?;
        tx.commit().await?;
        Ok(())
    }
}
