use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Answer, Submission};
use crate::repositories::{AnswerRepository, StorageResult};

pub(crate) const COLUMNS: &str = "id, submission_id, question_id, value, created_at, updated_at";

pub(crate) async fn insert(
    pool: &PgPool,
    submission_id: i64,
    question_id: i64,
    value: &str,
    now: PrimitiveDateTime,
) -> Result<Answer, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "INSERT INTO quiz_answers (submission_id, question_id, value, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$4)
         RETURNING {COLUMNS}"
    ))
    .bind(submission_id)
    .bind(question_id)
    .bind(value)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn list_by_submission(
    pool: &PgPool,
    submission_id: i64,
) -> Result<Vec<Answer>, sqlx::Error> {
    sqlx::query_as::<_, Answer>(&format!(
        "SELECT {COLUMNS} FROM quiz_answers WHERE submission_id = $1 ORDER BY id"
    ))
    .bind(submission_id)
    .fetch_all(pool)
    .await
}

/// Rewrites the value of one answer of the submission. Returns `false` when
/// no such answer exists.
pub(crate) async fn update_value(
    pool: &PgPool,
    id: i64,
    submission_id: i64,
    value: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE quiz_answers
         SET value = $1,
             updated_at = $2
         WHERE id = $3 AND submission_id = $4",
    )
    .bind(value)
    .bind(now)
    .bind(id)
    .bind(submission_id)
    .execute(pool)
    .await?;
    Ok(updated.rows_affected() > 0)
}

/// Grades of the removed answers go with them through the foreign key.
pub(crate) async fn delete_by_submission(
    pool: &PgPool,
    submission_id: i64,
) -> Result<u64, sqlx::Error> {
    let deleted = sqlx::query("DELETE FROM quiz_answers WHERE submission_id = $1")
        .bind(submission_id)
        .execute(pool)
        .await?;
    Ok(deleted.rows_affected())
}

#[derive(Clone)]
pub struct TablesAnswerRepository {
    pool: PgPool,
}

impl TablesAnswerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnswerRepository for TablesAnswerRepository {
    async fn create(
        &self,
        submission: &Submission,
        question_id: i64,
        value: &str,
    ) -> StorageResult<Answer> {
        Ok(insert(&self.pool, submission.id, question_id, value, primitive_now_utc()).await?)
    }

    async fn get_all(&self, submission_id: i64) -> StorageResult<Vec<Answer>> {
        Ok(list_by_submission(&self.pool, submission_id).await?)
    }

    async fn save(&self, submission: &Submission, answer: &Answer) -> StorageResult<()> {
        let updated =
            update_value(&self.pool, answer.id, submission.id, &answer.value, primitive_now_utc())
                .await?;
        if !updated {
            tracing::debug!(
                submission_id = submission.id,
                answer_id = answer.id,
                "Answer matched no stored row"
            );
        }
        Ok(())
    }

    async fn delete_all(&self, submission: &Submission) -> StorageResult<()> {
        delete_by_submission(&self.pool, submission.id).await?;
        Ok(())
    }
}
