use async_trait::async_trait;
use sqlx::PgPool;

use super::meta;
use crate::core::time::primitive_now_utc;
use crate::db::models::{Answer, Grade, Submission};
use crate::db::types::Backend;
use crate::repositories::{GradeRepository, StorageError, StorageResult};

fn feedback_value(feedback: Option<&str>) -> serde_json::Value {
    match feedback {
        Some(text) => serde_json::Value::String(text.to_string()),
        None => serde_json::Value::Null,
    }
}

#[derive(Clone)]
pub struct LegacyGradeRepository {
    pool: PgPool,
}

impl LegacyGradeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GradeRepository for LegacyGradeRepository {
    /// The submission must already hold an answer for `question_id`.
    async fn create(
        &self,
        submission: &Submission,
        answer: &Answer,
        question_id: i64,
        points: i32,
        feedback: Option<&str>,
    ) -> StorageResult<Grade> {
        let now = primitive_now_utc();
        let mut tx = self.pool.begin().await?;
        if !meta::has_entry(&mut *tx, submission.id, meta::ANSWERS, question_id).await? {
            return Err(StorageError::NotFound {
                backend: Backend::Legacy,
                entity: "answer",
                id: format!("submission {} question {}", submission.id, question_id),
            });
        }
        meta::merge_entry(&mut *tx, submission.id, meta::GRADES, question_id, points.into())
            .await?;
        meta::merge_entry(
            &mut *tx,
            submission.id,
            meta::FEEDBACK,
            question_id,
            feedback_value(feedback),
        )
        .await?;
        meta::touch(&mut *tx, submission.id, now).await?;
        tx.commit().await?;

        Ok(Grade {
            id: question_id,
            answer_id: answer.id,
            question_id,
            points,
            feedback: feedback.map(str::to_string),
            created_at: submission.created_at,
            updated_at: now,
        })
    }

    async fn get_all(&self, submission_id: i64) -> StorageResult<Vec<Grade>> {
        let Some(maps) =
            meta::load_maps(&self.pool, submission_id, meta::GRADES, meta::FEEDBACK).await?
        else {
            return Ok(Vec::new());
        };

        let points = maps.decode_first::<i32>()?;
        let mut feedback = maps.decode_second::<Option<String>>()?;
        Ok(points
            .into_iter()
            .map(|(question_id, points)| Grade {
                id: question_id,
                answer_id: question_id,
                question_id,
                points,
                feedback: feedback.remove(&question_id).flatten(),
                created_at: maps.created_at,
                updated_at: maps.updated_at,
            })
            .collect())
    }

    async fn save_many(&self, submission: &Submission, grades: &[Grade]) -> StorageResult<()> {
        if grades.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let mut updated = 0usize;

        for grade in grades {
            let exists = meta::replace_existing_entry(
                &mut *tx,
                submission.id,
                meta::GRADES,
                grade.id,
                grade.points.into(),
            )
            .await?;
            if !exists {
                continue;
            }

            meta::merge_entry(
                &mut *tx,
                submission.id,
                meta::FEEDBACK,
                grade.id,
                feedback_value(grade.feedback.as_deref()),
            )
            .await?;
            updated += 1;
        }

        if updated > 0 {
            meta::touch(&mut *tx, submission.id, primitive_now_utc()).await?;
        }
        tx.commit().await?;

        if updated < grades.len() {
            tracing::debug!(
                submission_id = submission.id,
                requested = grades.len(),
                updated,
                "Some grades matched no stored entry"
            );
        }
        Ok(())
    }

    async fn delete_all(&self, submission: &Submission) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        meta::delete_keys(&mut *tx, submission.id, &[meta::GRADES, meta::FEEDBACK]).await?;
        meta::touch(&mut *tx, submission.id, primitive_now_utc()).await?;
        tx.commit().await?;
        Ok(())
    }
}
