use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::core::time::primitive_now_utc;
use crate::db::models::{Answer, Grade, Submission};
use crate::db::types::Backend;
use crate::repositories::{GradeRepository, StorageError, StorageResult};

pub(crate) const COLUMNS: &str =
    "id, answer_id, question_id, points, feedback, created_at, updated_at";

pub(crate) struct CreateGrade<'a> {
    pub submission_id: i64,
    pub answer_id: i64,
    pub question_id: i64,
    pub points: i32,
    pub feedback: Option<&'a str>,
    pub now: PrimitiveDateTime,
}

/// Inserts the grade only when its answer belongs to `params.submission_id`.
pub(crate) async fn insert(
    pool: &PgPool,
    params: CreateGrade<'_>,
) -> Result<Option<Grade>, sqlx::Error> {
    sqlx::query_as::<_, Grade>(&format!(
        "INSERT INTO quiz_grades (answer_id, question_id, points, feedback, created_at, updated_at)
         SELECT a.id, $2, $3, $4, $5, $5
         FROM quiz_answers a
         WHERE a.id = $1 AND a.submission_id = $6
         RETURNING {COLUMNS}"
    ))
    .bind(params.answer_id)
    .bind(params.question_id)
    .bind(params.points)
    .bind(params.feedback)
    .bind(params.now)
    .bind(params.submission_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn list_by_submission(
    pool: &PgPool,
    submission_id: i64,
) -> Result<Vec<Grade>, sqlx::Error> {
    sqlx::query_as::<_, Grade>(
        "SELECT g.id, g.answer_id, g.question_id, g.points, g.feedback, g.created_at, g.updated_at
         FROM quiz_grades g
         JOIN quiz_answers a ON a.id = g.answer_id
         WHERE a.submission_id = $1
         ORDER BY g.id",
    )
    .bind(submission_id)
    .fetch_all(pool)
    .await
}

/// Updates points and feedback of the listed grades that belong to the
/// submission. Returns how many rows changed.
pub(crate) async fn update_many(
    pool: &PgPool,
    submission_id: i64,
    grades: &[Grade],
    now: PrimitiveDateTime,
) -> Result<u64, sqlx::Error> {
    if grades.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let mut updated = 0;

    for grade in grades {
        let result = sqlx::query(
            "UPDATE quiz_grades
             SET points = $1,
                 feedback = $2,
                 updated_at = $3
             WHERE id = $4
               AND answer_id IN (SELECT id FROM quiz_answers WHERE submission_id = $5)",
        )
        .bind(grade.points)
        .bind(grade.feedback.as_deref())
        .bind(now)
        .bind(grade.id)
        .bind(submission_id)
        .execute(&mut *tx)
        .await?;
        updated += result.rows_affected();
    }

    tx.commit().await?;
    Ok(updated)
}

pub(crate) async fn delete_by_submission(
    pool: &PgPool,
    submission_id: i64,
) -> Result<u64, sqlx::Error> {
    let deleted = sqlx::query(
        "DELETE FROM quiz_grades
         WHERE answer_id IN (SELECT id FROM quiz_answers WHERE submission_id = $1)",
    )
    .bind(submission_id)
    .execute(pool)
    .await?;
    Ok(deleted.rows_affected())
}

#[derive(Clone)]
pub struct TablesGradeRepository {
    pool: PgPool,
}

impl TablesGradeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GradeRepository for TablesGradeRepository {
    async fn create(
        &self,
        submission: &Submission,
        answer: &Answer,
        question_id: i64,
        points: i32,
        feedback: Option<&str>,
    ) -> StorageResult<Grade> {
        let params = CreateGrade {
            submission_id: submission.id,
            answer_id: answer.id,
            question_id,
            points,
            feedback,
            now: primitive_now_utc(),
        };
        insert(&self.pool, params).await?.ok_or_else(|| StorageError::NotFound {
            backend: Backend::Tables,
            entity: "answer",
            id: format!("{} in submission {}", answer.id, submission.id),
        })
    }

    async fn get_all(&self, submission_id: i64) -> StorageResult<Vec<Grade>> {
        Ok(list_by_submission(&self.pool, submission_id).await?)
    }

    async fn save_many(&self, submission: &Submission, grades: &[Grade]) -> StorageResult<()> {
        let updated = update_many(&self.pool, submission.id, grades, primitive_now_utc()).await?;
        if updated < grades.len() as u64 {
            tracing::debug!(
                submission_id = submission.id,
                requested = grades.len(),
                updated,
                "Some grades matched no stored row"
            );
        }
        Ok(())
    }

    async fn delete_all(&self, submission: &Submission) -> StorageResult<()> {
        delete_by_submission(&self.pool, submission.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::TablesGradeRepository;
    use crate::repositories::tables::{TablesAnswerRepository, TablesSubmissionRepository};
    use crate::repositories::{
        AnswerRepository, GradeRepository, StorageError, SubmissionRepository,
    };
    use crate::test_support;

    #[tokio::test]
    async fn save_many_updates_matching_ids_only() {
        let Some(ctx) = test_support::setup_db().await else {
            return;
        };
        let submissions = TablesSubmissionRepository::new(ctx.pool.clone());
        let answers = TablesAnswerRepository::new(ctx.pool.clone());
        let grades = TablesGradeRepository::new(ctx.pool.clone());

        let submission = submissions.get_or_create(1, 9, None).await.expect("submission");
        let answer = answers.create(&submission, 3, "true").await.expect("answer");
        let grade =
            grades.create(&submission, &answer, 3, 2, Some("good")).await.expect("grade");

        let mut stray = grade.clone().with_points(99);
        stray.id = grade.id + 1000;
        grades
            .save_many(
                &submission,
                &[grade.clone().with_points(5).with_feedback(None), stray],
            )
            .await
            .expect("save_many");

        let stored = grades.get_all(submission.id).await.expect("get_all");
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, grade.id);
        assert_eq!(stored[0].points, 5);
        assert_eq!(stored[0].feedback, None);
    }

    #[tokio::test]
    async fn create_rejects_answer_of_another_submission() {
        let Some(ctx) = test_support::setup_db().await else {
            return;
        };
        let submissions = TablesSubmissionRepository::new(ctx.pool.clone());
        let answers = TablesAnswerRepository::new(ctx.pool.clone());
        let grades = TablesGradeRepository::new(ctx.pool.clone());

        let submission = submissions.get_or_create(1, 9, None).await.expect("submission");
        let other = submissions.get_or_create(1, 10, None).await.expect("other");
        let foreign = answers.create(&other, 3, "true").await.expect("answer");

        let error = grades
            .create(&submission, &foreign, 3, 2, None)
            .await
            .expect_err("grade on foreign answer");
        assert!(matches!(error, StorageError::NotFound { entity: "answer", .. }));
        assert!(grades.get_all(submission.id).await.expect("grades").is_empty());
        assert!(grades.get_all(other.id).await.expect("other grades").is_empty());
    }

    #[tokio::test]
    async fn delete_all_keeps_answers_and_is_idempotent() {
        let Some(ctx) = test_support::setup_db().await else {
            return;
        };
        let submissions = TablesSubmissionRepository::new(ctx.pool.clone());
        let answers = TablesAnswerRepository::new(ctx.pool.clone());
        let grades = TablesGradeRepository::new(ctx.pool.clone());

        let submission = submissions.get_or_create(2, 9, None).await.expect("submission");
        let answer = answers.create(&submission, 4, "42").await.expect("answer");
        grades.create(&submission, &answer, 4, 1, None).await.expect("grade");

        grades.delete_all(&submission).await.expect("delete");
        grades.delete_all(&submission).await.expect("repeated delete");

        assert!(grades.get_all(submission.id).await.expect("grades").is_empty());
        assert_eq!(answers.get_all(submission.id).await.expect("answers").len(), 1);
    }
}
