use async_trait::async_trait;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::core::time::primitive_now_utc;
use crate::db::models::Submission;
use crate::db::types::Backend;
use crate::repositories::{StorageError, StorageResult, SubmissionRepository};

pub(crate) const COLUMNS: &str = "id, quiz_id, user_id, final_grade, created_at, updated_at";

pub(crate) async fn find_by_key(
    pool: &PgPool,
    quiz_id: i64,
    user_id: i64,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "SELECT {COLUMNS} FROM quiz_submissions WHERE quiz_id = $1 AND user_id = $2"
    ))
    .bind(quiz_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn insert(
    pool: &PgPool,
    quiz_id: i64,
    user_id: i64,
    final_grade: Option<f64>,
    now: PrimitiveDateTime,
) -> Result<Submission, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "INSERT INTO quiz_submissions (quiz_id, user_id, final_grade, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$4)
         RETURNING {COLUMNS}"
    ))
    .bind(quiz_id)
    .bind(user_id)
    .bind(final_grade)
    .bind(now)
    .fetch_one(pool)
    .await
}

pub(crate) async fn create_if_absent(
    pool: &PgPool,
    quiz_id: i64,
    user_id: i64,
    final_grade: Option<f64>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO quiz_submissions (quiz_id, user_id, final_grade, created_at, updated_at)
         VALUES ($1,$2,$3,$4,$4)
         ON CONFLICT (quiz_id, user_id) DO NOTHING",
    )
    .bind(quiz_id)
    .bind(user_id)
    .bind(final_grade)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) async fn update_final_grade(
    pool: &PgPool,
    id: i64,
    final_grade: Option<f64>,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE quiz_submissions SET final_grade = $1, updated_at = $2 WHERE id = $3")
        .bind(final_grade)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM quiz_submissions WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

#[derive(Clone)]
pub struct TablesSubmissionRepository {
    pool: PgPool,
}

impl TablesSubmissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubmissionRepository for TablesSubmissionRepository {
    async fn create(
        &self,
        quiz_id: i64,
        user_id: i64,
        final_grade: Option<f64>,
    ) -> StorageResult<Submission> {
        Ok(insert(&self.pool, quiz_id, user_id, final_grade, primitive_now_utc()).await?)
    }

    async fn get_or_create(
        &self,
        quiz_id: i64,
        user_id: i64,
        final_grade: Option<f64>,
    ) -> StorageResult<Submission> {
        create_if_absent(&self.pool, quiz_id, user_id, final_grade, primitive_now_utc()).await?;

        find_by_key(&self.pool, quiz_id, user_id).await?.ok_or_else(|| StorageError::NotFound {
            backend: Backend::Tables,
            entity: "submission",
            id: format!("quiz {quiz_id} user {user_id}"),
        })
    }

    async fn get(&self, quiz_id: i64, user_id: i64) -> StorageResult<Option<Submission>> {
        Ok(find_by_key(&self.pool, quiz_id, user_id).await?)
    }

    async fn save(&self, submission: &Submission) -> StorageResult<()> {
        update_final_grade(&self.pool, submission.id, submission.final_grade, primitive_now_utc())
            .await?;
        Ok(())
    }

    async fn delete(&self, submission: &Submission) -> StorageResult<()> {
        delete_by_id(&self.pool, submission.id).await?;
        Ok(())
    }
}
