use async_trait::async_trait;
use sqlx::{PgExecutor, PgPool};
use time::PrimitiveDateTime;

use super::meta;
use crate::core::time::primitive_now_utc;
use crate::db::models::Submission;
use crate::repositories::{StorageResult, SubmissionRepository};

const SELECT_SUBMISSION: &str = "\
    SELECT a.id,
           a.post_id AS quiz_id,
           a.user_id,
           (SELECT (m.meta_value #>> '{}')::double precision
              FROM activity_meta m
             WHERE m.activity_id = a.id AND m.meta_key = 'final_grade') AS final_grade,
           a.created_at,
           a.updated_at
    FROM activity_log a";

/// Oldest row wins when pre-migration data holds duplicates for one key.
pub(crate) async fn find_by_key<'c>(
    executor: impl PgExecutor<'c>,
    quiz_id: i64,
    user_id: i64,
) -> Result<Option<Submission>, sqlx::Error> {
    sqlx::query_as::<_, Submission>(&format!(
        "{SELECT_SUBMISSION}
         WHERE a.activity_type = $1 AND a.post_id = $2 AND a.user_id = $3
         ORDER BY a.id
         LIMIT 1"
    ))
    .bind(meta::ACTIVITY_TYPE)
    .bind(quiz_id)
    .bind(user_id)
    .fetch_optional(executor)
    .await
}

pub(crate) async fn insert_activity<'c>(
    executor: impl PgExecutor<'c>,
    quiz_id: i64,
    user_id: i64,
    now: PrimitiveDateTime,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO activity_log (post_id, user_id, activity_type, status, created_at, updated_at)
         VALUES ($1,$2,$3,'in-progress',$4,$4)
         RETURNING id",
    )
    .bind(quiz_id)
    .bind(user_id)
    .bind(meta::ACTIVITY_TYPE)
    .bind(now)
    .fetch_one(executor)
    .await
}

pub(crate) async fn delete_activity(pool: &PgPool, id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM activity_log WHERE id = $1 AND activity_type = $2")
        .bind(id)
        .bind(meta::ACTIVITY_TYPE)
        .execute(pool)
        .await?;
    Ok(())
}

/// Serializes get-or-create for one `(quiz_id, user_id)` within a transaction;
/// the activity log has no uniqueness constraint to lean on.
async fn lock_key<'c>(
    executor: impl PgExecutor<'c>,
    quiz_id: i64,
    user_id: i64,
) -> Result<(), sqlx::Error> {
    let key = quiz_id.wrapping_shl(32) ^ user_id;
    sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(key).execute(executor).await?;
    Ok(())
}

#[derive(Clone)]
pub struct LegacySubmissionRepository {
    pool: PgPool,
}

impl LegacySubmissionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        &self,
        quiz_id: i64,
        user_id: i64,
        final_grade: Option<f64>,
        lock: bool,
    ) -> StorageResult<Submission> {
        let now = primitive_now_utc();
        let mut tx = self.pool.begin().await?;

        if lock {
            lock_key(&mut *tx, quiz_id, user_id).await?;
            if let Some(existing) = find_by_key(&mut *tx, quiz_id, user_id).await? {
                tx.commit().await?;
                return Ok(existing);
            }
        }

        let id = insert_activity(&mut *tx, quiz_id, user_id, now).await?;
        if let Some(grade) = final_grade {
            meta::set_value(&mut *tx, id, meta::FINAL_GRADE, serde_json::json!(grade)).await?;
        }
        tx.commit().await?;

        Ok(Submission { id, quiz_id, user_id, final_grade, created_at: now, updated_at: now })
    }
}

#[async_trait]
impl SubmissionRepository for LegacySubmissionRepository {
    async fn create(
        &self,
        quiz_id: i64,
        user_id: i64,
        final_grade: Option<f64>,
    ) -> StorageResult<Submission> {
        self.insert(quiz_id, user_id, final_grade, false).await
    }

    async fn get_or_create(
        &self,
        quiz_id: i64,
        user_id: i64,
        final_grade: Option<f64>,
    ) -> StorageResult<Submission> {
        if let Some(existing) = find_by_key(&self.pool, quiz_id, user_id).await? {
            return Ok(existing);
        }
        self.insert(quiz_id, user_id, final_grade, true).await
    }

    async fn get(&self, quiz_id: i64, user_id: i64) -> StorageResult<Option<Submission>> {
        Ok(find_by_key(&self.pool, quiz_id, user_id).await?)
    }

    async fn save(&self, submission: &Submission) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        if !meta::touch(&mut *tx, submission.id, primitive_now_utc()).await? {
            return Ok(());
        }

        let value = match submission.final_grade {
            Some(grade) => serde_json::json!(grade),
            None => serde_json::Value::Null,
        };
        meta::set_value(&mut *tx, submission.id, meta::FINAL_GRADE, value).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete(&self, submission: &Submission) -> StorageResult<()> {
        delete_activity(&self.pool, submission.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::task::JoinSet;

    use super::LegacySubmissionRepository;
    use crate::repositories::SubmissionRepository;
    use crate::test_support;

    #[tokio::test]
    async fn get_or_create_returns_existing_activity() {
        let Some(ctx) = test_support::setup_db().await else {
            return;
        };
        let repository = LegacySubmissionRepository::new(ctx.pool.clone());

        let first = repository.get_or_create(1, 9, Some(50.0)).await.expect("first");
        let second = repository.get_or_create(1, 9, None).await.expect("second");

        assert_eq!(first.id, second.id);
        assert_eq!(second.final_grade, Some(50.0));
    }

    #[tokio::test]
    async fn duplicate_activity_rows_resolve_to_oldest() {
        let Some(ctx) = test_support::setup_db().await else {
            return;
        };
        let repository = LegacySubmissionRepository::new(ctx.pool.clone());

        let oldest = repository.create(3, 9, None).await.expect("oldest");
        repository.create(3, 9, Some(10.0)).await.expect("duplicate");

        let found = repository.get(3, 9).await.expect("get").expect("present");
        assert_eq!(found.id, oldest.id);
    }

    #[tokio::test]
    async fn save_round_trips_final_grade_including_null() {
        let Some(ctx) = test_support::setup_db().await else {
            return;
        };
        let repository = LegacySubmissionRepository::new(ctx.pool.clone());

        let submission = repository.create(5, 9, None).await.expect("create");
        repository
            .save(&submission.clone().with_final_grade(Some(87.5)))
            .await
            .expect("save grade");
        assert_eq!(repository.get(5, 9).await.expect("get").expect("row").final_grade, Some(87.5));

        repository.save(&submission.clone().with_final_grade(None)).await.expect("clear grade");
        assert_eq!(repository.get(5, 9).await.expect("get").expect("row").final_grade, None);

        repository.delete(&submission).await.expect("delete");
        assert!(repository.get(5, 9).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn concurrent_get_or_create_yields_one_activity() {
        let Some(ctx) = test_support::setup_db().await else {
            return;
        };
        let repository = LegacySubmissionRepository::new(ctx.pool.clone());

        let mut tasks = JoinSet::new();
        for _ in 0..16 {
            let repository = repository.clone();
            tasks.spawn(async move { repository.get_or_create(5, 5, None).await });
        }
        let mut ids = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            ids.push(joined.expect("task").expect("get_or_create").id);
        }

        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 1, "{ids:?}");
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM activity_log WHERE post_id = $1 AND user_id = $2",
        )
        .bind(5_i64)
        .bind(5_i64)
        .fetch_one(&ctx.pool)
        .await
        .expect("count");
        assert_eq!(count, 1);
    }
}
