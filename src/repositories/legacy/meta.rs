use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use sqlx::types::Json;
use sqlx::{FromRow, PgExecutor};
use time::PrimitiveDateTime;

pub(crate) const ACTIVITY_TYPE: &str = "quiz_submission";

pub(crate) const FINAL_GRADE: &str = "final_grade";
pub(crate) const ANSWERS: &str = "quiz_answers";
pub(crate) const GRADES: &str = "quiz_grades";
pub(crate) const FEEDBACK: &str = "quiz_answers_feedback";

/// Per-question map stored in one metadata entry.
pub(crate) type QuestionMap<T> = BTreeMap<i64, T>;

#[derive(Debug, FromRow)]
pub(crate) struct ActivityMaps {
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
    pub(crate) first_map: Option<Json<serde_json::Value>>,
    pub(crate) second_map: Option<Json<serde_json::Value>>,
}

impl ActivityMaps {
    pub(crate) fn decode_first<T: DeserializeOwned>(&self) -> Result<QuestionMap<T>, sqlx::Error> {
        decode_map(self.first_map.as_ref())
    }

    pub(crate) fn decode_second<T: DeserializeOwned>(
        &self,
    ) -> Result<QuestionMap<T>, sqlx::Error> {
        decode_map(self.second_map.as_ref())
    }
}

fn decode_map<T: DeserializeOwned>(
    value: Option<&Json<serde_json::Value>>,
) -> Result<QuestionMap<T>, sqlx::Error> {
    match value {
        Some(Json(raw)) => serde_json::from_value(raw.clone())
            .map_err(|error| sqlx::Error::Decode(Box::new(error))),
        None => Ok(QuestionMap::new()),
    }
}

/// Loads the activity row's timestamps together with up to two metadata maps.
/// Returns `None` when the activity row does not exist.
pub(crate) async fn load_maps<'c>(
    executor: impl PgExecutor<'c>,
    activity_id: i64,
    first_key: &str,
    second_key: &str,
) -> Result<Option<ActivityMaps>, sqlx::Error> {
    sqlx::query_as::<_, ActivityMaps>(
        "SELECT a.created_at,
                a.updated_at,
                f.meta_value AS first_map,
                s.meta_value AS second_map
         FROM activity_log a
         LEFT JOIN activity_meta f ON f.activity_id = a.id AND f.meta_key = $2
         LEFT JOIN activity_meta s ON s.activity_id = a.id AND s.meta_key = $3
         WHERE a.id = $1 AND a.activity_type = $4",
    )
    .bind(activity_id)
    .bind(first_key)
    .bind(second_key)
    .bind(ACTIVITY_TYPE)
    .fetch_optional(executor)
    .await
}

/// Sets one entry of a question map, creating the map when missing.
pub(crate) async fn merge_entry<'c>(
    executor: impl PgExecutor<'c>,
    activity_id: i64,
    meta_key: &str,
    question_id: i64,
    value: serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO activity_meta (activity_id, meta_key, meta_value)
         VALUES ($1, $2, jsonb_build_object($3::text, $4::jsonb))
         ON CONFLICT (activity_id, meta_key)
         DO UPDATE SET meta_value = activity_meta.meta_value || EXCLUDED.meta_value",
    )
    .bind(activity_id)
    .bind(meta_key)
    .bind(question_id.to_string())
    .bind(Json(value))
    .execute(executor)
    .await?;
    Ok(())
}

/// Replaces an existing entry of a question map. Returns `false` when the map
/// has no entry for the question.
pub(crate) async fn replace_existing_entry<'c>(
    executor: impl PgExecutor<'c>,
    activity_id: i64,
    meta_key: &str,
    question_id: i64,
    value: serde_json::Value,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE activity_meta
         SET meta_value = jsonb_set(meta_value, ARRAY[$3::text], $4::jsonb)
         WHERE activity_id = $1
           AND meta_key = $2
           AND meta_value ? $3::text",
    )
    .bind(activity_id)
    .bind(meta_key)
    .bind(question_id.to_string())
    .bind(Json(value))
    .execute(executor)
    .await?;
    Ok(updated.rows_affected() > 0)
}

pub(crate) async fn has_entry<'c>(
    executor: impl PgExecutor<'c>,
    activity_id: i64,
    meta_key: &str,
    question_id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS (
             SELECT 1 FROM activity_meta
             WHERE activity_id = $1 AND meta_key = $2 AND meta_value ? $3::text
         )",
    )
    .bind(activity_id)
    .bind(meta_key)
    .bind(question_id.to_string())
    .fetch_one(executor)
    .await
}

pub(crate) async fn set_value<'c>(
    executor: impl PgExecutor<'c>,
    activity_id: i64,
    meta_key: &str,
    value: serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO activity_meta (activity_id, meta_key, meta_value)
         VALUES ($1, $2, $3)
         ON CONFLICT (activity_id, meta_key)
         DO UPDATE SET meta_value = EXCLUDED.meta_value",
    )
    .bind(activity_id)
    .bind(meta_key)
    .bind(Json(value))
    .execute(executor)
    .await?;
    Ok(())
}

pub(crate) async fn delete_keys<'c>(
    executor: impl PgExecutor<'c>,
    activity_id: i64,
    meta_keys: &[&str],
) -> Result<(), sqlx::Error> {
    let keys: Vec<String> = meta_keys.iter().map(|key| key.to_string()).collect();
    sqlx::query("DELETE FROM activity_meta WHERE activity_id = $1 AND meta_key = ANY($2)")
        .bind(activity_id)
        .bind(keys)
        .execute(executor)
        .await?;
    Ok(())
}

/// Bumps `updated_at` of the activity row. Returns `false` when the row is gone.
pub(crate) async fn touch<'c>(
    executor: impl PgExecutor<'c>,
    activity_id: i64,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let updated = sqlx::query(
        "UPDATE activity_log SET updated_at = $1 WHERE id = $2 AND activity_type = $3",
    )
    .bind(now)
    .bind(activity_id)
    .bind(ACTIVITY_TYPE)
    .execute(executor)
    .await?;
    Ok(updated.rows_affected() > 0)
}
