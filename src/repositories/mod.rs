pub mod legacy;
pub mod tables;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::models::{Answer, Grade, Submission};
use crate::db::types::Backend;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{entity} {id} not found in {backend} backend")]
    NotFound { backend: Backend, entity: &'static str, id: String },
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Inserts a new submission. Callers check for an existing one first.
    async fn create(
        &self,
        quiz_id: i64,
        user_id: i64,
        final_grade: Option<f64>,
    ) -> StorageResult<Submission>;

    /// Returns the submission for `(quiz_id, user_id)`, creating it when absent.
    async fn get_or_create(
        &self,
        quiz_id: i64,
        user_id: i64,
        final_grade: Option<f64>,
    ) -> StorageResult<Submission>;

    async fn get(&self, quiz_id: i64, user_id: i64) -> StorageResult<Option<Submission>>;

    /// Persists `final_grade` of the submission addressed by its id.
    async fn save(&self, submission: &Submission) -> StorageResult<()>;

    async fn delete(&self, submission: &Submission) -> StorageResult<()>;
}

#[async_trait]
pub trait AnswerRepository: Send + Sync {
    async fn create(
        &self,
        submission: &Submission,
        question_id: i64,
        value: &str,
    ) -> StorageResult<Answer>;

    async fn get_all(&self, submission_id: i64) -> StorageResult<Vec<Answer>>;

    /// Persists `value` of the answer addressed by its backend-local id. An
    /// id that matches nothing is ignored.
    async fn save(&self, submission: &Submission, answer: &Answer) -> StorageResult<()>;

    async fn delete_all(&self, submission: &Submission) -> StorageResult<()>;
}

#[async_trait]
pub trait GradeRepository: Send + Sync {
    async fn create(
        &self,
        submission: &Submission,
        answer: &Answer,
        question_id: i64,
        points: i32,
        feedback: Option<&str>,
    ) -> StorageResult<Grade>;

    async fn get_all(&self, submission_id: i64) -> StorageResult<Vec<Grade>>;

    /// Updates each grade matched by its backend-local id; grades whose id
    /// matches nothing are ignored.
    async fn save_many(&self, submission: &Submission, grades: &[Grade]) -> StorageResult<()>;

    async fn delete_all(&self, submission: &Submission) -> StorageResult<()>;
}

/// The three repositories of one backend, as consumed by the aggregates.
#[derive(Clone)]
pub struct BackendRepositories {
    pub backend: Backend,
    pub submissions: Arc<dyn SubmissionRepository>,
    pub answers: Arc<dyn AnswerRepository>,
    pub grades: Arc<dyn GradeRepository>,
}

impl BackendRepositories {
    pub fn legacy(pool: sqlx::PgPool) -> Self {
        Self {
            backend: Backend::Legacy,
            submissions: Arc::new(legacy::LegacySubmissionRepository::new(pool.clone())),
            answers: Arc::new(legacy::LegacyAnswerRepository::new(pool.clone())),
            grades: Arc::new(legacy::LegacyGradeRepository::new(pool)),
        }
    }

    pub fn tables(pool: sqlx::PgPool) -> Self {
        Self {
            backend: Backend::Tables,
            submissions: Arc::new(tables::TablesSubmissionRepository::new(pool.clone())),
            answers: Arc::new(tables::TablesAnswerRepository::new(pool.clone())),
            grades: Arc::new(tables::TablesGradeRepository::new(pool)),
        }
    }
}
