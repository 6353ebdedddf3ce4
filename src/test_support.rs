use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use sqlx::PgPool;
use time::macros::datetime;
use time::PrimitiveDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::db::models::{Answer, Grade, Submission};
use crate::db::types::Backend;
use crate::repositories::{
    AnswerRepository, BackendRepositories, GradeRepository, StorageError, StorageResult,
    SubmissionRepository,
};
use crate::sync::{MirrorDiagnostics, MirrorEvent};

const TEST_DATABASE_URL_VAR: &str = "QUIZ_SYNC_TEST_DATABASE_URL";
const TEST_POOL_SIZE: u32 = 8;
const FIXED_TIME: PrimitiveDateTime = datetime!(2024-06-01 12:00);

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("QUIZ_SYNC_ENV", "test");
    std::env::set_var("QUIZ_SYNC_STRICT_CONFIG", "0");
    std::env::remove_var("ENVIRONMENT");
    std::env::remove_var("DATABASE_URL");
    std::env::remove_var("LEGACY_DATABASE_URL");
    std::env::remove_var("TABLES_DATABASE_URL");
    std::env::remove_var("POSTGRES_PASSWORD");
    std::env::remove_var("QUIZ_SYNC_TABLES_ENABLED");
    std::env::remove_var("QUIZ_SYNC_READ_POLICY");
    std::env::remove_var("QUIZ_SYNC_MAX_CONNECTIONS");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

pub(crate) struct DbContext {
    pub(crate) pool: PgPool,
    _guard: OwnedMutexGuard<()>,
}

/// Migrated, emptied database for storage tests; `None` when no test
/// database is configured.
pub(crate) async fn setup_db() -> Option<DbContext> {
    let url = std::env::var(TEST_DATABASE_URL_VAR).ok().filter(|url| !url.trim().is_empty())?;
    let guard = env_lock().await;

    let pool = crate::db::init_pool(&url, TEST_POOL_SIZE).await.expect("db pool");
    let migrations_dir = concat!(env!("CARGO_MANIFEST_DIR"), "/migrations");
    for backend in [Backend::Legacy, Backend::Tables] {
        crate::db::run_migrations(&pool, migrations_dir, backend).await.expect("migrations");
    }
    reset_db(&pool).await.expect("reset db");

    Some(DbContext { pool, _guard: guard })
}

pub(crate) async fn reset_db(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "TRUNCATE activity_meta, activity_log, quiz_grades, quiz_answers, quiz_submissions \
         RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await?;
    Ok(())
}

pub(crate) fn submission(id: i64, quiz_id: i64, user_id: i64) -> Submission {
    Submission {
        id,
        quiz_id,
        user_id,
        final_grade: None,
        created_at: FIXED_TIME,
        updated_at: FIXED_TIME,
    }
}

pub(crate) fn answer(id: i64, submission_id: i64, question_id: i64, value: &str) -> Answer {
    Answer {
        id,
        submission_id,
        question_id,
        value: value.to_string(),
        created_at: FIXED_TIME,
        updated_at: FIXED_TIME,
    }
}

pub(crate) fn grade(id: i64, answer_id: i64, question_id: i64, points: i32) -> Grade {
    Grade {
        id,
        answer_id,
        question_id,
        points,
        feedback: None,
        created_at: FIXED_TIME,
        updated_at: FIXED_TIME,
    }
}

#[derive(Default)]
struct MemoryState {
    next_id: i64,
    submissions: Vec<Submission>,
    answers: Vec<Answer>,
    /// Grades with the submission they belong to.
    grades: Vec<(i64, Grade)>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-memory backend. A `Tables` backend hands out fresh ids and lets
/// duplicate children be created on purpose. A `Legacy` backend keys answers
/// and grades by question id and overwrites them on repeated writes. Every
/// call can be made to fail.
#[derive(Clone)]
pub(crate) struct MemoryBackend {
    backend: Backend,
    state: Arc<StdMutex<MemoryState>>,
    failing: Arc<AtomicBool>,
}

impl MemoryBackend {
    pub(crate) fn new(backend: Backend) -> Self {
        Self {
            backend,
            state: Arc::new(StdMutex::new(MemoryState::default())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn repositories(&self) -> BackendRepositories {
        BackendRepositories {
            backend: self.backend,
            submissions: Arc::new(self.clone()),
            answers: Arc::new(self.clone()),
            grades: Arc::new(self.clone()),
        }
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn submissions(&self) -> Vec<Submission> {
        self.state.lock().expect("state").submissions.clone()
    }

    pub(crate) fn answers(&self) -> Vec<Answer> {
        self.state.lock().expect("state").answers.clone()
    }

    pub(crate) fn grades(&self) -> Vec<Grade> {
        self.state.lock().expect("state").grades.iter().map(|(_, grade)| grade.clone()).collect()
    }

    fn keyed_by_question(&self) -> bool {
        self.backend == Backend::Legacy
    }

    fn missing_answer(&self, submission: &Submission, answer: &Answer) -> StorageError {
        StorageError::NotFound {
            backend: self.backend,
            entity: "answer",
            id: format!("{} in submission {}", answer.id, submission.id),
        }
    }

    fn check(&self) -> StorageResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl SubmissionRepository for MemoryBackend {
    async fn create(
        &self,
        quiz_id: i64,
        user_id: i64,
        final_grade: Option<f64>,
    ) -> StorageResult<Submission> {
        self.check()?;
        let mut state = self.state.lock().expect("state");
        let id = state.next_id();
        let created = Submission { final_grade, ..submission(id, quiz_id, user_id) };
        state.submissions.push(created.clone());
        Ok(created)
    }

    async fn get_or_create(
        &self,
        quiz_id: i64,
        user_id: i64,
        final_grade: Option<f64>,
    ) -> StorageResult<Submission> {
        if let Some(existing) = SubmissionRepository::get(self, quiz_id, user_id).await? {
            return Ok(existing);
        }
        SubmissionRepository::create(self, quiz_id, user_id, final_grade).await
    }

    async fn get(&self, quiz_id: i64, user_id: i64) -> StorageResult<Option<Submission>> {
        self.check()?;
        let state = self.state.lock().expect("state");
        Ok(state
            .submissions
            .iter()
            .find(|stored| stored.quiz_id == quiz_id && stored.user_id == user_id)
            .cloned())
    }

    async fn save(&self, submission: &Submission) -> StorageResult<()> {
        self.check()?;
        let mut state = self.state.lock().expect("state");
        if let Some(stored) = state.submissions.iter_mut().find(|stored| stored.id == submission.id)
        {
            stored.final_grade = submission.final_grade;
        }
        Ok(())
    }

    async fn delete(&self, submission: &Submission) -> StorageResult<()> {
        self.check()?;
        let mut state = self.state.lock().expect("state");
        state.submissions.retain(|stored| stored.id != submission.id);
        state.answers.retain(|stored| stored.submission_id != submission.id);
        state.grades.retain(|(submission_id, _)| *submission_id != submission.id);
        Ok(())
    }
}

#[async_trait]
impl AnswerRepository for MemoryBackend {
    async fn create(
        &self,
        submission: &Submission,
        question_id: i64,
        value: &str,
    ) -> StorageResult<Answer> {
        self.check()?;
        let mut state = self.state.lock().expect("state");
        if self.keyed_by_question() {
            let stored = state.answers.iter_mut().find(|stored| {
                stored.submission_id == submission.id && stored.question_id == question_id
            });
            if let Some(stored) = stored {
                stored.value = value.to_string();
                return Ok(stored.clone());
            }
            let created = answer(question_id, submission.id, question_id, value);
            state.answers.push(created.clone());
            return Ok(created);
        }

        let id = state.next_id();
        let created = answer(id, submission.id, question_id, value);
        state.answers.push(created.clone());
        Ok(created)
    }

    async fn get_all(&self, submission_id: i64) -> StorageResult<Vec<Answer>> {
        self.check()?;
        let state = self.state.lock().expect("state");
        Ok(state
            .answers
            .iter()
            .filter(|stored| stored.submission_id == submission_id)
            .cloned()
            .collect())
    }

    async fn save(&self, submission: &Submission, answer: &Answer) -> StorageResult<()> {
        self.check()?;
        let mut state = self.state.lock().expect("state");
        let stored = state
            .answers
            .iter_mut()
            .find(|stored| stored.submission_id == submission.id && stored.id == answer.id);
        if let Some(stored) = stored {
            stored.value = answer.value.clone();
        }
        Ok(())
    }

    async fn delete_all(&self, submission: &Submission) -> StorageResult<()> {
        self.check()?;
        let mut state = self.state.lock().expect("state");
        state.answers.retain(|stored| stored.submission_id != submission.id);
        state.grades.retain(|(submission_id, _)| *submission_id != submission.id);
        Ok(())
    }
}

#[async_trait]
impl GradeRepository for MemoryBackend {
    async fn create(
        &self,
        submission: &Submission,
        answer: &Answer,
        question_id: i64,
        points: i32,
        feedback: Option<&str>,
    ) -> StorageResult<Grade> {
        self.check()?;
        let mut state = self.state.lock().expect("state");
        if self.keyed_by_question() {
            let answered = state.answers.iter().any(|stored| {
                stored.submission_id == submission.id && stored.question_id == question_id
            });
            if !answered {
                return Err(self.missing_answer(submission, answer));
            }
            state.grades.retain(|(owner, stored)| {
                *owner != submission.id || stored.question_id != question_id
            });
            let created = grade(question_id, question_id, question_id, points)
                .with_feedback(feedback.map(str::to_string));
            state.grades.push((submission.id, created.clone()));
            return Ok(created);
        }

        let owned = state
            .answers
            .iter()
            .any(|stored| stored.id == answer.id && stored.submission_id == submission.id);
        if !owned {
            return Err(self.missing_answer(submission, answer));
        }
        let id = state.next_id();
        let created =
            grade(id, answer.id, question_id, points).with_feedback(feedback.map(str::to_string));
        state.grades.push((submission.id, created.clone()));
        Ok(created)
    }

    async fn get_all(&self, submission_id: i64) -> StorageResult<Vec<Grade>> {
        self.check()?;
        let state = self.state.lock().expect("state");
        Ok(state
            .grades
            .iter()
            .filter(|(owner, _)| *owner == submission_id)
            .map(|(_, grade)| grade.clone())
            .collect())
    }

    async fn save_many(&self, submission: &Submission, grades: &[Grade]) -> StorageResult<()> {
        self.check()?;
        let mut state = self.state.lock().expect("state");
        for update in grades {
            let stored = state
                .grades
                .iter_mut()
                .find(|(owner, stored)| *owner == submission.id && stored.id == update.id);
            if let Some((_, stored)) = stored {
                stored.points = update.points;
                stored.feedback = update.feedback.clone();
            }
        }
        Ok(())
    }

    async fn delete_all(&self, submission: &Submission) -> StorageResult<()> {
        self.check()?;
        let mut state = self.state.lock().expect("state");
        state.grades.retain(|(owner, _)| *owner != submission.id);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct RecordingDiagnostics {
    events: StdMutex<Vec<MirrorEvent>>,
}

impl RecordingDiagnostics {
    pub(crate) fn events(&self) -> Vec<MirrorEvent> {
        self.events.lock().expect("events").clone()
    }
}

impl MirrorDiagnostics for RecordingDiagnostics {
    fn record(&self, event: MirrorEvent) {
        self.events.lock().expect("events").push(event);
    }
}
