use async_trait::async_trait;

use super::SyncRouting;
use crate::db::models::Submission;
use crate::repositories::{StorageResult, SubmissionRepository};
use crate::sync::chain::{submission_key, Mirror};
use crate::sync::{MirroredEntity, SkipReason};

#[derive(Clone)]
pub struct SyncedSubmissionRepository {
    routing: SyncRouting,
}

impl SyncedSubmissionRepository {
    pub fn new(routing: SyncRouting) -> Self {
        Self { routing }
    }

    async fn mirror_get_or_create(&self, operation: &'static str, source: &Submission) {
        let Some(mirror) = self.routing.mirror(operation) else {
            return;
        };
        if let Err(error) = mirror.submission(source).await {
            mirror.failed(MirroredEntity::Submission, submission_key(source), &error);
        }
    }

    async fn mirror_save(&self, mirror: &Mirror<'_>, source: &Submission) -> StorageResult<()> {
        let Some(target) = mirror.parent(source).await? else {
            mirror.skip(
                MirroredEntity::Submission,
                submission_key(source),
                SkipReason::MissingSubmission,
            );
            return Ok(());
        };
        mirror.target().submissions.save(&target.with_final_grade(source.final_grade)).await
    }

    async fn mirror_delete(&self, mirror: &Mirror<'_>, source: &Submission) -> StorageResult<()> {
        if let Some(target) = mirror.existing_submission(source).await? {
            mirror.target().submissions.delete(&target).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl SubmissionRepository for SyncedSubmissionRepository {
    async fn create(
        &self,
        quiz_id: i64,
        user_id: i64,
        final_grade: Option<f64>,
    ) -> StorageResult<Submission> {
        let submission =
            self.routing.primary().submissions.create(quiz_id, user_id, final_grade).await?;
        self.mirror_get_or_create("create", &submission).await;
        Ok(submission)
    }

    async fn get_or_create(
        &self,
        quiz_id: i64,
        user_id: i64,
        final_grade: Option<f64>,
    ) -> StorageResult<Submission> {
        let submission =
            self.routing.primary().submissions.get_or_create(quiz_id, user_id, final_grade).await?;
        self.mirror_get_or_create("get_or_create", &submission).await;
        Ok(submission)
    }

    async fn get(&self, quiz_id: i64, user_id: i64) -> StorageResult<Option<Submission>> {
        self.routing.primary().submissions.get(quiz_id, user_id).await
    }

    async fn save(&self, submission: &Submission) -> StorageResult<()> {
        self.routing.primary().submissions.save(submission).await?;

        if let Some(mirror) = self.routing.mirror("save") {
            if let Err(error) = self.mirror_save(&mirror, submission).await {
                mirror.failed(MirroredEntity::Submission, submission_key(submission), &error);
            }
        }
        Ok(())
    }

    /// The mirror's submission is removed only when it already exists.
    async fn delete(&self, submission: &Submission) -> StorageResult<()> {
        self.routing.primary().submissions.delete(submission).await?;

        if let Some(mirror) = self.routing.mirror("delete") {
            if let Err(error) = self.mirror_delete(&mirror, submission).await {
                mirror.failed(MirroredEntity::Submission, submission_key(submission), &error);
            }
        }
        Ok(())
    }
}
