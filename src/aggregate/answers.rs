use std::slice;

use async_trait::async_trait;

use super::SyncRouting;
use crate::db::models::{Answer, Submission};
use crate::repositories::{AnswerRepository, StorageResult};
use crate::sync::chain::{question_key, submission_key, Mirror};
use crate::sync::{MirroredEntity, SkipReason};

#[derive(Clone)]
pub struct SyncedAnswerRepository {
    routing: SyncRouting,
}

impl SyncedAnswerRepository {
    pub fn new(routing: SyncRouting) -> Self {
        Self { routing }
    }

    async fn mirror_create(
        &self,
        mirror: &Mirror<'_>,
        submission: &Submission,
        answer: &Answer,
    ) -> StorageResult<()> {
        let target = mirror.submission(submission).await?;
        if mirror.backfills() {
            let source = self.routing.primary().answers.get_all(submission.id).await?;
            mirror.answers(&target, &source).await?;
        } else {
            mirror.answers(&target, slice::from_ref(answer)).await?;
        }
        Ok(())
    }

    async fn mirror_save(
        &self,
        mirror: &Mirror<'_>,
        submission: &Submission,
        answer: &Answer,
    ) -> StorageResult<()> {
        let stored = self.routing.primary().answers.get_all(submission.id).await?;
        let Some(current) = stored.into_iter().find(|stored| stored.id == answer.id) else {
            mirror.skip(
                MirroredEntity::Answer,
                question_key(submission, answer.question_id),
                SkipReason::UnknownInSource,
            );
            return Ok(());
        };

        let Some(target) = mirror.parent(submission).await? else {
            mirror.skip(
                MirroredEntity::Answer,
                submission_key(submission),
                SkipReason::MissingSubmission,
            );
            return Ok(());
        };
        mirror.answers(&target, slice::from_ref(&current)).await?;
        Ok(())
    }

    async fn mirror_delete_all(
        &self,
        mirror: &Mirror<'_>,
        submission: &Submission,
    ) -> StorageResult<()> {
        if let Some(target) = mirror.parent(submission).await? {
            mirror.target().answers.delete_all(&target).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AnswerRepository for SyncedAnswerRepository {
    async fn create(
        &self,
        submission: &Submission,
        question_id: i64,
        value: &str,
    ) -> StorageResult<Answer> {
        let answer = self.routing.primary().answers.create(submission, question_id, value).await?;

        if let Some(mirror) = self.routing.mirror("create") {
            if let Err(error) = self.mirror_create(&mirror, submission, &answer).await {
                mirror.failed(MirroredEntity::Answer, question_key(submission, question_id), &error);
            }
        }
        Ok(answer)
    }

    async fn get_all(&self, submission_id: i64) -> StorageResult<Vec<Answer>> {
        self.routing.primary().answers.get_all(submission_id).await
    }

    async fn save(&self, submission: &Submission, answer: &Answer) -> StorageResult<()> {
        self.routing.primary().answers.save(submission, answer).await?;

        if let Some(mirror) = self.routing.mirror("save") {
            if let Err(error) = self.mirror_save(&mirror, submission, answer).await {
                mirror.failed(
                    MirroredEntity::Answer,
                    question_key(submission, answer.question_id),
                    &error,
                );
            }
        }
        Ok(())
    }

    async fn delete_all(&self, submission: &Submission) -> StorageResult<()> {
        self.routing.primary().answers.delete_all(submission).await?;

        if let Some(mirror) = self.routing.delete_mirror("delete_all") {
            if let Err(error) = self.mirror_delete_all(&mirror, submission).await {
                mirror.failed(MirroredEntity::Answer, submission_key(submission), &error);
            }
        }
        Ok(())
    }
}
