use std::slice;

use async_trait::async_trait;

use super::SyncRouting;
use crate::db::models::{Answer, Grade, Submission};
use crate::repositories::{GradeRepository, StorageResult};
use crate::sync::chain::{question_key, submission_key, Mirror};
use crate::sync::{MirroredEntity, SkipReason};

#[derive(Clone)]
pub struct SyncedGradeRepository {
    routing: SyncRouting,
}

impl SyncedGradeRepository {
    pub fn new(routing: SyncRouting) -> Self {
        Self { routing }
    }

    /// Source answers to carry into the mirror before grades are attached.
    /// Read back from the primary so the mirror never receives a stale value.
    async fn source_answers(
        &self,
        mirror: &Mirror<'_>,
        submission: &Submission,
        answer: &Answer,
    ) -> StorageResult<Vec<Answer>> {
        let mut answers = self.routing.primary().answers.get_all(submission.id).await?;
        if !mirror.backfills() {
            answers.retain(|stored| stored.question_id == answer.question_id);
        }
        if !answers.iter().any(|stored| stored.question_id == answer.question_id) {
            answers.push(answer.clone());
        }
        Ok(answers)
    }

    /// The primary's current state of the `requested` grades. Ids the
    /// primary does not know are reported and left out.
    async fn applied_grades(
        &self,
        mirror: &Mirror<'_>,
        submission: &Submission,
        requested: &[Grade],
    ) -> StorageResult<Vec<Grade>> {
        let stored = self.routing.primary().grades.get_all(submission.id).await?;
        for grade in requested {
            if !stored.iter().any(|applied| applied.id == grade.id) {
                mirror.skip(
                    MirroredEntity::Grade,
                    question_key(submission, grade.question_id),
                    SkipReason::UnknownInSource,
                );
            }
        }
        Ok(stored
            .into_iter()
            .filter(|applied| requested.iter().any(|grade| grade.id == applied.id))
            .collect())
    }

    async fn mirror_create(
        &self,
        mirror: &Mirror<'_>,
        submission: &Submission,
        answer: &Answer,
        grade: &Grade,
    ) -> StorageResult<()> {
        let target = mirror.submission(submission).await?;
        let source_answers = self.source_answers(mirror, submission, answer).await?;
        let target_answers = mirror.answers(&target, &source_answers).await?;
        mirror.grades(&target, slice::from_ref(grade), &target_answers).await
    }

    /// Mirrors what the primary holds after the save, never the caller's
    /// copy. Without backfill, grades land only on answers the mirror
    /// already has.
    async fn mirror_save_many(
        &self,
        mirror: &Mirror<'_>,
        submission: &Submission,
        grades: &[Grade],
    ) -> StorageResult<()> {
        let grades = self.applied_grades(mirror, submission, grades).await?;
        if grades.is_empty() {
            return Ok(());
        }

        let Some(target) = mirror.parent(submission).await? else {
            mirror.skip(
                MirroredEntity::Grade,
                submission_key(submission),
                SkipReason::MissingSubmission,
            );
            return Ok(());
        };

        let target_answers = if mirror.backfills() {
            let source = self.routing.primary().answers.get_all(submission.id).await?;
            mirror.answers(&target, &source).await?
        } else {
            mirror.target().answers.get_all(target.id).await?
        };
        mirror.grades(&target, &grades, &target_answers).await
    }

    async fn mirror_delete_all(
        &self,
        mirror: &Mirror<'_>,
        submission: &Submission,
    ) -> StorageResult<()> {
        if let Some(target) = mirror.parent(submission).await? {
            mirror.target().grades.delete_all(&target).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl GradeRepository for SyncedGradeRepository {
    async fn create(
        &self,
        submission: &Submission,
        answer: &Answer,
        question_id: i64,
        points: i32,
        feedback: Option<&str>,
    ) -> StorageResult<Grade> {
        let grade = self
            .routing
            .primary()
            .grades
            .create(submission, answer, question_id, points, feedback)
            .await?;

        if let Some(mirror) = self.routing.mirror("create") {
            if let Err(error) = self.mirror_create(&mirror, submission, answer, &grade).await {
                mirror.failed(MirroredEntity::Grade, question_key(submission, question_id), &error);
            }
        }
        Ok(grade)
    }

    async fn get_all(&self, submission_id: i64) -> StorageResult<Vec<Grade>> {
        self.routing.primary().grades.get_all(submission_id).await
    }

    async fn save_many(&self, submission: &Submission, grades: &[Grade]) -> StorageResult<()> {
        self.routing.primary().grades.save_many(submission, grades).await?;
        if grades.is_empty() {
            return Ok(());
        }

        if let Some(mirror) = self.routing.mirror("save_many") {
            if let Err(error) = self.mirror_save_many(&mirror, submission, grades).await {
                mirror.failed(MirroredEntity::Grade, submission_key(submission), &error);
            }
        }
        Ok(())
    }

    async fn delete_all(&self, submission: &Submission) -> StorageResult<()> {
        self.routing.primary().grades.delete_all(submission).await?;

        if let Some(mirror) = self.routing.delete_mirror("delete_all") {
            if let Err(error) = self.mirror_delete_all(&mirror, submission).await {
                mirror.failed(MirroredEntity::Grade, submission_key(submission), &error);
            }
        }
        Ok(())
    }
}
