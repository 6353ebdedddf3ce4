//! Building blocks shared by the aggregate repositories: locating or lazily
//! creating the mirror's parent chain, and planning mirrored grade writes.

use crate::db::models::{Answer, Grade, Submission};
use crate::repositories::{BackendRepositories, StorageError, StorageResult};
use crate::sync::diagnostics::{MirrorDiagnostics, MirrorEvent, MirroredEntity, SkipReason};
use crate::sync::matching::{match_one, pair_by_key, Counterpart};

pub(crate) fn submission_key(submission: &Submission) -> String {
    format!("quiz {} user {}", submission.quiz_id, submission.user_id)
}

pub(crate) fn question_key(submission: &Submission, question_id: i64) -> String {
    format!("quiz {} user {} question {}", submission.quiz_id, submission.user_id, question_id)
}

/// A grade write to perform on the mirror.
#[derive(Debug, PartialEq)]
pub(crate) enum GradeWrite<'g> {
    /// The mirror's grade, carrying the source's points and feedback.
    Update(Grade),
    Create { answer: Answer, source: &'g Grade },
}

/// One mirrored operation against the `target` backend.
pub(crate) struct Mirror<'a> {
    target: &'a BackendRepositories,
    diagnostics: &'a dyn MirrorDiagnostics,
    operation: &'static str,
    backfill: bool,
}

impl<'a> Mirror<'a> {
    pub(crate) fn new(
        target: &'a BackendRepositories,
        diagnostics: &'a dyn MirrorDiagnostics,
        operation: &'static str,
    ) -> Self {
        Self { target, diagnostics, operation, backfill: false }
    }

    /// Lets the mirror create a missing parent chain instead of skipping.
    pub(crate) fn backfilling(self, backfill: bool) -> Self {
        Self { backfill, ..self }
    }

    pub(crate) fn backfills(&self) -> bool {
        self.backfill
    }

    pub(crate) fn target(&self) -> &'a BackendRepositories {
        self.target
    }

    pub(crate) fn skip(&self, entity: MirroredEntity, key: String, reason: SkipReason) {
        self.diagnostics.record(MirrorEvent {
            target: self.target.backend,
            entity,
            operation: self.operation,
            key,
            reason,
        });
    }

    /// Reports a mirror error. The primary write is left as it is.
    pub(crate) fn failed(&self, entity: MirroredEntity, key: String, error: &StorageError) {
        self.skip(entity, key, SkipReason::StorageFailure { error: error.to_string() });
    }

    pub(crate) async fn submission(&self, source: &Submission) -> StorageResult<Submission> {
        self.target
            .submissions
            .get_or_create(source.quiz_id, source.user_id, source.final_grade)
            .await
    }

    pub(crate) async fn existing_submission(
        &self,
        source: &Submission,
    ) -> StorageResult<Option<Submission>> {
        self.target.submissions.get(source.quiz_id, source.user_id).await
    }

    /// The mirror's counterpart of `source`; created only when backfilling.
    pub(crate) async fn parent(&self, source: &Submission) -> StorageResult<Option<Submission>> {
        if self.backfill {
            self.submission(source).await.map(Some)
        } else {
            self.existing_submission(source).await
        }
    }

    /// Creates every source answer the mirror lacks, brings the value of
    /// every uniquely matched one up to date, and returns the mirror's full
    /// answer list.
    pub(crate) async fn answers(
        &self,
        target_submission: &Submission,
        source: &[Answer],
    ) -> StorageResult<Vec<Answer>> {
        let mut existing = self.target.answers.get_all(target_submission.id).await?;
        let mut created = Vec::new();
        let mut refreshed = Vec::new();

        for (question_id, pairing) in pair_by_key(source, &existing) {
            match pairing.target {
                Counterpart::Missing => {
                    let answer = self
                        .target
                        .answers
                        .create(target_submission, question_id, &pairing.source.value)
                        .await?;
                    created.push(answer);
                }
                Counterpart::Unique(stored) if stored.value != pairing.source.value => {
                    let answer = Answer { value: pairing.source.value.clone(), ..stored.clone() };
                    self.target.answers.save(target_submission, &answer).await?;
                    tracing::debug!(
                        target_backend = %self.target.backend,
                        submission_id = target_submission.id,
                        question_id,
                        "Refreshed mirrored answer"
                    );
                    refreshed.push(answer);
                }
                Counterpart::Unique(_) => {}
                Counterpart::Ambiguous(matches) => self.skip(
                    MirroredEntity::Answer,
                    question_key(target_submission, question_id),
                    SkipReason::Ambiguous { matches },
                ),
            }
        }

        for answer in refreshed {
            if let Some(stored) = existing.iter_mut().find(|stored| stored.id == answer.id) {
                *stored = answer;
            }
        }
        existing.extend(created);
        Ok(existing)
    }

    /// Decides, per source grade, whether the mirror gets an update, an
    /// insert, or nothing. Skips are reported as they are found.
    pub(crate) fn plan_grades<'g>(
        &self,
        target_submission: &Submission,
        source: &'g [Grade],
        target_grades: &[Grade],
        target_answers: &[Answer],
    ) -> Vec<GradeWrite<'g>> {
        let mut writes = Vec::new();

        for (question_id, pairing) in pair_by_key(source, target_grades) {
            let key = || question_key(target_submission, question_id);
            match pairing.target {
                Counterpart::Unique(existing) => writes.push(GradeWrite::Update(Grade {
                    points: pairing.source.points,
                    feedback: pairing.source.feedback.clone(),
                    ..existing.clone()
                })),
                Counterpart::Ambiguous(matches) => {
                    self.skip(MirroredEntity::Grade, key(), SkipReason::Ambiguous { matches })
                }
                Counterpart::Missing => match match_one(target_answers, question_id) {
                    Counterpart::Unique(answer) => writes
                        .push(GradeWrite::Create { answer: answer.clone(), source: pairing.source }),
                    Counterpart::Missing => {
                        self.skip(MirroredEntity::Grade, key(), SkipReason::MissingAnswer)
                    }
                    Counterpart::Ambiguous(matches) => {
                        self.skip(MirroredEntity::Grade, key(), SkipReason::Ambiguous { matches })
                    }
                },
            }
        }

        writes
    }

    pub(crate) async fn apply_grades(
        &self,
        target_submission: &Submission,
        writes: Vec<GradeWrite<'_>>,
    ) -> StorageResult<()> {
        let mut updates = Vec::new();
        let mut creates = Vec::new();
        for write in writes {
            match write {
                GradeWrite::Update(grade) => updates.push(grade),
                GradeWrite::Create { answer, source } => creates.push((answer, source)),
            }
        }

        if !updates.is_empty() {
            self.target.grades.save_many(target_submission, &updates).await?;
        }
        for (answer, source) in creates {
            self.target
                .grades
                .create(
                    target_submission,
                    &answer,
                    source.question_id,
                    source.points,
                    source.feedback.as_deref(),
                )
                .await?;
        }
        Ok(())
    }

    /// Mirrors `source` grades onto `target_submission`, looking answers up
    /// among `target_answers`.
    pub(crate) async fn grades(
        &self,
        target_submission: &Submission,
        source: &[Grade],
        target_answers: &[Answer],
    ) -> StorageResult<()> {
        let target_grades = self.target.grades.get_all(target_submission.id).await?;
        let writes = self.plan_grades(target_submission, source, &target_grades, target_answers);
        self.apply_grades(target_submission, writes).await
    }
}
