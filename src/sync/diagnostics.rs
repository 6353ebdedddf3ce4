use std::fmt;

use crate::core::metrics;
use crate::db::types::Backend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirroredEntity {
    Submission,
    Answer,
    Grade,
}

impl MirroredEntity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Answer => "answer",
            Self::Grade => "grade",
        }
    }
}

/// Why a mirrored write did not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The mirror holds several records for the key and none can be picked.
    Ambiguous { matches: usize },
    /// A grade has no answer to attach to in the mirror.
    MissingAnswer,
    /// The mirror has no submission and the policy does not backfill one.
    MissingSubmission,
    /// The primary holds no record with the id the caller wrote to.
    UnknownInSource,
    /// The mirror backend returned an error.
    StorageFailure { error: String },
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ambiguous { .. } => "ambiguous",
            Self::MissingAnswer => "missing_answer",
            Self::MissingSubmission => "missing_submission",
            Self::UnknownInSource => "unknown_in_source",
            Self::StorageFailure { .. } => "storage_failure",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ambiguous { matches } => write!(f, "{matches} candidate records share the key"),
            Self::MissingAnswer => f.write_str("no answer to attach the grade to"),
            Self::MissingSubmission => f.write_str("no submission in the mirror backend"),
            Self::UnknownInSource => f.write_str("no such record in the primary backend"),
            Self::StorageFailure { error } => write!(f, "mirror write failed: {error}"),
        }
    }
}

/// A mirrored write that was skipped. The primary write it accompanied has
/// already succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct MirrorEvent {
    pub target: Backend,
    pub entity: MirroredEntity,
    pub operation: &'static str,
    /// Business key of the record, e.g. `quiz 1 user 9 question 3`.
    pub key: String,
    pub reason: SkipReason,
}

/// Receives every skipped mirror write so that drift between the backends
/// stays observable.
pub trait MirrorDiagnostics: Send + Sync {
    fn record(&self, event: MirrorEvent);
}

/// Logs each event and counts it in `quiz_sync_mirror_skipped_total`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl MirrorDiagnostics for TracingDiagnostics {
    fn record(&self, event: MirrorEvent) {
        tracing::warn!(
            target_backend = %event.target,
            entity = event.entity.as_str(),
            operation = event.operation,
            key = %event.key,
            reason = %event.reason,
            "Skipped mirrored write"
        );
        metrics::record_mirror_skip(
            event.target.as_str(),
            event.entity.as_str(),
            event.reason.as_str(),
        );
    }
}
