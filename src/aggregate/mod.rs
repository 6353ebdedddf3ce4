//! Repositories that keep both backends populated while a deployment moves
//! from the legacy activity log to the normalized tables.
//!
//! Every aggregate writes to its primary backend first and then mirrors the
//! change into the other one. Reads are served by the primary only. A failed
//! or impossible mirror write never fails the call; it is reported to the
//! [`MirrorDiagnostics`] sink instead.

mod answers;
mod grades;
mod submissions;


use std::fmt;
use std::sync::Arc;

pub use answers::SyncedAnswerRepository;
pub use grades::SyncedGradeRepository;
pub use submissions::SyncedSubmissionRepository;

use crate::repositories::BackendRepositories;
use crate::sync::chain::Mirror;
use crate::sync::MirrorDiagnostics;

/// How an aggregate family routes reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPolicy {
    /// Legacy is primary. Normalized is mirrored only when enabled, and only
    /// into records that already exist there, except on `create`. Bulk
    /// deletes of answers and grades are not mirrored.
    Aggregate,
    /// Legacy is primary. The normalized parent chain is created on demand
    /// before every mirrored write.
    CommentReading,
    /// Normalized is primary. The legacy parent chain is created on demand
    /// before every mirrored write.
    TableReading,
}

impl SyncPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aggregate => "aggregate",
            Self::CommentReading => "comment-reading",
            Self::TableReading => "table-reading",
        }
    }

    fn backfills(self) -> bool {
        !matches!(self, Self::Aggregate)
    }
}

impl fmt::Display for SyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The primary and mirror backends of one aggregate family.
#[derive(Clone)]
pub struct SyncRouting {
    policy: SyncPolicy,
    primary: BackendRepositories,
    mirror: Option<BackendRepositories>,
    diagnostics: Arc<dyn MirrorDiagnostics>,
}

impl SyncRouting {
    /// Writes to legacy, mirrors into `tables` when it is given.
    pub fn aggregate(
        legacy: BackendRepositories,
        tables: Option<BackendRepositories>,
        diagnostics: Arc<dyn MirrorDiagnostics>,
    ) -> Self {
        Self { policy: SyncPolicy::Aggregate, primary: legacy, mirror: tables, diagnostics }
    }

    pub fn comment_reading(
        legacy: BackendRepositories,
        tables: BackendRepositories,
        diagnostics: Arc<dyn MirrorDiagnostics>,
    ) -> Self {
        Self {
            policy: SyncPolicy::CommentReading,
            primary: legacy,
            mirror: Some(tables),
            diagnostics,
        }
    }

    pub fn table_reading(
        legacy: BackendRepositories,
        tables: BackendRepositories,
        diagnostics: Arc<dyn MirrorDiagnostics>,
    ) -> Self {
        Self {
            policy: SyncPolicy::TableReading,
            primary: tables,
            mirror: Some(legacy),
            diagnostics,
        }
    }

    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    pub(crate) fn primary(&self) -> &BackendRepositories {
        &self.primary
    }

    pub(crate) fn mirror(&self, operation: &'static str) -> Option<Mirror<'_>> {
        self.mirror.as_ref().map(|target| {
            Mirror::new(target, self.diagnostics.as_ref(), operation)
                .backfilling(self.policy.backfills())
        })
    }

    /// Mirror for bulk removal of answers or grades. `Aggregate` keeps those
    /// removals on legacy.
    pub(crate) fn delete_mirror(&self, operation: &'static str) -> Option<Mirror<'_>> {
        match self.policy {
            SyncPolicy::Aggregate => None,
            SyncPolicy::CommentReading | SyncPolicy::TableReading => self.mirror(operation),
        }
    }
}
