use std::sync::Arc;

use thiserror::Error;

use crate::aggregate::{
    SyncPolicy, SyncRouting, SyncedAnswerRepository, SyncedGradeRepository,
    SyncedSubmissionRepository,
};
use crate::core::config::{ReadPolicy, SyncSettings};
use crate::db::types::Backend;
use crate::db::Pools;
use crate::repositories::{
    AnswerRepository, BackendRepositories, GradeRepository, SubmissionRepository,
};
use crate::sync::{MirrorDiagnostics, TracingDiagnostics};

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("no storage configured for the {0} backend")]
    MissingStorage(Backend),
    #[error("read policy '{}' requires the tables backend to be enabled", .0.as_str())]
    TablesDisabled(ReadPolicy),
}

/// The repository family handed to callers. They never learn which backend
/// serves them.
#[derive(Clone)]
pub struct QuizRepositories {
    pub submissions: Arc<dyn SubmissionRepository>,
    pub answers: Arc<dyn AnswerRepository>,
    pub grades: Arc<dyn GradeRepository>,
    policy: SyncPolicy,
    mirrored: Option<Backend>,
}

impl QuizRepositories {
    pub fn policy(&self) -> SyncPolicy {
        self.policy
    }

    /// The backend that receives mirrored writes, if any.
    pub fn mirrored(&self) -> Option<Backend> {
        self.mirrored
    }
}

pub struct RepositoryFactory {
    settings: SyncSettings,
    legacy: Option<BackendRepositories>,
    tables: Option<BackendRepositories>,
    diagnostics: Arc<dyn MirrorDiagnostics>,
}

impl RepositoryFactory {
    pub fn new(
        settings: SyncSettings,
        legacy: Option<BackendRepositories>,
        tables: Option<BackendRepositories>,
    ) -> Self {
        Self { settings, legacy, tables, diagnostics: Arc::new(TracingDiagnostics) }
    }

    pub fn from_pools(settings: SyncSettings, pools: &Pools) -> Self {
        Self::new(
            settings,
            Some(BackendRepositories::legacy(pools.legacy.clone())),
            pools.tables.clone().map(BackendRepositories::tables),
        )
    }

    pub fn with_diagnostics(self, diagnostics: Arc<dyn MirrorDiagnostics>) -> Self {
        Self { diagnostics, ..self }
    }

    pub fn routing(&self) -> Result<SyncRouting, FactoryError> {
        let legacy = self.legacy.clone().ok_or(FactoryError::MissingStorage(Backend::Legacy))?;
        let diagnostics = self.diagnostics.clone();

        match self.settings.read_policy {
            ReadPolicy::Shadow => {
                let tables = if self.settings.tables_enabled {
                    Some(self.tables_for(ReadPolicy::Shadow)?)
                } else {
                    None
                };
                Ok(SyncRouting::aggregate(legacy, tables, diagnostics))
            }
            ReadPolicy::Legacy => {
                let tables = self.tables_for(ReadPolicy::Legacy)?;
                Ok(SyncRouting::comment_reading(legacy, tables, diagnostics))
            }
            ReadPolicy::Tables => {
                let tables = self.tables_for(ReadPolicy::Tables)?;
                Ok(SyncRouting::table_reading(legacy, tables, diagnostics))
            }
        }
    }

    pub fn build(&self) -> Result<QuizRepositories, FactoryError> {
        let routing = self.routing()?;
        let policy = routing.policy();
        let mirrored = match policy {
            SyncPolicy::Aggregate if !self.settings.tables_enabled => None,
            SyncPolicy::Aggregate | SyncPolicy::CommentReading => Some(Backend::Tables),
            SyncPolicy::TableReading => Some(Backend::Legacy),
        };

        tracing::debug!(
            policy = %policy,
            read_policy = self.settings.read_policy.as_str(),
            tables_enabled = self.settings.tables_enabled,
            "Built quiz repositories"
        );

        Ok(QuizRepositories {
            submissions: Arc::new(SyncedSubmissionRepository::new(routing.clone())),
            answers: Arc::new(SyncedAnswerRepository::new(routing.clone())),
            grades: Arc::new(SyncedGradeRepository::new(routing)),
            policy,
            mirrored,
        })
    }

    fn tables_for(&self, policy: ReadPolicy) -> Result<BackendRepositories, FactoryError> {
        if !self.settings.tables_enabled {
            return Err(FactoryError::TablesDisabled(policy));
        }
        self.tables.clone().ok_or(FactoryError::MissingStorage(Backend::Tables))
    }
}
