//! Keeps quiz submissions, answers and grades consistent across the legacy
//! activity-log storage and the normalized quiz tables while a deployment
//! migrates from one to the other.

pub mod aggregate;
pub mod core;
pub mod db;
pub mod factory;
pub mod repositories;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use crate::core::config::{ReadPolicy, Settings, SyncSettings};
pub use crate::db::models::{Answer, Grade, Submission};
pub use crate::factory::{FactoryError, QuizRepositories, RepositoryFactory};
pub use crate::repositories::{
    AnswerRepository, GradeRepository, StorageError, StorageResult, SubmissionRepository,
};

use anyhow::Context;

use crate::core::telemetry;
use crate::db::types::Backend;

/// Connects both backends, applies their migrations and checks that the
/// configured repository family can be built.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let pools = db::init_pools(&settings).await.context("Failed to connect database pools")?;
    let migrations_dir = settings.database().migrations_dir();
    db::run_migrations(&pools.legacy, migrations_dir, Backend::Legacy)
        .await
        .context("Failed to migrate legacy backend")?;
    if let Some(tables) = &pools.tables {
        db::run_migrations(tables, migrations_dir, Backend::Tables)
            .await
            .context("Failed to migrate tables backend")?;
    }

    let repositories = RepositoryFactory::from_pools(settings.sync(), &pools).build()?;

    tracing::info!(
        environment = settings.runtime().environment.as_str(),
        read_policy = settings.sync().read_policy.as_str(),
        tables_enabled = settings.sync().tables_enabled,
        policy = %repositories.policy(),
        mirrored = repositories.mirrored().map(Backend::as_str).unwrap_or("none"),
        "Quiz repositories ready"
    );

    pools.legacy.close().await;
    if let Some(tables) = pools.tables {
        tables.close().await;
    }

    Ok(())
}
