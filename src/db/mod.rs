pub mod models;
pub mod types;

use std::path::Path;
use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};

use crate::core::config::Settings;
use crate::db::types::Backend;

/// Connection pools for both backends. `tables` is absent while the
/// normalized backend is not provisioned.
#[derive(Clone)]
pub struct Pools {
    pub legacy: PgPool,
    pub tables: Option<PgPool>,
}

pub async fn init_pools(settings: &Settings) -> Result<Pools, sqlx::Error> {
    let database = settings.database();
    let legacy = init_pool(&database.legacy_database_url(), database.max_connections()).await?;

    let tables = if settings.sync().tables_enabled {
        Some(init_pool(&database.tables_database_url(), database.max_connections()).await?)
    } else {
        None
    };

    Ok(Pools { legacy, tables })
}

pub(crate) async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    let mut connect_options: PgConnectOptions = database_url.parse()?;

    connect_options = connect_options
        .application_name("quiz-sync")
        .log_statements(tracing::log::LevelFilter::Off);

    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .test_before_acquire(true)
        .connect_with(connect_options)
        .await
}

/// Applies the schema of one backend from `<migrations_dir>/<backend>`.
///
/// Both backends may share a database and therefore a migration history, so
/// versions applied by the other backend's migrator are ignored.
pub async fn run_migrations(
    pool: &PgPool,
    migrations_dir: &str,
    backend: Backend,
) -> Result<(), sqlx::Error> {
    let path = Path::new(migrations_dir).join(backend.migrations_subdir());
    let mut migrator = sqlx::migrate::Migrator::new(path.as_path())
        .await
        .map_err(|error| sqlx::Error::Migrate(Box::new(error)))?;
    migrator.set_ignore_missing(true);
    migrator.run(pool).await.map_err(|error| sqlx::Error::Migrate(Box::new(error)))?;
    Ok(())
}
