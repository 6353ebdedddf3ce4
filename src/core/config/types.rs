use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Settings {
    pub(super) runtime: RuntimeSettings,
    pub(super) database: DatabaseSettings,
    pub(super) sync: SyncSettings,
    pub(super) telemetry: TelemetrySettings,
}

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub environment: Environment,
    pub strict_config: bool,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub(crate) postgres_server: String,
    pub(crate) postgres_port: u16,
    pub(crate) postgres_user: String,
    pub(crate) postgres_password: String,
    pub(crate) postgres_db: String,
    pub(crate) database_url: Option<String>,
    pub(crate) legacy_database_url: Option<String>,
    pub(crate) tables_database_url: Option<String>,
    pub(crate) max_connections: u32,
    pub(crate) migrations_dir: String,
}

/// Which migration stage the deployment is in.
///
/// Together with the capability flag this picks the aggregate family the
/// factory builds; it is read once at construction and never consulted again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPolicy {
    /// Legacy is primary; normalized is a write-only shadow while the flag is on.
    Shadow,
    /// Legacy is primary; normalized is kept warm through the full parent chain.
    Legacy,
    /// Normalized is primary; legacy is kept for rollback.
    Tables,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub tables_enabled: bool,
    pub read_policy: ReadPolicy,
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub log_level: String,
    pub json: bool,
    pub prometheus_enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Staging,
    Test,
}

impl Environment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Staging => "staging",
            Self::Test => "test",
        }
    }

    pub(super) fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl ReadPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shadow => "shadow",
            Self::Legacy => "legacy",
            Self::Tables => "tables",
        }
    }

    pub(crate) fn requires_tables(self) -> bool {
        !matches!(self, Self::Shadow)
    }
}

impl SyncSettings {
    pub fn new(tables_enabled: bool, read_policy: ReadPolicy) -> Self {
        Self { tables_enabled, read_policy }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self { tables_enabled: false, read_policy: ReadPolicy::Shadow }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("missing required secret for {0}")]
    MissingSecret(&'static str),
    #[error("read policy '{}' requires QUIZ_SYNC_TABLES_ENABLED", .0.as_str())]
    TablesDisabled(ReadPolicy),
}
