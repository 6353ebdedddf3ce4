use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_environment, parse_read_policy, parse_u16,
    parse_u32,
};
use super::types::{
    ConfigError, DatabaseSettings, RuntimeSettings, Settings, SyncSettings, TelemetrySettings,
};

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let environment = parse_environment(
            env_optional("QUIZ_SYNC_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("QUIZ_SYNC_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "quizsync");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "quiz_sync");
        let database_url = env_optional("DATABASE_URL");
        let legacy_database_url = env_optional("LEGACY_DATABASE_URL");
        let tables_database_url = env_optional("TABLES_DATABASE_URL");
        let max_connections = parse_u32(
            "QUIZ_SYNC_MAX_CONNECTIONS",
            env_or_default("QUIZ_SYNC_MAX_CONNECTIONS", "10"),
        )?;
        let migrations_dir = env_or_default("QUIZ_SYNC_MIGRATIONS_DIR", "migrations");

        let tables_enabled =
            env_optional("QUIZ_SYNC_TABLES_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);
        let read_policy = parse_read_policy(env_optional("QUIZ_SYNC_READ_POLICY"))?;

        let log_level = env_or_default("QUIZ_SYNC_LOG_LEVEL", "info");
        let json =
            env_optional("QUIZ_SYNC_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            runtime: RuntimeSettings { environment, strict_config },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
                legacy_database_url,
                tables_database_url,
                max_connections,
                migrations_dir,
            },
            sync: SyncSettings { tables_enabled, read_policy },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    pub fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub fn sync(&self) -> SyncSettings {
        self.sync
    }

    pub fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "QUIZ_SYNC_MAX_CONNECTIONS",
                value: String::from("0"),
            });
        }

        if self.sync.read_policy.requires_tables() && !self.sync.tables_enabled {
            return Err(ConfigError::TablesDisabled(self.sync.read_policy));
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none()
            && self.database.legacy_database_url.is_none()
            && self.database.postgres_password.is_empty()
        {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        if self.sync.tables_enabled
            && self.database.database_url.is_none()
            && self.database.tables_database_url.is_none()
            && self.database.postgres_password.is_empty()
        {
            return Err(ConfigError::MissingSecret("TABLES_DATABASE_URL"));
        }

        Ok(())
    }
}

impl DatabaseSettings {
    pub fn database_url(&self) -> String {
        if let Some(url) = &self.database_url {
            return url.clone();
        }
        format!(
            "postgresql://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_server,
            self.postgres_port,
            self.postgres_db
        )
    }

    pub fn legacy_database_url(&self) -> String {
        self.legacy_database_url.clone().unwrap_or_else(|| self.database_url())
    }

    pub fn tables_database_url(&self) -> String {
        self.tables_database_url.clone().unwrap_or_else(|| self.database_url())
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections
    }

    pub fn migrations_dir(&self) -> &str {
        &self.migrations_dir
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;
    use crate::core::config::{ConfigError, ReadPolicy};
    use crate::test_support;

    #[tokio::test]
    async fn load_defaults_to_shadow_with_tables_disabled() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");

        assert!(!settings.sync().tables_enabled);
        assert_eq!(settings.sync().read_policy, ReadPolicy::Shadow);
        assert_eq!(settings.database().max_connections(), 10);
    }

    #[tokio::test]
    async fn backend_urls_fall_back_to_shared_url() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("DATABASE_URL", "postgresql://u:p@db:5432/shared");
        std::env::set_var("TABLES_DATABASE_URL", "postgresql://u:p@db:5432/tables");

        let settings = Settings::load().expect("settings");

        assert_eq!(settings.database().legacy_database_url(), "postgresql://u:p@db:5432/shared");
        assert_eq!(settings.database().tables_database_url(), "postgresql://u:p@db:5432/tables");
    }

    #[tokio::test]
    async fn reading_policies_require_capability_flag() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("QUIZ_SYNC_READ_POLICY", "tables");
        std::env::set_var("QUIZ_SYNC_TABLES_ENABLED", "0");

        let err = Settings::load().expect_err("tables policy without flag");
        assert!(matches!(err, ConfigError::TablesDisabled(ReadPolicy::Tables)));

        std::env::set_var("QUIZ_SYNC_TABLES_ENABLED", "1");
        let settings = Settings::load().expect("settings");
        assert_eq!(settings.sync().read_policy, ReadPolicy::Tables);
    }

    #[tokio::test]
    async fn strict_config_requires_database_secret() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("QUIZ_SYNC_STRICT_CONFIG", "1");
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("POSTGRES_PASSWORD");

        let err = Settings::load().expect_err("missing password");
        assert!(matches!(err, ConfigError::MissingSecret("POSTGRES_PASSWORD")));
    }
}
