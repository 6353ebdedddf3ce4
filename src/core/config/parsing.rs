use std::env;

use super::types::{ConfigError, Environment, ReadPolicy};

pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|item| item.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

pub(super) fn parse_read_policy(value: Option<String>) -> Result<ReadPolicy, ConfigError> {
    let Some(raw) = value else {
        return Ok(ReadPolicy::Shadow);
    };

    match raw.to_ascii_lowercase().as_str() {
        "shadow" => Ok(ReadPolicy::Shadow),
        "legacy" | "comments" => Ok(ReadPolicy::Legacy),
        "tables" => Ok(ReadPolicy::Tables),
        _ => Err(ConfigError::InvalidValue { field: "QUIZ_SYNC_READ_POLICY", value: raw }),
    }
}
