mod parsing;
mod settings;
mod types;

pub use types::{
    ConfigError, DatabaseSettings, Environment, ReadPolicy, RuntimeSettings, Settings,
    SyncSettings, TelemetrySettings,
};
