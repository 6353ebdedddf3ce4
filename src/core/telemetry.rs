use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// Quiet crates that would otherwise drown out mirror diagnostics.
const DEFAULT_DIRECTIVES: &str = "sqlx=warn";

fn default_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("{level},{DEFAULT_DIRECTIVES}"))
}

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(&telemetry.log_level));

    let builder = fmt().with_env_filter(filter).with_target(false);

    if telemetry.json {
        builder.json().try_init().map_err(|err| anyhow::anyhow!(err.to_string()))?;
    } else {
        builder.try_init().map_err(|err| anyhow::anyhow!(err.to_string()))?;
    }

    Ok(())
}
