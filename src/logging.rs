use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{AppError, AppResult};

/// Installs the global subscriber. `RUST_LOG` wins over `level` when set.
///
/// Output goes to stderr so stdout stays clean for command results.
pub fn init_tracing(level: &str) -> AppResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => build_filter(level)?,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|err| AppError::internal(format!("failed to install tracing subscriber: {err}")))
}

fn build_filter(level: &str) -> AppResult<EnvFilter> {
    EnvFilter::try_new(level.trim()).map_err(|err| {
        AppError::invalid_argument(format!("invalid log level `{level}`: {err}"))
    })
}
