//! Logging initialization
//!
//! Installs a `tracing` subscriber with an env-driven filter. The filter is
//! taken from `RUST_LOG` when set, then from `LOG_LEVEL` (the variable the
//! provisioning scripts export, e.g. `LOG_LEVEL=debug`), then from the
//! configured default.

use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Environment variable carrying a plain log level
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Errors that can occur during logging initialization
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive could not be parsed
    #[error("invalid log filter '{filter}': {message}")]
    InvalidFilter {
        /// Directive that failed to parse
        filter: String,
        /// Parser message
        message: String,
    },

    /// Failed to initialize tracing subscriber
    #[error("failed to initialize tracing subscriber: {0}")]
    SubscriberInit(String),
}

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Filter used when neither `RUST_LOG` nor `LOG_LEVEL` is set
    pub default_filter: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_filter: "info,kube=warn,tower=warn,hyper=warn".to_string(),
            json: false,
        }
    }
}

/// Pick the filter directive, highest priority first
pub fn resolve_filter(
    rust_log: Option<String>,
    log_level: Option<String>,
    default_filter: &str,
) -> String {
    rust_log
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            log_level
                .map(|l| l.trim().to_ascii_lowercase())
                .filter(|l| !l.is_empty())
        })
        .unwrap_or_else(|| default_filter.to_string())
}

/// Initialize logging with the given configuration
///
/// Returns an error instead of panicking when a global subscriber is already
/// installed, so test binaries can call it from every test.
pub fn init_logging(config: LogConfig) -> Result<(), TelemetryError> {
    let directive = resolve_filter(
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
        std::env::var(LOG_LEVEL_ENV).ok(),
        &config.default_filter,
    );
    let env_filter =
        EnvFilter::try_new(&directive).map_err(|e| TelemetryError::InvalidFilter {
            filter: directive.clone(),
            message: e.to_string(),
        })?;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };

    result.map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
}
