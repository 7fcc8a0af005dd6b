// Telemetry Module
//
// Logging setup for processes embedding a work ticker:
// - Configuration from environment variables
// - A tracing-subscriber registry with an EnvFilter and a plain or JSON fmt layer

use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

// ============================================================================
// Telemetry Configuration
// ============================================================================

/// Configuration for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name, recorded once at startup
    pub service_name: String,
    /// Log filter (e.g., "info", "debug", "workticker=debug")
    pub log_filter: Option<String>,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "workticker".to_string(),
            log_filter: None,
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `SERVICE_NAME`: Service name (default: "workticker")
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    /// - `LOG_FORMAT`: "json" for JSON output
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            service_name: lookup("SERVICE_NAME").unwrap_or_else(|| "workticker".to_string()),
            log_filter: lookup("RUST_LOG").or_else(|| lookup("LOG_LEVEL")),
            json: lookup("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_ref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Install the global tracing subscriber
///
/// Fails if a global subscriber is already set.
///
/// # Example
///
/// ```no_run
/// use workticker::telemetry::{init_telemetry, TelemetryConfig};
///
/// init_telemetry(TelemetryConfig::from_env()).expect("logging already initialized");
/// ```
pub fn init_telemetry(config: TelemetryConfig) -> Result<(), TryInitError> {
    let plain_layer = (!config.json).then(|| tracing_subscriber::fmt::layer().with_target(true));
    let json_layer = config
        .json
        .then(|| tracing_subscriber::fmt::layer().json().with_target(true));

    tracing_subscriber::registry()
        .with(config.filter())
        .with(plain_layer)
        .with(json_layer)
        .try_init()?;

    tracing::debug!(
        service = %config.service_name,
        json = config.json,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = TelemetryConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config, TelemetryConfig::default());
    }

    #[test]
    fn test_rust_log_wins_over_log_level() {
        let config = TelemetryConfig::from_lookup(lookup_from(&[
            ("RUST_LOG", "workticker=trace"),
            ("LOG_LEVEL", "warn"),
            ("LOG_FORMAT", "JSON"),
        ]));
        assert_eq!(config.log_filter.as_deref(), Some("workticker=trace"));
        assert!(config.json);

        let config = TelemetryConfig::from_lookup(lookup_from(&[("LOG_LEVEL", "warn")]));
        assert_eq!(config.log_filter.as_deref(), Some("warn"));
        assert!(!config.json);
    }

    #[test]
    fn test_init_twice_fails() {
        let first = init_telemetry(TelemetryConfig::default());
        let second = init_telemetry(TelemetryConfig::default());
        // Another test binary may have installed a subscriber first
        assert!(first.is_err() || second.is_err());
    }
}
