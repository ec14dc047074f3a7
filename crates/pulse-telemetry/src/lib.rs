//! Tracing initialization for the pulse client.
//!
//! Logs go to stderr through a fmt subscriber. `RUST_LOG` always wins over
//! the configured levels.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default log level. Overridden by RUST_LOG env var.
    pub log_level: Level,
    /// Per-module level overrides (e.g. "pulse_channel" => DEBUG).
    pub module_levels: Vec<(String, Level)>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Level::INFO,
            module_levels: Vec::new(),
        }
    }
}

impl TelemetryConfig {
    /// Assemble the filter directive string: base level first, then one
    /// `module=level` entry per override.
    pub fn filter_directives(&self) -> String {
        let mut filter = self.log_level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push_str(&format!(",{}={}", module, level.to_string().to_lowercase()));
        }
        filter
    }
}

/// Initialize the telemetry subsystem. Call once at startup; repeated calls
/// are harmless no-ops.
pub fn init_telemetry(config: &TelemetryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_is_info() {
        let config = TelemetryConfig::default();
        assert_eq!(config.filter_directives(), "info");
    }

    #[test]
    fn module_overrides_appended() {
        let config = TelemetryConfig {
            log_level: Level::WARN,
            module_levels: vec![
                ("pulse_channel".into(), Level::DEBUG),
                ("pulse_sync".into(), Level::TRACE),
            ],
        };
        assert_eq!(
            config.filter_directives(),
            "warn,pulse_channel=debug,pulse_sync=trace"
        );
    }

    #[test]
    fn init_is_idempotent() {
        let config = TelemetryConfig::default();
        init_telemetry(&config);
        init_telemetry(&config);
    }
}
