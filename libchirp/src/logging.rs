//! Logging setup shared by the chirp binaries
//!
//! All output goes to stderr so stdout stays free for the tokens printed by
//! the authorization flow.
//!
//! ```no_run
//! use libchirp::logging::{LogFormat, LoggingConfig};
//!
//! LoggingConfig::new(LogFormat::Json, "info").init();
//! ```

use std::str::FromStr;

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Plain single-line output
    Text,
    /// One JSON object per line, for log shippers
    Json,
    /// Multi-line colored output for local development
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(format!(
                "Invalid log format: '{}'. Valid options: text, json, pretty",
                other
            )),
        }
    }
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogFormat::Text => "text",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub level: String,
}

impl LoggingConfig {
    pub fn new(format: LogFormat, level: impl Into<String>) -> Self {
        Self {
            format,
            level: level.into(),
        }
    }

    /// Read `CHIRP_LOG_FORMAT` and `CHIRP_LOG_LEVEL`, defaulting to text/info.
    ///
    /// An unparseable format falls back to text rather than failing startup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let format = lookup("CHIRP_LOG_FORMAT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(LogFormat::Text);
        let level = lookup("CHIRP_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        Self::new(format, level)
    }

    /// Force debug level regardless of the configured one.
    pub fn verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.level = "debug".to_string();
        }
        self
    }

    /// `RUST_LOG` wins over the configured level when it is set.
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level))
    }

    /// Install the global subscriber.
    ///
    /// A second call is ignored, which keeps test binaries that initialize
    /// logging from several places from panicking.
    pub fn init(&self) {
        let filter = self.filter();

        let installed = match self.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .flatten_event(true)
                .with_target(true)
                .try_init(),
            LogFormat::Pretty => tracing_subscriber::fmt()
                .pretty()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_line_number(true)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init(),
        };

        if installed.is_err() {
            tracing::debug!("logging already initialized");
        }
    }
}

/// Initialize logging from the process environment
pub fn init_default(verbose: bool) {
    LoggingConfig::from_lookup(|key| std::env::var(key).ok())
        .verbose(verbose)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_log_format_parsing_is_case_insensitive() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!(" Pretty ".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
    }

    #[test]
    fn test_log_format_rejects_unknown() {
        let err = "yaml".parse::<LogFormat>().unwrap_err();
        assert!(err.contains("Invalid log format: 'yaml'"));
    }

    #[test]
    fn test_log_format_display_round_trips() {
        for format in [LogFormat::Text, LogFormat::Json, LogFormat::Pretty] {
            assert_eq!(format.to_string().parse::<LogFormat>().unwrap(), format);
        }
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = LoggingConfig::from_lookup(|_| None);
        assert_eq!(config.format, LogFormat::Text);
        assert_eq!(config.level, "info");
    }

    #[test]
    fn test_from_lookup_reads_variables() {
        let vars: HashMap<&str, &str> = [("CHIRP_LOG_FORMAT", "json"), ("CHIRP_LOG_LEVEL", "warn")]
            .into_iter()
            .collect();
        let config = LoggingConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn test_bad_format_falls_back_to_text() {
        let config = LoggingConfig::from_lookup(|key| {
            (key == "CHIRP_LOG_FORMAT").then(|| "xml".to_string())
        });
        assert_eq!(config.format, LogFormat::Text);
    }

    #[test]
    fn test_verbose_overrides_level() {
        let config = LoggingConfig::new(LogFormat::Text, "warn").verbose(true);
        assert_eq!(config.level, "debug");

        let config = LoggingConfig::new(LogFormat::Text, "warn").verbose(false);
        assert_eq!(config.level, "warn");
    }
}
