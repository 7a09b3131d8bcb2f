//! Tracing setup for applications using the client.
//!
//! The library itself only emits `tracing` events; call [`init_logging`]
//! once from the binary that owns the process.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{OpenProtocolError, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

/// Map a verbosity count to a level name (0=error ... 4+=trace).
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        3 => "debug",
        _ => "trace",
    }
}

/// Install a global subscriber writing to stderr.
///
/// `RUST_LOG` overrides the verbosity when set.
///
/// # Example
///
/// ```ignore
/// use openprotocol_client::logging::{init_logging, LogFormat};
///
/// init_logging(3, LogFormat::Text).unwrap();
/// ```
pub fn init_logging(verbosity: u8, format: LogFormat) -> Result<()> {
    let level = level_for(verbosity);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("openprotocol_client={}", level)));

    let installed = match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_file(verbosity >= 3)
                    .with_line_number(verbosity >= 3),
            )
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init(),
    };

    installed.map_err(|e| OpenProtocolError::Io(std::io::Error::other(e.to_string())))
}

/// Initialize debug logging for tests, ignoring a subscriber that is already set.
pub fn init_test_logging() {
    let _ = init_logging(3, LogFormat::Text);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_default() {
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(level_for(0), "error");
        assert_eq!(level_for(2), "info");
        assert_eq!(level_for(9), "trace");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_test_logging();
        init_test_logging();
    }
}
