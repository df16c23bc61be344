//! CLI argument parsing for bridges.

use std::path::PathBuf;

use powermeter_common::LoggingConfig;

/// Common CLI arguments for all bridges.
///
/// Flatten into a bridge's own parser with `#[command(flatten)]`.
#[derive(clap::Args, Debug, Clone)]
pub struct BridgeArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long, default_value = "powermeter.json5")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Verbose logging, shorthand for `--log-level debug`.
    #[arg(short, long)]
    pub verbose: bool,
}

impl BridgeArgs {
    /// Resolve the logging configuration, applying CLI overrides.
    ///
    /// An explicit `--log-level` wins over `--verbose`, which wins over the
    /// configured level.
    pub fn logging(&self, configured: &LoggingConfig) -> LoggingConfig {
        let level = match (&self.log_level, self.verbose) {
            (Some(level), _) => level.clone(),
            (None, true) => "debug".to_string(),
            (None, false) => configured.level.clone(),
        };

        LoggingConfig {
            level,
            format: configured.format,
        }
    }
}
