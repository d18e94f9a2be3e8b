//! Command-line interface parsing for remote-temperature
//!
//! This module handles parsing of CLI arguments using clap. Flags given on the
//! command line override the matching fields of the Init payload.

use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::config::{ConfigError, InitConfig};
use crate::data::UnitSystem;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The specified unit system is not recognized
    #[error("Invalid units: '{0}'. Valid units: metric, imperial")]
    InvalidUnits(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Remote temperature poller - fetches sensor, weather and holiday data for a dashboard
#[derive(Parser, Debug)]
#[command(name = "remote-temperature")]
#[command(about = "Polls remote sensors and pushes normalized readings to a dashboard")]
#[command(version)]
pub struct Cli {
    /// JSON file holding the Init payload
    ///
    /// Without it, the first line read from stdin must be the Init message.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Unit system for temperatures: metric or imperial
    #[arg(long, value_name = "UNITS")]
    pub units: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long, value_name = "MS")]
    pub interval_ms: Option<u64>,

    /// Run a single cycle, print the pushes and exit
    #[arg(long)]
    pub once: bool,
}

/// Parses a units argument into a UnitSystem
pub fn parse_units_arg(s: &str) -> Result<UnitSystem, CliError> {
    s.parse().map_err(|_| CliError::InvalidUnits(s.to_string()))
}

impl Cli {
    /// Applies command-line overrides on top of an Init payload
    pub fn apply_overrides(&self, mut config: InitConfig) -> Result<InitConfig, CliError> {
        if let Some(units) = &self.units {
            config.units = parse_units_arg(units)?;
        }
        if let Some(ms) = self.interval_ms {
            config.fetch_interval_ms = Some(ms);
        }
        // Validate early so a bad flag fails at startup
        config.fetch_interval()?;
        Ok(config)
    }
}
