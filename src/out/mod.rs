//! Report rendering for the CLI.
//!
//! Progress goes to stderr through `log`; only final reports reach stdout.

pub mod text;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

/// Output mode for CLI commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputMode {
    /// No output
    None,
    /// Human-readable text (default)
    #[default]
    Text,
    /// JSON output
    Json,
}

impl OutputMode {
    pub fn is_json(&self) -> bool {
        matches!(self, OutputMode::Json)
    }

    /// Print `value` in this mode. Arrays become tables in text mode.
    pub fn emit<T: Serialize>(&self, value: &T) -> Result<()> {
        match self {
            OutputMode::None => Ok(()),
            OutputMode::Json => write_json(value),
            OutputMode::Text => {
                print!("{}", text::to_text(value)?);
                Ok(())
            }
        }
    }
}

/// Write JSON to stdout.
pub fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}
