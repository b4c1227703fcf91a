//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{ReportCommand, RunCommand, SelectCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Verification pipeline for infrastructure-as-code changes
#[derive(Debug, Parser, Clone)]
#[command(name = "iac-verify")]
#[command(version)]
#[command(about = "Format, validate and plan infrastructure changes, and report per change", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the verification configuration file
    #[arg(short, long, global = true, default_value = "iac-verify.yaml")]
    pub config: PathBuf,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the pipeline selected for a trigger and report the result
    Run(RunCommand),

    /// Validate a configuration file
    Validate(ValidateCommand),

    /// Show which pipeline a trigger selects
    Select(SelectCommand),

    /// Show stored reports
    Report(ReportCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
