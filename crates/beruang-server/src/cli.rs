//! Command-line interface

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "beruang-server")]
#[command(about = "Beruang transaction and intent routing server", long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the HTTP API
    Serve(ServeArgs),

    /// Run labelled intent cases through the intent router and report pass rates
    Evaluate(EvaluateArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml", env = "BERUANG_CONFIG")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long, env = "BERUANG_LISTEN")]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "BERUANG_PORT")]
    pub port: Option<u16>,

    /// Local transaction model directory
    #[arg(long)]
    pub transaction_model: Option<PathBuf>,

    /// Local intent model directory
    #[arg(long)]
    pub intent_model: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// YAML file with `{ text, expected, group }` cases
    pub cases: PathBuf,

    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml", env = "BERUANG_CONFIG")]
    pub config: String,

    /// Local intent model directory, overriding the configured source
    #[arg(long)]
    pub intent_model: Option<PathBuf>,

    /// Write the full report as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
