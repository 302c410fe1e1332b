//! Command-line arguments.

use blockflow::config::Settings;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "blockflow",
    version,
    about = "Generate Python functions from natural-language blocks and run them in order"
)]
pub struct Cli {
    /// Text file with headed blocks
    pub input_file: PathBuf,

    /// Directory generated functions are written to
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// TOML settings file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Model used for generation (overrides config and LLM_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Generation attempts per block
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_attempts: Option<u32>,

    /// Save a pass-through stub when generation keeps failing
    #[arg(long)]
    pub stub_on_failure: bool,

    /// Only parse the input and list the blocks
    #[arg(long, conflicts_with = "skip_generation")]
    pub parse_only: bool,

    /// Run the functions already in the output directory
    #[arg(long)]
    pub skip_generation: bool,

    /// Print the full report as JSON instead of just the final context
    #[arg(long)]
    pub json: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Cli {
    /// Applies flags on top of loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(dir) = &self.output_dir {
            settings.output_dir.clone_from(dir);
        }
        if let Some(model) = &self.model {
            settings.generation.model.clone_from(model);
        }
        if let Some(attempts) = self.max_attempts {
            settings.retry.max_attempts = attempts as usize;
        }
        if self.stub_on_failure {
            settings.generation.stub_on_failure = true;
        }
    }
}
