use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::utils::config::PackagePaths;

struct DefaultArgs;

impl DefaultArgs {
    /// `run -` reads the request from stdin.
    pub const STDIN: &'static str = "-";
}

/// Shell whose pipelines pass structured values between operators.
#[derive(Clone, Parser)]
#[command(name = "marcel")]
#[command(about = "Structured-value pipeline shell. Starts the interactive shell by default.")]
pub struct Cli {
    /// Verbose output.
    #[arg(long, short = 'v', global = true, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Directory holding `.marcel.toml`. Default: home directory.
    #[arg(long, global = true, value_name = "DIR")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Interactive shell: one JSON pipeline per line, `jobs`, `fg N`, `bg N`, `kill N`, `exit`.
    Shell,
    /// Execute one serialized pipeline request and stream results as JSON lines.
    Run {
        /// Request file, or `-` for stdin.
        #[arg(value_name = "FILE", default_value = DefaultArgs::STDIN)]
        input: String,
    },
}

impl Cli {
    /// Directory searched for the config file.
    pub fn config_dir(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| PackagePaths::get().default_config_dir())
    }

    pub fn reads_stdin(input: &str) -> bool {
        input == DefaultArgs::STDIN
    }
}
