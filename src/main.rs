//! Marcel CLI: interactive shell, or `run` to serve a remote pipeline request.

use anyhow::Result;
use clap::Parser;
use marcel::engine::arg_parser::Cli;
use marcel::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
