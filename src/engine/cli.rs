//! CLI dispatch: interactive shell by default, `run` for the receiving side of `remote`.

use anyhow::Result;
use log::debug;

use crate::engine::arg_parser::{Cli, Commands};
use crate::engine::handlers::{handle_remote_run, handle_shell};
use crate::utils::config::Config;
use crate::utils::{apply_file_to_config, load_marcel_toml, setup_logging};

/// Defaults, then `.marcel.toml`, then CLI flags.
fn setup_config(cli: &Cli) -> Config {
    let mut config = Config::default();
    if let Some(dir) = cli.config_dir()
        && let Some(file) = load_marcel_toml(&dir)
    {
        apply_file_to_config(&file, &mut config);
    }
    if let Some(verbose) = cli.verbose {
        config.verbose = verbose;
    }
    setup_logging(config.verbose);
    config
}

pub fn handle_run(cli: &Cli) -> Result<()> {
    let config = setup_config(cli);
    debug!(
        "{} CONFIG:{:#?}",
        env!("CARGO_PKG_NAME").to_uppercase(),
        config
    );
    match &cli.command {
        None | Some(Commands::Shell) => handle_shell(config),
        Some(Commands::Run { input }) => handle_remote_run(input, config),
    }
}
