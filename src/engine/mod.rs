//! Engine module: CLI parsing, dispatch and command handlers

pub mod arg_parser;
pub mod cli;
pub mod handlers;

pub use arg_parser::{Cli, Commands};
pub use cli::handle_run;
pub use handlers::{JsonLines, ShellLine, handle_remote_run, handle_shell, parse_line, run_request};
