pub mod config;
pub mod logger;
pub mod marcel_toml;

pub use config::*;
pub use logger::{Colors, setup_logging};
pub use marcel_toml::{apply_file_to_config, load_marcel_toml};
