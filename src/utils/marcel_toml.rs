//! Load `.marcel.toml` (CLI only). Library callers build a [`Config`] directly.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::utils::config::{Cluster, Config, PackagePaths};

#[derive(Debug, Default, Deserialize)]
pub struct MarcelToml {
    #[serde(default)]
    settings: SettingsSection,
    #[serde(default)]
    clusters: BTreeMap<String, ClusterSection>,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    verbose: Option<bool>,
    prompt: Option<String>,
    kill_timeout_ms: Option<u64>,
    fork_join_poll_ms: Option<u64>,
    listener_poll_ms: Option<u64>,
    remote_command: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ClusterSection {
    hosts: Vec<String>,
    user: Option<String>,
}

/// Parse config text. Errors carry the toml location.
pub fn parse_marcel_toml(text: &str) -> Result<MarcelToml> {
    toml::from_str(text).context("parse marcel config")
}

/// Load the config file from `dir` if present. Returns None if missing; logs and ignores a
/// malformed file.
pub fn load_marcel_toml(dir: &Path) -> Option<MarcelToml> {
    let path = dir.join(PackagePaths::get().config_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    parse_marcel_toml(&s)
        .map_err(|e| log::warn!("{}: {:#}", path.display(), e))
        .ok()
}

/// Overwrite config field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $config:expr, $field:ident) => {
        if let Some(v) = $section.$field.clone() {
            $config.$field = v;
        }
    };
    ($section:expr, $config:expr, $field:ident => $config_field:ident as millis) => {
        if let Some(ms) = $section.$field {
            $config.$config_field = Duration::from_millis(ms);
        }
    };
}

/// Apply file settings to `config` (only fields present in the file).
pub fn apply_file_to_config(file: &MarcelToml, config: &mut Config) {
    let s = &file.settings;
    apply_file_opt!(s, config, verbose);
    apply_file_opt!(s, config, prompt);
    apply_file_opt!(s, config, remote_command);
    apply_file_opt!(s, config, kill_timeout_ms => kill_timeout as millis);
    apply_file_opt!(s, config, fork_join_poll_ms => fork_join_poll as millis);
    apply_file_opt!(s, config, listener_poll_ms => listener_poll as millis);
    for (name, c) in &file.clusters {
        config.clusters.insert(
            name.clone(),
            Cluster {
                hosts: c.hosts.clone(),
                user: c.user.clone(),
            },
        );
    }
}
