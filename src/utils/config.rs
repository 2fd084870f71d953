//! Application configuration constants and the runtime [`Config`].
//! Tuning and timeouts in one place.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Directory searched for the config file when `--config` is not given.
    pub fn default_config_dir(&self) -> Option<PathBuf> {
        std::env::var_os("HOME").map(PathBuf::from)
    }
}

// ---- Job control ----

pub struct JobConsts;

impl JobConsts {
    /// Wait after SIGTERM (and again after SIGKILL) before giving up on a job.
    pub const KILL_TIMEOUT: Duration = Duration::from_millis(500);
    /// Poll interval of the interactive loop while a foreground job is alive.
    pub const FOREGROUND_POLL: Duration = Duration::from_millis(20);
    /// Poll interval while waiting for a child to exit.
    pub const EXIT_POLL: Duration = Duration::from_millis(10);
}

// ---- Completion listener ----

pub struct ListenerConsts;

impl ListenerConsts {
    /// Timeout of one poll() over all completion pipes.
    pub const POLL_TIMEOUT: Duration = Duration::from_millis(100);
    /// Read buffer for completion payloads.
    pub const READ_CHUNK: usize = 4096;
}

// ---- Fork ----

pub struct ForkConsts;

impl ForkConsts {
    /// Join poll interval; keeps the forking thread responsive to cancellation.
    pub const JOIN_POLL: Duration = Duration::from_millis(100);
}

// ---- Remote ----

/// Placeholder replaced by the host name in the remote command template.
pub const REMOTE_HOST_PLACEHOLDER: &str = "{host}";

pub fn default_remote_command() -> Vec<String> {
    ["ssh", "-T", REMOTE_HOST_PLACEHOLDER, "marcel", "run", "-"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Named set of hosts a pipeline can be forked across.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cluster {
    pub hosts: Vec<String>,
    pub user: Option<String>,
}

impl Cluster {
    /// `user@host` when a user is configured.
    pub fn address(&self, host: &str) -> String {
        match &self.user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        }
    }
}

// ---- Runtime config ----

/// Runtime configuration carried by every [`Environment`](crate::env::Environment).
#[derive(Clone, Debug)]
pub struct Config {
    pub verbose: bool,
    pub prompt: String,
    pub kill_timeout: Duration,
    pub fork_join_poll: Duration,
    pub listener_poll: Duration,
    /// argv of the remote transport; `{host}` is substituted.
    pub remote_command: Vec<String>,
    pub clusters: BTreeMap<String, Cluster>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            verbose: false,
            prompt: "M $ ".to_string(),
            kill_timeout: JobConsts::KILL_TIMEOUT,
            fork_join_poll: ForkConsts::JOIN_POLL,
            listener_poll: ListenerConsts::POLL_TIMEOUT,
            remote_command: default_remote_command(),
            clusters: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn cluster(&self, name: &str) -> Option<&Cluster> {
        self.clusters.get(name)
    }
}
