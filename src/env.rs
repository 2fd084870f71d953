//! Execution environment: namespace, working directory, configuration and evaluator hooks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{NamespaceError, OpError, OpResult};
use crate::function::Compiler;
use crate::namespace::{Bindings, Namespace};
use crate::types::Value;
use crate::utils::config::Config;

/// Per-execution state handed to every operator call.
///
/// Cloned once per fork replica; the cancel flag is shared between clones.
#[derive(Clone)]
pub struct Environment {
    namespace: Namespace,
    current_dir: PathBuf,
    config: Arc<Config>,
    compiler: Option<Arc<dyn Compiler>>,
    cancel: Arc<AtomicBool>,
}

impl Environment {
    pub fn new(config: Config) -> Self {
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        Environment {
            namespace: Namespace::new(),
            current_dir,
            config: Arc::new(config),
            compiler: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_compiler(mut self, compiler: Arc<dyn Compiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn compiler(&self) -> Option<&Arc<dyn Compiler>> {
        self.compiler.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn namespace_mut(&mut self) -> &mut Namespace {
        &mut self.namespace
    }

    pub fn getvar(&self, name: &str) -> Result<&Value, NamespaceError> {
        self.namespace.get(name)
    }

    pub fn setvar(&mut self, name: impl Into<String>, value: Value) {
        self.namespace.set(name, value);
    }

    pub fn current_dir(&self) -> &Path {
        &self.current_dir
    }

    pub fn set_current_dir(&mut self, dir: impl Into<PathBuf>) {
        self.current_dir = dir.into();
    }

    /// Flag shared with interrupt handlers; setting it cancels running pipelines.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn reset_cancel(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn check_cancelled(&self) -> OpResult<()> {
        if self.is_cancelled() {
            Err(OpError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Serializable view of the environment (pipeline-valued variables are left out).
    pub fn snapshot(&self) -> EnvSnapshot {
        let vars = self
            .namespace
            .flatten()
            .into_iter()
            .filter(|(_, v)| !v.is_pipeline())
            .collect();
        EnvSnapshot {
            current_dir: self.current_dir.clone(),
            vars,
        }
    }

    /// Rebuild an environment from a snapshot shipped by another process.
    pub fn from_snapshot(snapshot: EnvSnapshot, config: Config) -> Self {
        let mut env = Environment::new(config);
        let globals: Bindings = snapshot.vars.into_iter().collect();
        env.namespace = Namespace::with_globals(globals);
        env.current_dir = snapshot.current_dir;
        env
    }

    /// Changes made since `before` was taken, for propagation back to a parent process.
    pub fn delta_since(&self, before: &EnvSnapshot) -> EnvDelta {
        let now = self.snapshot();
        let vars = now
            .vars
            .into_iter()
            .filter(|(k, v)| before.vars.get(k) != Some(v))
            .collect();
        let current_dir = (now.current_dir != before.current_dir).then_some(now.current_dir);
        EnvDelta { current_dir, vars }
    }

    pub fn apply_delta(&mut self, delta: EnvDelta) {
        if let Some(dir) = delta.current_dir {
            self.current_dir = dir;
        }
        for (k, v) in delta.vars {
            self.namespace.set(k, v);
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvSnapshot {
    pub current_dir: PathBuf,
    pub vars: BTreeMap<String, Value>,
}

/// Environment changes made by a command, returned from a job's child process.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnvDelta {
    #[serde(default)]
    pub current_dir: Option<PathBuf>,
    #[serde(default)]
    pub vars: BTreeMap<String, Value>,
}

impl EnvDelta {
    pub fn is_empty(&self) -> bool {
        self.current_dir.is_none() && self.vars.is_empty()
    }
}
