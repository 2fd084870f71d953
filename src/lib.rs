//! Marcel: a shell whose pipelines pass structured values between operators

pub mod api;
pub mod engine;
pub mod env;
pub mod error;
pub mod function;
pub mod job;
pub mod namespace;
pub mod ops;
pub mod pipeline;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use env::{EnvDelta, EnvSnapshot, Environment};
pub use error::{Error, EvalError, JobError, NamespaceError, OpError, OpResult};
pub use function::{Arg, Callable, Compiler, Function};
pub use namespace::{Bindings, Namespace};
pub use pipeline::{Command, Node, Op, Pipeline, PipelineSpec, PipelineWrapper};
pub use utils::config::Config;

/// Result alias used by application-level marcel code (config, CLI, job spawning)
pub type Result<T> = anyhow::Result<T>;
