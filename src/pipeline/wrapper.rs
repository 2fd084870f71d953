//! Pipelines as values: invoked with arguments bound to their parameters.
//!
//! The body is either a concrete [`Pipeline`] (interactive path), copied for every
//! invocation, or a host callable that builds a fresh pipeline from the arguments (API path).

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::env::Environment;
use crate::error::{OpError, OpResult};
use crate::namespace::Bindings;
use crate::pipeline::core::Pipeline;
use crate::pipeline::error_handler::logging_handler;
use crate::pipeline::op::Sink;
use crate::types::Value;

/// Builds a pipeline from invocation arguments.
pub type PipelineBuilder = Arc<dyn Fn(&[Value]) -> OpResult<Pipeline> + Send + Sync>;

enum Body {
    Interactive(Mutex<Pipeline>),
    Api(PipelineBuilder),
}

pub struct PipelineWrapper {
    body: Body,
    params: Vec<String>,
}

impl PipelineWrapper {
    pub fn interactive(pipeline: Pipeline) -> Self {
        let params = pipeline.params().map(<[String]>::to_vec).unwrap_or_default();
        PipelineWrapper {
            body: Body::Interactive(Mutex::new(pipeline)),
            params,
        }
    }

    pub fn api<F>(params: Vec<String>, builder: F) -> Self
    where
        F: Fn(&[Value]) -> OpResult<Pipeline> + Send + Sync + 'static,
    {
        PipelineWrapper {
            body: Body::Api(Arc::new(builder)),
            params,
        }
    }

    pub fn n_params(&self) -> usize {
        self.params.len()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    /// A fresh, unwired pipeline for one invocation.
    fn instantiate(&self, args: &[Value]) -> OpResult<Pipeline> {
        let mut pipeline = match &self.body {
            Body::Interactive(template) => template
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .copy(),
            Body::Api(builder) => builder(args)?,
        };
        if pipeline.error_handler().is_none() {
            pipeline.set_error_handler(logging_handler());
        }
        Ok(pipeline)
    }

    fn bindings(&self, args: &[Value]) -> OpResult<Bindings> {
        if args.len() != self.params.len() {
            return Err(OpError::fatal(format!(
                "pipeline expects {} argument(s), got {}",
                self.params.len(),
                args.len()
            )));
        }
        Ok(self
            .params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect())
    }

    /// Push a scope binding the parameters, execute, and pop the scope whatever happened.
    pub fn run_pipeline(
        &self,
        env: &mut Environment,
        args: &[Value],
        tail: Option<&dyn Sink>,
    ) -> OpResult<()> {
        let bindings = self.bindings(args)?;
        let mut pipeline = self.instantiate(args)?;
        env.namespace_mut().push_scope(bindings);
        let result = pipeline.execute(env, tail);
        let popped = env.namespace_mut().pop_scope();
        result?;
        popped?;
        Ok(())
    }

    /// Set up a parameterless pipeline for streaming: the caller feeds it with
    /// `receive`, then `flush` and `cleanup`.
    pub fn prepare_to_receive(&self, env: &mut Environment) -> OpResult<Pipeline> {
        if self.n_params() != 0 {
            return Err(OpError::fatal(format!(
                "pipeline with parameters ({}) cannot receive input",
                self.params.join(", ")
            )));
        }
        let mut pipeline = self.instantiate(&[])?;
        pipeline.setup(env)?;
        Ok(pipeline)
    }
}

impl fmt::Display for PipelineWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Body::Interactive(p) => {
                let p = p.lock().unwrap_or_else(PoisonError::into_inner);
                write!(f, "(| {} |)", p)
            }
            Body::Api(_) => write!(f, "(| {}: <api> |)", self.params.join(", ")),
        }
    }
}

impl fmt::Debug for PipelineWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PipelineWrapper{}", self)
    }
}
