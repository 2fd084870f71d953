//! One top-level command: a pipeline ending in a sink, run to completion.

use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::env::{EnvDelta, Environment};
use crate::error::OpResult;
use crate::ops::Write;
use crate::pipeline::core::Pipeline;
use crate::pipeline::error_handler::{counting_handler, report_resumable_errors};

pub struct Command {
    source: Option<String>,
    pipeline: Pipeline,
    errors: Arc<AtomicUsize>,
}

impl Command {
    /// Wrap `pipeline`; a `write` sink is appended unless it already ends in a sink.
    pub fn new(source: Option<String>, mut pipeline: Pipeline) -> Self {
        if !pipeline.last_is_sink() {
            pipeline.append(Box::new(Write::new()));
        }
        let (handler, errors) = counting_handler();
        pipeline.set_error_handler(handler);
        Command {
            source,
            pipeline,
            errors,
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Errors that went down the stream during the last execution.
    pub fn resumable_errors(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    /// Setup, run, flush, always cleanup. Returns the environment changes to propagate to the
    /// parent process.
    pub fn execute(&mut self, env: &mut Environment) -> OpResult<EnvDelta> {
        debug!(
            "execute: {}",
            self.source.as_deref().unwrap_or("<pipeline>")
        );
        self.errors.store(0, Ordering::Relaxed);
        let before = env.snapshot();
        self.pipeline.execute(env, None)?;
        report_resumable_errors(&self.errors);
        Ok(env.delta_since(&before))
    }
}
