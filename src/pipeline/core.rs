//! Pipeline engine: owns ops, wires them, drives setup → run → flush → cleanup.

use log::debug;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::env::Environment;
use crate::error::{Error, OpError, OpResult};
use crate::pipeline::op::{ErrorHandler, Op, Owner, PipelineId, Sink, Slot};
use crate::pipeline::spec::PipelineSpec;
use crate::types::Record;

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> PipelineId {
    PipelineId(NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed))
}

/// Ordered ops plus error handler and optional parameters.
pub struct Pipeline {
    id: PipelineId,
    slots: Vec<Slot>,
    params: Option<Vec<String>>,
    error_handler: Option<ErrorHandler>,
    ready: bool,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline {
            id: next_id(),
            slots: Vec::new(),
            params: None,
            error_handler: None,
            ready: false,
        }
    }

    pub fn from_ops(ops: Vec<Box<dyn Op>>) -> Self {
        let mut pipeline = Pipeline::new();
        pipeline.slots = ops.into_iter().map(Slot::new).collect();
        pipeline
    }

    pub fn with_params(mut self, params: Vec<String>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn params(&self) -> Option<&[String]> {
        self.params.as_deref()
    }

    pub fn n_params(&self) -> usize {
        self.params.as_ref().map_or(0, Vec::len)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn op_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.op().name()).collect()
    }

    /// Records received by each op so far.
    pub fn positions(&self) -> Vec<u64> {
        self.slots.iter().map(|s| s.state().position).collect()
    }

    pub fn last_is_sink(&self) -> bool {
        self.slots.last().is_some_and(|s| s.op().is_sink())
    }

    pub fn append(&mut self, op: Box<dyn Op>) {
        self.slots.push(Slot::new(op));
        self.ready = false;
    }

    pub fn into_ops(self) -> Vec<Box<dyn Op>> {
        self.slots.into_iter().map(|s| s.op).collect()
    }

    pub fn set_error_handler(&mut self, handler: ErrorHandler) {
        self.error_handler = Some(handler);
    }

    pub fn error_handler(&self) -> Option<&ErrorHandler> {
        self.error_handler.as_ref()
    }

    /// Independent copy: every op copied, nothing wired, fresh id.
    pub fn copy(&self) -> Pipeline {
        Pipeline {
            id: next_id(),
            slots: self.slots.iter().map(Slot::copy).collect(),
            params: self.params.clone(),
            error_handler: self.error_handler.clone(),
            ready: false,
        }
    }

    /// Validate structure, assign owners, wire receivers, then set up each op in order.
    pub fn setup(&mut self, env: &mut Environment) -> OpResult<()> {
        let handler = self
            .error_handler
            .clone()
            .ok_or_else(|| OpError::fatal("pipeline has no error handler"))?;
        if self.slots.is_empty() {
            return Err(OpError::fatal("empty pipeline"));
        }
        if let Some(slot) = self
            .slots
            .iter()
            .skip(1)
            .find(|s| s.op().must_be_first_in_pipeline())
        {
            return Err(OpError::fatal(format!(
                "{} cannot receive input from a pipe",
                slot.op().name()
            )));
        }
        let owner = Owner::new(self.id, handler);
        for slot in &mut self.slots {
            slot.state.owner = Some(owner.clone());
            slot.state.cleaned_up = false;
        }
        let last = self.slots.len() - 1;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            slot.state.receiver = (i < last).then_some(i + 1);
        }
        for slot in &mut self.slots {
            slot.op.setup(env)?;
        }
        self.ready = true;
        debug!("pipeline {:?} set up: {}", self.id, self);
        Ok(())
    }

    fn check_ready(&self) -> OpResult<()> {
        if self.ready {
            Ok(())
        } else {
            Err(OpError::fatal("pipeline was not set up"))
        }
    }

    /// Run the first op as a source. Output past the last op goes to `tail`.
    pub fn run(&mut self, env: &mut Environment, tail: Option<&dyn Sink>) -> OpResult<()> {
        self.check_ready()?;
        match self.slots.split_first_mut() {
            Some((first, rest)) => first.run(env, rest, tail),
            None => Ok(()),
        }
    }

    /// Feed one record to the first op; `None` runs it as a source instead.
    pub fn receive(
        &mut self,
        env: &mut Environment,
        record: Option<Record>,
        tail: Option<&dyn Sink>,
    ) -> OpResult<()> {
        self.check_ready()?;
        let Some((first, rest)) = self.slots.split_first_mut() else {
            return Ok(());
        };
        match record {
            None => first.run(env, rest, tail),
            Some(record) => first.receive_input(env, record, rest, tail),
        }
    }

    pub fn receive_error(
        &mut self,
        env: &mut Environment,
        error: Error,
        tail: Option<&dyn Sink>,
    ) -> OpResult<()> {
        self.check_ready()?;
        match self.slots.split_first_mut() {
            Some((first, rest)) => first.receive_error_input(env, error, rest, tail),
            None => Ok(()),
        }
    }

    pub fn flush(&mut self, env: &mut Environment, tail: Option<&dyn Sink>) -> OpResult<()> {
        self.check_ready()?;
        match self.slots.split_first_mut() {
            Some((first, rest)) => first.flush(env, rest, tail),
            None => Ok(()),
        }
    }

    /// Release op resources, first op first. Each op is cleaned up once per setup.
    pub fn cleanup(&mut self) {
        for slot in &mut self.slots {
            slot.cleanup();
        }
    }

    /// Full lifecycle as a source. Cleanup runs whatever the outcome.
    pub fn execute(&mut self, env: &mut Environment, tail: Option<&dyn Sink>) -> OpResult<()> {
        let result = self.drive(env, tail);
        self.cleanup();
        result
    }

    fn drive(&mut self, env: &mut Environment, tail: Option<&dyn Sink>) -> OpResult<()> {
        self.setup(env)?;
        self.run(env, tail)?;
        self.flush(env, tail)
    }

    pub fn to_spec(&self) -> OpResult<PipelineSpec> {
        let ops = self
            .slots
            .iter()
            .map(|s| s.op().spec())
            .collect::<OpResult<Vec<_>>>()?;
        Ok(PipelineSpec {
            params: self.params.clone(),
            ops,
        })
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(params) = &self.params {
            write!(f, "{}: ", params.join(", "))?;
        }
        write!(f, "{}", self.op_names().join(" | "))
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("ops", &self.op_names())
            .field("params", &self.params)
            .field("ready", &self.ready)
            .finish()
    }
}
