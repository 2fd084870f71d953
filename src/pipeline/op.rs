//! The operator contract and the per-slot driver that moves records along a chain.
//!
//! A [`Pipeline`](super::Pipeline) owns its ops in [`Slot`]s. When op `i` sends a record,
//! the record is handed to slot `i + 1` together with the remaining slots, so the chain is
//! driven synchronously on the sending thread without ops holding references to each other.
//! The last op sends to the pipeline's tail [`Sink`], if any; that is how a sub-pipeline or a
//! fork replica feeds the enclosing pipeline.

use log::debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::env::Environment;
use crate::error::{Error, EvalError, OpError, OpResult};
use crate::function::Function;
use crate::pipeline::spec::OpSpec;
use crate::types::{Record, Value};

/// Called with every resumable error raised inside a pipeline.
pub type ErrorHandler = Arc<dyn Fn(&Environment, &Error) + Send + Sync>;

/// Identity of a pipeline instance; copies get a fresh id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineId(pub(crate) u64);

/// Operator contract. Concrete operators override what they need; the defaults forward.
pub trait Op: Send {
    fn name(&self) -> &'static str;

    /// Resolve arguments and validate. Errors here abort the whole command.
    fn setup(&mut self, _env: &mut Environment) -> OpResult<()> {
        Ok(())
    }

    /// Entry point when this op is the source of the pipeline.
    fn run(&mut self, _env: &mut Environment, _out: &mut Downstream<'_>) -> OpResult<()> {
        Err(OpError::fatal(format!(
            "{} cannot be the first operator in a pipeline",
            self.name()
        )))
    }

    fn receive(
        &mut self,
        _env: &mut Environment,
        _record: Record,
        _out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        Ok(())
    }

    fn receive_error(
        &mut self,
        env: &mut Environment,
        error: Error,
        out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        out.send_error(env, error)
    }

    /// End of stream.
    fn flush(&mut self, env: &mut Environment, out: &mut Downstream<'_>) -> OpResult<()> {
        out.flush(env)
    }

    fn cleanup(&mut self) {}

    /// Same configuration, no wiring, no runtime state.
    fn copy(&self) -> Box<dyn Op>;

    fn must_be_first_in_pipeline(&self) -> bool {
        false
    }

    /// Terminal ops consume the stream; a command ending in one gets no implicit `write`.
    fn is_sink(&self) -> bool {
        false
    }

    /// Configuration for shipping to another process.
    fn spec(&self) -> OpResult<OpSpec> {
        Err(OpError::fatal(format!(
            "{} cannot be sent to another process",
            self.name()
        )))
    }
}

/// Receiver at the end of a chain, shared by reference. Must tolerate concurrent callers.
pub trait Sink: Sync {
    fn receive(&self, env: &mut Environment, record: Record) -> OpResult<()>;
    fn receive_error(&self, env: &mut Environment, error: Error) -> OpResult<()>;
}

/// Everything downstream of one op: the following slots, then the tail sink.
pub struct Downstream<'a> {
    slots: &'a mut [Slot],
    tail: Option<&'a dyn Sink>,
    /// Set when a call into the downstream fails; shared with reborrows.
    failed: &'a AtomicBool,
}

impl<'a> Downstream<'a> {
    fn new(slots: &'a mut [Slot], tail: Option<&'a dyn Sink>, failed: &'a AtomicBool) -> Self {
        Downstream {
            slots,
            tail,
            failed,
        }
    }

    pub fn reborrow(&mut self) -> Downstream<'_> {
        Downstream {
            slots: &mut *self.slots,
            tail: self.tail,
            failed: self.failed,
        }
    }

    /// Whether an error returned to the op came from further down the chain.
    fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }

    fn note<T>(&self, result: OpResult<T>) -> OpResult<T> {
        if result.is_err() {
            self.failed.store(true, Ordering::Relaxed);
        }
        result
    }

    /// Forward a record. Bare values are wrapped as 1-records. Dropped when nothing is wired.
    pub fn send(&mut self, env: &mut Environment, record: impl Into<Record>) -> OpResult<()> {
        env.check_cancelled()?;
        let record = record.into();
        let result = match self.slots.split_first_mut() {
            Some((next, rest)) => next.receive_input(env, record, rest, self.tail),
            None => match self.tail {
                Some(tail) => tail.receive(env, record),
                None => Ok(()),
            },
        };
        self.note(result)
    }

    pub fn send_error(&mut self, env: &mut Environment, error: Error) -> OpResult<()> {
        let result = match self.slots.split_first_mut() {
            Some((next, rest)) => next.receive_error_input(env, error, rest, self.tail),
            None => match self.tail {
                Some(tail) => tail.receive_error(env, error),
                None => Ok(()),
            },
        };
        self.note(result)
    }

    /// Propagate end of stream. The tail is not flushed: it belongs to an enclosing
    /// pipeline, which flushes it itself.
    pub fn flush(&mut self, env: &mut Environment) -> OpResult<()> {
        let result = match self.slots.split_first_mut() {
            Some((next, rest)) => next.flush(env, rest, self.tail),
            None => Ok(()),
        };
        self.note(result)
    }
}

/// Serializes access to one downstream so several threads can feed it (fork fan-in).
pub struct FanIn<'a> {
    downstream: Mutex<Downstream<'a>>,
}

impl<'a> FanIn<'a> {
    pub fn new(downstream: Downstream<'a>) -> Self {
        FanIn {
            downstream: Mutex::new(downstream),
        }
    }
}

impl Sink for FanIn<'_> {
    fn receive(&self, env: &mut Environment, record: Record) -> OpResult<()> {
        let mut downstream = self
            .downstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        downstream.send(env, record)
    }

    fn receive_error(&self, env: &mut Environment, error: Error) -> OpResult<()> {
        let mut downstream = self
            .downstream
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        downstream.send_error(env, error)
    }
}

/// Back-reference from an op to its enclosing pipeline, used for error routing.
#[derive(Clone)]
pub struct Owner {
    pub pipeline: PipelineId,
    error_handler: ErrorHandler,
}

impl Owner {
    pub(crate) fn new(pipeline: PipelineId, error_handler: ErrorHandler) -> Self {
        Owner {
            pipeline,
            error_handler,
        }
    }

    pub fn handle_error(&self, env: &Environment, error: &Error) {
        (self.error_handler)(env, error)
    }
}

/// Wiring and counters the pipeline keeps for each op.
#[derive(Clone, Default)]
pub struct OpState {
    /// Records received so far. Fatal errors raised while receiving name it.
    pub position: u64,
    /// Index of the next op, set by `Pipeline::setup` for every op but the last.
    pub receiver: Option<usize>,
    pub owner: Option<Owner>,
    pub(crate) cleaned_up: bool,
}

/// One op and its wiring.
pub struct Slot {
    pub(crate) op: Box<dyn Op>,
    pub(crate) state: OpState,
}

impl Slot {
    pub fn new(op: Box<dyn Op>) -> Self {
        Slot {
            op,
            state: OpState::default(),
        }
    }

    pub fn op(&self) -> &dyn Op {
        self.op.as_ref()
    }

    pub fn state(&self) -> &OpState {
        &self.state
    }

    /// Unwired clone of the op.
    pub fn copy(&self) -> Slot {
        Slot::new(self.op.copy())
    }

    fn downstream<'b>(
        receiver: Option<usize>,
        rest: &'b mut [Slot],
        tail: Option<&'b dyn Sink>,
        failed: &'b AtomicBool,
    ) -> Downstream<'b> {
        match receiver {
            Some(_) => Downstream::new(rest, tail, failed),
            None => Downstream::new(&mut [], tail, failed),
        }
    }

    pub(crate) fn run(
        &mut self,
        env: &mut Environment,
        rest: &mut [Slot],
        tail: Option<&dyn Sink>,
    ) -> OpResult<()> {
        let failed = AtomicBool::new(false);
        let mut out = Self::downstream(self.state.receiver, rest, tail, &failed);
        self.op.run(env, &mut out)
    }

    /// Deliver one record. A resumable failure is reported to the owner and then sent on
    /// as an error in place of the output of this record. A fatal failure raised by this op
    /// (not passed up from downstream) is prefixed with the op name and record number.
    pub(crate) fn receive_input(
        &mut self,
        env: &mut Environment,
        record: Record,
        rest: &mut [Slot],
        tail: Option<&dyn Sink>,
    ) -> OpResult<()> {
        self.state.position += 1;
        let failed = AtomicBool::new(false);
        let mut out = Self::downstream(self.state.receiver, rest, tail, &failed);
        let result = match self.op.receive(env, record, &mut out) {
            Err(OpError::Resumable(error)) => {
                self.handle_error(env, &error);
                self.op.receive_error(env, error, &mut out)
            }
            other => other,
        };
        match result {
            Err(OpError::Fatal(message)) if !out.has_failed() => Err(OpError::Fatal(format!(
                "{}: record {}: {}",
                self.op.name(),
                self.state.position,
                message
            ))),
            other => other,
        }
    }

    pub(crate) fn receive_error_input(
        &mut self,
        env: &mut Environment,
        error: Error,
        rest: &mut [Slot],
        tail: Option<&dyn Sink>,
    ) -> OpResult<()> {
        let failed = AtomicBool::new(false);
        let mut out = Self::downstream(self.state.receiver, rest, tail, &failed);
        self.op.receive_error(env, error, &mut out)
    }

    pub(crate) fn flush(
        &mut self,
        env: &mut Environment,
        rest: &mut [Slot],
        tail: Option<&dyn Sink>,
    ) -> OpResult<()> {
        let failed = AtomicBool::new(false);
        let mut out = Self::downstream(self.state.receiver, rest, tail, &failed);
        self.op.flush(env, &mut out)
    }

    pub(crate) fn cleanup(&mut self) {
        if !self.state.cleaned_up {
            self.state.cleaned_up = true;
            self.op.cleanup();
        }
    }

    fn handle_error(&self, env: &Environment, error: &Error) {
        match &self.state.owner {
            Some(owner) => owner.handle_error(env, error),
            None => debug!("{}: unrouted error {}", self.op.name(), error),
        }
    }
}

/// Call a user function on one record. Evaluation failures become resumable errors that
/// carry the offending input; a kill-command request stays fatal.
pub fn call(env: &Environment, function: &Function, record: &Record) -> OpResult<Value> {
    function.call(env, record.values()).map_err(|e| match e {
        EvalError::Raised(message) => {
            OpError::Resumable(Error::new(message).with_input(record.to_string()))
        }
        EvalError::KillCommand(message) => OpError::Fatal(message),
    })
}
