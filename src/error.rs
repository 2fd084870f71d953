//! Stream error values and the failure taxonomy of the operator contract.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error as ThisError;

use crate::types::Label;

/// Error marker flowing down a stream in place of a record.
///
/// Produced when one input record fails (resumable failure). It is forwarded as a whole,
/// never nested inside a record, and only consumed by a terminal sink.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Error {
    pub message: String,
    /// Fork branch that produced the error, if any.
    #[serde(default)]
    pub label: Option<Label>,
    /// Rendering of the record being processed when the failure happened.
    #[serde(default)]
    pub input: Option<String>,
}

impl Error {
    pub fn new(message: impl Into<String>) -> Self {
        Error {
            message: message.into(),
            label: None,
            input: None,
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input.get_or_insert_with(|| input.into());
        self
    }

    /// Tag with a fan-out label. An error already tagged by an inner fork keeps its label.
    pub fn tagged(mut self, label: &Label) -> Self {
        self.label.get_or_insert_with(|| label.clone());
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error(")?;
        if let Some(label) = &self.label {
            write!(f, "{label}: ")?;
        }
        if let Some(input) = &self.input {
            write!(f, "{input}: ")?;
        }
        write!(f, "{})", self.message)
    }
}

/// Outcome of an operator call that did not complete normally.
#[derive(Debug, Clone, ThisError)]
pub enum OpError {
    /// Abort the whole command.
    #[error("{0}")]
    Fatal(String),
    /// Abort only the current record; the error continues downstream as data.
    #[error("{0}")]
    Resumable(Error),
    /// Interrupt or kill observed; never swallowed.
    #[error("cancelled")]
    Cancelled,
}

impl OpError {
    pub fn fatal(message: impl Into<String>) -> Self {
        OpError::Fatal(message.into())
    }

    pub fn resumable(message: impl Into<String>) -> Self {
        OpError::Resumable(Error::new(message))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, OpError::Fatal(_))
    }

    /// Precedence used when merging outcomes of concurrent replicas.
    pub(crate) fn severity(&self) -> u8 {
        match self {
            OpError::Cancelled => 3,
            OpError::Fatal(_) => 2,
            OpError::Resumable(_) => 1,
        }
    }
}

pub type OpResult<T> = std::result::Result<T, OpError>;

/// Failure reported by the function evaluator.
#[derive(Debug, Clone, PartialEq, ThisError)]
pub enum EvalError {
    /// The function raised while evaluating one input.
    #[error("{0}")]
    Raised(String),
    /// The function asked for the whole command to stop.
    #[error("{0}")]
    KillCommand(String),
}

impl EvalError {
    pub fn raised(message: impl Into<String>) -> Self {
        EvalError::Raised(message.into())
    }
}

impl From<EvalError> for OpError {
    fn from(e: EvalError) -> Self {
        match e {
            EvalError::Raised(message) => OpError::Resumable(Error::new(message)),
            EvalError::KillCommand(message) => OpError::Fatal(message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum NamespaceError {
    #[error("undefined variable: {0}")]
    KeyError(String),
    #[error("cannot pop the outermost scope")]
    ScopeUnderflow,
}

impl From<NamespaceError> for OpError {
    fn from(e: NamespaceError) -> Self {
        OpError::Fatal(e.to_string())
    }
}

#[derive(Debug, ThisError)]
pub enum JobError {
    #[error("no such job: {0}")]
    NoSuchJob(usize),
    #[error("cannot foreground killed job {0}")]
    Dead(usize),
    #[error("unable to kill job {id} (pid {pid})")]
    Unkillable { id: usize, pid: i32 },
    #[error("signal {signal} to pid {pid} failed: {source}")]
    Signal {
        pid: i32,
        signal: i32,
        #[source]
        source: std::io::Error,
    },
}
