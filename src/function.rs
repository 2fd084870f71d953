//! Function capability supplied by the host evaluator, and operator arguments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::env::Environment;
use crate::error::{EvalError, OpError, OpResult};
use crate::types::Value;

/// Something the evaluator can call. Implemented by the host; opaque to the core.
pub trait Callable: Send + Sync {
    fn call(&self, env: &Environment, args: &[Value]) -> Result<Value, EvalError>;
}

impl<F> Callable for F
where
    F: Fn(&Environment, &[Value]) -> Result<Value, EvalError> + Send + Sync,
{
    fn call(&self, env: &Environment, args: &[Value]) -> Result<Value, EvalError> {
        self(env, args)
    }
}

/// Turns function source text back into a callable (used after deserialization).
pub trait Compiler: Send + Sync {
    fn compile(&self, source: &str) -> Result<Arc<dyn Callable>, EvalError>;
}

/// Function argument of an operator: source text plus, once resolved, the callable.
#[derive(Clone, Serialize, Deserialize)]
pub struct Function {
    source: String,
    #[serde(skip)]
    callable: Option<Arc<dyn Callable>>,
}

impl Function {
    /// Unresolved function; a [`Compiler`] in the environment resolves it during `setup`.
    pub fn source(source: impl Into<String>) -> Self {
        Function {
            source: source.into(),
            callable: None,
        }
    }

    pub fn native<F>(source: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Environment, &[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        Function {
            source: source.into(),
            callable: Some(Arc::new(f)),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.callable.is_some()
    }

    pub fn resolve(&mut self, env: &Environment) -> OpResult<()> {
        if self.callable.is_some() {
            return Ok(());
        }
        let compiler = env.compiler().ok_or_else(|| {
            OpError::fatal(format!(
                "no function evaluator available for ({})",
                self.source
            ))
        })?;
        let callable = compiler
            .compile(&self.source)
            .map_err(|e| OpError::fatal(format!("({}): {}", self.source, e)))?;
        self.callable = Some(callable);
        Ok(())
    }

    pub fn call(&self, env: &Environment, args: &[Value]) -> Result<Value, EvalError> {
        match &self.callable {
            Some(f) => f.call(env, args),
            None => Err(EvalError::KillCommand(format!(
                "function ({}) was never set up",
                self.source
            ))),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function({})", self.source)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.source)
    }
}

/// Operator argument, resolved against the environment at `setup`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arg {
    Literal(Value),
    /// Reference to a namespace variable, e.g. a pipeline parameter.
    Var(String),
    /// Zero-argument function evaluated once at setup.
    Expr(Function),
}

impl Arg {
    pub fn var(name: impl Into<String>) -> Self {
        Arg::Var(name.into())
    }

    pub fn resolve(&mut self, env: &Environment) -> OpResult<Value> {
        match self {
            Arg::Literal(v) => Ok(v.clone()),
            Arg::Var(name) => Ok(env.getvar(name)?.clone()),
            Arg::Expr(f) => {
                f.resolve(env)?;
                f.call(env, &[]).map_err(|e| match e {
                    EvalError::Raised(m) | EvalError::KillCommand(m) => {
                        OpError::fatal(format!("{f}: {m}"))
                    }
                })
            }
        }
    }

    pub fn resolve_int(&mut self, env: &Environment, what: &str) -> OpResult<i64> {
        let value = self.resolve(env)?;
        value
            .as_int()
            .ok_or_else(|| OpError::fatal(format!("{what} must be an int, not {value}")))
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Arg::Literal(Value::Int(n))
    }
}

impl From<Value> for Arg {
    fn from(v: Value) -> Self {
        Arg::Literal(v)
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Literal(Value::Str(s.to_string()))
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Literal(v) => write!(f, "{v}"),
            Arg::Var(name) => write!(f, "{name}"),
            Arg::Expr(func) => write!(f, "{func}"),
        }
    }
}
