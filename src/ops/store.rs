//! `store VAR` / `load VAR`: move a stream into and out of a namespace variable.

use crate::env::Environment;
use crate::error::{OpError, OpResult};
use crate::pipeline::{Downstream, Op, OpSpec};
use crate::types::{Record, Value};

/// Sink collecting the stream into `VAR` as a list. Assigned on flush, so the variable
/// changes only once the stream is complete.
#[derive(Clone, Debug)]
pub struct Store {
    var: String,
    append: bool,
    buffer: Vec<Value>,
}

impl Store {
    pub fn new(var: impl Into<String>) -> Self {
        Store {
            var: var.into(),
            append: false,
            buffer: Vec::new(),
        }
    }

    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }
}

impl Op for Store {
    fn name(&self) -> &'static str {
        "store"
    }

    fn setup(&mut self, env: &mut Environment) -> OpResult<()> {
        self.buffer.clear();
        if self.append
            && let Ok(existing) = env.getvar(&self.var)
        {
            match existing {
                Value::List(items) => self.buffer = items.clone(),
                other => {
                    return Err(OpError::fatal(format!(
                        "cannot append to {}: not a list ({})",
                        self.var, other
                    )));
                }
            }
        }
        Ok(())
    }

    fn receive(
        &mut self,
        _env: &mut Environment,
        record: Record,
        _out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        self.buffer.push(record.into_value());
        Ok(())
    }

    fn flush(&mut self, env: &mut Environment, out: &mut Downstream<'_>) -> OpResult<()> {
        let items = std::mem::take(&mut self.buffer);
        env.setvar(self.var.clone(), Value::List(items));
        out.flush(env)
    }

    fn copy(&self) -> Box<dyn Op> {
        Box::new(Store::new(self.var.clone()).append(self.append))
    }

    fn is_sink(&self) -> bool {
        true
    }

    fn spec(&self) -> OpResult<OpSpec> {
        Ok(OpSpec::Store {
            var: self.var.clone(),
            append: self.append,
        })
    }
}

/// Source streaming the items of a list variable.
#[derive(Clone, Debug)]
pub struct Load {
    var: String,
    items: Vec<Value>,
}

impl Load {
    pub fn new(var: impl Into<String>) -> Self {
        Load {
            var: var.into(),
            items: Vec::new(),
        }
    }
}

impl Op for Load {
    fn name(&self) -> &'static str {
        "load"
    }

    fn setup(&mut self, env: &mut Environment) -> OpResult<()> {
        self.items = match env.getvar(&self.var)? {
            Value::List(items) => items.clone(),
            other => {
                return Err(OpError::fatal(format!(
                    "{} is not loadable: {}",
                    self.var, other
                )));
            }
        };
        Ok(())
    }

    fn run(&mut self, env: &mut Environment, out: &mut Downstream<'_>) -> OpResult<()> {
        for item in std::mem::take(&mut self.items) {
            out.send(env, item)?;
        }
        Ok(())
    }

    fn copy(&self) -> Box<dyn Op> {
        Box::new(Load::new(self.var.clone()))
    }

    fn must_be_first_in_pipeline(&self) -> bool {
        true
    }

    fn spec(&self) -> OpResult<OpSpec> {
        Ok(OpSpec::Load {
            var: self.var.clone(),
        })
    }
}
