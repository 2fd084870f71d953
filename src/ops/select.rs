use crate::env::Environment;
use crate::error::OpResult;
use crate::function::Function;
use crate::pipeline::{Downstream, Op, OpSpec, call};
use crate::types::Record;

/// `select (PREDICATE)`: pass records for which the predicate is truthy.
#[derive(Clone, Debug)]
pub struct Select {
    function: Function,
}

impl Select {
    pub fn new(function: Function) -> Self {
        Select { function }
    }
}

impl Op for Select {
    fn name(&self) -> &'static str {
        "select"
    }

    fn setup(&mut self, env: &mut Environment) -> OpResult<()> {
        self.function.resolve(env)
    }

    fn receive(
        &mut self,
        env: &mut Environment,
        record: Record,
        out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        if call(env, &self.function, &record)?.is_truthy() {
            out.send(env, record)?;
        }
        Ok(())
    }

    fn copy(&self) -> Box<dyn Op> {
        Box::new(self.clone())
    }

    fn spec(&self) -> OpResult<OpSpec> {
        Ok(OpSpec::Select {
            function: self.function.clone(),
        })
    }
}
