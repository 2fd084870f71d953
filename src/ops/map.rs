use crate::env::Environment;
use crate::error::OpResult;
use crate::function::Function;
use crate::pipeline::{Downstream, Op, OpSpec, call};
use crate::types::Record;

/// `map (FUNCTION)`: apply the function to each record's fields.
#[derive(Clone, Debug)]
pub struct Map {
    function: Function,
}

impl Map {
    pub fn new(function: Function) -> Self {
        Map { function }
    }
}

impl Op for Map {
    fn name(&self) -> &'static str {
        "map"
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
        let value = call(env, &self.function, &record)?;
        out.send(env, value)
    }

    fn copy(&self) -> Box<dyn Op> {
        Box::new(self.clone())
    }

    fn spec(&self) -> OpResult<OpSpec> {
        Ok(OpSpec::Map {
            function: self.function.clone(),
        })
    }
}
