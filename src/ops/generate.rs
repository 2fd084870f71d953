use crate::env::Environment;
use crate::error::{OpError, OpResult};
use crate::function::Arg;
use crate::pipeline::{Downstream, Op, OpSpec};

/// `gen COUNT [START]`: emit `START .. START+COUNT`.
#[derive(Clone, Debug)]
pub struct Gen {
    count_arg: Arg,
    start_arg: Arg,
    count: i64,
    start: i64,
}

impl Gen {
    pub fn new(count: impl Into<Arg>) -> Self {
        Gen {
            count_arg: count.into(),
            start_arg: Arg::from(0),
            count: 0,
            start: 0,
        }
    }

    pub fn start(mut self, start: impl Into<Arg>) -> Self {
        self.start_arg = start.into();
        self
    }
}

impl Op for Gen {
    fn name(&self) -> &'static str {
        "gen"
    }

    fn setup(&mut self, env: &mut Environment) -> OpResult<()> {
        self.count = self.count_arg.resolve_int(env, "gen count")?;
        self.start = self.start_arg.resolve_int(env, "gen start")?;
        if self.count < 0 {
            return Err(OpError::fatal(format!(
                "gen count must be non-negative, not {}",
                self.count
            )));
        }
        Ok(())
    }

    fn run(&mut self, env: &mut Environment, out: &mut Downstream<'_>) -> OpResult<()> {
        for x in self.start..self.start + self.count {
            out.send(env, x)?;
        }
        Ok(())
    }

    fn copy(&self) -> Box<dyn Op> {
        Box::new(Gen::new(self.count_arg.clone()).start(self.start_arg.clone()))
    }

    fn must_be_first_in_pipeline(&self) -> bool {
        true
    }

    fn spec(&self) -> OpResult<OpSpec> {
        Ok(OpSpec::Gen {
            count: self.count_arg.clone(),
            start: self.start_arg.clone(),
        })
    }
}
