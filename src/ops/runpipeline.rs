//! `runpipeline VAR ARG...`: invoke a pipeline stored in a variable.
//!
//! As a source the pipeline runs with its parameters bound to the arguments. In the middle
//! of a pipeline a parameterless pipeline is set up once and fed every input record.

use std::sync::Arc;

use crate::env::Environment;
use crate::error::{Error, OpError, OpResult};
use crate::function::Arg;
use crate::pipeline::{Downstream, FanIn, Op, OpSpec, Pipeline, PipelineWrapper};
use crate::types::{Record, Value};

pub struct RunPipeline {
    var: String,
    args: Vec<Arg>,
    wrapper: Option<Arc<PipelineWrapper>>,
    values: Vec<Value>,
    streaming: Option<Pipeline>,
}

impl RunPipeline {
    pub fn new(var: impl Into<String>, args: Vec<Arg>) -> Self {
        RunPipeline {
            var: var.into(),
            args,
            wrapper: None,
            values: Vec::new(),
            streaming: None,
        }
    }

    fn wrapper(&self) -> OpResult<Arc<PipelineWrapper>> {
        self.wrapper
            .clone()
            .ok_or_else(|| OpError::fatal("runpipeline was not set up"))
    }

    fn streaming(&mut self, env: &mut Environment) -> OpResult<&mut Pipeline> {
        if self.streaming.is_none() {
            let pipeline = self.wrapper()?.prepare_to_receive(env)?;
            self.streaming = Some(pipeline);
        }
        self.streaming
            .as_mut()
            .ok_or_else(|| OpError::fatal("runpipeline: no pipeline to receive input"))
    }
}

impl Op for RunPipeline {
    fn name(&self) -> &'static str {
        "runpipeline"
    }

    fn setup(&mut self, env: &mut Environment) -> OpResult<()> {
        match env.getvar(&self.var)? {
            Value::Pipeline(wrapper) => self.wrapper = Some(Arc::clone(wrapper)),
            other => {
                return Err(OpError::fatal(format!(
                    "{} is not a pipeline: {}",
                    self.var, other
                )));
            }
        }
        self.values = self
            .args
            .iter_mut()
            .map(|arg| arg.resolve(env))
            .collect::<OpResult<_>>()?;
        self.streaming = None;
        Ok(())
    }

    fn run(&mut self, env: &mut Environment, out: &mut Downstream<'_>) -> OpResult<()> {
        let wrapper = self.wrapper()?;
        let tail = FanIn::new(out.reborrow());
        wrapper.run_pipeline(env, &self.values, Some(&tail))
    }

    fn receive(
        &mut self,
        env: &mut Environment,
        record: Record,
        out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        let tail = FanIn::new(out.reborrow());
        self.streaming(env)?.receive(env, Some(record), Some(&tail))
    }

    fn receive_error(
        &mut self,
        env: &mut Environment,
        error: Error,
        out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        let tail = FanIn::new(out.reborrow());
        self.streaming(env)?.receive_error(env, error, Some(&tail))
    }

    fn flush(&mut self, env: &mut Environment, out: &mut Downstream<'_>) -> OpResult<()> {
        if let Some(pipeline) = self.streaming.as_mut() {
            let tail = FanIn::new(out.reborrow());
            pipeline.flush(env, Some(&tail))?;
        }
        out.flush(env)
    }

    fn cleanup(&mut self) {
        if let Some(mut pipeline) = self.streaming.take() {
            pipeline.cleanup();
        }
    }

    fn copy(&self) -> Box<dyn Op> {
        Box::new(RunPipeline::new(self.var.clone(), self.args.clone()))
    }

    fn spec(&self) -> OpResult<OpSpec> {
        Ok(OpSpec::RunPipeline {
            var: self.var.clone(),
            args: self.args.clone(),
        })
    }
}
