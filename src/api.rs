//! Embedding path: build pipelines from Rust with `|` and run them in-process.
//!
//! ```ignore
//! use marcel::api::*;
//! let mut env = Environment::new(Config::default());
//! let inc = func("x: x + 1", |a| Ok(Value::Int(a[0].as_int().unwrap_or(0) + 1)));
//! let out = gather(&mut env, r#gen(5) | map(inc))?;
//! ```

use crate::env::Environment;
use crate::error::{EvalError, OpResult};
use crate::function::{Arg, Function};
use crate::ops::{Collect, Collected, Fanout, Fork, Gen, Load, Ls, Map, RunPipeline, Select, Store};
use crate::pipeline::{Node, Pipeline, PipelineWrapper, logging_handler};
use crate::types::{Item, Value};

/// Native function that ignores the environment.
pub fn func<F>(source: &str, f: F) -> Function
where
    F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
{
    Function::native(source, move |_env: &Environment, args: &[Value]| f(args))
}

pub fn r#gen(count: impl Into<Arg>) -> Node {
    Node::op(Gen::new(count))
}

pub fn gen_from(count: impl Into<Arg>, start: impl Into<Arg>) -> Node {
    Node::op(Gen::new(count).start(start))
}

pub fn map(function: Function) -> Node {
    Node::op(Map::new(function))
}

pub fn select(predicate: Function) -> Node {
    Node::op(Select::new(predicate))
}

pub fn ls(paths: &[&str], recursive: bool) -> Node {
    let paths = paths.iter().map(|p| p.to_string()).collect();
    Node::op(Ls::new(paths).recursive(recursive))
}

pub fn store(var: &str) -> Node {
    Node::op(Store::new(var))
}

pub fn load(var: &str) -> Node {
    Node::op(Load::new(var))
}

pub fn collect(buffer: &Collected) -> Node {
    Node::op(Collect::with_buffer(buffer.clone()))
}

pub fn fork(fanout: Fanout, body: impl Into<Pipeline>) -> Node {
    Node::op(Fork::new(fanout, body.into()))
}

pub fn runpipeline(var: &str, args: Vec<Arg>) -> Node {
    Node::op(RunPipeline::new(var, args))
}

/// Pipeline value whose body is rebuilt from the arguments on every invocation.
pub fn pipeline<F>(params: &[&str], builder: F) -> Value
where
    F: Fn(&[Value]) -> OpResult<Pipeline> + Send + Sync + 'static,
{
    let params = params.iter().map(|p| p.to_string()).collect();
    Value::Pipeline(std::sync::Arc::new(PipelineWrapper::api(params, builder)))
}

/// Execute in this process. Without an error handler, resumable errors are only logged.
pub fn run(env: &mut Environment, node: impl Into<Pipeline>) -> OpResult<()> {
    let mut pipeline = node.into();
    if pipeline.error_handler().is_none() {
        pipeline.set_error_handler(logging_handler());
    }
    pipeline.execute(env, None)
}

/// Execute and return everything that reached the end of the pipeline.
pub fn gather(env: &mut Environment, node: impl Into<Pipeline>) -> OpResult<Vec<Item>> {
    let buffer = Collected::new();
    let mut pipeline = node.into();
    pipeline.append(Box::new(Collect::with_buffer(buffer.clone())));
    run(env, pipeline)?;
    Ok(buffer.items())
}
