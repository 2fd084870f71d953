//! Serialized form of pipelines, for shipping to another process.
//!
//! Only op configuration is encoded. Wiring (`receiver`, `owner`) is rebuilt by `setup`
//! after decoding, and functions travel as source text to be resolved by the receiving
//! environment's compiler.

use serde::{Deserialize, Serialize};

use crate::env::EnvSnapshot;
use crate::error::Error;
use crate::function::{Arg, Function};
use crate::ops::{
    Fanout, Fork, Gen, Label as LabelOp, Load, Ls, Map, Remote, RunPipeline, Select, Store, Write,
};
use crate::pipeline::core::Pipeline;
use crate::pipeline::op::Op;
use crate::types::{Label, Record};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Vec<String>>,
    pub ops: Vec<OpSpec>,
}

impl PipelineSpec {
    pub fn build(self) -> Pipeline {
        let ops = self.ops.into_iter().map(OpSpec::build).collect();
        let pipeline = Pipeline::from_ops(ops);
        match self.params {
            Some(params) => pipeline.with_params(params),
            None => pipeline,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Configuration of one op.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OpSpec {
    Gen {
        count: Arg,
        #[serde(default = "zero")]
        start: Arg,
    },
    Map {
        function: Function,
    },
    Select {
        function: Function,
    },
    Ls {
        #[serde(default)]
        paths: Vec<String>,
        #[serde(default)]
        recursive: bool,
    },
    Store {
        var: String,
        #[serde(default)]
        append: bool,
    },
    Load {
        var: String,
    },
    Write,
    #[serde(rename = "runpipeline")]
    RunPipeline {
        var: String,
        #[serde(default)]
        args: Vec<Arg>,
    },
    Fork {
        fanout: Fanout,
        pipeline: PipelineSpec,
    },
    Label {
        label: Label,
    },
    Remote {
        host: String,
        pipeline: PipelineSpec,
    },
}

fn zero() -> Arg {
    Arg::from(0)
}

impl OpSpec {
    pub fn build(self) -> Box<dyn Op> {
        match self {
            OpSpec::Gen { count, start } => Box::new(Gen::new(count).start(start)),
            OpSpec::Map { function } => Box::new(Map::new(function)),
            OpSpec::Select { function } => Box::new(Select::new(function)),
            OpSpec::Ls { paths, recursive } => Box::new(Ls::new(paths).recursive(recursive)),
            OpSpec::Store { var, append } => Box::new(Store::new(var).append(append)),
            OpSpec::Load { var } => Box::new(Load::new(var)),
            OpSpec::Write => Box::new(Write::new()),
            OpSpec::RunPipeline { var, args } => Box::new(RunPipeline::new(var, args)),
            OpSpec::Fork { fanout, pipeline } => Box::new(Fork::new(fanout, pipeline.build())),
            OpSpec::Label { label } => Box::new(LabelOp::new(label)),
            OpSpec::Remote { host, pipeline } => Box::new(Remote::new(host, pipeline)),
        }
    }
}

/// What a remote process is asked to run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteRequest {
    pub pipeline: PipelineSpec,
    pub env: EnvSnapshot,
}

/// One line of a remote result stream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum RemoteMessage {
    Record(Record),
    Error(Error),
    /// The remote command was aborted.
    Fatal(String),
    End,
}

impl RemoteMessage {
    pub fn encode_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode_line(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line.trim_end())
    }
}
