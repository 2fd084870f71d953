//! Pipeline core: operator contract, engine, composition, invocation and serialization.

pub mod command;
pub mod core;
pub mod error_handler;
pub mod node;
pub mod op;
pub mod spec;
pub mod wrapper;

pub use command::Command;
pub use self::core::Pipeline;
pub use error_handler::{counting_handler, logging_handler};
pub use node::Node;
pub use op::{
    Downstream, ErrorHandler, FanIn, Op, OpState, Owner, PipelineId, Sink, Slot, call,
};
pub use spec::{OpSpec, PipelineSpec, RemoteMessage, RemoteRequest};
pub use wrapper::{PipelineBuilder, PipelineWrapper};
