//! Leaf operators. Each is a thin implementation of the [`Op`](crate::pipeline::Op) contract.

pub mod collect;
pub mod fork;
pub mod generate;
pub mod label;
pub mod ls;
pub mod map;
pub mod remote;
pub mod runpipeline;
pub mod select;
pub mod store;
pub mod write;

pub use collect::{Collect, Collected};
pub use fork::{Fanout, Fork, merge_outcomes};
pub use generate::Gen;
pub use label::Label;
pub use ls::Ls;
pub use map::Map;
pub use remote::Remote;
pub use runpipeline::RunPipeline;
pub use select::Select;
pub use store::{Load, Store};
pub use write::Write;
