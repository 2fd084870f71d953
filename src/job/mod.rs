//! Job control: every top-level command runs in a child process tracked as a job.

pub mod control;
pub mod listener;
pub mod process;
pub mod signals;
pub mod state;
pub mod table;

pub use control::JobControl;
pub use listener::Listener;
pub use process::{ChildProcess, ProcessControl, completion_pipe, spawn_job};
pub use signals::SignalRouter;
pub use state::{Job, JobState};
pub use table::{JobInfo, JobTable};
