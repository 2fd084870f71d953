use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::env::Environment;
use crate::error::Error;
use crate::pipeline::op::ErrorHandler;

/// Handler for nested pipelines: the error itself already travels downstream, so only log it.
pub fn logging_handler() -> ErrorHandler {
    Arc::new(|_env: &Environment, error: &Error| debug!("resumable error: {}", error))
}

/// Logging handler that also counts errors, for reporting at the end of a command.
pub fn counting_handler() -> (ErrorHandler, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let count_h = Arc::clone(&count);
    let handler: ErrorHandler = Arc::new(move |_env: &Environment, error: &Error| {
        count_h.fetch_add(1, Ordering::Relaxed);
        debug!("resumable error: {}", error);
    });
    (handler, count)
}

/// Log the outcome of a command that ended with errors in its stream.
pub fn report_resumable_errors(count: &Arc<AtomicUsize>) {
    let n = count.load(Ordering::Relaxed);
    if n > 0 {
        log::warn!("Command finished with {} error(s) in its output", n);
    }
}
