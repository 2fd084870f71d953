//! Job states and the per-job state machine.

use colored::Color;
use log::{debug, warn};
use std::fmt;
use std::time::Duration;

use crate::env::EnvDelta;
use crate::error::JobError;
use crate::job::process::ProcessControl;
use crate::utils::Colors;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobState {
    Foreground,
    Background,
    Paused,
    Dead,
}

impl JobState {
    pub fn is_alive(self) -> bool {
        self != JobState::Dead
    }

    pub fn color(self) -> Color {
        match self {
            JobState::Foreground | JobState::Background => Colors::JOB_RUNNING,
            JobState::Paused => Colors::JOB_PAUSED,
            JobState::Dead => Colors::JOB_DEAD,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Foreground => "foreground",
            JobState::Background => "background",
            JobState::Paused => "paused",
            JobState::Dead => "killed",
        };
        f.write_str(s)
    }
}

/// One top-level command running in a child process.
pub struct Job {
    id: usize,
    source: String,
    state: JobState,
    process: Box<dyn ProcessControl>,
    delta: Option<EnvDelta>,
}

impl Job {
    pub fn new(id: usize, source: impl Into<String>, process: Box<dyn ProcessControl>) -> Self {
        Job {
            id,
            source: source.into(),
            state: JobState::Foreground,
            process,
            delta: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn pid(&self) -> i32 {
        self.process.pid()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    /// Environment changes reported by the child, taken once.
    pub fn take_delta(&mut self) -> Option<EnvDelta> {
        self.delta.take()
    }

    fn transition(&mut self, to: JobState) {
        debug!("job {} ({}): {} -> {}", self.id, self.pid(), self.state, to);
        self.state = to;
    }

    /// Stop the process. A dead job stays dead.
    pub fn pause(&mut self) -> Result<(), JobError> {
        if !self.is_alive() {
            return Ok(());
        }
        self.process.signal(libc::SIGTSTP)?;
        self.transition(JobState::Paused);
        Ok(())
    }

    /// Let the job run without holding the terminal, resuming it if paused.
    pub fn background(&mut self) -> Result<(), JobError> {
        if !self.is_alive() {
            return Ok(());
        }
        if self.state == JobState::Paused {
            self.process.signal(libc::SIGCONT)?;
        }
        self.transition(JobState::Background);
        Ok(())
    }

    pub fn foreground(&mut self) -> Result<(), JobError> {
        if !self.is_alive() {
            return Err(JobError::Dead(self.id));
        }
        if self.state == JobState::Paused {
            self.process.signal(libc::SIGCONT)?;
        }
        self.transition(JobState::Foreground);
        Ok(())
    }

    /// Resume a background job that was stopped behind our back. Errors are ignored: the
    /// process may be gone already.
    pub fn nudge(&mut self) {
        if self.state == JobState::Background {
            let _ = self.process.signal(libc::SIGCONT);
        }
    }

    /// SIGTERM, wait, then SIGKILL and wait again. Killing a dead job does nothing.
    pub fn kill(&mut self, timeout: Duration) -> Result<(), JobError> {
        if !self.is_alive() {
            return Ok(());
        }
        if let Err(e) = self.process.signal(libc::SIGTERM) {
            warn!("job {}: {}", self.id, e);
        }
        // A stopped process only acts on SIGTERM once continued.
        if self.state == JobState::Paused {
            let _ = self.process.signal(libc::SIGCONT);
        }
        if self.process.join_timeout(timeout) {
            self.transition(JobState::Dead);
            return Ok(());
        }
        if let Err(e) = self.process.signal(libc::SIGKILL) {
            warn!("job {}: {}", self.id, e);
        }
        if self.process.join_timeout(timeout) {
            self.transition(JobState::Dead);
            return Ok(());
        }
        Err(JobError::Unkillable {
            id: self.id,
            pid: self.pid(),
        })
    }

    /// The process exited on its own; `delta` is what it reported, if anything.
    pub fn exited(&mut self, delta: Option<EnvDelta>) {
        if delta.is_some() {
            self.delta = delta;
        }
        // Reap the zombie.
        if self.process.is_alive() {
            debug!("job {}: completion pipe closed before exit", self.id);
        }
        if self.is_alive() {
            self.transition(JobState::Dead);
        }
    }

    pub fn describe(&self) -> String {
        let state = Colors::colorize(self.state.color(), &self.state.to_string());
        format!("[{}] {:>7} {:<10} {}", self.id, self.pid(), state, self.source)
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id)
            .field("pid", &self.pid())
            .field("state", &self.state)
            .field("source", &self.source)
            .finish()
    }
}
