use log::{debug, warn};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::env::EnvDelta;
use crate::error::JobError;
use crate::job::process::ProcessControl;
use crate::job::state::{Job, JobState};

/// Row of a job listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobInfo {
    pub id: usize,
    pub pid: i32,
    pub state: JobState,
    pub source: String,
}

/// All jobs of one shell, by id. Keeps at most one live job in the foreground.
#[derive(Debug, Default)]
pub struct JobTable {
    jobs: BTreeMap<usize, Job>,
    next_id: usize,
}

impl JobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly started process. A foreground job sends the current one to the
    /// background.
    pub fn add(
        &mut self,
        source: impl Into<String>,
        process: Box<dyn ProcessControl>,
        foreground: bool,
    ) -> Result<usize, JobError> {
        let id = self.next_id;
        self.next_id += 1;
        if foreground {
            self.demote_foreground(None)?;
        }
        let mut job = Job::new(id, source, process);
        if !foreground {
            job.background()?;
        }
        debug!("job {} added: {:?}", id, job);
        self.jobs.insert(id, job);
        Ok(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn get(&self, id: usize) -> Result<&Job, JobError> {
        self.jobs.get(&id).ok_or(JobError::NoSuchJob(id))
    }

    fn get_mut(&mut self, id: usize) -> Result<&mut Job, JobError> {
        self.jobs.get_mut(&id).ok_or(JobError::NoSuchJob(id))
    }

    pub fn state(&self, id: usize) -> Result<JobState, JobError> {
        self.get(id).map(Job::state)
    }

    pub fn foreground_id(&self) -> Option<usize> {
        self.jobs
            .values()
            .find(|j| j.state() == JobState::Foreground)
            .map(Job::id)
    }

    fn demote_foreground(&mut self, except: Option<usize>) -> Result<(), JobError> {
        for job in self.jobs.values_mut() {
            if job.state() == JobState::Foreground && Some(job.id()) != except {
                job.background()?;
            }
        }
        Ok(())
    }

    pub fn foreground(&mut self, id: usize) -> Result<(), JobError> {
        if !self.get(id)?.is_alive() {
            return Err(JobError::Dead(id));
        }
        self.demote_foreground(Some(id))?;
        self.get_mut(id)?.foreground()
    }

    pub fn background(&mut self, id: usize) -> Result<(), JobError> {
        self.get_mut(id)?.background()
    }

    pub fn pause(&mut self, id: usize) -> Result<(), JobError> {
        self.get_mut(id)?.pause()
    }

    pub fn kill(&mut self, id: usize, timeout: Duration) -> Result<(), JobError> {
        self.get_mut(id)?.kill(timeout)
    }

    /// SIGCONT to every background job.
    pub fn resume_background(&mut self) {
        for job in self.jobs.values_mut() {
            job.nudge();
        }
    }

    /// Completion reported by the listener. An empty payload means the child reported
    /// nothing (it failed or was killed).
    pub fn on_exit(&mut self, id: usize, payload: &[u8]) {
        let delta = if payload.is_empty() {
            None
        } else {
            serde_json::from_slice::<EnvDelta>(payload)
                .map_err(|e| warn!("job {}: bad completion payload: {}", id, e))
                .ok()
        };
        match self.jobs.get_mut(&id) {
            Some(job) => job.exited(delta),
            None => debug!("completion of reaped job {}", id),
        }
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        self.jobs
            .values()
            .map(|j| JobInfo {
                id: j.id(),
                pid: j.pid(),
                state: j.state(),
                source: j.source().to_string(),
            })
            .collect()
    }

    pub fn describe(&self) -> Vec<String> {
        self.jobs.values().map(Job::describe).collect()
    }

    pub fn live_ids(&self) -> Vec<usize> {
        self.jobs
            .values()
            .filter(|j| j.is_alive())
            .map(Job::id)
            .collect()
    }

    /// Remove dead jobs, returning them in id order.
    pub fn reap(&mut self) -> Vec<Job> {
        let dead: Vec<usize> = self
            .jobs
            .values()
            .filter(|j| !j.is_alive())
            .map(Job::id)
            .collect();
        dead.into_iter()
            .filter_map(|id| self.jobs.remove(&id))
            .collect()
    }
}
