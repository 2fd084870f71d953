//! The job controller: starts commands in child processes and moves them between
//! foreground, background and paused on request or on terminal signals.

use anyhow::Result;
use log::{debug, warn};
use std::fs::File;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::env::Environment;
use crate::error::JobError;
use crate::job::listener::Listener;
use crate::job::process::{ProcessControl, spawn_job};
use crate::job::signals::SignalRouter;
use crate::job::table::{JobInfo, JobTable};
use crate::pipeline::Command;
use crate::utils::config::{Config, JobConsts};

pub struct JobControl {
    table: Arc<Mutex<JobTable>>,
    listener: Listener,
    signals: Option<SignalRouter>,
    kill_timeout: Duration,
}

impl JobControl {
    pub fn new(config: &Config) -> Self {
        JobControl {
            table: Arc::new(Mutex::new(JobTable::new())),
            listener: Listener::start(config.listener_poll),
            signals: None,
            kill_timeout: config.kill_timeout,
        }
    }

    /// Route Ctrl+C / Ctrl+Z to the foreground job.
    pub fn with_signals(mut self, signals: SignalRouter) -> Self {
        self.signals = Some(signals);
        self
    }

    fn table(&self) -> MutexGuard<'_, JobTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `command` in a child process.
    pub fn submit(
        &self,
        mut command: Command,
        env: &Environment,
        background: bool,
    ) -> Result<usize> {
        let (process, completion) = spawn_job(&mut command, env)?;
        let source = command.source().unwrap_or_default().to_string();
        self.track(source, Box::new(process), completion, background)
    }

    /// Start tracking a running process whose completion arrives on `completion`.
    pub fn track(
        &self,
        source: String,
        process: Box<dyn ProcessControl>,
        completion: File,
        background: bool,
    ) -> Result<usize> {
        let id = self.table().add(source, process, !background)?;
        let table = Arc::clone(&self.table);
        self.listener.register(completion, move |payload| {
            table
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .on_exit(id, &payload);
        })?;
        Ok(id)
    }

    /// Block while a live job holds the foreground, forwarding Ctrl+C and Ctrl+Z to it.
    pub fn wait_for_foreground(&self) {
        while let Some(id) = self.table().foreground_id() {
            if let Some(signals) = &self.signals {
                if signals.take_interrupt() {
                    debug!("interrupt: killing job {}", id);
                    self.report(self.table().kill(id, self.kill_timeout));
                    continue;
                }
                if signals.take_suspend() {
                    debug!("suspend: pausing job {}", id);
                    let mut table = self.table();
                    let paused = table.pause(id);
                    table.resume_background();
                    drop(table);
                    self.report(paused);
                    continue;
                }
            }
            std::thread::sleep(JobConsts::FOREGROUND_POLL);
        }
        self.discard_signals();
    }

    /// Forget Ctrl+C / Ctrl+Z received while no job was in the foreground.
    pub fn discard_signals(&self) {
        if let Some(signals) = &self.signals {
            signals.take_interrupt();
            signals.take_suspend();
        }
    }

    fn report(&self, result: Result<(), JobError>) {
        if let Err(e) = result {
            warn!("{}", e);
        }
    }

    pub fn jobs(&self) -> Vec<JobInfo> {
        self.table().jobs()
    }

    /// Rendered job listing, one line per job.
    pub fn describe(&self) -> Vec<String> {
        self.table().describe()
    }

    pub fn foreground_id(&self) -> Option<usize> {
        self.table().foreground_id()
    }

    pub fn foreground(&self, id: usize) -> Result<(), JobError> {
        self.table().foreground(id)
    }

    pub fn background(&self, id: usize) -> Result<(), JobError> {
        self.table().background(id)
    }

    pub fn pause_foreground(&self) -> Result<(), JobError> {
        let mut table = self.table();
        match table.foreground_id() {
            Some(id) => table.pause(id),
            None => Ok(()),
        }
    }

    pub fn kill(&self, id: usize) -> Result<(), JobError> {
        self.table().kill(id, self.kill_timeout)
    }

    /// Drop dead jobs and apply the environment changes they reported, oldest first.
    pub fn reap(&self, env: &mut Environment) -> Vec<usize> {
        let dead = self.table().reap();
        dead.into_iter()
            .map(|mut job| {
                if let Some(delta) = job.take_delta() {
                    debug!("job {}: applying {:?}", job.id(), delta);
                    env.apply_delta(delta);
                }
                job.id()
            })
            .collect()
    }

    /// Kill every live job and stop the listener.
    pub fn shutdown(&mut self) {
        let mut table = self.table();
        for id in table.live_ids() {
            if let Err(e) = table.kill(id, self.kill_timeout) {
                warn!("{}", e);
            }
        }
        drop(table);
        self.listener.shutdown();
    }
}
