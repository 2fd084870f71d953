//! Child processes running one command each.
//!
//! The child runs in its own process group so terminal signals reach the shell only; the
//! shell forwards them to the foreground job. On completion the child writes its
//! [`EnvDelta`] as JSON to a pipe and exits. The parent keeps only the read end.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::FromRawFd;
use std::time::{Duration, Instant};

use crate::env::Environment;
use crate::error::JobError;
use crate::pipeline::Command;
use crate::utils::config::JobConsts;

/// What the job layer needs from a process. Implemented for real children by
/// [`ChildProcess`]; tests substitute their own.
pub trait ProcessControl: Send {
    fn pid(&self) -> i32;

    fn signal(&mut self, signal: i32) -> Result<(), JobError>;

    /// Wait up to `timeout` for the process to exit. True once it has.
    fn join_timeout(&mut self, timeout: Duration) -> bool;

    /// Non-blocking; reaps the process if it has exited.
    fn is_alive(&mut self) -> bool;
}

#[derive(Debug)]
pub struct ChildProcess {
    pid: libc::pid_t,
    exited: bool,
}

impl ChildProcess {
    fn new(pid: libc::pid_t) -> Self {
        ChildProcess { pid, exited: false }
    }

    fn try_reap(&mut self) -> bool {
        if self.exited {
            return true;
        }
        let mut status: libc::c_int = 0;
        let rc = unsafe { libc::waitpid(self.pid, &mut status, libc::WNOHANG) };
        // ECHILD: somebody else reaped it.
        let no_child = rc == -1 && io::Error::last_os_error().raw_os_error() == Some(libc::ECHILD);
        if rc == self.pid || no_child {
            self.exited = true;
        }
        self.exited
    }
}

impl ProcessControl for ChildProcess {
    fn pid(&self) -> i32 {
        self.pid
    }

    /// Signals go to the whole process group, covering executables the job started.
    fn signal(&mut self, signal: i32) -> Result<(), JobError> {
        if self.exited {
            return Ok(());
        }
        if unsafe { libc::kill(-self.pid, signal) } == 0 {
            return Ok(());
        }
        let source = io::Error::last_os_error();
        if source.raw_os_error() == Some(libc::ESRCH) {
            return Ok(());
        }
        Err(JobError::Signal {
            pid: self.pid,
            signal,
            source,
        })
    }

    fn join_timeout(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.try_reap() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(JobConsts::EXIT_POLL);
        }
    }

    fn is_alive(&mut self) -> bool {
        !self.try_reap()
    }
}

fn set_cloexec(fd: libc::c_int) -> io::Result<()> {
    if unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// One-shot completion channel: (read end, write end). Both ends are close-on-exec so
/// executables started by a job do not keep the pipe open.
pub fn completion_pipe() -> io::Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
        return Err(io::Error::last_os_error());
    }
    // Wrap first so both ends are closed on error.
    let (reader, writer) = unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) };
    set_cloexec(fds[0])?;
    set_cloexec(fds[1])?;
    Ok((reader, writer))
}

/// Fork a child that executes `command` and reports its environment changes.
///
/// Returns the child and the read end of its completion pipe; the write end is closed in
/// the parent before returning.
pub fn spawn_job(command: &mut Command, env: &Environment) -> Result<(ChildProcess, File)> {
    let (reader, writer) = completion_pipe().context("create completion pipe")?;
    let pid = unsafe { libc::fork() };
    if pid == -1 {
        return Err(io::Error::last_os_error()).context("fork job");
    }
    if pid == 0 {
        drop(reader);
        let code = run_child(command, env, writer);
        unsafe { libc::_exit(code) }
    }
    drop(writer);
    // Also set by the child; doing it here too closes the race with early signals.
    unsafe {
        libc::setpgid(pid, pid);
    }
    log::debug!("spawned job pid {}: {}", pid, command.source().unwrap_or(""));
    Ok((ChildProcess::new(pid), reader))
}

fn run_child(command: &mut Command, env: &Environment, mut completion: File) -> i32 {
    unsafe {
        libc::setpgid(0, 0);
        libc::signal(libc::SIGINT, libc::SIG_DFL);
        libc::signal(libc::SIGTSTP, libc::SIG_DFL);
    }
    let mut env = env.clone();
    env.reset_cancel();
    let code = match command.execute(&mut env) {
        Ok(delta) => match serde_json::to_vec(&delta) {
            Ok(payload) => {
                let _ = completion.write_all(&payload);
                0
            }
            Err(e) => {
                log::error!("cannot report environment changes: {}", e);
                1
            }
        },
        Err(e) => {
            log::error!("{}", e);
            1
        }
    };
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
    code
}
