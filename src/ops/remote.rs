//! `remote HOST (| body |)`: run a pipeline in another process, normally over ssh.
//!
//! The configured remote command is spawned with `{host}` substituted. It receives a
//! [`RemoteRequest`] as one JSON line on stdin and answers with [`RemoteMessage`] lines on
//! stdout, terminated by `End`. Lines are read on a separate thread so the op can keep
//! checking for cancellation while the remote side is silent.

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use log::debug;
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread;

use crate::env::Environment;
use crate::error::{OpError, OpResult};
use crate::pipeline::{Downstream, Op, OpSpec, PipelineSpec, RemoteMessage, RemoteRequest};
use crate::utils::config::REMOTE_HOST_PLACEHOLDER;

pub struct Remote {
    host: String,
    pipeline: PipelineSpec,
    child: Option<Child>,
}

impl Remote {
    pub fn new(host: impl Into<String>, pipeline: PipelineSpec) -> Self {
        Remote {
            host: host.into(),
            pipeline,
            child: None,
        }
    }

    fn fatal(&self, what: impl std::fmt::Display) -> OpError {
        OpError::fatal(format!("{}: {}", self.host, what))
    }

    fn spawn(&self, env: &Environment) -> OpResult<Child> {
        let argv: Vec<String> = env
            .config()
            .remote_command
            .iter()
            .map(|a| a.replace(REMOTE_HOST_PLACEHOLDER, &self.host))
            .collect();
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| self.fatal("remote command is empty"))?;
        Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| self.fatal(format!("cannot start {program}: {e}")))
    }

    fn send_request(&self, env: &Environment, child: &mut Child) -> OpResult<()> {
        let request = RemoteRequest {
            pipeline: self.pipeline.clone(),
            env: env.snapshot(),
        };
        let line = serde_json::to_string(&request).map_err(|e| self.fatal(e))?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| self.fatal("no stdin to send the request"))?;
        writeln!(stdin, "{line}").map_err(|e| self.fatal(e))
    }

    /// Result lines, read on their own thread until EOF.
    fn read_lines(&self, stdout: ChildStdout) -> OpResult<Receiver<io::Result<String>>> {
        let (tx, rx) = unbounded();
        thread::Builder::new()
            .name(format!("remote-{}", self.host))
            .spawn(move || {
                for line in BufReader::new(stdout).lines() {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| self.fatal(format!("cannot start reader: {e}")))?;
        Ok(rx)
    }

    fn kill_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Op for Remote {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn run(&mut self, env: &mut Environment, out: &mut Downstream<'_>) -> OpResult<()> {
        let mut child = self.spawn(env)?;
        let sent = self.send_request(env, &mut child);
        let stdout = child.stdout.take();
        self.child = Some(child);
        sent?;
        let stdout = stdout.ok_or_else(|| self.fatal("no stdout to read results"))?;
        let lines = self.read_lines(stdout)?;
        let poll = env.config().fork_join_poll;
        let mut ended = false;
        loop {
            let line = match lines.recv_timeout(poll) {
                Ok(line) => line.map_err(|e| self.fatal(e))?,
                Err(RecvTimeoutError::Timeout) => {
                    if env.is_cancelled() {
                        debug!("remote {}: cancelled, killing transport", self.host);
                        self.kill_child();
                        return Err(OpError::Cancelled);
                    }
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            };
            if line.trim().is_empty() {
                continue;
            }
            let message = RemoteMessage::decode_line(&line)
                .map_err(|e| self.fatal(format!("bad result line: {e}")))?;
            match message {
                RemoteMessage::Record(record) => out.send(env, record)?,
                RemoteMessage::Error(error) => out.send_error(env, error)?,
                RemoteMessage::Fatal(message) => return Err(self.fatal(message)),
                RemoteMessage::End => {
                    ended = true;
                    break;
                }
            }
        }
        if !ended {
            return Err(self.fatal("result stream ended early"));
        }
        if let Some(mut child) = self.child.take() {
            child.wait().map_err(|e| self.fatal(e))?;
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.kill_child();
    }

    fn copy(&self) -> Box<dyn Op> {
        Box::new(Remote::new(self.host.clone(), self.pipeline.clone()))
    }

    fn must_be_first_in_pipeline(&self) -> bool {
        true
    }

    fn spec(&self) -> OpResult<OpSpec> {
        Ok(OpSpec::Remote {
            host: self.host.clone(),
            pipeline: self.pipeline.clone(),
        })
    }
}
