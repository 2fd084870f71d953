//! Command handlers: the interactive shell loop and the remote runner.

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, error, info};
use std::fs;
use std::io::{self, BufRead, BufWriter, Read, Stdout, Write};
use std::sync::{Arc, Mutex, PoisonError};

use crate::engine::arg_parser::Cli;
use crate::env::Environment;
use crate::error::{Error, OpError, OpResult};
use crate::job::{JobControl, SignalRouter};
use crate::pipeline::{
    Command, PipelineSpec, PipelineWrapper, RemoteMessage, RemoteRequest, Sink, logging_handler,
};
use crate::types::{Record, Value};
use crate::utils::config::Config;

// ---- Shell ----

/// One parsed line of interactive input.
#[derive(Debug)]
pub enum ShellLine {
    Jobs,
    Foreground(usize),
    Background(usize),
    Kill(usize),
    Exit,
    /// `NAME = {pipeline}`: store a pipeline for `runpipeline`.
    Assign { var: String, spec: PipelineSpec },
    Run { spec: PipelineSpec, background: bool, source: String },
}

fn job_id(word: Option<&str>, builtin: &str) -> Result<usize> {
    let word = word.ok_or_else(|| anyhow!("usage: {builtin} JOB"))?;
    word.parse()
        .with_context(|| format!("{builtin}: not a job number: {word}"))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn parse_line(line: &str) -> Result<ShellLine> {
    let line = line.trim();
    if line.starts_with('{') {
        let (text, background) = match line.strip_suffix('&') {
            Some(text) => (text.trim_end(), true),
            None => (line, false),
        };
        let spec = PipelineSpec::from_json(text).context("parse pipeline")?;
        return Ok(ShellLine::Run {
            spec,
            background,
            source: text.to_string(),
        });
    }
    if let Some((var, rest)) = line.split_once('=')
        && is_identifier(var.trim())
    {
        let spec = PipelineSpec::from_json(rest.trim()).context("parse pipeline")?;
        return Ok(ShellLine::Assign {
            var: var.trim().to_string(),
            spec,
        });
    }
    let mut words = line.split_whitespace();
    match words.next() {
        Some("jobs") => Ok(ShellLine::Jobs),
        Some("fg") => Ok(ShellLine::Foreground(job_id(words.next(), "fg")?)),
        Some("bg") => Ok(ShellLine::Background(job_id(words.next(), "bg")?)),
        Some("kill") => Ok(ShellLine::Kill(job_id(words.next(), "kill")?)),
        Some("exit") => Ok(ShellLine::Exit),
        Some(other) => bail!("unknown command: {other}"),
        None => bail!("empty command"),
    }
}

fn execute_line(line: ShellLine, env: &mut Environment, jobs: &JobControl) -> Result<()> {
    match line {
        ShellLine::Jobs => {
            for row in jobs.describe() {
                println!("{row}");
            }
        }
        ShellLine::Foreground(id) => {
            jobs.foreground(id)?;
            jobs.wait_for_foreground();
        }
        ShellLine::Background(id) => jobs.background(id)?,
        ShellLine::Kill(id) => jobs.kill(id)?,
        ShellLine::Exit => {}
        ShellLine::Assign { var, spec } => {
            let wrapper = PipelineWrapper::interactive(spec.build());
            debug!("{} = {}", var, wrapper);
            env.setvar(var, Value::Pipeline(Arc::new(wrapper)));
        }
        ShellLine::Run {
            spec,
            background,
            source,
        } => {
            let command = Command::new(Some(source), spec.build());
            jobs.discard_signals();
            let id = jobs.submit(command, env, background)?;
            if background {
                info!("[{}] started", id);
            } else {
                jobs.wait_for_foreground();
            }
        }
    }
    Ok(())
}

pub fn handle_shell(config: Config) -> Result<()> {
    let prompt = config.prompt.clone();
    let mut env = Environment::new(config.clone());
    let signals = SignalRouter::install()?;
    let mut jobs = JobControl::new(&config).with_signals(signals);
    let stdin = io::stdin();
    let mut input = stdin.lock();
    loop {
        jobs.reap(&mut env);
        print!("{prompt}");
        io::stdout().flush().context("flush prompt")?;
        let mut line = String::new();
        if input.read_line(&mut line).context("read command")? == 0 {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Ok(ShellLine::Exit) => break,
            Ok(parsed) => {
                if let Err(e) = execute_line(parsed, &mut env, &jobs) {
                    error!("{:#}", e);
                }
            }
            Err(e) => error!("{:#}", e),
        }
    }
    jobs.shutdown();
    Ok(())
}

// ---- Remote runner ----

/// Tail of a remotely executed pipeline: each record or error becomes one JSON line.
pub struct JsonLines<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLines<W> {
    pub fn new(out: W) -> Self {
        JsonLines {
            out: Mutex::new(out),
        }
    }

    pub fn emit(&self, message: &RemoteMessage) -> OpResult<()> {
        let line = message
            .encode_line()
            .map_err(|e| OpError::fatal(format!("encode result: {e}")))?;
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}").map_err(|e| OpError::fatal(format!("send result: {e}")))
    }

    pub fn flush(&self) -> io::Result<()> {
        self.out.lock().unwrap_or_else(PoisonError::into_inner).flush()
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Sink for JsonLines<W> {
    fn receive(&self, _env: &mut Environment, record: Record) -> OpResult<()> {
        self.emit(&RemoteMessage::Record(record))
    }

    fn receive_error(&self, _env: &mut Environment, error: Error) -> OpResult<()> {
        self.emit(&RemoteMessage::Error(error))
    }
}

/// Execute `request` and stream its results into `out`, ending with `End` or `Fatal`.
pub fn run_request<W: Write + Send>(
    request: RemoteRequest,
    config: Config,
    out: &JsonLines<W>,
) -> Result<()> {
    let mut env = Environment::from_snapshot(request.env, config);
    let mut pipeline = request.pipeline.build();
    pipeline.set_error_handler(logging_handler());
    let outcome = pipeline.execute(&mut env, Some(out as &dyn Sink));
    let last = match outcome {
        Ok(()) => RemoteMessage::End,
        Err(OpError::Cancelled) => RemoteMessage::Fatal("cancelled".to_string()),
        Err(e) => RemoteMessage::Fatal(e.to_string()),
    };
    out.emit(&last)?;
    out.flush().context("flush results")?;
    Ok(())
}

fn read_request(input: &str) -> Result<RemoteRequest> {
    let text = if Cli::reads_stdin(input) {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("read request from stdin")?;
        text
    } else {
        fs::read_to_string(input).with_context(|| format!("read request {input}"))?
    };
    serde_json::from_str(text.trim()).context("parse request")
}

pub fn handle_remote_run(input: &str, config: Config) -> Result<()> {
    let request = read_request(input)?;
    let out: JsonLines<BufWriter<Stdout>> = JsonLines::new(BufWriter::new(io::stdout()));
    run_request(request, config, &out)
}
