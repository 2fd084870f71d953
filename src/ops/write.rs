//! `write`: the implicit terminal sink of interactive commands.

use std::io::{self, BufWriter, Stdout, Write as _};

use crate::env::Environment;
use crate::error::{Error, OpError, OpResult};
use crate::pipeline::{Downstream, Op, OpSpec};
use crate::types::Record;
use crate::utils::logger::Colors;

/// One line per record on stdout; errors in red.
#[derive(Default)]
pub struct Write {
    stdout: Option<BufWriter<Stdout>>,
}

impl Write {
    pub fn new() -> Self {
        Self::default()
    }

    fn line(&mut self, text: &str) -> OpResult<()> {
        let stdout = self.stdout.get_or_insert_with(|| BufWriter::new(io::stdout()));
        writeln!(stdout, "{}", text).map_err(|e| OpError::fatal(format!("write: {e}")))
    }
}

impl Op for Write {
    fn name(&self) -> &'static str {
        "write"
    }

    fn setup(&mut self, _env: &mut Environment) -> OpResult<()> {
        self.stdout = Some(BufWriter::new(io::stdout()));
        Ok(())
    }

    fn receive(
        &mut self,
        _env: &mut Environment,
        record: Record,
        _out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        self.line(&record.to_string())
    }

    fn receive_error(
        &mut self,
        _env: &mut Environment,
        error: Error,
        _out: &mut Downstream<'_>,
    ) -> OpResult<()> {
        self.line(&Colors::colorize(Colors::ERROR, &error.to_string()))
    }

    fn flush(&mut self, env: &mut Environment, out: &mut Downstream<'_>) -> OpResult<()> {
        if let Some(stdout) = self.stdout.as_mut() {
            stdout
                .flush()
                .map_err(|e| OpError::fatal(format!("write: {e}")))?;
        }
        out.flush(env)
    }

    fn cleanup(&mut self) {
        if let Some(mut stdout) = self.stdout.take() {
            let _ = stdout.flush();
        }
    }

    fn copy(&self) -> Box<dyn Op> {
        Box::new(Write::new())
    }

    fn is_sink(&self) -> bool {
        true
    }

    fn spec(&self) -> OpResult<OpSpec> {
        Ok(OpSpec::Write)
    }
}
