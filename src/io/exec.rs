//! Run-to-completion execution
//!
//! Spawns a process, feeds stdin, drains stdout and stderr concurrently and
//! returns the aggregated result once the process has exited.

use std::borrow::Cow;
use std::time::Instant;
use tracing::{Level, debug};

use crate::info::ProcessInfo;
use crate::io::error::ProcessError;
use crate::io::options::ExecuteOptions;
use crate::io::process::{ChildProcess, ProcessStatus};
use crate::io::writer::ChildProcessWriter;

/// Fully materialized outcome of [`exec`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteResult {
    pub ok: bool,
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecuteResult {
    fn new(status: ProcessStatus, stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            ok: status.ok,
            code: status.code,
            stdout,
            stderr,
        }
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }
}

/// Run a program to completion
///
/// Stdin is written in full and then closed; without `options.stdin` it is
/// closed right away. Both output streams are drained concurrently with the
/// stdin feed, so a child filling one pipe never blocks on the other. There
/// is no timeout: a child that never exits keeps the caller suspended.
///
/// A child that exits before consuming its input is not an error. Any other
/// stdin failure is returned once both output streams have been drained.
///
/// Output is collected until the child exits and its pipes go quiet. Bytes
/// written later by background descendants that inherited the pipes are not
/// part of the result.
pub async fn exec(
    program: &str,
    params: &[String],
    options: &ExecuteOptions,
    info: &ProcessInfo,
) -> Result<ExecuteResult, ProcessError> {
    let started = Instant::now();
    let mut child =
        ChildProcess::spawn_with_stdio(program, params, &options.spawn, options.stdio, info)?;

    let stdout = child.stdout().clone();
    let stderr = child.stderr().clone();

    let (fed, stdout, stderr) = tokio::join!(
        feed_stdin(child.stdin(), options.stdin.as_deref()),
        stdout.read_to_end(),
        stderr.read_to_end(),
    );
    fed?;

    let status = child.status().await;
    crate::log_timing!(Level::DEBUG, "exec", started.elapsed());

    Ok(ExecuteResult::new(status, stdout, stderr))
}

async fn feed_stdin(
    writer: &mut ChildProcessWriter,
    input: Option<&[u8]>,
) -> Result<(), ProcessError> {
    let result = match input {
        Some(bytes) => writer.write(bytes).await,
        None => Ok(()),
    };
    writer.close();

    match result {
        Err(ProcessError::PipeClosed) => {
            debug!("Child stopped accepting stdin");
            Ok(())
        }
        other => other,
    }
}
