//! Entry point for creating and executing child processes
//!
//! A [`ProcessHost`] carries the process snapshot so that working
//! directories resolve against one captured view of the environment.

use std::io;
use std::sync::Arc;

use crate::info::ProcessInfo;
use crate::io::{ChildProcess, ExecuteOptions, ExecuteResult, ProcessError, SpawnOptions};

#[derive(Debug, Clone)]
pub struct ProcessHost {
    info: Arc<ProcessInfo>,
}

impl ProcessHost {
    pub fn new(info: Arc<ProcessInfo>) -> Self {
        Self { info }
    }

    /// Host backed by a snapshot of the current process
    pub fn capture() -> io::Result<Self> {
        Ok(Self::new(Arc::new(ProcessInfo::capture()?)))
    }

    pub fn info(&self) -> &ProcessInfo {
        &self.info
    }

    /// Spawn a process and hand back its live streams
    pub fn create(
        &self,
        program: &str,
        params: &[String],
        options: &SpawnOptions,
    ) -> Result<ChildProcess, ProcessError> {
        ChildProcess::spawn(program, params, options, &self.info)
    }

    /// Run a process to completion and collect its output
    pub async fn exec(
        &self,
        program: &str,
        params: &[String],
        options: &ExecuteOptions,
    ) -> Result<ExecuteResult, ProcessError> {
        crate::io::exec(program, params, options, &self.info).await
    }
}
