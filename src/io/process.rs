//! Process supervision layer
//!
//! Owns a spawned OS process together with its stdin writer and its
//! stdout/stderr readers. A wait task reaps the process and publishes the
//! exit status; stream pumps drain the pipes independently of it.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::process::Child;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Level, debug, error, info, trace};
use uuid::Uuid;

use crate::info::ProcessInfo;
use crate::io::command::build_command;
use crate::io::error::ProcessError;
use crate::io::options::{SpawnOptions, StdioMode, StdioOptions};
use crate::io::reader::{ChildProcessReader, StreamKind, spawn_pump};
use crate::io::stream_buffer::StreamBuffer;
use crate::io::writer::ChildProcessWriter;

// ============================================================================
// Process State Management
// ============================================================================

/// How to stop a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Ask the process to terminate (SIGTERM); forced kill where unsupported
    Graceful,
    /// Force kill immediately (SIGKILL)
    Force,
}

/// Final status of an exited process
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ProcessStatus {
    /// `true` only for a normal exit with code 0
    pub ok: bool,
    /// Exit code, or `128 + signal` when terminated by a signal
    pub code: i32,
    /// Terminating signal on unix
    pub signal: Option<i32>,
}

impl ProcessStatus {
    /// Status reported when the exit could not be observed
    fn unknown() -> Self {
        Self {
            ok: false,
            code: -1,
            signal: None,
        }
    }
}

impl From<std::process::ExitStatus> for ProcessStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        let code = status
            .code()
            .or_else(|| signal.map(|signal| 128 + signal))
            .unwrap_or(0);

        Self {
            ok: status.success(),
            code,
            signal,
        }
    }
}

/// Process lifecycle states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// OS-level process creation in progress
    Spawning,
    /// Process is currently running
    Running { pid: u32 },
    /// Process has exited and been reaped
    Exited(ProcessStatus),
}

impl ProcessState {
    /// Get the process ID if the process is running
    pub fn pid(&self) -> Option<u32> {
        match self {
            ProcessState::Running { pid } => Some(*pid),
            _ => None,
        }
    }

    /// Check if the process is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running { .. })
    }

    pub fn is_exited(&self) -> bool {
        matches!(self, ProcessState::Exited(_))
    }

    /// Exit status once the process has exited
    pub fn status(&self) -> Option<ProcessStatus> {
        match self {
            ProcessState::Exited(status) => Some(*status),
            _ => None,
        }
    }
}

// ============================================================================
// Process Exit Events
// ============================================================================

/// Event fired once a supervised process has exited
#[derive(Debug, Clone)]
pub struct ProcessExitEvent {
    pub pid: Option<u32>,
    pub status: ProcessStatus,
}

/// Trait for handling process exit events
#[async_trait]
pub trait ProcessExitHandler: Send + Sync {
    /// Called after the exit status has been published
    async fn on_process_exit(&self, event: ProcessExitEvent);
}

// ============================================================================
// Child Process
// ============================================================================

/// A supervised child process
///
/// Dropping a `ChildProcess` neither kills nor orphans the process: the wait
/// task keeps running until the OS process exits and reaps it.
#[derive(Debug)]
pub struct ChildProcess {
    /// Handle identifier used in logs
    id: Uuid,

    /// Program as requested by the caller
    program: String,

    /// OS process ID captured at spawn time
    pid: Option<u32>,

    stdin: ChildProcessWriter,
    stdout: ChildProcessReader,
    stderr: ChildProcessReader,

    /// Lifecycle state published by the wait task
    state: watch::Receiver<ProcessState>,

    /// Stop requests forwarded to the wait task
    stop_tx: mpsc::UnboundedSender<StopMode>,

    /// Wait task handle (reaps the child)
    wait_task: JoinHandle<()>,
}

impl ChildProcess {
    /// Spawn a process with captured stdout and stderr
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        program: &str,
        params: &[String],
        options: &SpawnOptions,
        info: &ProcessInfo,
    ) -> Result<Self, ProcessError> {
        Self::spawn_with_stdio(program, params, options, StdioOptions::default(), info)
    }

    /// Spawn a process with explicit capture modes
    pub fn spawn_with_stdio(
        program: &str,
        params: &[String],
        options: &SpawnOptions,
        stdio: StdioOptions,
        info: &ProcessInfo,
    ) -> Result<Self, ProcessError> {
        let id = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(ProcessState::Spawning);

        info!("Starting process [{}]: {} {:?}", id, program, params);

        let mut command = build_command(program, params, options, stdio, info)
            .map_err(|e| ProcessError::spawn_failed(program, e))?;

        let mut child = command.spawn().map_err(|e| {
            error!("Failed to spawn '{}': {}", program, e);
            ProcessError::spawn_failed(program, e)
        })?;

        let pid = child.id();
        debug!("Process [{}] started with PID: {:?}", id, pid);
        crate::log_process_event!(Level::INFO, "spawned", program, pid);

        if let Some(pid) = pid {
            state_tx.send_replace(ProcessState::Running { pid });
        }

        let stdin = ChildProcessWriter::new(child.stdin.take());

        let stdout = match child.stdout.take() {
            Some(pipe) => {
                let buffer = Arc::new(StreamBuffer::new());
                spawn_pump(
                    pipe,
                    StreamKind::Stdout,
                    Arc::clone(&buffer),
                    stdio.stdout == StdioMode::Forward,
                    state_rx.clone(),
                );
                ChildProcessReader::new(StreamKind::Stdout, buffer)
            }
            None => ChildProcessReader::detached(StreamKind::Stdout),
        };

        let stderr = match child.stderr.take() {
            Some(pipe) => {
                let buffer = Arc::new(StreamBuffer::new());
                spawn_pump(
                    pipe,
                    StreamKind::Stderr,
                    Arc::clone(&buffer),
                    stdio.stderr == StdioMode::Forward,
                    state_rx.clone(),
                );
                ChildProcessReader::new(StreamKind::Stderr, buffer)
            }
            None => ChildProcessReader::detached(StreamKind::Stderr),
        };

        let (stop_tx, stop_rx) = mpsc::unbounded_channel();
        let wait_task = tokio::spawn(watch_exit(
            id,
            child,
            pid,
            state_tx,
            stop_rx,
            options.exit_handler.clone(),
        ));

        Ok(Self {
            id,
            program: program.to_string(),
            pid,
            stdin,
            stdout,
            stderr,
            state: state_rx,
            stop_tx,
            wait_task,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// OS process ID assigned at spawn time
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Current lifecycle state
    pub fn state(&self) -> ProcessState {
        self.state.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().is_running()
    }

    pub fn stdin(&mut self) -> &mut ChildProcessWriter {
        &mut self.stdin
    }

    pub fn stdout(&self) -> &ChildProcessReader {
        &self.stdout
    }

    pub fn stderr(&self) -> &ChildProcessReader {
        &self.stderr
    }

    /// Exit status if the process has already exited
    pub fn try_status(&self) -> Option<ProcessStatus> {
        self.state.borrow().status()
    }

    /// Wait until the process has exited and return its status
    ///
    /// The status is cached; later calls return immediately.
    pub async fn status(&self) -> ProcessStatus {
        let mut state = self.state.clone();
        let status = match state.wait_for(ProcessState::is_exited).await {
            Ok(exited) => exited.status(),
            Err(_) => self.state.borrow().status(),
        };

        status.unwrap_or_else(|| {
            error!("Process [{}] wait task ended without an exit status", self.id);
            ProcessStatus::unknown()
        })
    }

    /// Force kill the process
    ///
    /// No-op once the process has exited. Does not wait for the exit.
    pub fn kill(&self) {
        self.stop(StopMode::Force);
    }

    /// Request termination without waiting for it
    pub fn stop(&self, mode: StopMode) {
        if self.state.borrow().is_exited() {
            debug!("Process [{}] already exited, ignoring {:?} stop", self.id, mode);
            return;
        }

        match mode {
            StopMode::Graceful => info!("Gracefully stopping process [{}] PID {:?}", self.id, self.pid),
            StopMode::Force => info!("Force killing process [{}] PID {:?}", self.id, self.pid),
        }

        if self.stop_tx.send(mode).is_err() {
            trace!("Process [{}] wait task already finished", self.id);
        }
    }

    /// Whether the wait task has finished reaping the process
    pub fn is_reaped(&self) -> bool {
        self.wait_task.is_finished()
    }
}

// ============================================================================
// Wait Task
// ============================================================================

/// Reap the child, applying stop requests until it exits
async fn watch_exit(
    id: Uuid,
    mut child: Child,
    pid: Option<u32>,
    state: watch::Sender<ProcessState>,
    mut stop_rx: mpsc::UnboundedReceiver<StopMode>,
    exit_handler: Option<Arc<dyn ProcessExitHandler>>,
) {
    trace!("ChildProcess: Starting wait task for [{}] PID {:?}", id, pid);

    let result = loop {
        tokio::select! {
            result = child.wait() => break result,
            Some(mode) = stop_rx.recv() => send_stop(&mut child, pid, mode),
        }
    };

    let status = match result {
        Ok(exit_status) => {
            info!("Process [{}] PID {:?} exited with status: {}", id, pid, exit_status);
            ProcessStatus::from(exit_status)
        }
        Err(e) => {
            error!("Error waiting for child process [{}]: {}", id, e);
            ProcessStatus::unknown()
        }
    };

    state.send_replace(ProcessState::Exited(status));

    if let Some(handler) = &exit_handler {
        handler.on_process_exit(ProcessExitEvent { pid, status }).await;
    }

    trace!("ChildProcess: Wait task finished for [{}]", id);
}

/// Deliver a stop request to a child that has not been reaped yet
fn send_stop(child: &mut Child, pid: Option<u32>, mode: StopMode) {
    #[cfg(unix)]
    if let (StopMode::Graceful, Some(pid)) = (mode, pid) {
        // The wait task has not reaped the child, so the PID is still ours.
        unsafe {
            if libc::kill(pid as libc::pid_t, libc::SIGTERM) == 0 {
                info!("Sent SIGTERM to process {}", pid);
                return;
            }
        }
    }

    #[cfg(not(unix))]
    let _ = (pid, mode);

    match child.start_kill() {
        Ok(()) => info!("Sent kill to process {:?}", pid),
        Err(e) => debug!("Kill request for process {:?} not delivered: {}", pid, e),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use tokio::time::timeout;

    #[cfg(feature = "test-logging")]
    crate::setup_test_logging!();

    fn info() -> ProcessInfo {
        ProcessInfo::capture().unwrap()
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn test_cat_echoes_stdin() {
        let mut child = ChildProcess::spawn("cat", &[], &SpawnOptions::new(), &info()).unwrap();

        child.stdin().write("hello, world").await.unwrap();
        let echoed = child.stdout().read(Some(12)).await.unwrap();
        assert_eq!(echoed, b"hello, world");

        child.stdin().close();
        let status = child.status().await;
        assert!(status.ok);
        assert_eq!(status.code, 0);
    }

    #[tokio::test]
    async fn test_echo_passthrough_preserves_bytes() {
        let mut child = ChildProcess::spawn("cat", &[], &SpawnOptions::new(), &info()).unwrap();
        let payload: Vec<u8> = (0..=255u8).cycle().take(50_000).collect();

        let stdout = child.stdout().clone();
        let reader = tokio::spawn(async move {
            let mut received = Vec::new();
            while let Some(chunk) = stdout.read(Some(1000)).await {
                received.extend(chunk);
            }
            received
        });

        child.stdin().write(&payload).await.unwrap();
        child.stdin().close();

        let received = reader.await.unwrap();
        assert_eq!(received, payload);
        assert!(child.status().await.ok);
    }

    #[tokio::test]
    async fn test_process_state_transitions() {
        let mut child = ChildProcess::spawn("cat", &[], &SpawnOptions::new(), &info()).unwrap();

        let pid = child.pid().expect("running child has a pid");
        assert_eq!(child.state(), ProcessState::Running { pid });
        assert!(child.is_running());
        assert!(child.try_status().is_none());

        child.stdin().close();
        let status = child.status().await;

        assert_eq!(child.state(), ProcessState::Exited(status));
        assert!(!child.is_running());
        assert_eq!(child.try_status(), Some(status));
    }

    #[tokio::test]
    async fn test_status_is_idempotent() {
        let child =
            ChildProcess::spawn("sh", &args(&["-c", "exit 3"]), &SpawnOptions::new(), &info())
                .unwrap();

        let first = child.status().await;
        let second = child.status().await;

        assert_eq!(first, second);
        assert!(!first.ok);
        assert_eq!(first.code, 3);
        assert_eq!(first.signal, None);
    }

    #[tokio::test]
    async fn test_kill_reports_signal() {
        let child =
            ChildProcess::spawn("sleep", &args(&["30"]), &SpawnOptions::new(), &info()).unwrap();

        child.kill();
        let status = timeout(Duration::from_secs(5), child.status())
            .await
            .expect("killed process should exit");

        assert!(!status.ok);
        assert_eq!(status.signal, Some(libc::SIGKILL));
        assert_eq!(status.code, 128 + libc::SIGKILL);
    }

    #[tokio::test]
    async fn test_graceful_stop_sends_sigterm() {
        let child =
            ChildProcess::spawn("sleep", &args(&["30"]), &SpawnOptions::new(), &info()).unwrap();

        child.stop(StopMode::Graceful);
        let status = timeout(Duration::from_secs(5), child.status())
            .await
            .expect("terminated process should exit");

        assert!(!status.ok);
        assert_eq!(status.signal, Some(libc::SIGTERM));
    }

    #[tokio::test]
    async fn test_kill_after_exit_is_noop() {
        let child =
            ChildProcess::spawn("echo", &args(&["done"]), &SpawnOptions::new(), &info()).unwrap();

        let status = child.status().await;
        child.kill();
        child.kill();

        assert_eq!(child.status().await, status);
        assert!(status.ok);
    }

    #[tokio::test]
    async fn test_reads_succeed_after_exit() {
        let child = ChildProcess::spawn(
            "sh",
            &args(&["-c", "printf out; printf err >&2"]),
            &SpawnOptions::new(),
            &info(),
        )
        .unwrap();

        child.status().await;

        assert_eq!(child.stdout().read_to_end().await, b"out");
        assert_eq!(child.stderr().read_to_end().await, b"err");
        assert!(child.stdout().read(None).await.is_none());
    }

    #[tokio::test]
    async fn test_spawn_missing_program_fails() {
        let result = ChildProcess::spawn(
            "procvisor-definitely-missing-program",
            &[],
            &SpawnOptions::new(),
            &info(),
        );

        match result {
            Err(ProcessError::SpawnFailed { program, source }) => {
                assert_eq!(program, "procvisor-definitely-missing-program");
                assert!(matches!(source, crate::io::SpawnError::NotFound));
            }
            other => panic!("Expected SpawnFailed, got: {:?}", other.map(|c| c.pid())),
        }
    }

    #[tokio::test]
    async fn test_invalid_cwd_fails_spawn() {
        let result = ChildProcess::spawn(
            "pwd",
            &[],
            &SpawnOptions::new().with_cwd("/procvisor/does/not/exist"),
            &info(),
        );

        assert!(matches!(
            result,
            Err(ProcessError::SpawnFailed {
                source: crate::io::SpawnError::InvalidCwd { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_discarded_stream_is_not_captured() {
        let stdio = StdioOptions {
            stdout: StdioMode::None,
            stderr: StdioMode::Default,
        };
        let child = ChildProcess::spawn_with_stdio(
            "sh",
            &args(&["-c", "echo hidden; echo shown >&2"]),
            &SpawnOptions::new(),
            stdio,
            &info(),
        )
        .unwrap();

        assert!(child.stdout().read_to_end().await.is_empty());
        assert_eq!(child.stderr().read_to_end().await, b"shown\n");
        assert!(child.status().await.ok);
    }

    #[tokio::test]
    async fn test_concurrent_processes_keep_streams_apart() {
        let info = info();
        let mut children = Vec::new();
        for index in 0..8 {
            let script = format!("for i in 1 2 3; do echo child-{index}; done");
            children.push(
                ChildProcess::spawn("sh", &args(&["-c", &script]), &SpawnOptions::new(), &info)
                    .unwrap(),
            );
        }

        let results = drain_all(children).await;

        for (index, (status, output)) in results.into_iter().enumerate() {
            assert!(status.ok);
            let expected = format!("child-{index}\n").repeat(3);
            assert_eq!(String::from_utf8(output).unwrap(), expected);
        }
    }

    async fn drain_all(children: Vec<ChildProcess>) -> Vec<(ProcessStatus, Vec<u8>)> {
        let handles: Vec<_> = children
            .into_iter()
            .map(|child| {
                tokio::spawn(async move {
                    let output = child.stdout().read_to_end().await;
                    (child.status().await, output)
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results
    }

    struct RecordingHandler {
        events: Arc<Mutex<Vec<ProcessExitEvent>>>,
    }

    #[async_trait]
    impl ProcessExitHandler for RecordingHandler {
        async fn on_process_exit(&self, event: ProcessExitEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[tokio::test]
    async fn test_exit_handler_fires_once() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let options = SpawnOptions::new().with_exit_handler(RecordingHandler {
            events: Arc::clone(&events),
        });

        let child = ChildProcess::spawn("sh", &args(&["-c", "exit 7"]), &options, &info()).unwrap();
        let status = child.status().await;

        let deadline = Instant::now() + Duration::from_secs(2);
        while !child.is_reaped() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, status);
        assert_eq!(events[0].pid, child.pid());
    }
}
