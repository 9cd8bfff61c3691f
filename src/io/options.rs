//! Spawn and execute options
//!
//! Options are plain values built with `with_*` methods and are never
//! mutated once handed to a spawn call.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::str::FromStr;
use std::sync::Arc;

use crate::io::process::ProcessExitHandler;

// ============================================================================
// Shell Selection
// ============================================================================

/// How the program is launched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ShellMode {
    /// Execute the program directly; arguments are never shell-interpreted
    #[default]
    Direct,
    /// Run through the platform default shell
    Default,
    /// Run through the named shell
    Named(String),
}

impl From<bool> for ShellMode {
    fn from(enabled: bool) -> Self {
        if enabled {
            ShellMode::Default
        } else {
            ShellMode::Direct
        }
    }
}

impl From<&str> for ShellMode {
    fn from(shell: &str) -> Self {
        ShellMode::Named(shell.to_string())
    }
}

impl From<String> for ShellMode {
    fn from(shell: String) -> Self {
        ShellMode::Named(shell)
    }
}

// ============================================================================
// Stdio Capture Modes
// ============================================================================

/// Capture policy for one child output stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StdioMode {
    /// Capture into the stream buffer
    #[default]
    Default,
    /// Hand the parent's own stream to the child; nothing is captured
    Inherit,
    /// Capture and also copy every chunk to the parent's matching stream
    Forward,
    /// Discard the stream
    None,
}

impl StdioMode {
    /// Whether bytes from this stream end up in a buffer
    pub fn is_captured(self) -> bool {
        matches!(self, StdioMode::Default | StdioMode::Forward)
    }

    pub(crate) fn as_stdio(self) -> Stdio {
        match self {
            StdioMode::Default | StdioMode::Forward => Stdio::piped(),
            StdioMode::Inherit => Stdio::inherit(),
            StdioMode::None => Stdio::null(),
        }
    }
}

impl FromStr for StdioMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "default" => Ok(StdioMode::Default),
            "inherit" => Ok(StdioMode::Inherit),
            "forward" => Ok(StdioMode::Forward),
            "none" => Ok(StdioMode::None),
            other => Err(format!(
                "invalid stdio mode '{other}', expected one of: default, inherit, forward, none"
            )),
        }
    }
}

impl fmt::Display for StdioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StdioMode::Default => "default",
            StdioMode::Inherit => "inherit",
            StdioMode::Forward => "forward",
            StdioMode::None => "none",
        };
        f.write_str(name)
    }
}

/// Per-stream capture modes for stdout and stderr
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StdioOptions {
    pub stdout: StdioMode,
    pub stderr: StdioMode,
}

impl StdioOptions {
    /// Use the same mode for both streams
    pub fn all(mode: StdioMode) -> Self {
        Self {
            stdout: mode,
            stderr: mode,
        }
    }
}

// ============================================================================
// Spawn Options
// ============================================================================

/// Options shared by `create` and `exec`
#[derive(Clone, Default)]
pub struct SpawnOptions {
    /// Working directory; `~` expands to the home directory and relative
    /// paths resolve against the process snapshot cwd
    pub cwd: Option<PathBuf>,

    /// Variables overlaid on the inherited environment
    pub env: Option<HashMap<String, String>>,

    /// Start from an empty environment instead of the inherited one
    pub clear_env: bool,

    /// Direct exec or shell invocation
    pub shell: ShellMode,

    /// Optional handler fired once the process has exited
    pub exit_handler: Option<Arc<dyn ProcessExitHandler>>,
}

impl fmt::Debug for SpawnOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpawnOptions")
            .field("cwd", &self.cwd)
            .field("env", &self.env)
            .field("clear_env", &self.clear_env)
            .field("shell", &self.shell)
            .field(
                "exit_handler",
                &self.exit_handler.as_ref().map(|_| "ProcessExitHandler"),
            )
            .finish()
    }
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add one environment variable to the overlay
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_clear_env(mut self, clear: bool) -> Self {
        self.clear_env = clear;
        self
    }

    pub fn with_shell(mut self, shell: impl Into<ShellMode>) -> Self {
        self.shell = shell.into();
        self
    }

    pub fn with_exit_handler<H>(mut self, handler: H) -> Self
    where
        H: ProcessExitHandler + 'static,
    {
        self.exit_handler = Some(Arc::new(handler));
        self
    }
}

// ============================================================================
// Execute Options
// ============================================================================

/// Options for run-to-completion execution
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub spawn: SpawnOptions,

    /// Capture mode per output stream
    pub stdio: StdioOptions,

    /// Bytes written to the child's stdin before it is closed
    pub stdin: Option<Vec<u8>>,
}

impl From<SpawnOptions> for ExecuteOptions {
    fn from(spawn: SpawnOptions) -> Self {
        Self {
            spawn,
            ..Self::default()
        }
    }
}

impl ExecuteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn with_stdout(mut self, mode: StdioMode) -> Self {
        self.stdio.stdout = mode;
        self
    }

    pub fn with_stderr(mut self, mode: StdioMode) -> Self {
        self.stdio.stderr = mode;
        self
    }
}
