//! Read-only snapshot of the host process
//!
//! Captured once at startup and passed to whatever needs it instead of
//! consulting ambient global state on every call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::env;
use std::io;
use std::path::PathBuf;

/// Immutable view of the current process environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    /// Operating system family, e.g. `linux`, `macos`, `windows`
    pub os: String,

    /// CPU architecture, e.g. `x86_64`, `aarch64`
    pub arch: String,

    /// Arguments passed after the executable name
    pub args: Vec<String>,

    /// Working directory at capture time
    pub cwd: PathBuf,

    /// Home directory of the current user, if known
    pub home: Option<PathBuf>,

    /// Process ID
    pub pid: u32,

    /// When the snapshot was taken
    pub captured_at: DateTime<Utc>,
}

impl ProcessInfo {
    /// Capture the snapshot from the running process
    pub fn capture() -> io::Result<Self> {
        Ok(Self {
            os: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
            args: env::args_os()
                .skip(1)
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            cwd: env::current_dir()?,
            home: dirs::home_dir(),
            pid: std::process::id(),
            captured_at: Utc::now(),
        })
    }

    /// Snapshot with an explicit working directory and arguments
    pub fn with_cwd(cwd: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            os: env::consts::OS.to_string(),
            arch: env::consts::ARCH.to_string(),
            args,
            cwd: cwd.into(),
            home: dirs::home_dir(),
            pid: std::process::id(),
            captured_at: Utc::now(),
        }
    }
}
