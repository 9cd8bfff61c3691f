//! Concurrent I/O for child processes
//!
//! Spawn programs, write to their stdin, and read their stdout and stderr
//! without blocking the async runtime. Output is buffered by background
//! pumps so a caller that reads one stream never stalls a child writing to
//! the other.
//!
//! ```no_run
//! use procvisor::ProcessHost;
//! use procvisor::io::ExecuteOptions;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let host = ProcessHost::capture()?;
//! let result = host
//!     .exec("echo", &["hello".to_string()], &ExecuteOptions::new())
//!     .await?;
//! assert_eq!(result.stdout_lossy(), "hello\n");
//! # Ok(())
//! # }
//! ```

pub mod host;
pub mod info;
pub mod io;
pub mod logging;
pub mod reflection;

#[cfg(test)]
mod test_utils;

pub use host::ProcessHost;
pub use info::ProcessInfo;
pub use io::{
    ChildProcess, ChildProcessReader, ChildProcessWriter, ExecuteOptions, ExecuteResult,
    ProcessError, ProcessStatus, SpawnError, SpawnOptions, StreamBuffer,
};
