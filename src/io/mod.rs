//! I/O layer - child process supervision
//!
//! - **StreamBuffer**: byte log with a read cursor, fed by a stream pump
//! - **Reader/Writer**: owned handles for a child's stdout/stderr and stdin
//! - **Process**: spawn, kill and exit-status synchronization
//! - **Exec**: run-to-completion on top of the process layer

pub mod command;
pub mod error;
pub mod exec;
pub mod options;
pub mod process;
pub mod reader;
pub mod stream_buffer;
pub mod writer;

// Re-export main types for convenience
pub use command::default_shell;
pub use error::{ProcessError, SpawnError};
pub use exec::{ExecuteResult, exec};
pub use options::{ExecuteOptions, ShellMode, SpawnOptions, StdioMode, StdioOptions};
pub use process::{
    ChildProcess, ProcessExitEvent, ProcessExitHandler, ProcessState, ProcessStatus, StopMode,
};
pub use reader::{ChildProcessReader, StreamKind};
pub use stream_buffer::{DEFAULT_READ_CHUNK, StreamBuffer};
pub use writer::ChildProcessWriter;
