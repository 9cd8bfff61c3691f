//! Error types for process supervision
//!
//! Spawn failures are reported synchronously and never leave a partial
//! child behind. Pipe errors are recoverable by the caller.

use std::io;
use std::path::PathBuf;

// ============================================================================
// Spawn Errors
// ============================================================================

/// Reason a spawn attempt failed
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("program not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("invalid working directory: {path}")]
    InvalidCwd { path: PathBuf },

    #[error("invalid environment variable name: {key:?}")]
    InvalidEnv { key: String },

    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for SpawnError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => SpawnError::NotFound,
            io::ErrorKind::PermissionDenied => SpawnError::PermissionDenied,
            _ => SpawnError::Io(error),
        }
    }
}

// ============================================================================
// Process Errors
// ============================================================================

/// Error types for process management
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: SpawnError,
    },

    #[error("Pipe closed")]
    PipeClosed,

    #[error("Stdin not available")]
    StdinNotAvailable,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProcessError {
    /// Create a spawn failure for the given program
    pub fn spawn_failed(program: impl Into<String>, source: impl Into<SpawnError>) -> Self {
        Self::SpawnFailed {
            program: program.into(),
            source: source.into(),
        }
    }

    /// Whether this error was raised while creating the process
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, ProcessError::SpawnFailed { .. })
    }
}

/// Map a pipe write error onto the process taxonomy
///
/// A broken pipe means the reading end is gone; everything else is surfaced
/// as a plain I/O error.
pub(crate) fn pipe_error(error: io::Error) -> ProcessError {
    match error.kind() {
        io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected => ProcessError::PipeClosed,
        _ => ProcessError::Io(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_classification() {
        let not_found: SpawnError = io::Error::from(io::ErrorKind::NotFound).into();
        assert!(matches!(not_found, SpawnError::NotFound));

        let denied: SpawnError = io::Error::from(io::ErrorKind::PermissionDenied).into();
        assert!(matches!(denied, SpawnError::PermissionDenied));

        let other: SpawnError = io::Error::other("boom").into();
        assert!(matches!(other, SpawnError::Io(_)));
    }

    #[test]
    fn test_pipe_error_mapping() {
        let closed = pipe_error(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(closed, ProcessError::PipeClosed));

        let other = pipe_error(io::Error::from(io::ErrorKind::TimedOut));
        assert!(matches!(other, ProcessError::Io(_)));
    }

    #[test]
    fn test_spawn_failed_helper() {
        let error = ProcessError::spawn_failed("missing-tool", io::Error::from(io::ErrorKind::NotFound));
        assert!(error.is_spawn_failure());
        assert_eq!(
            error.to_string(),
            "Failed to spawn 'missing-tool': program not found"
        );
        assert!(!ProcessError::PipeClosed.is_spawn_failure());
    }
}
