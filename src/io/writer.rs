//! Child stdin handle

use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tracing::{debug, trace};

use crate::io::error::{ProcessError, pipe_error};

/// Owned write handle for a child's stdin
///
/// Writes go straight to the OS pipe with no extra queueing, so a child that
/// reads slowly applies backpressure to the caller. Dropping the writer
/// closes the pipe.
#[derive(Debug)]
pub struct ChildProcessWriter {
    stdin: Option<ChildStdin>,
    /// Whether a stdin pipe was ever attached
    piped: bool,
}

impl ChildProcessWriter {
    pub(crate) fn new(stdin: Option<ChildStdin>) -> Self {
        Self {
            piped: stdin.is_some(),
            stdin,
        }
    }

    /// Write all bytes to the child's stdin
    ///
    /// Fails with [`ProcessError::PipeClosed`] once the writer has been closed
    /// or the child stopped reading, and with
    /// [`ProcessError::StdinNotAvailable`] if no pipe was ever attached.
    pub async fn write(&mut self, bytes: impl AsRef<[u8]>) -> Result<(), ProcessError> {
        let bytes = bytes.as_ref();
        let stdin = match self.stdin.as_mut() {
            Some(stdin) => stdin,
            None if self.piped => return Err(ProcessError::PipeClosed),
            None => return Err(ProcessError::StdinNotAvailable),
        };

        trace!("ChildProcessWriter: writing {} bytes", bytes.len());

        stdin.write_all(bytes).await.map_err(pipe_error)?;
        stdin.flush().await.map_err(pipe_error)?;
        Ok(())
    }

    /// Close stdin so the child observes end of input
    pub fn close(&mut self) {
        if self.stdin.take().is_some() {
            debug!("ChildProcessWriter: stdin closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.stdin.is_none()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::io::AsyncReadExt;
    use tokio::process::Command;

    #[tokio::test]
    async fn test_write_then_close_delivers_eof() {
        let mut child = Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .expect("Failed to spawn cat");

        let mut writer = ChildProcessWriter::new(child.stdin.take());
        let mut stdout = child.stdout.take().unwrap();

        writer.write("ping").await.unwrap();
        writer.close();
        assert!(writer.is_closed());

        let mut echoed = String::new();
        stdout.read_to_string(&mut echoed).await.unwrap();
        assert_eq!(echoed, "ping");

        child.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let mut child = Command::new("cat")
            .stdin(Stdio::piped())
            .spawn()
            .expect("Failed to spawn cat");

        let mut writer = ChildProcessWriter::new(child.stdin.take());
        writer.close();

        let result = writer.write(b"data").await;
        assert!(matches!(result, Err(ProcessError::PipeClosed)));
        child.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_without_pipe_is_not_available() {
        let mut writer = ChildProcessWriter::new(None);
        assert!(writer.is_closed());

        let result = writer.write(b"data").await;
        assert!(matches!(result, Err(ProcessError::StdinNotAvailable)));
    }

    #[tokio::test]
    async fn test_write_to_exited_child_reports_pipe_closed() {
        let mut child = Command::new("true")
            .stdin(Stdio::piped())
            .spawn()
            .expect("Failed to spawn true");

        let mut writer = ChildProcessWriter::new(child.stdin.take());
        child.wait().await.unwrap();

        let payload = vec![b'x'; 1 << 20];
        let result = writer.write(&payload).await;
        assert!(matches!(result, Err(ProcessError::PipeClosed)));
    }
}
