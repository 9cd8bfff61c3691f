//! Child output streams
//!
//! Each captured stream gets a pump task that drains the OS pipe into a
//! [`StreamBuffer`]. Consumers read from the buffer through a
//! [`ChildProcessReader`], so a slow consumer never stalls the pipe.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace};

use crate::io::process::ProcessState;
use crate::io::stream_buffer::StreamBuffer;

// ============================================================================
// Constants
// ============================================================================

/// Size of the read buffer for pipe reads
const READ_BUFFER_SIZE: usize = 4096;

/// How long a pipe may stay silent after process exit before its buffer is
/// closed. Descendants that inherited the pipe can otherwise keep it open.
const EXIT_DRAIN_GRACE: Duration = Duration::from_millis(100);

// ============================================================================
// Stream Kind
// ============================================================================

/// Which child output stream a reader is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

// ============================================================================
// Child Process Reader
// ============================================================================

/// Read handle for a child's stdout or stderr
///
/// Clones share the same buffer and cursor: bytes handed to one clone are
/// never seen by another.
///
/// The stream ends at pipe EOF, or once the pipe has stayed silent for
/// 100 ms after the process exited. Output that background
/// descendants write after that point is not delivered.
#[derive(Debug, Clone)]
pub struct ChildProcessReader {
    kind: StreamKind,
    buffer: Arc<StreamBuffer>,
}

impl ChildProcessReader {
    pub(crate) fn new(kind: StreamKind, buffer: Arc<StreamBuffer>) -> Self {
        Self { kind, buffer }
    }

    /// Reader for a stream that is not captured; always at end of stream
    pub(crate) fn detached(kind: StreamKind) -> Self {
        Self::new(kind, Arc::new(StreamBuffer::closed()))
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Read up to `max_len` bytes, `None` at end of stream
    pub async fn read(&self, max_len: Option<usize>) -> Option<Vec<u8>> {
        self.buffer.read(max_len).await
    }

    /// Read everything until the stream closes
    pub async fn read_to_end(&self) -> Vec<u8> {
        self.buffer.read_to_end().await
    }

    /// Read the next line including its terminator, `None` at end of stream
    pub async fn read_line(&self) -> Option<Vec<u8>> {
        self.buffer.read_line().await
    }

    /// Whether no more bytes will be produced
    pub fn is_closed(&self) -> bool {
        self.buffer.is_closed()
    }
}

// ============================================================================
// Stream Pump
// ============================================================================

/// Spawn the task that drains `source` into `buffer`
///
/// The buffer is closed on pipe EOF, on a read error, or once the pipe has
/// been idle for [`EXIT_DRAIN_GRACE`] after the process exited.
pub(crate) fn spawn_pump<R>(
    source: R,
    kind: StreamKind,
    buffer: Arc<StreamBuffer>,
    forward: bool,
    exit: watch::Receiver<ProcessState>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let sink: Option<Box<dyn AsyncWrite + Unpin + Send>> = match (forward, kind) {
        (false, _) => None,
        (true, StreamKind::Stdout) => Some(Box::new(tokio::io::stdout())),
        (true, StreamKind::Stderr) => Some(Box::new(tokio::io::stderr())),
    };

    tokio::spawn(pump_stream(source, kind, buffer, sink, exit))
}

async fn pump_stream<R>(
    mut source: R,
    kind: StreamKind,
    buffer: Arc<StreamBuffer>,
    mut sink: Option<Box<dyn AsyncWrite + Unpin + Send>>,
    mut exit: watch::Receiver<ProcessState>,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut read_buffer = Box::new([0u8; READ_BUFFER_SIZE]);
    let mut exited = false;

    trace!("StreamPump({}): started", kind);

    loop {
        let result = if exited {
            match tokio::time::timeout(EXIT_DRAIN_GRACE, source.read(read_buffer.as_mut())).await {
                Ok(result) => result,
                Err(_) => {
                    debug!("StreamPump({}): pipe idle after exit, closing", kind);
                    break;
                }
            }
        } else {
            tokio::select! {
                result = source.read(read_buffer.as_mut()) => result,
                _ = wait_for_exit(&mut exit) => {
                    trace!("StreamPump({}): process exited, draining", kind);
                    exited = true;
                    continue;
                }
            }
        };

        match result {
            Ok(0) => {
                trace!("StreamPump({}): EOF reached", kind);
                break;
            }
            Ok(n) => {
                trace!("StreamPump({}): read {} bytes", kind, n);
                buffer.append(&read_buffer[..n]);

                if let Some(out) = sink.as_mut() {
                    let forwarded = async {
                        out.write_all(&read_buffer[..n]).await?;
                        out.flush().await
                    };
                    if let Err(e) = forwarded.await {
                        error!("Failed to forward {}: {}", kind, e);
                        sink = None;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                error!("Failed to read from {}: {}", kind, e);
                break;
            }
        }
    }

    buffer.close();
    trace!("StreamPump({}): finished", kind);
}

/// Resolve once the process has exited or its state channel is gone
async fn wait_for_exit(exit: &mut watch::Receiver<ProcessState>) {
    let _ = exit.wait_for(ProcessState::is_exited).await;
}
