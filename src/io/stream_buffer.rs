//! Growable byte buffer decoupling a stream producer from its readers
//!
//! The producer (a stream pump) appends bytes and eventually closes the
//! buffer. Consumers suspend on [`StreamBuffer::read`] and friends without
//! parking an OS thread. Every byte is delivered exactly once and in the
//! order it was appended.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::trace;

// ============================================================================
// Constants
// ============================================================================

/// Chunk size used by [`StreamBuffer::read`] when no length is given
pub const DEFAULT_READ_CHUNK: usize = 8;

/// Delivered prefix size after which the backing storage is compacted
const COMPACT_THRESHOLD: usize = 64 * 1024;

// ============================================================================
// Buffer State
// ============================================================================

#[derive(Debug, Default)]
struct BufferState {
    /// Appended bytes; everything before `cursor` has been delivered
    data: Vec<u8>,
    /// Read cursor into `data`
    cursor: usize,
    /// Total bytes delivered over the buffer lifetime
    delivered: u64,
    /// Producer finished, nothing more will be appended
    closed: bool,
}

impl BufferState {
    fn available(&self) -> usize {
        self.data.len() - self.cursor
    }

    fn take(&mut self, max_len: usize) -> Vec<u8> {
        let end = self.cursor + max_len.min(self.available());
        let chunk = self.data[self.cursor..end].to_vec();
        self.cursor = end;
        self.delivered += chunk.len() as u64;
        self.compact();
        chunk
    }

    fn take_all(&mut self) -> Vec<u8> {
        let remaining = self.available();
        self.take(remaining)
    }

    fn compact(&mut self) {
        if self.cursor >= COMPACT_THRESHOLD && self.cursor * 2 >= self.data.len() {
            self.data.drain(..self.cursor);
            self.cursor = 0;
        }
    }
}

// ============================================================================
// Stream Buffer
// ============================================================================

/// Append-only byte log with a read cursor
#[derive(Debug, Default)]
pub struct StreamBuffer {
    state: Mutex<BufferState>,
    notify: Notify,
}

impl StreamBuffer {
    /// Create an empty, open buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a buffer that is already at end of stream
    ///
    /// Used for streams that are not captured (inherited or discarded).
    pub fn closed() -> Self {
        let buffer = Self::new();
        buffer.close();
        buffer
    }

    // Every mutation completes before unlocking; a poisoned guard is still valid.
    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append bytes produced by the stream pump
    ///
    /// Appends after [`close`](Self::close) are dropped.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        {
            let mut state = self.lock();
            if state.closed {
                trace!("StreamBuffer: dropping {} bytes appended after close", bytes.len());
                return;
            }
            state.data.extend_from_slice(bytes);
        }

        self.notify.notify_waiters();
    }

    /// Mark the producer as finished and wake every pending reader
    pub fn close(&self) {
        {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }

        self.notify.notify_waiters();
    }

    /// Whether the producer has finished
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of bytes appended but not yet delivered
    pub fn available(&self) -> usize {
        self.lock().available()
    }

    /// Total number of bytes delivered to readers so far
    pub fn position(&self) -> u64 {
        self.lock().delivered
    }

    /// Read up to `max_len` bytes (default [`DEFAULT_READ_CHUNK`])
    ///
    /// Suspends until at least one undelivered byte exists or the buffer is
    /// closed. Returns `None` once the buffer is closed and fully drained.
    /// A `max_len` of zero is treated as one.
    pub async fn read(&self, max_len: Option<usize>) -> Option<Vec<u8>> {
        let max_len = max_len.unwrap_or(DEFAULT_READ_CHUNK).max(1);

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.available() > 0 {
                    return Some(state.take(max_len));
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Read everything up to the end of the stream
    ///
    /// Suspends until the buffer is closed, then returns all undelivered bytes.
    pub async fn read_to_end(&self) -> Vec<u8> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.closed {
                    return state.take_all();
                }
            }

            notified.await;
        }
    }

    /// Read through the next `\n` (inclusive)
    ///
    /// Returns the trailing partial line at end of stream, then `None`.
    pub async fn read_line(&self) -> Option<Vec<u8>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                let cursor = state.cursor;
                let newline = state.data[cursor..].iter().position(|b| *b == b'\n');
                if let Some(offset) = newline {
                    return Some(state.take(offset + 1));
                }
                if state.closed {
                    return (state.available() > 0).then(|| state.take_all());
                }
            }

            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn test_read_default_chunk() {
        let buffer = StreamBuffer::new();
        buffer.append(b"0123456789abcdef!");

        assert_eq!(buffer.read(None).await.unwrap(), b"01234567");
        assert_eq!(buffer.read(None).await.unwrap(), b"89abcdef");
        assert_eq!(buffer.read(Some(100)).await.unwrap(), b"!");
        assert_eq!(buffer.position(), 17);
    }

    #[tokio::test]
    async fn test_read_waits_for_data() {
        let buffer = Arc::new(StreamBuffer::new());

        let producer = Arc::clone(&buffer);
        tokio::spawn(async move {
            sleep(Duration::from_millis(50)).await;
            producer.append(b"late");
        });

        let chunk = timeout(Duration::from_secs(2), buffer.read(Some(16)))
            .await
            .expect("read should wake on append");
        assert_eq!(chunk.unwrap(), b"late");
    }

    #[tokio::test]
    async fn test_close_drains_then_reports_eof() {
        let buffer = StreamBuffer::new();
        buffer.append(b"tail");
        buffer.close();

        assert_eq!(buffer.read(Some(2)).await.unwrap(), b"ta");
        assert_eq!(buffer.read(Some(8)).await.unwrap(), b"il");
        assert!(buffer.read(None).await.is_none());
        assert!(buffer.read(None).await.is_none());
    }

    #[tokio::test]
    async fn test_close_wakes_pending_reader() {
        let buffer = Arc::new(StreamBuffer::new());

        let reader = Arc::clone(&buffer);
        let pending = tokio::spawn(async move { reader.read(None).await });

        sleep(Duration::from_millis(20)).await;
        buffer.close();

        let result = timeout(Duration::from_secs(2), pending)
            .await
            .expect("close should wake the reader")
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_read_to_end_waits_for_close() {
        let buffer = Arc::new(StreamBuffer::new());
        buffer.append(b"abc");
        assert_eq!(buffer.read(Some(1)).await.unwrap(), b"a");

        let producer = Arc::clone(&buffer);
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            producer.append(b"def");
            producer.close();
        });

        assert_eq!(buffer.read_to_end().await, b"bcdef");
        assert!(buffer.read_to_end().await.is_empty());
    }

    #[tokio::test]
    async fn test_append_after_close_is_dropped() {
        let buffer = StreamBuffer::closed();
        buffer.append(b"ignored");

        assert!(buffer.is_closed());
        assert_eq!(buffer.available(), 0);
        assert!(buffer.read(None).await.is_none());
    }

    #[tokio::test]
    async fn test_read_line() {
        let buffer = StreamBuffer::new();
        buffer.append(b"first\nsec");
        assert_eq!(buffer.read_line().await.unwrap(), b"first\n");

        buffer.append(b"ond\nrest");
        buffer.close();
        assert_eq!(buffer.read_line().await.unwrap(), b"second\n");
        assert_eq!(buffer.read_line().await.unwrap(), b"rest");
        assert!(buffer.read_line().await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_readers_never_share_bytes() {
        let buffer = Arc::new(StreamBuffer::new());
        let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();

        let mut readers = Vec::new();
        for _ in 0..4 {
            let buffer = Arc::clone(&buffer);
            readers.push(tokio::spawn(async move {
                let mut received = Vec::new();
                while let Some(chunk) = buffer.read(Some(7)).await {
                    received.extend(chunk);
                }
                received
            }));
        }

        for chunk in payload.chunks(333) {
            buffer.append(chunk);
            tokio::task::yield_now().await;
        }
        buffer.close();

        let mut delivered = Vec::new();
        for reader in readers {
            delivered.extend(reader.await.unwrap());
        }

        assert_eq!(delivered.len(), payload.len());
        assert_eq!(buffer.position(), payload.len() as u64);

        let mut expected = payload.clone();
        expected.sort_unstable();
        delivered.sort_unstable();
        assert_eq!(delivered, expected);
    }

    #[tokio::test]
    async fn test_compaction_preserves_order() {
        let buffer = StreamBuffer::new();
        let payload: Vec<u8> = (0..(COMPACT_THRESHOLD * 3)).map(|i| (i % 256) as u8).collect();
        buffer.append(&payload);
        buffer.close();

        let mut received = Vec::new();
        while let Some(chunk) = buffer.read(Some(4096)).await {
            received.extend(chunk);
        }

        assert_eq!(received, payload);
    }
}
