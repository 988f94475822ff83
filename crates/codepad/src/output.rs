//! Shared observable output
//!
//! Every execution path writes into one [`OutputLog`]. Plain messages replace
//! the text; process output is appended through the terminal processor.
//! Observers subscribe to a watch channel and always see the latest text.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;

use crate::terminal::TerminalBuffer;

#[derive(Debug)]
struct Inner {
    buffer: Mutex<TerminalBuffer>,
    tx: watch::Sender<String>,
}

/// Cloneable handle to the current output text
#[derive(Debug, Clone)]
pub struct OutputLog {
    inner: Arc<Inner>,
}

impl OutputLog {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(String::new());
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(TerminalBuffer::new()),
                tx,
            }),
        }
    }

    /// Replace the output with a message
    pub fn set(&self, text: impl Into<String>) {
        let mut buffer = self.lock();
        buffer.set_text(text);
        self.publish(&buffer);
    }

    pub fn clear(&self) {
        let mut buffer = self.lock();
        buffer.clear();
        self.publish(&buffer);
    }

    /// Append a raw chunk of process output
    pub fn append_chunk(&self, chunk: &str) {
        let mut buffer = self.lock();
        buffer.feed(chunk);
        self.publish(&buffer);
    }

    /// Current text
    pub fn snapshot(&self) -> String {
        self.lock().text().to_owned()
    }

    /// Receiver notified on every change
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.inner.tx.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, TerminalBuffer> {
        // The buffer holds plain text; a panic mid-update leaves nothing to repair
        self.inner
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, buffer: &TerminalBuffer) {
        self.inner.tx.send_if_modified(|current| {
            if current == buffer.text() {
                false
            } else {
                buffer.text().clone_into(current);
                true
            }
        });
    }
}

impl Default for OutputLog {
    fn default() -> Self {
        Self::new()
    }
}
