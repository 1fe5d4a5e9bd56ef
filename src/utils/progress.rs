//! Progress reporting and cooperative cancellation for long-running passes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Number of messages collected before a [`BatchedProgress`] forwards them.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Receives human-readable status lines from a pass.
///
/// Implementations must not assume every message is shown; a sink is free to
/// batch or drop them.
pub trait ProgressSink {
    fn show_info(&self, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(&str),
{
    fn show_info(&self, message: &str) {
        self(message)
    }
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn show_info(&self, _message: &str) {}
}

/// Collects messages and forwards them over a channel in batches, so a slow
/// consumer is not flooded with one message per layer.
///
/// Pending messages are flushed when the sink is dropped.
pub struct BatchedProgress {
    sender: Sender<String>,
    batch_size: usize,
    pending: Mutex<Vec<String>>,
}

impl BatchedProgress {
    pub fn new(sender: Sender<String>, batch_size: usize) -> Self {
        Self {
            sender,
            batch_size: batch_size.max(1),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Forwards whatever is pending as a single joined message.
    pub fn flush(&self) {
        let batch = match self.pending.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        if !batch.is_empty() {
            // The receiver may be gone; progress is best effort.
            let _ = self.sender.send(batch.join("\n"));
        }
    }
}

impl ProgressSink for BatchedProgress {
    fn show_info(&self, message: &str) {
        let full = match self.pending.lock() {
            Ok(mut pending) => {
                pending.push(message.to_string());
                pending.len() >= self.batch_size
            }
            Err(_) => true,
        };
        if full {
            self.flush();
        }
    }
}

impl Drop for BatchedProgress {
    fn drop(&mut self) {
        self.flush();
    }
}

/// A shared flag checked between layers to stop a pass early.
#[derive(Debug, Default, Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
