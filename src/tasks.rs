//! Background work for the editor.
//!
//! Slow work (downloads, parsing large files) runs on a worker thread and
//! never touches the tree. It hands back an [`Apply`] closure that the
//! owning thread runs against the session when it pumps the queue.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::debug;

use crate::editor::EditorSession;
use crate::error::{Error, Result};

/// Result of background work, applied on the owning thread
pub type Apply = Box<dyn FnOnce(&mut EditorSession) -> Result<()> + Send>;

/// A finished task as delivered to the owning thread
pub struct TaskOutcome {
    pub label: String,
    /// Session generation at spawn time; `None` for context-free work
    pub generation: Option<u64>,
    pub result: Result<Apply>,
}

pub struct BackgroundTasks {
    sender: Sender<TaskOutcome>,
    receiver: Receiver<TaskOutcome>,
    in_flight: Arc<AtomicUsize>,
}

impl Default for BackgroundTasks {
    fn default() -> Self {
        Self::new()
    }
}

impl BackgroundTasks {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            sender,
            receiver,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn spawn<F>(&self, label: &str, generation: Option<u64>, work: F)
    where
        F: FnOnce() -> Result<Apply> + Send + 'static,
    {
        let sender = self.sender.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let label = label.to_string();
        in_flight.fetch_add(1, Ordering::SeqCst);
        debug!("Background task started: {}", label);

        thread::spawn(move || {
            let result = match catch_unwind(AssertUnwindSafe(work)) {
                Ok(result) => result,
                Err(_) => Err(Error::Validation(format!("{} thread panicked", label))),
            };
            let _ = sender.send(TaskOutcome {
                label,
                generation,
                result,
            });
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Everything finished so far, without blocking
    pub fn drain(&self) -> Vec<TaskOutcome> {
        let mut out = Vec::new();
        while let Ok(outcome) = self.receiver.try_recv() {
            out.push(outcome);
        }
        out
    }

    /// Block until at least one task finishes or `timeout` passes
    pub fn wait(&self, timeout: Duration) -> Vec<TaskOutcome> {
        match self.receiver.recv_timeout(timeout) {
            Ok(first) => {
                let mut out = vec![first];
                out.extend(self.drain());
                out
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => Vec::new(),
        }
    }
}
