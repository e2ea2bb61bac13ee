//! In-memory FIFO hand-off between producers and pipeline workers.
//!
//! The queue is not durable: a process restart loses whatever is buffered.
//! The recovery sweep re-discovers non-terminal records and requeues them at
//! startup, giving at-least-once semantics across restarts.

use std::sync::Mutex;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;

use crate::error::{ProcessingError, ServiceResult};

/// A document submitted for processing.
///
/// Transient: exists only inside the queue and on a worker's stack. All
/// persistent state lives on the document record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingJob {
    pub document_id: String,
}

impl ProcessingJob {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
        }
    }
}

/// Unbounded FIFO queue draining to a fixed set of workers.
///
/// Every enqueued job is delivered to exactly one waiting worker, in
/// submission order. Closing the queue rejects further enqueues and resolves
/// all blocked dequeues once the buffer drains.
pub struct JobQueue {
    sender: Mutex<Option<UnboundedSender<ProcessingJob>>>,
    receiver: tokio::sync::Mutex<UnboundedReceiver<ProcessingJob>>,
}

impl JobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }

    /// Append a job. Never blocks, never deduplicates; fails only after the
    /// queue has been closed.
    pub fn enqueue(&self, job: ProcessingJob) -> ServiceResult<()> {
        let sender = self.sender.lock().unwrap();
        match sender.as_ref() {
            Some(tx) => tx
                .send(job)
                .map_err(|_| ProcessingError::QueueClosed.into()),
            None => Err(ProcessingError::QueueClosed.into()),
        }
    }

    /// Wait for the next job. Returns `None` once the queue is closed and
    /// drained.
    pub async fn dequeue(&self) -> Option<ProcessingJob> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await
    }

    /// Close the queue. No new jobs may be enqueued; already-buffered jobs
    /// are still delivered before dequeues start resolving to `None`.
    pub fn close(&self) {
        let mut sender = self.sender.lock().unwrap();
        if sender.take().is_some() {
            debug!("Job queue closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().unwrap().is_none()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}
