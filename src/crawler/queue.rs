//! Shared job queue
//!
//! The coordinator fills the queue completely before any worker starts
//! consuming; workers then purely drain it until empty and exit. Because the
//! sending half is dropped after the fill, an empty receive means the run is
//! over, never that more work is coming.
//!
//! A single consumer observes jobs in descriptor order. With several
//! consumers no ordering is guaranteed across workers.

use crate::requests::RequestDescriptor;
use crossbeam_channel::{unbounded, Receiver};
use std::sync::Arc;

/// A work queue prefilled with every job of the run
pub struct JobQueue {
    receiver: Receiver<Arc<RequestDescriptor>>,
    len: usize,
}

impl JobQueue {
    /// Build a queue holding `descriptors` in order. The producing side is
    /// closed before this returns, so consumers only ever drain.
    pub fn fill(descriptors: Vec<Arc<RequestDescriptor>>) -> Self {
        let len = descriptors.len();
        let (sender, receiver) = unbounded();
        for descriptor in descriptors {
            // Send on an unbounded channel we hold both ends of cannot fail
            let _ = sender.send(descriptor);
        }
        drop(sender);

        Self { receiver, len }
    }

    /// Number of jobs the queue was filled with
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if the queue was filled with no jobs
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get a consumer handle (clone one per worker)
    pub fn handle(&self) -> JobReceiver {
        JobReceiver {
            receiver: self.receiver.clone(),
        }
    }
}

/// Handle for draining jobs from the queue
#[derive(Clone)]
pub struct JobReceiver {
    receiver: Receiver<Arc<RequestDescriptor>>,
}

impl JobReceiver {
    /// The next job, or `None` once the queue is exhausted.
    pub fn next_job(&self) -> Option<Arc<RequestDescriptor>> {
        self.receiver.recv().ok()
    }
}
