//! Run coordination: sublist filtering, worker pool lifecycle, accounting
//!
//! The coordinator owns the run's shared state (job queue and success
//! counter) in an explicit `RunContext` passed to every worker; the state's
//! lifetime is the run's lifetime. All jobs are enqueued before any worker
//! starts; the caller blocks until every worker has exited, then reports.

use crate::crawler::queue::{JobQueue, JobReceiver};
use crate::crawler::worker::worker_loop;
use crate::directory::{DirectoryService, RootDse};
use crate::error::{Result, WorkerError};
use crate::output::SinkProvider;
use crate::requests::RequestDescriptor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Shared state of one run, injected into every worker
pub struct RunContext<S: DirectoryService, P: SinkProvider> {
    pub service: S,
    pub sinks: P,
    pub root_dse: RootDse,
    pub queue: JobReceiver,
    pub succeeded: AtomicU64,
}

/// Final accounting of a run
#[derive(Debug)]
pub struct RunReport {
    /// Descriptors compiled from the document
    pub total: usize,

    /// Descriptors skipped by the request-name sublist
    pub filtered: usize,

    /// Jobs actually enqueued
    pub dispatched: usize,

    /// Jobs that completed successfully
    pub succeeded: u64,

    /// Wall time of the dispatch phase
    pub duration: Duration,
}

impl RunReport {
    /// Number of dispatched jobs that failed
    pub fn failed(&self) -> u64 {
        self.dispatched as u64 - self.succeeded
    }

    /// Overall success: every dispatched job succeeded
    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

/// Execute every descriptor (minus the sublist-filtered ones) across a pool
/// of `worker_count` threads and account for the outcomes.
///
/// With a pool size of 1 the jobs run synchronously on the caller thread, in
/// descriptor order; behavior is otherwise identical.
pub fn run<S, P>(
    descriptors: Vec<RequestDescriptor>,
    sublist: &[String],
    worker_count: usize,
    service: S,
    sinks: P,
    root_dse: RootDse,
) -> Result<RunReport>
where
    S: DirectoryService,
    P: SinkProvider,
{
    let started = Instant::now();
    let total = descriptors.len();

    // Sublist filtering happens before enqueuing: skipped descriptors never
    // become jobs.
    let mut jobs = Vec::with_capacity(total);
    for descriptor in descriptors {
        if !sublist.is_empty() && !sublist.iter().any(|n| n == &descriptor.name) {
            warn!(request = %descriptor.name, "Skipping");
            continue;
        }
        jobs.push(Arc::new(descriptor));
    }

    let dispatched = jobs.len();
    let filtered = total - dispatched;
    let queue = JobQueue::fill(jobs);

    let ctx = RunContext {
        service,
        sinks,
        root_dse,
        queue: queue.handle(),
        succeeded: AtomicU64::new(0),
    };

    if worker_count <= 1 {
        worker_loop(0, &ctx);
    } else {
        spawn_pool(worker_count, &ctx)?;
    }

    let succeeded = ctx.succeeded.load(Ordering::Relaxed);
    let report = RunReport {
        total,
        filtered,
        dispatched,
        succeeded,
        duration: started.elapsed(),
    };

    info!(
        total = report.total,
        filtered = report.filtered,
        kept = report.dispatched,
        succeeded = report.succeeded,
        failed = report.failed(),
        secs = report.duration.as_secs_f64(),
        "Done"
    );

    Ok(report)
}

/// Spawn the worker pool and block until the queue is drained and every
/// worker has exited.
fn spawn_pool<S, P>(worker_count: usize, ctx: &RunContext<S, P>) -> Result<()>
where
    S: DirectoryService,
    P: SinkProvider,
{
    info!(count = worker_count, "Spawning workers");

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(worker_count);
        for id in 0..worker_count {
            let handle = thread::Builder::new()
                .name(format!("crawler-{id}"))
                .spawn_scoped(scope, move || worker_loop(id, ctx))
                .map_err(|e| WorkerError::SpawnFailed {
                    id,
                    reason: e.to_string(),
                })?;
            handles.push((id, handle));
        }

        for (id, handle) in handles {
            if handle.join().is_err() {
                // Job panics are caught at the job fault boundary; reaching
                // this means the worker loop itself died.
                let err = WorkerError::Panicked { id };
                warn!(error = %err, "Worker failed to join cleanly");
            }
        }

        Ok(())
    })
}
