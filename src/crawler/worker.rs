//! Worker logic: draining the job queue and executing requests
//!
//! Each worker pulls compiled jobs off the shared queue until it is empty.
//! A job opens its own directory session and its own output sink; nothing is
//! shared between in-flight jobs except the queue and the success counter.
//!
//! Job execution is wrapped in a fault boundary: errors come back as values,
//! and a panic inside a job is caught, logged with the request's name, and
//! converted into a failed outcome. Neither ever disturbs the pool or the
//! other jobs.

use crate::crawler::coordinator::RunContext;
use crate::crawler::materialize::materialize;
use crate::directory::{DirectoryService, DirectorySession, SearchSpec};
use crate::error::{JobError, JobOutcome, JobResult};
use crate::format::format_record;
use crate::output::{RecordSink, SinkProvider};
use crate::requests::RequestDescriptor;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Drain the queue until it is empty, recording each job's outcome.
pub fn worker_loop<S, P>(id: usize, ctx: &RunContext<S, P>)
where
    S: DirectoryService,
    P: SinkProvider,
{
    debug!(worker = id, "Worker starting");

    while let Some(descriptor) = ctx.queue.next_job() {
        debug!(worker = id, request = %descriptor.name, "Request picked up");

        match run_job(&descriptor, ctx) {
            JobOutcome::Succeeded {
                name,
                entries,
                duration,
            } => {
                ctx.succeeded.fetch_add(1, Ordering::Relaxed);
                info!(
                    request = %name,
                    count = entries,
                    secs = duration.as_secs_f64(),
                    "Request completed"
                );
            }
            JobOutcome::Failed { name, error } => {
                warn!(request = %name, error = %error, "Request failed");
            }
        }
    }

    debug!(worker = id, "Worker exiting");
}

/// Fault boundary around one job.
fn run_job<S, P>(descriptor: &RequestDescriptor, ctx: &RunContext<S, P>) -> JobOutcome
where
    S: DirectoryService,
    P: SinkProvider,
{
    let started = Instant::now();

    match panic::catch_unwind(AssertUnwindSafe(|| execute_request(descriptor, ctx))) {
        Ok(Ok(entries)) => JobOutcome::Succeeded {
            name: descriptor.name.clone(),
            entries,
            duration: started.elapsed(),
        },
        Ok(Err(error)) => JobOutcome::Failed {
            name: descriptor.name.clone(),
            error,
        },
        Err(_) => JobOutcome::Failed {
            name: descriptor.name.clone(),
            error: JobError::Panicked,
        },
    }
}

/// Execute one request end to end: materialize, open the sink, then bind and
/// search every resolved target, writing one record per returned entry.
pub fn execute_request<S, P>(
    descriptor: &RequestDescriptor,
    ctx: &RunContext<S, P>,
) -> JobResult<u64>
where
    S: DirectoryService,
    P: SinkProvider,
{
    info!(request = %descriptor.name, descr = %descriptor.description, "Starting request");

    let compiled = materialize(descriptor, &ctx.root_dse)?;
    let mut sink = ctx.sinks.open(&descriptor.name, &compiled.columns)?;
    let mut session = ctx.service.connect()?;

    let mut total = 0u64;
    for target in &compiled.targets {
        session.bind(target)?;

        let spec = SearchSpec {
            base: target,
            scope: descriptor.scope,
            filter: &descriptor.filter,
            attrs: &compiled.search_attrs,
            server_controls: &compiled.server_controls,
            client_controls: &compiled.client_controls,
        };

        let mut stream = session.search(&spec)?;
        while let Some(entry) = stream.next_entry()? {
            let record = format_record(&entry, &descriptor.attributes);
            if record.len() != sink.column_count() {
                return Err(JobError::ColumnMismatch {
                    expected: sink.column_count(),
                    actual: record.len(),
                });
            }
            sink.write_record(&record)?;
            total += 1;
        }
    }

    sink.finish()?;
    Ok(total)
}
