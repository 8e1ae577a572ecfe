//! Concurrent request dispatch
//!
//! This module turns compiled request descriptors into executed jobs:
//!
//! - [`materialize`] resolves one descriptor against the server's Root DSE
//!   into its protocol-ready shape (columns, targets, encoded controls)
//! - [`queue`] holds the run's jobs, completely filled before consumption
//! - [`worker`] drains the queue, executing each job behind a fault boundary
//! - [`coordinator`] owns the run state, the pool lifecycle and the final
//!   accounting
//!
//! Jobs are isolated: each opens its own directory session and output sink,
//! and a failing or panicking job never affects the others. The run as a
//! whole succeeds only if every dispatched job succeeded.

pub mod coordinator;
pub mod materialize;
pub mod queue;
pub mod worker;

pub use coordinator::{run, RunContext, RunReport};
pub use materialize::{
    materialize, CompiledRequest, OID_SHOW_DEACTIVATED_LINK, OID_SHOW_DELETED, OID_SHOW_RECYCLED,
};
pub use queue::{JobQueue, JobReceiver};
pub use worker::execute_request;
