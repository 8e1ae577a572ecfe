//! ldap-crawler - Batch LDAP Directory Crawler
//!
//! A tool for executing a batch of JSON-described LDAP requests against a
//! directory server and exporting each request's results to CSV, designed
//! for directory-wide audit dumps.
//!
//! # Features
//!
//! - **Declarative requests**: Search base, scope, filter, typed attribute
//!   list and protocol controls are described in a JSON document and
//!   compiled into a strictly-typed model before anything runs.
//!
//! - **Parallel execution**: A bounded worker-thread pool drains the request
//!   queue; every job owns its own LDAP connection and output file, and a
//!   failing job never disturbs the others.
//!
//! - **Capability-aware controls**: Requested controls are gated against the
//!   server's advertised OIDs, and control values are BER-encoded for
//!   transport. A baseline set of visibility controls (recycled, deleted,
//!   deactivated-link objects) is attached to every request.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      requests.json                               │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ compile (all-or-nothing)
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │               Vec<RequestDescriptor>  ──►  Job Queue             │
//! │                   (filled before any worker starts)              │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!       ┌───────────────┬───────┴───────┬───────────────┐
//!       ▼               ▼               ▼               ▼
//! ┌──────────┐   ┌──────────┐    ┌──────────┐    ┌──────────┐
//! │ Worker 1 │   │ Worker 2 │    │ Worker 3 │ .. │ Worker N │
//! │ ldap conn│   │ ldap conn│    │ ldap conn│    │ ldap conn│
//! └────┬─────┘   └────┬─────┘    └────┬─────┘    └────┬─────┘
//!      │ materialize + bind + paged search + format    │
//!      ▼              ▼               ▼                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │      <out>/<YYYYMMDD>_<domain>/Ldap/<prefix>_LDAP_<req>.csv      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Dump all requests of a document against a domain controller
//! ldap-crawler -s dc01.corp.local -j requests.json -o ./dumps
//!
//! # Explicit credentials, a request sublist and 8 workers
//! ldap-crawler -s dc01 -l 'CORP\auditor' -p secret \
//!     -j requests.json -o ./dumps -r users,groups -t 8
//! ```

pub mod ber;
pub mod config;
pub mod crawler;
pub mod directory;
pub mod error;
pub mod format;
pub mod output;
pub mod requests;

pub use config::{CliArgs, CrawlConfig};
pub use crawler::{run, RunContext, RunReport};
pub use directory::{DirectoryService, DirectorySession, LdapDirectory, RootDse};
pub use error::{CrawlerError, JobError, Result};
pub use requests::{load_requests, RequestDescriptor};
