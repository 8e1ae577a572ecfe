//! Error types for ldap-crawler
//!
//! This module defines the error hierarchy for the three failure tiers:
//! - Decode/configuration errors: fatal, abort before any job is dispatched
//! - Per-job runtime errors: abort only the failing job, counted and logged
//! - Infrastructure errors (thread spawn, output folders): fatal
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Per-job errors travel as values returned from job execution, never as
//!   unwinding control flow
//! - Errors carry the request name where one is known

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for the ldap-crawler application
#[derive(Error, Debug)]
pub enum CrawlerError {
    /// Request document decode errors
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Directory protocol errors (fatal only for the initial connection)
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Worker/concurrency errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// I/O errors (output folder creation, log file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request document decode errors
///
/// All of these are fatal for the whole run: the compiler produces either a
/// complete descriptor array or nothing.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Failed to read the document file
    #[error("Cannot read request file '{path}': {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    /// The document is not valid JSON
    #[error("Request file is not valid JSON: {0}")]
    Syntax(#[from] serde_json::Error),

    /// The root element is not an object
    #[error("Request document root is not an object")]
    RootNotObject,

    /// A field does not have the expected JSON shape
    #[error("Request '{request}': field '{field}' {reason}")]
    BadField {
        request: String,
        field: &'static str,
        reason: String,
    },

    /// A required field is absent
    #[error("Request '{request}': missing required field '{field}'")]
    MissingField {
        request: String,
        field: &'static str,
    },

    /// An enumerated token is outside its closed vocabulary
    #[error("Request '{request}': invalid {what} <{token}>")]
    InvalidToken {
        request: String,
        what: &'static str,
        token: String,
    },

    /// A control value was given before its value type was declared
    #[error("Request '{request}': control value <{value}> specified without a type ('valuetype' must precede 'value')")]
    ValueBeforeType { request: String, value: String },

    /// A control declared a value type but carried no value
    #[error("Request '{request}': control '{control}' declares a value type but no value")]
    ValueMissing { request: String, control: String },

    /// An int-typed value is not numeric
    #[error("Request '{request}': value <{value}> of type 'int' is not numeric")]
    NotNumeric { request: String, value: String },

    /// A bin-typed value is not valid hex
    #[error("Request '{request}': value <{value}> of type 'bin' is not valid hex")]
    NotHex { request: String, value: String },
}

/// Directory protocol errors
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Connection to the server failed
    #[error("Failed to connect to LDAP server '{server}': {reason}")]
    ConnectFailed { server: String, reason: String },

    /// Bind failed
    #[error("Failed to bind to '{target}': {reason}")]
    BindFailed { target: String, reason: String },

    /// Search operation failed
    #[error("Search <{filter}> on '{base}' failed: {reason}")]
    SearchFailed {
        base: String,
        filter: String,
        reason: String,
    },

    /// Failed to read the server's Root DSE
    #[error("Failed to read Root DSE: {0}")]
    RootDse(String),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid worker count
    #[error("Invalid thread count {count}: must be between 1 and {max}")]
    InvalidWorkerCount { count: usize, max: usize },

    /// Username and password must be given together
    #[error("You must specify a username AND a password to use explicit authentication")]
    CredentialPair,

    /// Output directory missing or not a directory
    #[error("Invalid output directory '{path}': {reason}")]
    InvalidOutputDir { path: PathBuf, reason: String },

    /// No domain DNS name available to derive the run layout
    #[error("Failed to retrieve the domain DNS name, and none was explicitly specified")]
    MissingDnsName,
}

/// Worker thread errors
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Worker thread could not be spawned
    #[error("Failed to spawn worker {id}: {reason}")]
    SpawnFailed { id: usize, reason: String },

    /// Worker panicked outside the job fault boundary
    #[error("Worker {id} panicked")]
    Panicked { id: usize },
}

/// Per-job runtime errors (tier 2)
///
/// Any of these aborts the failing job only; the rest of the run proceeds.
#[derive(Error, Debug)]
pub enum JobError {
    /// Directory protocol failure during the job
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// A request-specific control is not advertised by the server
    #[error("Using a non-supported LDAP control <{name}:{oid}>")]
    UnsupportedControl { name: String, oid: String },

    /// Control value encoding failed
    #[error("Failed to BER-encode value for LDAP control <{name}:{oid}>: {source}")]
    Encode {
        name: String,
        oid: String,
        source: BerError,
    },

    /// A naming-context shortcut has no resolution path
    #[error("Naming context shortcut <{shortcut}> is not implemented")]
    NamingContextUnresolved { shortcut: &'static str },

    /// The Root DSE does not report the required naming context
    #[error("Server reports no <{context}> naming context")]
    NamingContextMissing { context: &'static str },

    /// Record field count diverged from the sink's column count
    #[error("Incoherent record count: expected {expected} fields but {actual} provided")]
    ColumnMismatch { expected: usize, actual: usize },

    /// Tabular sink failure
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The job panicked; caught at the fault boundary
    #[error("Abnormal termination")]
    Panicked,
}

/// Control value encoding errors
#[derive(Error, Debug)]
pub enum BerError {
    /// Binary control values are recognized but not implemented
    #[error("BER encoding of 'bin' values is not implemented")]
    BinaryUnsupported,
}

/// Tabular sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    /// CSV writer error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O error creating or flushing the output file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for CrawlerError
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for DecodeError
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Result type alias for DirectoryError
pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;

/// Result type alias for JobError
pub type JobResult<T> = std::result::Result<T, JobError>;

/// Outcome of executing a single compiled job
#[derive(Debug)]
pub enum JobOutcome {
    /// The request completed and its output file is whole
    Succeeded {
        name: String,
        entries: u64,
        duration: Duration,
    },

    /// The request failed; other jobs are unaffected
    Failed { name: String, error: JobError },
}

impl JobOutcome {
    /// Returns true if this outcome represents success
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Succeeded { .. })
    }

    /// Returns the request name associated with this outcome
    pub fn name(&self) -> &str {
        match self {
            JobOutcome::Succeeded { name, .. } => name,
            JobOutcome::Failed { name, .. } => name,
        }
    }
}
