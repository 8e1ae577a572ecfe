//! Configuration types for ldap-crawler
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::error::ConfigError;
use clap::Parser;
use std::path::PathBuf;

/// Default LDAP port
pub const DEFAULT_LDAP_PORT: u16 = 389;

/// Maximum worker count (the original tool's simultaneous-wait ceiling)
pub const MAX_WORKERS: usize = 64;

/// Batch LDAP directory crawler with CSV output
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ldap-crawler",
    version,
    about = "Batch LDAP directory crawler with CSV output",
    long_about = "Executes a batch of JSON-described LDAP requests against a directory \
                  server in parallel and exports each request's results to a CSV file.\n\n\
                  Requests are read from a JSON document mapping request names to a \
                  description, a search base, scope, filter, typed attribute list and \
                  optional protocol controls.",
    after_help = "EXAMPLES:\n    \
        ldap-crawler -s dc01.corp.local -j requests.json -o ./dumps\n    \
        ldap-crawler -s 10.0.0.5 -n 3268 -l 'CORP\\auditor' -p secret -j requests.json -o ./dumps\n    \
        ldap-crawler -s dc01 -j requests.json -o ./dumps -r users,groups -t 8 -v debug"
)]
pub struct CliArgs {
    /// LDAP server to dump information from
    #[arg(short = 's', long, value_name = "SERVER")]
    pub server: String,

    /// LDAP port
    #[arg(short = 'n', long, default_value_t = DEFAULT_LDAP_PORT, value_name = "PORT")]
    pub port: u16,

    /// Username for explicit authentication
    #[arg(short = 'l', long, value_name = "USERNAME")]
    pub username: Option<String>,

    /// Password for explicit authentication
    #[arg(short = 'p', long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// Explicit domain DNS name (default: resolved from the Root DSE)
    #[arg(short = 'd', long, value_name = "DNS_NAME")]
    pub dns_name: Option<String>,

    /// JSON file containing the LDAP request descriptions
    #[arg(short = 'j', long, value_name = "JSONFILE")]
    pub requests_file: PathBuf,

    /// Output directory
    #[arg(short = 'o', long, value_name = "OUTPUTDIR")]
    pub output_dir: PathBuf,

    /// Sublist of request names to execute (comma separated)
    #[arg(short = 'r', long, value_name = "REQUESTS")]
    pub requests: Option<String>,

    /// Number of worker threads
    #[arg(short = 't', long, default_value_t = default_workers(), value_name = "NUM")]
    pub threads: usize,

    /// Prefix outfiles with an arbitrary value (default: 2 first chars of the
    /// domain name)
    #[arg(short = 'c', long, value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'v', long, default_value = "warn", value_name = "LEVEL")]
    pub log_level: String,

    /// Log file (default: <run folder>/Logs/<prefix>_LDAP.log)
    #[arg(short = 'f', long, value_name = "LOGFILE")]
    pub log_file: Option<PathBuf>,
}

fn default_workers() -> usize {
    num_cpus::get().min(MAX_WORKERS)
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// LDAP server host
    pub server: String,

    /// LDAP port
    pub port: u16,

    /// Credentials for explicit authentication; both or neither
    pub username: Option<String>,
    pub password: Option<String>,

    /// Explicit domain DNS name
    pub dns_name: Option<String>,

    /// Path of the request document
    pub requests_file: PathBuf,

    /// Output directory (must exist)
    pub output_dir: PathBuf,

    /// Request-name sublist; empty means all
    pub request_sublist: Vec<String>,

    /// Worker pool size
    pub worker_count: usize,

    /// Explicit outfile prefix
    pub prefix: Option<String>,

    /// Console and logfile verbosity
    pub log_level: String,

    /// Explicit log file path
    pub log_file: Option<PathBuf>,
}

impl CrawlConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        // Explicit authentication needs both halves
        if args.username.is_some() != args.password.is_some() {
            return Err(ConfigError::CredentialPair);
        }

        if args.threads == 0 || args.threads > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.threads,
                max: MAX_WORKERS,
            });
        }

        if !args.output_dir.is_dir() {
            return Err(ConfigError::InvalidOutputDir {
                path: args.output_dir.clone(),
                reason: "not an existing directory".into(),
            });
        }

        let request_sublist = args
            .requests
            .as_deref()
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            server: args.server,
            port: args.port,
            username: args.username,
            password: args.password,
            dns_name: args.dns_name,
            requests_file: args.requests_file,
            output_dir: args.output_dir,
            request_sublist,
            worker_count: args.threads,
            prefix: args.prefix,
            log_level: args.log_level,
            log_file: args.log_file,
        })
    }

    /// Domain label used for the run folder: the explicit DNS name, falling
    /// back to the server host.
    pub fn domain_label(&self) -> &str {
        self.dns_name.as_deref().unwrap_or(&self.server)
    }
}
