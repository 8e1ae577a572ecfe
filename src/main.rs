//! ldap-crawler - Batch LDAP Directory Crawler
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use ldap_crawler::config::{CliArgs, CrawlConfig};
use ldap_crawler::crawler;
use ldap_crawler::directory::{DirectorySession, DirectoryService, LdapDirectory};
use ldap_crawler::error::ConfigError;
use ldap_crawler::output::{default_prefix, CsvSinkProvider, RunLayout};
use ldap_crawler::requests::load_requests;
use std::fs::File;
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing::{error, info};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = CliArgs::parse();
    let tee = setup_logging(&args.log_level);

    match run(args, &tee) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(true)` iff every dispatched request succeeded.
fn run(args: CliArgs, tee: &LogTee) -> Result<bool> {
    let config = CrawlConfig::from_args(args).context("Invalid configuration")?;

    info!(
        server = %config.server,
        port = config.port,
        threads = config.worker_count,
        "Start"
    );
    match &config.username {
        Some(user) => info!(username = %user, "LDAP explicit authentication"),
        None => info!("LDAP anonymous bind"),
    }
    if !config.request_sublist.is_empty() {
        info!(requests = ?config.request_sublist, "Requests sublist");
    }

    // Compile the request document; any decode error aborts before dispatch
    info!(file = %config.requests_file.display(), "Reading requests");
    let descriptors =
        load_requests(&config.requests_file).context("Failed to compile request file")?;

    // Initial connection: Root DSE capability data drives materialization
    info!("Connecting to LDAP server...");
    let service = LdapDirectory::new(
        config.server.clone(),
        config.port,
        config.username.clone(),
        config.password.clone(),
    );
    let root_dse = {
        let mut session = service
            .connect()
            .context("Failed to connect to LDAP server")?;
        session
            .root_dse()
            .context("Failed to read server capabilities")?
    };
    for nc in &root_dse.naming_contexts {
        info!(nc = %nc, "Naming context");
    }

    let prefix = match &config.prefix {
        Some(prefix) => prefix.clone(),
        None => {
            let dns_name = config
                .dns_name
                .as_deref()
                .or(root_dse.ldap_service_name.as_deref())
                .ok_or(ConfigError::MissingDnsName)?;
            default_prefix(dns_name)
        }
    };

    // Run folders; failure here is fatal
    let layout = RunLayout::create(&config.output_dir, config.domain_label())
        .context("Failed to create output folders")?;

    // Attach the per-run log artifact now that its location is known
    let log_path = config
        .log_file
        .clone()
        .unwrap_or_else(|| layout.log_path(&prefix));
    let log_file = File::create(&log_path)
        .with_context(|| format!("Failed to create log file '{}'", log_path.display()))?;
    tee.attach(log_file);
    info!(path = %log_path.display(), "Run log attached");

    let sinks = CsvSinkProvider::new(layout, prefix);

    info!("Starting LDAP requests...");
    let report = crawler::run(
        descriptors,
        &config.request_sublist,
        config.worker_count,
        service,
        sinks,
        root_dse,
    )?;

    Ok(report.all_succeeded())
}

fn setup_logging(level: &str) -> LogTee {
    let tee = LogTee::default();
    let filter = EnvFilter::new(format!("ldap_crawler={level},warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(tee.clone())
        .init();

    tee
}

/// Log writer mirroring console output into the run's log artifact once it
/// exists.
#[derive(Clone, Default)]
struct LogTee {
    file: Arc<Mutex<Option<File>>>,
}

impl LogTee {
    fn attach(&self, file: File) {
        *self.file.lock().expect("log tee lock") = Some(file);
    }
}

struct TeeWriter {
    file: Arc<Mutex<Option<File>>>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        if let Some(file) = self.file.lock().expect("log tee lock").as_mut() {
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        if let Some(file) = self.file.lock().expect("log tee lock").as_mut() {
            let _ = file.flush();
        }
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogTee {
    type Writer = TeeWriter;

    fn make_writer(&'a self) -> TeeWriter {
        TeeWriter {
            file: Arc::clone(&self.file),
        }
    }
}
