//! Output layout and tabular sinks
//!
//! One run produces a dated folder under the output directory:
//!
//! ```text
//! <output_dir>/
//!   <YYYYMMDD>_<domain>/
//!     Ldap/
//!       <prefix>_LDAP_<request>.csv     one per executed request
//!     Logs/
//!       <prefix>_LDAP.log               per-run log artifact
//! ```
//!
//! Workers write through the `RecordSink`/`SinkProvider` seam; the production
//! implementation is a CSV writer, tests substitute in-memory sinks.

use crate::error::SinkError;
use chrono::Utc;
use csv::WriterBuilder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Subfolder holding the per-request tabular files
const RESULTS_DIR: &str = "Ldap";

/// Subfolder holding the run log
const LOGS_DIR: &str = "Logs";

/// Keyword embedded in every produced file name
const OUTFILES_KEYWORD: &str = "LDAP";

/// File extension of the tabular outputs
const OUTFILES_EXT: &str = "csv";

/// File extension of the log artifact
const LOGFILE_EXT: &str = "log";

/// Derive the default outfile prefix: the first two characters of the domain
/// DNS name, uppercased.
pub fn default_prefix(domain_dns_name: &str) -> String {
    domain_dns_name
        .chars()
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}

/// The on-disk layout of one run
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    /// Create the run folder `<output_dir>/<YYYYMMDD>_<domain>` and its
    /// subfolders. Failure here is fatal for the run.
    pub fn create(output_dir: &Path, domain: &str) -> io::Result<Self> {
        let stamp = Utc::now().format("%Y%m%d");
        let root = output_dir.join(format!("{stamp}_{domain}"));

        fs::create_dir_all(root.join(RESULTS_DIR))?;
        fs::create_dir_all(root.join(LOGS_DIR))?;

        debug!(root = %root.display(), "Run folders created");
        Ok(Self { root })
    }

    /// Root folder of this run
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the tabular file for one request
    pub fn table_path(&self, prefix: &str, request_name: &str) -> PathBuf {
        self.root.join(RESULTS_DIR).join(format!(
            "{prefix}_{OUTFILES_KEYWORD}_{request_name}.{OUTFILES_EXT}"
        ))
    }

    /// Path of the run's log artifact
    pub fn log_path(&self, prefix: &str) -> PathBuf {
        self.root
            .join(LOGS_DIR)
            .join(format!("{prefix}_{OUTFILES_KEYWORD}.{LOGFILE_EXT}"))
    }
}

/// Destination of one request's records
pub trait RecordSink {
    /// Number of columns declared when the sink was opened
    fn column_count(&self) -> usize;

    /// Append one record; `fields.len()` has already been checked against
    /// [`column_count`](Self::column_count) by the caller.
    fn write_record(&mut self, fields: &[String]) -> Result<(), SinkError>;

    /// Flush and close the sink.
    fn finish(&mut self) -> Result<(), SinkError>;
}

/// Factory opening one sink per executed request
pub trait SinkProvider: Send + Sync {
    type Sink: RecordSink;

    fn open(&self, request_name: &str, columns: &[String]) -> Result<Self::Sink, SinkError>;
}

/// CSV-backed sink provider writing under the run layout
pub struct CsvSinkProvider {
    layout: RunLayout,
    prefix: String,
}

impl CsvSinkProvider {
    pub fn new(layout: RunLayout, prefix: impl Into<String>) -> Self {
        Self {
            layout,
            prefix: prefix.into(),
        }
    }
}

impl SinkProvider for CsvSinkProvider {
    type Sink = CsvSink;

    fn open(&self, request_name: &str, columns: &[String]) -> Result<CsvSink, SinkError> {
        let path = self.layout.table_path(&self.prefix, request_name);
        let mut writer = WriterBuilder::new().from_path(&path)?;
        writer.write_record(columns)?;

        debug!(path = %path.display(), "Output file opened");
        Ok(CsvSink {
            writer,
            columns: columns.len(),
        })
    }
}

/// One open CSV output file
pub struct CsvSink {
    writer: csv::Writer<File>,
    columns: usize,
}

impl RecordSink for CsvSink {
    fn column_count(&self) -> usize {
        self.columns
    }

    fn write_record(&mut self, fields: &[String]) -> Result<(), SinkError> {
        self.writer.write_record(fields)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_prefix() {
        assert_eq!(default_prefix("corp.local"), "CO");
        assert_eq!(default_prefix("x"), "X");
        assert_eq!(default_prefix(""), "");
    }

    #[test]
    fn test_layout_paths() {
        let dir = tempdir().unwrap();
        let layout = RunLayout::create(dir.path(), "corp.local").unwrap();

        assert!(layout.root().join(RESULTS_DIR).is_dir());
        assert!(layout.root().join(LOGS_DIR).is_dir());

        let table = layout.table_path("CO", "users");
        assert!(table.ends_with("Ldap/CO_LDAP_users.csv"));

        let log = layout.log_path("CO");
        assert!(log.ends_with("Logs/CO_LDAP.log"));

        let name = layout.root().file_name().unwrap().to_string_lossy();
        assert!(name.ends_with("_corp.local"));
        assert_eq!(name.len(), "YYYYMMDD_corp.local".len());
    }

    #[test]
    fn test_csv_sink_round_trip() {
        let dir = tempdir().unwrap();
        let layout = RunLayout::create(dir.path(), "corp.local").unwrap();
        let provider = CsvSinkProvider::new(layout.clone(), "CO");

        let columns = vec!["distinguishedName".to_string(), "cn".to_string()];
        let mut sink = provider.open("users", &columns).unwrap();
        assert_eq!(sink.column_count(), 2);

        sink.write_record(&["CN=Alice,DC=corp".into(), "Alice".into()])
            .unwrap();
        sink.finish().unwrap();

        let written = fs::read_to_string(layout.table_path("CO", "users")).unwrap();
        let mut lines = written.lines();
        assert_eq!(lines.next().unwrap(), "distinguishedName,cn");
        assert_eq!(lines.next().unwrap(), "\"CN=Alice,DC=corp\",Alice");
    }
}
