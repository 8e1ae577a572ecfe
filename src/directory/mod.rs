//! Directory protocol access
//!
//! This module defines the seam between the crawler core and the wire
//! protocol: a `DirectoryService` hands out one `DirectorySession` per job,
//! sessions bind and run searches, and searches yield entries through an
//! `EntryStream`. The production implementation in [`client`] speaks LDAP
//! via `ldap3`; tests substitute in-memory fakes.
//!
//! Server capability data (supported control OIDs, naming-context DNs) is
//! fetched once per run from the Root DSE and drives control gating and base
//! resolution during materialization.

pub mod client;

use crate::error::DirectoryResult;
use crate::requests::SearchScope;
use std::collections::{HashMap, HashSet};

pub use client::LdapDirectory;

/// Attribute name of an entry's distinguished name, always the first output
/// column
pub const ATTR_DISTINGUISHED_NAME: &str = "distinguishedName";

/// Server metadata from the Root DSE
#[derive(Debug, Clone, Default)]
pub struct RootDse {
    /// Every naming context the server hosts
    pub naming_contexts: Vec<String>,

    /// The default (domain) naming context
    pub default_naming_context: Option<String>,

    /// The configuration naming context
    pub configuration_naming_context: Option<String>,

    /// The schema naming context
    pub schema_naming_context: Option<String>,

    /// OIDs of the controls the server advertises
    pub supported_controls: HashSet<String>,

    /// The LDAP service name, carrying the domain DNS name
    pub ldap_service_name: Option<String>,
}

impl RootDse {
    /// Whether the server advertises support for a control OID
    pub fn supports_control(&self, oid: &str) -> bool {
        self.supported_controls.contains(oid)
    }
}

/// A protocol control ready for transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolControl {
    pub oid: String,
    pub critical: bool,
    /// BER-encoded value payload, if the control carries one
    pub value: Option<Vec<u8>>,
}

/// Parameters of one search operation
#[derive(Debug)]
pub struct SearchSpec<'a> {
    pub base: &'a str,
    pub scope: SearchScope,
    pub filter: &'a str,
    /// Attribute names requested from the server (the DN column excluded)
    pub attrs: &'a [String],
    pub server_controls: &'a [ProtocolControl],
    pub client_controls: &'a [ProtocolControl],
}

/// One returned directory entry: its DN plus name-indexed raw values
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub dn: String,
    pub values: HashMap<String, Vec<Vec<u8>>>,
}

impl DirEntry {
    /// Look up an attribute's values by name. Directory attribute names are
    /// case-insensitive, so fall back to a case-folded scan when the exact
    /// key is absent.
    pub fn values_of(&self, name: &str) -> Option<&Vec<Vec<u8>>> {
        if let Some(values) = self.values.get(name) {
            return Some(values);
        }
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

/// Pull-based enumeration of search results
pub trait EntryStream {
    /// The next entry, or `None` once the search is exhausted.
    fn next_entry(&mut self) -> DirectoryResult<Option<DirEntry>>;
}

/// One live, bindable protocol session
pub trait DirectorySession {
    /// Read the server's Root DSE metadata.
    fn root_dse(&mut self) -> DirectoryResult<RootDse>;

    /// (Re)bind the session ahead of searching under `target`.
    fn bind(&mut self, target: &str) -> DirectoryResult<()>;

    /// Start a search and stream its entries.
    fn search<'a>(&'a mut self, spec: &SearchSpec<'_>)
        -> DirectoryResult<Box<dyn EntryStream + 'a>>;
}

/// Factory for protocol sessions; one session is opened per job
pub trait DirectoryService: Send + Sync {
    type Session: DirectorySession;

    fn connect(&self) -> DirectoryResult<Self::Session>;
}
