//! LDAP implementation of the directory seam
//!
//! One synchronous `LdapConn` per session; each job opens its own session, so
//! no connection is ever shared between workers. Searches run through the
//! paged-results adapter so large result sets stream instead of hitting the
//! server-side size limit.

use crate::directory::{
    DirEntry, DirectoryService, DirectorySession, EntryStream, ProtocolControl, RootDse,
    SearchSpec,
};
use crate::error::{DirectoryError, DirectoryResult};
use crate::requests::SearchScope;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::controls::RawControl;
use ldap3::{LdapConn, LdapConnSettings, Scope, SearchEntry};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, trace};

/// Page size for the paged-results control
const PAGE_SIZE: i32 = 500;

/// Connection timeout for new sessions
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Root DSE attributes we extract
const ROOT_DSE_ATTRS: [&str; 6] = [
    "namingContexts",
    "defaultNamingContext",
    "configurationNamingContext",
    "schemaNamingContext",
    "supportedControl",
    "ldapServiceName",
];

/// LDAP-backed session factory
pub struct LdapDirectory {
    server: String,
    port: u16,
    username: Option<String>,
    password: Option<String>,
}

impl LdapDirectory {
    pub fn new(
        server: impl Into<String>,
        port: u16,
        username: Option<String>,
        password: Option<String>,
    ) -> Self {
        Self {
            server: server.into(),
            port,
            username,
            password,
        }
    }

    fn url(&self) -> String {
        format!("ldap://{}:{}", self.server, self.port)
    }
}

impl DirectoryService for LdapDirectory {
    type Session = LdapSession;

    fn connect(&self) -> DirectoryResult<LdapSession> {
        let settings = LdapConnSettings::new().set_conn_timeout(CONNECT_TIMEOUT);
        let conn = LdapConn::with_settings(settings, &self.url()).map_err(|e| {
            DirectoryError::ConnectFailed {
                server: self.url(),
                reason: e.to_string(),
            }
        })?;

        debug!(server = %self.url(), "LDAP connection established");

        Ok(LdapSession {
            conn,
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

/// One live LDAP connection
pub struct LdapSession {
    conn: LdapConn,
    username: Option<String>,
    password: Option<String>,
}

impl DirectorySession for LdapSession {
    fn root_dse(&mut self) -> DirectoryResult<RootDse> {
        let result = self
            .conn
            .search("", Scope::Base, "(objectClass=*)", ROOT_DSE_ATTRS)
            .and_then(|r| r.success())
            .map_err(|e| DirectoryError::RootDse(e.to_string()))?;

        let entry = result
            .0
            .into_iter()
            .next()
            .ok_or_else(|| DirectoryError::RootDse("server returned no entry".into()))?;
        let entry = SearchEntry::construct(entry);

        let single = |attr: &str| {
            entry
                .attrs
                .get(attr)
                .and_then(|v| v.first())
                .cloned()
        };

        Ok(RootDse {
            naming_contexts: entry.attrs.get("namingContexts").cloned().unwrap_or_default(),
            default_naming_context: single("defaultNamingContext"),
            configuration_naming_context: single("configurationNamingContext"),
            schema_naming_context: single("schemaNamingContext"),
            supported_controls: entry
                .attrs
                .get("supportedControl")
                .map(|v| v.iter().cloned().collect())
                .unwrap_or_default(),
            ldap_service_name: single("ldapServiceName"),
        })
    }

    fn bind(&mut self, target: &str) -> DirectoryResult<()> {
        trace!(target, "Binding");
        let (dn, password) = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => (user.as_str(), pass.as_str()),
            // Anonymous bind when no explicit credentials were given
            _ => ("", ""),
        };

        self.conn
            .simple_bind(dn, password)
            .and_then(|r| r.success())
            .map_err(|e| DirectoryError::BindFailed {
                target: target.to_string(),
                reason: e.to_string(),
            })?;

        Ok(())
    }

    fn search<'a>(
        &'a mut self,
        spec: &SearchSpec<'_>,
    ) -> DirectoryResult<Box<dyn EntryStream + 'a>> {
        // Only server-side controls travel on the wire; the client-side list
        // has no ldap3 counterpart.
        if !spec.client_controls.is_empty() {
            trace!(
                count = spec.client_controls.len(),
                "Client-side controls have no wire representation"
            );
        }

        let controls: Vec<RawControl> = spec
            .server_controls
            .iter()
            .map(|c| RawControl {
                ctype: c.oid.clone(),
                crit: c.critical,
                val: c.value.clone(),
            })
            .collect();

        let adapters: Vec<Box<dyn Adapter<String, Vec<String>>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(PAGE_SIZE)),
        ];
        let attrs: Vec<String> = spec.attrs.to_vec();
        let stream = self
            .conn
            .with_controls(controls)
            .streaming_search_with(
                adapters,
                spec.base,
                scope_to_ldap(spec.scope),
                spec.filter,
                attrs,
            )
            .map_err(|e| DirectoryError::SearchFailed {
                base: spec.base.to_string(),
                filter: spec.filter.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(LdapSearchStream {
            inner: Some(stream),
            base: spec.base.to_string(),
            filter: spec.filter.to_string(),
        }))
    }
}

/// Streaming search wrapper yielding converted entries
struct LdapSearchStream<'a> {
    inner: Option<ldap3::EntryStream<'a, 'a, String, Vec<String>>>,
    base: String,
    filter: String,
}

impl LdapSearchStream<'_> {
    fn protocol_err(&self, reason: String) -> DirectoryError {
        DirectoryError::SearchFailed {
            base: self.base.clone(),
            filter: self.filter.clone(),
            reason,
        }
    }
}

impl EntryStream for LdapSearchStream<'_> {
    fn next_entry(&mut self) -> DirectoryResult<Option<DirEntry>> {
        let stream = match self.inner.as_mut() {
            Some(stream) => stream,
            None => return Ok(None),
        };

        match stream.next() {
            Ok(Some(entry)) => Ok(Some(convert_entry(SearchEntry::construct(entry)))),
            Ok(None) => {
                // Exhausted: surface any deferred search failure
                let mut stream = self.inner.take().expect("stream present");
                stream
                    .result()
                    .success()
                    .map_err(|e| self.protocol_err(e.to_string()))?;
                Ok(None)
            }
            Err(e) => Err(self.protocol_err(e.to_string())),
        }
    }
}

fn scope_to_ldap(scope: SearchScope) -> Scope {
    match scope {
        SearchScope::Base => Scope::Base,
        SearchScope::OneLevel => Scope::OneLevel,
        SearchScope::Subtree => Scope::Subtree,
    }
}

/// Flatten an ldap3 entry into name-indexed raw byte values. Values the
/// server sent as valid UTF-8 and values it sent as raw octets end up in the
/// same map, since the formatters decide the rendering per declared type.
fn convert_entry(entry: SearchEntry) -> DirEntry {
    let mut values: HashMap<String, Vec<Vec<u8>>> = HashMap::new();

    for (name, attr_values) in entry.attrs {
        values
            .entry(name)
            .or_default()
            .extend(attr_values.into_iter().map(String::into_bytes));
    }
    for (name, attr_values) in entry.bin_attrs {
        values.entry(name).or_default().extend(attr_values);
    }

    DirEntry {
        dn: entry.dn,
        values,
    }
}

/// Helper for [`ProtocolControl`] conversion in tests and callers that need
/// the raw form directly.
pub fn to_raw_control(control: &ProtocolControl) -> RawControl {
    RawControl {
        ctype: control.oid.clone(),
        crit: control.critical,
        val: control.value.clone(),
    }
}
