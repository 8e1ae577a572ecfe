//! Control and attribute materialization
//!
//! Turns one request descriptor plus the server's Root DSE into the concrete,
//! protocol-ready shape of a job: the final column list (DN first), the
//! resolved search targets, and the client/server control lists with
//! BER-encoded values attached.
//!
//! Control inclusion is capability-gated against the server's advertised
//! control OIDs with an asymmetric policy: an unsupported baseline control is
//! logged and dropped, an unsupported request-specific control fails the job.

use crate::ber;
use crate::directory::{ProtocolControl, RootDse, ATTR_DISTINGUISHED_NAME};
use crate::error::{JobError, JobResult};
use crate::requests::{
    BaseSpec, ControlDescriptor, ControlKind, NcShortcut, RequestDescriptor,
};
use tracing::{debug, error};

/// Server-side visibility control: include recycled objects
pub const OID_SHOW_RECYCLED: &str = "1.2.840.113556.1.4.2064";

/// Server-side visibility control: include deleted objects
pub const OID_SHOW_DELETED: &str = "1.2.840.113556.1.4.417";

/// Server-side visibility control: include deactivated links
pub const OID_SHOW_DEACTIVATED_LINK: &str = "1.2.840.113556.1.4.2065";

/// Baseline controls attached to every request.
///
/// SHOW_DELETED is redundant with SHOW_RECYCLED but still listed in case the
/// server does not support the latter.
fn baseline_controls() -> [ControlDescriptor; 3] {
    let server_control = |name: &str, oid: &str| ControlDescriptor {
        name: name.to_string(),
        oid: oid.to_string(),
        kind: ControlKind::Server,
        value: None,
    };

    [
        server_control("LDAP_SERVER_SHOW_RECYCLED_OID", OID_SHOW_RECYCLED),
        server_control("LDAP_SERVER_SHOW_DELETED_OID", OID_SHOW_DELETED),
        server_control(
            "LDAP_SERVER_SHOW_DEACTIVATED_LINK_OID",
            OID_SHOW_DEACTIVATED_LINK,
        ),
    ]
}

/// A request descriptor resolved against server capabilities
#[derive(Debug)]
pub struct CompiledRequest {
    /// Output columns: the DN attribute followed by the declared attributes
    pub columns: Vec<String>,

    /// Attribute names sent to the server (columns without the DN)
    pub search_attrs: Vec<String>,

    /// Resolved base DNs; one entry, or one per naming context for `*`
    pub targets: Vec<String>,

    pub client_controls: Vec<ProtocolControl>,
    pub server_controls: Vec<ProtocolControl>,
}

/// Gating policy for controls the server does not advertise
#[derive(Clone, Copy, PartialEq, Eq)]
enum GatePolicy {
    /// Log and omit (baseline controls)
    Drop,
    /// Fail the job (request-specific controls)
    Fail,
}

/// Materialize one descriptor against the server's Root DSE.
pub fn materialize(descr: &RequestDescriptor, root_dse: &RootDse) -> JobResult<CompiledRequest> {
    let mut columns = Vec::with_capacity(descr.attributes.len() + 1);
    columns.push(ATTR_DISTINGUISHED_NAME.to_string());
    columns.extend(descr.attributes.iter().map(|a| a.name.clone()));
    let search_attrs = columns[1..].to_vec();

    let mut client_controls = Vec::new();
    let mut server_controls = Vec::new();
    add_controls(
        descr,
        &baseline_controls(),
        root_dse,
        GatePolicy::Drop,
        &mut client_controls,
        &mut server_controls,
    )?;
    add_controls(
        descr,
        &descr.controls,
        root_dse,
        GatePolicy::Fail,
        &mut client_controls,
        &mut server_controls,
    )?;

    let targets = resolve_targets(&descr.base, root_dse)?;

    debug!(
        request = %descr.name,
        columns = columns.len(),
        targets = targets.len(),
        server_controls = server_controls.len(),
        client_controls = client_controls.len(),
        "Request materialized"
    );

    Ok(CompiledRequest {
        columns,
        search_attrs,
        targets,
        client_controls,
        server_controls,
    })
}

fn add_controls(
    descr: &RequestDescriptor,
    controls: &[ControlDescriptor],
    root_dse: &RootDse,
    policy: GatePolicy,
    client_out: &mut Vec<ProtocolControl>,
    server_out: &mut Vec<ProtocolControl>,
) -> JobResult<()> {
    for control in controls {
        if !root_dse.supports_control(&control.oid) {
            if policy == GatePolicy::Fail {
                return Err(JobError::UnsupportedControl {
                    name: control.name.clone(),
                    oid: control.oid.clone(),
                });
            }
            error!(
                request = %descr.name,
                control = %control.name,
                oid = %control.oid,
                "Using a non-supported LDAP control"
            );
            continue;
        }

        let value = match &control.value {
            None => None,
            Some(v) => Some(ber::encode_value(v).map_err(|source| JobError::Encode {
                name: control.name.clone(),
                oid: control.oid.clone(),
                source,
            })?),
        };

        let compiled = ProtocolControl {
            oid: control.oid.clone(),
            critical: true,
            value,
        };
        match control.kind {
            ControlKind::Client => client_out.push(compiled),
            ControlKind::Server => server_out.push(compiled),
        }
    }

    Ok(())
}

/// Resolve the request base into concrete search targets.
fn resolve_targets(base: &BaseSpec, root_dse: &RootDse) -> JobResult<Vec<String>> {
    match base {
        BaseSpec::ExplicitDn(dn) => Ok(vec![dn.clone()]),
        BaseSpec::WildcardAll => Ok(root_dse.naming_contexts.clone()),
        BaseSpec::NamingContext(shortcut) => {
            let resolved = match shortcut {
                NcShortcut::Domain => root_dse
                    .default_naming_context
                    .clone()
                    .ok_or(JobError::NamingContextMissing { context: "default" })?,
                NcShortcut::Configuration => root_dse
                    .configuration_naming_context
                    .clone()
                    .ok_or(JobError::NamingContextMissing {
                        context: "configuration",
                    })?,
                NcShortcut::Schema => root_dse
                    .schema_naming_context
                    .clone()
                    .ok_or(JobError::NamingContextMissing { context: "schema" })?,
                // The DNS-zone partitions are not reported as dedicated Root
                // DSE attributes; there is no resolution path for them.
                NcShortcut::DomainDnsZones => {
                    return Err(JobError::NamingContextUnresolved {
                        shortcut: "domainDns",
                    })
                }
                NcShortcut::ForestDnsZones => {
                    return Err(JobError::NamingContextUnresolved {
                        shortcut: "forestDns",
                    })
                }
            };
            Ok(vec![resolved])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::{AttributeDescriptor, ControlValue, SearchScope, ValueKind};
    use std::collections::HashSet;

    fn test_root_dse() -> RootDse {
        RootDse {
            naming_contexts: vec![
                "DC=corp,DC=local".into(),
                "CN=Configuration,DC=corp,DC=local".into(),
                "CN=Schema,CN=Configuration,DC=corp,DC=local".into(),
            ],
            default_naming_context: Some("DC=corp,DC=local".into()),
            configuration_naming_context: Some("CN=Configuration,DC=corp,DC=local".into()),
            schema_naming_context: Some("CN=Schema,CN=Configuration,DC=corp,DC=local".into()),
            supported_controls: HashSet::from([
                OID_SHOW_RECYCLED.to_string(),
                OID_SHOW_DELETED.to_string(),
                OID_SHOW_DEACTIVATED_LINK.to_string(),
            ]),
            ldap_service_name: Some("corp.local".into()),
        }
    }

    fn test_request() -> RequestDescriptor {
        RequestDescriptor {
            name: "users".into(),
            description: "all users".into(),
            base: BaseSpec::NamingContext(NcShortcut::Domain),
            scope: SearchScope::Subtree,
            filter: "(objectClass=user)".into(),
            attributes: vec![AttributeDescriptor {
                name: "cn".into(),
                kind: ValueKind::Str,
            }],
            controls: Vec::new(),
        }
    }

    #[test]
    fn test_dn_column_prepended() {
        let compiled = materialize(&test_request(), &test_root_dse()).unwrap();
        assert_eq!(compiled.columns, vec!["distinguishedName", "cn"]);
        assert_eq!(compiled.search_attrs, vec!["cn"]);
        assert_eq!(compiled.targets, vec!["DC=corp,DC=local"]);
    }

    #[test]
    fn test_baseline_controls_included() {
        let compiled = materialize(&test_request(), &test_root_dse()).unwrap();
        assert!(compiled.client_controls.is_empty());
        assert_eq!(compiled.server_controls.len(), 3);
        assert!(compiled.server_controls.iter().all(|c| c.critical));
        assert!(compiled.server_controls.iter().all(|c| c.value.is_none()));
        assert_eq!(compiled.server_controls[0].oid, OID_SHOW_RECYCLED);
    }

    #[test]
    fn test_unsupported_baseline_control_dropped() {
        let mut dse = test_root_dse();
        dse.supported_controls.remove(OID_SHOW_RECYCLED);

        let compiled = materialize(&test_request(), &dse).unwrap();
        assert_eq!(compiled.server_controls.len(), 2);
        assert!(compiled
            .server_controls
            .iter()
            .all(|c| c.oid != OID_SHOW_RECYCLED));
    }

    #[test]
    fn test_unsupported_request_control_fails() {
        let mut request = test_request();
        request.controls.push(ControlDescriptor {
            name: "LDAP_SERVER_EXTENDED_DN_OID".into(),
            oid: "1.2.840.113556.1.4.529".into(),
            kind: ControlKind::Server,
            value: None,
        });

        let err = materialize(&request, &test_root_dse()).unwrap_err();
        assert!(matches!(err, JobError::UnsupportedControl { .. }));
    }

    #[test]
    fn test_request_control_value_encoded() {
        let mut dse = test_root_dse();
        dse.supported_controls.insert("1.2.840.113556.1.4.529".into());

        let mut request = test_request();
        request.controls.push(ControlDescriptor {
            name: "LDAP_SERVER_EXTENDED_DN_OID".into(),
            oid: "1.2.840.113556.1.4.529".into(),
            kind: ControlKind::Server,
            value: Some(ControlValue::Int(1)),
        });

        let compiled = materialize(&request, &dse).unwrap();
        let extended = compiled
            .server_controls
            .iter()
            .find(|c| c.oid == "1.2.840.113556.1.4.529")
            .unwrap();
        assert_eq!(extended.value, Some(vec![0x30, 0x03, 0x02, 0x01, 0x01]));
    }

    #[test]
    fn test_binary_control_value_fails() {
        let mut dse = test_root_dse();
        dse.supported_controls.insert("1.2.840.113556.1.4.801".into());

        let mut request = test_request();
        request.controls.push(ControlDescriptor {
            name: "LDAP_SERVER_SD_FLAGS_OID".into(),
            oid: "1.2.840.113556.1.4.801".into(),
            kind: ControlKind::Server,
            value: Some(ControlValue::Bin(vec![0x07])),
        });

        let err = materialize(&request, &test_root_dse()).unwrap_err();
        // unsupported OID check comes first against the unmodified DSE
        assert!(matches!(err, JobError::UnsupportedControl { .. }));

        let err = materialize(&request, &dse).unwrap_err();
        assert!(matches!(err, JobError::Encode { .. }));
    }

    #[test]
    fn test_client_server_partition() {
        let mut dse = test_root_dse();
        dse.supported_controls.insert("1.1.1.1".into());

        let mut request = test_request();
        request.controls.push(ControlDescriptor {
            name: "client-side".into(),
            oid: "1.1.1.1".into(),
            kind: ControlKind::Client,
            value: None,
        });

        let compiled = materialize(&request, &dse).unwrap();
        assert_eq!(compiled.client_controls.len(), 1);
        assert_eq!(compiled.client_controls[0].oid, "1.1.1.1");
        assert_eq!(compiled.server_controls.len(), 3);
    }

    #[test]
    fn test_wildcard_targets() {
        let mut request = test_request();
        request.base = BaseSpec::WildcardAll;

        let compiled = materialize(&request, &test_root_dse()).unwrap();
        assert_eq!(compiled.targets.len(), 3);
        assert_eq!(compiled.targets, test_root_dse().naming_contexts);
    }

    #[test]
    fn test_explicit_dn_target() {
        let mut request = test_request();
        request.base = BaseSpec::ExplicitDn("OU=Sales,DC=corp,DC=local".into());

        let compiled = materialize(&request, &test_root_dse()).unwrap();
        assert_eq!(compiled.targets, vec!["OU=Sales,DC=corp,DC=local"]);
    }

    #[test]
    fn test_dns_zone_shortcuts_fail_fast() {
        for shortcut in [NcShortcut::DomainDnsZones, NcShortcut::ForestDnsZones] {
            let mut request = test_request();
            request.base = BaseSpec::NamingContext(shortcut);
            let err = materialize(&request, &test_root_dse()).unwrap_err();
            assert!(matches!(err, JobError::NamingContextUnresolved { .. }));
        }
    }

    #[test]
    fn test_missing_naming_context_fails() {
        let mut dse = test_root_dse();
        dse.schema_naming_context = None;

        let mut request = test_request();
        request.base = BaseSpec::NamingContext(NcShortcut::Schema);

        let err = materialize(&request, &dse).unwrap_err();
        assert!(matches!(
            err,
            JobError::NamingContextMissing { context: "schema" }
        ));
    }
}
