//! Request model compiler
//!
//! Decodes the declarative JSON request document into an array of fully-typed
//! request descriptors. The document maps request names to descriptions:
//!
//! ```json
//! {
//!   "users": {
//!     "descr": "all users",
//!     "ldap": {
//!       "base": "domain",
//!       "scope": "subtree",
//!       "filter": "(objectClass=user)",
//!       "attrs": [ {"type": "str", "name": "cn"} ],
//!       "controls": [ {"name": "...", "ctrltype": "server",
//!                      "valuetype": "int", "value": "1", "oid": "..."} ]
//!     }
//!   }
//! }
//! ```
//!
//! Every enumerable field is validated against its closed vocabulary and any
//! violation is fatal for the whole run: the output is all-or-nothing.
//!
//! Control fields are decoded in document traversal order because a control
//! value's representation depends on the previously-declared `valuetype`; a
//! `value` that arrives before a usable `valuetype` is rejected.

use crate::error::{DecodeError, DecodeResult};
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Search breadth of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// The base entry only
    Base,
    /// Immediate children of the base
    OneLevel,
    /// The full subtree under the base
    Subtree,
}

/// Well-known naming-context shortcuts usable as a request base
///
/// `DomainDnsZones` and `ForestDnsZones` are recognized tokens but have no
/// resolution path; materialization fails fast on them rather than guessing
/// a DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NcShortcut {
    Domain,
    Configuration,
    Schema,
    DomainDnsZones,
    ForestDnsZones,
}

impl NcShortcut {
    /// The document token for this shortcut
    pub fn token(&self) -> &'static str {
        match self {
            NcShortcut::Domain => "domain",
            NcShortcut::Configuration => "configuration",
            NcShortcut::Schema => "schema",
            NcShortcut::DomainDnsZones => "domainDns",
            NcShortcut::ForestDnsZones => "forestDns",
        }
    }
}

impl fmt::Display for NcShortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Search base of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseSpec {
    /// A literal distinguished name
    ExplicitDn(String),
    /// A well-known naming context, resolved against the Root DSE
    NamingContext(NcShortcut),
    /// Every naming context the server reports
    WildcardAll,
}

/// Value type of an attribute or control value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Int,
    Bin,
}

impl ValueKind {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "str" => Some(ValueKind::Str),
            "int" => Some(ValueKind::Int),
            "bin" => Some(ValueKind::Bin),
            _ => None,
        }
    }
}

/// One requested attribute: its wire name and the formatter that applies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub name: String,
    pub kind: ValueKind,
}

/// Whether a control is client-side or server-side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Client,
    Server,
}

/// A typed control value; the variant is fixed by the declared `valuetype`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlValue {
    Str(String),
    Int(i32),
    Bin(Vec<u8>),
}

/// One requested protocol control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlDescriptor {
    pub name: String,
    pub oid: String,
    pub kind: ControlKind,
    /// `None` for value-less controls (`valuetype: none`)
    pub value: Option<ControlValue>,
}

impl ControlDescriptor {
    /// Whether this control carries an encoded value payload
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }
}

/// One fully-decoded directory request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub name: String,
    pub description: String,
    pub base: BaseSpec,
    pub scope: SearchScope,
    pub filter: String,
    pub attributes: Vec<AttributeDescriptor>,
    pub controls: Vec<ControlDescriptor>,
}

/// Read and compile a request document from disk.
pub fn load_requests(path: &Path) -> DecodeResult<Vec<RequestDescriptor>> {
    let text = fs::read_to_string(path).map_err(|e| DecodeError::ReadFailed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let root: Value = serde_json::from_str(&text)?;
    compile_document(&root)
}

/// Compile a parsed document root into an ordered descriptor array.
pub fn compile_document(root: &Value) -> DecodeResult<Vec<RequestDescriptor>> {
    let entries = root.as_object().ok_or(DecodeError::RootNotObject)?;

    let mut descriptors = Vec::with_capacity(entries.len());
    for (name, body) in entries {
        descriptors.push(decode_request(name, body)?);
    }

    info!(count = descriptors.len(), "Compiled request descriptors");
    Ok(descriptors)
}

fn decode_request(name: &str, body: &Value) -> DecodeResult<RequestDescriptor> {
    let obj = body.as_object().ok_or_else(|| DecodeError::BadField {
        request: name.into(),
        field: "request",
        reason: "is not an object".into(),
    })?;

    let description = required_str(name, obj, "descr")?.to_string();
    let ldap = obj
        .get("ldap")
        .ok_or_else(|| missing(name, "ldap"))?
        .as_object()
        .ok_or_else(|| DecodeError::BadField {
            request: name.into(),
            field: "ldap",
            reason: "is not an object".into(),
        })?;

    let base = decode_base(required_str(name, ldap, "base")?);
    let scope = decode_scope(name, required_str(name, ldap, "scope")?)?;
    let filter = required_str(name, ldap, "filter")?.to_string();

    let attrs_val = ldap.get("attrs").ok_or_else(|| missing(name, "attrs"))?;
    let attrs_arr = attrs_val.as_array().ok_or_else(|| DecodeError::BadField {
        request: name.into(),
        field: "attrs",
        reason: "is not an array".into(),
    })?;
    let attributes = attrs_arr
        .iter()
        .map(|a| decode_attribute(name, a))
        .collect::<DecodeResult<Vec<_>>>()?;

    let controls = match ldap.get("controls") {
        None => Vec::new(),
        Some(v) => {
            let arr = v.as_array().ok_or_else(|| DecodeError::BadField {
                request: name.into(),
                field: "controls",
                reason: "is not an array".into(),
            })?;
            arr.iter()
                .map(|c| decode_control(name, c))
                .collect::<DecodeResult<Vec<_>>>()?
        }
    };

    debug!(
        request = name,
        attrs = attributes.len(),
        controls = controls.len(),
        "Request decoded"
    );

    Ok(RequestDescriptor {
        name: name.to_string(),
        description,
        base,
        scope,
        filter,
        attributes,
        controls,
    })
}

fn decode_base(token: &str) -> BaseSpec {
    if token == "*" {
        return BaseSpec::WildcardAll;
    }
    for shortcut in [
        NcShortcut::Domain,
        NcShortcut::Configuration,
        NcShortcut::Schema,
        NcShortcut::DomainDnsZones,
        NcShortcut::ForestDnsZones,
    ] {
        if token == shortcut.token() {
            return BaseSpec::NamingContext(shortcut);
        }
    }
    BaseSpec::ExplicitDn(token.to_string())
}

fn decode_scope(request: &str, token: &str) -> DecodeResult<SearchScope> {
    match token {
        "base" => Ok(SearchScope::Base),
        "onelevel" => Ok(SearchScope::OneLevel),
        "subtree" => Ok(SearchScope::Subtree),
        _ => Err(DecodeError::InvalidToken {
            request: request.into(),
            what: "scope",
            token: token.into(),
        }),
    }
}

fn decode_attribute(request: &str, value: &Value) -> DecodeResult<AttributeDescriptor> {
    let obj = value.as_object().ok_or_else(|| DecodeError::BadField {
        request: request.into(),
        field: "attrs",
        reason: "element is not an object".into(),
    })?;

    let kind_token = required_str(request, obj, "type")?;
    let kind = ValueKind::from_token(kind_token).ok_or_else(|| DecodeError::InvalidToken {
        request: request.into(),
        what: "attribute type",
        token: kind_token.into(),
    })?;
    let name = required_str(request, obj, "name")?.to_string();

    Ok(AttributeDescriptor { name, kind })
}

/// Value-type state while walking a control object in document order.
///
/// `Undeclared` means no `valuetype` field has been seen yet; decoding a
/// `value` in that state (or after `valuetype: none`) is the "value before
/// type" fatal error.
enum DeclaredType {
    Undeclared,
    None,
    Typed(ValueKind),
}

fn decode_control(request: &str, value: &Value) -> DecodeResult<ControlDescriptor> {
    let obj = value.as_object().ok_or_else(|| DecodeError::BadField {
        request: request.into(),
        field: "controls",
        reason: "element is not an object".into(),
    })?;

    let mut name: Option<String> = None;
    let mut oid: Option<String> = None;
    let mut kind: Option<ControlKind> = None;
    let mut declared = DeclaredType::Undeclared;
    let mut payload: Option<ControlValue> = None;

    // Field order matters: `valuetype` fixes how a later `value` is decoded.
    for (key, field) in obj {
        match key.as_str() {
            "name" => name = Some(field_str(request, "name", field)?.to_string()),
            "oid" => oid = Some(field_str(request, "oid", field)?.to_string()),
            "ctrltype" => {
                kind = Some(match field_str(request, "ctrltype", field)? {
                    "client" => ControlKind::Client,
                    "server" => ControlKind::Server,
                    other => {
                        return Err(DecodeError::InvalidToken {
                            request: request.into(),
                            what: "control control-type",
                            token: other.into(),
                        })
                    }
                })
            }
            "valuetype" => {
                let token = field_str(request, "valuetype", field)?;
                declared = match token {
                    "none" => DeclaredType::None,
                    _ => DeclaredType::Typed(ValueKind::from_token(token).ok_or_else(|| {
                        DecodeError::InvalidToken {
                            request: request.into(),
                            what: "control value-type",
                            token: token.into(),
                        }
                    })?),
                };
            }
            "value" => {
                let text = field_str(request, "value", field)?;
                let value_kind = match declared {
                    DeclaredType::Typed(k) => k,
                    DeclaredType::Undeclared | DeclaredType::None => {
                        return Err(DecodeError::ValueBeforeType {
                            request: request.into(),
                            value: text.into(),
                        })
                    }
                };
                payload = Some(decode_control_value(request, value_kind, text)?);
            }
            // Unknown members are ignored, like every other object here.
            _ => {}
        }
    }

    let name = name.ok_or_else(|| missing(request, "name"))?;
    let oid = oid.ok_or_else(|| missing(request, "oid"))?;
    let kind = kind.ok_or_else(|| missing(request, "ctrltype"))?;

    match declared {
        DeclaredType::Undeclared => Err(missing(request, "valuetype")),
        DeclaredType::None => Ok(ControlDescriptor {
            name,
            oid,
            kind,
            value: None,
        }),
        DeclaredType::Typed(_) => match payload {
            Some(value) => Ok(ControlDescriptor {
                name,
                oid,
                kind,
                value: Some(value),
            }),
            None => Err(DecodeError::ValueMissing {
                request: request.into(),
                control: name,
            }),
        },
    }
}

fn decode_control_value(
    request: &str,
    kind: ValueKind,
    text: &str,
) -> DecodeResult<ControlValue> {
    match kind {
        ValueKind::Str => Ok(ControlValue::Str(text.to_string())),
        ValueKind::Int => {
            if !is_numeric(text) {
                return Err(DecodeError::NotNumeric {
                    request: request.into(),
                    value: text.into(),
                });
            }
            text.parse::<i32>()
                .map(ControlValue::Int)
                .map_err(|_| DecodeError::NotNumeric {
                    request: request.into(),
                    value: text.into(),
                })
        }
        ValueKind::Bin => hex::decode(text)
            .map(ControlValue::Bin)
            .map_err(|_| DecodeError::NotHex {
                request: request.into(),
                value: text.into(),
            }),
    }
}

/// Numeric check for int-typed values: optional sign, then digits only.
pub(crate) fn is_numeric(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn required_str<'a>(
    request: &str,
    obj: &'a Map<String, Value>,
    field: &'static str,
) -> DecodeResult<&'a str> {
    field_str(request, field, obj.get(field).ok_or_else(|| missing(request, field))?)
}

fn field_str<'a>(request: &str, field: &'static str, value: &'a Value) -> DecodeResult<&'a str> {
    value.as_str().ok_or_else(|| DecodeError::BadField {
        request: request.into(),
        field,
        reason: "is not a string".into(),
    })
}

fn missing(request: &str, field: &'static str) -> DecodeError {
    DecodeError::MissingField {
        request: request.into(),
        field,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(doc: serde_json::Value) -> DecodeResult<Vec<RequestDescriptor>> {
        compile_document(&doc)
    }

    #[test]
    fn test_decode_completeness() {
        let doc = json!({
            "users": {
                "descr": "all users",
                "ldap": {
                    "base": "domain",
                    "scope": "subtree",
                    "filter": "(objectClass=user)",
                    "attrs": [
                        {"type": "str", "name": "cn"},
                        {"type": "int", "name": "userAccountControl"},
                        {"type": "bin", "name": "objectSid"}
                    ]
                }
            },
            "schema_classes": {
                "descr": "schema class definitions",
                "ldap": {
                    "base": "schema",
                    "scope": "onelevel",
                    "filter": "(objectClass=classSchema)",
                    "attrs": [{"type": "str", "name": "lDAPDisplayName"}]
                }
            }
        });

        let descriptors = compile(doc).unwrap();
        assert_eq!(descriptors.len(), 2);

        let users = &descriptors[0];
        assert_eq!(users.name, "users");
        assert_eq!(users.description, "all users");
        assert_eq!(users.base, BaseSpec::NamingContext(NcShortcut::Domain));
        assert_eq!(users.scope, SearchScope::Subtree);
        assert_eq!(users.filter, "(objectClass=user)");
        assert_eq!(users.attributes.len(), 3);
        assert_eq!(users.attributes[0].name, "cn");
        assert_eq!(users.attributes[0].kind, ValueKind::Str);
        assert_eq!(users.attributes[1].kind, ValueKind::Int);
        assert_eq!(users.attributes[2].kind, ValueKind::Bin);
        assert!(users.controls.is_empty());

        assert_eq!(descriptors[1].name, "schema_classes");
        assert_eq!(descriptors[1].scope, SearchScope::OneLevel);
    }

    #[test]
    fn test_base_variants() {
        assert_eq!(decode_base("*"), BaseSpec::WildcardAll);
        assert_eq!(
            decode_base("configuration"),
            BaseSpec::NamingContext(NcShortcut::Configuration)
        );
        assert_eq!(
            decode_base("forestDns"),
            BaseSpec::NamingContext(NcShortcut::ForestDnsZones)
        );
        assert_eq!(
            decode_base("DC=corp,DC=local"),
            BaseSpec::ExplicitDn("DC=corp,DC=local".into())
        );
    }

    #[test]
    fn test_invalid_scope_is_fatal() {
        let doc = json!({
            "bad": {
                "descr": "x",
                "ldap": {
                    "base": "domain",
                    "scope": "everything",
                    "filter": "(cn=*)",
                    "attrs": []
                }
            }
        });
        let err = compile(doc).unwrap_err();
        match err {
            DecodeError::InvalidToken { request, what, token } => {
                assert_eq!(request, "bad");
                assert_eq!(what, "scope");
                assert_eq!(token, "everything");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_attr_type_is_fatal() {
        let doc = json!({
            "bad": {
                "descr": "x",
                "ldap": {
                    "base": "domain",
                    "scope": "base",
                    "filter": "(cn=*)",
                    "attrs": [{"type": "float", "name": "cn"}]
                }
            }
        });
        assert!(matches!(
            compile(doc).unwrap_err(),
            DecodeError::InvalidToken { what: "attribute type", .. }
        ));
    }

    #[test]
    fn test_missing_descr_is_fatal() {
        let doc = json!({
            "bad": {
                "ldap": {
                    "base": "domain",
                    "scope": "base",
                    "filter": "(cn=*)",
                    "attrs": []
                }
            }
        });
        assert!(matches!(
            compile(doc).unwrap_err(),
            DecodeError::MissingField { field: "descr", .. }
        ));
    }

    #[test]
    fn test_control_value_after_type() {
        let doc = json!({
            "paged": {
                "descr": "paged query",
                "ldap": {
                    "base": "domain",
                    "scope": "subtree",
                    "filter": "(cn=*)",
                    "attrs": [{"type": "str", "name": "cn"}],
                    "controls": [{
                        "name": "LDAP_PAGED_RESULT_OID_STRING",
                        "ctrltype": "server",
                        "valuetype": "int",
                        "value": "1000",
                        "oid": "1.2.840.113556.1.4.319"
                    }]
                }
            }
        });
        let descriptors = compile(doc).unwrap();
        let ctrl = &descriptors[0].controls[0];
        assert_eq!(ctrl.kind, ControlKind::Server);
        assert_eq!(ctrl.oid, "1.2.840.113556.1.4.319");
        assert_eq!(ctrl.value, Some(ControlValue::Int(1000)));
        assert!(ctrl.has_value());
    }

    #[test]
    fn test_control_value_before_type_is_fatal() {
        // `value` precedes `valuetype` in document order
        let doc = json!({
            "bad": {
                "descr": "x",
                "ldap": {
                    "base": "domain",
                    "scope": "base",
                    "filter": "(cn=*)",
                    "attrs": [],
                    "controls": [{
                        "name": "ctl",
                        "ctrltype": "server",
                        "value": "1000",
                        "valuetype": "int",
                        "oid": "1.2.3"
                    }]
                }
            }
        });
        assert!(matches!(
            compile(doc).unwrap_err(),
            DecodeError::ValueBeforeType { .. }
        ));
    }

    #[test]
    fn test_control_value_with_none_type_is_fatal() {
        let doc = json!({
            "bad": {
                "descr": "x",
                "ldap": {
                    "base": "domain",
                    "scope": "base",
                    "filter": "(cn=*)",
                    "attrs": [],
                    "controls": [{
                        "name": "ctl",
                        "ctrltype": "server",
                        "valuetype": "none",
                        "value": "1000",
                        "oid": "1.2.3"
                    }]
                }
            }
        });
        assert!(matches!(
            compile(doc).unwrap_err(),
            DecodeError::ValueBeforeType { .. }
        ));
    }

    #[test]
    fn test_valueless_control() {
        let doc = json!({
            "deleted": {
                "descr": "x",
                "ldap": {
                    "base": "domain",
                    "scope": "base",
                    "filter": "(cn=*)",
                    "attrs": [],
                    "controls": [{
                        "name": "LDAP_SERVER_SHOW_DELETED_OID",
                        "ctrltype": "server",
                        "valuetype": "none",
                        "oid": "1.2.840.113556.1.4.417"
                    }]
                }
            }
        });
        let descriptors = compile(doc).unwrap();
        let ctrl = &descriptors[0].controls[0];
        assert!(!ctrl.has_value());
    }

    #[test]
    fn test_declared_type_without_value_is_fatal() {
        let doc = json!({
            "bad": {
                "descr": "x",
                "ldap": {
                    "base": "domain",
                    "scope": "base",
                    "filter": "(cn=*)",
                    "attrs": [],
                    "controls": [{
                        "name": "ctl",
                        "ctrltype": "server",
                        "valuetype": "int",
                        "oid": "1.2.3"
                    }]
                }
            }
        });
        assert!(matches!(
            compile(doc).unwrap_err(),
            DecodeError::ValueMissing { .. }
        ));
    }

    #[test]
    fn test_non_numeric_int_value_is_fatal() {
        let doc = json!({
            "bad": {
                "descr": "x",
                "ldap": {
                    "base": "domain",
                    "scope": "base",
                    "filter": "(cn=*)",
                    "attrs": [],
                    "controls": [{
                        "name": "ctl",
                        "ctrltype": "server",
                        "valuetype": "int",
                        "value": "12x4",
                        "oid": "1.2.3"
                    }]
                }
            }
        });
        assert!(matches!(
            compile(doc).unwrap_err(),
            DecodeError::NotNumeric { .. }
        ));
    }

    #[test]
    fn test_bin_control_value_hex_decoded() {
        let doc = json!({
            "sd": {
                "descr": "x",
                "ldap": {
                    "base": "domain",
                    "scope": "base",
                    "filter": "(cn=*)",
                    "attrs": [],
                    "controls": [{
                        "name": "LDAP_SERVER_SD_FLAGS_OID",
                        "ctrltype": "server",
                        "valuetype": "bin",
                        "value": "deadbeef",
                        "oid": "1.2.840.113556.1.4.801"
                    }]
                }
            }
        });
        let descriptors = compile(doc).unwrap();
        assert_eq!(
            descriptors[0].controls[0].value,
            Some(ControlValue::Bin(vec![0xDE, 0xAD, 0xBE, 0xEF]))
        );
    }

    #[test]
    fn test_root_not_object() {
        assert!(matches!(
            compile(json!([1, 2, 3])).unwrap_err(),
            DecodeError::RootNotObject
        ));
    }

    #[test]
    fn test_is_numeric() {
        assert!(is_numeric("0"));
        assert!(is_numeric("1000"));
        assert!(is_numeric("-42"));
        assert!(!is_numeric(""));
        assert!(!is_numeric("-"));
        assert!(!is_numeric("12x4"));
        assert!(!is_numeric("1.5"));
    }
}
