//! Attribute value and record formatting
//!
//! Each value formatter follows a two-pass measure-then-fill contract: a
//! first pass computes the exact output length (including one slot for the
//! separator/terminator), a second pass writes into a pre-sized buffer and
//! returns the same length. Multi-valued attributes are joined with the
//! reserved separator; occurrences of the separator inside a value are
//! escaped so the joined field can be split back losslessly.

use crate::directory::DirEntry;
use crate::requests::{is_numeric, AttributeDescriptor, ValueKind};
use tracing::warn;

/// Separator between the values of a multi-valued attribute
pub const VALUE_SEPARATOR: char = ';';

/// Escape character prefixed to separators occurring inside a value
pub const SEPARATOR_ESCAPE: char = '\\';

/// Measure pass: the exact length `write_value` will report for this value,
/// including the one-character terminator slot.
pub fn measure_value(kind: ValueKind, raw: &[u8]) -> usize {
    match kind {
        ValueKind::Str => {
            let text = String::from_utf8_lossy(raw);
            let escaped = text.chars().filter(|&c| c == VALUE_SEPARATOR).count();
            text.chars().count() + escaped + 1
        }
        ValueKind::Int => {
            if is_numeric(&String::from_utf8_lossy(raw)) {
                measure_value(ValueKind::Str, raw)
            } else {
                1
            }
        }
        ValueKind::Bin => raw.len() * 2 + 1,
    }
}

/// Fill pass: append the formatted value to `out` and return the same length
/// as `measure_value`. The terminator slot itself is left to the caller,
/// which appends either the separator or nothing for the last value.
pub fn write_value(kind: ValueKind, raw: &[u8], out: &mut String) -> usize {
    match kind {
        ValueKind::Str => {
            let text = String::from_utf8_lossy(raw);
            let mut written = 0;
            for c in text.chars() {
                if c == VALUE_SEPARATOR {
                    out.push(SEPARATOR_ESCAPE);
                    written += 1;
                }
                out.push(c);
                written += 1;
            }
            written + 1
        }
        ValueKind::Int => {
            // Numeric values arrive as text from the server; verify before
            // delegating to the string formatter.
            if is_numeric(&String::from_utf8_lossy(raw)) {
                write_value(ValueKind::Str, raw, out)
            } else {
                warn!(
                    len = raw.len(),
                    value = %String::from_utf8_lossy(raw),
                    "Non-numeric value when expecting one"
                );
                1
            }
        }
        ValueKind::Bin => {
            out.push_str(&hex::encode(raw));
            raw.len() * 2 + 1
        }
    }
}

/// Format all values of one attribute into a single separator-joined field.
pub fn format_attribute(desc: &AttributeDescriptor, values: &[Vec<u8>]) -> String {
    let total: usize = values.iter().map(|v| measure_value(desc.kind, v)).sum();
    let mut out = String::with_capacity(total);

    for (i, value) in values.iter().enumerate() {
        let measured = measure_value(desc.kind, value);
        let written = write_value(desc.kind, value, &mut out);
        debug_assert_eq!(measured, written);
        if i != values.len() - 1 {
            out.push(VALUE_SEPARATOR);
        }
    }

    out
}

/// Build one output record: the entry's DN followed by every requested
/// attribute formatted in declared order. Attributes absent from the entry
/// yield an empty field.
pub fn format_record(entry: &DirEntry, attributes: &[AttributeDescriptor]) -> Vec<String> {
    let mut record = Vec::with_capacity(attributes.len() + 1);
    record.push(entry.dn.clone());

    for desc in attributes {
        let field = match entry.values_of(&desc.name) {
            Some(values) if !values.is_empty() => format_attribute(desc, values),
            _ => String::new(),
        };
        record.push(field);
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn attr(name: &str, kind: ValueKind) -> AttributeDescriptor {
        AttributeDescriptor {
            name: name.into(),
            kind,
        }
    }

    /// Split a joined field back into values, honoring escapes.
    fn unescape_split(field: &str) -> Vec<String> {
        let mut values = vec![String::new()];
        let mut chars = field.chars();
        while let Some(c) = chars.next() {
            match c {
                SEPARATOR_ESCAPE => {
                    if let Some(next) = chars.next() {
                        values.last_mut().unwrap().push(next);
                    }
                }
                VALUE_SEPARATOR => values.push(String::new()),
                _ => values.last_mut().unwrap().push(c),
            }
        }
        values
    }

    #[test]
    fn test_two_pass_consistency() {
        let cases: &[(ValueKind, &[u8])] = &[
            (ValueKind::Str, b"plain"),
            (ValueKind::Str, b"with;separator;twice"),
            (ValueKind::Str, b""),
            (ValueKind::Int, b"1234"),
            (ValueKind::Int, b"-5"),
            (ValueKind::Int, b"not-a-number"),
            (ValueKind::Bin, &[0x00, 0xFF, 0x10]),
            (ValueKind::Bin, b""),
        ];

        for (kind, raw) in cases {
            let mut out = String::new();
            let measured = measure_value(*kind, raw);
            let written = write_value(*kind, raw, &mut out);
            assert_eq!(measured, written, "two-pass mismatch for {kind:?} {raw:?}");
            assert_eq!(out.chars().count(), measured - 1);
        }
    }

    #[test]
    fn test_str_escaping() {
        let mut out = String::new();
        write_value(ValueKind::Str, b"a;b", &mut out);
        assert_eq!(out, "a\\;b");
    }

    #[test]
    fn test_int_non_numeric_yields_empty() {
        let mut out = String::new();
        let len = write_value(ValueKind::Int, b"12x4", &mut out);
        assert_eq!(len, 1);
        assert!(out.is_empty());
    }

    #[test]
    fn test_bin_lowercase_hex() {
        let mut out = String::new();
        let len = write_value(ValueKind::Bin, &[0xDE, 0xAD, 0xBE, 0xEF], &mut out);
        assert_eq!(out, "deadbeef");
        assert_eq!(len, 9);
    }

    #[test]
    fn test_multi_value_join() {
        let field = format_attribute(
            &attr("member", ValueKind::Str),
            &[b"CN=a".to_vec(), b"CN=b".to_vec(), b"CN=c".to_vec()],
        );
        assert_eq!(field, "CN=a;CN=b;CN=c");
    }

    #[test]
    fn test_separator_escaping_round_trip() {
        let originals = vec!["plain", "with;one", ";leading", "trailing;", ";;"];
        let raw: Vec<Vec<u8>> = originals.iter().map(|s| s.as_bytes().to_vec()).collect();

        let field = format_attribute(&attr("x", ValueKind::Str), &raw);
        assert_eq!(unescape_split(&field), originals);
    }

    #[test]
    fn test_format_record_order_and_missing() {
        let mut values = HashMap::new();
        values.insert("cn".to_string(), vec![b"Alice".to_vec()]);
        values.insert("objectSid".to_string(), vec![vec![0x01, 0x05]]);
        let entry = DirEntry {
            dn: "CN=Alice,DC=corp".into(),
            values,
        };

        let record = format_record(
            &entry,
            &[
                attr("cn", ValueKind::Str),
                attr("description", ValueKind::Str),
                attr("objectSid", ValueKind::Bin),
            ],
        );

        assert_eq!(record, vec!["CN=Alice,DC=corp", "Alice", "", "0105"]);
    }

    #[test]
    fn test_format_record_case_insensitive_lookup() {
        let mut values = HashMap::new();
        values.insert("sAMAccountName".to_string(), vec![b"alice".to_vec()]);
        let entry = DirEntry {
            dn: "CN=Alice".into(),
            values,
        };

        let record = format_record(&entry, &[attr("samaccountname", ValueKind::Str)]);
        assert_eq!(record, vec!["CN=Alice", "alice"]);
    }
}
