//! Canonical JSON Serialization
//!
//! Deterministic encoding used for every hashed artifact in the pipeline.
//! Two structurally equal values (same keys and values, regardless of key
//! order) always canonicalize to byte-identical output, so their digests
//! match across machines and runs.
//!
//! # Encoding Rules
//!
//! - Object keys are emitted in byte-wise lexicographic order
//! - Array element order is preserved (it is semantically significant:
//!   trade receipts are an ordered log)
//! - No insignificant whitespace
//! - Strings use standard JSON escaping; numbers use serde_json's shortest
//!   round-trippable form
//! - `true` / `false` / `null` as literals

use serde_json::Value;

/// Maximum container nesting depth accepted by the canonicalizer.
///
/// `serde_json::Value` is a tree by construction, so a genuinely cyclic
/// structure cannot exist here. A cycle in a foreign producer shows up as
/// runaway nesting instead, and the bounded walk converts it into a hard
/// error rather than a stack overflow. Honest artifacts nest ~5 levels deep.
pub const MAX_CANONICAL_DEPTH: usize = 128;

/// Canonicalization failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalError {
    /// Nesting exceeded [`MAX_CANONICAL_DEPTH`], indicating a cyclic or
    /// pathologically deep structure. No digest is produced.
    CircularStructure { depth: usize },
    /// The value could not be represented as JSON (e.g. a non-finite float
    /// reaching the serializer).
    Unserializable(String),
}

impl std::fmt::Display for CanonicalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CircularStructure { depth } => write!(
                f,
                "circular or overly deep structure: nesting exceeded {} levels",
                depth
            ),
            Self::Unserializable(e) => write!(f, "value not serializable as JSON: {}", e),
        }
    }
}

impl std::error::Error for CanonicalError {}

/// Serialize a JSON value into its canonical byte form.
///
/// Pure and total over acyclic values: never touches clocks, RNGs, or I/O.
pub fn canonicalize(value: &Value) -> Result<String, CanonicalError> {
    let mut out = String::new();
    write_value(value, &mut out, 0)?;
    Ok(out)
}

/// Serialize any `Serialize` type into canonical form by way of a JSON tree.
pub fn canonicalize_from<T: serde::Serialize>(value: &T) -> Result<String, CanonicalError> {
    let tree =
        serde_json::to_value(value).map_err(|e| CanonicalError::Unserializable(e.to_string()))?;
    canonicalize(&tree)
}

fn write_value(value: &Value, out: &mut String, depth: usize) -> Result<(), CanonicalError> {
    if depth > MAX_CANONICAL_DEPTH {
        return Err(CanonicalError::CircularStructure { depth });
    }

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        // serde_json::Number displays as its JSON token (shortest
        // round-trippable form for floats)
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_escaped_string(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out, depth + 1)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            // Sorting is explicit so canonical output does not depend on the
            // map implementation behind serde_json.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));

            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_escaped_string(key, out);
                out.push(':');
                write_value(&map[key], out, depth + 1)?;
            }
            out.push('}');
        }
    }

    Ok(())
}

/// Standard JSON string escaping: `"` and `\` escaped, control characters
/// below U+0020 as short escapes or `\u00XX`, everything else verbatim UTF-8.
fn write_escaped_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_object_keys_sorted() {
        let v = json!({"zebra": 1, "apple": 2, "mango": 3});
        assert_eq!(canonicalize(&v).unwrap(), r#"{"apple":2,"mango":3,"zebra":1}"#);
    }

    #[test]
    fn test_nested_keys_sorted_recursively() {
        let v = json!({
            "outer": {"b": {"z": 1, "a": 2}, "a": true},
            "arr": [{"y": 1, "x": 2}]
        });
        assert_eq!(
            canonicalize(&v).unwrap(),
            r#"{"arr":[{"x":2,"y":1}],"outer":{"a":true,"b":{"a":2,"z":1}}}"#
        );
    }

    #[test]
    fn test_array_order_preserved() {
        let v = json!([3, 1, 2]);
        assert_eq!(canonicalize(&v).unwrap(), "[3,1,2]");
    }

    #[test]
    fn test_primitives() {
        assert_eq!(canonicalize(&json!(null)).unwrap(), "null");
        assert_eq!(canonicalize(&json!(true)).unwrap(), "true");
        assert_eq!(canonicalize(&json!(false)).unwrap(), "false");
        assert_eq!(canonicalize(&json!(42)).unwrap(), "42");
        assert_eq!(canonicalize(&json!(-1.5)).unwrap(), "-1.5");
        assert_eq!(canonicalize(&json!("hi")).unwrap(), r#""hi""#);
    }

    #[test]
    fn test_string_escaping() {
        let v = json!("a\"b\\c\nd\te\u{1}");
        assert_eq!(canonicalize(&v).unwrap(), r#""a\"b\\c\nd\te""#);
    }

    #[test]
    fn test_no_whitespace() {
        let v = json!({"a": [1, 2], "b": {"c": "d"}});
        let s = canonicalize(&v).unwrap();
        assert!(!s.contains(' '));
        assert!(!s.contains('\n'));
    }

    #[test]
    fn test_determinism_repeated_calls() {
        let v = json!({"k": [1, {"n": null}], "j": "v"});
        let first = canonicalize(&v).unwrap();
        for _ in 0..10 {
            assert_eq!(canonicalize(&v).unwrap(), first);
        }
    }

    #[test]
    fn test_structural_equality_independent_of_construction_order() {
        let mut a = serde_json::Map::new();
        a.insert("fee".into(), json!(4));
        a.insert("symbol".into(), json!("BTCUSDT"));

        let mut b = serde_json::Map::new();
        b.insert("symbol".into(), json!("BTCUSDT"));
        b.insert("fee".into(), json!(4));

        assert_eq!(
            canonicalize(&Value::Object(a)).unwrap(),
            canonicalize(&Value::Object(b)).unwrap()
        );
    }

    #[test]
    fn test_excessive_nesting_rejected() {
        let mut v = json!(1);
        for _ in 0..(MAX_CANONICAL_DEPTH + 10) {
            v = json!([v]);
        }
        match canonicalize(&v) {
            Err(CanonicalError::CircularStructure { depth }) => {
                assert!(depth > MAX_CANONICAL_DEPTH);
            }
            other => panic!("expected CircularStructure, got {:?}", other),
        }
    }

    #[test]
    fn test_nesting_at_limit_accepted() {
        let mut v = json!(1);
        for _ in 0..(MAX_CANONICAL_DEPTH - 1) {
            v = json!([v]);
        }
        assert!(canonicalize(&v).is_ok());
    }

    #[test]
    fn test_canonicalize_from_struct() {
        #[derive(serde::Serialize)]
        struct S {
            b: u32,
            a: u32,
        }
        assert_eq!(canonicalize_from(&S { b: 1, a: 2 }).unwrap(), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn test_non_string_map_keys_rejected() {
        use std::collections::HashMap;
        let mut m: HashMap<(u32, u32), u32> = HashMap::new();
        m.insert((1, 2), 3);
        let err = canonicalize_from(&m).unwrap_err();
        assert!(matches!(err, CanonicalError::Unserializable(_)));
    }
}
