//! Tagged Content Digests
//!
//! Every fingerprint in the pipeline is `"sha256:" + 64 lowercase hex chars`
//! over the canonical serialization of the value. The algorithm tag keeps
//! stored artifacts self-describing if the hash function ever rotates.

use crate::canonical::{canonicalize, CanonicalError};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Algorithm tag prefixed to every digest string.
pub const DIGEST_PREFIX: &str = "sha256:";

/// Hex digest length for SHA-256.
const HEX_LEN: usize = 64;

/// Hash raw bytes into a tagged digest string.
pub fn digest_bytes(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    format!("{}{}", DIGEST_PREFIX, hex::encode(hash))
}

/// Fingerprint a JSON value: canonicalize, then hash the canonical bytes.
pub fn fingerprint(value: &Value) -> Result<String, CanonicalError> {
    let canonical = canonicalize(value)?;
    Ok(digest_bytes(canonical.as_bytes()))
}

/// Fingerprint any `Serialize` type by way of its JSON tree.
pub fn fingerprint_of<T: serde::Serialize>(value: &T) -> Result<String, CanonicalError> {
    let tree =
        serde_json::to_value(value).map_err(|e| CanonicalError::Unserializable(e.to_string()))?;
    fingerprint(&tree)
}

/// Fingerprint an object with the named top-level fields removed first.
///
/// This is how stored self-fingerprints are rechecked: a record's own
/// fingerprint field is never part of its hash input, so verification strips
/// it (and any other excluded fields) before recomputing.
pub fn fingerprint_excluding(value: &Value, exclude: &[&str]) -> Result<String, CanonicalError> {
    match value {
        Value::Object(map) => {
            let mut stripped = map.clone();
            for key in exclude {
                stripped.remove(*key);
            }
            fingerprint(&Value::Object(stripped))
        }
        other => fingerprint(other),
    }
}

/// Check whether a string is a well-formed tagged digest:
/// the `sha256:` tag followed by exactly 64 lowercase hex characters.
pub fn is_tagged_digest(s: &str) -> bool {
    match s.strip_prefix(DIGEST_PREFIX) {
        Some(hex_part) => {
            hex_part.len() == HEX_LEN
                && hex_part
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_digest_bytes_known_vector() {
        // SHA-256 of the empty string
        assert_eq!(
            digest_bytes(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_fingerprint_shape() {
        let fp = fingerprint(&json!({"a": 1})).unwrap();
        assert!(is_tagged_digest(&fp));
    }

    #[test]
    fn test_fingerprint_key_order_invariant() {
        // Same config, fields listed in reverse order by the producer
        let a = json!({"symbol": "BTCUSDT", "interval": "15m", "feeBps": 4});
        let b = json!({"feeBps": 4, "interval": "15m", "symbol": "BTCUSDT"});
        assert_eq!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_fingerprint_value_sensitive() {
        let a = json!({"events": [{"signal": "enter"}]});
        let b = json!({"events": [{"signal": "exit"}]});
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_fingerprint_array_order_sensitive() {
        let a = json!({"events": [1, 2]});
        let b = json!({"events": [2, 1]});
        assert_ne!(fingerprint(&a).unwrap(), fingerprint(&b).unwrap());
    }

    #[test]
    fn test_fingerprint_excluding_strips_named_fields() {
        let sealed = json!({"data": 1, "fingerprint": "sha256:abc"});
        let bare = json!({"data": 1});
        assert_eq!(
            fingerprint_excluding(&sealed, &["fingerprint"]).unwrap(),
            fingerprint(&bare).unwrap()
        );
    }

    #[test]
    fn test_is_tagged_digest() {
        let valid = format!("sha256:{}", "a".repeat(64));
        assert!(is_tagged_digest(&valid));

        assert!(!is_tagged_digest(""));
        assert!(!is_tagged_digest("deadbeef"));
        assert!(!is_tagged_digest(&format!("sha256:{}", "a".repeat(63))));
        assert!(!is_tagged_digest(&format!("sha256:{}", "a".repeat(65))));
        // uppercase hex is not canonical
        assert!(!is_tagged_digest(&format!("sha256:{}", "A".repeat(64))));
        // wrong tag
        assert!(!is_tagged_digest(&format!("sha512:{}", "a".repeat(64))));
        // non-hex chars
        assert!(!is_tagged_digest(&format!("sha256:{}", "g".repeat(64))));
    }
}
