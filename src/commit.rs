//! Commit Protocol
//!
//! Derives the small public commitment that goes on the ledger: it names the
//! bundle fingerprint and run identifiers, but reveals nothing about the
//! bundle contents. The ledger payload is the canonical serialization of the
//! record plus the record's own fingerprint, so a verifier can check the
//! payload without any out-of-band data.

use crate::canonical::{canonicalize, CanonicalError};
use crate::digest::{fingerprint_of, is_tagged_digest};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Kind tag identifying a commitment payload on the ledger.
pub const COMMIT_KIND: &str = "poa-commit-v0";

/// JSON field carrying the commitment's self-fingerprint in the payload.
pub const COMMITMENT_FINGERPRINT_FIELD: &str = "commitmentFingerprint";

/// The committed claim: "this bundle fingerprint existed at this time,
/// produced by this strategy/run". Timestamp is read once at construction
/// and reused everywhere the record appears; a retried submission must build
/// a fresh record rather than reuse a stale one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentRecord {
    pub kind: String,
    pub ts: String,
    pub bundle_fingerprint: String,
    pub strategy_id: String,
    pub run_id: String,
}

/// Identifiers carried from the bundle into the commitment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMetadata {
    pub strategy_id: String,
    pub run_id: String,
}

/// Output of [`build_commitment`]: the record, its fingerprint, and the
/// exact bytes to submit to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment {
    pub record: CommitmentRecord,
    pub commitment_fingerprint: String,
    pub payload: Vec<u8>,
}

/// Commitment construction failure.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitError {
    /// The supplied bundle fingerprint is not a well-formed tagged digest.
    /// Rejected before any hashing happens.
    InvalidFingerprint { value: String },
    Canonical(CanonicalError),
}

impl std::fmt::Display for CommitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidFingerprint { value } => write!(
                f,
                "bundle fingerprint is not a tagged sha256 digest: {:?}",
                value
            ),
            Self::Canonical(e) => write!(f, "canonicalization failed: {}", e),
        }
    }
}

impl std::error::Error for CommitError {}

impl From<CanonicalError> for CommitError {
    fn from(e: CanonicalError) -> Self {
        Self::Canonical(e)
    }
}

/// Build a commitment over an already-verified bundle fingerprint.
///
/// The payload is the canonical form of the record's fields plus
/// `commitmentFingerprint`; the fingerprint itself is computed over the
/// record alone, never over a payload that contains it.
pub fn build_commitment(
    bundle_fingerprint: &str,
    metadata: &CommitMetadata,
    now: DateTime<Utc>,
) -> Result<Commitment, CommitError> {
    if !is_tagged_digest(bundle_fingerprint) {
        return Err(CommitError::InvalidFingerprint {
            value: bundle_fingerprint.to_string(),
        });
    }

    let record = CommitmentRecord {
        kind: COMMIT_KIND.to_string(),
        ts: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        bundle_fingerprint: bundle_fingerprint.to_string(),
        strategy_id: metadata.strategy_id.clone(),
        run_id: metadata.run_id.clone(),
    };

    let commitment_fingerprint = fingerprint_of(&record)?;

    let mut payload_tree = serde_json::to_value(&record)
        .map_err(|e| CanonicalError::Unserializable(e.to_string()))
        .map_err(CommitError::Canonical)?;
    if let Some(map) = payload_tree.as_object_mut() {
        map.insert(
            COMMITMENT_FINGERPRINT_FIELD.to_string(),
            serde_json::Value::String(commitment_fingerprint.clone()),
        );
    }
    let payload = canonicalize(&payload_tree)?.into_bytes();

    Ok(Commitment {
        record,
        commitment_fingerprint,
        payload,
    })
}
