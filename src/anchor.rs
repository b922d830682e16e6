//! Anchoring and Anchor Verification
//!
//! Ties a local bundle to a ledger memo. [`anchor_bundle`] performs one
//! commit attempt end to end: verify the bundle, build a fresh commitment
//! (fresh timestamp per attempt), submit, and return the anchor record.
//! [`verify_anchor`] is the independent check a third party runs later:
//! given only a ledger reference and a bundle, confirm the ledger committed
//! to exactly this bundle. All checks fail closed; the first failed step
//! aborts verification.

use crate::bundle::{BundleError, BundleTampered, RunBundle};
use crate::canonical::CanonicalError;
use crate::commit::{build_commitment, CommitError, CommitMetadata, CommitmentRecord, COMMIT_KIND};
use crate::ledger::{LedgerError, LedgerGateway};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Durable record of a successful submission, written once at anchor time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRecord {
    pub ledger_reference: String,
    pub submitter_identity: String,
    pub commitment_record: CommitmentRecord,
    pub commitment_fingerprint: String,
    pub bundle_fingerprint: String,
}

/// Successful anchor verification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorVerification {
    pub ledger_reference: String,
    pub bundle_fingerprint: String,
    pub commitment_fingerprint: String,
    pub committed_at: String,
}

/// Shape of a well-formed ledger payload: a commitment record plus its own
/// fingerprint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerPayload {
    #[serde(flatten)]
    record: CommitmentRecord,
    commitment_fingerprint: String,
}

/// Anchoring / anchor verification failure.
#[derive(Debug)]
pub enum AnchorError {
    /// The local bundle fails its own fingerprint check. Detected before
    /// any network traffic.
    BundleTampered(BundleTampered),
    /// The ledger payload at the reference does not parse as a commitment.
    MalformedPayload { reference: String, reason: String },
    /// The ledger committed to a different bundle fingerprint than the
    /// local one. Both values carried for reporting.
    CommitmentMismatch { committed: String, local: String },
    /// The memo is not visible on the ledger yet; retry later.
    NotYetAvailable { reference: String },
    Commit(CommitError),
    Canonical(CanonicalError),
    Ledger(LedgerError),
}

impl std::fmt::Display for AnchorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BundleTampered(e) => write!(f, "{}", e),
            Self::MalformedPayload { reference, reason } => {
                write!(f, "ledger payload at {} is malformed: {}", reference, reason)
            }
            Self::CommitmentMismatch { committed, local } => write!(
                f,
                "ledger committed to {} but local bundle is {}",
                committed, local
            ),
            Self::NotYetAvailable { reference } => {
                write!(f, "memo {} not yet available; retry later", reference)
            }
            Self::Commit(e) => write!(f, "{}", e),
            Self::Canonical(e) => write!(f, "canonicalization failed: {}", e),
            Self::Ledger(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AnchorError {}

impl AnchorError {
    /// Whether re-running the same verification later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotYetAvailable { .. })
    }
}

impl From<BundleError> for AnchorError {
    fn from(e: BundleError) -> Self {
        match e {
            BundleError::Tampered(t) => Self::BundleTampered(t),
            BundleError::Canonical(c) => Self::Canonical(c),
        }
    }
}

impl From<CommitError> for AnchorError {
    fn from(e: CommitError) -> Self {
        Self::Commit(e)
    }
}

impl From<LedgerError> for AnchorError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotYetAvailable { reference } => Self::NotYetAvailable { reference },
            other => Self::Ledger(other),
        }
    }
}

/// One commit attempt: verify the bundle, build a commitment stamped with
/// the current time, submit its payload, record the result.
///
/// A failed attempt leaves nothing behind; retrying calls this again and
/// gets a fresh commitment with a fresh timestamp rather than reusing a
/// stale record.
pub async fn anchor_bundle(
    gateway: &dyn LedgerGateway,
    bundle: &RunBundle,
    identity: &str,
) -> Result<AnchorRecord, AnchorError> {
    let bundle_fingerprint = bundle.verify_fingerprint()?;
    debug!(%bundle_fingerprint, "bundle verified; building commitment");

    let metadata = CommitMetadata {
        strategy_id: bundle.draft.strategy_id.clone(),
        run_id: bundle.draft.run_id.clone(),
    };
    let commitment = build_commitment(&bundle_fingerprint, &metadata, Utc::now())?;

    let ledger_reference = gateway.submit(&commitment.payload, identity).await?;
    info!(
        %ledger_reference,
        commitment_fingerprint = %commitment.commitment_fingerprint,
        "commitment anchored"
    );

    Ok(AnchorRecord {
        ledger_reference,
        submitter_identity: identity.to_string(),
        commitment_record: commitment.record,
        commitment_fingerprint: commitment.commitment_fingerprint,
        bundle_fingerprint,
    })
}

/// Verify that the ledger memo at `reference` commits to exactly `bundle`.
///
/// Steps, in order, each failing closed:
/// 1. recompute the bundle's own fingerprint (excluding the stored field);
/// 2. fetch the payload; absence is the retryable not-yet-available case;
/// 3. parse the payload as a kind-tagged commitment;
/// 4. compare the committed fingerprint to the local one;
/// 5. report the match with the committed timestamp.
pub async fn verify_anchor(
    gateway: &dyn LedgerGateway,
    reference: &str,
    bundle: &RunBundle,
) -> Result<AnchorVerification, AnchorError> {
    let local = bundle.verify_fingerprint()?;

    let payload = gateway
        .fetch(reference)
        .await?
        .ok_or_else(|| AnchorError::NotYetAvailable {
            reference: reference.to_string(),
        })?;

    let parsed: LedgerPayload =
        serde_json::from_slice(&payload).map_err(|e| AnchorError::MalformedPayload {
            reference: reference.to_string(),
            reason: e.to_string(),
        })?;

    if parsed.record.kind != COMMIT_KIND {
        return Err(AnchorError::MalformedPayload {
            reference: reference.to_string(),
            reason: format!("unexpected kind tag {:?}", parsed.record.kind),
        });
    }

    if parsed.record.bundle_fingerprint != local {
        return Err(AnchorError::CommitmentMismatch {
            committed: parsed.record.bundle_fingerprint,
            local,
        });
    }

    Ok(AnchorVerification {
        ledger_reference: reference.to_string(),
        bundle_fingerprint: local,
        commitment_fingerprint: parsed.commitment_fingerprint,
        committed_at: parsed.record.ts,
    })
}
