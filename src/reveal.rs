//! Reveal Protocol and Reveal Verification
//!
//! The reveal is the public disclosure that closes the commit/reveal loop:
//! the full bundle, the fingerprint that was committed, and (when anchored)
//! a summary pointing at the ledger memo. Its own fingerprint covers the
//! envelope but excludes the embedded bundle, so the reveal pointer stays
//! stable while the bundle remains independently checkable through its own
//! fingerprint.
//!
//! Verification performs two independent recomputations and reports each
//! outcome separately: a tampered bundle with an intact envelope and a
//! tampered envelope around an intact bundle are different findings.

use crate::anchor::AnchorRecord;
use crate::bundle::{RunBundle, BUNDLE_FINGERPRINT_FIELD};
use crate::canonical::CanonicalError;
use crate::digest::{fingerprint_excluding, fingerprint_of};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Kind tag identifying a reveal record.
pub const REVEAL_KIND: &str = "poa-reveal-v0";

/// Top-level fields excluded from the reveal fingerprint.
const REVEAL_FINGERPRINT_FIELD: &str = "revealFingerprint";
const BUNDLE_FIELD: &str = "bundle";

/// Pointer back at the anchored commitment. Absent (`null` on the wire)
/// for an unanchored disclosure, which is allowed but carries no timestamp
/// claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitmentSummary {
    pub ledger_reference: String,
    pub commitment_fingerprint: String,
    pub committed_at: String,
}

impl From<&AnchorRecord> for CommitmentSummary {
    fn from(anchor: &AnchorRecord) -> Self {
        Self {
            ledger_reference: anchor.ledger_reference.clone(),
            commitment_fingerprint: anchor.commitment_fingerprint.clone(),
            committed_at: anchor.commitment_record.ts.clone(),
        }
    }
}

/// Reveal envelope minus the two excluded fields; this is exactly the
/// fingerprint input, so the exclusion rule is structural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RevealCore {
    kind: String,
    ts: String,
    bundle_reference: String,
    bundle_fingerprint: String,
    // None serializes as an explicit null; the field is always present in
    // the hash input either way.
    commitment_summary: Option<CommitmentSummary>,
}

/// The full disclosure artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealRecord {
    pub kind: String,
    pub ts: String,
    /// Name of the bundle artifact this reveal was built from.
    pub bundle_reference: String,
    pub bundle_fingerprint: String,
    pub commitment_summary: Option<CommitmentSummary>,
    pub bundle: RunBundle,
    pub reveal_fingerprint: String,
}

impl RevealRecord {
    /// Whether this reveal points at an anchored commitment. Reported
    /// as-is; re-checking the ledger is `verify_anchor`'s job.
    pub fn anchored(&self) -> bool {
        self.commitment_summary.is_some()
    }
}

/// Outcome of one fingerprint recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CheckOutcome {
    Pass { fingerprint: String },
    Fail { computed: String, stored: String },
}

impl CheckOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }
}

/// Result of verifying a reveal: two independent checks plus the anchored
/// flag, each reported on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevealVerification {
    /// Does the embedded bundle hash to the claimed bundle fingerprint?
    pub bundle_check: CheckOutcome,
    /// Does the reveal envelope hash to the stored reveal fingerprint?
    pub reveal_check: CheckOutcome,
    pub anchored: bool,
}

impl RevealVerification {
    pub fn all_passed(&self) -> bool {
        self.bundle_check.passed() && self.reveal_check.passed()
    }
}

/// Build a reveal from a verified bundle and an optional anchor.
///
/// The bundle's own fingerprint is rechecked first so a reveal can never be
/// built around an already-inconsistent bundle.
pub fn build_reveal(
    bundle: &RunBundle,
    anchor: Option<&AnchorRecord>,
    bundle_reference: &str,
    now: DateTime<Utc>,
) -> Result<RevealRecord, crate::bundle::BundleError> {
    let bundle_fingerprint = bundle.verify_fingerprint()?;

    let core = RevealCore {
        kind: REVEAL_KIND.to_string(),
        ts: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        bundle_reference: bundle_reference.to_string(),
        bundle_fingerprint,
        commitment_summary: anchor.map(CommitmentSummary::from),
    };

    let reveal_fingerprint = fingerprint_of(&core)?;

    Ok(RevealRecord {
        kind: core.kind,
        ts: core.ts,
        bundle_reference: core.bundle_reference,
        bundle_fingerprint: core.bundle_fingerprint,
        commitment_summary: core.commitment_summary,
        bundle: bundle.clone(),
        reveal_fingerprint,
    })
}

/// Verify a reveal record. Both checks always run; one failing does not
/// short-circuit the other.
pub fn verify_reveal(record: &RevealRecord) -> Result<RevealVerification, CanonicalError> {
    // Bundle check: recompute the embedded bundle's fingerprint with its
    // own field excluded, then require agreement with both stored copies
    // (the record-level claim and the bundle's own field).
    let bundle_tree = serde_json::to_value(&record.bundle)
        .map_err(|e| CanonicalError::Unserializable(e.to_string()))?;
    let computed_bundle = fingerprint_excluding(&bundle_tree, &[BUNDLE_FINGERPRINT_FIELD])?;

    let bundle_check = if computed_bundle != record.bundle_fingerprint {
        CheckOutcome::Fail {
            computed: computed_bundle.clone(),
            stored: record.bundle_fingerprint.clone(),
        }
    } else if computed_bundle != record.bundle.bundle_fingerprint {
        CheckOutcome::Fail {
            computed: computed_bundle.clone(),
            stored: record.bundle.bundle_fingerprint.clone(),
        }
    } else {
        CheckOutcome::Pass {
            fingerprint: computed_bundle,
        }
    };

    // Reveal check: recompute over the envelope with the embedded bundle
    // and the stored reveal fingerprint both excluded.
    let reveal_tree = serde_json::to_value(record)
        .map_err(|e| CanonicalError::Unserializable(e.to_string()))?;
    let computed_reveal =
        fingerprint_excluding(&reveal_tree, &[BUNDLE_FIELD, REVEAL_FINGERPRINT_FIELD])?;

    let reveal_check = if computed_reveal == record.reveal_fingerprint {
        CheckOutcome::Pass {
            fingerprint: computed_reveal,
        }
    } else {
        CheckOutcome::Fail {
            computed: computed_reveal,
            stored: record.reveal_fingerprint.clone(),
        }
    };

    Ok(RevealVerification {
        bundle_check,
        reveal_check,
        anchored: record.anchored(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::anchor_bundle;
    use crate::bundle::tests::sample_draft;
    use crate::ledger::MemoryLedger;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 13, 0, 0).unwrap()
    }

    #[test]
    fn test_unanchored_reveal_round_trip() {
        let bundle = RunBundle::seal(sample_draft()).unwrap();
        let reveal = build_reveal(&bundle, None, "bundle-001.json", ts()).unwrap();

        assert_eq!(reveal.kind, REVEAL_KIND);
        assert!(!reveal.anchored());
        assert!(reveal.commitment_summary.is_none());

        let verification = verify_reveal(&reveal).unwrap();
        assert!(verification.all_passed());
        assert!(!verification.anchored);
    }

    #[test]
    fn test_unanchored_summary_serializes_as_explicit_null() {
        let bundle = RunBundle::seal(sample_draft()).unwrap();
        let reveal = build_reveal(&bundle, None, "bundle-001.json", ts()).unwrap();
        let v = serde_json::to_value(&reveal).unwrap();
        assert!(v.get("commitmentSummary").is_some());
        assert!(v["commitmentSummary"].is_null());
    }

    #[tokio::test]
    async fn test_anchored_reveal_round_trip() {
        let ledger = MemoryLedger::new();
        let bundle = RunBundle::seal(sample_draft()).unwrap();
        let anchor = anchor_bundle(&ledger, &bundle, "id-1").await.unwrap();

        let reveal = build_reveal(&bundle, Some(&anchor), "bundle-001.json", ts()).unwrap();
        assert!(reveal.anchored());
        let summary = reveal.commitment_summary.as_ref().unwrap();
        assert_eq!(summary.ledger_reference, anchor.ledger_reference);
        assert_eq!(summary.commitment_fingerprint, anchor.commitment_fingerprint);
        assert_eq!(summary.committed_at, anchor.commitment_record.ts);

        let verification = verify_reveal(&reveal).unwrap();
        assert!(verification.all_passed());
        assert!(verification.anchored);
    }

    #[test]
    fn test_reveal_fingerprint_excludes_bundle_and_itself() {
        let bundle = RunBundle::seal(sample_draft()).unwrap();
        let reveal = build_reveal(&bundle, None, "bundle-001.json", ts()).unwrap();

        let core = RevealCore {
            kind: reveal.kind.clone(),
            ts: reveal.ts.clone(),
            bundle_reference: reveal.bundle_reference.clone(),
            bundle_fingerprint: reveal.bundle_fingerprint.clone(),
            commitment_summary: reveal.commitment_summary.clone(),
        };
        assert_eq!(fingerprint_of(&core).unwrap(), reveal.reveal_fingerprint);
    }

    #[test]
    fn test_cannot_build_reveal_from_tampered_bundle() {
        let mut bundle = RunBundle::seal(sample_draft()).unwrap();
        bundle.draft.metrics.trades += 1;
        assert!(build_reveal(&bundle, None, "bundle-001.json", ts()).is_err());
    }

    #[test]
    fn test_edited_bundle_fingerprint_fails_only_bundle_check() {
        let bundle = RunBundle::seal(sample_draft()).unwrap();
        let mut reveal = build_reveal(&bundle, None, "bundle-001.json", ts()).unwrap();

        // Hand-edit the fingerprint inside the embedded bundle. The reveal
        // envelope never hashed the embedded bundle, so its own check still
        // passes; only the bundle check reports the edit.
        reveal.bundle.bundle_fingerprint = format!("sha256:{}", "0".repeat(64));

        let verification = verify_reveal(&reveal).unwrap();
        assert!(!verification.bundle_check.passed());
        assert!(verification.reveal_check.passed());
        assert!(!verification.all_passed());

        match &verification.bundle_check {
            CheckOutcome::Fail { computed, stored } => {
                assert_eq!(computed, &bundle.bundle_fingerprint);
                assert_eq!(stored, &reveal.bundle.bundle_fingerprint);
            }
            other => panic!("expected Fail, got {:?}", other),
        }
    }

    #[test]
    fn test_edited_bundle_contents_fail_bundle_check_independently() {
        let bundle = RunBundle::seal(sample_draft()).unwrap();
        let mut reveal = build_reveal(&bundle, None, "bundle-001.json", ts()).unwrap();
        reveal.bundle.draft.metrics.final_equity *= 2.0;

        let verification = verify_reveal(&reveal).unwrap();
        assert!(!verification.bundle_check.passed());
        assert!(verification.reveal_check.passed());
    }

    #[test]
    fn test_edited_envelope_fails_only_reveal_check() {
        let bundle = RunBundle::seal(sample_draft()).unwrap();
        let mut reveal = build_reveal(&bundle, None, "bundle-001.json", ts()).unwrap();
        reveal.ts = "2030-01-01T00:00:00.000Z".to_string();

        let verification = verify_reveal(&reveal).unwrap();
        assert!(verification.bundle_check.passed());
        assert!(!verification.reveal_check.passed());
    }

    #[test]
    fn test_serde_round_trip() {
        let bundle = RunBundle::seal(sample_draft()).unwrap();
        let reveal = build_reveal(&bundle, None, "bundle-001.json", ts()).unwrap();
        let text = serde_json::to_string_pretty(&reveal).unwrap();
        let back: RevealRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, reveal);
        assert!(verify_reveal(&back).unwrap().all_passed());
    }
}
