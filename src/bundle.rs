//! Execution Run Bundle
//!
//! The artifact being timestamped: one paper-trading run packaged as a single
//! JSON object with a self-fingerprint. A bundle can only be constructed by
//! sealing a [`BundleDraft`], so the fingerprint is always computed over a
//! record that does not yet contain it. Verification reverses the operation:
//! strip the fingerprint field, recompute, compare.

use crate::canonical::CanonicalError;
use crate::digest::{fingerprint_excluding, fingerprint_of};
use serde::{Deserialize, Serialize};

/// Current bundle format version.
pub const BUNDLE_VERSION: u32 = 0;

/// JSON field holding the bundle's self-fingerprint.
pub const BUNDLE_FINGERPRINT_FIELD: &str = "bundleFingerprint";

/// Run configuration, fingerprinted separately so a config change is
/// detectable without diffing the whole bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub symbol: String,
    pub interval: String,
    pub limit: u32,
    pub strategy: String,
    pub fee_bps: u32,
    pub slippage_bps: u32,
    pub qty_btc: f64,
    pub initial_cash: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            interval: "15m".to_string(),
            limit: 500,
            strategy: "ema20x50".to_string(),
            fee_bps: 4,
            slippage_bps: 2,
            qty_btc: 0.01,
            initial_cash: 10_000.0,
        }
    }
}

/// Indicator values observed at signal time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalFeatures {
    pub ema_fast: f64,
    pub ema_slow: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signal {
    #[serde(rename = "type")]
    pub signal_type: String,
    pub strength: u32,
    pub features: SignalFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub mode: String,
    pub side: String,
    pub qty: f64,
    pub slippage_bps: u32,
    pub fee_bps: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    pub status: String,
    pub avg_px: f64,
    pub fee: f64,
}

/// One simulated trade receipt. Event order within a bundle is significant:
/// receipts form an ordered log and reordering them changes the fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    pub ts: String,
    pub market: String,
    pub venue: String,
    pub signal: Signal,
    pub order: Order,
    pub fill: Fill,
}

/// Aggregate run outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub trades: u64,
    pub return_pct: f64,
    pub max_drawdown_pct: f64,
    pub final_equity: f64,
}

/// Bundle contents before sealing. No fingerprint field exists at this
/// stage, which is what makes the self-exclusion rule structural rather
/// than procedural.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleDraft {
    pub bundle_version: u32,
    pub strategy_id: String,
    pub run_id: String,
    pub config: RunConfig,
    pub config_fingerprint: String,
    pub events: Vec<TradeEvent>,
    pub metrics: RunMetrics,
}

/// A sealed run bundle. Obtain one via [`RunBundle::seal`] or by
/// deserializing a stored artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunBundle {
    #[serde(flatten)]
    pub draft: BundleDraft,
    pub bundle_fingerprint: String,
}

/// Fingerprint mismatch: the bundle's contents no longer hash to the stored
/// value. Carries both digests so the caller can report the comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleTampered {
    pub computed: String,
    pub stored: String,
}

impl std::fmt::Display for BundleTampered {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "bundle fingerprint mismatch: computed {} but record stores {}",
            self.computed, self.stored
        )
    }
}

impl std::error::Error for BundleTampered {}

/// Bundle verification failure.
#[derive(Debug, Clone, PartialEq)]
pub enum BundleError {
    Tampered(BundleTampered),
    Canonical(CanonicalError),
}

impl std::fmt::Display for BundleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tampered(e) => write!(f, "{}", e),
            Self::Canonical(e) => write!(f, "canonicalization failed: {}", e),
        }
    }
}

impl std::error::Error for BundleError {}

impl From<CanonicalError> for BundleError {
    fn from(e: CanonicalError) -> Self {
        Self::Canonical(e)
    }
}

impl From<BundleTampered> for BundleError {
    fn from(e: BundleTampered) -> Self {
        Self::Tampered(e)
    }
}

impl RunBundle {
    /// Seal a draft: fingerprint its canonical form, then attach the result.
    pub fn seal(draft: BundleDraft) -> Result<Self, CanonicalError> {
        let bundle_fingerprint = fingerprint_of(&draft)?;
        Ok(Self {
            draft,
            bundle_fingerprint,
        })
    }

    /// Recompute the fingerprint over this bundle with its own fingerprint
    /// field removed, and compare against the stored value.
    ///
    /// Returns the (matching) fingerprint on success so callers can reuse it
    /// without hashing twice.
    pub fn verify_fingerprint(&self) -> Result<String, BundleError> {
        let tree = serde_json::to_value(self)
            .map_err(|e| CanonicalError::Unserializable(e.to_string()))?;
        let computed = fingerprint_excluding(&tree, &[BUNDLE_FINGERPRINT_FIELD])?;
        if computed != self.bundle_fingerprint {
            return Err(BundleError::Tampered(BundleTampered {
                computed,
                stored: self.bundle_fingerprint.clone(),
            }));
        }
        Ok(computed)
    }
}
