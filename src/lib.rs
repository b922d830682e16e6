//! Proof-of-Alpha
//!
//! Tamper-evident timestamping for trading-strategy runs: prove a result
//! was computed before a point in time without revealing it until later.
//!
//! The pipeline is a strict sequence of pure derivations around one ledger
//! write:
//!
//! ```text
//! candles -> paper trade -> RunBundle (sealed, self-fingerprinted)
//!         -> CommitmentRecord -> canonical payload -> ledger memo
//!         -> AnchorRecord
//!         -> RevealRecord (bundle + commitment summary, self-fingerprinted)
//! ```
//!
//! Every hashed artifact follows the same two rules: hashes are computed
//! over canonical JSON (sorted keys, no whitespace), and a record's own
//! fingerprint field is never part of its hash input.

pub mod anchor;
pub mod bundle;
pub mod canonical;
pub mod commit;
pub mod digest;
pub mod ledger;
pub mod market_data;
pub mod paper_trade;
pub mod reveal;
pub mod store;

pub use anchor::{anchor_bundle, verify_anchor, AnchorError, AnchorRecord, AnchorVerification};
pub use bundle::{
    BundleDraft, BundleError, BundleTampered, RunBundle, RunConfig, RunMetrics, TradeEvent,
    BUNDLE_VERSION,
};
pub use canonical::{canonicalize, CanonicalError, MAX_CANONICAL_DEPTH};
pub use commit::{
    build_commitment, CommitError, CommitMetadata, Commitment, CommitmentRecord, COMMIT_KIND,
};
pub use digest::{digest_bytes, fingerprint, fingerprint_of, is_tagged_digest, DIGEST_PREFIX};
pub use ledger::{
    default_identity_path, load_or_create_identity, HttpLedgerGateway, LedgerError, LedgerGateway,
    MemoryLedger, RetryPolicy,
};
pub use market_data::{
    BinanceKlines, Candle, CandleFeed, FixedCandles, KrakenOhlc, MarketDataSource,
};
pub use paper_trade::{build_run_bundle, run_paper_trade, PaperRun, PaperTradeError, STRATEGY_ID};
pub use reveal::{
    build_reveal, verify_reveal, CheckOutcome, CommitmentSummary, RevealRecord, RevealVerification,
    REVEAL_KIND,
};
pub use store::{ArtifactStore, StoreError, DEFAULT_OUT_DIR};
