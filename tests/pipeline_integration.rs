//! End-to-end pipeline test: build a bundle from fixed candles, anchor it
//! on the in-memory ledger, verify the anchor, reveal, and verify the
//! reveal — then repeat the verifications against tampered artifacts.

use proof_of_alpha::anchor::{anchor_bundle, verify_anchor, AnchorError};
use proof_of_alpha::ledger::MemoryLedger;
use proof_of_alpha::market_data::{Candle, FixedCandles, MarketDataSource};
use proof_of_alpha::paper_trade::build_run_bundle;
use proof_of_alpha::reveal::{build_reveal, verify_reveal};
use proof_of_alpha::store::ArtifactStore;
use proof_of_alpha::{RevealRecord, RunBundle, RunConfig};

use chrono::{TimeZone, Utc};

/// Price path with one clean EMA crossover round trip.
fn demo_candles() -> Vec<Candle> {
    let mut closes = vec![30_000.0; 80];
    for i in 0..20 {
        closes.push(30_000.0 + (i + 1) as f64 * 400.0);
    }
    closes.extend(vec![38_000.0; 10]);
    for i in 0..30 {
        closes.push(38_000.0 - (i + 1) as f64 * 400.0);
    }
    closes.extend(vec![26_000.0; 20]);

    closes
        .into_iter()
        .enumerate()
        .map(|(i, close)| {
            let open_time_ms = 1_717_200_000_000 + (i as i64) * 900_000;
            Candle {
                open_time_ms,
                close_time_ms: open_time_ms + 899_999,
                open: close,
                high: close,
                low: close,
                close,
                volume: 2.5,
            }
        })
        .collect()
}

async fn built_bundle() -> RunBundle {
    let source = FixedCandles(demo_candles());
    let candles = source.fetch_candles(500).await.unwrap();
    let now = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
    build_run_bundle(&candles, &RunConfig::default(), now).unwrap()
}

#[tokio::test]
async fn full_pipeline_through_reveal() {
    let ledger = MemoryLedger::new();
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path()).unwrap();

    // Build and persist the bundle.
    let bundle = built_bundle().await;
    assert!(bundle.draft.metrics.trades >= 2);
    let bundle_path = store.write_json("bundle", 1, &bundle).unwrap();

    // Anchor and verify against the ledger.
    let anchor = anchor_bundle(&ledger, &bundle, "integration-id").await.unwrap();
    let verification = verify_anchor(&ledger, &anchor.ledger_reference, &bundle)
        .await
        .unwrap();
    assert_eq!(verification.bundle_fingerprint, bundle.bundle_fingerprint);

    // Reveal and verify offline.
    let reveal = build_reveal(
        &bundle,
        Some(&anchor),
        "bundle-1.json",
        Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap(),
    )
    .unwrap();
    let reveal_path = store.write_json("reveal", 2, &reveal).unwrap();

    let loaded: RevealRecord = ArtifactStore::read_json(&reveal_path).unwrap();
    let outcome = verify_reveal(&loaded).unwrap();
    assert!(outcome.all_passed());
    assert!(outcome.anchored);

    // The persisted bundle still verifies after a read round trip.
    let reloaded: RunBundle = ArtifactStore::read_json(&bundle_path).unwrap();
    assert!(reloaded.verify_fingerprint().is_ok());
}

#[tokio::test]
async fn pipeline_detects_post_anchor_tampering() {
    let ledger = MemoryLedger::new();
    let bundle = built_bundle().await;
    let anchor = anchor_bundle(&ledger, &bundle, "integration-id").await.unwrap();

    // Improve the numbers after committing.
    let mut tampered = bundle.clone();
    tampered.draft.metrics.return_pct += 50.0;

    let err = verify_anchor(&ledger, &anchor.ledger_reference, &tampered)
        .await
        .unwrap_err();
    assert!(matches!(err, AnchorError::BundleTampered(_)));

    // Re-sealing the tampered contents produces a valid bundle, but the
    // ledger still holds the original commitment.
    let resealed = RunBundle::seal(tampered.draft).unwrap();
    let err = verify_anchor(&ledger, &anchor.ledger_reference, &resealed)
        .await
        .unwrap_err();
    match err {
        AnchorError::CommitmentMismatch { committed, local } => {
            assert_eq!(committed, bundle.bundle_fingerprint);
            assert_eq!(local, resealed.bundle_fingerprint);
        }
        other => panic!("expected CommitmentMismatch, got {:?}", other),
    }
}

#[tokio::test]
async fn unanchored_reveal_is_distinguishable() {
    let bundle = built_bundle().await;
    let reveal = build_reveal(
        &bundle,
        None,
        "bundle-1.json",
        Utc.with_ymd_and_hms(2025, 6, 3, 9, 0, 0).unwrap(),
    )
    .unwrap();

    let outcome = verify_reveal(&reveal).unwrap();
    assert!(outcome.all_passed());
    assert!(!outcome.anchored);

    let wire = serde_json::to_value(&reveal).unwrap();
    assert!(wire["commitmentSummary"].is_null());
}
