//! Prove CLI
//!
//! End-to-end pipeline driver: build a bundle from live candles, anchor its
//! fingerprint on the ledger, then independently verify that the ledger
//! memo matches the local bundle. One command from market data to a
//! verified timestamp claim.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin prove -- --ledger-url http://127.0.0.1:8899
//! ```
//!
//! # Exit Codes
//!
//! - 0: Bundle built, anchored, and verified
//! - 1: Verification failed after anchoring
//! - 2: Configuration error
//! - 3: Runtime error (market data, ledger, I/O)

use chrono::Utc;
use proof_of_alpha::anchor::{anchor_bundle, verify_anchor, AnchorError};
use proof_of_alpha::ledger::{
    default_identity_path, load_or_create_identity, HttpLedgerGateway, RetryPolicy,
};
use proof_of_alpha::market_data::{CandleFeed, MarketDataSource};
use proof_of_alpha::paper_trade::build_run_bundle;
use proof_of_alpha::store::{ArtifactStore, DEFAULT_OUT_DIR};
use proof_of_alpha::RunConfig;
use std::env;
use std::path::PathBuf;

const DEFAULT_LEDGER_URL: &str = "http://127.0.0.1:8899";

#[derive(Debug, Clone)]
struct CliArgs {
    ledger_url: String,
    identity_path: Option<String>,
    out_dir: String,
    limit: u32,
}

impl CliArgs {
    fn parse() -> Result<Self, String> {
        let args: Vec<String> = env::args().collect();
        let mut i = 1;

        let mut ledger_url =
            env::var("POA_LEDGER_URL").unwrap_or_else(|_| DEFAULT_LEDGER_URL.to_string());
        let mut identity_path = env::var("POA_IDENTITY_PATH").ok();
        let mut out_dir =
            env::var("POA_OUT_DIR").unwrap_or_else(|_| DEFAULT_OUT_DIR.to_string());
        let mut limit = 500u32;

        while i < args.len() {
            match args[i].as_str() {
                "--ledger-url" => {
                    i += 1;
                    ledger_url = args.get(i).ok_or("--ledger-url requires a URL")?.clone();
                }
                "--identity" => {
                    i += 1;
                    identity_path = Some(args.get(i).ok_or("--identity requires a path")?.clone());
                }
                "--out" | "-o" => {
                    i += 1;
                    out_dir = args.get(i).ok_or("--out requires a path")?.clone();
                }
                "--limit" | "-l" => {
                    i += 1;
                    let s = args.get(i).ok_or("--limit requires a number")?;
                    limit = s.parse().map_err(|e| format!("Invalid limit: {}", e))?;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                arg => return Err(format!("Unknown argument: {}", arg)),
            }
            i += 1;
        }

        Ok(Self {
            ledger_url,
            identity_path,
            out_dir,
            limit,
        })
    }
}

fn print_usage() {
    eprintln!(
        r#"
prove - build, anchor, and verify a run bundle in one step

USAGE:
    prove [OPTIONS]

OPTIONS:
    --ledger-url <URL>   Memo ledger endpoint (default: http://127.0.0.1:8899,
                         env POA_LEDGER_URL)
    --identity <PATH>    Submitter identity file (default:
                         ~/.config/proof-of-alpha/identity.hex, env POA_IDENTITY_PATH)
    --out, -o <DIR>      Artifact directory (default: ./out, env POA_OUT_DIR)
    --limit, -l <N>      Candles to fetch (default: 500)
    --help, -h           Show this help

EXIT CODES:
    0  Bundle built, anchored, and verified
    1  Verification failed after anchoring
    2  Configuration error
    3  Runtime error
"#
    );
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .init();
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    init_tracing();

    let args = match CliArgs::parse() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_usage();
            std::process::exit(2);
        }
    };

    let store = match ArtifactStore::new(&args.out_dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error opening artifact store: {}", e);
            std::process::exit(3);
        }
    };

    // [1/3] build the bundle
    eprintln!("[1/3] generating bundle (paper demo)");
    let config = RunConfig {
        limit: args.limit,
        ..RunConfig::default()
    };
    let feed = match CandleFeed::btcusdt_15m() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error building candle feed: {:#}", e);
            std::process::exit(3);
        }
    };
    let candles = match feed.fetch_candles(args.limit as usize).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error fetching candles: {:#}", e);
            std::process::exit(3);
        }
    };
    let now = Utc::now();
    let bundle = match build_run_bundle(&candles, &config, now) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error building bundle: {:#}", e);
            std::process::exit(3);
        }
    };
    let bundle_path = match store.write_json("bundle", now.timestamp_millis(), &bundle) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error writing bundle: {}", e);
            std::process::exit(3);
        }
    };

    // [2/3] anchor the fingerprint
    eprintln!("[2/3] anchoring bundle fingerprint on the ledger");
    let identity_path = match &args.identity_path {
        Some(p) => PathBuf::from(p),
        None => match default_identity_path() {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                std::process::exit(2);
            }
        },
    };
    let identity = match load_or_create_identity(&identity_path) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Error loading identity: {:#}", e);
            std::process::exit(3);
        }
    };
    let gateway = match HttpLedgerGateway::new(&args.ledger_url, RetryPolicy::default()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error building ledger client: {:#}", e);
            std::process::exit(3);
        }
    };
    let anchor = match anchor_bundle(&gateway, &bundle, &identity).await {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error anchoring commitment: {}", e);
            std::process::exit(3);
        }
    };
    if let Err(e) = store.write_json("anchor", Utc::now().timestamp_millis(), &anchor) {
        eprintln!("Error writing anchor record: {}", e);
        std::process::exit(3);
    }

    // [3/3] verify independently
    eprintln!("[3/3] verifying ledger memo against local bundle");
    let verification = match verify_anchor(&gateway, &anchor.ledger_reference, &bundle).await {
        Ok(v) => v,
        Err(e @ AnchorError::Ledger(_)) | Err(e @ AnchorError::Canonical(_)) => {
            eprintln!("Error: {}", e);
            std::process::exit(3);
        }
        Err(e) => {
            eprintln!("Verification failed: {}", e);
            std::process::exit(1);
        }
    };

    let summary = serde_json::json!({
        "ok": true,
        "bundlePath": bundle_path.display().to_string(),
        "ledgerReference": anchor.ledger_reference,
        "bundleFingerprint": verification.bundle_fingerprint,
        "commitmentFingerprint": verification.commitment_fingerprint,
        "committedAt": verification.committed_at,
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("JSON serialization error: {}", e);
            std::process::exit(3);
        }
    }
}
