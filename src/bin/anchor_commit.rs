//! Anchor Commit CLI
//!
//! Commits a bundle's fingerprint to the ledger: verifies the bundle, builds
//! a fresh commitment record, submits its canonical payload as a memo, and
//! writes the resulting anchor record to the artifact store. The bundle
//! contents never leave the machine; only the commitment does.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin anchor_commit -- --bundle ./out/bundle-1717200000000.json
//! ```
//!
//! # Exit Codes
//!
//! - 0: Commitment anchored
//! - 1: Bundle failed its integrity check
//! - 2: Configuration error
//! - 3: Runtime error (ledger, I/O)

use proof_of_alpha::anchor::{anchor_bundle, AnchorError};
use proof_of_alpha::ledger::{
    default_identity_path, load_or_create_identity, HttpLedgerGateway, RetryPolicy,
};
use proof_of_alpha::store::{ArtifactStore, DEFAULT_OUT_DIR};
use proof_of_alpha::RunBundle;
use std::env;
use std::path::PathBuf;

const DEFAULT_LEDGER_URL: &str = "http://127.0.0.1:8899";

#[derive(Debug, Clone)]
struct CliArgs {
    bundle_path: Option<String>,
    ledger_url: String,
    identity_path: Option<String>,
    out_dir: String,
}

impl CliArgs {
    fn parse() -> Result<Self, String> {
        let args: Vec<String> = env::args().collect();
        let mut i = 1;

        let mut bundle_path = None;
        let mut ledger_url =
            env::var("POA_LEDGER_URL").unwrap_or_else(|_| DEFAULT_LEDGER_URL.to_string());
        let mut identity_path = env::var("POA_IDENTITY_PATH").ok();
        let mut out_dir =
            env::var("POA_OUT_DIR").unwrap_or_else(|_| DEFAULT_OUT_DIR.to_string());

        while i < args.len() {
            match args[i].as_str() {
                "--bundle" | "-b" => {
                    i += 1;
                    bundle_path = Some(args.get(i).ok_or("--bundle requires a path")?.clone());
                }
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
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                arg => return Err(format!("Unknown argument: {}", arg)),
            }
            i += 1;
        }

        Ok(Self {
            bundle_path,
            ledger_url,
            identity_path,
            out_dir,
        })
    }
}

fn print_usage() {
    eprintln!(
        r#"
anchor_commit - commit a bundle fingerprint to the ledger

USAGE:
    anchor_commit [OPTIONS]

OPTIONS:
    --bundle, -b <PATH>   Bundle JSON path (default: latest bundle-*.json in --out)
    --ledger-url <URL>    Memo ledger endpoint (default: http://127.0.0.1:8899,
                          env POA_LEDGER_URL)
    --identity <PATH>     Submitter identity file (default:
                          ~/.config/proof-of-alpha/identity.hex, env POA_IDENTITY_PATH)
    --out, -o <DIR>       Artifact directory (default: ./out, env POA_OUT_DIR)
    --help, -h            Show this help

EXIT CODES:
    0  Commitment anchored
    1  Bundle failed its integrity check
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

    let bundle_path = match &args.bundle_path {
        Some(p) => PathBuf::from(p),
        None => match store.latest("bundle") {
            Ok(p) => p,
            Err(e) => {
                eprintln!("Error: {} (run paper_demo first, or pass --bundle)", e);
                std::process::exit(2);
            }
        },
    };

    let bundle: RunBundle = match ArtifactStore::read_json(&bundle_path) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Error reading bundle {}: {}", bundle_path.display(), e);
            std::process::exit(2);
        }
    };

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
        Err(AnchorError::BundleTampered(t)) => {
            eprintln!("Integrity check failed: {}", t);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error anchoring commitment: {}", e);
            std::process::exit(3);
        }
    };

    let out_path = match store.write_json(
        "anchor",
        chrono::Utc::now().timestamp_millis(),
        &anchor,
    ) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error writing anchor record: {}", e);
            std::process::exit(3);
        }
    };

    let summary = serde_json::json!({
        "ok": true,
        "outPath": out_path.display().to_string(),
        "ledgerReference": anchor.ledger_reference,
        "bundleFingerprint": anchor.bundle_fingerprint,
        "commitmentFingerprint": anchor.commitment_fingerprint,
        "committedAt": anchor.commitment_record.ts,
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("JSON serialization error: {}", e);
            std::process::exit(3);
        }
    }
}
