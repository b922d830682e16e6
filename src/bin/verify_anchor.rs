//! Verify Anchor CLI
//!
//! Independently checks that a ledger memo commits to a local bundle:
//! recomputes the bundle fingerprint, fetches the payload at the given
//! reference, and compares. This is the check a third party runs with
//! nothing but the reference and the disclosed bundle.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin verify_anchor -- --reference memo-00000001 \
//!   --bundle ./out/bundle-1717200000000.json
//! ```
//!
//! # Exit Codes
//!
//! - 0: Verified, ledger commits to this bundle
//! - 1: Verification failed (tampered bundle, mismatched or malformed
//!      commitment, or memo not yet available)
//! - 2: Configuration error
//! - 3: Runtime error (ledger transport, I/O)

use proof_of_alpha::anchor::{verify_anchor, AnchorError};
use proof_of_alpha::ledger::{HttpLedgerGateway, RetryPolicy};
use proof_of_alpha::store::{ArtifactStore, DEFAULT_OUT_DIR};
use proof_of_alpha::RunBundle;
use std::env;
use std::path::PathBuf;

const DEFAULT_LEDGER_URL: &str = "http://127.0.0.1:8899";

#[derive(Debug, Clone)]
struct CliArgs {
    reference: String,
    bundle_path: Option<String>,
    ledger_url: String,
    out_dir: String,
}

impl CliArgs {
    fn parse() -> Result<Self, String> {
        let args: Vec<String> = env::args().collect();
        let mut i = 1;

        let mut reference = None;
        let mut bundle_path = None;
        let mut ledger_url =
            env::var("POA_LEDGER_URL").unwrap_or_else(|_| DEFAULT_LEDGER_URL.to_string());
        let mut out_dir =
            env::var("POA_OUT_DIR").unwrap_or_else(|_| DEFAULT_OUT_DIR.to_string());

        while i < args.len() {
            match args[i].as_str() {
                "--reference" | "-r" => {
                    i += 1;
                    reference = Some(args.get(i).ok_or("--reference requires a value")?.clone());
                }
                "--bundle" | "-b" => {
                    i += 1;
                    bundle_path = Some(args.get(i).ok_or("--bundle requires a path")?.clone());
                }
                "--ledger-url" => {
                    i += 1;
                    ledger_url = args.get(i).ok_or("--ledger-url requires a URL")?.clone();
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
            reference: reference.ok_or("--reference is required")?,
            bundle_path,
            ledger_url,
            out_dir,
        })
    }
}

fn print_usage() {
    eprintln!(
        r#"
verify_anchor - check that a ledger memo commits to a local bundle

USAGE:
    verify_anchor --reference <REF> [OPTIONS]

REQUIRED:
    --reference, -r <REF>  Ledger reference returned at commit time

OPTIONS:
    --bundle, -b <PATH>    Bundle JSON path (default: latest bundle-*.json in --out)
    --ledger-url <URL>     Memo ledger endpoint (default: http://127.0.0.1:8899,
                           env POA_LEDGER_URL)
    --out, -o <DIR>        Artifact directory (default: ./out, env POA_OUT_DIR)
    --help, -h             Show this help

EXIT CODES:
    0  Verified
    1  Verification failed
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
                eprintln!("Error: {} (pass --bundle)", e);
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

    let gateway = match HttpLedgerGateway::new(&args.ledger_url, RetryPolicy::default()) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("Error building ledger client: {:#}", e);
            std::process::exit(3);
        }
    };

    match verify_anchor(&gateway, &args.reference, &bundle).await {
        Ok(verification) => {
            let summary = serde_json::json!({
                "ok": true,
                "ledgerReference": verification.ledger_reference,
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
        Err(e @ AnchorError::Ledger(_)) | Err(e @ AnchorError::Canonical(_)) => {
            eprintln!("Error: {}", e);
            std::process::exit(3);
        }
        Err(e) => {
            if e.is_retryable() {
                eprintln!("Not verified (retryable): {}", e);
            } else {
                eprintln!("Verification failed: {}", e);
            }
            std::process::exit(1);
        }
    }
}
