//! Verify Reveal CLI
//!
//! Recomputes both fingerprints in a reveal artifact and reports each check
//! separately: the embedded bundle against the claimed bundle fingerprint,
//! and the reveal envelope against its own stored fingerprint. Runs fully
//! offline; checking the anchor against the ledger is verify_anchor's job.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin verify_reveal -- --reveal ./out/reveal-1717200200000.json
//! ```
//!
//! # Exit Codes
//!
//! - 0: Both checks passed
//! - 1: At least one check failed
//! - 2: Configuration error
//! - 3: Runtime error (I/O)

use proof_of_alpha::reveal::verify_reveal;
use proof_of_alpha::store::ArtifactStore;
use proof_of_alpha::RevealRecord;
use std::env;
use std::path::Path;

#[derive(Debug, Clone)]
struct CliArgs {
    reveal_path: String,
}

impl CliArgs {
    fn parse() -> Result<Self, String> {
        let args: Vec<String> = env::args().collect();
        let mut i = 1;

        let mut reveal_path = None;

        while i < args.len() {
            match args[i].as_str() {
                "--reveal" | "-r" => {
                    i += 1;
                    reveal_path = Some(args.get(i).ok_or("--reveal requires a path")?.clone());
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
            reveal_path: reveal_path.ok_or("--reveal is required")?,
        })
    }
}

fn print_usage() {
    eprintln!(
        r#"
verify_reveal - recheck both fingerprints in a reveal artifact

USAGE:
    verify_reveal --reveal <PATH>

REQUIRED:
    --reveal, -r <PATH>  Reveal JSON path

OPTIONS:
    --help, -h           Show this help

EXIT CODES:
    0  Both checks passed
    1  At least one check failed
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

fn main() {
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

    let record: RevealRecord = match ArtifactStore::read_json(Path::new(&args.reveal_path)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error reading reveal {}: {}", args.reveal_path, e);
            std::process::exit(2);
        }
    };

    let verification = match verify_reveal(&record) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error verifying reveal: {}", e);
            std::process::exit(3);
        }
    };

    let all_passed = verification.all_passed();
    let summary = serde_json::json!({
        "ok": all_passed,
        "bundleCheck": verification.bundle_check,
        "revealCheck": verification.reveal_check,
        "anchored": verification.anchored,
        "bundleFingerprint": record.bundle_fingerprint,
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("JSON serialization error: {}", e);
            std::process::exit(3);
        }
    }

    if !all_passed {
        std::process::exit(1);
    }
}
