//! Reveal CLI
//!
//! Packages a bundle and (optionally) its anchor into the public disclosure
//! artifact. Without an anchor the reveal is still valid, it just carries a
//! `null` commitment summary and therefore no timestamp claim.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin reveal -- \
//!   --bundle ./out/bundle-1717200000000.json \
//!   --anchor ./out/anchor-1717200100000.json
//! ```
//!
//! # Exit Codes
//!
//! - 0: Reveal written
//! - 1: Bundle failed its integrity check
//! - 2: Configuration error
//! - 3: Runtime error (I/O)

use proof_of_alpha::bundle::BundleError;
use proof_of_alpha::reveal::build_reveal;
use proof_of_alpha::store::{ArtifactStore, DEFAULT_OUT_DIR};
use proof_of_alpha::{AnchorRecord, RunBundle};
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct CliArgs {
    bundle_path: Option<String>,
    anchor_path: Option<String>,
    out_dir: String,
}

impl CliArgs {
    fn parse() -> Result<Self, String> {
        let args: Vec<String> = env::args().collect();
        let mut i = 1;

        let mut bundle_path = None;
        let mut anchor_path = None;
        let mut out_dir =
            env::var("POA_OUT_DIR").unwrap_or_else(|_| DEFAULT_OUT_DIR.to_string());

        while i < args.len() {
            match args[i].as_str() {
                "--bundle" | "-b" => {
                    i += 1;
                    bundle_path = Some(args.get(i).ok_or("--bundle requires a path")?.clone());
                }
                "--anchor" | "-a" => {
                    i += 1;
                    anchor_path = Some(args.get(i).ok_or("--anchor requires a path")?.clone());
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
            anchor_path,
            out_dir,
        })
    }
}

fn print_usage() {
    eprintln!(
        r#"
reveal - package a bundle and its anchor into a disclosure artifact

USAGE:
    reveal [OPTIONS]

OPTIONS:
    --bundle, -b <PATH>  Bundle JSON path (default: latest bundle-*.json in --out)
    --anchor, -a <PATH>  Anchor JSON path (default: latest anchor-*.json in --out;
                         reveal is unanchored when none exists)
    --out, -o <DIR>      Artifact directory (default: ./out, env POA_OUT_DIR)
    --help, -h           Show this help

EXIT CODES:
    0  Reveal written
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

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
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

    // Anchor is optional: explicit path must exist, implicit latest may not.
    let anchor: Option<AnchorRecord> = match &args.anchor_path {
        Some(p) => match ArtifactStore::read_json(Path::new(p)) {
            Ok(a) => Some(a),
            Err(e) => {
                eprintln!("Error reading anchor {}: {}", p, e);
                std::process::exit(2);
            }
        },
        None => match store.latest("anchor") {
            Ok(p) => match ArtifactStore::read_json(&p) {
                Ok(a) => Some(a),
                Err(e) => {
                    eprintln!("Error reading anchor {}: {}", p.display(), e);
                    std::process::exit(2);
                }
            },
            Err(_) => None,
        },
    };

    let now = chrono::Utc::now();
    let reveal = match build_reveal(&bundle, anchor.as_ref(), &file_name_of(&bundle_path), now) {
        Ok(r) => r,
        Err(BundleError::Tampered(t)) => {
            eprintln!("Integrity check failed: {}", t);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error building reveal: {}", e);
            std::process::exit(3);
        }
    };

    let out_path = match store.write_json("reveal", now.timestamp_millis(), &reveal) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error writing reveal: {}", e);
            std::process::exit(3);
        }
    };

    let summary = serde_json::json!({
        "ok": true,
        "outPath": out_path.display().to_string(),
        "bundleFingerprint": reveal.bundle_fingerprint,
        "revealFingerprint": reveal.reveal_fingerprint,
        "anchored": reveal.anchored(),
        "ledgerReference": reveal
            .commitment_summary
            .as_ref()
            .map(|s| s.ledger_reference.clone()),
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("JSON serialization error: {}", e);
            std::process::exit(3);
        }
    }
}
