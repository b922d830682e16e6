//! Paper Demo CLI
//!
//! Runs the EMA crossover paper-trading simulation against live candles and
//! writes the sealed run bundle to the artifact store. This is stage one of
//! the pipeline: the artifact this stage produces is what later stages
//! commit to and reveal.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin paper_demo -- --out ./out --limit 500
//! ```
//!
//! # Exit Codes
//!
//! - 0: Bundle written
//! - 2: Configuration error
//! - 3: Runtime error (market data, I/O)

use chrono::Utc;
use proof_of_alpha::market_data::{CandleFeed, MarketDataSource};
use proof_of_alpha::paper_trade::build_run_bundle;
use proof_of_alpha::store::{ArtifactStore, DEFAULT_OUT_DIR};
use proof_of_alpha::RunConfig;
use std::env;

#[derive(Debug, Clone)]
struct CliArgs {
    out_dir: String,
    limit: u32,
}

impl CliArgs {
    fn parse() -> Result<Self, String> {
        let args: Vec<String> = env::args().collect();
        let mut i = 1;

        let mut out_dir =
            env::var("POA_OUT_DIR").unwrap_or_else(|_| DEFAULT_OUT_DIR.to_string());
        let mut limit = 500u32;

        while i < args.len() {
            match args[i].as_str() {
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

        Ok(Self { out_dir, limit })
    }
}

fn print_usage() {
    eprintln!(
        r#"
paper_demo - run the paper-trading simulation and write a sealed bundle

USAGE:
    paper_demo [OPTIONS]

OPTIONS:
    --out, -o <DIR>      Output directory (default: ./out, env POA_OUT_DIR)
    --limit, -l <N>      Candles to fetch (default: 500)
    --help, -h           Show this help

EXIT CODES:
    0  Bundle written
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

    let out_path = match store.write_json("bundle", now.timestamp_millis(), &bundle) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error writing bundle: {}", e);
            std::process::exit(3);
        }
    };

    let summary = serde_json::json!({
        "ok": true,
        "outPath": out_path.display().to_string(),
        "bundleFingerprint": bundle.bundle_fingerprint,
        "metrics": bundle.draft.metrics,
    });
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("JSON serialization error: {}", e);
            std::process::exit(3);
        }
    }
}
