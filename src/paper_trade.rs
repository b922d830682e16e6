//! Paper Trading Simulation
//!
//! The reference strategy whose runs get timestamped: a long-only EMA(20) x
//! EMA(50) crossover on 15-minute closes, simulated with fixed fee and
//! slippage assumptions. Deterministic given the same candles and config,
//! which is what makes the resulting bundle reproducible and therefore
//! worth fingerprinting.

use crate::bundle::{
    BundleDraft, Fill, Order, RunBundle, RunConfig, RunMetrics, Signal, SignalFeatures,
    TradeEvent, BUNDLE_VERSION,
};
use crate::digest::fingerprint_of;
use crate::market_data::Candle;
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use tracing::debug;

/// Stable identifier for this strategy configuration.
pub const STRATEGY_ID: &str = "poa-btcusdt-15m-ema20x50-v0";

/// Candles skipped before the first signal so both EMAs have settled.
pub const WARMUP_CANDLES: usize = 60;

const EMA_FAST_PERIOD: usize = 20;
const EMA_SLOW_PERIOD: usize = 50;

/// Simulation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaperTradeError {
    /// Fewer candles than the warmup window; no signal can ever fire.
    NotEnoughCandles { got: usize, need: usize },
    /// A candle timestamp outside the representable datetime range.
    InvalidTimestamp(i64),
}

impl std::fmt::Display for PaperTradeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotEnoughCandles { got, need } => {
                write!(f, "not enough candles: got {}, need at least {}", got, need)
            }
            Self::InvalidTimestamp(ms) => write!(f, "candle timestamp {} ms is not valid", ms),
        }
    }
}

impl std::error::Error for PaperTradeError {}

/// Output of one simulated run.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperRun {
    pub strategy_id: String,
    pub start: String,
    pub end: String,
    pub events: Vec<TradeEvent>,
    pub metrics: RunMetrics,
}

/// Exponential moving average, seeded with the first value.
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let k = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => v * k + p * (1.0 - k),
        };
        out.push(next);
        prev = Some(next);
    }
    out
}

fn round_dp(x: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (x * factor).round() / factor
}

fn iso_ms(ms: i64) -> Result<String, PaperTradeError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .ok_or(PaperTradeError::InvalidTimestamp(ms))
}

/// Run the crossover simulation over the given candles.
///
/// Entry on the fast EMA crossing above the slow while flat; exit on the
/// cross back down while long. Fills at close plus/minus slippage; fees on
/// notional. An entry the cash balance cannot cover is skipped entirely.
pub fn run_paper_trade(
    candles: &[Candle],
    config: &RunConfig,
) -> Result<PaperRun, PaperTradeError> {
    if candles.len() <= WARMUP_CANDLES {
        return Err(PaperTradeError::NotEnoughCandles {
            got: candles.len(),
            need: WARMUP_CANDLES + 1,
        });
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let ema_fast = ema(&closes, EMA_FAST_PERIOD);
    let ema_slow = ema(&closes, EMA_SLOW_PERIOD);

    let mut cash = config.initial_cash;
    let mut pos = 0.0f64;
    let mut peak = cash;
    let mut max_dd = 0.0f64;

    let mut events = Vec::new();

    for i in WARMUP_CANDLES..candles.len() {
        let candle = &candles[i];
        let px = candle.close;
        let fast = ema_fast[i];
        let slow = ema_slow[i];
        let prev_fast = ema_fast[i - 1];
        let prev_slow = ema_slow[i - 1];

        let cross_up = prev_fast <= prev_slow && fast > slow;
        let cross_dn = prev_fast >= prev_slow && fast < slow;

        let action = if cross_up && pos == 0.0 {
            Some("enter_long")
        } else if cross_dn && pos > 0.0 {
            Some("exit_long")
        } else {
            None
        };

        if let Some(action) = action {
            let side = if action == "enter_long" { "buy" } else { "sell" };
            let slip = (config.slippage_bps as f64 / 10_000.0) * px;
            let fill_px = if side == "buy" { px + slip } else { px - slip };
            let notional = fill_px * config.qty_btc;
            let fee = (config.fee_bps as f64 / 10_000.0) * notional;

            if side == "buy" {
                if cash >= notional + fee {
                    cash -= notional + fee;
                    pos += config.qty_btc;
                } else {
                    debug!(i, cash, notional, "entry skipped: insufficient cash");
                    continue;
                }
            } else {
                pos -= config.qty_btc;
                cash += notional - fee;
                if pos < 1e-12 {
                    pos = 0.0;
                }
            }

            events.push(TradeEvent {
                ts: iso_ms(candle.close_time_ms)?,
                market: config.symbol.clone(),
                venue: "binance".to_string(),
                signal: Signal {
                    signal_type: action.to_string(),
                    strength: 1,
                    features: SignalFeatures {
                        ema_fast: round_dp(fast, 2),
                        ema_slow: round_dp(slow, 2),
                    },
                },
                order: Order {
                    mode: "paper".to_string(),
                    side: side.to_string(),
                    qty: config.qty_btc,
                    slippage_bps: config.slippage_bps,
                    fee_bps: config.fee_bps,
                },
                fill: Fill {
                    status: "filled".to_string(),
                    avg_px: round_dp(fill_px, 2),
                    fee: round_dp(fee, 4),
                },
            });
        }

        let equity = cash + pos * px;
        if equity > peak {
            peak = equity;
        }
        let dd = (peak - equity) / peak;
        if dd > max_dd {
            max_dd = dd;
        }
    }

    let final_px = closes[closes.len() - 1];
    let final_equity = cash + pos * final_px;
    let ret = (final_equity - config.initial_cash) / config.initial_cash;

    let first = &candles[0];
    let last = &candles[candles.len() - 1];

    Ok(PaperRun {
        strategy_id: STRATEGY_ID.to_string(),
        start: iso_ms(first.open_time_ms)?,
        end: iso_ms(last.close_time_ms)?,
        metrics: RunMetrics {
            trades: events.len() as u64,
            return_pct: round_dp(ret * 100.0, 3),
            max_drawdown_pct: round_dp(max_dd * 100.0, 3),
            final_equity: round_dp(final_equity, 2),
        },
        events,
    })
}

/// Run the simulation and seal the result into a bundle.
pub fn build_run_bundle(
    candles: &[Candle],
    config: &RunConfig,
    now: DateTime<Utc>,
) -> anyhow::Result<RunBundle> {
    let config_fingerprint = fingerprint_of(config).context("failed to fingerprint config")?;
    let run = run_paper_trade(candles, config).context("simulation failed")?;

    let draft = BundleDraft {
        bundle_version: BUNDLE_VERSION,
        strategy_id: run.strategy_id,
        run_id: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        config: config.clone(),
        config_fingerprint,
        events: run.events,
        metrics: run.metrics,
    };

    RunBundle::seal(draft).context("failed to seal bundle")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Candles whose closes follow the given path, 15 minutes apart.
    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let open_time_ms = 1_717_200_000_000 + (i as i64) * 900_000;
                Candle {
                    open_time_ms,
                    close_time_ms: open_time_ms + 899_999,
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1.0,
                }
            })
            .collect()
    }

    /// Flat, then a sharp rally (fast EMA crosses up), then a sharp selloff
    /// (fast EMA crosses back down). Produces exactly one round trip.
    fn crossover_closes() -> Vec<f64> {
        let mut closes = vec![100.0; 80];
        for i in 0..20 {
            closes.push(100.0 + (i + 1) as f64 * 5.0);
        }
        closes.extend(vec![200.0; 10]);
        for i in 0..30 {
            closes.push(200.0 - (i + 1) as f64 * 5.0);
        }
        closes.extend(vec![50.0; 20]);
        closes
    }

    #[test]
    fn test_ema_seeds_with_first_value() {
        let vals = [10.0, 20.0, 30.0];
        let out = ema(&vals, 20);
        assert_eq!(out[0], 10.0);
        let k = 2.0 / 21.0;
        assert!((out[1] - (20.0 * k + 10.0 * (1.0 - k))).abs() < 1e-12);
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_constant_series_produces_no_trades() {
        let candles = candles_from_closes(&vec![100.0; 120]);
        let run = run_paper_trade(&candles, &RunConfig::default()).unwrap();
        assert!(run.events.is_empty());
        assert_eq!(run.metrics.trades, 0);
        assert_eq!(run.metrics.final_equity, 10_000.0);
        assert_eq!(run.metrics.return_pct, 0.0);
    }

    #[test]
    fn test_crossover_produces_enter_then_exit() {
        let candles = candles_from_closes(&crossover_closes());
        let run = run_paper_trade(&candles, &RunConfig::default()).unwrap();

        assert_eq!(run.events.len(), 2);
        assert_eq!(run.events[0].signal.signal_type, "enter_long");
        assert_eq!(run.events[0].order.side, "buy");
        assert_eq!(run.events[1].signal.signal_type, "exit_long");
        assert_eq!(run.events[1].order.side, "sell");
        assert_eq!(run.metrics.trades, 2);
    }

    #[test]
    fn test_deterministic_across_runs() {
        let candles = candles_from_closes(&crossover_closes());
        let config = RunConfig::default();
        let a = run_paper_trade(&candles, &config).unwrap();
        let b = run_paper_trade(&candles, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_insufficient_cash_entry_skipped() {
        let candles = candles_from_closes(&crossover_closes());
        let config = RunConfig {
            initial_cash: 0.5,
            ..RunConfig::default()
        };
        let run = run_paper_trade(&candles, &config).unwrap();
        assert!(run.events.is_empty());
        assert_eq!(run.metrics.final_equity, 0.5);
    }

    #[test]
    fn test_too_few_candles_rejected() {
        let candles = candles_from_closes(&vec![100.0; WARMUP_CANDLES]);
        let err = run_paper_trade(&candles, &RunConfig::default()).unwrap_err();
        assert!(matches!(err, PaperTradeError::NotEnoughCandles { .. }));
    }

    #[test]
    fn test_fill_price_includes_slippage_and_fee() {
        let candles = candles_from_closes(&crossover_closes());
        let run = run_paper_trade(&candles, &RunConfig::default()).unwrap();

        let entry = &run.events[0];
        let px = entry.fill.avg_px;
        // Buy fills above the close by the slippage fraction.
        let close_at_entry = px / (1.0 + 2.0 / 10_000.0);
        assert!((round_dp(close_at_entry * (1.0 + 2.0 / 10_000.0), 2) - px).abs() < 1e-9);
        assert!(entry.fill.fee > 0.0);
    }

    #[test]
    fn test_build_run_bundle_is_sealed_and_consistent() {
        use chrono::TimeZone;
        let candles = candles_from_closes(&crossover_closes());
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let bundle = build_run_bundle(&candles, &RunConfig::default(), now).unwrap();

        assert_eq!(bundle.draft.strategy_id, STRATEGY_ID);
        assert_eq!(bundle.draft.run_id, "2025-06-01T12:00:00.000Z");
        assert!(bundle.verify_fingerprint().is_ok());
        assert_eq!(
            bundle.draft.config_fingerprint,
            fingerprint_of(&RunConfig::default()).unwrap()
        );
    }

    #[test]
    fn test_same_inputs_same_bundle_fingerprint() {
        use chrono::TimeZone;
        let candles = candles_from_closes(&crossover_closes());
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let a = build_run_bundle(&candles, &RunConfig::default(), now).unwrap();
        let b = build_run_bundle(&candles, &RunConfig::default(), now).unwrap();
        assert_eq!(a.bundle_fingerprint, b.bundle_fingerprint);
    }
}
