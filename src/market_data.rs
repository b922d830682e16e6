//! Market Data Sources
//!
//! Candle feeds for the paper-trading demo. Binance klines are the primary
//! source; Kraken OHLC is the fallback because Binance geo-blocks some
//! regions (HTTP 451 from many cloud VMs). Sources are behind a trait so
//! the simulation and its tests run against fixed in-memory candles.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

/// One OHLCV candle. Times are unix epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open_time_ms: i64,
    pub close_time_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Source of historical candles for one market.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch_candles(&self, limit: usize) -> Result<Vec<Candle>>;
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .context("failed to build HTTP client")
}

// =============================================================================
// BINANCE
// =============================================================================

/// Binance spot klines endpoint (`/api/v3/klines`).
pub struct BinanceKlines {
    client: reqwest::Client,
    symbol: String,
    interval: String,
}

impl BinanceKlines {
    pub fn new(symbol: impl Into<String>, interval: impl Into<String>) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            symbol: symbol.into(),
            interval: interval.into(),
        })
    }
}

/// Parse one kline row: `[openTime, open, high, low, close, volume,
/// closeTime, ...]` with prices as strings.
fn parse_binance_row(row: &Value) -> Result<Candle> {
    let arr = row.as_array().context("kline row is not an array")?;
    if arr.len() < 7 {
        bail!("kline row has {} fields, expected at least 7", arr.len());
    }

    let num = |v: &Value, name: &str| -> Result<f64> {
        if let Some(n) = v.as_f64() {
            return Ok(n);
        }
        v.as_str()
            .context(format!("kline field {} is neither number nor string", name))?
            .parse::<f64>()
            .context(format!("kline field {} is not numeric", name))
    };

    Ok(Candle {
        open_time_ms: arr[0].as_i64().context("kline openTime is not an integer")?,
        close_time_ms: arr[6].as_i64().context("kline closeTime is not an integer")?,
        open: num(&arr[1], "open")?,
        high: num(&arr[2], "high")?,
        low: num(&arr[3], "low")?,
        close: num(&arr[4], "close")?,
        volume: num(&arr[5], "volume")?,
    })
}

#[async_trait]
impl MarketDataSource for BinanceKlines {
    async fn fetch_candles(&self, limit: usize) -> Result<Vec<Candle>> {
        let url = format!(
            "https://api.binance.com/api/v3/klines?symbol={}&interval={}&limit={}",
            self.symbol, self.interval, limit
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("Binance klines request failed")?;
        if !resp.status().is_success() {
            bail!("Binance HTTP {}", resp.status());
        }

        let rows: Vec<Value> = resp
            .json()
            .await
            .context("failed to parse Binance klines response")?;
        let candles = rows
            .iter()
            .map(parse_binance_row)
            .collect::<Result<Vec<_>>>()?;
        info!(count = candles.len(), symbol = %self.symbol, "fetched Binance klines");
        Ok(candles)
    }
}

// =============================================================================
// KRAKEN
// =============================================================================

#[derive(Debug, Deserialize)]
struct KrakenResponse {
    error: Vec<String>,
    #[serde(default)]
    result: serde_json::Map<String, Value>,
}

/// Kraken public OHLC endpoint.
pub struct KrakenOhlc {
    client: reqwest::Client,
    pair: String,
    interval_min: u32,
}

impl KrakenOhlc {
    pub fn new(pair: impl Into<String>, interval_min: u32) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            pair: pair.into(),
            interval_min,
        })
    }
}

/// Parse one OHLC row: `[time, open, high, low, close, vwap, volume, count]`
/// with time in seconds and prices as strings.
fn parse_kraken_row(row: &Value, interval_min: u32) -> Result<Candle> {
    let arr = row.as_array().context("OHLC row is not an array")?;
    if arr.len() < 7 {
        bail!("OHLC row has {} fields, expected at least 7", arr.len());
    }

    let num = |v: &Value, name: &str| -> Result<f64> {
        if let Some(n) = v.as_f64() {
            return Ok(n);
        }
        v.as_str()
            .context(format!("OHLC field {} is neither number nor string", name))?
            .parse::<f64>()
            .context(format!("OHLC field {} is not numeric", name))
    };

    let open_time_ms = arr[0]
        .as_i64()
        .context("OHLC time is not an integer")?
        * 1000;

    Ok(Candle {
        open_time_ms,
        close_time_ms: open_time_ms + i64::from(interval_min) * 60 * 1000,
        open: num(&arr[1], "open")?,
        high: num(&arr[2], "high")?,
        low: num(&arr[3], "low")?,
        close: num(&arr[4], "close")?,
        volume: num(&arr[6], "volume")?,
    })
}

#[async_trait]
impl MarketDataSource for KrakenOhlc {
    async fn fetch_candles(&self, limit: usize) -> Result<Vec<Candle>> {
        let url = format!(
            "https://api.kraken.com/0/public/OHLC?pair={}&interval={}",
            self.pair, self.interval_min
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("Kraken OHLC request failed")?;
        if !resp.status().is_success() {
            bail!("Kraken HTTP {}", resp.status());
        }

        let body: KrakenResponse = resp
            .json()
            .await
            .context("failed to parse Kraken OHLC response")?;
        if !body.error.is_empty() {
            bail!("Kraken error: {}", body.error.join(","));
        }

        // The result object keys the rows by pair name, plus a "last" cursor.
        let rows = body
            .result
            .iter()
            .find(|(k, _)| k.as_str() != "last")
            .and_then(|(_, v)| v.as_array())
            .context("Kraken response has no OHLC rows")?;

        let mut candles = rows
            .iter()
            .map(|r| parse_kraken_row(r, self.interval_min))
            .collect::<Result<Vec<_>>>()?;
        if candles.len() > limit {
            candles = candles.split_off(candles.len() - limit);
        }
        info!(count = candles.len(), pair = %self.pair, "fetched Kraken OHLC");
        Ok(candles)
    }
}

// =============================================================================
// COMPOSITE AND FAKE
// =============================================================================

/// Primary source with fallback: try Binance, fall back to Kraken on any
/// failure.
pub struct CandleFeed {
    primary: BinanceKlines,
    fallback: KrakenOhlc,
}

impl CandleFeed {
    pub fn btcusdt_15m() -> Result<Self> {
        Ok(Self {
            primary: BinanceKlines::new("BTCUSDT", "15m")?,
            fallback: KrakenOhlc::new("XBTUSD", 15)?,
        })
    }
}

#[async_trait]
impl MarketDataSource for CandleFeed {
    async fn fetch_candles(&self, limit: usize) -> Result<Vec<Candle>> {
        match self.primary.fetch_candles(limit).await {
            Ok(candles) => Ok(candles),
            Err(e) => {
                warn!(error = %e, "primary candle source failed; falling back");
                self.fallback.fetch_candles(limit).await
            }
        }
    }
}

/// Fixed candle set for tests and deterministic demos.
pub struct FixedCandles(pub Vec<Candle>);

#[async_trait]
impl MarketDataSource for FixedCandles {
    async fn fetch_candles(&self, limit: usize) -> Result<Vec<Candle>> {
        let start = self.0.len().saturating_sub(limit);
        Ok(self.0[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_binance_row() {
        let row = json!([
            1717200000000i64,
            "67000.10",
            "67100.00",
            "66900.00",
            "67050.55",
            "12.345",
            1717200899999i64,
            "0",
            100,
            "0",
            "0",
            "0"
        ]);
        let c = parse_binance_row(&row).unwrap();
        assert_eq!(c.open_time_ms, 1717200000000);
        assert_eq!(c.close_time_ms, 1717200899999);
        assert_eq!(c.open, 67000.10);
        assert_eq!(c.close, 67050.55);
        assert_eq!(c.volume, 12.345);
    }

    #[test]
    fn test_parse_binance_row_rejects_short_row() {
        assert!(parse_binance_row(&json!([1, 2, 3])).is_err());
    }

    #[test]
    fn test_parse_kraken_row_converts_seconds_and_interval() {
        let row = json!([1717200000i64, "67000.1", "67100", "66900", "67050.5", "67010.2", "8.5", 42]);
        let c = parse_kraken_row(&row, 15).unwrap();
        assert_eq!(c.open_time_ms, 1717200000000);
        assert_eq!(c.close_time_ms, 1717200000000 + 15 * 60 * 1000);
        assert_eq!(c.volume, 8.5);
    }

    #[tokio::test]
    async fn test_fixed_candles_respects_limit_from_tail() {
        let candles: Vec<Candle> = (0..10)
            .map(|i| Candle {
                open_time_ms: i * 1000,
                close_time_ms: i * 1000 + 999,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 0.0,
            })
            .collect();
        let src = FixedCandles(candles);
        let got = src.fetch_candles(3).await.unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].open_time_ms, 7000);
    }
}
