//! Ledger Gateway
//!
//! Abstraction over the append-only public ledger that stores commitment
//! payloads. The protocol only needs two operations: submit an opaque memo
//! and get a reference back, and fetch a memo by reference. Everything else
//! about the ledger (consensus, finality, fees) is outside the trust
//! argument, so the trait surface stays deliberately small.
//!
//! Two implementations:
//! - [`HttpLedgerGateway`]: JSON client for a memo-ledger HTTP endpoint,
//!   with balance-checked faucet funding retried under a bounded
//!   exponential backoff.
//! - [`MemoryLedger`]: in-process fake for tests and offline demos.

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Bounded exponential backoff applied to the funding step only. Memo
/// submission and fetch are never retried by the gateway; the caller decides
/// how to handle a not-yet-available read.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            base_delay: Duration::from_millis(500),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the given zero-based attempt: `base * multiplier^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt as i32);
        self.base_delay.mul_f64(factor)
    }
}

/// Ledger interaction failure.
#[derive(Debug)]
pub enum LedgerError {
    /// Network or endpoint failure. Fatal for the current invocation.
    Transport(String),
    /// The referenced memo is not visible yet. The one retryable condition:
    /// the caller may re-run verification later without rebuilding anything.
    NotYetAvailable { reference: String },
    /// Funding the submitter identity failed after every retry attempt.
    FundingExhausted { attempts: u32, last_error: String },
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "ledger transport error: {}", e),
            Self::NotYetAvailable { reference } => {
                write!(f, "memo {} not yet available; retry later", reference)
            }
            Self::FundingExhausted {
                attempts,
                last_error,
            } => write!(
                f,
                "funding failed after {} attempts (last error: {})",
                attempts, last_error
            ),
        }
    }
}

impl std::error::Error for LedgerError {}

impl LedgerError {
    /// Whether re-running the same operation later can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NotYetAvailable { .. })
    }
}

/// Append-only memo ledger.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Submit an opaque payload under the given submitter identity.
    /// Returns the ledger reference for later lookup.
    async fn submit(&self, payload: &[u8], identity: &str) -> Result<String, LedgerError>;

    /// Fetch a previously submitted payload. `Ok(None)` means the reference
    /// is unknown or not yet visible, not that it can never exist.
    async fn fetch(&self, reference: &str) -> Result<Option<Vec<u8>>, LedgerError>;
}

// =============================================================================
// HTTP GATEWAY
// =============================================================================

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: u64,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    reference: String,
}

#[derive(Debug, Deserialize)]
struct MemoResponse {
    payload: String,
}

/// JSON client for a memo-ledger HTTP endpoint.
pub struct HttpLedgerGateway {
    client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl HttpLedgerGateway {
    pub fn new(base_url: impl Into<String>, retry: RetryPolicy) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(20))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn balance(&self, identity: &str) -> Result<u64, LedgerError> {
        let url = format!("{}/balance/{}", self.base_url, identity);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "balance query returned HTTP {}",
                resp.status()
            )));
        }
        let body: BalanceResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(body.balance)
    }

    async fn request_funding(&self, identity: &str) -> Result<(), String> {
        let url = format!("{}/faucet", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "identity": identity }))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("faucet returned HTTP {}", resp.status()));
        }
        Ok(())
    }

    /// Top up the submitter identity if its balance is zero.
    ///
    /// Faucets rate-limit aggressively, so each failed request backs off
    /// exponentially per the configured policy before the next attempt.
    pub async fn ensure_funded(&self, identity: &str) -> Result<(), LedgerError> {
        let balance = self.balance(identity).await?;
        if balance > 0 {
            debug!(identity, balance, "submitter already funded");
            return Ok(());
        }

        info!(identity, "submitter unfunded; requesting from faucet");
        let mut last_error = String::new();
        for attempt in 0..self.retry.max_attempts {
            match self.request_funding(identity).await {
                Ok(()) => {
                    let balance = self.balance(identity).await?;
                    if balance > 0 {
                        info!(identity, balance, "funding confirmed");
                        return Ok(());
                    }
                    last_error = "faucet accepted but balance still zero".to_string();
                }
                Err(e) => {
                    last_error = e;
                }
            }
            let delay = self.retry.delay_for(attempt);
            warn!(
                identity,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "funding attempt failed; backing off"
            );
            tokio::time::sleep(delay).await;
        }

        Err(LedgerError::FundingExhausted {
            attempts: self.retry.max_attempts,
            last_error,
        })
    }
}

#[async_trait]
impl LedgerGateway for HttpLedgerGateway {
    async fn submit(&self, payload: &[u8], identity: &str) -> Result<String, LedgerError> {
        self.ensure_funded(identity).await?;

        let text = std::str::from_utf8(payload)
            .map_err(|e| LedgerError::Transport(format!("payload is not UTF-8: {}", e)))?;

        let url = format!("{}/memos", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "identity": identity, "payload": text }))
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "memo submission returned HTTP {}",
                resp.status()
            )));
        }
        let body: SubmitResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        info!(reference = %body.reference, "memo submitted");
        Ok(body.reference)
    }

    async fn fetch(&self, reference: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        let url = format!("{}/memos/{}", self.base_url, reference);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(LedgerError::Transport(format!(
                "memo fetch returned HTTP {}",
                resp.status()
            )));
        }
        let body: MemoResponse = resp
            .json()
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Some(body.payload.into_bytes()))
    }
}

// =============================================================================
// IN-MEMORY FAKE
// =============================================================================

/// In-process ledger for tests and offline demos. Append-only: references
/// are never reused and entries are never mutated through the gateway API.
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    next_seq: Mutex<u64>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place raw bytes at a chosen reference, bypassing submit. Lets tests
    /// stage malformed or mismatched payloads.
    pub fn insert_raw(&self, reference: impl Into<String>, payload: Vec<u8>) {
        self.entries.lock().insert(reference.into(), payload);
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn submit(&self, payload: &[u8], _identity: &str) -> Result<String, LedgerError> {
        let seq = {
            let mut next = self.next_seq.lock();
            let seq = *next;
            *next += 1;
            seq
        };
        let reference = format!("memo-{:08}", seq);
        self.entries.lock().insert(reference.clone(), payload.to_vec());
        Ok(reference)
    }

    async fn fetch(&self, reference: &str) -> Result<Option<Vec<u8>>, LedgerError> {
        Ok(self.entries.lock().get(reference).cloned())
    }
}

// =============================================================================
// SUBMITTER IDENTITY
// =============================================================================

/// Default identity file location under the user's config directory.
pub fn default_identity_path() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; pass an explicit identity path"))?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("proof-of-alpha")
        .join("identity.hex"))
}

/// Load the persistent submitter identity, creating it on first use.
///
/// The identity is 32 random bytes stored as lowercase hex. It persists
/// across runs so repeated commits come from the same submitter, which is
/// what lets a later reveal point back at the submitting party.
pub fn load_or_create_identity(path: &Path) -> anyhow::Result<String> {
    use anyhow::Context;

    if path.exists() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read identity file {}", path.display()))?;
        let identity = text.trim().to_string();
        if identity.is_empty() {
            anyhow::bail!("identity file {} is empty", path.display());
        }
        return Ok(identity);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let identity = hex::encode(bytes);

    std::fs::write(path, &identity)
        .with_context(|| format!("failed to write identity file {}", path.display()))?;
    info!(path = %path.display(), "created new submitter identity");
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 6);
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(16000));
    }

    #[test]
    fn test_not_yet_available_is_only_retryable_error() {
        assert!(LedgerError::NotYetAvailable {
            reference: "memo-1".to_string()
        }
        .is_retryable());
        assert!(!LedgerError::Transport("boom".to_string()).is_retryable());
        assert!(!LedgerError::FundingExhausted {
            attempts: 6,
            last_error: "rate limited".to_string()
        }
        .is_retryable());
    }

    #[tokio::test]
    async fn test_memory_ledger_submit_then_fetch() {
        let ledger = MemoryLedger::new();
        let reference = ledger.submit(b"payload-bytes", "id-1").await.unwrap();
        let fetched = ledger.fetch(&reference).await.unwrap();
        assert_eq!(fetched.as_deref(), Some(&b"payload-bytes"[..]));
    }

    #[tokio::test]
    async fn test_memory_ledger_unknown_reference_is_none() {
        let ledger = MemoryLedger::new();
        assert!(ledger.fetch("memo-missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_ledger_references_are_unique() {
        let ledger = MemoryLedger::new();
        let a = ledger.submit(b"one", "id").await.unwrap();
        let b = ledger.submit(b"one", "id").await.unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_identity_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.hex");

        let first = load_or_create_identity(&path).unwrap();
        assert_eq!(first.len(), 64);
        assert!(first.bytes().all(|b| b.is_ascii_hexdigit()));

        let second = load_or_create_identity(&path).unwrap();
        assert_eq!(first, second);
    }
}
