//! ============================================================================
//! Ledger Configuration - Environment-driven settings
//! ============================================================================
//! RPC_ENDPOINT, CONTRACT_ADDRESS and PRIVATE_KEY are required. Everything
//! else has a default. Values are read once at startup and treated as
//! immutable for the life of the process.
//! ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::content::StorageLimits;
use crate::events::DEFAULT_LOOKBACK_BLOCKS;
use crate::ledger_abi::DEFAULT_ABI_PATH;
use crate::submitter::SubmitterConfig;
use crate::types::LedgerError;

/// Process-wide ledger settings
#[derive(Clone)]
pub struct LedgerConfig {
    pub rpc_endpoint: String,
    pub contract_address: String,
    /// Signer key, hex. Never logged.
    pub private_key: String,
    pub abi_path: PathBuf,
    pub submitter: SubmitterConfig,
    pub event_lookback_blocks: u64,
    pub limits: StorageLimits,
}

impl fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("rpc_endpoint", &self.rpc_endpoint)
            .field("contract_address", &self.contract_address)
            .field("private_key", &"<redacted>")
            .field("abi_path", &self.abi_path)
            .field("submitter", &self.submitter)
            .field("event_lookback_blocks", &self.event_lookback_blocks)
            .field("limits", &self.limits)
            .finish()
    }
}

impl LedgerConfig {
    /// Build from process environment variables
    pub fn from_env() -> Result<Self, LedgerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, LedgerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, LedgerError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| LedgerError::Config(format!("{} is not set", key)))
        };

        let defaults = SubmitterConfig::default();
        let submitter = SubmitterConfig {
            receipt_timeout: Duration::from_secs(parse_or(
                &lookup,
                "RECEIPT_TIMEOUT_SECS",
                defaults.receipt_timeout.as_secs(),
            )?),
            poll_interval: Duration::from_millis(parse_or(
                &lookup,
                "RECEIPT_POLL_INTERVAL_MS",
                defaults.poll_interval.as_millis() as u64,
            )?),
            settle_delay: Duration::from_secs(parse_or(
                &lookup,
                "SETTLE_DELAY_SECS",
                defaults.settle_delay.as_secs(),
            )?),
            ..defaults
        };

        Ok(Self {
            rpc_endpoint: required("RPC_ENDPOINT")?,
            contract_address: required("CONTRACT_ADDRESS")?,
            private_key: required("PRIVATE_KEY")?,
            abi_path: lookup("ABI_PATH")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ABI_PATH)),
            submitter,
            event_lookback_blocks: parse_or(
                &lookup,
                "EVENT_LOOKBACK_BLOCKS",
                DEFAULT_LOOKBACK_BLOCKS,
            )?,
            limits: StorageLimits::default(),
        })
    }
}

fn parse_or<F>(lookup: &F, key: &str, default: u64) -> Result<u64, LedgerError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| LedgerError::Config(format!("{} must be a number, got '{}'", key, raw))),
        _ => Ok(default),
    }
}
