//! ============================================================================
//! Transaction Confirmation - Receipt polling & error classification
//! ============================================================================
//! Provides:
//! - Receipt polling with a hard deadline
//! - Classification of node error messages (retryable vs permanent)
//!
//! Nothing here resends a transaction. A timed-out transaction may still be
//! mined later; callers decide what to do about it.
//! ============================================================================

use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::ledger_client::LedgerClient;
use crate::types::ReceiptSummary;

/// Result of waiting for a receipt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmResult {
    /// Mined with success status
    Confirmed(ReceiptSummary),
    /// Mined but reverted
    Reverted(ReceiptSummary),
    /// No receipt before the deadline (may still confirm)
    Timeout,
}

/// Error classification for caller retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Error is likely transient, re-invoking may succeed
    Retryable,
    /// Error is permanent, re-invoking will fail the same way
    Permanent,
    /// Nonce already used or out of order
    NonceConflict,
    /// Fee too low to replace or enter the mempool
    Underpriced,
    /// Node is rate limiting this client
    RateLimited,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Permanent)
    }
}

/// Classify a node error message
pub fn classify_error(error: &str) -> ErrorKind {
    let lower = error.to_lowercase();

    if lower.contains("nonce too low")
        || lower.contains("nonce too high")
        || lower.contains("already known")
        || lower.contains("invalid nonce")
    {
        return ErrorKind::NonceConflict;
    }

    if lower.contains("underpriced")
        || lower.contains("max fee per gas less than block base fee")
        || lower.contains("fee too low")
    {
        return ErrorKind::Underpriced;
    }

    if lower.contains("rate limit")
        || lower.contains("too many requests")
        || lower.contains("429")
    {
        return ErrorKind::RateLimited;
    }

    if lower.contains("insufficient funds")
        || lower.contains("execution reverted")
        || lower.contains("invalid signature")
        || lower.contains("invalid sender")
        || lower.contains("intrinsic gas too low")
        || lower.contains("exceeds block gas limit")
        || lower.contains("oversized data")
    {
        return ErrorKind::Permanent;
    }

    // Network/connection errors and anything unknown
    ErrorKind::Retryable
}

/// Poll for the receipt of `tx_hash` until it appears or `timeout` elapses.
///
/// RPC errors while polling are logged and polling continues; only the
/// deadline ends the wait without a receipt.
pub async fn wait_for_receipt(
    client: &dyn LedgerClient,
    tx_hash: &str,
    timeout: Duration,
    poll_interval: Duration,
) -> ConfirmResult {
    info!("Waiting for receipt of {} (timeout {:?})", tx_hash, timeout);

    let deadline = Instant::now() + timeout;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        match timeout_at(deadline, client.transaction_receipt(tx_hash)).await {
            Ok(Ok(Some(receipt))) => {
                if receipt.status == 1 {
                    info!(
                        "Transaction confirmed: {} in block {} (poll attempt {})",
                        tx_hash, receipt.block_number, attempt
                    );
                    return ConfirmResult::Confirmed(receipt);
                }
                warn!(
                    "Transaction reverted on-chain: {} in block {}",
                    tx_hash, receipt.block_number
                );
                return ConfirmResult::Reverted(receipt);
            }
            Ok(Ok(None)) => {
                debug!("Transaction not yet mined (attempt {})", attempt);
            }
            Ok(Err(e)) => {
                warn!("Error checking receipt (attempt {}): {}", attempt, e);
            }
            Err(_) => break,
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep(poll_interval.min(deadline - now)).await;
    }

    warn!(
        "Receipt wait timed out for {} after {} attempts",
        tx_hash, attempt
    );
    ConfirmResult::Timeout
}
