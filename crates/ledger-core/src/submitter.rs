//! ============================================================================
//! Transaction Submitter - Build, sign, send and confirm `completeTask`
//! ============================================================================
//! One call = one broadcast. The sequence per call:
//! 1. prepare content for storage limits
//! 2. fetch the signer nonce (serialized per signer, see below)
//! 3. estimate gas (+20%), falling back to a fixed ceiling
//! 4. read gas price (+10%)
//! 5. sign + broadcast, recording the hash immediately
//! 6. wait for the receipt under a hard timeout
//! 7. on success, settle briefly and re-read the task for verification
//!
//! Nonce fetch through broadcast runs under one async mutex per signer. Inside
//! it the node's pending count is reconciled with the last nonce this process
//! broadcast, so a node that lags behind its own mempool cannot hand out the
//! same nonce twice. A receipt timeout or a nonce rejection drops the local
//! value, so a transaction evicted from the mempool does not leave a gap that
//! every later broadcast queues behind.
//! ============================================================================

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::confirmation::{classify_error, wait_for_receipt, ConfirmResult, ErrorKind};
use crate::content::StorageLimits;
use crate::ledger_client::{CompleteTaskCall, LedgerClient, TxParams};
use crate::reader::TaskReader;
use crate::types::{ContentStatus, FailureStage, TaskId, TransactionOutcome};

/// Gas limit used when estimation fails
pub const FALLBACK_GAS_LIMIT: u64 = 3_000_000;

/// Configuration for submission behavior
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// Hard ceiling on the receipt wait
    pub receipt_timeout: Duration,
    /// Receipt polling interval
    pub poll_interval: Duration,
    /// Post-confirmation settle delay before the verification read
    pub settle_delay: Duration,
    /// Gas limit used when estimation fails
    pub fallback_gas_limit: u64,
    /// Percentage added to a successful gas estimate
    pub gas_limit_margin_pct: u64,
    /// Percentage added to the network gas price
    pub gas_price_premium_pct: u128,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            receipt_timeout: Duration::from_secs(180),
            poll_interval: Duration::from_millis(1000),
            settle_delay: Duration::from_secs(2),
            fallback_gas_limit: FALLBACK_GAS_LIMIT,
            gas_limit_margin_pct: 20,
            gas_price_premium_pct: 10,
        }
    }
}

/// Nonce to use given the node's pending count and our last broadcast
pub fn reconcile_nonce(chain_pending: u64, last_broadcast: Option<u64>) -> u64 {
    match last_broadcast {
        Some(last) if last + 1 > chain_pending => last + 1,
        _ => chain_pending,
    }
}

/// Sends `completeTask` transactions for one signing account
pub struct TransactionSubmitter {
    client: Arc<dyn LedgerClient>,
    reader: TaskReader,
    limits: StorageLimits,
    config: SubmitterConfig,
    /// Last nonce broadcast by this process; the guard spans fetch -> broadcast
    last_nonce: Mutex<Option<u64>>,
}

impl TransactionSubmitter {
    pub fn new(client: Arc<dyn LedgerClient>, limits: StorageLimits) -> Self {
        Self::with_config(client, limits, SubmitterConfig::default())
    }

    pub fn with_config(
        client: Arc<dyn LedgerClient>,
        limits: StorageLimits,
        config: SubmitterConfig,
    ) -> Self {
        Self {
            reader: TaskReader::new(client.clone()),
            client,
            limits,
            config,
            last_nonce: Mutex::new(None),
        }
    }

    /// Store `result` as the result of `task_id`. Never returns an error:
    /// every failure is captured in the outcome.
    pub async fn submit(&self, task_id: TaskId, result: &str) -> TransactionOutcome {
        let prepared = self.limits.prepare(result);
        if prepared.truncated {
            warn!(
                "Result too long for ledger storage. Original: {} chars / {} bytes. \
                 Truncated to: {} chars / {} bytes.",
                prepared.original_length,
                prepared.original_byte_size,
                prepared.truncated_length.unwrap_or_default(),
                prepared.truncated_byte_size.unwrap_or_default(),
            );
        }

        let mut outcome = TransactionOutcome {
            success: false,
            task_id,
            transaction_hash: None,
            nonce: None,
            receipt: None,
            on_chain_result: None,
            content: ContentStatus::from_prepared(&prepared),
            error: None,
            failure_stage: None,
            retryable: false,
            verification_error: None,
            submitted_at: chrono::Utc::now().timestamp(),
        };

        let call = CompleteTaskCall {
            task_id,
            result: prepared.content,
        };

        let (tx_hash, nonce) = match self.broadcast(&call).await {
            Ok(sent) => sent,
            Err((stage, message)) => {
                error!("Error in ledger transaction for task {}: {}", task_id, message);
                outcome.retryable = classify_error(&message).is_retryable();
                outcome.failure_stage = Some(stage);
                outcome.error = Some(message);
                return outcome;
            }
        };

        info!("Transaction sent: {} (task {}, nonce {})", tx_hash, task_id, nonce);
        outcome.transaction_hash = Some(tx_hash.clone());
        outcome.nonce = Some(nonce);

        let confirmation = wait_for_receipt(
            self.client.as_ref(),
            &tx_hash,
            self.config.receipt_timeout,
            self.config.poll_interval,
        )
        .await;

        match confirmation {
            ConfirmResult::Confirmed(receipt) => {
                info!("Transaction successful: {}", tx_hash);
                outcome.success = true;
                outcome.receipt = Some(receipt);

                if !self.config.settle_delay.is_zero() {
                    sleep(self.config.settle_delay).await;
                }

                match self.reader.read(task_id).await {
                    Ok(task) => outcome.on_chain_result = Some(task),
                    Err(e) => {
                        warn!("Verification read failed for task {}: {}", task_id, e);
                        outcome.verification_error = Some(e.to_string());
                    }
                }
            }
            ConfirmResult::Reverted(receipt) => {
                error!("Transaction failed: {}", tx_hash);
                outcome.receipt = Some(receipt);
                outcome.failure_stage = Some(FailureStage::Rejected);
                outcome.error = Some("Transaction failed".to_string());
            }
            ConfirmResult::Timeout => {
                error!(
                    "No receipt for {} within {:?}; it may still confirm",
                    tx_hash, self.config.receipt_timeout
                );
                // The transaction may have been dropped; trust the node's count next time
                self.forget_nonce(nonce).await;
                outcome.failure_stage = Some(FailureStage::Confirmation);
                outcome.error = Some(format!(
                    "Timed out after {:?} waiting for receipt",
                    self.config.receipt_timeout
                ));
            }
        }

        outcome
    }

    /// Drop the local nonce hint if it still points at `nonce`, so the next
    /// broadcast starts from the node's pending count again
    async fn forget_nonce(&self, nonce: u64) {
        let mut last_nonce = self.last_nonce.lock().await;
        if *last_nonce == Some(nonce) {
            *last_nonce = None;
        }
    }

    /// Steps 2-5 under the per-signer nonce lock
    async fn broadcast(&self, call: &CompleteTaskCall) -> Result<(String, u64), (FailureStage, String)> {
        let mut last_nonce = self.last_nonce.lock().await;

        let chain_pending = self
            .client
            .pending_nonce()
            .await
            .map_err(|e| (FailureStage::Preparation, format!("Failed to fetch nonce: {}", e)))?;
        let nonce = reconcile_nonce(chain_pending, *last_nonce);
        if nonce != chain_pending {
            debug!(
                "Node reported pending nonce {} but {} was already broadcast; using {}",
                chain_pending,
                nonce - 1,
                nonce
            );
        }

        let gas_limit = match self.client.estimate_complete_task(call, nonce).await {
            Ok(estimate) => estimate.saturating_mul(100 + self.config.gas_limit_margin_pct) / 100,
            Err(e) => {
                warn!(
                    "Gas estimation failed: {}. Using default gas limit {}.",
                    e, self.config.fallback_gas_limit
                );
                self.config.fallback_gas_limit
            }
        };

        let network_price = self
            .client
            .gas_price()
            .await
            .map_err(|e| (FailureStage::Preparation, format!("Failed to fetch gas price: {}", e)))?;
        let gas_price = network_price.saturating_mul(100 + self.config.gas_price_premium_pct) / 100;

        let params = TxParams {
            nonce,
            gas_limit,
            gas_price,
        };
        debug!("Broadcasting completeTask with {:?}", params);

        let tx_hash = match self.client.send_complete_task(call, &params).await {
            Ok(hash) => hash,
            Err(e) => {
                let message = e.to_string();
                if classify_error(&message) == ErrorKind::NonceConflict {
                    warn!("Node rejected nonce {}: resyncing with chain count", nonce);
                    *last_nonce = None;
                }
                return Err((FailureStage::Broadcast, message));
            }
        };

        *last_nonce = Some(nonce);
        Ok((tx_hash, nonce))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockLedger;
    use crate::types::LedgerError;
    use futures_util::future::join_all;
    use std::collections::HashSet;

    fn fast_config() -> SubmitterConfig {
        SubmitterConfig {
            receipt_timeout: Duration::from_millis(200),
            poll_interval: Duration::from_millis(1),
            settle_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn submitter(ledger: &Arc<MockLedger>) -> TransactionSubmitter {
        TransactionSubmitter::with_config(ledger.clone(), StorageLimits::default(), fast_config())
    }

    #[test]
    fn test_reconcile_nonce() {
        assert_eq!(reconcile_nonce(5, None), 5);
        assert_eq!(reconcile_nonce(5, Some(3)), 5);
        assert_eq!(reconcile_nonce(5, Some(4)), 5);
        assert_eq!(reconcile_nonce(5, Some(5)), 6);
        assert_eq!(reconcile_nonce(0, Some(9)), 10);
    }

    #[test]
    fn test_submitter_config_default() {
        let config = SubmitterConfig::default();
        assert_eq!(config.receipt_timeout, Duration::from_secs(180));
        assert_eq!(config.settle_delay, Duration::from_secs(2));
        assert_eq!(config.fallback_gas_limit, 3_000_000);
        assert_eq!(config.gas_limit_margin_pct, 20);
        assert_eq!(config.gas_price_premium_pct, 10);
    }

    #[tokio::test]
    async fn test_successful_submission() {
        let ledger = Arc::new(MockLedger::new());
        ledger.add_task(1, "markets");
        ledger.set_gas_estimate(100_000);
        ledger.set_gas_price(1_000_000_000);

        let outcome = submitter(&ledger).submit(1, "final post").await;

        assert!(outcome.success, "{:?}", outcome.error);
        assert!(outcome.transaction_hash.is_some());
        assert_eq!(outcome.nonce, Some(0));
        assert_eq!(outcome.receipt.as_ref().map(|r| r.status), Some(1));
        assert_eq!(
            outcome.on_chain_result.as_ref().map(|t| t.result.as_str()),
            Some("final post")
        );
        assert!(!outcome.content.truncated);
        assert!(outcome.error.is_none());

        let sent = ledger.sent_params();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].gas_limit, 120_000);
        assert_eq!(sent[0].gas_price, 1_100_000_000);
    }

    #[tokio::test]
    async fn test_estimation_failure_uses_fallback() {
        let ledger = Arc::new(MockLedger::new());
        ledger.add_task(1, "t");
        ledger.fail_estimate("execution reverted");

        let outcome = submitter(&ledger).submit(1, "r").await;

        assert!(outcome.success);
        assert_eq!(ledger.sent_params()[0].gas_limit, FALLBACK_GAS_LIMIT);
    }

    #[tokio::test]
    async fn test_large_result_is_truncated_before_sending() {
        let ledger = Arc::new(MockLedger::new());
        ledger.add_task(1, "t");
        let result = "x".repeat(12000);

        let outcome = submitter(&ledger).submit(1, &result).await;

        assert!(outcome.success);
        assert!(outcome.content.truncated);
        assert_eq!(outcome.content.original_length, 12000);
        let stored = ledger.sent_results().remove(0);
        assert!(stored.contains("12000"));
        assert!(stored.len() < result.len());
        assert!(stored.len() <= StorageLimits::default().max_bytes);
    }

    #[tokio::test]
    async fn test_broadcast_failure_has_no_hash() {
        let ledger = Arc::new(MockLedger::new());
        ledger.fail_send("insufficient funds for gas * price + value");

        let outcome = submitter(&ledger).submit(1, "r").await;

        assert!(!outcome.success);
        assert!(outcome.transaction_hash.is_none());
        assert_eq!(outcome.failure_stage, Some(FailureStage::Broadcast));
        assert!(!outcome.retryable);
        assert!(outcome.error.unwrap().contains("insufficient funds"));
    }

    #[tokio::test]
    async fn test_failed_broadcast_does_not_consume_nonce() {
        let ledger = Arc::new(MockLedger::new());
        ledger.add_task(1, "t");
        ledger.set_stale_nonce(true);
        let submitter = submitter(&ledger);

        ledger.fail_send("connection reset");
        let failed = submitter.submit(1, "a").await;
        assert!(failed.retryable);

        ledger.clear_failures();
        let ok = submitter.submit(1, "b").await;
        assert_eq!(ok.nonce, Some(0));
    }

    #[tokio::test]
    async fn test_nonce_fetch_failure() {
        let ledger = Arc::new(MockLedger::new());
        ledger.fail_nonce("connection refused");

        let outcome = submitter(&ledger).submit(1, "r").await;

        assert!(!outcome.success);
        assert_eq!(outcome.failure_stage, Some(FailureStage::Preparation));
        assert!(outcome.retryable);
        assert!(ledger.sent_params().is_empty());
    }

    #[tokio::test]
    async fn test_gas_price_failure() {
        let ledger = Arc::new(MockLedger::new());
        ledger.fail_gas_price("timeout");

        let outcome = submitter(&ledger).submit(1, "r").await;

        assert_eq!(outcome.failure_stage, Some(FailureStage::Preparation));
        assert!(ledger.sent_params().is_empty());
    }

    #[tokio::test]
    async fn test_reverted_transaction_keeps_hash_and_receipt() {
        let ledger = Arc::new(MockLedger::new());
        ledger.add_task(1, "t");
        ledger.set_revert(true);

        let outcome = submitter(&ledger).submit(1, "r").await;

        assert!(!outcome.success);
        assert!(outcome.transaction_hash.is_some());
        assert_eq!(outcome.receipt.as_ref().map(|r| r.status), Some(0));
        assert!(outcome.on_chain_result.is_none());
        assert_eq!(outcome.failure_stage, Some(FailureStage::Rejected));
        assert_eq!(outcome.error.as_deref(), Some("Transaction failed"));
        assert_eq!(ledger.get_task_calls(), 0);
    }

    #[tokio::test]
    async fn test_confirmation_timeout_keeps_hash() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_never_mine(true);

        let outcome = submitter(&ledger).submit(1, "r").await;

        assert!(!outcome.success);
        assert!(outcome.transaction_hash.is_some());
        assert!(outcome.receipt.is_none());
        assert_eq!(outcome.failure_stage, Some(FailureStage::Confirmation));
        assert_eq!(ledger.sent_params().len(), 1);
    }

    #[tokio::test]
    async fn test_verification_failure_still_success() {
        let ledger = Arc::new(MockLedger::new());
        ledger.fail_get_task(LedgerError::Rpc("node unavailable".into()));

        let outcome = submitter(&ledger).submit(1, "r").await;

        assert!(outcome.success);
        assert!(outcome.on_chain_result.is_none());
        assert!(outcome.verification_error.unwrap().contains("node unavailable"));
    }

    #[tokio::test]
    async fn test_concurrent_submissions_use_distinct_nonces() {
        let ledger = Arc::new(MockLedger::new());
        for id in 0..8 {
            ledger.add_task(id, "t");
        }
        let submitter = submitter(&ledger);

        let outcomes = join_all((0..8).map(|id| submitter.submit(id, "concurrent"))).await;

        assert!(outcomes.iter().all(|o| o.success));
        let nonces = ledger.broadcast_nonces();
        assert_eq!(nonces.len(), 8);
        let unique: HashSet<u64> = nonces.iter().copied().collect();
        assert_eq!(unique.len(), 8);
    }

    #[tokio::test]
    async fn test_timed_out_nonce_is_handed_back_to_chain() {
        let ledger = Arc::new(MockLedger::new());
        // Node keeps reporting 0 pending: the first broadcast was dropped
        ledger.set_stale_nonce(true);
        ledger.set_never_mine(true);
        let submitter = submitter(&ledger);

        let first = submitter.submit(1, "a").await;
        assert_eq!(first.failure_stage, Some(FailureStage::Confirmation));
        assert_eq!(first.nonce, Some(0));

        let second = submitter.submit(1, "a").await;
        assert_eq!(second.nonce, Some(0));

        let third = submitter.submit(1, "a").await;
        assert_eq!(third.nonce, Some(0));
        assert_eq!(ledger.broadcast_nonces(), vec![0, 0, 0]);
    }

    #[tokio::test]
    async fn test_nonce_conflict_resyncs_with_chain() {
        let ledger = Arc::new(MockLedger::new());
        ledger.add_task(1, "t");
        ledger.set_stale_nonce(true);
        let submitter = submitter(&ledger);

        let ok = submitter.submit(1, "a").await;
        assert_eq!(ok.nonce, Some(0));

        ledger.fail_send("nonce too high");
        let rejected = submitter.submit(1, "b").await;
        assert_eq!(rejected.failure_stage, Some(FailureStage::Broadcast));
        assert!(rejected.retryable);

        ledger.clear_failures();
        let resynced = submitter.submit(1, "c").await;
        assert_eq!(resynced.nonce, Some(0));
    }

    #[tokio::test]
    async fn test_stale_node_nonce_is_not_reused() {
        let ledger = Arc::new(MockLedger::new());
        ledger.set_stale_nonce(true);
        ledger.add_task(1, "t");
        ledger.add_task(2, "t");
        let submitter = submitter(&ledger);

        let (a, b) = tokio::join!(submitter.submit(1, "a"), submitter.submit(2, "b"));

        assert!(a.success && b.success);
        let mut nonces = ledger.broadcast_nonces();
        nonces.sort_unstable();
        assert_eq!(nonces, vec![0, 1]);
    }
}
