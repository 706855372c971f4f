//! ============================================================================
//! Ledger Service - Request-facing operations
//! ============================================================================
//! The single object an API layer or CLI holds. Owns the ledger connection
//! (and therefore the signing key and nonce lock) for the process lifetime;
//! constructed once at startup, dropped at shutdown.
//! ============================================================================

use std::sync::Arc;
use tracing::info;

use crate::config::LedgerConfig;
use crate::content::StorageLimits;
use crate::evm_client::EvmLedgerClient;
use crate::events::EventAggregator;
use crate::ledger_abi::LedgerAbi;
use crate::ledger_client::LedgerClient;
use crate::reader::TaskReader;
use crate::submitter::{SubmitterConfig, TransactionSubmitter};
use crate::types::{
    LedgerError, PreparedContent, StorageLimitsInfo, Task, TaskId, TaskResultView, TaskSummary,
    TransactionOutcome,
};

/// Gas cost hint for storing text, per kilobyte
pub const ESTIMATED_GAS_PER_KB: &str = "~20,000 gas";

pub struct LedgerService {
    client: Arc<dyn LedgerClient>,
    submitter: TransactionSubmitter,
    reader: TaskReader,
    aggregator: EventAggregator,
    limits: StorageLimits,
}

impl LedgerService {
    /// Load the ABI, connect to the node and wire up every component.
    /// Failures here are fatal configuration faults.
    pub fn connect(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let abi = LedgerAbi::load(&config.abi_path)?;
        let client = EvmLedgerClient::connect(config, abi)?;
        Ok(Self::with_client(
            Arc::new(client),
            config.limits,
            config.submitter.clone(),
            config.event_lookback_blocks,
        ))
    }

    pub fn with_client(
        client: Arc<dyn LedgerClient>,
        limits: StorageLimits,
        submitter_config: SubmitterConfig,
        lookback_blocks: u64,
    ) -> Self {
        Self {
            submitter: TransactionSubmitter::with_config(client.clone(), limits, submitter_config),
            reader: TaskReader::new(client.clone()),
            aggregator: EventAggregator::with_lookback(client.clone(), lookback_blocks),
            client,
            limits,
        }
    }

    pub fn signer_address(&self) -> String {
        self.client.signer_address()
    }

    /// Prepare `result` for storage and write it as the result of `task_id`
    pub async fn prepare_and_submit(&self, task_id: TaskId, result: &str) -> TransactionOutcome {
        info!(
            "Submitting result for task {} ({} characters, {} bytes)",
            task_id,
            result.chars().count(),
            result.len()
        );
        self.submitter.submit(task_id, result).await
    }

    pub async fn read_task(&self, task_id: TaskId) -> Result<Task, LedgerError> {
        info!("Fetching task {} from ledger", task_id);
        self.reader.read(task_id).await
    }

    pub async fn task_result(&self, task_id: TaskId) -> Result<TaskResultView, LedgerError> {
        info!("Fetching final result for task {}", task_id);
        self.reader.read_result(task_id).await
    }

    pub async fn recent_tasks(&self, count: usize) -> Result<Vec<TaskSummary>, LedgerError> {
        info!("Fetching {} recent tasks", count);
        self.aggregator.recent(count).await
    }

    /// What would be stored for `result`, without touching the chain
    pub fn preview(&self, result: &str) -> PreparedContent {
        self.limits.prepare(result)
    }

    pub fn storage_limits(&self) -> StorageLimitsInfo {
        storage_limits_info(&self.limits)
    }
}

/// Static description of the storage limits
pub fn storage_limits_info(limits: &StorageLimits) -> StorageLimitsInfo {
    StorageLimitsInfo {
        max_text_length: limits.max_chars,
        max_byte_size: limits.max_bytes,
        summary_length: limits.summary_len,
        estimated_gas_per_kb: ESTIMATED_GAS_PER_KB.to_string(),
        recommendation: "Keep content under 5KB for optimal performance and cost".to_string(),
        notes: vec![
            "Content exceeding these limits will be automatically truncated".to_string(),
            "Storing large text on-chain is expensive and may require high gas fees".to_string(),
            "For very large content, consider storing only a summary on-chain with a link to off-chain storage".to_string(),
        ],
    }
}
