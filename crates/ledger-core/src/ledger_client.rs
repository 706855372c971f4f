//! ============================================================================
//! Ledger Client - Capability interface to the ledger contract
//! ============================================================================
//! The submission, read and event paths only ever talk to the chain through
//! this trait. `EvmLedgerClient` implements it over JSON-RPC; tests use an
//! in-memory implementation.
//! ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{LedgerError, ReceiptSummary, Task, TaskEvent, TaskEventKind, TaskId};

/// Arguments of a `completeTask(id, result)` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTaskCall {
    pub task_id: TaskId,
    pub result: String,
}

/// Fee and ordering fields of an outgoing transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxParams {
    pub nonce: u64,
    pub gas_limit: u64,
    /// Wei per gas unit
    pub gas_price: u128,
}

/// Read and write operations against the ledger contract for one signer
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Address of the signing account, 0x-prefixed hex
    fn signer_address(&self) -> String;

    /// Latest block height
    async fn block_number(&self) -> Result<u64, LedgerError>;

    /// Transaction count of the signer, including pending transactions
    async fn pending_nonce(&self) -> Result<u64, LedgerError>;

    /// Current network gas price in wei
    async fn gas_price(&self) -> Result<u128, LedgerError>;

    /// Gas estimate for a `completeTask` call sent with `nonce`
    async fn estimate_complete_task(
        &self,
        call: &CompleteTaskCall,
        nonce: u64,
    ) -> Result<u64, LedgerError>;

    /// Sign and broadcast a `completeTask` transaction; returns its hash
    async fn send_complete_task(
        &self,
        call: &CompleteTaskCall,
        params: &TxParams,
    ) -> Result<String, LedgerError>;

    /// Receipt for `tx_hash`, or `None` while still pending
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<ReceiptSummary>, LedgerError>;

    /// `getTask(id)` view call
    async fn get_task(&self, id: TaskId) -> Result<Task, LedgerError>;

    /// Events of one kind from `from_block` up to the latest block
    async fn task_events(
        &self,
        kind: TaskEventKind,
        from_block: u64,
    ) -> Result<Vec<TaskEvent>, LedgerError>;
}
