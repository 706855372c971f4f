//! ============================================================================
//! Core Types for the Task Ledger
//! ============================================================================
//! Data structures for on-chain tasks, ledger events, merged task summaries
//! and submission outcomes. Everything here serializes to JSON for callers.
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Task identifiers are assigned by the ledger contract at creation
pub type TaskId = u64;

/// A task record as returned by the contract's `getTask`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: TaskId,
    pub topic: String,
    pub result: String,
    /// Requester address, 0x-prefixed hex
    pub requester: String,
}

/// Subset of a task returned by the task-result view
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskResultView {
    pub task_id: TaskId,
    pub topic: String,
    pub result: String,
    pub requester: String,
}

impl From<Task> for TaskResultView {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.id,
            topic: task.topic,
            result: task.result,
            requester: task.requester,
        }
    }
}

/// Content normalized for ledger storage, with a truncation report
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreparedContent {
    /// Unicode scalar count of the input
    pub original_length: usize,
    /// UTF-8 byte count of the input
    pub original_byte_size: usize,
    pub truncated: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub truncated_byte_size: Option<usize>,
}

impl PreparedContent {
    /// Character count of what will actually be stored
    pub fn stored_length(&self) -> usize {
        self.truncated_length.unwrap_or(self.original_length)
    }
}

/// Which contract event a log query targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Created,
    Completed,
}

impl TaskEventKind {
    /// Event name as declared in the contract ABI
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Created => "TaskCreated",
            Self::Completed => "TaskCompleted",
        }
    }
}

/// A decoded contract event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    Created {
        id: TaskId,
        topic: String,
        requester: String,
        block: u64,
        tx_hash: String,
    },
    Completed {
        id: TaskId,
        result: String,
        block: u64,
        tx_hash: String,
    },
}

impl TaskEvent {
    pub fn id(&self) -> TaskId {
        match self {
            Self::Created { id, .. } | Self::Completed { id, .. } => *id,
        }
    }

    pub fn block(&self) -> u64 {
        match self {
            Self::Created { block, .. } | Self::Completed { block, .. } => *block,
        }
    }

    pub fn kind(&self) -> TaskEventKind {
        match self {
            Self::Created { .. } => TaskEventKind::Created,
            Self::Completed { .. } => TaskEventKind::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TaskStatus {
    Created,
    Completed,
}

/// Merged view of a task built from its observed events.
///
/// `status == Completed` implies `result.is_some()`; a created-only summary
/// has no result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSummary {
    pub id: TaskId,
    pub status: TaskStatus,
    pub topic: Option<String>,
    pub requester: Option<String>,
    pub result: Option<String>,
    pub created_block: Option<u64>,
    pub created_tx: Option<String>,
    pub completed_block: Option<u64>,
    pub completed_tx: Option<String>,
}

impl TaskSummary {
    /// Completion block if known, otherwise creation block
    pub fn relevant_block(&self) -> u64 {
        self.completed_block.or(self.created_block).unwrap_or(0)
    }
}

/// Receipt details surfaced to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiptSummary {
    /// 1 = success, 0 = reverted
    pub status: u8,
    pub gas_used: u64,
    pub block_number: u64,
}

/// Where in the submission sequence a failure happened
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    /// Nonce or gas price could not be read
    Preparation,
    /// Signing or sending failed
    Broadcast,
    /// No receipt before the timeout
    Confirmation,
    /// Receipt status reports failure
    Rejected,
}

/// What was stored relative to what was produced
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentStatus {
    pub truncated: bool,
    pub original_length: usize,
    pub stored_length: usize,
    pub percentage_stored: f64,
}

impl ContentStatus {
    pub fn from_prepared(prepared: &PreparedContent) -> Self {
        let stored_length = prepared.stored_length();
        let percentage_stored = if prepared.original_length == 0 {
            0.0
        } else if !prepared.truncated {
            100.0
        } else {
            let pct = stored_length as f64 / prepared.original_length as f64 * 100.0;
            (pct * 100.0).round() / 100.0
        };

        Self {
            truncated: prepared.truncated,
            original_length: prepared.original_length,
            stored_length,
            percentage_stored,
        }
    }
}

/// Result of one submission attempt. Always produced, never an `Err`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionOutcome {
    pub success: bool,
    pub task_id: TaskId,
    /// Set as soon as broadcast succeeds, even if confirmation later fails
    pub transaction_hash: Option<String>,
    pub nonce: Option<u64>,
    pub receipt: Option<ReceiptSummary>,
    /// Verified snapshot re-read after confirmation
    pub on_chain_result: Option<Task>,
    pub content: ContentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_stage: Option<FailureStage>,
    /// Hint for callers deciding whether to re-invoke
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_error: Option<String>,
    pub submitted_at: i64,
}

/// Static storage limits echoed to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageLimitsInfo {
    pub max_text_length: usize,
    pub max_byte_size: usize,
    pub summary_length: usize,
    pub estimated_gas_per_kb: String,
    pub recommendation: String,
    pub notes: Vec<String>,
}

/// Error types for the ledger layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("ABI error: {0}")]
    Abi(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Malformed ledger response: {0}")]
    Malformed(String),

    #[error("Signing error: {0}")]
    Signing(String),
}
