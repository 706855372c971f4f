//! In-memory ledger used by unit tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::ledger_client::{CompleteTaskCall, LedgerClient, TxParams};
use crate::types::{LedgerError, ReceiptSummary, Task, TaskEvent, TaskEventKind, TaskId};

const SIGNER: &str = "0x00000000000000000000000000000000000000f1";

#[derive(Debug, Clone)]
struct SentTx {
    params: TxParams,
    result: String,
    success: bool,
    block: u64,
}

#[derive(Default)]
struct MockState {
    block_number: u64,
    /// Pending count reported while `stale_nonce` is set
    base_nonce: u64,
    stale_nonce: bool,
    gas_estimate: u64,
    gas_price: u128,
    revert: bool,
    never_mine: bool,
    receipt_delay_polls: u32,
    receipt_errors: u32,
    receipt_polls: u32,
    get_task_calls: u32,
    fail_nonce: Option<String>,
    fail_gas_price: Option<String>,
    fail_estimate: Option<String>,
    fail_send: Option<String>,
    fail_events: Option<String>,
    fail_get_task: Option<LedgerError>,
    tasks: HashMap<TaskId, Task>,
    events: Vec<TaskEvent>,
    event_queries: Vec<(TaskEventKind, u64)>,
    sent: Vec<(String, SentTx)>,
}

/// Scriptable [`LedgerClient`] that keeps tasks, events and broadcasts in memory
pub struct MockLedger {
    state: Mutex<MockState>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                block_number: 1_000,
                gas_estimate: 50_000,
                gas_price: 25_000_000_000,
                ..Default::default()
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn add_task(&self, id: TaskId, topic: &str) {
        self.with_state(|s| {
            s.tasks.insert(
                id,
                Task {
                    id,
                    topic: topic.to_string(),
                    result: String::new(),
                    requester: SIGNER.to_string(),
                },
            );
        });
    }

    pub fn set_task_result(&self, id: TaskId, result: &str) {
        self.with_state(|s| {
            if let Some(task) = s.tasks.get_mut(&id) {
                task.result = result.to_string();
            }
        });
    }

    pub fn push_event(&self, event: TaskEvent) {
        self.with_state(|s| s.events.push(event));
    }

    pub fn set_block_number(&self, block: u64) {
        self.with_state(|s| s.block_number = block);
    }

    pub fn set_gas_estimate(&self, gas: u64) {
        self.with_state(|s| s.gas_estimate = gas);
    }

    pub fn set_gas_price(&self, price: u128) {
        self.with_state(|s| s.gas_price = price);
    }

    /// Report the same pending count no matter how many broadcasts happened
    pub fn set_stale_nonce(&self, stale: bool) {
        self.with_state(|s| s.stale_nonce = stale);
    }

    pub fn set_revert(&self, revert: bool) {
        self.with_state(|s| s.revert = revert);
    }

    pub fn set_never_mine(&self, never: bool) {
        self.with_state(|s| s.never_mine = never);
    }

    pub fn set_receipt_delay_polls(&self, polls: u32) {
        self.with_state(|s| s.receipt_delay_polls = polls);
    }

    pub fn set_receipt_errors(&self, errors: u32) {
        self.with_state(|s| s.receipt_errors = errors);
    }

    pub fn fail_nonce(&self, msg: &str) {
        self.with_state(|s| s.fail_nonce = Some(msg.to_string()));
    }

    pub fn fail_gas_price(&self, msg: &str) {
        self.with_state(|s| s.fail_gas_price = Some(msg.to_string()));
    }

    pub fn fail_estimate(&self, msg: &str) {
        self.with_state(|s| s.fail_estimate = Some(msg.to_string()));
    }

    pub fn fail_send(&self, msg: &str) {
        self.with_state(|s| s.fail_send = Some(msg.to_string()));
    }

    pub fn fail_events(&self, msg: &str) {
        self.with_state(|s| s.fail_events = Some(msg.to_string()));
    }

    pub fn fail_get_task(&self, err: LedgerError) {
        self.with_state(|s| s.fail_get_task = Some(err));
    }

    pub fn clear_failures(&self) {
        self.with_state(|s| {
            s.fail_nonce = None;
            s.fail_gas_price = None;
            s.fail_estimate = None;
            s.fail_send = None;
            s.fail_events = None;
            s.fail_get_task = None;
        });
    }

    /// Register a transaction as already broadcast and return its hash
    pub fn preload_sent_transaction(&self, success: bool) -> String {
        self.with_state(|s| {
            let hash = format!("0x{:064x}", s.sent.len() + 1);
            let block = s.block_number;
            let nonce = s.sent.len() as u64;
            s.sent.push((
                hash.clone(),
                SentTx {
                    params: TxParams {
                        nonce,
                        gas_limit: 0,
                        gas_price: 0,
                    },
                    result: String::new(),
                    success,
                    block,
                },
            ));
            hash
        })
    }

    pub fn sent_params(&self) -> Vec<TxParams> {
        self.with_state(|s| s.sent.iter().map(|(_, tx)| tx.params).collect())
    }

    pub fn sent_results(&self) -> Vec<String> {
        self.with_state(|s| s.sent.iter().map(|(_, tx)| tx.result.clone()).collect())
    }

    pub fn broadcast_nonces(&self) -> Vec<u64> {
        self.with_state(|s| s.sent.iter().map(|(_, tx)| tx.params.nonce).collect())
    }

    pub fn receipt_polls(&self) -> u32 {
        self.with_state(|s| s.receipt_polls)
    }

    pub fn get_task_calls(&self) -> u32 {
        self.with_state(|s| s.get_task_calls)
    }

    pub fn event_queries(&self) -> Vec<(TaskEventKind, u64)> {
        self.with_state(|s| s.event_queries.clone())
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn signer_address(&self) -> String {
        SIGNER.to_string()
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        Ok(self.with_state(|s| s.block_number))
    }

    async fn pending_nonce(&self) -> Result<u64, LedgerError> {
        self.with_state(|s| {
            if let Some(msg) = &s.fail_nonce {
                return Err(LedgerError::Rpc(msg.clone()));
            }
            if s.stale_nonce {
                Ok(s.base_nonce)
            } else {
                Ok(s.base_nonce + s.sent.len() as u64)
            }
        })
    }

    async fn gas_price(&self) -> Result<u128, LedgerError> {
        self.with_state(|s| match &s.fail_gas_price {
            Some(msg) => Err(LedgerError::Rpc(msg.clone())),
            None => Ok(s.gas_price),
        })
    }

    async fn estimate_complete_task(
        &self,
        _call: &CompleteTaskCall,
        _nonce: u64,
    ) -> Result<u64, LedgerError> {
        // Give concurrent submissions a chance to interleave
        tokio::task::yield_now().await;
        self.with_state(|s| match &s.fail_estimate {
            Some(msg) => Err(LedgerError::Rpc(msg.clone())),
            None => Ok(s.gas_estimate),
        })
    }

    async fn send_complete_task(
        &self,
        call: &CompleteTaskCall,
        params: &TxParams,
    ) -> Result<String, LedgerError> {
        tokio::task::yield_now().await;
        self.with_state(|s| {
            if let Some(msg) = &s.fail_send {
                return Err(LedgerError::Rpc(msg.clone()));
            }

            s.block_number += 1;
            let block = s.block_number;
            let hash = format!("0x{:064x}", s.sent.len() + 1);
            let success = !s.revert;

            if success {
                let task = s.tasks.entry(call.task_id).or_insert_with(|| Task {
                    id: call.task_id,
                    topic: String::new(),
                    result: String::new(),
                    requester: SIGNER.to_string(),
                });
                task.result = call.result.clone();
                s.events.push(TaskEvent::Completed {
                    id: call.task_id,
                    result: call.result.clone(),
                    block,
                    tx_hash: hash.clone(),
                });
            }

            s.sent.push((
                hash.clone(),
                SentTx {
                    params: *params,
                    result: call.result.clone(),
                    success,
                    block,
                },
            ));
            Ok(hash)
        })
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<ReceiptSummary>, LedgerError> {
        self.with_state(|s| {
            s.receipt_polls += 1;
            if s.receipt_errors > 0 {
                s.receipt_errors -= 1;
                return Err(LedgerError::Rpc("connection reset".into()));
            }
            if s.never_mine {
                return Ok(None);
            }
            if s.receipt_delay_polls > 0 {
                s.receipt_delay_polls -= 1;
                return Ok(None);
            }
            Ok(s.sent.iter().find(|(h, _)| h == tx_hash).map(|(_, tx)| ReceiptSummary {
                status: u8::from(tx.success),
                gas_used: 21_000 + tx.result.len() as u64 * 16,
                block_number: tx.block,
            }))
        })
    }

    async fn get_task(&self, id: TaskId) -> Result<Task, LedgerError> {
        self.with_state(|s| {
            s.get_task_calls += 1;
            if let Some(err) = &s.fail_get_task {
                return Err(err.clone());
            }
            s.tasks
                .get(&id)
                .cloned()
                .ok_or_else(|| LedgerError::NotFound(format!("task {} does not exist", id)))
        })
    }

    async fn task_events(
        &self,
        kind: TaskEventKind,
        from_block: u64,
    ) -> Result<Vec<TaskEvent>, LedgerError> {
        self.with_state(|s| {
            s.event_queries.push((kind, from_block));
            if let Some(msg) = &s.fail_events {
                return Err(LedgerError::Rpc(msg.clone()));
            }
            Ok(s.events
                .iter()
                .filter(|e| e.kind() == kind && e.block() >= from_block && e.block() <= s.block_number)
                .cloned()
                .collect())
        })
    }
}
