//! ============================================================================
//! Ledger Contract ABI - Call encoding and event decoding
//! ============================================================================
//! Loads the contract interface description supplied at startup and uses it
//! to encode `getTask` / `completeTask` calls and decode `TaskCreated` /
//! `TaskCompleted` logs. Indexed vs. non-indexed event parameters follow
//! whatever the deployed contract declares.
//! ============================================================================

use alloy::dyn_abi::{DynSolValue, EventExt, FunctionExt, JsonAbiExt};
use alloy::json_abi::{Event, Function, JsonAbi};
use alloy::primitives::{Address, LogData, B256, U256};
use std::path::Path;
use tracing::info;

use crate::ledger_client::CompleteTaskCall;
use crate::types::{LedgerError, Task, TaskEvent, TaskEventKind, TaskId};

// ============================================================================
// Constants
// ============================================================================

/// Default location of the contract interface description
pub const DEFAULT_ABI_PATH: &str = "TaskLedger.json";

pub const GET_TASK: &str = "getTask";
pub const COMPLETE_TASK: &str = "completeTask";
pub const TASK_CREATED: &str = "TaskCreated";
pub const TASK_COMPLETED: &str = "TaskCompleted";

// ============================================================================
// Contract Binding
// ============================================================================

/// The four contract items this layer depends on, resolved from the ABI
#[derive(Debug, Clone)]
pub struct LedgerAbi {
    get_task: Function,
    complete_task: Function,
    task_created: Event,
    task_completed: Event,
}

impl LedgerAbi {
    /// Read and resolve the ABI file. Any failure here is a startup fault.
    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        info!("Loading contract ABI from: {}", path.display());

        if !path.exists() {
            return Err(LedgerError::Config(format!(
                "ABI file {} not found",
                path.display()
            )));
        }

        let json = std::fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("Failed to read ABI file: {}", e)))?;

        Self::from_json(&json)
    }

    /// Parse either a bare ABI array or a build artifact with an `abi` field
    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| LedgerError::Abi(format!("Invalid ABI JSON: {}", e)))?;

        let items = match value {
            serde_json::Value::Object(mut obj) => obj
                .remove("abi")
                .ok_or_else(|| LedgerError::Abi("ABI object has no 'abi' field".into()))?,
            other => other,
        };

        let abi: JsonAbi = serde_json::from_value(items)
            .map_err(|e| LedgerError::Abi(format!("Failed to parse ABI: {}", e)))?;

        Self::from_abi(&abi)
    }

    pub fn from_abi(abi: &JsonAbi) -> Result<Self, LedgerError> {
        Ok(Self {
            get_task: find_function(abi, GET_TASK)?,
            complete_task: find_function(abi, COMPLETE_TASK)?,
            task_created: find_event(abi, TASK_CREATED)?,
            task_completed: find_event(abi, TASK_COMPLETED)?,
        })
    }

    pub fn encode_get_task(&self, id: TaskId) -> Result<Vec<u8>, LedgerError> {
        self.get_task
            .abi_encode_input(&[DynSolValue::Uint(U256::from(id), 256)])
            .map_err(|e| LedgerError::Abi(format!("Failed to encode getTask: {}", e)))
    }

    pub fn encode_complete_task(&self, call: &CompleteTaskCall) -> Result<Vec<u8>, LedgerError> {
        self.complete_task
            .abi_encode_input(&[
                DynSolValue::Uint(U256::from(call.task_id), 256),
                DynSolValue::String(call.result.clone()),
            ])
            .map_err(|e| LedgerError::Abi(format!("Failed to encode completeTask: {}", e)))
    }

    /// Decode `getTask` return data into a [`Task`].
    ///
    /// Accepts both a flat `(id, topic, result, requester)` return and a
    /// single struct return. A zeroed record means the id does not exist.
    pub fn decode_get_task(&self, id: TaskId, data: &[u8]) -> Result<Task, LedgerError> {
        let mut values = self
            .get_task
            .abi_decode_output(data)
            .map_err(|e| LedgerError::Malformed(format!("Failed to decode getTask: {}", e)))?;

        if values.len() == 1 {
            if let DynSolValue::Tuple(inner) = values.remove(0) {
                values = inner;
            } else {
                return Err(LedgerError::Malformed(
                    "getTask returned a single non-tuple value".into(),
                ));
            }
        }

        if values.len() != 4 {
            return Err(LedgerError::Malformed(format!(
                "getTask returned {} values, expected 4",
                values.len()
            )));
        }

        let task_id = as_task_id(&values[0], "id")?;
        let topic = as_string(&values[1], "topic")?;
        let result = as_string(&values[2], "result")?;
        let requester = as_address(&values[3], "requester")?;

        if task_id == 0 && requester == Address::ZERO {
            return Err(LedgerError::NotFound(format!("task {} does not exist", id)));
        }

        Ok(Task {
            id: task_id,
            topic,
            result,
            requester: requester.to_string(),
        })
    }

    /// Topic-0 selector of the event for `kind`
    pub fn event_selector(&self, kind: TaskEventKind) -> B256 {
        self.event(kind).selector()
    }

    /// Decode one log into a [`TaskEvent`]
    pub fn decode_event(
        &self,
        kind: TaskEventKind,
        log: &LogData,
        block: u64,
        tx_hash: String,
    ) -> Result<TaskEvent, LedgerError> {
        let event = self.event(kind);
        let decoded = event.decode_log(log).map_err(|e| {
            LedgerError::Malformed(format!("Failed to decode {}: {}", event.name, e))
        })?;

        // Re-assemble parameters in declaration order
        let mut indexed = decoded.indexed.into_iter();
        let mut body = decoded.body.into_iter();
        let mut fields: Vec<(String, DynSolValue)> = Vec::with_capacity(event.inputs.len());
        for param in &event.inputs {
            let value = if param.indexed {
                indexed.next()
            } else {
                body.next()
            };
            let value = value.ok_or_else(|| {
                LedgerError::Malformed(format!("{} is missing '{}'", event.name, param.name))
            })?;
            fields.push((param.name.clone(), value));
        }

        let name = event.name.as_str();
        match kind {
            TaskEventKind::Created => Ok(TaskEvent::Created {
                id: as_task_id(field(&fields, name, "id", 0)?, "id")?,
                topic: as_string(field(&fields, name, "topic", 1)?, "topic")?,
                requester: as_address(field(&fields, name, "requester", 2)?, "requester")?.to_string(),
                block,
                tx_hash,
            }),
            TaskEventKind::Completed => Ok(TaskEvent::Completed {
                id: as_task_id(field(&fields, name, "id", 0)?, "id")?,
                result: as_string(field(&fields, name, "result", 1)?, "result")?,
                block,
                tx_hash,
            }),
        }
    }

    fn event(&self, kind: TaskEventKind) -> &Event {
        match kind {
            TaskEventKind::Created => &self.task_created,
            TaskEventKind::Completed => &self.task_completed,
        }
    }
}

/// Look up a decoded event field by name, falling back to its position
fn field<'a>(
    fields: &'a [(String, DynSolValue)],
    event: &str,
    name: &str,
    position: usize,
) -> Result<&'a DynSolValue, LedgerError> {
    fields
        .iter()
        .find(|(n, _)| n == name)
        .or_else(|| fields.get(position))
        .map(|(_, v)| v)
        .ok_or_else(|| LedgerError::Malformed(format!("{} has no '{}' field", event, name)))
}

fn find_function(abi: &JsonAbi, name: &str) -> Result<Function, LedgerError> {
    abi.function(name)
        .and_then(|overloads| overloads.first())
        .cloned()
        .ok_or_else(|| LedgerError::Config(format!("ABI does not declare function '{}'", name)))
}

fn find_event(abi: &JsonAbi, name: &str) -> Result<Event, LedgerError> {
    abi.event(name)
        .and_then(|overloads| overloads.first())
        .cloned()
        .ok_or_else(|| LedgerError::Config(format!("ABI does not declare event '{}'", name)))
}

fn as_task_id(value: &DynSolValue, field: &str) -> Result<TaskId, LedgerError> {
    match value {
        DynSolValue::Uint(v, _) => u64::try_from(*v)
            .map_err(|_| LedgerError::Malformed(format!("'{}' does not fit in u64: {}", field, v))),
        other => Err(LedgerError::Malformed(format!(
            "'{}' is not an unsigned integer: {:?}",
            field, other
        ))),
    }
}

fn as_string(value: &DynSolValue, field: &str) -> Result<String, LedgerError> {
    match value {
        DynSolValue::String(s) => Ok(s.clone()),
        other => Err(LedgerError::Malformed(format!(
            "'{}' is not a string: {:?}",
            field, other
        ))),
    }
}

fn as_address(value: &DynSolValue, field: &str) -> Result<Address, LedgerError> {
    match value {
        DynSolValue::Address(a) => Ok(*a),
        other => Err(LedgerError::Malformed(format!(
            "'{}' is not an address: {:?}",
            field, other
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
