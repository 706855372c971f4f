//! Task Reader - single-task lookups against the ledger contract.

use std::sync::Arc;
use tracing::{error, info};

use crate::ledger_client::LedgerClient;
use crate::types::{LedgerError, Task, TaskId, TaskResultView};

/// Looks up a task's current on-chain record
#[derive(Clone)]
pub struct TaskReader {
    client: Arc<dyn LedgerClient>,
}

impl TaskReader {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self { client }
    }

    /// One `getTask` call. Faults come back as a typed error, never as a
    /// partially filled task.
    pub async fn read(&self, task_id: TaskId) -> Result<Task, LedgerError> {
        match self.client.get_task(task_id).await {
            Ok(task) => {
                if task.result.is_empty() {
                    info!("Task {} exists but has no result yet", task_id);
                }
                Ok(task)
            }
            Err(e) => {
                error!("Error fetching task {}: {}", task_id, e);
                Err(e)
            }
        }
    }

    /// Just the stored result and its identifying fields
    pub async fn read_result(&self, task_id: TaskId) -> Result<TaskResultView, LedgerError> {
        self.read(task_id).await.map(TaskResultView::from)
    }
}
