//! ============================================================================
//! Event Aggregator - Rebuild recent task history from the event log
//! ============================================================================
//! Scans a bounded window of recent blocks for `TaskCreated` and
//! `TaskCompleted` logs and merges them into one summary per task, most
//! recent first. Tasks whose events all fall before the window are not seen.
//! ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::ledger_client::LedgerClient;
use crate::types::{LedgerError, TaskEvent, TaskEventKind, TaskId, TaskStatus, TaskSummary};

/// Number of blocks scanned back from the chain head
pub const DEFAULT_LOOKBACK_BLOCKS: u64 = 5000;

/// Read-only view over recent task events
#[derive(Clone)]
pub struct EventAggregator {
    client: Arc<dyn LedgerClient>,
    lookback_blocks: u64,
}

impl EventAggregator {
    pub fn new(client: Arc<dyn LedgerClient>) -> Self {
        Self::with_lookback(client, DEFAULT_LOOKBACK_BLOCKS)
    }

    pub fn with_lookback(client: Arc<dyn LedgerClient>, lookback_blocks: u64) -> Self {
        Self {
            client,
            lookback_blocks,
        }
    }

    /// Up to `count` task summaries, most recently touched first
    pub async fn recent(&self, count: usize) -> Result<Vec<TaskSummary>, LedgerError> {
        let latest = self.client.block_number().await?;
        let from_block = latest.saturating_sub(self.lookback_blocks);
        info!(
            "Scanning task events in blocks {}..={} for {} recent tasks",
            from_block, latest, count
        );

        let mut events = self
            .client
            .task_events(TaskEventKind::Created, from_block)
            .await?;
        let completed = self
            .client
            .task_events(TaskEventKind::Completed, from_block)
            .await?;
        debug!(
            "Found {} created and {} completed events",
            events.len(),
            completed.len()
        );
        events.extend(completed);

        let mut summaries = merge_events(&events);
        summaries.truncate(count);
        Ok(summaries)
    }
}

/// Merge events into per-task summaries sorted by relevant block, descending.
///
/// Creation events seed the table; completion events then update the matching
/// entry or, when the creation fell outside the scanned range, insert a
/// completion-only summary. Ties are broken by descending task id.
pub fn merge_events(events: &[TaskEvent]) -> Vec<TaskSummary> {
    let mut tasks: BTreeMap<TaskId, TaskSummary> = BTreeMap::new();

    for event in events {
        if let TaskEvent::Created {
            id,
            topic,
            requester,
            block,
            tx_hash,
        } = event
        {
            tasks.insert(
                *id,
                TaskSummary {
                    id: *id,
                    status: TaskStatus::Created,
                    topic: Some(topic.clone()),
                    requester: Some(requester.clone()),
                    result: None,
                    created_block: Some(*block),
                    created_tx: Some(tx_hash.clone()),
                    completed_block: None,
                    completed_tx: None,
                },
            );
        }
    }

    for event in events {
        if let TaskEvent::Completed {
            id,
            result,
            block,
            tx_hash,
        } = event
        {
            let summary = tasks.entry(*id).or_insert_with(|| TaskSummary {
                id: *id,
                status: TaskStatus::Completed,
                topic: None,
                requester: None,
                result: None,
                created_block: None,
                created_tx: None,
                completed_block: None,
                completed_tx: None,
            });

            // Keep the latest completion if a task was completed twice
            if summary.completed_block.map_or(true, |seen| *block >= seen) {
                summary.status = TaskStatus::Completed;
                summary.result = Some(result.clone());
                summary.completed_block = Some(*block);
                summary.completed_tx = Some(tx_hash.clone());
            }
        }
    }

    let mut summaries: Vec<TaskSummary> = tasks.into_values().collect();
    summaries.sort_by(|a, b| {
        b.relevant_block()
            .cmp(&a.relevant_block())
            .then(b.id.cmp(&a.id))
    });
    summaries
}
