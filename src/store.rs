use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{AgentRecord, BatchInfo, ChatLogEntry, RecordFilter, StoredRecord};

/// Persistence boundary for merged reports and chat transcripts.
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Writes one date group in a single operation; it lands whole or not at all.
    async fn persist_records(
        &self,
        batch_id: Uuid,
        date: NaiveDate,
        records: &[AgentRecord],
    ) -> StoreResult<()>;

    async fn fetch_records(&self, filter: &RecordFilter) -> StoreResult<Vec<StoredRecord>>;

    async fn fetch_latest_batch(&self) -> StoreResult<Option<Uuid>>;

    async fn fetch_batches(&self) -> StoreResult<Vec<BatchInfo>>;

    /// Upserts on chat id. Like `persist_records`, a call lands whole or not at all.
    async fn upsert_chat_logs(&self, logs: &[ChatLogEntry]) -> StoreResult<usize>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    records: Vec<StoredRecord>,
    chat_logs: HashMap<String, ChatLogEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn chat_log_count(&self) -> StoreResult<usize> {
        Ok(self.lock()?.chat_logs.len())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ReportStore for MemoryStore {
    async fn persist_records(
        &self,
        batch_id: Uuid,
        date: NaiveDate,
        records: &[AgentRecord],
    ) -> StoreResult<()> {
        let mut state = self.lock()?;
        for record in records {
            state.next_id += 1;
            let id = state.next_id;
            state.records.push(StoredRecord {
                id,
                batch_id,
                record: AgentRecord {
                    date,
                    ..record.clone()
                },
            });
        }
        Ok(())
    }

    async fn fetch_records(&self, filter: &RecordFilter) -> StoreResult<Vec<StoredRecord>> {
        let state = self.lock()?;
        Ok(state
            .records
            .iter()
            .filter(|stored| filter.matches(stored))
            .cloned()
            .collect())
    }

    async fn fetch_latest_batch(&self) -> StoreResult<Option<Uuid>> {
        let state = self.lock()?;
        Ok(state.records.last().map(|stored| stored.batch_id))
    }

    async fn fetch_batches(&self) -> StoreResult<Vec<BatchInfo>> {
        let state = self.lock()?;
        let mut batches: Vec<BatchInfo> = Vec::new();
        for stored in state.records.iter().rev() {
            match batches.iter_mut().find(|b| b.batch_id == stored.batch_id) {
                Some(batch) => batch.agents += 1,
                None => batches.push(BatchInfo {
                    batch_id: stored.batch_id,
                    date: stored.record.date,
                    agents: 1,
                }),
            }
        }
        Ok(batches)
    }

    async fn upsert_chat_logs(&self, logs: &[ChatLogEntry]) -> StoreResult<usize> {
        let mut state = self.lock()?;
        for log in logs {
            state.chat_logs.insert(log.chat_id.clone(), log.clone());
        }
        Ok(logs.len())
    }
}
