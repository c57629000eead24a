use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{AgentRecord, BatchInfo, ChatLogEntry, RecordFilter, StoredRecord};
use crate::store::ReportStore;

const MAX_BIND_PARAMS: usize = 65_535;
const REPORT_COLUMNS: usize = 15;
const CHAT_LOG_COLUMNS: usize = 11;
pub const MAX_CHAT_LOG_BATCH_SIZE: usize = MAX_BIND_PARAMS / CHAT_LOG_COLUMNS;

pub async fn init_db(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub struct PgStore {
    pool: PgPool,
    chat_log_batch_size: usize,
}

impl PgStore {
    pub fn new(pool: PgPool, chat_log_batch_size: usize) -> Self {
        Self {
            pool,
            chat_log_batch_size: chat_log_batch_size.clamp(1, MAX_CHAT_LOG_BATCH_SIZE),
        }
    }
}

#[async_trait]
impl ReportStore for PgStore {
    async fn persist_records(
        &self,
        batch_id: Uuid,
        date: NaiveDate,
        records: &[AgentRecord],
    ) -> StoreResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        // Noon keeps the calendar day stable across viewer time zones.
        let noon = NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default();
        let created_at = date.and_time(noon).and_utc();

        let mut tx = self.pool.begin().await?;
        for chunk in records.chunks(rows_per_statement(REPORT_COLUMNS)) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO agent_reports.reports \
                 (batch_id, report_date, created_at, agent_name, chats_count, \
                  avg_chat_seconds, total_chat_seconds, last_message_sent, avg_score, \
                  rating_times, score_1, score_2, score_3, score_4, score_5) ",
            );
            builder.push_values(chunk, |mut row, record| {
                row.push_bind(batch_id)
                    .push_bind(date)
                    .push_bind(created_at)
                    .push_bind(&record.agent_name)
                    .push_bind(i64::from(record.chats))
                    .push_bind(seconds_column(record.avg_chat_seconds))
                    .push_bind(seconds_column(record.total_chat_seconds))
                    .push_bind(i64::from(record.last_message_sent_count))
                    .push_bind(record.avg_score)
                    .push_bind(i64::from(record.rating_times));
                for count in record.score_counts {
                    row.push_bind(i64::from(count));
                }
            });
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_records(&self, filter: &RecordFilter) -> StoreResult<Vec<StoredRecord>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, batch_id, report_date, agent_name, chats_count, avg_chat_seconds, \
             total_chat_seconds, last_message_sent, avg_score, rating_times, \
             score_1, score_2, score_3, score_4, score_5 \
             FROM agent_reports.reports WHERE TRUE",
        );
        if let Some((from, to)) = filter.date_range {
            builder
                .push(" AND report_date >= ")
                .push_bind(from)
                .push(" AND report_date <= ")
                .push_bind(to);
        }
        if let Some(batch_id) = filter.batch_id {
            builder.push(" AND batch_id = ").push_bind(batch_id);
        }
        builder.push(" ORDER BY id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(stored_from_row).collect()
    }

    async fn fetch_latest_batch(&self) -> StoreResult<Option<Uuid>> {
        let row = sqlx::query(
            "SELECT batch_id FROM agent_reports.reports ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|row| row.get("batch_id")))
    }

    async fn fetch_batches(&self) -> StoreResult<Vec<BatchInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT batch_id, MAX(report_date) AS report_date, COUNT(*) AS agents
            FROM agent_reports.reports
            GROUP BY batch_id
            ORDER BY MAX(id) DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| BatchInfo {
                batch_id: row.get("batch_id"),
                date: row.get("report_date"),
                agents: row.get("agents"),
            })
            .collect())
    }

    async fn upsert_chat_logs(&self, logs: &[ChatLogEntry]) -> StoreResult<usize> {
        // A single statement may not touch the same chat id twice; the last row wins.
        let mut positions: HashMap<&str, usize> = HashMap::new();
        let mut unique: Vec<&ChatLogEntry> = Vec::new();
        for log in logs {
            match positions.get(log.chat_id.as_str()) {
                Some(&index) => unique[index] = log,
                None => {
                    positions.insert(&log.chat_id, unique.len());
                    unique.push(log);
                }
            }
        }

        let mut tx = self.pool.begin().await?;
        for chunk in unique.chunks(self.chat_log_batch_size) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO agent_reports.chat_logs \
                 (chat_id, agent_name, visitor_name, department, start_time, end_time, \
                  duration_seconds, wait_time_seconds, rating, transcript, tags) ",
            );
            builder.push_values(chunk, |mut row, log| {
                row.push_bind(&log.chat_id)
                    .push_bind(&log.agent_name)
                    .push_bind(&log.visitor_name)
                    .push_bind(&log.department)
                    .push_bind(log.start_time)
                    .push_bind(log.end_time)
                    .push_bind(seconds_column(log.duration_seconds))
                    .push_bind(seconds_column(log.wait_time_seconds))
                    .push_bind(log.rating)
                    .push_bind(&log.transcript)
                    .push_bind(&log.tags);
            });
            builder.push(
                " ON CONFLICT (chat_id) DO UPDATE SET \
                 agent_name = EXCLUDED.agent_name, visitor_name = EXCLUDED.visitor_name, \
                 department = EXCLUDED.department, start_time = EXCLUDED.start_time, \
                 end_time = EXCLUDED.end_time, duration_seconds = EXCLUDED.duration_seconds, \
                 wait_time_seconds = EXCLUDED.wait_time_seconds, rating = EXCLUDED.rating, \
                 transcript = EXCLUDED.transcript, tags = EXCLUDED.tags",
            );
            builder.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(logs.len())
    }
}

fn stored_from_row(row: &PgRow) -> StoreResult<StoredRecord> {
    let mut record = AgentRecord::new(
        row.try_get::<String, _>("agent_name")?,
        row.try_get("report_date")?,
    );
    record.chats = count_column(row, "chats_count")?;
    record.avg_chat_seconds = seconds_from(row, "avg_chat_seconds")?;
    record.total_chat_seconds = seconds_from(row, "total_chat_seconds")?;
    record.last_message_sent_count = count_column(row, "last_message_sent")?;
    record.avg_score = row.try_get("avg_score")?;
    record.rating_times = count_column(row, "rating_times")?;
    for (slot, column) in record
        .score_counts
        .iter_mut()
        .zip(["score_1", "score_2", "score_3", "score_4", "score_5"])
    {
        *slot = count_column(row, column)?;
    }

    Ok(StoredRecord {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        record,
    })
}

fn count_column(row: &PgRow, column: &'static str) -> StoreResult<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value).map_err(|_| StoreError::OutOfRange { column, value })
}

fn seconds_from(row: &PgRow, column: &'static str) -> StoreResult<u64> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value).map_err(|_| StoreError::OutOfRange { column, value })
}

fn seconds_column(seconds: u64) -> i64 {
    i64::try_from(seconds).unwrap_or(i64::MAX)
}

fn rows_per_statement(columns: usize) -> usize {
    MAX_BIND_PARAMS / columns
}
