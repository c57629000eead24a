use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::duration::format_seconds;

pub const AGENT_COLUMN: &str = "Agent";
pub const CHATS_COLUMN: &str = "Chats";
pub const AVG_CHAT_TIME_COLUMN: &str = "Avg. Chat Time";
pub const TOTAL_CHAT_TIME_COLUMN: &str = "Total Chat Time";
pub const LAST_MESSAGE_COLUMN: &str = "Last Message Sent by Agent";
pub const AVG_SCORE_COLUMN: &str = "Avg. Score";
pub const RATING_TIMES_COLUMN: &str = "Rating Times";
pub const SCORE_COLUMNS: [&str; 5] = ["Score 1", "Score 2", "Score 3", "Score 4", "Score 5"];

pub const CHAT_ID_COLUMN: &str = "ID";
pub const VISITOR_COLUMN: &str = "Name";
pub const DEPARTMENT_COLUMN: &str = "Department";
pub const START_TIME_COLUMN: &str = "Start Time";
pub const END_TIME_COLUMN: &str = "End Time";
pub const DURATION_COLUMN: &str = "Duration";
pub const WAITING_TIME_COLUMN: &str = "Waiting Time";
pub const RATING_COLUMN: &str = "Rating";
pub const CONTENT_COLUMN: &str = "Content";
pub const CATEGORY_COLUMN: &str = "Category";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: HashMap<String, String>,
}

impl RawRow {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            cells: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }

    /// A cell counts as present only when it holds non-empty text.
    pub fn present(&self, column: &str) -> Option<&str> {
        self.get(column).filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
    pub extracted_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Performance,
    Rating,
    ChatLog,
    Unknown,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FileKind::Performance => "performance",
            FileKind::Rating => "rating",
            FileKind::ChatLog => "chat log",
            FileKind::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// How agent display names are turned into identities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamePolicy {
    /// Names match byte for byte, so "Ayse" and "ayse " are two agents.
    #[default]
    Exact,
    /// Names are trimmed and lowercased once at ingestion.
    Normalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(name: &str, policy: NamePolicy) -> Self {
        match policy {
            NamePolicy::Exact => Self(name.to_string()),
            NamePolicy::Normalized => Self(name.trim().to_lowercase()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentRecord {
    pub agent_name: String,
    pub date: NaiveDate,
    pub chats: u32,
    pub avg_chat_seconds: u64,
    pub total_chat_seconds: u64,
    pub last_message_sent_count: u32,
    pub avg_score: f64,
    pub rating_times: u32,
    /// Star counts, index 0 holds one-star ratings.
    pub score_counts: [u32; 5],
}

impl AgentRecord {
    pub fn new(agent_name: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            agent_name: agent_name.into(),
            date,
            chats: 0,
            avg_chat_seconds: 0,
            total_chat_seconds: 0,
            last_message_sent_count: 0,
            avg_score: 0.0,
            rating_times: 0,
            score_counts: [0; 5],
        }
    }

    pub fn avg_chat_time(&self) -> String {
        format_seconds(self.avg_chat_seconds)
    }

    pub fn total_chat_time(&self) -> String {
        format_seconds(self.total_chat_seconds)
    }

    pub fn score_sum(&self) -> u64 {
        self.score_counts.iter().map(|&count| u64::from(count)).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: i64,
    pub batch_id: Uuid,
    pub record: AgentRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchInfo {
    pub batch_id: Uuid,
    pub date: NaiveDate,
    pub agents: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub batch_id: Option<Uuid>,
}

impl RecordFilter {
    pub fn matches(&self, stored: &StoredRecord) -> bool {
        let in_range = self
            .date_range
            .map_or(true, |(from, to)| stored.record.date >= from && stored.record.date <= to);
        let in_batch = self.batch_id.map_or(true, |id| stored.batch_id == id);
        in_range && in_batch
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatLogEntry {
    pub chat_id: String,
    pub agent_name: String,
    pub visitor_name: String,
    pub department: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
    pub wait_time_seconds: u64,
    pub rating: Option<i32>,
    pub transcript: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    UnparseableDuration,
    UnparseableNumber,
    ScoreCountMismatch { score_sum: u64, rating_times: u32 },
    /// The file was not valid UTF-8; `value` names the file.
    InvalidEncoding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub agent_name: String,
    pub column: String,
    pub value: String,
    pub kind: DiagnosticKind,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::UnparseableDuration => write!(
                f,
                "{}: unreadable duration '{}' in '{}'",
                self.agent_name, self.value, self.column
            ),
            DiagnosticKind::UnparseableNumber => write!(
                f,
                "{}: unreadable number '{}' in '{}'",
                self.agent_name, self.value, self.column
            ),
            DiagnosticKind::ScoreCountMismatch {
                score_sum,
                rating_times,
            } => write!(
                f,
                "{}: star counts add up to {} but {} ratings were reported",
                self.agent_name, score_sum, rating_times
            ),
            DiagnosticKind::InvalidEncoding => write!(
                f,
                "{}: bytes that are not valid UTF-8 were replaced",
                self.value
            ),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    enabled: bool,
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new(strict: bool) -> Self {
        Self {
            enabled: strict,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        if self.enabled {
            self.entries.push(diagnostic);
        }
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
