use chrono::{DateTime, NaiveDateTime, Utc};

use crate::clean::clean_field;
use crate::duration::parse_duration;
use crate::models::{
    ChatLogEntry, ParsedFile, RawRow, AGENT_COLUMN, CATEGORY_COLUMN, CHAT_ID_COLUMN,
    CONTENT_COLUMN, DEPARTMENT_COLUMN, DURATION_COLUMN, END_TIME_COLUMN, RATING_COLUMN,
    START_TIME_COLUMN, VISITOR_COLUMN, WAITING_TIME_COLUMN,
};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Maps transcript rows to entries; rows without a chat id are dropped.
pub fn parse_chat_logs(parsed: &ParsedFile) -> Vec<ChatLogEntry> {
    parsed.rows.iter().filter_map(entry_from_row).collect()
}

fn entry_from_row(row: &RawRow) -> Option<ChatLogEntry> {
    let chat_id = row.present(CHAT_ID_COLUMN)?.trim();
    if chat_id.is_empty() {
        return None;
    }
    let text = |column: &str| row.get(column).unwrap_or_default().to_string();

    Some(ChatLogEntry {
        chat_id: chat_id.to_string(),
        agent_name: text(AGENT_COLUMN),
        visitor_name: text(VISITOR_COLUMN),
        department: text(DEPARTMENT_COLUMN),
        start_time: row.present(START_TIME_COLUMN).and_then(parse_timestamp),
        end_time: row.present(END_TIME_COLUMN).and_then(parse_timestamp),
        duration_seconds: parse_duration(row.get(DURATION_COLUMN).unwrap_or_default()),
        wait_time_seconds: parse_duration(row.get(WAITING_TIME_COLUMN).unwrap_or_default()),
        rating: row
            .present(RATING_COLUMN)
            .and_then(|value| clean_field(value).parse::<i32>().ok())
            .filter(|rating| *rating != 0),
        transcript: text(CONTENT_COLUMN),
        tags: row
            .present(CATEGORY_COLUMN)
            .map(|category| vec![category.to_string()])
            .unwrap_or_default(),
    })
}

/// Accepts RFC 3339 or a handful of naive layouts, read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
