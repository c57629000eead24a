use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::error::IngestError;
use crate::models::{ParsedFile, RawRow};

static TIME_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Time Range:(\d{2})/(\d{2})/(\d{4})").expect("valid time range pattern")
});

/// Exported reports open with a title line and a `Time Range:` line
/// before the real header row.
const METADATA_LINES: usize = 2;

pub fn parse_report(content: &str) -> Result<ParsedFile, IngestError> {
    let content = strip_bom(content);
    let lines: Vec<&str> = content.split('\n').collect();
    let extracted_date = lines.get(1).and_then(|line| extract_report_date(line));
    let table = lines
        .get(METADATA_LINES..)
        .map(|rest| rest.join("\n"))
        .unwrap_or_default();

    let mut parsed = parse_table(&table)?;
    parsed.extracted_date = extracted_date;
    Ok(parsed)
}

/// Parses a table whose header is the very first line, as chat transcripts are exported.
pub fn parse_chat_log_table(content: &str) -> Result<ParsedFile, IngestError> {
    parse_table(strip_bom(content))
}

pub fn peek_headers(content: &str) -> Result<Vec<String>, IngestError> {
    let mut reader = table_reader(strip_bom(content).as_bytes());
    Ok(reader.headers()?.iter().map(str::to_string).collect())
}

/// Reads `Time Range:MM/DD/YYYY~...` and keeps the first date of the range.
pub fn extract_report_date(line: &str) -> Option<NaiveDate> {
    let caps = TIME_RANGE.captures(line)?;
    let month = caps[1].parse().ok()?;
    let day = caps[2].parse().ok()?;
    let year = caps[3].parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_table(table: &str) -> Result<ParsedFile, IngestError> {
    let mut reader = table_reader(table.as_bytes());
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(RawRow::from_pairs(
            headers.iter().map(String::as_str).zip(record.iter()),
        ));
    }

    Ok(ParsedFile {
        headers,
        rows,
        extracted_date: None,
    })
}

fn table_reader(bytes: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(bytes)
}

fn strip_bom(content: &str) -> &str {
    content.strip_prefix('\u{feff}').unwrap_or(content)
}
