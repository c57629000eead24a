use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::warn;

use crate::clean::{clean_field, is_summary_row};
use crate::duration::try_parse_duration;
use crate::models::{
    AgentId, AgentRecord, Diagnostic, DiagnosticKind, Diagnostics, NamePolicy, RawRow,
    AGENT_COLUMN, AVG_CHAT_TIME_COLUMN, AVG_SCORE_COLUMN, CHATS_COLUMN, LAST_MESSAGE_COLUMN,
    RATING_TIMES_COLUMN, SCORE_COLUMNS, TOTAL_CHAT_TIME_COLUMN,
};

#[derive(Debug, Clone, Copy)]
pub enum RowSource<'a> {
    PerformanceOnly(&'a [RawRow]),
    RatingOnly(&'a [RawRow]),
    /// One export carrying both column families, read once for each role.
    Combined(&'a [RawRow]),
}

impl<'a> RowSource<'a> {
    fn rows(&self) -> &'a [RawRow] {
        match self {
            RowSource::PerformanceOnly(rows)
            | RowSource::RatingOnly(rows)
            | RowSource::Combined(rows) => rows,
        }
    }

    fn performance(&self) -> bool {
        matches!(self, RowSource::PerformanceOnly(_) | RowSource::Combined(_))
    }

    fn rating(&self) -> bool {
        matches!(self, RowSource::RatingOnly(_) | RowSource::Combined(_))
    }
}

/// Merges row sets into one record per agent for `date`, busiest agents first.
///
/// Sources are applied in order. A field is only overwritten when its cell
/// holds text, so a later partial row leaves earlier values in place.
/// Agents seen on one side only keep zeroes for the other.
pub fn merge(
    date: NaiveDate,
    sources: &[RowSource<'_>],
    policy: NamePolicy,
    diagnostics: &mut Diagnostics,
) -> Vec<AgentRecord> {
    let mut order: Vec<AgentId> = Vec::new();
    let mut merged: HashMap<AgentId, AgentRecord> = HashMap::new();

    for source in sources {
        for row in source.rows() {
            if is_summary_row(row) {
                continue;
            }
            let name = row.get(AGENT_COLUMN).unwrap_or_default();
            let id = AgentId::new(name, policy);
            let record = merged.entry(id.clone()).or_insert_with(|| {
                order.push(id);
                let display = match policy {
                    NamePolicy::Exact => name,
                    NamePolicy::Normalized => name.trim(),
                };
                AgentRecord::new(display, date)
            });

            let agent = record.agent_name.clone();
            let mut fields = FieldReader {
                row,
                agent: &agent,
                diagnostics: &mut *diagnostics,
            };
            if source.performance() {
                apply_performance(record, &mut fields);
            }
            if source.rating() {
                apply_rating(record, &mut fields);
            }
        }
    }

    let mut records: Vec<AgentRecord> = order
        .into_iter()
        .filter_map(|id| merged.remove(&id))
        .collect();
    for record in &records {
        check_score_counts(record, diagnostics);
    }
    records.sort_by(|a, b| b.chats.cmp(&a.chats));
    records
}

fn apply_performance(record: &mut AgentRecord, fields: &mut FieldReader<'_>) {
    if let Some(chats) = fields.count(CHATS_COLUMN) {
        record.chats = chats;
    }
    if let Some(seconds) = fields.seconds(AVG_CHAT_TIME_COLUMN) {
        record.avg_chat_seconds = seconds;
    }
    if let Some(seconds) = fields.seconds(TOTAL_CHAT_TIME_COLUMN) {
        record.total_chat_seconds = seconds;
    }
    if let Some(count) = fields.count(LAST_MESSAGE_COLUMN) {
        record.last_message_sent_count = count;
    }
}

fn apply_rating(record: &mut AgentRecord, fields: &mut FieldReader<'_>) {
    if let Some(score) = fields.score(AVG_SCORE_COLUMN) {
        record.avg_score = score;
    }
    if let Some(times) = fields.count(RATING_TIMES_COLUMN) {
        record.rating_times = times;
    }
    for (slot, column) in record.score_counts.iter_mut().zip(SCORE_COLUMNS) {
        if let Some(count) = fields.count(column) {
            *slot = count;
        }
    }
}

fn check_score_counts(record: &AgentRecord, diagnostics: &mut Diagnostics) {
    let score_sum = record.score_sum();
    if score_sum == u64::from(record.rating_times) {
        return;
    }
    warn!(
        agent = %record.agent_name,
        date = %record.date,
        score_sum,
        rating_times = record.rating_times,
        "star counts do not add up to rating count"
    );
    diagnostics.push(Diagnostic {
        agent_name: record.agent_name.clone(),
        column: RATING_TIMES_COLUMN.to_string(),
        value: record.rating_times.to_string(),
        kind: DiagnosticKind::ScoreCountMismatch {
            score_sum,
            rating_times: record.rating_times,
        },
    });
}

/// Reads cleaned cells, falling back to zero and noting what it could not read.
struct FieldReader<'a> {
    row: &'a RawRow,
    agent: &'a str,
    diagnostics: &'a mut Diagnostics,
}

impl FieldReader<'_> {
    fn count(&mut self, column: &str) -> Option<u32> {
        let cleaned = clean_field(self.row.present(column)?);
        if cleaned.is_empty() {
            return Some(0);
        }
        let value = cleaned.parse::<u32>().ok().or_else(|| {
            cleaned
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0 && *v <= f64::from(u32::MAX))
                .map(|v| v.trunc() as u32)
        });
        Some(value.unwrap_or_else(|| {
            self.note(column, &cleaned, DiagnosticKind::UnparseableNumber);
            0
        }))
    }

    fn score(&mut self, column: &str) -> Option<f64> {
        let cleaned = clean_field(self.row.present(column)?);
        if cleaned.is_empty() {
            return Some(0.0);
        }
        match cleaned.parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                self.note(column, &cleaned, DiagnosticKind::UnparseableNumber);
                Some(0.0)
            }
        }
    }

    fn seconds(&mut self, column: &str) -> Option<u64> {
        let cleaned = clean_field(self.row.present(column)?);
        Some(try_parse_duration(&cleaned).unwrap_or_else(|| {
            self.note(column, &cleaned, DiagnosticKind::UnparseableDuration);
            0
        }))
    }

    fn note(&mut self, column: &str, value: &str, kind: DiagnosticKind) {
        self.diagnostics.push(Diagnostic {
            agent_name: self.agent.to_string(),
            column: column.to_string(),
            value: value.to_string(),
            kind,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 4).unwrap()
    }

    fn performance_rows() -> Vec<RawRow> {
        vec![
            RawRow::from_pairs([
                ("Agent", "Deniz"),
                ("Chats", "12"),
                ("Avg. Chat Time", "00:04:10 (Avg.)"),
                ("Total Chat Time", "00:50:00"),
                ("Last Message Sent by Agent", "9"),
            ]),
            RawRow::from_pairs([("Agent", "Ece"), ("Chats", "30"), ("Avg. Chat Time", "02:00")]),
            RawRow::from_pairs([("Agent", "Total"), ("Chats", "42")]),
            RawRow::from_pairs([("Agent", "  "), ("Chats", "1")]),
        ]
    }

    fn rating_rows() -> Vec<RawRow> {
        vec![
            RawRow::from_pairs([
                ("Agent", "Deniz"),
                ("Avg. Score", "4.50"),
                ("Rating Times", "4"),
                ("Score 5", "2"),
                ("Score 4", "2"),
                ("Score 3", "0"),
                ("Score 2", "0"),
                ("Score 1", "0"),
            ]),
            RawRow::from_pairs([("Agent", "Average"), ("Avg. Score", "4.1")]),
            RawRow::from_pairs([
                ("Agent", "Mert"),
                ("Avg. Score", "5"),
                ("Rating Times", "1"),
                ("Score 5", "1"),
            ]),
        ]
    }

    fn find<'a>(records: &'a [AgentRecord], name: &str) -> &'a AgentRecord {
        records.iter().find(|r| r.agent_name == name).unwrap()
    }

    #[test]
    fn merges_performance_and_rating_by_agent() {
        let perf = performance_rows();
        let rating = rating_rows();
        let mut diagnostics = Diagnostics::new(true);
        let records = merge(
            date(),
            &[RowSource::PerformanceOnly(&perf), RowSource::RatingOnly(&rating)],
            NamePolicy::Exact,
            &mut diagnostics,
        );

        assert_eq!(records.len(), 3);
        let deniz = find(&records, "Deniz");
        assert_eq!(deniz.chats, 12);
        assert_eq!(deniz.avg_chat_seconds, 250);
        assert_eq!(deniz.total_chat_seconds, 3_000);
        assert_eq!(deniz.last_message_sent_count, 9);
        assert!((deniz.avg_score - 4.5).abs() < 1e-9);
        assert_eq!(deniz.rating_times, 4);
        assert_eq!(deniz.score_counts, [0, 0, 0, 2, 2]);
        assert_eq!(deniz.date, date());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn summary_rows_never_reach_output() {
        let perf = performance_rows();
        let rating = rating_rows();
        let records = merge(
            date(),
            &[RowSource::PerformanceOnly(&perf), RowSource::RatingOnly(&rating)],
            NamePolicy::Exact,
            &mut Diagnostics::default(),
        );
        assert!(records.iter().all(|r| {
            !r.agent_name.trim().is_empty() && r.agent_name != "Total" && r.agent_name != "Average"
        }));
    }

    #[test]
    fn one_sided_agents_keep_defaults() {
        let perf = performance_rows();
        let rating = rating_rows();
        let records = merge(
            date(),
            &[RowSource::PerformanceOnly(&perf), RowSource::RatingOnly(&rating)],
            NamePolicy::Exact,
            &mut Diagnostics::default(),
        );
        let ece = find(&records, "Ece");
        assert_eq!(ece.rating_times, 0);
        assert_eq!(ece.avg_score, 0.0);
        let mert = find(&records, "Mert");
        assert_eq!(mert.chats, 0);
        assert_eq!(mert.rating_times, 1);
    }

    #[test]
    fn orders_by_descending_chats() {
        let perf = performance_rows();
        let records = merge(
            date(),
            &[RowSource::PerformanceOnly(&perf)],
            NamePolicy::Exact,
            &mut Diagnostics::default(),
        );
        let names: Vec<&str> = records.iter().map(|r| r.agent_name.as_str()).collect();
        assert_eq!(names, vec!["Ece", "Deniz"]);
    }

    #[test]
    fn combined_source_matches_two_passes() {
        let mut rows = performance_rows();
        rows.extend(rating_rows());
        let copy = rows.clone();

        let combined = merge(
            date(),
            &[RowSource::Combined(&rows)],
            NamePolicy::Exact,
            &mut Diagnostics::default(),
        );
        let two_pass = merge(
            date(),
            &[RowSource::PerformanceOnly(&rows), RowSource::RatingOnly(&copy)],
            NamePolicy::Exact,
            &mut Diagnostics::default(),
        );
        for record in &combined {
            assert_eq!(record, find(&two_pass, &record.agent_name));
        }
        assert_eq!(combined.len(), two_pass.len());
    }

    #[test]
    fn performance_source_ignores_rating_columns() {
        let rows = vec![RawRow::from_pairs([
            ("Agent", "Deniz"),
            ("Chats", "3"),
            ("Avg. Score", "4.0"),
        ])];
        let records = merge(
            date(),
            &[RowSource::PerformanceOnly(&rows)],
            NamePolicy::Exact,
            &mut Diagnostics::default(),
        );
        assert_eq!(records[0].chats, 3);
        assert_eq!(records[0].avg_score, 0.0);
    }

    #[test]
    fn empty_cells_leave_prior_values() {
        let first = vec![RawRow::from_pairs([
            ("Agent", "Deniz"),
            ("Chats", "7"),
            ("Avg. Chat Time", "03:00"),
        ])];
        let second = vec![RawRow::from_pairs([
            ("Agent", "Deniz"),
            ("Chats", ""),
            ("Total Chat Time", "21:00"),
        ])];
        let records = merge(
            date(),
            &[RowSource::PerformanceOnly(&first), RowSource::PerformanceOnly(&second)],
            NamePolicy::Exact,
            &mut Diagnostics::default(),
        );
        assert_eq!(records[0].chats, 7);
        assert_eq!(records[0].avg_chat_seconds, 180);
        assert_eq!(records[0].total_chat_seconds, 1_260);
    }

    #[test]
    fn name_policy_controls_identity() {
        let rows = vec![
            RawRow::from_pairs([("Agent", "Deniz"), ("Chats", "3")]),
            RawRow::from_pairs([("Agent", " deniz "), ("Rating Times", "2")]),
        ];
        let exact = merge(
            date(),
            &[RowSource::Combined(&rows)],
            NamePolicy::Exact,
            &mut Diagnostics::default(),
        );
        assert_eq!(exact.len(), 2);

        let normalized = merge(
            date(),
            &[RowSource::Combined(&rows)],
            NamePolicy::Normalized,
            &mut Diagnostics::default(),
        );
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].agent_name, "Deniz");
        assert_eq!(normalized[0].chats, 3);
        assert_eq!(normalized[0].rating_times, 2);
    }

    #[test]
    fn strict_mode_collects_unreadable_cells() {
        let rows = vec![RawRow::from_pairs([
            ("Agent", "Deniz"),
            ("Chats", "lots"),
            ("Avg. Chat Time", "soon"),
            ("Avg. Score", "4.2"),
            ("Rating Times", "3"),
            ("Score 5", "1"),
        ])];
        let mut diagnostics = Diagnostics::new(true);
        let records = merge(
            date(),
            &[RowSource::Combined(&rows)],
            NamePolicy::Exact,
            &mut diagnostics,
        );

        assert_eq!(records[0].chats, 0);
        assert_eq!(records[0].avg_chat_seconds, 0);
        let kinds: Vec<&DiagnosticKind> = diagnostics.entries().iter().map(|d| &d.kind).collect();
        assert!(kinds.contains(&&DiagnosticKind::UnparseableNumber));
        assert!(kinds.contains(&&DiagnosticKind::UnparseableDuration));
        assert!(kinds.contains(&&DiagnosticKind::ScoreCountMismatch {
            score_sum: 1,
            rating_times: 3
        }));
    }

    #[test]
    fn decimal_counts_are_truncated() {
        let rows = vec![RawRow::from_pairs([("Agent", "Deniz"), ("Chats", "12.0 (Total)")])];
        let records = merge(
            date(),
            &[RowSource::PerformanceOnly(&rows)],
            NamePolicy::Exact,
            &mut Diagnostics::default(),
        );
        assert_eq!(records[0].chats, 12);
    }
}
