use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use futures::future::join_all;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chat_log::parse_chat_logs;
use crate::classify::{classify, classify_headers};
use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::merge::{merge, RowSource};
use crate::models::{Diagnostic, DiagnosticKind, Diagnostics, FileKind, ParsedFile};
use crate::parser::{parse_chat_log_table, parse_report, peek_headers};
use crate::store::ReportStore;

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
    pub replaced_invalid_bytes: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Report { kind: FileKind, date: NaiveDate },
    ChatLog { rows: usize },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileStatus {
    pub name: String,
    pub outcome: FileOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct UploadSummary {
    pub total_files: usize,
    pub succeeded_groups: usize,
    pub failed_groups: usize,
    pub chat_log_rows: usize,
    pub files: Vec<FileStatus>,
    /// Only populated in strict mode.
    pub diagnostics: Vec<Diagnostic>,
}

impl UploadSummary {
    pub fn loaded_anything(&self) -> bool {
        self.succeeded_groups > 0 || self.chat_log_rows > 0
    }
}

#[derive(Default)]
struct DateGroup {
    performance: Vec<ParsedFile>,
    rating: Vec<ParsedFile>,
}

impl DateGroup {
    /// A date with only one kind of export is read as a combined file.
    fn row_sources(&self) -> Vec<RowSource<'_>> {
        match (self.performance.is_empty(), self.rating.is_empty()) {
            (false, false) => self
                .performance
                .iter()
                .map(|file| RowSource::PerformanceOnly(&file.rows))
                .chain(self.rating.iter().map(|file| RowSource::RatingOnly(&file.rows)))
                .collect(),
            (false, true) => self
                .performance
                .iter()
                .map(|file| RowSource::Combined(&file.rows))
                .collect(),
            (true, false) => self
                .rating
                .iter()
                .map(|file| RowSource::Combined(&file.rows))
                .collect(),
            (true, true) => Vec::new(),
        }
    }
}

enum Prepared {
    ChatLog(ParsedFile),
    Report(FileKind, ParsedFile),
}

pub async fn ingest_paths(
    store: &dyn ReportStore,
    paths: &[PathBuf],
    config: &IngestConfig,
) -> UploadSummary {
    let reads = join_all(paths.iter().map(|path| read_source(path))).await;

    let mut sources = Vec::new();
    let mut unreadable = Vec::new();
    for (path, read) in paths.iter().zip(reads) {
        match read {
            Ok(source) => sources.push(source),
            Err(err) => {
                warn!(file = %path.display(), error = %err, "skipping unreadable file");
                unreadable.push(FileStatus {
                    name: path.display().to_string(),
                    outcome: FileOutcome::Skipped {
                        reason: err.to_string(),
                    },
                });
            }
        }
    }

    let mut summary = ingest_sources(store, sources, config).await;
    summary.total_files += unreadable.len();
    summary.files.extend(unreadable);
    summary
}

async fn read_source(path: &Path) -> Result<SourceFile, IngestError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| IngestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    // Legacy exports arrive in single-byte code pages; keep them readable.
    let (content, replaced_invalid_bytes) = match String::from_utf8(bytes) {
        Ok(content) => (content, false),
        Err(err) => (String::from_utf8_lossy(err.as_bytes()).into_owned(), true),
    };
    Ok(SourceFile {
        name: path.display().to_string(),
        content,
        replaced_invalid_bytes,
    })
}

/// Classifies each file, imports chat logs, then merges and writes reports
/// one date group at a time.
///
/// A group that fails to persist is counted and skipped; groups already
/// written stay written.
pub async fn ingest_sources(
    store: &dyn ReportStore,
    sources: Vec<SourceFile>,
    config: &IngestConfig,
) -> UploadSummary {
    let mut summary = UploadSummary {
        total_files: sources.len(),
        ..UploadSummary::default()
    };
    let mut diagnostics = Diagnostics::new(config.strict);
    let mut groups: BTreeMap<NaiveDate, DateGroup> = BTreeMap::new();

    for source in sources {
        if source.replaced_invalid_bytes {
            warn!(file = %source.name, "replaced bytes that are not valid UTF-8");
            diagnostics.push(Diagnostic {
                agent_name: String::new(),
                column: String::new(),
                value: source.name.clone(),
                kind: DiagnosticKind::InvalidEncoding,
            });
        }
        let outcome = match prepare(&source.content) {
            Err(err) => skipped(err.to_string()),
            Ok(Prepared::ChatLog(parsed)) => {
                let logs = parse_chat_logs(&parsed);
                match store.upsert_chat_logs(&logs).await {
                    Ok(rows) => {
                        summary.chat_log_rows += rows;
                        FileOutcome::ChatLog { rows }
                    }
                    Err(err) => skipped(format!("chat log import failed: {err}")),
                }
            }
            Ok(Prepared::Report(kind, parsed)) => match (kind, parsed.extracted_date) {
                (_, None) => skipped("no report date found".to_string()),
                (FileKind::Performance, Some(date)) => {
                    groups.entry(date).or_default().performance.push(parsed);
                    FileOutcome::Report { kind, date }
                }
                (FileKind::Rating, Some(date)) => {
                    groups.entry(date).or_default().rating.push(parsed);
                    FileOutcome::Report { kind, date }
                }
                (_, Some(_)) => skipped("unrecognized columns".to_string()),
            },
        };

        match &outcome {
            FileOutcome::Skipped { reason } => {
                warn!(file = %source.name, reason = %reason, "file not processed")
            }
            other => debug!(file = %source.name, outcome = ?other, "file classified"),
        }
        summary.files.push(FileStatus {
            name: source.name,
            outcome,
        });
    }

    for (date, group) in &groups {
        let records = merge(
            *date,
            &group.row_sources(),
            config.name_policy,
            &mut diagnostics,
        );
        if records.is_empty() {
            debug!(%date, "no agent rows in date group");
            continue;
        }

        let batch_id = Uuid::new_v4();
        match store.persist_records(batch_id, *date, &records).await {
            Ok(()) => {
                summary.succeeded_groups += 1;
                info!(%date, %batch_id, agents = records.len(), "stored report group");
            }
            Err(err) => {
                summary.failed_groups += 1;
                warn!(%date, error = %err, "failed to store report group");
            }
        }
    }

    if !diagnostics.is_empty() {
        warn!(count = diagnostics.entries().len(), "data quality findings in uploaded reports");
    }
    summary.diagnostics = diagnostics.entries().to_vec();
    summary
}

fn prepare(content: &str) -> Result<Prepared, IngestError> {
    // Transcript exports carry no metadata lines, so their header is line one.
    if classify_headers(&peek_headers(content)?) == FileKind::ChatLog {
        return Ok(Prepared::ChatLog(parse_chat_log_table(content)?));
    }
    let parsed = parse_report(content)?;
    Ok(Prepared::Report(classify(&parsed), parsed))
}

fn skipped(reason: String) -> FileOutcome {
    FileOutcome::Skipped { reason }
}
