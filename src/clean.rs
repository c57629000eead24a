use std::sync::LazyLock;

use regex::Regex;

use crate::models::{RawRow, AGENT_COLUMN};

static ANNOTATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\(.*?\)").expect("valid annotation pattern"));

pub fn clean_field(value: &str) -> String {
    ANNOTATION.replace_all(value, "").trim().to_string()
}

/// Blank agent names and the exporter's "Total"/"Average" footer rows never
/// describe a real agent.
pub fn is_summary_row(row: &RawRow) -> bool {
    let name = row.get(AGENT_COLUMN).unwrap_or("");
    name.trim().is_empty() || name.contains("Total") || name.contains("Average")
}
