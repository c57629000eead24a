use crate::models::{
    FileKind, ParsedFile, AVG_SCORE_COLUMN, CHATS_COLUMN, CONTENT_COLUMN, START_TIME_COLUMN,
    WAITING_TIME_COLUMN,
};

pub fn classify(parsed: &ParsedFile) -> FileKind {
    classify_headers(&parsed.headers)
}

/// Checks run in a fixed order: chat log, performance, rating. A header
/// carrying both a chat count and an average score is a performance file.
pub fn classify_headers<S: AsRef<str>>(headers: &[S]) -> FileKind {
    let has = |column: &str| headers.iter().any(|header| header.as_ref() == column);

    if has(START_TIME_COLUMN) && has(WAITING_TIME_COLUMN) && has(CONTENT_COLUMN) {
        FileKind::ChatLog
    } else if has(CHATS_COLUMN) {
        FileKind::Performance
    } else if has(AVG_SCORE_COLUMN) {
        FileKind::Rating
    } else {
        FileKind::Unknown
    }
}
