use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed table: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("column '{column}' holds out-of-range value {value}")]
    OutOfRange { column: &'static str, value: i64 },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_names_the_column() {
        let err = StoreError::OutOfRange {
            column: "chats_count",
            value: -3,
        };
        assert_eq!(
            err.to_string(),
            "column 'chats_count' holds out-of-range value -3"
        );
    }

    #[test]
    fn read_error_names_the_path() {
        let err = IngestError::Read {
            path: PathBuf::from("reports/11-04.csv"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        };
        assert!(err.to_string().contains("reports/11-04.csv"));
    }
}
