use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TaxonomyError {
    /// A structural rule of the hierarchy was broken.
    #[error("taxon integrity error: {0}")]
    TaxonIntegrity(String),

    #[error("unknown rank: {0}")]
    UnknownRank(String),

    #[error("tax_id not found: {0}")]
    TaxonNotFound(String),

    #[error("dump member {0} contains no records")]
    EmptyDump(String),

    #[error("malformed dump record: {0}")]
    MalformedRecord(String),

    #[error("tax_id {tax_id} has {count} primary scientific names (expected exactly one)")]
    PrimaryNameCount { tax_id: String, count: usize },

    #[error("database error: {0}")]
    Database(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid unclassified pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("taxdump download failed: {0}")]
    Download(String),

    #[error("taxdump server returned status {status}: {message}")]
    DownloadStatus { status: u16, message: String },
}

pub(crate) fn sql(err: rusqlite::Error) -> TaxonomyError {
    TaxonomyError::Database(err.to_string())
}
