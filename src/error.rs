// ABOUTME: Error taxonomy for export, restore and verification
// ABOUTME: Fatal errors are enums; per-table and per-statement failures are values

use crate::backup::ExecutionReport;
use serde::Serialize;
use thiserror::Error;

/// Fatal export errors. All of them are raised before the dump is usable.
#[derive(Error, Debug)]
pub enum DumpError {
    /// The database has no base tables; an empty dump is never reported as a success.
    #[error("No tables found in the source database")]
    NoTables,
    /// Enumerating tables failed before anything was streamed.
    #[error("Failed to list tables: {0}")]
    Catalog(#[source] anyhow::Error),
    /// The sink rejected a write. Streaming cannot continue.
    #[error("Failed to write dump output: {0}")]
    Io(#[from] std::io::Error),
}

/// A table whose structure or data could not be read during export.
///
/// Not fatal: it is written into the dump as an inline comment and the
/// export moves on to the next table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableAccessError {
    pub table: String,
    pub message: String,
}

impl std::fmt::Display for TableAccessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "table `{}`: {}", self.table, self.message)
    }
}

/// Statement splitting cannot proceed.
#[derive(Error, Debug)]
pub enum TokenizeError {
    #[error("Failed to read SQL input: {0}")]
    Io(#[from] std::io::Error),
    #[error("Statement {index} is not valid UTF-8")]
    InvalidUtf8 { index: usize },
}

/// An error reported by the server (or the driver) for one statement.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StatementError {
    /// MySQL error number, when the failure came from the server.
    pub number: Option<u16>,
    pub message: String,
}

impl StatementError {
    pub fn new(number: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            number,
            message: message.into(),
        }
    }
}

/// Fatal restore errors. Statement failures are never raised this way;
/// they are classified into the execution report instead.
#[derive(Error, Debug)]
pub enum RestoreError {
    /// The input broke off mid-restore. `report` covers the statements that
    /// already ran; the session is reverted either way.
    #[error("{source}")]
    Tokenize {
        #[source]
        source: TokenizeError,
        report: ExecutionReport,
    },
    /// The session could not be prepared for the restore.
    #[error("Failed to configure restore session: {0}")]
    Session(#[source] StatementError),
}

impl RestoreError {
    /// Statements that ran before the failure, if any did.
    pub fn partial_report(&self) -> Option<&ExecutionReport> {
        match self {
            RestoreError::Tokenize { report, .. } => Some(report),
            RestoreError::Session(_) => None,
        }
    }
}

/// Rejected restore uploads.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Input does not look like a SQL dump (no CREATE TABLE or INSERT INTO in the first {limit} bytes)")]
    NotADump { limit: usize },
    #[error("Input is {size} bytes, larger than the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
    #[error("Failed to read upload: {0}")]
    Io(#[from] std::io::Error),
}
