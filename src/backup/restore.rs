// ABOUTME: Sequential replay of dump statements against a single connection
// ABOUTME: Classifies statement failures, scopes session settings and sniffs uploads

use super::tokenizer::{DumpStatement, StatementStream};
use crate::error::{RestoreError, StatementError, TokenizeError, UploadError};
use crate::utils::statement_preview;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes inspected when deciding whether an upload is a SQL dump.
pub const SNIFF_LIMIT: usize = 1024 * 1024;

/// Characters of statement text kept in error reports.
pub const DEFAULT_PREVIEW_CHARS: usize = 120;

/// SQL mode used while replaying: keeps explicit zero ids in AUTO_INCREMENT
/// columns and drops every strictness flag.
pub const PERMISSIVE_SQL_MODE: &str = "NO_AUTO_VALUE_ON_ZERO";

/// Session settings a restore changes. The executor captures the current
/// values, applies its own, and puts the captured values back afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub foreign_key_checks: bool,
    pub sql_mode: String,
}

impl SessionConfig {
    /// Foreign-key checks off, permissive SQL mode.
    pub fn restore_profile(sql_mode: impl Into<String>) -> Self {
        Self {
            foreign_key_checks: false,
            sql_mode: sql_mode.into(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::restore_profile(PERMISSIVE_SQL_MODE)
    }
}

/// The connection a dump is replayed into.
#[async_trait]
pub trait RestoreTarget: Send {
    async fn session_config(&mut self) -> Result<SessionConfig, StatementError>;

    async fn apply_session_config(&mut self, config: &SessionConfig) -> Result<(), StatementError>;

    /// Execute one statement, returning affected rows.
    async fn execute(&mut self, sql: &str) -> Result<u64, StatementError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    /// The object or row already exists. Skipped, not reported.
    Expected,
    /// Recorded; the restore continues.
    NonCritical,
    /// Recorded; no further statements run.
    Critical,
}

const EXPECTED_ERRORS: [u16; 8] = [1007, 1022, 1050, 1061, 1062, 1304, 1359, 1826];
const CRITICAL_ERRORS: [u16; 2] = [1064, 1149];

/// Decide how a failed statement affects the rest of the restore.
///
/// The server error number decides when present; otherwise the message text
/// is inspected, which also covers aborted connections.
pub fn classify(error: &StatementError) -> Severity {
    if let Some(number) = error.number {
        if EXPECTED_ERRORS.contains(&number) {
            return Severity::Expected;
        }
        if CRITICAL_ERRORS.contains(&number) {
            return Severity::Critical;
        }
        return Severity::NonCritical;
    }

    let message = error.message.to_ascii_lowercase();
    if message.contains("already exists") || message.contains("duplicate entry") {
        Severity::Expected
    } else if message.contains("error in your sql syntax") {
        Severity::Critical
    } else {
        Severity::NonCritical
    }
}

/// Symbolic MySQL error name for reports.
pub fn error_code(error: &StatementError) -> String {
    let Some(number) = error.number else {
        return "UNKNOWN".to_string();
    };
    let name = match number {
        1007 => "ER_DB_CREATE_EXISTS",
        1022 => "ER_DUP_KEY",
        1044 => "ER_DBACCESS_DENIED_ERROR",
        1050 => "ER_TABLE_EXISTS_ERROR",
        1054 => "ER_BAD_FIELD_ERROR",
        1061 => "ER_DUP_KEYNAME",
        1062 => "ER_DUP_ENTRY",
        1064 => "ER_PARSE_ERROR",
        1142 => "ER_TABLEACCESS_DENIED_ERROR",
        1146 => "ER_NO_SUCH_TABLE",
        1149 => "ER_SYNTAX_ERROR",
        1205 => "ER_LOCK_WAIT_TIMEOUT",
        1213 => "ER_LOCK_DEADLOCK",
        1215 => "ER_CANNOT_ADD_FOREIGN",
        1304 => "ER_SP_ALREADY_EXISTS",
        1359 => "ER_TRG_ALREADY_EXISTS",
        1366 => "ER_TRUNCATED_WRONG_VALUE_FOR_FIELD",
        1406 => "ER_DATA_TOO_LONG",
        1451 => "ER_ROW_IS_REFERENCED_2",
        1452 => "ER_NO_REFERENCED_ROW_2",
        1826 => "ER_FK_DUP_NAME",
        2013 => "CR_SERVER_LOST",
        other => return format!("ER_{}", other),
    };
    name.to_string()
}

/// A recorded (non-Expected) statement failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatementFailure {
    pub index: usize,
    pub preview: String,
    pub error_code: String,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStatus {
    Success,
    SucceededWithWarnings,
    Failed,
}

/// Result of one restore call. Errors are kept in statement order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub executed_count: u64,
    /// Expected failures (already exists / duplicate), not listed in `errors`
    pub skipped_count: u64,
    pub errors: Vec<StatementFailure>,
}

impl ExecutionReport {
    pub fn critical_errors(&self) -> impl Iterator<Item = &StatementFailure> {
        self.errors
            .iter()
            .filter(|e| e.severity == Severity::Critical)
    }

    pub fn status(&self) -> RestoreStatus {
        if self.critical_errors().next().is_some() {
            RestoreStatus::Failed
        } else if !self.errors.is_empty() {
            RestoreStatus::SucceededWithWarnings
        } else {
            RestoreStatus::Success
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub report: ExecutionReport,
    /// The session settings found before the restore and put back after it
    pub session: SessionConfig,
    /// False when putting the settings back failed (e.g. the connection died)
    pub session_restored: bool,
}

/// Replays statements strictly in order on one connection.
///
/// DDL that ran before a Critical failure stays applied: MySQL commits DDL
/// implicitly, so nothing here can roll it back. Restores into the same
/// database must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct RestoreExecutor {
    profile: SessionConfig,
    preview_chars: usize,
}

impl Default for RestoreExecutor {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl RestoreExecutor {
    pub fn new(profile: SessionConfig) -> Self {
        Self {
            profile,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }

    pub fn with_preview_chars(mut self, preview_chars: usize) -> Self {
        self.preview_chars = preview_chars;
        self
    }

    pub async fn run<R, T>(
        &self,
        statements: &mut StatementStream<R>,
        target: &mut T,
    ) -> Result<RestoreOutcome, RestoreError>
    where
        R: AsyncRead + Unpin,
        T: RestoreTarget + ?Sized,
    {
        self.run_with_progress(statements, target, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_statement` after each statement.
    ///
    /// # Errors
    ///
    /// - [`RestoreError::Session`] if the session cannot be prepared; nothing was executed
    /// - [`RestoreError::Tokenize`] if the input cannot be split; the session is still
    ///   reverted and the error carries the report of the statements already run
    pub async fn run_with_progress<R, T, F>(
        &self,
        statements: &mut StatementStream<R>,
        target: &mut T,
        mut on_statement: F,
    ) -> Result<RestoreOutcome, RestoreError>
    where
        R: AsyncRead + Unpin,
        T: RestoreTarget + ?Sized,
        F: FnMut(&ExecutionReport),
    {
        let previous = target
            .session_config()
            .await
            .map_err(RestoreError::Session)?;

        if let Err(e) = target.apply_session_config(&self.profile).await {
            // One of the two settings may already be applied
            if let Err(revert) = target.apply_session_config(&previous).await {
                tracing::warn!("⚠ Failed to restore session settings: {}", revert);
            }
            return Err(RestoreError::Session(e));
        }
        tracing::debug!(
            "Session prepared (foreign_key_checks={}, sql_mode='{}')",
            self.profile.foreign_key_checks,
            self.profile.sql_mode
        );

        let replayed = self.replay(statements, target, &mut on_statement).await;

        let session_restored = match target.apply_session_config(&previous).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("⚠ Failed to restore session settings: {}", e);
                false
            }
        };

        let (report, interrupted) = replayed;
        if let Some(source) = interrupted {
            return Err(RestoreError::Tokenize { source, report });
        }
        Ok(RestoreOutcome {
            report,
            session: previous,
            session_restored,
        })
    }

    async fn replay<R, T, F>(
        &self,
        statements: &mut StatementStream<R>,
        target: &mut T,
        on_statement: &mut F,
    ) -> (ExecutionReport, Option<TokenizeError>)
    where
        R: AsyncRead + Unpin,
        T: RestoreTarget + ?Sized,
        F: FnMut(&ExecutionReport),
    {
        let mut report = ExecutionReport::default();

        loop {
            let statement = match statements.next_statement().await {
                Ok(Some(statement)) => statement,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!(
                        "✗ Input unreadable after {} statement(s): {}",
                        report.executed_count,
                        e
                    );
                    return (report, Some(e));
                }
            };
            let critical = match target.execute(&statement.text).await {
                Ok(_) => {
                    report.executed_count += 1;
                    false
                }
                Err(error) => self.record_failure(&mut report, &statement, &error),
            };
            on_statement(&report);

            if critical {
                tracing::error!(
                    "✗ Critical error at statement {}; remaining statements skipped",
                    statement.source_index
                );
                break;
            }
        }

        (report, None)
    }

    /// Returns true when the restore must stop.
    fn record_failure(
        &self,
        report: &mut ExecutionReport,
        statement: &DumpStatement,
        error: &StatementError,
    ) -> bool {
        let severity = classify(error);
        if severity == Severity::Expected {
            tracing::debug!(
                "Statement {} skipped (already present): {}",
                statement.source_index,
                error
            );
            report.skipped_count += 1;
            return false;
        }

        let failure = StatementFailure {
            index: statement.source_index,
            preview: statement_preview(&statement.text, self.preview_chars),
            error_code: error_code(error),
            message: error.message.clone(),
            severity,
        };
        tracing::warn!(
            "⚠ Statement {} failed ({}): {}",
            failure.index,
            failure.error_code,
            failure.message
        );
        report.errors.push(failure);
        severity == Severity::Critical
    }
}

/// One entry of the `errors` array in a restore response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreErrorEntry {
    pub statement_index: usize,
    pub error: String,
    pub error_code: String,
    pub preview: String,
}

/// JSON body returned to whoever requested the restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreResponse {
    pub executed: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RestoreErrorEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RestoreResponse {
    pub fn from_report(report: &ExecutionReport) -> Self {
        let errors = report
            .errors
            .iter()
            .map(|failure| RestoreErrorEntry {
                statement_index: failure.index,
                error: failure.message.clone(),
                error_code: failure.error_code.clone(),
                preview: failure.preview.clone(),
            })
            .collect();

        let (message, error) = match report.status() {
            RestoreStatus::Success => (
                Some(format!(
                    "Restore completed: {} statements executed",
                    report.executed_count
                )),
                None,
            ),
            RestoreStatus::SucceededWithWarnings => (
                Some(format!(
                    "Restore completed with {} warning(s): {} statements executed",
                    report.errors.len(),
                    report.executed_count
                )),
                None,
            ),
            RestoreStatus::Failed => (
                None,
                Some(format!(
                    "Restore failed after {} statements; schema changes already applied were not rolled back",
                    report.executed_count
                )),
            ),
        };

        Self {
            executed: report.executed_count,
            errors,
            message,
            error,
        }
    }

    /// Response for a restore that could not start.
    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self {
            executed: 0,
            errors: Vec::new(),
            message: None,
            error: Some(error.to_string()),
        }
    }

    /// Response for a restore that stopped after running part of its input.
    pub fn interrupted(report: &ExecutionReport, error: impl std::fmt::Display) -> Self {
        Self {
            message: None,
            error: Some(error.to_string()),
            ..Self::from_report(report)
        }
    }
}

/// True when `prefix` contains `CREATE TABLE` or `INSERT INTO`.
pub fn looks_like_dump(prefix: &[u8]) -> bool {
    const MARKERS: [&[u8]; 2] = [b"CREATE TABLE", b"INSERT INTO"];
    MARKERS
        .iter()
        .any(|marker| prefix.windows(marker.len()).any(|window| window == *marker))
}

/// Accept or reject an upload by inspecting its first `limit` bytes.
///
/// The inspected bytes are not lost: the returned reader yields the complete
/// input from its first byte.
pub async fn sniff_upload<R>(
    mut reader: R,
    limit: usize,
) -> Result<impl AsyncRead + Unpin, UploadError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = Vec::with_capacity(limit.min(64 * 1024));
    (&mut reader)
        .take(limit as u64)
        .read_to_end(&mut prefix)
        .await?;

    if !looks_like_dump(&prefix) {
        return Err(UploadError::NotADump { limit });
    }
    Ok(Cursor::new(prefix).chain(reader))
}
