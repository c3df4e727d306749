// ABOUTME: Streaming dump writer producing a replayable MySQL script
// ABOUTME: Writes schema and batched INSERTs table by table into a backpressured sink

use super::escape::{write_sql_literal, SqlValue};
use crate::error::{DumpError, TableAccessError};
use crate::utils::quote_identifier;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Rows per INSERT statement, and the most rows held in memory at once.
pub const DEFAULT_BATCH_SIZE: usize = 500;

const SESSION_PREAMBLE: &str = "\
/*!40101 SET @OLD_CHARACTER_SET_CLIENT=@@CHARACTER_SET_CLIENT */;
/*!40101 SET @OLD_CHARACTER_SET_RESULTS=@@CHARACTER_SET_RESULTS */;
/*!40101 SET @OLD_COLLATION_CONNECTION=@@COLLATION_CONNECTION */;
/*!50503 SET NAMES utf8mb4 */;
/*!40103 SET @OLD_TIME_ZONE=@@TIME_ZONE */;
/*!40103 SET TIME_ZONE='+00:00' */;
/*!40014 SET @OLD_UNIQUE_CHECKS=@@UNIQUE_CHECKS, UNIQUE_CHECKS=0 */;
/*!40014 SET @OLD_FOREIGN_KEY_CHECKS=@@FOREIGN_KEY_CHECKS, FOREIGN_KEY_CHECKS=0 */;
/*!40101 SET @OLD_SQL_MODE=@@SQL_MODE, SQL_MODE='NO_AUTO_VALUE_ON_ZERO' */;
";

const SESSION_TRAILER: &str = "
/*!40103 SET TIME_ZONE=@OLD_TIME_ZONE */;
/*!40101 SET SQL_MODE=@OLD_SQL_MODE */;
/*!40014 SET FOREIGN_KEY_CHECKS=@OLD_FOREIGN_KEY_CHECKS */;
/*!40014 SET UNIQUE_CHECKS=@OLD_UNIQUE_CHECKS */;
/*!40101 SET CHARACTER_SET_CLIENT=@OLD_CHARACTER_SET_CLIENT */;
/*!40101 SET CHARACTER_SET_RESULTS=@OLD_CHARACTER_SET_RESULTS */;
/*!40101 SET COLLATION_CONNECTION=@OLD_COLLATION_CONNECTION */;

-- Dump completed
";

/// Read access to table definitions. Shared by the dump writer and the
/// schema differ.
#[async_trait]
pub trait SchemaCatalog: Send {
    /// Base tables of the current database (views excluded)
    async fn list_tables(&mut self) -> Result<Vec<String>>;

    /// The engine's own `CREATE TABLE` text for `table`
    async fn create_table_statement(&mut self, table: &str) -> Result<String>;
}

/// One page of rows together with the column names they belong to.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

#[async_trait]
pub trait DumpSource: SchemaCatalog {
    /// At most `limit` rows of `table` starting at `offset`, in a stable order.
    async fn fetch_rows(&mut self, table: &str, offset: u64, limit: usize) -> Result<RowBatch>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub name: String,
    pub rows: u64,
    pub insert_statements: u64,
}

/// What a finished export contains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DumpSummary {
    pub tables: Vec<TableSummary>,
    /// Tables written only as an inline error comment
    pub failed_tables: Vec<TableAccessError>,
}

impl DumpSummary {
    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// Serializes a whole database into a MySQL script.
///
/// At most one batch of rows is held in memory. Every write awaits the sink,
/// so a slow consumer suspends the export until it drains.
#[derive(Debug, Clone)]
pub struct DumpWriter {
    batch_size: usize,
    database: Option<String>,
}

impl Default for DumpWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl DumpWriter {
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            database: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Name recorded in the dump header
    pub fn with_database_name(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Export every base table of `source` into `sink`.
    ///
    /// Tables are written in alphabetical order. A table whose structure or
    /// data cannot be read is replaced by an inline comment and the export
    /// continues with the next table.
    ///
    /// # Errors
    ///
    /// - [`DumpError::Catalog`] or [`DumpError::NoTables`] before any byte is written
    /// - [`DumpError::Io`] if the sink fails mid-stream
    pub async fn write<S, W>(&self, source: &mut S, sink: &mut W) -> Result<DumpSummary, DumpError>
    where
        S: DumpSource + ?Sized,
        W: AsyncWrite + Unpin,
    {
        let mut tables = source.list_tables().await.map_err(DumpError::Catalog)?;
        tables.sort();
        tables.dedup();

        if tables.is_empty() {
            return Err(DumpError::NoTables);
        }

        tracing::info!("Dumping {} table(s)", tables.len());
        sink.write_all(self.preamble().as_bytes()).await?;

        let mut summary = DumpSummary::default();
        for (idx, table) in tables.iter().enumerate() {
            tracing::info!("Dumping table {}/{}: '{}'", idx + 1, tables.len(), table);
            match self.write_table(source, sink, table).await? {
                Ok(table_summary) => {
                    tracing::debug!(
                        "✓ '{}': {} rows in {} INSERT statement(s)",
                        table,
                        table_summary.rows,
                        table_summary.insert_statements
                    );
                    summary.tables.push(table_summary);
                }
                Err(failure) => {
                    tracing::warn!("⚠ {}", failure);
                    summary.failed_tables.push(failure);
                }
            }
        }

        sink.write_all(SESSION_TRAILER.as_bytes()).await?;
        sink.flush().await?;

        tracing::info!(
            "✓ Dump complete: {} table(s), {} row(s), {} failed table(s)",
            summary.tables.len(),
            summary.total_rows(),
            summary.failed_tables.len()
        );
        Ok(summary)
    }

    fn preamble(&self) -> String {
        let mut header = String::from("-- MySQL dump generated by mysql-snapshot\n--\n");
        if let Some(database) = &self.database {
            header.push_str(&format!("-- Database: {}\n", single_line(database)));
        }
        header.push_str(&format!(
            "-- Generated at: {}\n-- ------------------------------------------------------\n\n",
            chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        ));
        header.push_str(SESSION_PREAMBLE);
        header
    }

    /// The outer result carries sink failures, the inner one per-table failures.
    async fn write_table<S, W>(
        &self,
        source: &mut S,
        sink: &mut W,
        table: &str,
    ) -> std::io::Result<Result<TableSummary, TableAccessError>>
    where
        S: DumpSource + ?Sized,
        W: AsyncWrite + Unpin,
    {
        let create = match source.create_table_statement(table).await {
            Ok(create) => create,
            Err(e) => {
                let failure = TableAccessError {
                    table: table.to_string(),
                    message: format!("failed to read structure: {:#}", e),
                };
                write_failure_comment(sink, &failure).await?;
                return Ok(Err(failure));
            }
        };

        let quoted = quote_identifier(table);
        let header = format!(
            "\n--\n-- Table structure for table {quoted}\n--\n\n\
             DROP TABLE IF EXISTS {quoted};\n\
             {create};\n\n\
             --\n-- Dumping data for table {quoted}\n--\n\n\
             LOCK TABLES {quoted} WRITE;\n\
             /*!40000 ALTER TABLE {quoted} DISABLE KEYS */;\n",
            create = create.trim().trim_end_matches(';'),
        );
        sink.write_all(header.as_bytes()).await?;

        let outcome = self.write_rows(source, sink, table, &quoted).await?;
        if let Err(failure) = &outcome {
            write_failure_comment(sink, failure).await?;
        }

        let footer = format!(
            "/*!40000 ALTER TABLE {quoted} ENABLE KEYS */;\nUNLOCK TABLES;\n"
        );
        sink.write_all(footer.as_bytes()).await?;

        Ok(outcome)
    }

    async fn write_rows<S, W>(
        &self,
        source: &mut S,
        sink: &mut W,
        table: &str,
        quoted: &str,
    ) -> std::io::Result<Result<TableSummary, TableAccessError>>
    where
        S: DumpSource + ?Sized,
        W: AsyncWrite + Unpin,
    {
        let mut summary = TableSummary {
            name: table.to_string(),
            ..Default::default()
        };
        let mut statement = String::new();

        loop {
            let batch = match source
                .fetch_rows(table, summary.rows, self.batch_size)
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    return Ok(Err(TableAccessError {
                        table: table.to_string(),
                        message: format!(
                            "failed to read rows after offset {}: {:#}",
                            summary.rows, e
                        ),
                    }));
                }
            };

            let count = batch.rows.len();
            if count == 0 {
                break;
            }

            statement.clear();
            render_insert(&mut statement, quoted, &batch);
            sink.write_all(statement.as_bytes()).await?;

            summary.rows += count as u64;
            summary.insert_statements += 1;
            tracing::debug!("'{}': wrote {} rows (total {})", table, count, summary.rows);

            if count < self.batch_size {
                break;
            }
        }

        Ok(Ok(summary))
    }
}

/// `INSERT INTO t (a,b) VALUES (...),(...);` followed by a newline.
fn render_insert(out: &mut String, quoted_table: &str, batch: &RowBatch) {
    out.push_str("INSERT INTO ");
    out.push_str(quoted_table);
    if !batch.columns.is_empty() {
        out.push_str(" (");
        for (idx, column) in batch.columns.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            out.push_str(&quote_identifier(column));
        }
        out.push(')');
    }
    out.push_str(" VALUES ");

    for (row_idx, row) in batch.rows.iter().enumerate() {
        if row_idx > 0 {
            out.push(',');
        }
        out.push('(');
        for (idx, value) in row.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            write_sql_literal(out, value);
        }
        out.push(')');
    }
    out.push_str(";\n");
}

async fn write_failure_comment<W: AsyncWrite + Unpin>(
    sink: &mut W,
    failure: &TableAccessError,
) -> std::io::Result<()> {
    let comment = format!(
        "-- Error dumping table {}: {}\n",
        quote_identifier(&failure.table),
        single_line(&failure.message)
    );
    sink.write_all(comment.as_bytes()).await
}

/// Keeps free text inside a `--` comment.
fn single_line(text: &str) -> String {
    text.chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}
