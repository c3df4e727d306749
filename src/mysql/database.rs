// ABOUTME: sqlx-backed catalog, row source and restore target for one MySQL database
// ABOUTME: Decodes column values by information_schema type and maps server errors to StatementError

use crate::backup::{
    to_sql_literal, DumpSource, RestoreTarget, RowBatch, SchemaCatalog, SessionConfig, SqlValue,
};
use crate::error::StatementError;
use crate::utils::quote_identifier;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::mysql::{MySqlDatabaseError, MySqlRow};
use sqlx::{MySqlConnection, Row};
use std::collections::HashMap;

/// How a column is selected and decoded when reading rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Signed,
    Unsigned,
    Float,
    Double,
    /// Exact numerics, fetched as text
    Decimal,
    Date,
    DateTime,
    /// Character data plus TIME, YEAR, ENUM, SET and JSON, fetched as text
    Text,
    /// BIT, fetched as an unsigned integer
    Bit,
    Binary,
}

impl ColumnKind {
    /// Pick a kind from `information_schema.COLUMNS` DATA_TYPE and COLUMN_TYPE.
    pub fn from_types(data_type: &str, column_type: &str) -> Self {
        let unsigned = column_type.to_ascii_lowercase().contains("unsigned");
        match data_type.to_ascii_lowercase().as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" => {
                if unsigned {
                    ColumnKind::Unsigned
                } else {
                    ColumnKind::Signed
                }
            }
            "float" => ColumnKind::Float,
            "double" | "real" => ColumnKind::Double,
            "decimal" | "numeric" => ColumnKind::Decimal,
            "date" => ColumnKind::Date,
            "datetime" | "timestamp" => ColumnKind::DateTime,
            "bit" => ColumnKind::Bit,
            "binary" | "varbinary" | "tinyblob" | "blob" | "mediumblob" | "longblob"
            | "geometry" | "point" | "linestring" | "polygon" | "multipoint"
            | "multilinestring" | "multipolygon" | "geometrycollection" | "geomcollection"
            | "vector" => ColumnKind::Binary,
            _ => ColumnKind::Text,
        }
    }

    /// Expression placed in the SELECT list for column `quoted`.
    fn select_expr(self, quoted: &str) -> String {
        match self {
            ColumnKind::Signed => format!("CAST({} AS SIGNED)", quoted),
            ColumnKind::Unsigned | ColumnKind::Bit => format!("CAST({} AS UNSIGNED)", quoted),
            ColumnKind::Float | ColumnKind::Double | ColumnKind::Binary => quoted.to_string(),
            ColumnKind::Decimal | ColumnKind::Date | ColumnKind::DateTime | ColumnKind::Text => {
                format!("CAST({} AS CHAR)", quoted)
            }
        }
    }

    fn decode(self, row: &MySqlRow, index: usize) -> Result<SqlValue, sqlx::Error> {
        let value = match self {
            ColumnKind::Signed => row.try_get::<Option<i64>, _>(index)?.into(),
            ColumnKind::Unsigned | ColumnKind::Bit => row
                .try_get::<Option<u64>, _>(index)?
                .map_or(SqlValue::Null, SqlValue::UInt),
            ColumnKind::Float => row
                .try_get::<Option<f32>, _>(index)?
                .map_or(SqlValue::Null, SqlValue::Float),
            ColumnKind::Double => row
                .try_get::<Option<f64>, _>(index)?
                .map_or(SqlValue::Null, SqlValue::Double),
            ColumnKind::Decimal => row
                .try_get::<Option<String>, _>(index)?
                .map_or(SqlValue::Null, SqlValue::Decimal),
            ColumnKind::Date => row
                .try_get::<Option<String>, _>(index)?
                .map_or(SqlValue::Null, |text| parse_date(&text)),
            ColumnKind::DateTime => row
                .try_get::<Option<String>, _>(index)?
                .map_or(SqlValue::Null, |text| parse_datetime(&text)),
            ColumnKind::Text => row.try_get::<Option<String>, _>(index)?.into(),
            ColumnKind::Binary => row
                .try_get::<Option<Vec<u8>>, _>(index)?
                .map_or(SqlValue::Null, SqlValue::Bytes),
        };
        Ok(value)
    }
}

/// Zero dates such as `0000-00-00` do not parse and are kept as text.
fn parse_date(text: &str) -> SqlValue {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(SqlValue::Date)
        .unwrap_or_else(|_| SqlValue::Text(text.to_string()))
}

fn parse_datetime(text: &str) -> SqlValue {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .map(SqlValue::DateTime)
        .unwrap_or_else(|_| SqlValue::Text(text.to_string()))
}

#[derive(Debug, Clone)]
struct ColumnInfo {
    name: String,
    kind: ColumnKind,
}

/// Row-reading plan for one table.
#[derive(Debug, Clone)]
struct TablePlan {
    columns: Vec<ColumnInfo>,
    select: String,
}

/// Convert a driver error into the executor's error value.
pub fn statement_error(err: sqlx::Error) -> StatementError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let number = db_err
                .try_downcast_ref::<MySqlDatabaseError>()
                .map(MySqlDatabaseError::number);
            StatementError::new(number, db_err.message())
        }
        other => StatementError::new(None, other.to_string()),
    }
}

/// One MySQL database reached through a dedicated connection.
pub struct MySqlDatabase {
    conn: MySqlConnection,
    plans: HashMap<String, TablePlan>,
}

impl MySqlDatabase {
    pub fn new(conn: MySqlConnection) -> Self {
        Self {
            conn,
            plans: HashMap::new(),
        }
    }

    /// Name of the database selected by the connection URL
    pub async fn current_database(&mut self) -> Result<String> {
        let row = sqlx::query("SELECT CAST(DATABASE() AS CHAR)")
            .fetch_one(&mut self.conn)
            .await
            .context("Failed to query current database")?;
        row.try_get::<Option<String>, _>(0)?
            .context("Connection has no database selected")
    }

    /// Read TIMESTAMP values in UTC, matching the `TIME_ZONE='+00:00'` the dump
    /// preamble sets before its INSERTs replay.
    pub async fn use_utc_time_zone(&mut self) -> Result<()> {
        sqlx::raw_sql("SET time_zone = '+00:00'")
            .execute(&mut self.conn)
            .await
            .context("Failed to set session time zone")?;
        Ok(())
    }

    /// Release the connection cleanly.
    pub async fn close(self) -> Result<()> {
        use sqlx::Connection;
        self.conn.close().await.context("Failed to close connection")
    }

    async fn plan(&mut self, table: &str) -> Result<TablePlan> {
        if let Some(plan) = self.plans.get(table) {
            return Ok(plan.clone());
        }

        let rows = sqlx::query(
            "SELECT CAST(COLUMN_NAME AS CHAR), CAST(DATA_TYPE AS CHAR), \
                    CAST(COLUMN_TYPE AS CHAR), CAST(EXTRA AS CHAR) \
             FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? \
             ORDER BY ORDINAL_POSITION",
        )
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .with_context(|| format!("Failed to read columns of table '{}'", table))?;

        let mut columns = Vec::with_capacity(rows.len());
        for row in &rows {
            let name: String = row.try_get(0)?;
            let data_type: String = row.try_get(1)?;
            let column_type: String = row.try_get(2)?;
            let extra: String = row.try_get::<Option<String>, _>(3)?.unwrap_or_default();

            let extra = extra.to_ascii_uppercase();
            if extra.contains("VIRTUAL GENERATED") || extra.contains("STORED GENERATED") {
                tracing::debug!("Skipping generated column {}.{}", table, name);
                continue;
            }
            columns.push(ColumnInfo {
                kind: ColumnKind::from_types(&data_type, &column_type),
                name,
            });
        }

        let key_rows = sqlx::query(
            "SELECT CAST(COLUMN_NAME AS CHAR) FROM information_schema.KEY_COLUMN_USAGE \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY' \
             ORDER BY ORDINAL_POSITION",
        )
        .bind(table)
        .fetch_all(&mut self.conn)
        .await
        .with_context(|| format!("Failed to read primary key of table '{}'", table))?;
        let primary_key = key_rows
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<Vec<_>, _>>()?;

        let plan = TablePlan {
            select: build_select(table, &columns, &primary_key),
            columns,
        };
        self.plans.insert(table.to_string(), plan.clone());
        Ok(plan)
    }
}

/// Paginated SELECT for a table; pages are ordered by the primary key when there is one.
fn build_select(table: &str, columns: &[ColumnInfo], primary_key: &[String]) -> String {
    let list = columns
        .iter()
        .map(|c| c.kind.select_expr(&quote_identifier(&c.name)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut sql = format!("SELECT {} FROM {}", list, quote_identifier(table));
    if !primary_key.is_empty() {
        let order = primary_key
            .iter()
            .map(|c| quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(" ORDER BY ");
        sql.push_str(&order);
    }
    sql.push_str(" LIMIT ? OFFSET ?");
    sql
}

#[async_trait]
impl SchemaCatalog for MySqlDatabase {
    async fn list_tables(&mut self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES \
             WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE' \
             ORDER BY TABLE_NAME",
        )
        .fetch_all(&mut self.conn)
        .await
        .context("Failed to list tables")?;

        let tables = rows
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tables)
    }

    async fn create_table_statement(&mut self, table: &str) -> Result<String> {
        let row = sqlx::query(&format!("SHOW CREATE TABLE {}", quote_identifier(table)))
            .fetch_one(&mut self.conn)
            .await
            .map_err(statement_error)
            .with_context(|| format!("Failed to read definition of table '{}'", table))?;
        Ok(row.try_get::<String, _>(1)?)
    }
}

#[async_trait]
impl DumpSource for MySqlDatabase {
    async fn fetch_rows(&mut self, table: &str, offset: u64, limit: usize) -> Result<RowBatch> {
        let plan = self.plan(table).await?;
        if plan.columns.is_empty() {
            return Ok(RowBatch::default());
        }

        let rows = sqlx::query(&plan.select)
            .bind(limit as u64)
            .bind(offset)
            .fetch_all(&mut self.conn)
            .await
            .map_err(statement_error)
            .with_context(|| format!("Failed to read rows of table '{}'", table))?;

        let mut batch = RowBatch {
            columns: plan.columns.iter().map(|c| c.name.clone()).collect(),
            rows: Vec::with_capacity(rows.len()),
        };
        for row in &rows {
            let values = plan
                .columns
                .iter()
                .enumerate()
                .map(|(i, column)| column.kind.decode(row, i))
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("Failed to decode a row of table '{}'", table))?;
            batch.rows.push(values);
        }
        tracing::debug!(
            "Fetched {} row(s) from {} at offset {}",
            batch.rows.len(),
            table,
            offset
        );
        Ok(batch)
    }
}

#[async_trait]
impl RestoreTarget for MySqlDatabase {
    async fn session_config(&mut self) -> Result<SessionConfig, StatementError> {
        let row = sqlx::query(
            "SELECT CAST(@@SESSION.foreign_key_checks AS SIGNED), CAST(@@SESSION.sql_mode AS CHAR)",
        )
        .fetch_one(&mut self.conn)
        .await
        .map_err(statement_error)?;

        let checks: i64 = row.try_get(0).map_err(statement_error)?;
        let sql_mode: Option<String> = row.try_get(1).map_err(statement_error)?;
        Ok(SessionConfig {
            foreign_key_checks: checks != 0,
            sql_mode: sql_mode.unwrap_or_default(),
        })
    }

    async fn apply_session_config(&mut self, config: &SessionConfig) -> Result<(), StatementError> {
        let sql = format!(
            "SET SESSION foreign_key_checks = {}, SESSION sql_mode = {}",
            u8::from(config.foreign_key_checks),
            to_sql_literal(&SqlValue::Text(config.sql_mode.clone()))
        );
        sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(&sql))
            .await
            .map_err(statement_error)?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, StatementError> {
        let result = sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql))
            .await
            .map_err(statement_error)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, kind: ColumnKind) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            kind,
        }
    }

    #[test]
    fn test_column_kind_from_types() {
        assert_eq!(ColumnKind::from_types("int", "int"), ColumnKind::Signed);
        assert_eq!(ColumnKind::from_types("bigint", "bigint unsigned"), ColumnKind::Unsigned);
        assert_eq!(ColumnKind::from_types("tinyint", "tinyint(1)"), ColumnKind::Signed);
        assert_eq!(ColumnKind::from_types("decimal", "decimal(10,2)"), ColumnKind::Decimal);
        assert_eq!(ColumnKind::from_types("timestamp", "timestamp(3)"), ColumnKind::DateTime);
        assert_eq!(ColumnKind::from_types("bit", "bit(8)"), ColumnKind::Bit);
        assert_eq!(ColumnKind::from_types("LONGBLOB", "longblob"), ColumnKind::Binary);
        assert_eq!(ColumnKind::from_types("json", "json"), ColumnKind::Text);
        assert_eq!(ColumnKind::from_types("time", "time(6)"), ColumnKind::Text);
        assert_eq!(ColumnKind::from_types("enum", "enum('a','b')"), ColumnKind::Text);
    }

    #[test]
    fn test_build_select_orders_by_primary_key() {
        let columns = vec![
            column("id", ColumnKind::Unsigned),
            column("price", ColumnKind::Decimal),
            column("photo", ColumnKind::Binary),
        ];
        let sql = build_select("shop`items", &columns, &["id".to_string()]);
        assert_eq!(
            sql,
            "SELECT CAST(`id` AS UNSIGNED), CAST(`price` AS CHAR), `photo` \
             FROM `shop``items` ORDER BY `id` LIMIT ? OFFSET ?"
        );
    }

    #[test]
    fn test_build_select_without_primary_key() {
        let sql = build_select("log", &[column("line", ColumnKind::Text)], &[]);
        assert_eq!(sql, "SELECT CAST(`line` AS CHAR) FROM `log` LIMIT ? OFFSET ?");
    }

    #[test]
    fn test_zero_dates_stay_text() {
        assert_eq!(parse_date("0000-00-00"), SqlValue::Text("0000-00-00".to_string()));
        assert_eq!(
            parse_date("2024-02-29"),
            SqlValue::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert!(matches!(
            parse_datetime("2024-01-01 10:00:00.250000"),
            SqlValue::DateTime(_)
        ));
        assert_eq!(
            parse_datetime("0000-00-00 00:00:00"),
            SqlValue::Text("0000-00-00 00:00:00".to_string())
        );
    }

    #[test]
    fn test_statement_error_without_server_number() {
        let err = statement_error(sqlx::Error::RowNotFound);
        assert_eq!(err.number, None);
        assert!(!err.message.is_empty());
    }

    // Skip if TEST_SOURCE_URL is not set
    #[tokio::test]
    #[ignore]
    async fn test_use_utc_time_zone() {
        let url = std::env::var("TEST_SOURCE_URL")
            .expect("TEST_SOURCE_URL must be set for integration tests");
        let conn = crate::mysql::connect(&url).await.expect("Failed to connect");
        let mut database = MySqlDatabase::new(conn);

        database.use_utc_time_zone().await.unwrap();
        let row = sqlx::query("SELECT CAST(@@SESSION.time_zone AS CHAR)")
            .fetch_one(&mut database.conn)
            .await
            .unwrap();
        assert_eq!(row.try_get::<String, _>(0).unwrap(), "+00:00");
    }
}
