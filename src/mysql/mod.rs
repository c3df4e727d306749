// ABOUTME: MySQL adapters for the backup core
// ABOUTME: Exports connection helpers and the sqlx-backed MySqlDatabase

pub mod connection;
pub mod database;

pub use connection::{connect, connect_with_retry};
pub use database::{statement_error, ColumnKind, MySqlDatabase};
