// ABOUTME: MySQL connection utilities built on sqlx
// ABOUTME: Handles URL validation, readable connect errors and retry with backoff

use crate::config::ConnectionConfig;
use crate::utils;
use anyhow::{Context, Result};
use sqlx::{Connection, MySqlConnection};

/// Open one MySQL connection
///
/// Restores need a single dedicated connection because session variables
/// (`foreign_key_checks`, `sql_mode`) are per connection, so no pool is used.
pub async fn connect(connection_string: &str) -> Result<MySqlConnection> {
    utils::validate_connection_string(connection_string)?;

    MySqlConnection::connect(connection_string)
        .await
        .map_err(|e| {
            let error_msg = e.to_string();

            if error_msg.contains("Access denied") {
                anyhow::anyhow!(
                    "Authentication failed: Invalid username or password.\n\
                     Please verify your database credentials.\n\
                     Error: {}",
                    error_msg
                )
            } else if error_msg.contains("Unknown database") {
                anyhow::anyhow!(
                    "Database does not exist: {}\n\
                     Please create the database first or check the connection URL.",
                    error_msg
                )
            } else if error_msg.contains("Connection refused")
                || error_msg.contains("error communicating with database")
            {
                anyhow::anyhow!(
                    "Connection refused: Unable to reach database server.\n\
                     Please check:\n\
                     - The host and port are correct\n\
                     - The database server is running\n\
                     - Firewall rules allow connections\n\
                     Error: {}",
                    error_msg
                )
            } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
                anyhow::anyhow!(
                    "Connection timeout: Database server did not respond in time.\n\
                     This could indicate network issues or server overload.\n\
                     Error: {}",
                    error_msg
                )
            } else if error_msg.contains("TLS") || error_msg.contains("SSL") {
                anyhow::anyhow!(
                    "TLS/SSL error: Failed to establish secure connection.\n\
                     Check the ssl-mode parameter of the connection URL.\n\
                     Error: {}",
                    error_msg
                )
            } else {
                anyhow::anyhow!("Failed to connect to database: {}", error_msg)
            }
        })
}

/// Connect with automatic retry for transient failures
pub async fn connect_with_retry(
    connection_string: &str,
    config: &ConnectionConfig,
) -> Result<MySqlConnection> {
    utils::retry_with_backoff(
        || connect(connection_string),
        config.max_retries,
        config.retry_delay(),
    )
    .await
    .context("Failed to connect after retries")
}
