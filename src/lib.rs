// ABOUTME: Library module for mysql-snapshot
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod backup;
pub mod commands;
pub mod config;
pub mod error;
pub mod mysql;
pub mod utils;
