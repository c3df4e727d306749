// ABOUTME: Command implementations for the CLI
// ABOUTME: Exports export, restore and verify commands

pub mod export;
pub mod restore;
pub mod verify;

pub use export::export;
pub use restore::{restore, RestoreOptions};
pub use verify::verify;
