// ABOUTME: Backup and restore core: dump writing, statement tokenizing, replay and schema diffing
// ABOUTME: Components are generic over adapter traits so any database driver can back them

pub mod dump;
pub mod escape;
pub mod restore;
pub mod schema;
pub mod tokenizer;

pub use dump::{
    DumpSource, DumpSummary, DumpWriter, RowBatch, SchemaCatalog, TableSummary, DEFAULT_BATCH_SIZE,
};
pub use escape::{to_sql_literal, write_sql_literal, SqlValue};
pub use restore::{
    classify, error_code, looks_like_dump, sniff_upload, ExecutionReport, RestoreExecutor,
    RestoreOutcome, RestoreResponse, RestoreStatus, RestoreTarget, SessionConfig, Severity,
    StatementFailure, PERMISSIVE_SQL_MODE, SNIFF_LIMIT,
};
pub use schema::{
    diff_tables, ColumnChange, ColumnChanges, ColumnDef, DefinitionParser, HeuristicParser,
    SchemaDiff, SchemaDiffer, TableChanges, TableDescriptor, VerifyResponse, VerifySummary,
};
pub use tokenizer::{
    DumpStatement, LexState, Lexer, StatementKind, StatementStream, DEFAULT_CHUNK_SIZE,
};
