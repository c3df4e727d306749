// ABOUTME: Structural comparison of dump table definitions against a live database
// ABOUTME: Parses CREATE TABLE text into column maps and reports table/column differences

use super::dump::SchemaCatalog;
use super::tokenizer::{Lexer, StatementKind};
use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::LazyLock;

const IDENT: &str = r#"(?:`(?:[^`]|``)+`|"[^"]+"|[\w$]+)"#;

/// `CREATE TABLE [IF NOT EXISTS] [schema.]name (` up to and including the paren.
static CREATE_TABLE_HEAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\bCREATE\s+(?:TEMPORARY\s+)?TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?({IDENT}(?:\s*\.\s*{IDENT})?)\s*\("
    ))
    .expect("static regex")
});

/// Whole statement in one match, used when the balanced scan fails on it.
static LOOSE_CREATE_TABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)^CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?[`"]?([\w$]+)[`"]?\s*\((.*)\)[^()]*\z"#)
        .expect("static regex")
});

/// Leading words of table-level clauses that are not columns.
const CONSTRAINT_KEYWORDS: [&str; 9] = [
    "PRIMARY",
    "KEY",
    "INDEX",
    "UNIQUE",
    "CONSTRAINT",
    "FOREIGN",
    "FULLTEXT",
    "SPATIAL",
    "CHECK",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub name: String,
    pub type_text: String,
    pub attributes_text: String,
}

impl ColumnDef {
    /// Case-insensitive comparison key
    pub fn key(&self) -> String {
        self.name.to_lowercase()
    }

    pub fn definition(&self) -> String {
        if self.attributes_text.is_empty() {
            self.type_text.clone()
        } else {
            format!("{} {}", self.type_text, self.attributes_text)
        }
    }

    fn same_shape(&self, other: &ColumnDef) -> bool {
        self.type_text.eq_ignore_ascii_case(&other.type_text)
            && self.attributes_text == other.attributes_text
    }
}

/// A table definition, with columns in definition order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
    pub create_statement: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        let key = name.to_lowercase();
        self.columns.iter().find(|c| c.key() == key)
    }
}

/// Turns CREATE TABLE text into table descriptors.
///
/// [`HeuristicParser`] matches text patterns; a grammar-based parser can be
/// swapped in without touching callers of [`SchemaDiffer`].
pub trait DefinitionParser {
    /// Every table definition found in a dump script. Text inside string
    /// literals and comments never counts as a definition.
    fn extract_tables(&self, dump: &str) -> Vec<TableDescriptor>;

    /// Parse one CREATE TABLE statement
    fn parse_table(&self, create_statement: &str) -> Option<TableDescriptor>;
}

/// Pattern-based CREATE TABLE parser.
///
/// Nested parentheses and quoted text in column definitions are handled;
/// generated-column expressions and similar exotic syntax end up verbatim in
/// `attributes_text`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicParser;

impl DefinitionParser for HeuristicParser {
    fn extract_tables(&self, dump: &str) -> Vec<TableDescriptor> {
        let mut lexer = Lexer::new();
        let mut statements = VecDeque::new();
        let split = lexer
            .feed(dump.as_bytes(), &mut statements)
            .and_then(|()| lexer.finish(&mut statements));
        if let Err(e) = split {
            tracing::warn!("⚠ Stopped reading table definitions: {}", e);
        }

        statements
            .into_iter()
            .filter(|statement| statement.kind == StatementKind::Ddl && statement.is_create_table())
            .filter_map(|statement| {
                self.parse_table(&statement.text).or_else(|| {
                    let loose = LOOSE_CREATE_TABLE.captures(&statement.text)?;
                    tracing::debug!("Using loose CREATE TABLE match for '{}'", &loose[1]);
                    Some(build_descriptor(&loose[1], &loose[2], statement.text.trim()))
                })
            })
            .collect()
    }

    fn parse_table(&self, create_statement: &str) -> Option<TableDescriptor> {
        let head = CREATE_TABLE_HEAD.captures(create_statement)?;
        // Only a leading head counts; later matches sit in comments or strings
        if !create_statement[..head.get(0)?.start()].trim().is_empty() {
            return None;
        }
        let open = head.get(0)?.end() - 1;
        let close = matching_paren(create_statement, open)?;
        Some(build_descriptor(
            &head[1],
            &create_statement[open + 1..close],
            create_statement.trim(),
        ))
    }
}

fn build_descriptor(raw_name: &str, body: &str, statement: &str) -> TableDescriptor {
    TableDescriptor {
        name: table_name(raw_name),
        create_statement: statement.to_string(),
        columns: split_top_level(body)
            .into_iter()
            .filter_map(parse_column)
            .collect(),
    }
}

/// Last segment of a possibly schema-qualified, possibly quoted name.
fn table_name(raw: &str) -> String {
    let mut last = raw.trim();
    let mut rest = raw.trim();
    while !rest.is_empty() {
        let (ident, tail) = take_identifier(rest);
        last = ident;
        rest = tail.trim_start().trim_start_matches('.').trim_start();
        if ident.is_empty() {
            break;
        }
    }
    unquote(last)
}

/// Split off a leading identifier (quoted or bare). Returns (identifier, rest).
fn take_identifier(text: &str) -> (&str, &str) {
    let bytes = text.as_bytes();
    match bytes.first() {
        Some(&quote @ (b'`' | b'"')) => {
            let mut i = 1;
            while i < bytes.len() {
                if bytes[i] == quote {
                    if bytes.get(i + 1) == Some(&quote) {
                        i += 2;
                        continue;
                    }
                    return (&text[..=i], &text[i + 1..]);
                }
                i += 1;
            }
            (text, "")
        }
        _ => {
            let end = text
                .find(|c: char| !(c.is_alphanumeric() || c == '_' || c == '$'))
                .unwrap_or(text.len());
            (&text[..end], &text[end..])
        }
    }
}

fn unquote(ident: &str) -> String {
    if ident.len() >= 2 && ident.starts_with('`') && ident.ends_with('`') {
        ident[1..ident.len() - 1].replace("``", "`")
    } else if ident.len() >= 2 && ident.starts_with('"') && ident.ends_with('"') {
        ident[1..ident.len() - 1].replace("\"\"", "\"")
    } else {
        ident.to_string()
    }
}

/// Index of the `)` closing the `(` at `open`, skipping quoted text.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = open;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' && q != b'`' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' => depth += 1,
                b')' => {
                    depth = depth.checked_sub(1)?;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Split a table body on commas outside parentheses and quotes.
fn split_top_level(body: &str) -> Vec<&str> {
    let bytes = body.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' && q != b'`' {
                    i += 1;
                } else if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' | b'`' => quote = Some(b),
                b'(' => depth += 1,
                b')' => depth = depth.saturating_sub(1),
                b',' if depth == 0 => {
                    parts.push(&body[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
        i += 1;
    }
    parts.push(&body[start.min(body.len())..]);

    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

/// `name type[(args)] attributes...`; `None` for keys and constraints.
fn parse_column(definition: &str) -> Option<ColumnDef> {
    let definition = definition.trim();
    let quoted = definition.starts_with('`') || definition.starts_with('"');
    let (raw_name, rest) = take_identifier(definition);
    if raw_name.is_empty() {
        return None;
    }
    if !quoted
        && CONSTRAINT_KEYWORDS
            .iter()
            .any(|keyword| raw_name.eq_ignore_ascii_case(keyword))
    {
        return None;
    }

    let rest = rest.trim_start();
    let base_end = rest
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(rest.len());
    if base_end == 0 {
        return None;
    }
    let mut type_text = rest[..base_end].to_lowercase();
    let mut after = &rest[base_end..];

    let trimmed = after.trim_start();
    if trimmed.starts_with('(') {
        let offset = after.len() - trimmed.len();
        if let Some(close) = matching_paren(after, offset) {
            type_text.push_str(&after[offset..=close]);
            after = &after[close + 1..];
        }
    }

    Some(ColumnDef {
        name: unquote(raw_name),
        type_text,
        attributes_text: after.split_whitespace().collect::<Vec<_>>().join(" "),
    })
}

/// A column present on both sides whose definition differs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnChange {
    pub column: String,
    pub dump: String,
    pub current: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnChanges {
    /// Columns the dump defines that the live table lacks (a restore would add them)
    pub added: Vec<ColumnDef>,
    /// Columns the live table has that the dump lacks, e.g. added after the dump was taken
    pub removed: Vec<ColumnDef>,
    pub modified: Vec<ColumnChange>,
}

impl ColumnChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableChanges {
    pub table: String,
    pub changes: ColumnChanges,
}

/// Differences between a dump (the restore source) and the live database.
/// Every list is sorted by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDiff {
    pub new_tables: Vec<String>,
    pub missing_tables: Vec<String>,
    pub modified_tables: Vec<TableChanges>,
    pub matching_tables: Vec<String>,
}

impl SchemaDiff {
    pub fn total_dump_tables(&self) -> usize {
        self.new_tables.len() + self.modified_tables.len() + self.matching_tables.len()
    }

    pub fn total_current_tables(&self) -> usize {
        self.missing_tables.len() + self.modified_tables.len() + self.matching_tables.len()
    }

    /// No new, missing or modified tables.
    pub fn is_identical(&self) -> bool {
        self.new_tables.is_empty() && self.missing_tables.is_empty() && self.modified_tables.is_empty()
    }

    pub fn changes_for(&self, table: &str) -> Option<&ColumnChanges> {
        self.modified_tables
            .iter()
            .find(|t| t.table.eq_ignore_ascii_case(table))
            .map(|t| &t.changes)
    }
}

/// Compare two sets of table definitions. Table and column names match
/// case-insensitively; later duplicates of a name are ignored.
pub fn diff_tables(dump: &[TableDescriptor], live: &[TableDescriptor]) -> SchemaDiff {
    fn index(tables: &[TableDescriptor]) -> BTreeMap<String, &TableDescriptor> {
        let mut map: BTreeMap<String, &TableDescriptor> = BTreeMap::new();
        for table in tables {
            map.entry(table.name.to_lowercase()).or_insert(table);
        }
        map
    }
    let dump_tables = index(dump);
    let live_tables = index(live);

    let mut diff = SchemaDiff::default();

    for (key, dump_table) in &dump_tables {
        let Some(live_table) = live_tables.get(key) else {
            diff.new_tables.push(dump_table.name.clone());
            continue;
        };

        let changes = diff_columns(dump_table, live_table);
        if changes.is_empty() {
            diff.matching_tables.push(dump_table.name.clone());
        } else {
            diff.modified_tables.push(TableChanges {
                table: dump_table.name.clone(),
                changes,
            });
        }
    }

    for (key, live_table) in &live_tables {
        if !dump_tables.contains_key(key) {
            diff.missing_tables.push(live_table.name.clone());
        }
    }

    diff
}

fn diff_columns(dump: &TableDescriptor, live: &TableDescriptor) -> ColumnChanges {
    let live_columns: HashMap<String, &ColumnDef> =
        live.columns.iter().map(|c| (c.key(), c)).collect();
    let dump_columns: HashMap<String, &ColumnDef> =
        dump.columns.iter().map(|c| (c.key(), c)).collect();

    let mut changes = ColumnChanges::default();
    for column in &dump.columns {
        match live_columns.get(&column.key()) {
            None => changes.added.push(column.clone()),
            Some(current) if !column.same_shape(current) => changes.modified.push(ColumnChange {
                column: column.name.clone(),
                dump: column.definition(),
                current: current.definition(),
            }),
            Some(_) => {}
        }
    }
    for column in &live.columns {
        if !dump_columns.contains_key(&column.key()) {
            changes.removed.push(column.clone());
        }
    }
    changes
}

/// Read-only schema verification of a dump against a live catalog.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiffer<P = HeuristicParser> {
    parser: P,
}

impl SchemaDiffer<HeuristicParser> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: DefinitionParser> SchemaDiffer<P> {
    pub fn with_parser(parser: P) -> Self {
        Self { parser }
    }

    pub fn dump_tables(&self, dump: &str) -> Vec<TableDescriptor> {
        self.parser.extract_tables(dump)
    }

    /// Descriptors for every base table of the live database.
    pub async fn live_tables<C>(&self, catalog: &mut C) -> Result<Vec<TableDescriptor>>
    where
        C: SchemaCatalog + ?Sized,
    {
        let names = catalog
            .list_tables()
            .await
            .context("Failed to list live tables")?;

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let create = catalog
                .create_table_statement(&name)
                .await
                .with_context(|| format!("Failed to read definition of table '{}'", name))?;
            let descriptor = self.parser.parse_table(&create).unwrap_or_else(|| {
                tracing::warn!("⚠ Could not parse definition of live table '{}'", name);
                TableDescriptor {
                    name: name.clone(),
                    create_statement: create.clone(),
                    columns: Vec::new(),
                }
            });
            tables.push(descriptor);
        }
        Ok(tables)
    }

    /// Compare the tables defined in `dump` with the live catalog. Neither side is modified.
    pub async fn verify<C>(&self, dump: &str, catalog: &mut C) -> Result<SchemaDiff>
    where
        C: SchemaCatalog + ?Sized,
    {
        let dump_tables = self.dump_tables(dump);
        let live_tables = self.live_tables(catalog).await?;
        tracing::debug!(
            "Comparing {} dump table(s) with {} live table(s)",
            dump_tables.len(),
            live_tables.len()
        );
        Ok(diff_tables(&dump_tables, &live_tables))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifySummary {
    pub total_dump_tables: usize,
    pub total_current_tables: usize,
    pub new_tables: usize,
    pub missing_tables: usize,
    pub modified_tables: usize,
    pub matching_tables: usize,
}

/// JSON body of a verify request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyResponse {
    /// The dump contained at least one table definition
    pub valid: bool,
    pub differences: SchemaDiff,
    pub summary: VerifySummary,
}

impl VerifyResponse {
    pub fn from_diff(diff: SchemaDiff) -> Self {
        let summary = VerifySummary {
            total_dump_tables: diff.total_dump_tables(),
            total_current_tables: diff.total_current_tables(),
            new_tables: diff.new_tables.len(),
            missing_tables: diff.missing_tables.len(),
            modified_tables: diff.modified_tables.len(),
            matching_tables: diff.matching_tables.len(),
        };
        Self {
            valid: summary.total_dump_tables > 0,
            differences: diff,
            summary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    const USERS: &str = "CREATE TABLE `users` (
  `id` int unsigned NOT NULL AUTO_INCREMENT,
  `email` varchar(255) COLLATE utf8mb4_bin NOT NULL,
  `role` enum('admin','user, restricted') NOT NULL DEFAULT 'user, restricted',
  `score` decimal(10,2) DEFAULT NULL,
  PRIMARY KEY (`id`),
  UNIQUE KEY `email` (`email`),
  KEY `idx_role` (`role`),
  CONSTRAINT `fk_x` FOREIGN KEY (`id`) REFERENCES `accounts` (`id`)
) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4";

    fn parse(sql: &str) -> TableDescriptor {
        HeuristicParser.parse_table(sql).expect("parsable")
    }

    struct Catalog(Vec<(String, String)>);

    #[async_trait]
    impl SchemaCatalog for Catalog {
        async fn list_tables(&mut self) -> Result<Vec<String>> {
            Ok(self.0.iter().map(|(name, _)| name.clone()).collect())
        }

        async fn create_table_statement(&mut self, table: &str) -> Result<String> {
            self.0
                .iter()
                .find(|(name, _)| name == table)
                .map(|(_, sql)| sql.clone())
                .context("no such table")
        }
    }

    #[test]
    fn test_parse_columns_skips_keys_and_constraints() {
        let table = parse(USERS);
        assert_eq!(table.name, "users");
        let names: Vec<&str> = table.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email", "role", "score"]);

        let id = table.column("ID").unwrap();
        assert_eq!(id.type_text, "int");
        assert_eq!(id.attributes_text, "unsigned NOT NULL AUTO_INCREMENT");

        let role = table.column("role").unwrap();
        assert_eq!(role.type_text, "enum('admin','user, restricted')");
        assert_eq!(role.attributes_text, "NOT NULL DEFAULT 'user, restricted'");

        assert_eq!(table.column("score").unwrap().type_text, "decimal(10,2)");
    }

    #[test]
    fn test_parse_table_name_variants() {
        assert_eq!(parse("CREATE TABLE IF NOT EXISTS `shop`.`orders` (id INT)").name, "orders");
        assert_eq!(parse("create table plain_name(id int)").name, "plain_name");
        assert_eq!(parse("CREATE TABLE `we``ird` (`key` INT)").name, "we`ird");
        // Quoted column named like a keyword is still a column
        assert_eq!(parse("CREATE TABLE t (`key` INT)").columns[0].name, "key");
    }

    #[test]
    fn test_extract_tables_from_dump() {
        let dump = format!(
            "-- header\nDROP TABLE IF EXISTS `users`;\n{USERS};\n\
             INSERT INTO `users` VALUES (1,'a@b.c','admin',NULL);\n\
             CREATE TABLE `logs` (\n  `id` bigint NOT NULL,\n  `note` text\n);\n"
        );
        let tables = HeuristicParser.extract_tables(&dump);
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users", "logs"]);
        assert!(tables[0].create_statement.ends_with("DEFAULT CHARSET=utf8mb4"));
        assert_eq!(tables[1].columns.len(), 2);
    }

    #[test]
    fn test_create_table_text_in_strings_and_comments_is_not_a_table() {
        let dump = "-- restore with: CREATE TABLE ghost_comment (x int);\n\
                    /* CREATE TABLE ghost_block (x int) */\n\
                    CREATE TABLE `t` (`id` int COMMENT 'see CREATE TABLE other (a int)');\n\
                    INSERT INTO `t` VALUES (1,'how to: CREATE TABLE ghost (x int);');\n";
        let tables = HeuristicParser.extract_tables(dump);
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["t"]);
        assert_eq!(tables[0].columns.len(), 1);
        assert_eq!(
            tables[0].columns[0].attributes_text,
            "COMMENT 'see CREATE TABLE other (a int)'"
        );
    }

    #[test]
    fn test_parse_table_requires_leading_create() {
        assert!(HeuristicParser
            .parse_table("INSERT INTO t VALUES ('CREATE TABLE ghost (x int)')")
            .is_none());
    }

    #[test]
    fn test_extract_falls_back_to_loose_pattern() {
        // Escaped closing quote leaves the balanced scan unterminated
        let broken = "CREATE TABLE broken (id INT, note VARCHAR(5) DEFAULT 'x\\');";
        let tables = HeuristicParser.extract_tables(broken);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "broken");
        assert_eq!(tables[0].columns[0].name, "id");
    }

    #[test]
    fn test_diff_categories() {
        let dump = vec![
            parse("CREATE TABLE same (id INT NOT NULL)"),
            parse("CREATE TABLE only_dump (id INT)"),
            parse("CREATE TABLE changed (id INT NOT NULL, name VARCHAR(10), gone INT)"),
        ];
        let live = vec![
            parse("CREATE TABLE SAME (ID int NOT NULL)"),
            parse("CREATE TABLE only_live (id INT)"),
            parse("CREATE TABLE changed (id BIGINT NOT NULL, name VARCHAR(10), extra INT)"),
        ];

        let diff = diff_tables(&dump, &live);
        assert_eq!(diff.new_tables, vec!["only_dump"]);
        assert_eq!(diff.missing_tables, vec!["only_live"]);
        assert_eq!(diff.matching_tables, vec!["same"]);

        let changes = diff.changes_for("changed").unwrap();
        assert_eq!(changes.added[0].name, "gone");
        assert_eq!(changes.removed[0].name, "extra");
        assert_eq!(
            changes.modified,
            vec![ColumnChange {
                column: "id".to_string(),
                dump: "int NOT NULL".to_string(),
                current: "bigint NOT NULL".to_string(),
            }]
        );
        assert_eq!(diff.total_dump_tables(), 3);
        assert_eq!(diff.total_current_tables(), 3);
    }

    #[test]
    fn test_live_column_addition_is_antisymmetric() {
        let old_dump = vec![parse("CREATE TABLE t (id INT NOT NULL)")];
        let live = vec![parse("CREATE TABLE t (id INT NOT NULL, nickname VARCHAR(20) DEFAULT NULL)")];

        let forward = diff_tables(&old_dump, &live);
        let backward = diff_tables(&live, &old_dump);

        assert_eq!(forward.changes_for("t").unwrap().removed[0].name, "nickname");
        assert!(forward.changes_for("t").unwrap().added.is_empty());
        assert_eq!(backward.changes_for("t").unwrap().added[0].name, "nickname");
        assert!(backward.changes_for("t").unwrap().removed.is_empty());
    }

    #[tokio::test]
    async fn test_verify_against_catalog_is_read_only() {
        let mut catalog = Catalog(vec![
            ("users".to_string(), USERS.to_string()),
            ("extra".to_string(), "CREATE TABLE `extra` (`id` int)".to_string()),
        ]);
        let dump = format!("{USERS};\n");

        let diff = SchemaDiffer::new().verify(&dump, &mut catalog).await.unwrap();
        assert_eq!(diff.matching_tables, vec!["users"]);
        assert_eq!(diff.missing_tables, vec!["extra"]);
        assert!(diff.new_tables.is_empty());

        let again = SchemaDiffer::new().verify(&dump, &mut catalog).await.unwrap();
        assert_eq!(diff, again);
        assert_eq!(catalog.0.len(), 2);
    }

    #[test]
    fn test_verify_response_shape() {
        let diff = diff_tables(
            &[parse("CREATE TABLE a (id INT, v INT)")],
            &[parse("CREATE TABLE a (id INT)"), parse("CREATE TABLE b (id INT)")],
        );
        let json = serde_json::to_value(VerifyResponse::from_diff(diff)).unwrap();

        assert_eq!(json["valid"], true);
        assert_eq!(json["differences"]["missingTables"][0], "b");
        assert_eq!(json["differences"]["modifiedTables"][0]["table"], "a");
        assert_eq!(
            json["differences"]["modifiedTables"][0]["changes"]["added"][0]["name"],
            "v"
        );
        assert_eq!(json["summary"]["totalDumpTables"], 1);
        assert_eq!(json["summary"]["totalCurrentTables"], 2);
        assert_eq!(json["summary"]["modifiedTables"], 1);
    }

    #[test]
    fn test_empty_dump_is_not_valid() {
        let response = VerifyResponse::from_diff(diff_tables(&[], &[parse("CREATE TABLE a (id INT)")]));
        assert!(!response.valid);
        assert_eq!(response.summary.missing_tables, 1);
    }
}
