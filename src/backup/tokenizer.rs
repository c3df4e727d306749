// ABOUTME: Streaming SQL statement splitter used to replay dump files
// ABOUTME: Quote- and comment-aware lexer that yields one statement at a time

use crate::error::TokenizeError;
use futures::stream::Stream;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Bytes read from the input before control is handed back to the scheduler.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Session variables that must survive statement filtering.
const RETAINED_SESSION_VARIABLES: [&str; 3] = ["FOREIGN_KEY_CHECKS", "SQL_MODE", "AUTOCOMMIT"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Ddl,
    Dml,
    SessionSet,
    Other,
}

impl StatementKind {
    /// Classify a statement by its leading keyword.
    ///
    /// A leading versioned-comment marker (`/*!40000`) is skipped, so
    /// `/*!40000 ALTER TABLE t DISABLE KEYS */` is DDL.
    pub fn classify(text: &str) -> Self {
        let mut rest = text.trim_start();
        if let Some(after) = rest.strip_prefix("/*!") {
            rest = after.trim_start_matches(|c: char| c.is_ascii_digit()).trim_start();
        }
        let keyword: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect::<String>()
            .to_ascii_uppercase();

        match keyword.as_str() {
            "CREATE" | "DROP" | "ALTER" | "TRUNCATE" | "RENAME" => StatementKind::Ddl,
            "INSERT" | "UPDATE" | "DELETE" | "REPLACE" => StatementKind::Dml,
            "SET" => StatementKind::SessionSet,
            _ => StatementKind::Other,
        }
    }
}

/// One executable statement, terminator stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpStatement {
    pub kind: StatementKind,
    pub text: String,
    /// Zero-based position among the statements yielded from this input
    pub source_index: usize,
}

impl DumpStatement {
    /// `CREATE TABLE ...`, as opposed to other DDL.
    pub fn is_create_table(&self) -> bool {
        let mut words = self.text.split_whitespace();
        matches!(
            (words.next(), words.next()),
            (Some(create), Some(table))
                if create.eq_ignore_ascii_case("CREATE") && table.eq_ignore_ascii_case("TABLE")
        )
    }
}

/// Lexer state between two input bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexState {
    Normal,
    /// Inside a quoted string or identifier. `escaped` is set right after a
    /// backslash inside `'` or `"` strings.
    InString { quote: u8, escaped: bool },
    InLineComment,
    InBlockComment,
    /// `/*! ... */`: copied through, the server executes it.
    InVersionedComment,
}

/// Synchronous splitting core, independent of any I/O.
///
/// Input is fed in arbitrary chunks; a chunk boundary may fall anywhere,
/// including inside a multi-byte character or a two-byte token such as `--`.
/// At most three undecided bytes are carried over between chunks.
#[derive(Debug)]
pub struct Lexer {
    state: LexState,
    buffer: Vec<u8>,
    carry: Vec<u8>,
    next_index: usize,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    pub fn new() -> Self {
        Self {
            state: LexState::Normal,
            buffer: Vec::new(),
            carry: Vec::new(),
            next_index: 0,
        }
    }

    pub fn state(&self) -> LexState {
        self.state
    }

    /// Consume one chunk, pushing every completed statement onto `out`.
    pub fn feed(
        &mut self,
        chunk: &[u8],
        out: &mut VecDeque<DumpStatement>,
    ) -> Result<(), TokenizeError> {
        if self.carry.is_empty() {
            let consumed = self.scan(chunk, false, out)?;
            self.carry.extend_from_slice(&chunk[consumed..]);
        } else {
            let mut window = std::mem::take(&mut self.carry);
            window.extend_from_slice(chunk);
            let consumed = self.scan(&window, false, out)?;
            window.drain(..consumed);
            self.carry = window;
        }
        Ok(())
    }

    /// Signal end of input. A non-blank residual without a terminator is
    /// emitted as the final statement.
    pub fn finish(&mut self, out: &mut VecDeque<DumpStatement>) -> Result<(), TokenizeError> {
        let tail = std::mem::take(&mut self.carry);
        self.scan(&tail, true, out)?;
        self.state = LexState::Normal;
        self.emit(out)
    }

    /// Returns how many bytes of `input` were consumed. Bytes are left
    /// unconsumed only when a lookahead is needed and `eof` is false.
    fn scan(
        &mut self,
        input: &[u8],
        eof: bool,
        out: &mut VecDeque<DumpStatement>,
    ) -> Result<usize, TokenizeError> {
        let mut i = 0;
        while i < input.len() {
            let b = input[i];
            let next = input.get(i + 1).copied();

            match self.state {
                LexState::Normal => match b {
                    b'\'' | b'"' | b'`' => {
                        self.buffer.push(b);
                        self.state = LexState::InString {
                            quote: b,
                            escaped: false,
                        };
                        i += 1;
                    }
                    b'#' => {
                        self.state = LexState::InLineComment;
                        i += 1;
                    }
                    b'-' | b'/' if next.is_none() && !eof => return Ok(i),
                    b'-' if next == Some(b'-') => {
                        self.state = LexState::InLineComment;
                        i += 2;
                    }
                    b'/' if next == Some(b'*') => match input.get(i + 2) {
                        None if !eof => return Ok(i),
                        Some(b'!') => {
                            self.buffer.extend_from_slice(b"/*!");
                            self.state = LexState::InVersionedComment;
                            i += 3;
                        }
                        _ => {
                            if !self.buffer.is_empty() {
                                self.buffer.push(b' ');
                            }
                            self.state = LexState::InBlockComment;
                            i += 2;
                        }
                    },
                    b';' => {
                        self.emit(out)?;
                        i += 1;
                    }
                    _ => {
                        self.buffer.push(b);
                        i += 1;
                    }
                },
                LexState::InString { quote, escaped } => {
                    self.buffer.push(b);
                    self.state = if escaped {
                        LexState::InString {
                            quote,
                            escaped: false,
                        }
                    } else if b == b'\\' && quote != b'`' {
                        LexState::InString {
                            quote,
                            escaped: true,
                        }
                    } else if b == quote {
                        LexState::Normal
                    } else {
                        self.state
                    };
                    i += 1;
                }
                LexState::InLineComment => {
                    if b == b'\n' {
                        self.buffer.push(b'\n');
                        self.state = LexState::Normal;
                    }
                    i += 1;
                }
                LexState::InBlockComment => {
                    if b == b'*' {
                        match next {
                            None if !eof => return Ok(i),
                            Some(b'/') => {
                                self.state = LexState::Normal;
                                i += 2;
                                continue;
                            }
                            _ => {}
                        }
                    }
                    i += 1;
                }
                LexState::InVersionedComment => {
                    if b == b'*' {
                        match next {
                            None if !eof => return Ok(i),
                            Some(b'/') => {
                                self.buffer.extend_from_slice(b"*/");
                                self.state = LexState::Normal;
                                i += 2;
                                continue;
                            }
                            _ => {}
                        }
                    }
                    self.buffer.push(b);
                    i += 1;
                }
            }
        }
        Ok(i)
    }

    fn emit(&mut self, out: &mut VecDeque<DumpStatement>) -> Result<(), TokenizeError> {
        let text = std::str::from_utf8(&self.buffer).map_err(|_| TokenizeError::InvalidUtf8 {
            index: self.next_index,
        })?;
        let trimmed = text.trim();

        if trimmed.is_empty() {
            self.buffer.clear();
            return Ok(());
        }
        if is_ignored_session_set(trimmed) {
            tracing::debug!("Skipping session statement: {}", trimmed);
            self.buffer.clear();
            return Ok(());
        }

        out.push_back(DumpStatement {
            kind: StatementKind::classify(trimmed),
            text: trimmed.to_string(),
            source_index: self.next_index,
        });
        self.next_index += 1;
        self.buffer.clear();
        Ok(())
    }
}

/// A bare `SET ...` that only adjusts client session state (character sets,
/// time zone, user variables). Toggles the restore relies on are kept.
fn is_ignored_session_set(statement: &str) -> bool {
    let is_set = statement
        .get(..3)
        .is_some_and(|head| head.eq_ignore_ascii_case("SET"))
        && statement[3..].starts_with(|c: char| c.is_whitespace());
    if !is_set {
        return false;
    }

    let upper = statement.to_ascii_uppercase();
    !RETAINED_SESSION_VARIABLES
        .iter()
        .any(|variable| upper.contains(variable))
}

/// Lazily splits an async byte stream into statements.
///
/// Working memory is one read chunk plus the statement being assembled,
/// regardless of input size. After every chunk the task yields to the
/// runtime so one large upload does not starve other requests.
pub struct StatementStream<R> {
    reader: R,
    lexer: Lexer,
    ready: VecDeque<DumpStatement>,
    chunk: Vec<u8>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> StatementStream<R> {
    pub fn new(reader: R) -> Self {
        Self::with_chunk_size(reader, DEFAULT_CHUNK_SIZE)
    }

    pub fn with_chunk_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            lexer: Lexer::new(),
            ready: VecDeque::new(),
            chunk: vec![0; chunk_size.max(1)],
            finished: false,
        }
    }

    /// Next statement in input order, or `None` once the input is exhausted.
    pub async fn next_statement(&mut self) -> Result<Option<DumpStatement>, TokenizeError> {
        loop {
            if let Some(statement) = self.ready.pop_front() {
                return Ok(Some(statement));
            }
            if self.finished {
                return Ok(None);
            }

            let n = self.reader.read(&mut self.chunk).await?;
            if n == 0 {
                self.lexer.finish(&mut self.ready)?;
                self.finished = true;
                continue;
            }

            self.lexer.feed(&self.chunk[..n], &mut self.ready)?;
            tokio::task::yield_now().await;
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = Result<DumpStatement, TokenizeError>> {
        futures::stream::try_unfold(self, |mut statements| async move {
            let next = statements.next_statement().await?;
            Ok::<_, TokenizeError>(next.map(|statement| (statement, statements)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn split_with_chunk(input: &str, chunk: usize) -> Vec<DumpStatement> {
        let mut lexer = Lexer::new();
        let mut out = VecDeque::new();
        for piece in input.as_bytes().chunks(chunk) {
            lexer.feed(piece, &mut out).unwrap();
        }
        lexer.finish(&mut out).unwrap();
        out.into_iter().collect()
    }

    fn split(input: &str) -> Vec<String> {
        let whole: Vec<String> = split_with_chunk(input, input.len().max(1))
            .into_iter()
            .map(|s| s.text)
            .collect();
        // Byte-at-a-time feeding must agree with one-shot feeding
        let bytewise: Vec<String> = split_with_chunk(input, 1)
            .into_iter()
            .map(|s| s.text)
            .collect();
        assert_eq!(whole, bytewise, "chunking changed the result for {input:?}");
        whole
    }

    #[test]
    fn test_semicolon_inside_string_does_not_split() {
        assert_eq!(
            split("INSERT INTO t VALUES ('a;b');"),
            vec!["INSERT INTO t VALUES ('a;b')"]
        );
    }

    #[test]
    fn test_line_comment_is_discarded() {
        assert_eq!(split("-- note; still comment\nSELECT 1;"), vec!["SELECT 1"]);
        assert_eq!(split("# hash comment; too\nSELECT 2;"), vec!["SELECT 2"]);
    }

    #[test]
    fn test_versioned_comment_passes_through() {
        let statements = split_with_chunk("/*!40000 ALTER TABLE t DISABLE KEYS */;", 7);
        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].text, "/*!40000 ALTER TABLE t DISABLE KEYS */");
        assert_eq!(statements[0].kind, StatementKind::Ddl);
    }

    #[test]
    fn test_semicolon_inside_versioned_comment_is_kept() {
        assert_eq!(
            split("/*!50001 SELECT 1; SELECT 2 */;SELECT 3;"),
            vec!["/*!50001 SELECT 1; SELECT 2 */", "SELECT 3"]
        );
    }

    #[test]
    fn test_block_comment_is_discarded() {
        assert_eq!(
            split("/* header; with semicolon */ CREATE TABLE a (id INT);"),
            vec!["CREATE TABLE a (id INT)"]
        );
        assert_eq!(split("SELECT/* x */1;"), vec!["SELECT 1"]);
        assert!(split("/* only a comment */;").is_empty());
    }

    #[test]
    fn test_backslash_escaped_quote_stays_in_string() {
        assert_eq!(
            split(r"INSERT INTO t VALUES ('it\'s; fine');SELECT 1;"),
            vec![r"INSERT INTO t VALUES ('it\'s; fine')", "SELECT 1"]
        );
    }

    #[test]
    fn test_escaped_backslash_before_closing_quote() {
        assert_eq!(
            split(r"INSERT INTO t VALUES ('dir\\');SELECT 1;"),
            vec![r"INSERT INTO t VALUES ('dir\\')", "SELECT 1"]
        );
    }

    #[test]
    fn test_doubled_quotes_and_other_quote_chars() {
        assert_eq!(
            split(r#"INSERT INTO `we;ird` VALUES ('O''Brien;', "x;y");"#),
            vec![r#"INSERT INTO `we;ird` VALUES ('O''Brien;', "x;y")"#]
        );
    }

    #[test]
    fn test_comment_markers_inside_strings_are_literal() {
        assert_eq!(
            split("INSERT INTO t VALUES ('-- not a comment', '/* nor this */');"),
            vec!["INSERT INTO t VALUES ('-- not a comment', '/* nor this */')"]
        );
    }

    #[test]
    fn test_residual_without_terminator_is_emitted() {
        assert_eq!(split("SELECT 1;\nSELECT 2"), vec!["SELECT 1", "SELECT 2"]);
        assert!(split("   \n -- trailing comment").is_empty());
        assert!(split("").is_empty());
    }

    #[test]
    fn test_session_set_filtering() {
        let statements = split(
            "SET NAMES utf8mb4;\n\
             SET time_zone = '+00:00';\n\
             SET FOREIGN_KEY_CHECKS = 0;\n\
             set sql_mode = 'NO_AUTO_VALUE_ON_ZERO';\n\
             SET autocommit=0;\n\
             SETTINGS_TABLE_IS_NOT_A_SET;\n",
        );
        assert_eq!(
            statements,
            vec![
                "SET FOREIGN_KEY_CHECKS = 0",
                "set sql_mode = 'NO_AUTO_VALUE_ON_ZERO'",
                "SET autocommit=0",
                "SETTINGS_TABLE_IS_NOT_A_SET",
            ]
        );
    }

    #[test]
    fn test_versioned_set_is_not_filtered() {
        assert_eq!(
            split("/*!40101 SET NAMES utf8mb4 */;"),
            vec!["/*!40101 SET NAMES utf8mb4 */"]
        );
    }

    #[test]
    fn test_kinds_and_indexes_follow_input_order() {
        let statements = split_with_chunk(
            "DROP TABLE IF EXISTS `a`;\n\
             CREATE TABLE `a` (id INT);\n\
             LOCK TABLES `a` WRITE;\n\
             INSERT INTO `a` VALUES (1);\n\
             SET FOREIGN_KEY_CHECKS=1;\n\
             UNLOCK TABLES;",
            5,
        );
        let kinds: Vec<StatementKind> = statements.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StatementKind::Ddl,
                StatementKind::Ddl,
                StatementKind::Other,
                StatementKind::Dml,
                StatementKind::SessionSet,
                StatementKind::Other,
            ]
        );
        let indexes: Vec<usize> = statements.iter().map(|s| s.source_index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_multibyte_text_survives_any_chunking() {
        let input = "INSERT INTO t VALUES ('Grüße; 日本語');SELECT 'ok';";
        for chunk in 1..8 {
            let texts: Vec<String> = split_with_chunk(input, chunk)
                .into_iter()
                .map(|s| s.text)
                .collect();
            assert_eq!(texts, vec!["INSERT INTO t VALUES ('Grüße; 日本語')", "SELECT 'ok'"]);
        }
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let mut lexer = Lexer::new();
        let mut out = VecDeque::new();
        let result = lexer.feed(b"SELECT '\xff';", &mut out);
        assert!(matches!(result, Err(TokenizeError::InvalidUtf8 { index: 0 })));
    }

    #[test]
    fn test_state_tracks_open_constructs() {
        let mut lexer = Lexer::new();
        let mut out = VecDeque::new();
        lexer.feed(b"SELECT 'abc", &mut out).unwrap();
        assert_eq!(
            lexer.state(),
            LexState::InString {
                quote: b'\'',
                escaped: false
            }
        );
        lexer.feed(b"'; /*!40000 X", &mut out).unwrap();
        assert_eq!(lexer.state(), LexState::InVersionedComment);
        lexer.feed(b" */; /* c", &mut out).unwrap();
        assert_eq!(lexer.state(), LexState::InBlockComment);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_is_create_table() {
        let statement = |text: &str| DumpStatement {
            kind: StatementKind::classify(text),
            text: text.to_string(),
            source_index: 0,
        };
        assert!(statement("CREATE TABLE `a` (id INT)").is_create_table());
        assert!(statement("create\n  table a (id int)").is_create_table());
        assert!(!statement("CREATE VIEW v AS SELECT 1").is_create_table());
        assert!(!statement("DROP TABLE IF EXISTS `a`").is_create_table());
    }

    #[tokio::test]
    async fn test_statement_stream_over_reader() {
        let dump = "CREATE TABLE t (v TEXT);\nINSERT INTO t VALUES ('a;b'),('c');\nSELECT 1";
        let mut stream = StatementStream::with_chunk_size(dump.as_bytes(), 4);

        let mut texts = Vec::new();
        while let Some(statement) = stream.next_statement().await.unwrap() {
            texts.push(statement.text);
        }
        assert_eq!(
            texts,
            vec![
                "CREATE TABLE t (v TEXT)",
                "INSERT INTO t VALUES ('a;b'),('c')",
                "SELECT 1",
            ]
        );
        // Exhausted streams stay exhausted
        assert!(stream.next_statement().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stream_lets_other_tasks_run_between_chunks() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = {
            let ticks = Arc::clone(&ticks);
            tokio::spawn(async move {
                loop {
                    ticks.fetch_add(1, Ordering::Relaxed);
                    tokio::task::yield_now().await;
                }
            })
        };

        // One statement per chunk; a byte slice never blocks on read
        let dump = "SELECT 1;".repeat(50);
        let mut stream = StatementStream::with_chunk_size(dump.as_bytes(), 9);
        let mut seen = Vec::new();
        while stream.next_statement().await.unwrap().is_some() {
            seen.push(ticks.load(Ordering::Relaxed));
        }
        counter.abort();

        assert_eq!(seen.len(), 50);
        assert!(seen[0] > 0);
        assert!(seen.windows(2).all(|pair| pair[1] > pair[0]), "{seen:?}");
    }

    #[tokio::test]
    async fn test_into_stream_collects_in_order() {
        let dump = "SELECT 1; SELECT 2; SELECT 3;";
        let statements: Vec<DumpStatement> = StatementStream::with_chunk_size(dump.as_bytes(), 3)
            .into_stream()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(statements.len(), 3);
        assert_eq!(statements[2].text, "SELECT 3");
        assert_eq!(statements[2].source_index, 2);
    }
}
