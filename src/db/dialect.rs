//! Translation of MySQL-style query templates into each engine's native form.
//!
//! Templates use `?` positional placeholders and MySQL's `NOW()`. MySQL runs
//! them as-is; SQL Server needs `@P1..@PN` parameters, `GETDATE()` and an
//! explicit identity fetch after inserts.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::QueryError;
use super::value::Value;

/// Relational engine selected once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    #[serde(alias = "mariadb")]
    MySql,
    #[serde(alias = "sqlserver")]
    MsSql,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::MySql => "mysql",
            Engine::MsSql => "mssql",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Engine::MySql => 3306,
            Engine::MsSql => 1433,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Produces a row set.
    Read,
    /// `INSERT INTO ...`; reports affected rows and the generated identity.
    Insert,
    /// Any other mutating statement; reports affected rows.
    Write,
}

/// Appended to SQL Server inserts so the identity is read in the same batch.
pub const MSSQL_IDENTITY_SUFFIX: &str = "; SELECT CAST(@@ROWCOUNT AS BIGINT) AS affected_rows, \
     CAST(SCOPE_IDENTITY() AS BIGINT) AS insert_id";

const READ_KEYWORDS: &[&str] = &["SELECT", "WITH", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "VALUES"];

/// A template bound to its parameters and rewritten for one engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// The caller's original template, kept for diagnostics.
    pub template: String,
    /// Engine-native SQL sent to the driver.
    pub sql: String,
    pub params: Vec<Value>,
    pub kind: StatementKind,
}

impl Statement {
    /// Translate `template` for `engine` and bind `params` positionally.
    ///
    /// Fails before any I/O when the placeholder count differs from `params.len()`.
    pub fn prepare(
        engine: Engine,
        template: &str,
        params: Vec<Value>,
    ) -> Result<Self, QueryError> {
        let kind = classify(template);
        let rewritten = rewrite(engine, template);
        if rewritten.placeholders != params.len() {
            return Err(QueryError::ParamCountMismatch {
                expected: rewritten.placeholders,
                got: params.len(),
                sql: template.to_string(),
            });
        }

        let mut sql = rewritten.sql;
        if engine == Engine::MsSql && kind == StatementKind::Insert {
            if rewritten.ends_in_line_comment {
                sql.push('\n');
            } else {
                let trimmed_len = sql.trim_end().trim_end_matches(';').trim_end().len();
                sql.truncate(trimmed_len);
            }
            sql.push_str(MSSQL_IDENTITY_SUFFIX);
        }

        Ok(Self {
            template: template.to_string(),
            sql,
            params,
            kind,
        })
    }
}

/// Classify by the first keyword, skipping whitespace, comments and `(`.
pub fn classify(sql: &str) -> StatementKind {
    let mut rest = sql;
    loop {
        let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == '(');
        if let Some(after) = trimmed.strip_prefix("--") {
            rest = after.split_once('\n').map(|(_, tail)| tail).unwrap_or("");
        } else if let Some(after) = trimmed.strip_prefix("/*") {
            rest = after.split_once("*/").map(|(_, tail)| tail).unwrap_or("");
        } else {
            rest = trimmed;
            break;
        }
    }

    let mut words = rest.split_whitespace();
    let first = words.next().unwrap_or("");
    if first.eq_ignore_ascii_case("INSERT")
        && words.next().is_some_and(|w| w.eq_ignore_ascii_case("INTO"))
    {
        return StatementKind::Insert;
    }

    let keyword: String = first
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if READ_KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(&keyword)) {
        StatementKind::Read
    } else {
        StatementKind::Write
    }
}

/// Number of `?` placeholders outside literals, quoted identifiers and comments.
pub fn count_placeholders(sql: &str) -> usize {
    rewrite(Engine::MySql, sql).placeholders
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewritten {
    pub sql: String,
    pub placeholders: usize,
    /// The text ends inside a `--` comment, so anything appended on the same
    /// line would be commented out.
    pub ends_in_line_comment: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Scan {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Rewrite placeholders and the timestamp function for `engine`.
///
/// For MySQL the text is returned unchanged and only the placeholders are
/// counted.
pub fn rewrite(engine: Engine, sql: &str) -> Rewritten {
    let chars: Vec<char> = sql.chars().collect();
    let mut out = String::with_capacity(sql.len() + 16);
    let mut placeholders = 0usize;
    let mut state = Scan::Code;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match state {
            Scan::Code => match c {
                '?' => {
                    placeholders += 1;
                    match engine {
                        Engine::MySql => out.push('?'),
                        Engine::MsSql => {
                            out.push_str("@P");
                            out.push_str(&placeholders.to_string());
                        }
                    }
                }
                '\'' | '"' | '`' => {
                    state = Scan::Quoted(c);
                    out.push(c);
                }
                '[' if engine == Engine::MsSql => {
                    state = Scan::Quoted(']');
                    out.push(c);
                }
                '-' if next == Some('-') => {
                    state = Scan::LineComment;
                    out.push_str("--");
                    i += 1;
                }
                '/' if next == Some('*') => {
                    state = Scan::BlockComment;
                    out.push_str("/*");
                    i += 1;
                }
                'n' | 'N' if engine == Engine::MsSql => match now_call_len(&chars, i) {
                    Some(len) => {
                        out.push_str("GETDATE()");
                        i += len;
                        continue;
                    }
                    None => out.push(c),
                },
                _ => out.push(c),
            },
            Scan::Quoted(close) => {
                out.push(c);
                if c == '\\' && close != ']' && close != '`' {
                    if let Some(escaped) = next {
                        out.push(escaped);
                        i += 1;
                    }
                } else if c == close {
                    if next == Some(close) {
                        // doubled delimiter stays inside the literal
                        out.push(close);
                        i += 1;
                    } else {
                        state = Scan::Code;
                    }
                }
            }
            Scan::LineComment => {
                out.push(c);
                if c == '\n' {
                    state = Scan::Code;
                }
            }
            Scan::BlockComment => {
                if c == '*' && next == Some('/') {
                    out.push_str("*/");
                    i += 1;
                    state = Scan::Code;
                } else {
                    out.push(c);
                }
            }
        }
        i += 1;
    }

    Rewritten {
        sql: out,
        placeholders,
        ends_in_line_comment: state == Scan::LineComment,
    }
}

/// Length of a `NOW ( )` call starting at `start`, if one is there.
fn now_call_len(chars: &[char], start: usize) -> Option<usize> {
    let is_ident = |c: char| c.is_alphanumeric() || c == '_' || c == '@' || c == '$' || c == '.';
    if start > 0 && is_ident(chars[start - 1]) {
        return None;
    }

    let word: String = chars.get(start..start + 3)?.iter().collect();
    if !word.eq_ignore_ascii_case("now") {
        return None;
    }

    let skip_ws = |mut i: usize| {
        while chars.get(i).is_some_and(|c| c.is_whitespace()) {
            i += 1;
        }
        i
    };
    let mut i = skip_ws(start + 3);
    if chars.get(i) != Some(&'(') {
        return None;
    }
    i = skip_ws(i + 1);
    if chars.get(i) != Some(&')') {
        return None;
    }
    Some(i + 1 - start)
}
