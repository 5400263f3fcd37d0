//! Statement classification by leading keyword.
//!
//! Classification decides what result metadata the layer collects after a
//! statement runs. It is a prefix check only: case-insensitive, ignoring
//! leading whitespace, requiring whitespace after the keyword. It is not
//! a SQL parser.

use serde::{Deserialize, Serialize};

/// How a statement is treated for result collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryClass {
    /// CREATE / ALTER / TRUNCATE / DROP: raw result, no row data
    Ddl,
    /// INSERT / DELETE / UPDATE / REPLACE: affected rows, insert id
    Write,
    /// SELECT: full row materialization
    Read,
    /// Everything else: no metadata beyond success/failure
    Other,
}

const DDL_KEYWORDS: [&str; 4] = ["create", "alter", "truncate", "drop"];
const WRITE_KEYWORDS: [&str; 4] = ["insert", "delete", "update", "replace"];

/// True when `sql` starts (after whitespace) with `keyword` followed by
/// more whitespace.
fn leading_keyword(sql: &str, keyword: &str) -> bool {
    let rest = sql.trim_start().as_bytes();
    let kw = keyword.as_bytes();
    if rest.len() <= kw.len() {
        return false;
    }
    rest[..kw.len()].eq_ignore_ascii_case(kw) && rest[kw.len()].is_ascii_whitespace()
}

/// Classify a statement by its leading keyword.
pub fn classify(sql: &str) -> QueryClass {
    if DDL_KEYWORDS.iter().any(|kw| leading_keyword(sql, kw)) {
        return QueryClass::Ddl;
    }
    if WRITE_KEYWORDS.iter().any(|kw| leading_keyword(sql, kw)) {
        return QueryClass::Write;
    }
    if leading_keyword(sql, "select") {
        return QueryClass::Read;
    }
    QueryClass::Other
}

/// True for statements whose last-insert-id must be tracked.
pub fn is_insert_or_replace(sql: &str) -> bool {
    leading_keyword(sql, "insert") || leading_keyword(sql, "replace")
}
