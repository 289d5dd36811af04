//! Runs generated SQL against the database, refusing anything that is not a
//! single read-only statement.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use rusqlite::{Batch, Connection, fallible_iterator::FallibleIterator, types::ValueRef};
use serde_json::{Map, Number, Value};

use crate::Error;

/// One result row, keyed by column name in select order.
pub type Row = Map<String, Value>;

const ALLOWED_PREFIXES: [&str; 2] = ["SELECT", "WITH"];

/// Execute `sql` and return every row it produces.
///
/// The statement must start with `SELECT` (or `WITH` for a common table
/// expression) once leading comments are skipped, be the only statement in
/// `sql`, and be reported as read-only by SQLite. Trailing semicolons and
/// comments are allowed.
///
/// Integers and reals are returned as JSON numbers, text as strings, `NULL`
/// as null and blobs as base64 strings.
///
/// # Errors
/// - [Error::QueryRejected] if the statement fails any of the checks above.
/// - [Error::QueryFailed] if SQLite cannot prepare or run the statement.
pub fn execute_read_only(sql: &str, connection: &Connection) -> Result<Vec<Row>, Error> {
    let rejected = |reason: String| {
        tracing::warn!("Rejected query {sql:?}: {reason}");
        Error::QueryRejected {
            sql: sql.to_owned(),
            reason,
        }
    };

    check_first_keyword(sql).map_err(rejected)?;

    let query_failed = |error: rusqlite::Error| {
        tracing::warn!("Query {sql:?} failed: {error}");
        Error::QueryFailed {
            sql: sql.to_owned(),
            reason: error.to_string(),
        }
    };

    let mut batch = Batch::new(connection, sql);
    let mut statement = batch
        .next()
        .map_err(query_failed)?
        .ok_or_else(|| rejected("the query is empty".to_owned()))?;

    // Anything after the first statement other than whitespace, semicolons
    // and comments counts as another statement, even if it does not parse.
    if !matches!(batch.next(), Ok(None)) {
        return Err(rejected(
            "only a single statement may be executed".to_owned(),
        ));
    }

    if !statement.readonly() {
        return Err(rejected(
            "only read-only statements may be executed".to_owned(),
        ));
    }

    let column_names: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(str::to_owned)
        .collect();

    let mut rows = statement.query([]).map_err(query_failed)?;
    let mut result = Vec::new();

    while let Some(row) = rows.next().map_err(query_failed)? {
        let mut values = Map::with_capacity(column_names.len());

        for (index, name) in column_names.iter().enumerate() {
            let value = row.get_ref(index).map_err(query_failed)?;
            values.insert(name.clone(), to_json(value));
        }

        result.push(values);
    }

    tracing::debug!("Query {sql:?} returned {} rows", result.len());

    Ok(result)
}

/// Check that the first keyword of `sql`, after any comments, starts a read.
fn check_first_keyword(sql: &str) -> Result<(), String> {
    let statement_text = skip_leading_comments(sql);

    if statement_text.trim_end_matches(|c: char| c == ';' || c.is_whitespace()).is_empty() {
        return Err("the query is empty".to_owned());
    }

    let first_word = statement_text
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_uppercase();

    if !ALLOWED_PREFIXES.contains(&first_word.as_str()) {
        return Err(format!(
            "only SELECT queries are allowed, got {first_word:?}"
        ));
    }

    Ok(())
}

/// Strip whitespace, `-- line` comments and `/* block */` comments from the
/// start of `sql`.
fn skip_leading_comments(sql: &str) -> &str {
    let mut rest = sql.trim_start();

    loop {
        if let Some(comment) = rest.strip_prefix("--") {
            rest = comment.split_once('\n').map_or("", |(_, after)| after);
        } else if let Some(comment) = rest.strip_prefix("/*") {
            rest = comment.split_once("*/").map_or("", |(_, after)| after);
        } else {
            return rest;
        }

        rest = rest.trim_start();
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(integer) => Value::from(integer),
        ValueRef::Real(real) => Number::from_f64(real).map_or(Value::Null, Value::Number),
        ValueRef::Text(text) => Value::String(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::String(STANDARD.encode(blob)),
    }
}
