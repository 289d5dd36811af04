//! Defines the core data model and database queries for saved transactions.

use rusqlite::{Connection, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    Error,
    database_id::TransactionId,
    transaction::{Category, TransactionCandidate},
};

// ============================================================================
// MODELS
// ============================================================================

/// A confirmed expense that has been saved to the database.
///
/// Transactions are never updated or deleted once created. To create one,
/// confirm a [TransactionCandidate] with [create_transaction].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// The ID of the transaction, assigned by the database.
    pub id: TransactionId,
    /// How much was spent.
    pub amount: f64,
    /// A short currency code such as "UAH".
    pub currency: String,
    /// What the money was spent on.
    pub category: Category,
    /// A short free-text description.
    pub description: Option<String>,
    /// Where the money was spent.
    pub merchant: Option<String>,
    /// When the transaction was saved, in UTC.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Transaction {
    /// The user-editable fields of the transaction, without the ID and timestamp.
    pub fn candidate(&self) -> TransactionCandidate {
        TransactionCandidate {
            amount: self.amount,
            currency: self.currency.clone(),
            category: self.category,
            description: self.description.clone(),
            merchant: self.merchant.clone(),
        }
    }
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Save a candidate as a new transaction.
///
/// The ID and `created_at` timestamp are assigned here, the caller cannot
/// choose them.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn create_transaction(
    candidate: &TransactionCandidate,
    connection: &Connection,
) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "INSERT INTO transactions (amount, currency, category, description, merchant, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id, amount, currency, category, description, merchant, created_at",
        )?
        .query_row(
            (
                candidate.amount,
                &candidate.currency,
                candidate.category,
                &candidate.description,
                &candidate.merchant,
                OffsetDateTime::now_utc(),
            ),
            map_transaction_row,
        )?;

    Ok(transaction)
}

/// Retrieve a transaction from the database by its `id`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if `id` does not refer to a valid transaction,
/// - or [Error::SqlError] there is some other SQL error.
pub fn get_transaction(id: TransactionId, connection: &Connection) -> Result<Transaction, Error> {
    let transaction = connection
        .prepare(
            "SELECT id, amount, currency, category, description, merchant, created_at
             FROM transactions WHERE id = :id",
        )?
        .query_row(&[(":id", &id)], map_transaction_row)?;

    Ok(transaction)
}

/// Get every transaction, newest first (by ID, descending).
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
pub fn list_transactions(connection: &Connection) -> Result<Vec<Transaction>, Error> {
    connection
        .prepare(
            "SELECT id, amount, currency, category, description, merchant, created_at
             FROM transactions ORDER BY id DESC",
        )?
        .query_map([], map_transaction_row)?
        .map(|transaction_result| transaction_result.map_err(Error::from))
        .collect()
}

/// Get the total number of transactions in the database.
///
/// # Errors
/// This function will return a [Error::SqlError] there is some SQL error.
#[cfg(test)]
pub fn count_transactions(connection: &Connection) -> Result<u32, Error> {
    connection
        .query_row("SELECT COUNT(id) FROM transactions;", [], |row| row.get(0))
        .map_err(|error| error.into())
}

/// Create the transaction table in the database.
///
/// # Errors
/// Returns an error if the table cannot be created or if there is an SQL error.
pub fn create_transaction_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                amount REAL NOT NULL,
                currency TEXT NOT NULL DEFAULT 'UAH',
                category TEXT NOT NULL CHECK (category IN
                    ('food', 'transport', 'shopping', 'entertainment', 'bills', 'other')),
                description TEXT,
                merchant TEXT,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    // Category totals are the most common analytics question.
    connection.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category);",
        (),
    )?;

    Ok(())
}

/// Map a database row to a Transaction.
pub fn map_transaction_row(row: &Row) -> Result<Transaction, rusqlite::Error> {
    let id = row.get(0)?;
    let amount = row.get(1)?;
    let currency = row.get(2)?;
    let category = row.get(3)?;
    let description = row.get(4)?;
    let merchant = row.get(5)?;
    let created_at = row.get(6)?;

    Ok(Transaction {
        id,
        amount,
        currency,
        category,
        description,
        merchant,
        created_at,
    })
}

// ============================================================================
// TESTS
// ============================================================================
