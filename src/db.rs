//! Sets up the application's SQLite database.

use std::sync::{Arc, Mutex};

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{Error, transaction::create_transaction_table};

/// Create the tables for the domain models if they do not exist yet.
///
/// Safe to call on every start-up: an already initialised database is left
/// untouched.
///
/// # Errors
/// Returns an error if a table cannot be created or if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), rusqlite::Error> {
    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_transaction_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}

/// Run `operation` with the shared connection on the blocking thread pool.
///
/// Waiting for the lock and running SQLite both block, so neither may happen
/// on an async worker thread.
///
/// # Errors
/// Returns [Error::DatabaseLockError] if the lock is poisoned,
/// [Error::TaskFailed] if the task panics, or the error from `operation`.
pub(crate) async fn run_blocking<T, F>(
    db_connection: &Arc<Mutex<Connection>>,
    operation: F,
) -> Result<T, Error>
where
    F: FnOnce(&Connection) -> Result<T, Error> + Send + 'static,
    T: Send + 'static,
{
    let db_connection = db_connection.clone();

    tokio::task::spawn_blocking(move || {
        let connection = db_connection.lock().map_err(|error| {
            tracing::error!("could not acquire database lock: {error}");
            Error::DatabaseLockError
        })?;

        operation(&connection)
    })
    .await
    .map_err(|error| {
        tracing::error!("database task failed: {error}");
        Error::TaskFailed(error.to_string())
    })?
}
