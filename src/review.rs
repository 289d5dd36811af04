//! The draft-then-commit workflow between extraction and storage.
//!
//! Model output is never written straight to the database. Extraction produces
//! a [Draft]; a person may edit any field of it any number of times, and only
//! [Draft::confirm] (or [confirm_payload] when the client holds the draft)
//! inserts a row. Every edit and the confirm step go through the same
//! [validate] contract as the model output.

use rusqlite::Connection;
use serde_json::Value;

use crate::{
    Error,
    transaction::{
        Transaction, TransactionCandidate, ValidationError, create_transaction, json_type_name,
        validate,
    },
};

/// An extracted transaction awaiting review. Nothing is saved until it is
/// confirmed.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft {
    candidate: TransactionCandidate,
}

impl Draft {
    /// Start reviewing `candidate`.
    pub fn new(candidate: TransactionCandidate) -> Self {
        Self { candidate }
    }

    /// The current state of the draft.
    pub fn candidate(&self) -> &TransactionCandidate {
        &self.candidate
    }

    /// Apply a partial edit, e.g. `{"category": "transport"}`.
    ///
    /// Fields in `changes` replace the draft's fields, a `null` clears an
    /// optional field. The merged result must pass [validate]; if it does not,
    /// the draft is left exactly as it was.
    ///
    /// # Errors
    /// Returns a [ValidationError] if `changes` is not an object or the edited
    /// draft breaks the schema.
    pub fn edit(&mut self, changes: &Value) -> Result<(), ValidationError> {
        let Value::Object(changes) = changes else {
            return Err(ValidationError::NotAnObject(json_type_name(changes)));
        };

        let mut merged = self.candidate.to_json();
        if let Value::Object(fields) = &mut merged {
            for (field, value) in changes {
                fields.insert(field.clone(), value.clone());
            }
        }

        self.candidate = validate(&merged)?;

        Ok(())
    }

    /// Save the draft as a transaction.
    ///
    /// # Errors
    /// Returns [Error::InvalidTransaction] if the draft no longer validates, or
    /// [Error::SqlError] if the insert fails.
    pub fn confirm(self, connection: &Connection) -> Result<Transaction, Error> {
        confirm_payload(&self.candidate.to_json(), connection)
    }

    /// Throw the draft away without saving anything.
    pub fn discard(self) {
        tracing::debug!("Discarded draft: {:?}", self.candidate);
    }
}

impl From<TransactionCandidate> for Draft {
    fn from(candidate: TransactionCandidate) -> Self {
        Self::new(candidate)
    }
}

/// Validate a (possibly edited) draft sent back by a client and save it.
///
/// Performs exactly one insert. Nothing is written if validation fails.
///
/// # Errors
/// Returns [Error::InvalidTransaction] if `raw` breaks the schema, or
/// [Error::SqlError] if the insert fails.
pub fn confirm_payload(raw: &Value, connection: &Connection) -> Result<Transaction, Error> {
    let candidate = validate(raw).map_err(Error::InvalidTransaction)?;

    let transaction = create_transaction(&candidate, connection)?;
    tracing::info!(
        "Saved transaction {} ({} {} on {})",
        transaction.id,
        transaction.amount,
        transaction.currency,
        transaction.category
    );

    Ok(transaction)
}
