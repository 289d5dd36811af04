//! Defines the endpoint for confirming a reviewed draft as a new transaction.
use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;
use serde_json::Value;

use crate::{AppState, Error, db::run_blocking, review::confirm_payload, transaction::Transaction};

/// The state needed to create a transaction.
#[derive(Debug, Clone)]
pub struct CreateTransactionState {
    /// The database connection for managing transactions.
    pub db_connection: Arc<Mutex<Connection>>,
}

impl FromRef<AppState> for CreateTransactionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
        }
    }
}

/// A route handler for saving a reviewed draft, responds with the saved
/// transaction.
///
/// The body is taken as raw JSON so that it goes through the same validation
/// as model output, and a bad field produces a 422 with the reason instead of
/// a generic deserialization error.
pub async fn create_transaction_endpoint(
    State(state): State<CreateTransactionState>,
    Json(draft): Json<Value>,
) -> Result<Json<Transaction>, Error> {
    run_blocking(&state.db_connection, move |connection| {
        confirm_payload(&draft, connection)
    })
    .await
    .map(Json)
}
