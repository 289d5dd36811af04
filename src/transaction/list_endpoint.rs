//! Defines the endpoint for listing saved transactions.

use axum::{Json, extract::State};

use crate::{
    Error,
    db::run_blocking,
    transaction::{Transaction, create_endpoint::CreateTransactionState, list_transactions},
};

/// A route handler that returns every saved transaction, newest first.
pub async fn list_transactions_endpoint(
    State(state): State<CreateTransactionState>,
) -> Result<Json<Vec<Transaction>>, Error> {
    run_blocking(&state.db_connection, list_transactions)
        .await
        .map(Json)
}
