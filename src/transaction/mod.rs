//! Transactions: the schema contract for extracted candidates, the saved
//! record, and the endpoints for confirming and listing them.
//!
//! This module contains:
//! - The closed [Category] set
//! - [TransactionCandidate] and [validate], the contract every piece of model
//!   output or human edit must pass
//! - The persisted [Transaction] and its database functions
//! - The route handlers for `POST /transactions/` and `GET /transactions/`

mod candidate;
mod category;
mod core;
mod create_endpoint;
mod list_endpoint;

pub use candidate::{DEFAULT_CURRENCY, TransactionCandidate, ValidationError, validate};
pub(crate) use candidate::json_type_name;
pub use category::{Category, UnknownCategory};
pub use core::{
    Transaction, create_transaction, create_transaction_table, get_transaction,
    list_transactions, map_transaction_row,
};
pub use create_endpoint::create_transaction_endpoint;
pub use list_endpoint::list_transactions_endpoint;

#[cfg(test)]
pub use core::count_transactions;
