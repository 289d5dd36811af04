//! SmartWallet turns free text and receipt photos into expense records with
//! the help of a language model.
//!
//! The model's output is treated as a draft: it is validated against a fixed
//! schema, shown to a person for review, and only saved once confirmed.
//! Saved expenses can then be queried with natural-language questions, which
//! the model translates into read-only SQL.
//!
//! This library provides a JSON REST API for all of the above.

#![warn(missing_docs)]

use std::{net::SocketAddr, time::Duration};

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_server::Handle;
use serde_json::json;
use tokio::signal;

mod analytics;
mod app_state;
mod config;
mod database_id;
mod db;
mod endpoints;
mod extraction;
mod llm;
mod logging;
mod review;
mod routing;
mod transaction;

#[cfg(test)]
mod test_utils;

pub use analytics::{
    FALLBACK_QUERY, QueryProvenance, QuerySynthesizer, Row, SqlQuery, execute_read_only,
};
pub use app_state::AppState;
pub use config::{ModelConfig, RetryPolicy};
pub use database_id::{DatabaseId, TransactionId};
pub use db::initialize as initialize_db;
pub use extraction::{ImageMediaType, TransactionExtractor};
pub use llm::{
    CompletionRequest, OpenAiCompatibleProvider, Prompt, ProviderError,
    StructuredCompletionProvider,
};
pub use logging::{LOG_BODY_LENGTH_LIMIT, logging_middleware};
pub use review::{Draft, confirm_payload};
pub use routing::build_router;
pub use transaction::{
    Category, DEFAULT_CURRENCY, Transaction, TransactionCandidate, ValidationError, validate,
};

/// An async task that waits for either the ctrl+c or terminate signal, whichever comes first, and
/// then signals the server to shut down gracefully.
///
/// `handle` is a handle to an Axum `Server`.
pub async fn graceful_shutdown(handle: Handle<SocketAddr>) {
    let ctrl_c = async {
        if let Err(error) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!("failed to install signal handler: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::debug!("Received ctrl+c signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
        _ = terminate => {
            tracing::debug!("Received terminate signal.");
            handle.graceful_shutdown(Some(Duration::from_secs(1)));
        },
    }
}

/// The errors that may occur in the application.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// A transaction, either from the model or from a client, does not match
    /// the transaction schema.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(ValidationError),

    /// The text to analyze was empty or only whitespace.
    #[error("the text to analyze cannot be empty")]
    EmptyInput,

    /// The analytics question was empty or only whitespace.
    #[error("the question cannot be empty")]
    EmptyQuestion,

    /// The multipart form could not be parsed.
    #[error("could not parse multipart form: {0}")]
    MultipartError(String),

    /// The request body is larger than the configured upload limit.
    #[error("the request body is larger than the limit of {limit} bytes")]
    PayloadTooLarge {
        /// The largest accepted body, in bytes.
        limit: usize,
    },

    /// The multipart form did not contain an image, or the image was empty.
    #[error("no image was uploaded, expected a JPEG or PNG in the \"file\" field")]
    MissingImage,

    /// The uploaded file is neither a JPEG nor a PNG.
    #[error("unsupported image type, expected a JPEG or PNG")]
    UnsupportedImage,

    /// The uploaded image could not be written to or read back from its
    /// temporary file.
    ///
    /// The error string should only be logged for debugging on the server.
    #[error("could not stage the uploaded image: {0}")]
    ImageStaging(String),

    /// The model never produced a valid transaction within the retry budget.
    ///
    /// `last_output` holds the raw text of the final attempt for diagnostics.
    #[error("AI extraction failed after {attempts} attempts: {reason}")]
    ExtractionFailed {
        /// How many times the model was asked.
        attempts: u32,
        /// Why the final attempt was rejected.
        reason: String,
        /// The raw model output of the final attempt.
        last_output: String,
    },

    /// The language model service could not be reached or returned an error
    /// status.
    #[error("the language model service is unavailable: {0}")]
    ModelUnavailable(String),

    /// A generated SQL statement was refused before being executed, e.g.
    /// because it could modify the database.
    #[error("the generated query was rejected: {reason}")]
    QueryRejected {
        /// The refused statement.
        sql: String,
        /// Why it was refused.
        reason: String,
    },

    /// A generated SQL statement could not be executed, e.g. because it is
    /// malformed or refers to a missing column.
    #[error("the generated query could not be executed: {reason}")]
    QueryFailed {
        /// The failing statement.
        sql: String,
        /// The error reported by the database.
        reason: String,
    },

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// Could not acquire the database lock
    #[error("could not acquire the database lock")]
    DatabaseLockError,

    /// A blocking database task panicked or was cancelled.
    #[error("a background task failed: {0}")]
    TaskFailed(String),
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}

impl From<ValidationError> for Error {
    fn from(value: ValidationError) -> Self {
        Error::InvalidTransaction(value)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let message = self.to_string();

        match self {
            Error::InvalidTransaction(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": message })))
                    .into_response()
            }
            Error::EmptyInput
            | Error::EmptyQuestion
            | Error::MultipartError(_)
            | Error::MissingImage => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            Error::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, Json(json!({ "error": message }))).into_response()
            }
            Error::UnsupportedImage => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                Json(json!({ "error": message })),
            )
                .into_response(),
            Error::ExtractionFailed {
                attempts,
                reason,
                last_output,
            } => (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "AI extraction failed",
                    "attempts": attempts,
                    "reason": reason,
                    "raw_output": last_output,
                })),
            )
                .into_response(),
            Error::ModelUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": message })),
            )
                .into_response(),
            Error::QueryRejected { ref sql, .. } | Error::QueryFailed { ref sql, .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": message, "sql": sql })),
            )
                .into_response(),
            Error::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
            }
            // Any errors that are not handled above are not intended to be shown to the client.
            error => {
                tracing::error!("An unexpected error occurred: {}", error);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "An unexpected error occurred, check the server logs for more details."
                    })),
                )
                    .into_response()
            }
        }
    }
}
