//! Defines the endpoints that turn user input into a draft transaction.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRef, Multipart, State},
};
use serde::Deserialize;

use crate::{
    AppState, Error, extraction::TransactionExtractor, transaction::TransactionCandidate,
};

/// The multipart field that carries the receipt image.
const IMAGE_FIELD: &str = "file";

/// The state needed to extract transactions.
#[derive(Clone)]
pub struct ExtractionState {
    /// The shared extraction engine.
    pub extractor: Arc<TransactionExtractor>,
}

impl FromRef<AppState> for ExtractionState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            extractor: state.extractor.clone(),
        }
    }
}

/// The request body for analyzing text.
#[derive(Debug, Deserialize)]
pub struct AnalyzeTextRequest {
    /// A free-text description of an expense, in any language.
    pub text: String,
}

/// A route handler that extracts a draft transaction from text.
///
/// The draft is returned to the client and not saved.
pub async fn analyze_text_endpoint(
    State(state): State<ExtractionState>,
    Json(request): Json<AnalyzeTextRequest>,
) -> Result<Json<TransactionCandidate>, Error> {
    tracing::info!("Analyzing text: {:?}", request.text);

    let candidate = state.extractor.extract_text(&request.text).await?;
    tracing::info!("Parsed draft: {candidate:?}");

    Ok(Json(candidate))
}

/// A route handler that extracts a draft transaction from an uploaded receipt
/// photo (multipart field `file`, JPEG or PNG).
///
/// The draft is returned to the client and not saved.
pub async fn analyze_image_endpoint(
    State(state): State<ExtractionState>,
    mut multipart: Multipart,
) -> Result<Json<TransactionCandidate>, Error> {
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(|error| {
        tracing::error!("Could not read multipart form field: {error}");
        Error::MultipartError(error.body_text())
    })? {
        if field.name() != Some(IMAGE_FIELD) {
            tracing::debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }

        tracing::info!(
            "Received receipt {:?} ({:?})",
            field.file_name(),
            field.content_type()
        );
        let bytes = field.bytes().await.map_err(|error| {
            tracing::error!("Could not read data from multipart form field: {error}");
            Error::MultipartError(error.body_text())
        })?;
        image = Some(bytes);
        break;
    }

    let image = image.ok_or(Error::MissingImage)?;
    let candidate = state.extractor.extract_image(&image).await?;
    tracing::info!("Parsed draft from receipt: {candidate:?}");

    Ok(Json(candidate))
}
