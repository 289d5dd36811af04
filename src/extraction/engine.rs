//! Turns free text or a receipt photo into a validated [TransactionCandidate]
//! with the help of a language model.

use std::{path::PathBuf, sync::Arc};

use crate::{
    Error,
    config::{ModelConfig, RetryPolicy},
    extraction::image::{ImageMediaType, StagedImage},
    llm::{CompletionRequest, Prompt, ProviderError, StructuredCompletionProvider},
    transaction::{Category, TransactionCandidate, validate},
};

/// The system instruction for text input.
///
/// The text model follows natural-language guidance in Russian better than a
/// terse structural instruction, the schema itself travels as the response
/// format.
const TEXT_INSTRUCTION: &str = "Ты финансовый парсер. Твоя задача — извлекать детали одной \
транзакции из текста пользователя: сумму, валюту (если не указана — UAH), категорию, \
краткое описание и продавца. Категория — строго одно из значений: food, transport, \
shopping, entertainment, bills, other. Если описание или продавец не упомянуты, \
оставь эти поля пустыми. Ничего не выдумывай.";

/// The user-side instruction sent alongside a receipt photo.
const IMAGE_USER_INSTRUCTION: &str = "Extract the transaction from this receipt.";

const SCHEMA_NAME: &str = "transaction";

/// The system instruction for receipt photos.
///
/// The vision model needs the output format spelled out explicitly.
fn image_instruction() -> String {
    let categories: Vec<&str> = Category::ALL.iter().map(Category::as_str).collect();

    format!(
        "You are a receipt scanner. Return ONLY a JSON object matching this JSON Schema: {schema}. \
        Use the receipt's grand total as the amount. The category must be exactly one of: {categories}. \
        Put the shop name in merchant and a short summary of the purchased items in description. \
        Do not wrap the JSON in markdown and do not add any text before or after it.",
        schema = TransactionCandidate::json_schema(),
        categories = categories.join(", "),
    )
}

/// Extracts transaction candidates from user input.
///
/// Holds no per-request state, so one extractor is shared by every request.
pub struct TransactionExtractor {
    provider: Arc<dyn StructuredCompletionProvider>,
    text_model: String,
    vision_model: String,
    retry: RetryPolicy,
    temp_dir: Option<PathBuf>,
}

impl TransactionExtractor {
    /// Create an extractor that asks `provider` using the models and retry
    /// policy from `config`.
    pub fn new(provider: Arc<dyn StructuredCompletionProvider>, config: &ModelConfig) -> Self {
        Self {
            provider,
            text_model: config.text_model.clone(),
            vision_model: config.vision_model.clone(),
            retry: config.retry,
            temp_dir: config.temp_dir.clone(),
        }
    }

    /// Extract a transaction from free text, e.g. "Bought coffee for 85 UAH".
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::EmptyInput] if `text` is blank, without asking the model,
    /// - [Error::ModelUnavailable] if the model service cannot be reached,
    /// - or [Error::ExtractionFailed] if no attempt produced a valid transaction.
    #[tracing::instrument(skip(self, text), fields(length = text.len()))]
    pub async fn extract_text(&self, text: &str) -> Result<TransactionCandidate, Error> {
        if text.trim().is_empty() {
            return Err(Error::EmptyInput);
        }

        let request = CompletionRequest {
            model: self.text_model.clone(),
            system: TEXT_INSTRUCTION.to_owned(),
            prompt: Prompt::Text(text.to_owned()),
            schema_name: SCHEMA_NAME.to_owned(),
            schema: TransactionCandidate::json_schema(),
        };

        self.extract(request).await
    }

    /// Extract a transaction from a JPEG or PNG photo of a receipt.
    ///
    /// The image is staged in a temporary file for the duration of the call;
    /// the file is removed before this function returns, whatever the outcome.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::MissingImage] if `bytes` is empty,
    /// - [Error::UnsupportedImage] if `bytes` is neither a JPEG nor a PNG,
    /// - [Error::ImageStaging] if the temporary file cannot be written or read,
    /// - [Error::ModelUnavailable] if the model service cannot be reached,
    /// - or [Error::ExtractionFailed] if no attempt produced a valid transaction.
    #[tracing::instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn extract_image(&self, bytes: &[u8]) -> Result<TransactionCandidate, Error> {
        if bytes.is_empty() {
            return Err(Error::MissingImage);
        }
        let media_type = ImageMediaType::sniff(bytes).ok_or(Error::UnsupportedImage)?;

        let staged = StagedImage::stage(bytes, media_type, self.temp_dir.as_deref())?;
        tracing::debug!("Extracting from staged receipt {:?}", staged.path());

        let request = CompletionRequest {
            model: self.vision_model.clone(),
            system: image_instruction(),
            prompt: Prompt::Image {
                instruction: IMAGE_USER_INSTRUCTION.to_owned(),
                data_uri: staged.data_uri()?,
            },
            schema_name: SCHEMA_NAME.to_owned(),
            schema: TransactionCandidate::json_schema(),
        };

        let result = self.extract(request).await;
        drop(staged);

        result
    }

    /// Ask the model until its answer validates or the attempts run out.
    async fn extract(&self, request: CompletionRequest) -> Result<TransactionCandidate, Error> {
        let attempts = self.retry.attempts();
        let mut schedule = self.retry.schedule();
        let mut last_reason = String::new();
        let mut last_output = String::new();

        for attempt in 1..=attempts {
            if attempt > 1 {
                schedule.wait().await;
            }

            match self.provider.complete(request.clone()).await {
                Ok(raw) => match validate(&raw) {
                    Ok(candidate) => {
                        tracing::info!("Extracted a transaction on attempt {attempt}/{attempts}");
                        return Ok(candidate);
                    }
                    Err(error) => {
                        tracing::warn!(
                            "Attempt {attempt}/{attempts}: model output failed validation: {error}"
                        );
                        last_reason = error.to_string();
                        last_output = raw.to_string();
                    }
                },
                Err(ProviderError::MalformedOutput { raw, reason }) => {
                    tracing::warn!("Attempt {attempt}/{attempts}: malformed model output: {reason}");
                    last_reason = reason;
                    last_output = raw;
                }
                Err(ProviderError::Transport(message)) => {
                    tracing::error!("Attempt {attempt}/{attempts}: model service unavailable: {message}");
                    return Err(Error::ModelUnavailable(message));
                }
            }
        }

        tracing::error!("AI extraction failed after {attempts} attempts, last output: {last_output}");
        Err(Error::ExtractionFailed {
            attempts,
            reason: last_reason,
            last_output,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::{
        Error,
        config::{ModelConfig, RetryPolicy},
        extraction::TransactionExtractor,
        llm::{Prompt, ProviderError},
        test_utils::ScriptedProvider,
        transaction::{Category, TransactionCandidate},
    };

    const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

    fn extractor_with(
        provider: &ScriptedProvider,
        max_attempts: u32,
        temp_dir: Option<&std::path::Path>,
    ) -> TransactionExtractor {
        let config = ModelConfig {
            retry: RetryPolicy::immediate(max_attempts),
            temp_dir: temp_dir.map(|dir| dir.to_path_buf()),
            ..ModelConfig::default()
        };

        TransactionExtractor::new(Arc::new(provider.clone()), &config)
    }

    #[track_caller]
    fn assert_dir_is_empty(dir: &std::path::Path) {
        let entries: Vec<_> = std::fs::read_dir(dir).unwrap().collect();
        assert!(entries.is_empty(), "expected no files left, found {entries:?}");
    }

    #[tokio::test]
    async fn extracts_coffee_purchase_from_text() {
        let provider = ScriptedProvider::repeat(
            json!({"amount": 85, "currency": "UAH", "category": "food", "merchant": "Aroma Kava"}),
            1,
        );
        let extractor = extractor_with(&provider, 3, None);

        let candidate = extractor
            .extract_text("Bought coffee for 85 UAH at Aroma Kava")
            .await
            .unwrap();

        assert_eq!(
            candidate,
            TransactionCandidate::new(85.0, Category::Food).merchant("Aroma Kava")
        );
        let requests = provider.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "llama3.1");
        assert_eq!(
            requests[0].prompt,
            Prompt::Text("Bought coffee for 85 UAH at Aroma Kava".to_owned())
        );
        assert_eq!(requests[0].schema, TransactionCandidate::json_schema());
    }

    #[tokio::test]
    async fn sends_text_to_the_model_verbatim() {
        let provider = ScriptedProvider::repeat(json!({"amount": 40, "category": "transport"}), 1);
        let extractor = extractor_with(&provider, 3, None);
        let text = "  Таксі додому 40 грн\n";

        extractor.extract_text(text).await.unwrap();

        assert_eq!(provider.requests()[0].prompt, Prompt::Text(text.to_owned()));
    }

    #[tokio::test]
    async fn blank_text_is_rejected_without_calling_the_model() {
        let provider = ScriptedProvider::default();
        let extractor = extractor_with(&provider, 3, None);

        let result = extractor.extract_text("   \n\t").await;

        assert_eq!(result, Err(Error::EmptyInput));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn retries_text_until_output_validates() {
        let provider = ScriptedProvider::new(vec![
            ScriptedProvider::malformed("I think it was coffee"),
            Ok(json!({"amount": 85, "category": "coffee"})),
            Ok(json!({"amount": 85, "category": "food"})),
        ]);
        let extractor = extractor_with(&provider, 3, None);

        let candidate = extractor.extract_text("coffee 85").await.unwrap();

        assert_eq!(candidate.category, Category::Food);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn terminal_failure_after_exhausting_attempts() {
        let provider = ScriptedProvider::new(vec![
            Ok(json!({"category": "food"})),
            ScriptedProvider::malformed("not json"),
            Ok(json!({"amount": 85, "category": "drinks"})),
        ]);
        let extractor = extractor_with(&provider, 3, None);

        let result = extractor.extract_text("coffee 85").await;

        match result {
            Err(Error::ExtractionFailed {
                attempts,
                reason,
                last_output,
            }) => {
                assert_eq!(attempts, 3);
                assert!(reason.contains("drinks"), "unexpected reason {reason}");
                assert_eq!(last_output, r#"{"amount":85,"category":"drinks"}"#);
            }
            other => panic!("expected terminal failure, got {other:?}"),
        }
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn respects_configured_attempt_count() {
        let provider = ScriptedProvider::repeat(json!({"amount": "lots", "category": "food"}), 5);
        let extractor = extractor_with(&provider, 1, None);

        let result = extractor.extract_text("coffee").await;

        assert!(matches!(
            result,
            Err(Error::ExtractionFailed { attempts: 1, .. })
        ));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn transport_errors_are_not_retried() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Transport(
            "connection refused".to_owned(),
        ))]);
        let extractor = extractor_with(&provider, 3, None);

        let result = extractor.extract_text("coffee 85").await;

        assert_eq!(
            result,
            Err(Error::ModelUnavailable("connection refused".to_owned()))
        );
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn extracts_from_png_receipt_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::repeat(
            json!({"amount": 420.5, "category": "shopping", "merchant": "Silpo"}),
            1,
        );
        let extractor = extractor_with(&provider, 3, Some(dir.path()));

        let candidate = extractor.extract_image(PNG_BYTES).await.unwrap();

        assert_eq!(
            candidate,
            TransactionCandidate::new(420.5, Category::Shopping).merchant("Silpo")
        );
        let requests = provider.requests();
        assert_eq!(requests[0].model, "llama3.2-vision");
        assert!(requests[0].system.contains("Return ONLY a JSON object"));
        match &requests[0].prompt {
            Prompt::Image { data_uri, .. } => {
                assert!(data_uri.starts_with("data:image/png;base64,"))
            }
            other => panic!("expected an image prompt, got {other:?}"),
        }
        assert_dir_is_empty(dir.path());
    }

    #[tokio::test]
    async fn image_retries_and_cleans_up_after_terminal_failure() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::new(vec![
            ScriptedProvider::malformed("blurry"),
            ScriptedProvider::malformed("still blurry"),
            ScriptedProvider::malformed("cannot read"),
        ]);
        let extractor = extractor_with(&provider, 3, Some(dir.path()));

        let result = extractor.extract_image(PNG_BYTES).await;

        assert!(matches!(
            result,
            Err(Error::ExtractionFailed { attempts: 3, ref last_output, .. }) if last_output == "cannot read"
        ));
        assert_dir_is_empty(dir.path());
    }

    #[tokio::test]
    async fn image_cleans_up_after_transport_failure() {
        let dir = tempfile::tempdir().unwrap();
        let provider = ScriptedProvider::default();
        let extractor = extractor_with(&provider, 3, Some(dir.path()));

        let result = extractor.extract_image(PNG_BYTES).await;

        assert!(matches!(result, Err(Error::ModelUnavailable(_))));
        assert_dir_is_empty(dir.path());
    }

    #[tokio::test]
    async fn rejects_unsupported_and_empty_images() {
        let provider = ScriptedProvider::default();
        let extractor = extractor_with(&provider, 3, None);

        assert_eq!(
            extractor.extract_image(b"GIF89a...").await,
            Err(Error::UnsupportedImage)
        );
        assert_eq!(extractor.extract_image(&[]).await, Err(Error::MissingImage));
        assert_eq!(provider.call_count(), 0);
    }
}
