//! The capability the engines need from a language model: answer a prompt
//! with an object that follows a given JSON Schema.

use async_trait::async_trait;
use serde_json::Value;

/// A request for a schema-constrained completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// The model to ask.
    pub model: String,
    /// The system instruction.
    pub system: String,
    /// The user message.
    pub prompt: Prompt,
    /// A short identifier for the schema, e.g. "transaction".
    pub schema_name: String,
    /// The JSON Schema the answer must follow.
    pub schema: Value,
}

/// The user's part of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    /// Plain text, passed to the model verbatim.
    Text(String),
    /// An image with an accompanying instruction.
    Image {
        /// Text sent alongside the image.
        instruction: String,
        /// The image encoded as a `data:` URI.
        data_uri: String,
    },
}

/// Why a completion did not produce a usable object.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProviderError {
    /// The service could not be reached, timed out or answered with an error
    /// status. Asking again immediately is unlikely to help.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered, but the answer was not a JSON object.
    #[error("malformed model output: {reason}")]
    MalformedOutput {
        /// The raw text the model produced.
        raw: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Something that can produce structured completions, e.g. an
/// OpenAI-compatible HTTP API.
///
/// The returned value is only guaranteed to be JSON; callers must still check
/// it against their own schema because models do not always comply.
#[async_trait]
pub trait StructuredCompletionProvider: Send + Sync {
    /// Ask the model and return its answer as JSON.
    async fn complete(&self, request: CompletionRequest) -> Result<Value, ProviderError>;
}
