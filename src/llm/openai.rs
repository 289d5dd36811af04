//! A [StructuredCompletionProvider] for OpenAI-compatible chat completion
//! APIs, such as OpenAI itself or a local Ollama server.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::ModelConfig,
    llm::{CompletionRequest, Prompt, ProviderError, StructuredCompletionProvider, strip_code_fence},
};

/// Talks to `{base_url}/chat/completions` with a JSON Schema response format.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatibleProvider {
    /// Create a provider from the model settings.
    ///
    /// The underlying HTTP client is created once and reused for every request.
    ///
    /// # Errors
    /// Returns [ProviderError::Transport] if the HTTP client cannot be built.
    pub fn new(config: &ModelConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|error| ProviderError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat<'a>,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a Value,
    strict: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn build_messages(request: &CompletionRequest) -> Vec<ChatMessage> {
    let user_content = match &request.prompt {
        Prompt::Text(text) => MessageContent::Text(text.clone()),
        Prompt::Image {
            instruction,
            data_uri,
        } => MessageContent::Parts(vec![
            ContentPart::Text {
                text: instruction.clone(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: data_uri.clone(),
                },
            },
        ]),
    };

    vec![
        ChatMessage {
            role: "system",
            content: MessageContent::Text(request.system.clone()),
        },
        ChatMessage {
            role: "user",
            content: user_content,
        },
    ]
}

/// Pull the JSON object out of the text of a chat completion.
fn parse_content(content: &str) -> Result<Value, ProviderError> {
    let json_text = strip_code_fence(content);

    let value: Value =
        serde_json::from_str(json_text).map_err(|error| ProviderError::MalformedOutput {
            raw: content.to_owned(),
            reason: format!("not valid JSON: {error}"),
        })?;

    if !value.is_object() {
        return Err(ProviderError::MalformedOutput {
            raw: content.to_owned(),
            reason: "expected a JSON object".to_owned(),
        });
    }

    Ok(value)
}

#[async_trait]
impl StructuredCompletionProvider for OpenAiCompatibleProvider {
    #[tracing::instrument(skip(self, request), fields(model = %request.model, schema = %request.schema_name))]
    async fn complete(&self, request: CompletionRequest) -> Result<Value, ProviderError> {
        let body = ChatRequest {
            model: &request.model,
            messages: build_messages(&request),
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &request.schema_name,
                    schema: &request.schema,
                    strict: false,
                },
            },
            temperature: 0.0,
            stream: false,
        };

        tracing::debug!("Sending completion request");
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|error| {
                tracing::error!("Network error calling the model service: {error}");
                ProviderError::Transport(error.to_string())
            })?;

        let status = response.status();
        let response_text = response.text().await.map_err(|error| {
            tracing::error!("Failed to read the model service response: {error}");
            ProviderError::Transport(error.to_string())
        })?;

        if !status.is_success() {
            tracing::error!("Model service error - Status: {status}, Body: {response_text}");
            return Err(ProviderError::Transport(format!(
                "the model service returned {status}"
            )));
        }

        let chat_response: ChatResponse =
            serde_json::from_str(&response_text).map_err(|error| {
                ProviderError::MalformedOutput {
                    raw: response_text.clone(),
                    reason: format!("unexpected response shape: {error}"),
                }
            })?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::MalformedOutput {
                raw: response_text.clone(),
                reason: "the response contained no message content".to_owned(),
            })?;

        tracing::debug!("Received {} characters of model output", content.len());
        parse_content(&content)
    }
}
