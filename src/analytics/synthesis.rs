//! Translates natural-language questions into a single SQL query over the
//! transactions table.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::{
    config::{ModelConfig, RetryPolicy},
    llm::{CompletionRequest, Prompt, ProviderError, StructuredCompletionProvider, strip_code_fence},
};

/// The query returned whenever a question cannot be translated.
pub const FALLBACK_QUERY: &str = "SELECT * FROM transactions LIMIT 5";

/// The only table the model is told about.
const SCHEMA_DESCRIPTION: &str = "\
Table: transactions
Columns:
- id INTEGER PRIMARY KEY
- amount REAL, the amount spent, always positive
- currency TEXT, a currency code such as 'UAH'
- category TEXT, exactly one of 'food', 'transport', 'shopping', 'entertainment', 'bills', 'other'
- description TEXT, may be NULL
- merchant TEXT, may be NULL
- created_at TEXT, an ISO 8601 timestamp in UTC";

const SCHEMA_NAME: &str = "sql_query";

fn system_instruction() -> String {
    format!(
        "You are a SQLite expert. Translate the user's question into exactly one SQLite SELECT \
        statement over this schema:\n{SCHEMA_DESCRIPTION}\n\n\
        Rules:\n\
        - Return the statement in the \"sql\" field only.\n\
        - Do not use markdown, code fences or explanations.\n\
        - Never modify data, only read it.\n\
        - When the question asks how much was spent or for a total, use an aggregate such as \
        SUM(amount), e.g. SELECT SUM(amount) FROM transactions WHERE category = 'food'.\n\
        - Match category values exactly as listed above."
    )
}

fn response_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "sql": {
                "type": "string",
                "description": "A single SQLite SELECT statement"
            }
        },
        "required": ["sql"]
    })
}

#[derive(Debug, Deserialize)]
struct SqlResponse {
    sql: String,
}

/// Where a [SqlQuery] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryProvenance {
    /// The model wrote the query.
    Generated,
    /// The model failed and [FALLBACK_QUERY] was used instead.
    Fallback,
}

/// A synthesized SQL statement, used once and then discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlQuery {
    /// The statement text.
    pub sql: String,
    /// Whether the statement was generated or is the fallback.
    pub provenance: QueryProvenance,
}

impl SqlQuery {
    /// The query used when generation fails.
    pub fn fallback() -> Self {
        Self {
            sql: FALLBACK_QUERY.to_owned(),
            provenance: QueryProvenance::Fallback,
        }
    }
}

/// Translates questions into SQL with a language model.
///
/// Never fails: when the model cannot be reached or keeps answering
/// nonsense, [synthesize](QuerySynthesizer::synthesize) returns
/// [FALLBACK_QUERY].
pub struct QuerySynthesizer {
    provider: Arc<dyn StructuredCompletionProvider>,
    model: String,
    retry: RetryPolicy,
}

impl QuerySynthesizer {
    /// Create a synthesizer that asks `provider` using the SQL model and retry
    /// policy from `config`.
    pub fn new(provider: Arc<dyn StructuredCompletionProvider>, config: &ModelConfig) -> Self {
        Self {
            provider,
            model: config.sql_model.clone(),
            retry: config.retry,
        }
    }

    /// Translate `question` into a single SQL statement.
    #[tracing::instrument(skip(self))]
    pub async fn synthesize(&self, question: &str) -> SqlQuery {
        let question = question.trim();
        if question.is_empty() {
            tracing::warn!("Empty question, using fallback query");
            return SqlQuery::fallback();
        }

        match self.generate(question).await {
            Ok(sql) => {
                tracing::info!("Generated SQL: {sql}");
                SqlQuery {
                    sql,
                    provenance: QueryProvenance::Generated,
                }
            }
            Err(error) => {
                tracing::error!("SQL generation failed, using fallback query: {error}");
                SqlQuery::fallback()
            }
        }
    }

    async fn generate(&self, question: &str) -> Result<String, ProviderError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system: system_instruction(),
            prompt: Prompt::Text(question.to_owned()),
            schema_name: SCHEMA_NAME.to_owned(),
            schema: response_schema(),
        };
        let attempts = self.retry.attempts();
        let mut schedule = self.retry.schedule();
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                schedule.wait().await;
            }

            let result = self
                .provider
                .complete(request.clone())
                .await
                .and_then(parse_sql);

            match result {
                Ok(sql) => return Ok(sql),
                Err(ProviderError::Transport(message)) => {
                    return Err(ProviderError::Transport(message));
                }
                Err(error) => {
                    tracing::warn!("Attempt {attempt}/{attempts}: {error}");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ProviderError::MalformedOutput {
            raw: String::new(),
            reason: "no attempts were made".to_owned(),
        }))
    }
}

fn parse_sql(raw: Value) -> Result<String, ProviderError> {
    let response: SqlResponse =
        serde_json::from_value(raw.clone()).map_err(|error| ProviderError::MalformedOutput {
            raw: raw.to_string(),
            reason: format!("expected an object with a \"sql\" string: {error}"),
        })?;

    let sql = strip_code_fence(&response.sql).trim_end_matches(';').trim();
    if sql.is_empty() {
        return Err(ProviderError::MalformedOutput {
            raw: raw.to_string(),
            reason: "the generated SQL was empty".to_owned(),
        });
    }

    Ok(sql.to_owned())
}
