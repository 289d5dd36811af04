//! Defines the endpoint for asking questions about saved transactions.

use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{FromRef, State},
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::{
    AppState, Error,
    analytics::{QueryProvenance, QuerySynthesizer, Row, execute_read_only},
    db::run_blocking,
};

/// The state needed to answer analytics questions.
#[derive(Clone)]
pub struct AnalyticsState {
    /// The database connection to run queries against.
    pub db_connection: Arc<Mutex<Connection>>,
    /// Translates questions into SQL.
    pub synthesizer: Arc<QuerySynthesizer>,
}

impl FromRef<AppState> for AnalyticsState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            db_connection: state.db_connection.clone(),
            synthesizer: state.synthesizer.clone(),
        }
    }
}

/// The request body for an analytics question.
#[derive(Debug, Deserialize)]
pub struct AskRequest {
    /// A natural-language question, e.g. "How much did I spend on food?".
    pub question: String,
}

/// The answer to an analytics question.
#[derive(Debug, Serialize)]
pub struct AskResponse {
    /// The statement that was executed.
    pub sql: String,
    /// Whether `sql` was generated for the question or is the fallback query.
    pub source: QueryProvenance,
    /// The rows returned by `sql`.
    pub result: Vec<Row>,
}

/// A route handler that translates a question into SQL, runs it read-only
/// and returns both the statement and its rows.
pub async fn ask_endpoint(
    State(state): State<AnalyticsState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, Error> {
    if request.question.trim().is_empty() {
        return Err(Error::EmptyQuestion);
    }

    let query = state.synthesizer.synthesize(&request.question).await;

    let sql = query.sql.clone();
    let result = run_blocking(&state.db_connection, move |connection| {
        execute_read_only(&sql, connection)
    })
    .await?;

    Ok(Json(AskResponse {
        sql: query.sql,
        source: query.provenance,
        result,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::{Router, http::StatusCode, routing::post};
    use axum_test::TestServer;
    use serde_json::{Value, json};

    use crate::{
        analytics::{QuerySynthesizer, ask_endpoint, ask_endpoint::AnalyticsState},
        config::{ModelConfig, RetryPolicy},
        llm::ProviderError,
        test_utils::{ScriptedProvider, get_test_connection},
        transaction::{Category, TransactionCandidate, count_transactions, create_transaction},
    };

    fn get_test_server(provider: &ScriptedProvider) -> (TestServer, AnalyticsState) {
        let config = ModelConfig {
            retry: RetryPolicy::immediate(2),
            ..ModelConfig::default()
        };
        let connection = get_test_connection();
        for candidate in [
            TransactionCandidate::new(85.0, Category::Food).merchant("Aroma Kava"),
            TransactionCandidate::new(120.0, Category::Food),
            TransactionCandidate::new(40.0, Category::Transport),
        ] {
            create_transaction(&candidate, &connection).unwrap();
        }

        let state = AnalyticsState {
            db_connection: Arc::new(Mutex::new(connection)),
            synthesizer: Arc::new(QuerySynthesizer::new(Arc::new(provider.clone()), &config)),
        };
        let app = Router::new()
            .route("/analytics/ask", post(ask_endpoint))
            .with_state(state.clone());

        (
            TestServer::try_new(app).expect("Could not create test server."),
            state,
        )
    }

    #[tokio::test]
    async fn answers_food_spending_question() {
        let provider = ScriptedProvider::repeat(
            json!({"sql": "SELECT SUM(amount) FROM transactions WHERE category = 'food'"}),
            1,
        );
        let (server, _) = get_test_server(&provider);

        let response = server
            .post("/analytics/ask")
            .json(&json!({"question": "How much did I spend on food?"}))
            .await;

        response.assert_status_ok();
        assert_eq!(
            response.json::<Value>(),
            json!({
                "sql": "SELECT SUM(amount) FROM transactions WHERE category = 'food'",
                "source": "generated",
                "result": [{"SUM(amount)": 205.0}]
            })
        );
    }

    #[tokio::test]
    async fn model_failure_runs_fallback_query() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Transport(
            "connection refused".to_owned(),
        ))]);
        let (server, _) = get_test_server(&provider);

        let response = server
            .post("/analytics/ask")
            .json(&json!({"question": "What did I buy?"}))
            .await;

        response.assert_status_ok();
        let body = response.json::<Value>();
        assert_eq!(body["sql"], "SELECT * FROM transactions LIMIT 5");
        assert_eq!(body["source"], "fallback");
        assert_eq!(body["result"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn destructive_sql_is_rejected() {
        let provider = ScriptedProvider::repeat(json!({"sql": "DROP TABLE transactions"}), 1);
        let (server, state) = get_test_server(&provider);

        let response = server
            .post("/analytics/ask")
            .json(&json!({"question": "Delete everything"}))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json::<Value>()["sql"], "DROP TABLE transactions");
        let connection = state.db_connection.lock().unwrap();
        assert_eq!(count_transactions(&connection).unwrap(), 3);
    }

    #[tokio::test]
    async fn broken_sql_is_unprocessable_entity() {
        let provider =
            ScriptedProvider::repeat(json!({"sql": "SELECT price FROM transactions"}), 1);
        let (server, _) = get_test_server(&provider);

        let response = server
            .post("/analytics/ask")
            .json(&json!({"question": "Prices?"}))
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            response.json::<Value>()["sql"],
            "SELECT price FROM transactions"
        );
    }

    #[tokio::test]
    async fn empty_question_is_bad_request() {
        let provider = ScriptedProvider::default();
        let (server, _) = get_test_server(&provider);

        let response = server
            .post("/analytics/ask")
            .json(&json!({"question": "   "}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(provider.call_count(), 0);
    }
}
