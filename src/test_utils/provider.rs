use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{CompletionRequest, ProviderError, StructuredCompletionProvider};

/// A provider that replays canned answers in order and records every request.
///
/// Once the script runs out it keeps answering with a transport error, so a
/// test that asks more often than expected fails loudly.
#[derive(Clone, Default)]
pub(crate) struct ScriptedProvider {
    responses: Arc<Mutex<VecDeque<Result<Value, ProviderError>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedProvider {
    pub(crate) fn new(responses: Vec<Result<Value, ProviderError>>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            requests: Arc::default(),
        }
    }

    /// A provider that answers with `value` for the first `times` requests.
    pub(crate) fn repeat(value: Value, times: usize) -> Self {
        Self::new(vec![Ok(value); times])
    }

    pub(crate) fn malformed(raw: &str) -> Result<Value, ProviderError> {
        Err(ProviderError::MalformedOutput {
            raw: raw.to_owned(),
            reason: "not valid JSON".to_owned(),
        })
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl StructuredCompletionProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Value, ProviderError> {
        self.requests.lock().unwrap().push(request);

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Transport("script exhausted".to_owned())))
    }
}
