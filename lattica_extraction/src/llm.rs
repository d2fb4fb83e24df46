//! HTTP client for the LLM collaborator.
//!
//! The engine treats the LLM as an injected collaborator with a narrow
//! contract: system + user prompt in, raw text out. It is used for relation
//! extraction, planner intent fallback, and answer synthesis; every caller
//! has a rule-based path when the collaborator is absent or disabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lattica_core::{EngineError, EngineResult};

use crate::LlmCollaborator;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    system: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    text: String,
}

/// HTTP client against the configured LLM collaborator URL.
///
/// POSTs `{"system": ..., "prompt": ...}` with an optional bearer token and
/// expects `{"text": ...}`.
pub struct HttpLlmCollaborator {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HttpLlmCollaborator {
    /// Create a client against the collaborator URL.
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            api_key,
        }
    }
}

#[async_trait]
impl LlmCollaborator for HttpLlmCollaborator {
    async fn complete(&self, system: &str, prompt: &str) -> EngineResult<String> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&CompletionRequest { system, prompt });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| EngineError::TransientDependency(format!("llm collaborator: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(EngineError::PermanentDependency(format!(
                "llm collaborator rejected credentials ({status})"
            )));
        }
        if !status.is_success() {
            return Err(EngineError::TransientDependency(format!(
                "llm collaborator returned {status}"
            )));
        }
        let body: CompletionResponse = response
            .json()
            .await
            .map_err(|e| EngineError::PermanentDependency(format!("llm response: {e}")))?;
        Ok(body.text)
    }
}
