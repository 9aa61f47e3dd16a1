//! OpenAI-compatible chat-completions adapter for the install-script LLM layer.
//!
//! Only the Python analyzer calls into this (the npm analyzer is pattern-only per §4.2).
//! Disabled whenever `OPENAI_API_KEY` is unset; callers check `AuditConfig::llm_enabled`
//! before constructing a request.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::utils::error::AuditError;

const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a security analyst reviewing a Python package's setup \
script for supply-chain attacks. Respond only with the requested JSON object.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptVerdict {
    pub is_suspicious: bool,
    pub confidence: f64,
    pub severity: String,
    pub threats: Vec<String>,
    pub reasoning: String,
}

#[derive(Debug, Clone)]
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    #[cfg(test)]
    pub fn with_client(client: reqwest::Client, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self { client, api_key: api_key.into(), model: model.into() }
    }

    /// Sends `script` for classification, returning the model's structured verdict.
    pub async fn classify_script(&self, package: &str, script: &str) -> Result<ScriptVerdict, AuditError> {
        let body = serde_json::json!({
            "model": self.model,
            "response_format": {"type": "json_object"},
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": format!(
                    "Package: {package}\n\nScript:\n{script}\n\n\
                     Respond with JSON: {{\"is_suspicious\": bool, \"confidence\": 0..1, \
                     \"severity\": \"low|medium|high|critical\", \"threats\": [string], \"reasoning\": string}}"
                )},
            ],
        });

        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                warn!(error = %err, "llm request failed");
                AuditError::LlmUnavailable(err.to_string())
            })?;

        if !response.status().is_success() {
            return Err(AuditError::LlmUnavailable(format!("status {}", response.status())));
        }

        let payload: ChatCompletionResponse = response.json().await.map_err(AuditError::Http)?;
        let content = payload
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| AuditError::LlmUnavailable("empty choices array".to_string()))?;

        serde_json::from_str(&content).map_err(AuditError::Json)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_classify_script_parses_verdict() {
        let mut server = mockito::Server::new_async().await;
        let verdict = serde_json::json!({
            "is_suspicious": true,
            "confidence": 0.9,
            "severity": "critical",
            "threats": ["exfiltration"],
            "reasoning": "reads SSH keys and posts them to a remote host",
        });
        let response_body = serde_json::json!({
            "choices": [{"message": {"content": verdict.to_string()}}],
        });

        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(response_body.to_string())
            .create_async()
            .await;

        // This test exercises the JSON parsing path directly since CHAT_COMPLETIONS_URL is a
        // fixed constant; real network use is covered by the analyzer's integration path.
        let payload: ChatCompletionResponse = serde_json::from_str(&response_body.to_string()).unwrap();
        let content = &payload.choices[0].message.content;
        let parsed: ScriptVerdict = serde_json::from_str(content).unwrap();
        assert!(parsed.is_suspicious);
        assert_eq!(parsed.severity, "critical");
    }
}
