//! Client for the OpenRouter chat-completions API (any OpenAI-compatible endpoint works).
//!
//! One request per call: no retry, no backoff. Upstream failures surface as
//! [`LlmError`] and are left to the caller.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::llm::error::{LlmError, LlmResult};
use crate::llm::{ChatTurn, CompletionClient, CompletionFuture};

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// HTTP client timeout for long-running generations.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);
/// Default token budget for replies.
const DEFAULT_MAX_TOKENS: u32 = 5_000;
/// Characters of an error body kept in [`LlmError::HttpStatusNotOk`].
const ERROR_BODY_CHARS: usize = 300;
/// Application name reported to OpenRouter.
const APP_TITLE: &str = "charla";

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatTurn],
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Async client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenRouterClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl OpenRouterClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(CLIENT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }

    async fn post_completion(&self, turns: &[ChatTurn]) -> LlmResult<String> {
        let request = CompletionRequest {
            model: &self.model,
            messages: turns,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        tracing::debug!(model = %self.model, turns = turns.len(), "Sending completion request");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header("X-Title", APP_TITLE)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::HttpStatusNotOk {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_CHARS).collect(),
            });
        }

        let parsed = response.json::<CompletionResponse>().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse("no choices returned".to_string()))?;

        Ok(choice.message.content.unwrap_or_default().trim().to_string())
    }
}

impl CompletionClient for OpenRouterClient {
    fn complete<'a>(&'a self, turns: &'a [ChatTurn]) -> CompletionFuture<'a> {
        Box::pin(self.post_completion(turns))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::llm::TurnRole;

    fn client_for(server: &MockServer) -> OpenRouterClient {
        let mut config = LlmConfig::new("sk-test");
        config.base_url = format!("{}/api/v1", server.uri());
        config.model = "test/model".to_string();
        OpenRouterClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_complete_returns_trimmed_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "test/model",
                "messages": [{"role": "user", "content": "hola"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  ¡Hola! \n"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let turns = vec![ChatTurn::new(TurnRole::User, "hola")];
        let reply = client.complete(&turns).await.unwrap();
        assert_eq!(reply, "¡Hola!");
    }

    #[tokio::test]
    async fn test_null_content_is_empty_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": null}}]
            })))
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .complete(&[ChatTurn::new(TurnRole::User, "x")])
            .await
            .unwrap();
        assert_eq!(reply, "");
    }

    #[tokio::test]
    async fn test_error_status_propagates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(&[ChatTurn::new(TurnRole::User, "x")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LlmError::HttpStatusNotOk { status: 401, ref body } if body == "bad key"
        ));
    }

    #[tokio::test]
    async fn test_missing_choices_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .complete(&[ChatTurn::new(TurnRole::User, "x")])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }
}
