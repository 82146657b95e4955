//! OpenAI-compatible chat completions client.

use std::time::Duration;

use async_trait::async_trait;
use lorekeeper_core::error::GameError;
use lorekeeper_core::provider::CompletionProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// Sends each prompt as a single system message to a chat completions
/// endpoint (LM Studio, llama.cpp server, `OpenAI`).
#[derive(Debug, Clone)]
pub struct HttpCompletionProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f32,
}

impl HttpCompletionProvider {
    /// Creates a client for `url` using `model`.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest` error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
            temperature: 0.7,
        })
    }
}

fn transient(err: &reqwest::Error) -> GameError {
    GameError::TransientProvider(err.to_string())
}

fn first_choice(response: ChatCompletionResponse) -> Result<String, GameError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content)
        .ok_or_else(|| GameError::TransientProvider("completion returned no choices".into()))
}

#[async_trait]
impl CompletionProvider for HttpCompletionProvider {
    async fn complete(&self, prompt: &str) -> Result<String, GameError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![ChatMessage {
                role: "system",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| {
                warn!(url = %self.url, error = %err, "completion request failed");
                transient(&err)
            })?;
        let body: ChatCompletionResponse = response.json().await.map_err(|err| transient(&err))?;
        let text = first_choice(body)?;
        debug!(chars = text.len(), "completion received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_carries_prompt_as_system_message() {
        let request = ChatCompletionRequest {
            model: "local-model",
            temperature: 0.5,
            messages: vec![ChatMessage {
                role: "system",
                content: "Describe the mill.",
            }],
        };

        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "local-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Describe the mill.");
    }

    #[test]
    fn test_first_choice_content_is_returned() {
        let response: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "cmpl-1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "It creaks."}}]
        }))
        .unwrap();

        assert_eq!(first_choice(response).unwrap(), "It creaks.");
    }

    #[test]
    fn test_empty_choices_is_a_transient_failure() {
        let response = ChatCompletionResponse { choices: vec![] };

        assert!(matches!(
            first_choice(response),
            Err(GameError::TransientProvider(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_transient_failure() {
        let provider =
            HttpCompletionProvider::new("http://127.0.0.1:9/v1/chat/completions", "m").unwrap();

        let result = provider.complete("hello").await;

        assert!(matches!(result, Err(GameError::TransientProvider(_))));
    }
}
