use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use super::types::{GenerationError, GenerationRequest, LlmSettings, Message, TextGenerator};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Chat-completion client for the Claude messages API.
#[derive(Debug)]
pub struct ClaudeClient {
    client: reqwest::Client,
    settings: LlmSettings,
}

impl ClaudeClient {
    pub fn new(settings: LlmSettings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, settings }
    }

    fn messages_url(&self) -> String {
        let base = self.settings.base_url.trim_end_matches('/');
        format!("{}/v1/messages", base)
    }

    /// Send a message list and return the concatenated text blocks of the
    /// reply.
    pub async fn send_message(
        &self,
        messages: Vec<Message>,
        model: &str,
        max_tokens: u32,
        temperature: Option<f32>,
    ) -> Result<String, GenerationError> {
        let mut request_body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "messages": messages,
        });
        if let Some(temp) = temperature {
            request_body["temperature"] = json!(temp);
        }

        let response = self
            .client
            .post(self.messages_url())
            .header("Content-Type", "application/json")
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| GenerationError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        let content = response_body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                GenerationError::InvalidResponse("missing content array".to_string())
            })?;

        let text: String = content
            .iter()
            .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");

        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse);
        }

        Ok(text)
    }
}

#[async_trait]
impl TextGenerator for ClaudeClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let mut messages = request.history.clone();
        messages.push(Message::user(request.prompt.clone()));

        self.send_message(
            messages,
            &self.settings.model,
            self.settings.max_tokens,
            self.settings.temperature,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_url_normalizes_trailing_slash() {
        let client = ClaudeClient::new(LlmSettings {
            base_url: "https://api.anthropic.com/".to_string(),
            ..Default::default()
        });
        assert_eq!(client.messages_url(), "https://api.anthropic.com/v1/messages");
    }
}
