use crate::config::AppConfig;
use crate::error::{Nl2SqlError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// External text generation service used for delegated translation
#[async_trait]
pub trait SqlDelegate: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Send one system instruction plus one user prompt, return the raw reply.
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

/// OpenAI-compatible chat completions client
#[derive(Clone)]
pub struct LlmClient {
    api_key: String,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl LlmClient {
    const TEMPERATURE: f64 = 0.1;
    const MAX_TOKENS: u32 = 200;
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            client,
        }
    }

    /// Build a client from config; `None` when no API key is configured.
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        config
            .api_key
            .as_ref()
            .map(|key| Self::new(key.clone(), config.model.clone(), config.base_url.clone()))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt}
            ],
            "temperature": Self::TEMPERATURE,
        });

        // Newer models reject max_tokens
        if self.model.starts_with("gpt-5") || self.model.starts_with("o1") {
            body["max_completion_tokens"] = serde_json::json!(Self::MAX_TOKENS);
        } else {
            body["max_tokens"] = serde_json::json!(Self::MAX_TOKENS);
        }
        body
    }

    async fn call_llm(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = self.request_body(system_prompt, user_prompt);
        debug!(model = %self.model, "sending chat completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| Nl2SqlError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Nl2SqlError::Llm(format!("LLM API error ({}): {}", status, error_text)));
        }

        let response_json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Nl2SqlError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        extract_content(&response_json)
    }
}

#[async_trait]
impl SqlDelegate for LlmClient {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.call_llm(system_prompt, user_prompt).await
    }
}

/// Pull the first choice's message content out of a chat completion response.
pub fn extract_content(response_json: &serde_json::Value) -> Result<String> {
    if let Some(error) = response_json.get("error") {
        return Err(Nl2SqlError::Llm(format!("LLM API error: {}", error)));
    }

    let choice = response_json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| Nl2SqlError::Llm("No choices in LLM response".to_string()))?;

    match choice.get("finish_reason").and_then(|r| r.as_str()) {
        Some("content_filter") => {
            return Err(Nl2SqlError::Llm(
                "LLM response was filtered by content policy".to_string(),
            ))
        }
        Some("length") => warn!("LLM response was truncated due to length limit"),
        _ => {}
    }

    let content = choice["message"]["content"]
        .as_str()
        .map(str::trim)
        .unwrap_or_default();

    if content.is_empty() {
        return Err(Nl2SqlError::Llm("Empty content in LLM response".to_string()));
    }

    Ok(content.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(model: &str) -> LlmClient {
        LlmClient::new("sk-test".to_string(), model.to_string(), "http://localhost/v1/".to_string())
    }

    #[test]
    fn test_request_body_shape() {
        let body = client("gpt-3.5-turbo").request_body("sys", "user");
        assert_eq!(body["model"], "gpt-3.5-turbo");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(body["max_tokens"], 200);
        assert!(body.get("max_completion_tokens").is_none());
    }

    #[test]
    fn test_reasoning_models_use_completion_tokens() {
        let body = client("gpt-5-mini").request_body("sys", "user");
        assert_eq!(body["max_completion_tokens"], 200);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        assert_eq!(client("m").base_url, "http://localhost/v1");
    }

    #[test]
    fn test_from_config_requires_key() {
        let mut config = AppConfig::default();
        assert!(LlmClient::from_config(&config).is_none());
        config.api_key = Some("sk-live".to_string());
        assert_eq!(LlmClient::from_config(&config).unwrap().model(), "gpt-3.5-turbo");
    }

    #[test]
    fn test_extract_content() {
        let ok = json!({"choices": [{"message": {"content": "  SELECT 1  "}, "finish_reason": "stop"}]});
        assert_eq!(extract_content(&ok).unwrap(), "SELECT 1");

        let api_error = json!({"error": {"message": "invalid key"}});
        assert!(extract_content(&api_error).is_err());

        let empty = json!({"choices": []});
        assert!(extract_content(&empty).is_err());

        let blank = json!({"choices": [{"message": {"content": ""}}]});
        assert!(extract_content(&blank).is_err());

        let filtered = json!({"choices": [{"message": {"content": "x"}, "finish_reason": "content_filter"}]});
        assert!(extract_content(&filtered).is_err());
    }
}
