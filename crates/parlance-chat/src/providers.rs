//! HTTP generative providers.
//!
//! - `OpenAiChatProvider`: any OpenAI-compatible `/chat/completions`
//!   endpoint (OpenAI, Ollama's `/v1`, vLLM, LM Studio, ...).
//! - `AnthropicProvider`: the Anthropic `/v1/messages` API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use parlance_core::config::{ProviderConfig, ProviderKind};
use parlance_core::error::Result;

use crate::error::ProviderError;
use crate::generation::{Completion, CompletionRequest, GenerativeProvider};

const OPENAI_DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";
const ANTHROPIC_DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Build the provider described by `config`.
///
/// Fails only when the config names an API key variable that is not set.
pub fn build_provider(config: &ProviderConfig) -> Result<Arc<dyn GenerativeProvider>> {
    let api_key = config.api_key()?;
    let endpoint = config.endpoint.clone();
    Ok(match config.kind {
        ProviderKind::OpenAi => Arc::new(OpenAiChatProvider::new(
            config.model.clone(),
            endpoint,
            api_key,
        )),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            config.model.clone(),
            endpoint,
            api_key,
        )),
    })
}

fn trim_endpoint(endpoint: Option<String>, default: &str) -> String {
    endpoint
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Truncate a response body for error messages.
fn excerpt(body: &str) -> &str {
    match body.char_indices().nth(500) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

// =============================================================================
// OpenAI-compatible
// =============================================================================

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessageResponse,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessageResponse {
    /// Null for some reasoning models.
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Chat completions over the OpenAI wire format.
pub struct OpenAiChatProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiChatProvider {
    pub fn new(model: impl Into<String>, endpoint: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: trim_endpoint(endpoint, OPENAI_DEFAULT_ENDPOINT),
            api_key,
            model: model.into(),
        }
    }

    fn body<'a>(&'a self, request: &'a CompletionRequest) -> OpenAiRequest<'a> {
        OpenAiRequest {
            model: &self.model,
            messages: vec![
                OpenAiMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                OpenAiMessage {
                    role: "user",
                    content: &request.user_message,
                },
            ],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

/// Extract the completion from an OpenAI-format response body.
fn parse_openai(body: &str, fallback_model: &str) -> std::result::Result<Completion, ProviderError> {
    let parsed: OpenAiResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::Parse(format!(
            "Failed to parse completion: {}. Body: {}",
            e,
            excerpt(body)
        ))
    })?;
    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|t| !t.trim().is_empty())
        .ok_or(ProviderError::EmptyCompletion)?;
    Ok(Completion {
        text,
        model: parsed.model.unwrap_or_else(|| fallback_model.to_string()),
    })
}

#[async_trait]
impl GenerativeProvider for OpenAiChatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let mut http = self.client.post(&url).json(&self.body(request));
        if let Some(ref key) = self.api_key {
            http = http.bearer_auth(key);
        }
        let response = http.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<OpenAiErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| excerpt(&text).to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        parse_openai(&text, &self.model)
    }
}

// =============================================================================
// Anthropic
// =============================================================================

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorResponse {
    error: ErrorDetail,
}

/// Messages API client.
pub struct AnthropicProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl AnthropicProvider {
    pub fn new(model: impl Into<String>, endpoint: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: trim_endpoint(endpoint, ANTHROPIC_DEFAULT_ENDPOINT),
            api_key,
            model: model.into(),
        }
    }
}

/// Concatenate the text blocks of a Messages API response.
fn parse_anthropic(
    body: &str,
    fallback_model: &str,
) -> std::result::Result<Completion, ProviderError> {
    let parsed: AnthropicResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::Parse(format!(
            "Failed to parse message: {}. Body: {}",
            e,
            excerpt(body)
        ))
    })?;
    let text: String = parsed
        .content
        .into_iter()
        .filter(|b| b.block_type == "text")
        .filter_map(|b| b.text)
        .collect();
    if text.trim().is_empty() {
        return Err(ProviderError::EmptyCompletion);
    }
    Ok(Completion {
        text,
        model: parsed.model.unwrap_or_else(|| fallback_model.to_string()),
    })
}

#[async_trait]
impl GenerativeProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> std::result::Result<Completion, ProviderError> {
        let url = format!("{}/messages", self.endpoint);
        let body = AnthropicRequest {
            model: &self.model,
            system: &request.system_prompt,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &request.user_message,
            }],
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let mut http = self
            .client
            .post(&url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        if let Some(ref key) = self.api_key {
            http = http.header("x-api-key", key);
        }
        let response = http.send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<AnthropicErrorResponse>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| excerpt(&text).to_string());
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }
        parse_anthropic(&text, &self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_openai_success() {
        let body = r#"{"model":"gpt-4o-mini-2024","choices":[{"message":{"role":"assistant","content":"Hello!"}}]}"#;
        let completion = parse_openai(body, "gpt-4o-mini").unwrap();
        assert_eq!(completion.text, "Hello!");
        assert_eq!(completion.model, "gpt-4o-mini-2024");
    }

    #[test]
    fn test_parse_openai_null_content_is_empty() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert_eq!(
            parse_openai(body, "m").unwrap_err(),
            ProviderError::EmptyCompletion
        );
        assert_eq!(
            parse_openai(r#"{"choices":[]}"#, "m").unwrap_err(),
            ProviderError::EmptyCompletion
        );
    }

    #[test]
    fn test_parse_openai_malformed() {
        assert!(matches!(
            parse_openai("<html>bad gateway</html>", "m"),
            Err(ProviderError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_anthropic_joins_text_blocks() {
        let body = r#"{"content":[
            {"type":"text","text":"Part one. "},
            {"type":"tool_use","id":"x"},
            {"type":"text","text":"Part two."}
        ]}"#;
        let completion = parse_anthropic(body, "claude-test").unwrap();
        assert_eq!(completion.text, "Part one. Part two.");
        assert_eq!(completion.model, "claude-test");
    }

    #[test]
    fn test_parse_anthropic_empty() {
        assert_eq!(
            parse_anthropic(r#"{"content":[]}"#, "m").unwrap_err(),
            ProviderError::EmptyCompletion
        );
    }

    #[test]
    fn test_openai_request_shape() {
        let provider = OpenAiChatProvider::new("gpt-4o-mini", None, None);
        let request = CompletionRequest {
            system_prompt: "You are Ada.".to_string(),
            user_message: "hi".to_string(),
            temperature: 0.5,
            max_tokens: 200,
        };
        let json = serde_json::to_value(provider.body(&request)).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "hi");
        assert_eq!(json["max_tokens"], 200);
    }

    #[test]
    fn test_endpoints_default_and_trim() {
        let openai = OpenAiChatProvider::new("m", None, None);
        assert_eq!(openai.endpoint, OPENAI_DEFAULT_ENDPOINT);
        let local = OpenAiChatProvider::new("m", Some("http://localhost:11434/v1/".into()), None);
        assert_eq!(local.endpoint, "http://localhost:11434/v1");
        let anthropic = AnthropicProvider::new("m", None, None);
        assert_eq!(anthropic.endpoint, ANTHROPIC_DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_build_provider_by_kind() {
        let config = ProviderConfig {
            kind: ProviderKind::Anthropic,
            model: "claude-test".to_string(),
            endpoint: None,
            api_key_env: None,
        };
        let provider = build_provider(&config).unwrap();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model(), "claude-test");
    }

    #[test]
    fn test_build_provider_missing_key_env() {
        let config = ProviderConfig {
            kind: ProviderKind::OpenAi,
            model: "gpt-4o-mini".to_string(),
            endpoint: None,
            api_key_env: Some("PARLANCE_TEST_KEY_THAT_IS_NEVER_SET".to_string()),
        };
        assert!(build_provider(&config).is_err());
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let long = "é".repeat(600);
        assert_eq!(excerpt(&long).chars().count(), 500);
        assert_eq!(excerpt("short"), "short");
    }
}
