//! # LLM API Client
//!
//! Sends row-generation prompts to Claude or OpenAI and returns the raw
//! response text. The pipeline talks to it through `RowGeneratorClient`, so
//! tests and alternative providers can stand in for it.

use async_trait::async_trait;

use crate::error::{MockSmithError, Result};
use crate::llm::prompt;
use crate::schema::descriptor::EntityDescriptor;

/// What the pipeline asks for in one sub-batch.
#[derive(Debug, Clone)]
pub struct MessageRequest {
    pub locale: String,
    pub row_count: usize,
    pub seed_hint: String,
    pub ignored_columns: Vec<String>,
}

/// A rendered prompt, ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationMessage {
    pub system: String,
    pub user: String,
    pub row_count: usize,
}

/// Per-request provider settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ProviderOptions {
    /// Room for `row_count` rows plus the envelope.
    pub fn for_rows(row_count: usize) -> Self {
        let rows = u32::try_from(row_count).unwrap_or(u32::MAX);
        let estimate = rows.saturating_mul(256).saturating_add(512);
        Self {
            max_tokens: estimate.clamp(1024, MAX_OUTPUT_TOKENS),
            temperature: 0.9,
        }
    }
}

const MAX_OUTPUT_TOKENS: u32 = 8192;

/// Builds prompts and fetches raw model output for them.
#[async_trait]
pub trait RowGeneratorClient: Send + Sync {
    fn generate_message(
        &self,
        entity: &EntityDescriptor,
        request: &MessageRequest,
    ) -> (GenerationMessage, ProviderOptions);

    /// Raw response text. May be empty when the provider produced nothing.
    async fn generate_mock_data(
        &self,
        message: &GenerationMessage,
        options: &ProviderOptions,
    ) -> Result<String>;
}

/// Supported LLM providers.
#[derive(Debug, Clone)]
pub enum LlmProvider {
    Claude { api_key: String, model: String },
    OpenAI { api_key: String, model: String },
}

impl LlmProvider {
    /// Auto-detect provider from environment variables.
    ///
    /// Checks `ANTHROPIC_API_KEY` first, then `OPENAI_API_KEY`. Falls back to
    /// a sensible default model for each provider unless `model_override` is
    /// specified.
    pub fn from_env(model_override: Option<&str>) -> Result<Self> {
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            return Ok(LlmProvider::Claude {
                api_key: key,
                model: model_override
                    .unwrap_or("claude-sonnet-4-20250514")
                    .to_string(),
            });
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            return Ok(LlmProvider::OpenAI {
                api_key: key,
                model: model_override.unwrap_or("gpt-4o").to_string(),
            });
        }

        Err(MockSmithError::LlmError {
            message: "No LLM API key found. Set ANTHROPIC_API_KEY or OPENAI_API_KEY environment variable.".to_string(),
        })
    }

    /// Select a provider by name (`claude` or `openai`), reading its key from
    /// the environment.
    pub fn named(name: &str, model_override: Option<&str>) -> Result<Self> {
        let (var, default_model) = match name.to_lowercase().as_str() {
            "claude" | "anthropic" => ("ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
            "openai" => ("OPENAI_API_KEY", "gpt-4o"),
            other => {
                return Err(MockSmithError::Config {
                    message: format!("Unknown LLM provider '{}'. Use 'claude' or 'openai'.", other),
                })
            }
        };
        let api_key = std::env::var(var).map_err(|_| MockSmithError::LlmError {
            message: format!("Provider '{}' selected but {} is not set.", name, var),
        })?;
        let model = model_override.unwrap_or(default_model).to_string();
        Ok(match var {
            "ANTHROPIC_API_KEY" => LlmProvider::Claude { api_key, model },
            _ => LlmProvider::OpenAI { api_key, model },
        })
    }

    pub fn model(&self) -> &str {
        match self {
            LlmProvider::Claude { model, .. } | LlmProvider::OpenAI { model, .. } => model,
        }
    }
}

/// Default time to wait for an LLM API response before aborting.
pub const API_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(90);

/// HTTP-backed `RowGeneratorClient`.
pub struct LlmClient {
    provider: LlmProvider,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(provider: LlmProvider) -> Self {
        Self::with_timeout(provider, API_TIMEOUT)
    }

    pub fn with_timeout(provider: LlmProvider, timeout: std::time::Duration) -> Self {
        Self {
            provider,
            http: build_http_client(timeout),
        }
    }

    pub fn provider(&self) -> &LlmProvider {
        &self.provider
    }
}

#[async_trait]
impl RowGeneratorClient for LlmClient {
    fn generate_message(
        &self,
        entity: &EntityDescriptor,
        request: &MessageRequest,
    ) -> (GenerationMessage, ProviderOptions) {
        let user = prompt::row_generation_prompt(
            entity,
            &request.locale,
            request.row_count,
            &request.seed_hint,
            &request.ignored_columns,
        );
        (
            GenerationMessage {
                system: prompt::SYSTEM_PROMPT.to_string(),
                user,
                row_count: request.row_count,
            },
            ProviderOptions::for_rows(request.row_count),
        )
    }

    async fn generate_mock_data(
        &self,
        message: &GenerationMessage,
        options: &ProviderOptions,
    ) -> Result<String> {
        match &self.provider {
            LlmProvider::Claude { api_key, model } => {
                call_claude(&self.http, api_key, model, message, options).await
            }
            LlmProvider::OpenAI { api_key, model } => {
                call_openai(&self.http, api_key, model, message, options).await
            }
        }
    }
}

/// Build an HTTP client with a strict timeout so requests never hang
/// indefinitely on flaky networks or partial API outages.
fn build_http_client(timeout: std::time::Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Call the Anthropic Messages API.
///
/// Uses assistant pre-fill (`{`) so Claude starts its response inside the
/// JSON envelope instead of with markdown fences or preamble text.
async fn call_claude(
    client: &reqwest::Client,
    api_key: &str,
    model: &str,
    message: &GenerationMessage,
    options: &ProviderOptions,
) -> Result<String> {
    let body = serde_json::json!({
        "model": model,
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
        "system": message.system,
        "messages": [
            {
                "role": "user",
                "content": message.user
            },
            {
                "role": "assistant",
                "content": "{"
            }
        ]
    });

    let response = client
        .post("https://api.anthropic.com/v1/messages")
        .header("x-api-key", api_key)
        .header("anthropic-version", "2023-06-01")
        .header("content-type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| MockSmithError::LlmError {
            message: format!("Failed to call Claude API: {}", e),
        })?;

    let status = response.status();
    let response_text = response.text().await.map_err(|e| MockSmithError::LlmError {
        message: format!("Failed to read Claude API response: {}", e),
    })?;

    if !status.is_success() {
        return Err(MockSmithError::LlmError {
            message: format!(
                "Claude API returned {}: {}",
                status,
                truncate(&response_text, 500),
            ),
        });
    }

    let parsed: serde_json::Value =
        serde_json::from_str(&response_text).map_err(|e| MockSmithError::LlmError {
            message: format!("Failed to parse Claude API response JSON: {}", e),
        })?;

    let text = claude_text(&parsed)?;
    if text.trim().is_empty() {
        return Ok(String::new());
    }

    // The pre-fill is not echoed back; restore it.
    Ok(format!("{{{}", text))
}

fn claude_text(parsed: &serde_json::Value) -> Result<&str> {
    parsed["content"]
        .as_array()
        .and_then(|arr| arr.first())
        .and_then(|block| block["text"].as_str())
        .ok_or_else(|| MockSmithError::LlmError {
            message: "Claude API response missing content[0].text".to_string(),
        })
}

/// Call the OpenAI Chat Completions API.
///
/// Uses `response_format: { "type": "json_object" }` to force the model
/// to return valid JSON without markdown wrapping or preamble text.
async fn call_openai(
    client: &reqwest::Client,
    api_key: &str,
    model: &str,
    message: &GenerationMessage,
    options: &ProviderOptions,
) -> Result<String> {
    let body = serde_json::json!({
        "model": model,
        "messages": [
            {
                "role": "system",
                "content": message.system
            },
            {
                "role": "user",
                "content": message.user
            }
        ],
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
        "response_format": { "type": "json_object" }
    });

    let response = client
        .post("https://api.openai.com/v1/chat/completions")
        .header("Authorization", format!("Bearer {}", api_key))
        .header("content-type", "application/json")
        .json(&body)
        .send()
        .await
        .map_err(|e| MockSmithError::LlmError {
            message: format!("Failed to call OpenAI API: {}", e),
        })?;

    let status = response.status();
    let response_text = response.text().await.map_err(|e| MockSmithError::LlmError {
        message: format!("Failed to read OpenAI API response: {}", e),
    })?;

    if !status.is_success() {
        return Err(MockSmithError::LlmError {
            message: format!(
                "OpenAI API returned {}: {}",
                status,
                truncate(&response_text, 500),
            ),
        });
    }

    let parsed: serde_json::Value =
        serde_json::from_str(&response_text).map_err(|e| MockSmithError::LlmError {
            message: format!("Failed to parse OpenAI API response JSON: {}", e),
        })?;

    openai_text(&parsed).map(str::to_string)
}

/// `content` is null when the model refused or produced nothing.
fn openai_text(parsed: &serde_json::Value) -> Result<&str> {
    let message = parsed["choices"]
        .as_array()
        .and_then(|arr| arr.first())
        .map(|choice| &choice["message"])
        .ok_or_else(|| MockSmithError::LlmError {
            message: "OpenAI API response missing choices[0].message".to_string(),
        })?;
    Ok(message["content"].as_str().unwrap_or(""))
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::ColumnDescriptor;
    use crate::schema::types::DataType;

    #[test]
    fn test_from_env_no_keys() {
        // Remove keys for this test (they may or may not be set)
        let anthropic = std::env::var("ANTHROPIC_API_KEY").ok();
        let openai = std::env::var("OPENAI_API_KEY").ok();
        std::env::remove_var("ANTHROPIC_API_KEY");
        std::env::remove_var("OPENAI_API_KEY");

        let result = LlmProvider::from_env(None);
        assert!(result.is_err());

        // Restore
        if let Some(k) = anthropic {
            std::env::set_var("ANTHROPIC_API_KEY", k);
        }
        if let Some(k) = openai {
            std::env::set_var("OPENAI_API_KEY", k);
        }
    }

    #[test]
    fn test_named_unknown_provider() {
        let err = LlmProvider::named("gemini", None).unwrap_err();
        assert!(matches!(err, MockSmithError::Config { .. }));
    }

    #[test]
    fn test_provider_options_scale_with_rows() {
        assert_eq!(ProviderOptions::for_rows(1).max_tokens, 1024);
        assert_eq!(ProviderOptions::for_rows(10).max_tokens, 3072);
        assert_eq!(ProviderOptions::for_rows(500).max_tokens, MAX_OUTPUT_TOKENS);
    }

    #[test]
    fn test_generate_message_uses_request() {
        let client = LlmClient::new(LlmProvider::OpenAI {
            api_key: "test".to_string(),
            model: "gpt-4o".to_string(),
        });
        let mut entity = EntityDescriptor::new("customers");
        entity.columns = vec![ColumnDescriptor::new("name", DataType::Text)];

        let (message, options) = client.generate_message(
            &entity,
            &MessageRequest {
                locale: "de-DE".to_string(),
                row_count: 4,
                seed_hint: String::new(),
                ignored_columns: Vec::new(),
            },
        );
        assert_eq!(message.row_count, 4);
        assert_eq!(message.system, prompt::SYSTEM_PROMPT);
        assert!(message.user.contains("Generate 4 rows"));
        assert!(message.user.contains("de-DE"));
        assert_eq!(options, ProviderOptions::for_rows(4));
    }

    #[test]
    fn test_claude_text_extraction() {
        let parsed = serde_json::json!({"content": [{"type": "text", "text": "\"data\": []}"}]});
        assert_eq!(claude_text(&parsed).unwrap(), "\"data\": []}");

        let missing = serde_json::json!({"content": []});
        assert!(claude_text(&missing).is_err());
    }

    #[test]
    fn test_openai_null_content_is_empty() {
        let parsed = serde_json::json!({"choices": [{"message": {"content": null}}]});
        assert_eq!(openai_text(&parsed).unwrap(), "");

        let parsed = serde_json::json!({"choices": [{"message": {"content": "{\"data\": []}"}}]});
        assert_eq!(openai_text(&parsed).unwrap(), "{\"data\": []}");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello world", 5), "hello");
        assert_eq!(truncate("héllo", 2), "h");
    }
}
