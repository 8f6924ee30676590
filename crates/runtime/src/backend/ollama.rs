//! Ollama chat backend for locally hosted models.

use std::time::Duration;

use super::{ChatRequest, ChatResponse, LlmBackend, Message, Role, Usage};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "gemma3:12b";

/// Local generation can be slow, so the default is generous.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ApiOptions>,
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ApiOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    message: ApiReply,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct ApiReply {
    content: String,
}

/// Builder for creating an Ollama backend.
#[derive(Debug, Clone)]
pub struct OllamaBackendBuilder {
    base_url: String,
    model: String,
    timeout: Option<Duration>,
    temperature: Option<f32>,
}

impl OllamaBackendBuilder {
    /// Create a new builder for the given model on the default local server.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_URL.to_string(),
            model: model.into(),
            timeout: Some(DEFAULT_TIMEOUT),
            temperature: None,
        }
    }

    /// Set the server base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the request timeout. `None` waits forever.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Build the backend.
    pub fn build(self) -> Result<OllamaBackend> {
        if self.base_url.is_empty() {
            return Err(Error::Config("Ollama URL is required".into()));
        }
        if self.model.is_empty() {
            return Err(Error::Config("model name is required".into()));
        }

        let mut client = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }
        let client = client
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(OllamaBackend {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            model: self.model,
            temperature: self.temperature,
        })
    }
}

/// Ollama `/api/chat` backend.
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
}

impl OllamaBackend {
    /// Create a builder for the Ollama backend.
    pub fn builder(model: impl Into<String>) -> OllamaBackendBuilder {
        OllamaBackendBuilder::new(model)
    }

    /// The model this backend talks to.
    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn api_request<'a>(&'a self, request: &ChatRequest<'a>) -> ApiRequest<'a> {
        let system = request.system.map(|content| ApiMessage {
            role: Role::System,
            content,
        });
        let messages = system
            .into_iter()
            .chain(request.messages.iter().map(|m: &'a Message| ApiMessage {
                role: m.role,
                content: &m.content,
            }))
            .collect();

        ApiRequest {
            model: &self.model,
            messages,
            stream: false,
            options: self.temperature.map(|temperature| ApiOptions { temperature }),
        }
    }
}

impl std::fmt::Display for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ollama({} at {})", self.model, self.base_url)
    }
}

impl LlmBackend for OllamaBackend {
    async fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse> {
        let api_request = self.api_request(&request);
        debug!(model = %self.model, messages = api_request.messages.len(), "sending chat request");

        let response = self
            .client
            .post(self.chat_url())
            .json(&api_request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Api(e.to_string()))?;

        let usage = Usage {
            input_tokens: api_response.prompt_eval_count,
            output_tokens: api_response.eval_count,
        };
        debug!(?usage, "chat response received");

        Ok(ChatResponse {
            content: api_response.message.content.trim().to_string(),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_puts_system_first() {
        let backend = OllamaBackend::builder("gemma3:12b").build().unwrap();
        let history = [Message::user("hi"), Message::assistant("hello")];
        let request = ChatRequest {
            messages: &history,
            system: Some("be brief"),
        };

        let json = serde_json::to_value(backend.api_request(&request)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gemma3:12b",
                "messages": [
                    {"role": "system", "content": "be brief"},
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"},
                ],
                "stream": false,
            })
        );
    }

    #[test]
    fn request_includes_temperature_when_set() {
        let backend = OllamaBackend::builder("llama3")
            .temperature(0.5)
            .build()
            .unwrap();
        let request = ChatRequest {
            messages: &[],
            system: None,
        };

        let json = serde_json::to_value(backend.api_request(&request)).unwrap();
        assert_eq!(json["options"]["temperature"], 0.5);
        assert_eq!(json["messages"], serde_json::json!([]));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let backend = OllamaBackend::builder("llama3")
            .base_url("http://gpu-box:11434/")
            .build()
            .unwrap();
        assert_eq!(backend.chat_url(), "http://gpu-box:11434/api/chat");
        assert_eq!(backend.to_string(), "ollama(llama3 at http://gpu-box:11434)");
    }

    #[test]
    fn empty_model_is_rejected() {
        let result = OllamaBackend::builder("").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn response_parsing() {
        let json = r#"{
            "model": "gemma3:12b",
            "created_at": "2025-01-01T00:00:00Z",
            "message": {"role": "assistant", "content": "  USE_TOOL: get_time()\n"},
            "done": true,
            "prompt_eval_count": 12,
            "eval_count": 5
        }"#;
        let response: ApiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.message.content.trim(), "USE_TOOL: get_time()");
        assert_eq!(response.eval_count, 5);
    }
}
