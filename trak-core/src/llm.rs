//! LLM completion backends.
//!
//! The analyzer and summary generator talk to a [`LlmClient`]; the HTTP
//! implementation speaks the Ollama, Anthropic and OpenAI wire formats and
//! blocks on its own single-threaded tokio runtime.

use crate::config::{Config, LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// One completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the backend to constrain output to a JSON object where supported
    pub json_output: bool,
}

/// LLM completion interface.
pub trait LlmClient: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Model identifier, for logging
    fn model(&self) -> &str;
}

/// Create the HTTP-backed client for `llm`.
pub fn create_client(llm: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    Ok(Arc::new(HttpLlmClient::new(llm)?))
}

/// The client configured in `config`, if any.
///
/// A backend that is configured but cannot be constructed is logged and
/// treated as absent.
pub fn client_from_config(config: &Config) -> Option<Arc<dyn LlmClient>> {
    let llm = config.llm_settings()?;
    match create_client(&llm) {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(provider = ?llm.provider, error = %e, "LLM backend unavailable");
            None
        }
    }
}

pub struct HttpLlmClient {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string());
        let api_key = match config.provider {
            LlmProvider::Ollama => None,
            LlmProvider::Claude => config
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok()),
            LlmProvider::OpenAI => config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        };

        if matches!(config.provider, LlmProvider::Claude | LlmProvider::OpenAI) && api_key.is_none()
        {
            return Err(Error::Config(
                "llm.api_key (or provider env var) is required".to_string(),
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Backend(format!("failed to build tokio runtime: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Backend(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            runtime,
            http,
        })
    }

    async fn post(
        &self,
        name: &str,
        url: String,
        headers: HeaderMap,
        body: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let resp = self
            .http
            .post(url)
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("{name} request failed: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Backend(format!("{name} read body failed: {e}")))?;
        if !status.is_success() {
            return Err(Error::Backend(format!(
                "{name} returned {}: {}",
                status.as_u16(),
                text
            )));
        }
        serde_json::from_str(&text)
            .map_err(|e| Error::Backend(format!("{name} returned invalid JSON: {e}")))
    }

    async fn ollama(&self, request: &CompletionRequest) -> Result<String> {
        let mut body = json!({
            "model": self.model,
            "system": request.system,
            "prompt": request.prompt,
            "stream": false,
            "options": {
                "temperature": request.temperature,
                "num_predict": request.max_tokens,
            },
        });
        if request.json_output {
            body["format"] = json!("json");
        }

        let json = self
            .post(
                "ollama",
                format!("{}/api/generate", self.endpoint),
                HeaderMap::new(),
                body,
            )
            .await?;
        json.get("response")
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::Backend("ollama response missing string field `response`".to_string())
            })
    }

    async fn claude(&self, request: &CompletionRequest) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(self.api_key.as_deref().unwrap_or_default())
                .map_err(|e| Error::Config(format!("invalid claude api key header: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));

        let json = self
            .post(
                "claude",
                format!("{}/v1/messages", self.endpoint),
                headers,
                json!({
                    "model": self.model,
                    "max_tokens": request.max_tokens,
                    "temperature": request.temperature,
                    "system": request.system,
                    "messages": [{ "role": "user", "content": request.prompt }],
                }),
            )
            .await?;
        json.get("content")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.get("text"))
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| Error::Backend("claude response missing content[0].text".to_string()))
    }

    async fn openai(&self, request: &CompletionRequest) -> Result<String> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!(
                "Bearer {}",
                self.api_key.as_deref().unwrap_or_default()
            ))
            .map_err(|e| Error::Config(format!("invalid auth header: {e}")))?,
        );

        let mut body = json!({
            "model": self.model,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.prompt }
            ]
        });
        if request.json_output {
            body["response_format"] = json!({ "type": "json_object" });
        }

        let json = self
            .post(
                "openai",
                format!("{}/v1/chat/completions", self.endpoint),
                headers,
                body,
            )
            .await?;
        json.get("choices")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(|v| v.as_str())
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::Backend("openai response missing choices[0].message.content".to_string())
            })
    }
}

impl LlmClient for HttpLlmClient {
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        tracing::debug!(
            provider = ?self.provider,
            model = %self.model,
            prompt_chars = request.prompt.len(),
            "Sending completion request"
        );
        self.runtime.block_on(async {
            match self.provider {
                LlmProvider::Ollama => self.ollama(request).await,
                LlmProvider::Claude => self.claude(request).await,
                LlmProvider::OpenAI => self.openai(request).await,
            }
        })
    }

    fn model(&self) -> &str {
        &self.model
    }
}
