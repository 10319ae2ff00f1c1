//! HTTP transports for the inference service

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::{ExtractError, Result};

/// Text-generation transport
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send one prompt and return the model's raw text reply
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Check that the service is reachable
    async fn health_check(&self) -> Result<()>;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}

fn build_http_client(config: &LlmConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(config.timeout()).build()?)
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ExtractError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Request body for `/api/generate`
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    temperature: f64,
    max_tokens: u32,
}

/// Response body from `/api/generate`
#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

/// Self-hosted endpoint speaking the generate protocol
pub struct LocalClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl LocalClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Ok(Self {
            http: build_http_client(config)?,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LlmClient for LocalClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self.http.post(&url).json(&body).send().await?;
        let parsed: GenerateResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ExtractError::ResponseParse(e.to_string()))?;

        debug!(done = parsed.done, len = parsed.response.len(), "Local inference reply");
        Ok(parsed.response)
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.base_url);
        check_status(self.http.get(&url).send().await?).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: String,
}

/// Hosted provider speaking the chat-completions protocol
pub struct CloudClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
}

impl CloudClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ExtractError::Config("cloud provider requires an API key".into()))?;

        Ok(Self {
            http: build_http_client(config)?,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl LlmClient for CloudClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let parsed: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ExtractError::ResponseParse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ExtractError::ResponseParse("reply has no choices".into()))
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "cloud"
    }
}
