//! Script writer backed by an OpenAI-compatible chat completions API

use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::config::ScriptConfig;
use crate::error::{CastError, CastResult};

/// Turns a prompt into a raw dialogue script
#[async_trait::async_trait]
pub trait ScriptWriter: Send + Sync {
    /// Generate a script. The result is trimmed and never blank.
    async fn generate(&self, prompt: &str) -> CastResult<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug)]
pub struct OpenAiScriptWriter {
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    system_prompt: String,
    client: HttpClient,
}

impl OpenAiScriptWriter {
    /// Build the client. `api_key` must already be resolved.
    pub fn new(config: &ScriptConfig, api_key: String) -> CastResult<Self> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            api_url: config.api_url.clone(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            system_prompt: config.system_prompt.clone(),
            client,
        })
    }
}

#[async_trait::async_trait]
impl ScriptWriter for OpenAiScriptWriter {
    async fn generate(&self, prompt: &str) -> CastResult<String> {
        log::info!("Generating radio script with {}...", self.model);

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::error!("Script generation failed with HTTP {}", status);
            return Err(CastError::Provider {
                provider: "openai",
                status: status.as_u16(),
                body,
            });
        }

        let reply: ChatResponse = response.json().await?;
        let script = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .unwrap_or_default();

        if script.is_empty() {
            return Err(CastError::EmptyGeneration);
        }

        let lines = script.lines().filter(|l| !l.trim().is_empty()).count();
        log::info!("Script generated: {} lines", lines);
        Ok(script)
    }
}
