//! Language model client with one transport chosen at construction

use crate::config::{Config, LlmProviderKind};
use crate::error::{status_error, KeenEyeError, Result};
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const SYSTEM_PROMPT: &str = "You are an expert HR analyst specializing in resume-job matching.";

/// Single text-completion contract used by the qualitative analyst
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<String>;
}

#[derive(Debug, Clone)]
pub enum Transport {
    /// OpenAI-compatible `/chat/completions` with bearer auth
    ChatCompletions { base_url: String, api_key: String },
    /// Ollama-style `/api/generate`, no credentials
    LocalGenerate { base_url: String },
}

impl Transport {
    fn endpoint(&self) -> String {
        match self {
            Transport::ChatCompletions { base_url, .. } => {
                format!("{}/chat/completions", base_url.trim_end_matches('/'))
            }
            Transport::LocalGenerate { base_url } => {
                format!("{}/api/generate", base_url.trim_end_matches('/'))
            }
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
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
    content: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: usize,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

pub struct LlmClient {
    http: reqwest::Client,
    transport: Transport,
    model: String,
    retry: RetryPolicy,
}

impl LlmClient {
    pub fn new(transport: Transport, model: impl Into<String>, retry: RetryPolicy, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeenEyeError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            transport,
            model: model.into(),
            retry,
        })
    }

    /// Client for the configured provider, `None` when analysis is rule-based only
    pub fn from_config(config: &Config) -> Result<Option<Arc<dyn LanguageModel>>> {
        let providers = &config.providers;
        let transport = match providers.llm {
            LlmProviderKind::Disabled => return Ok(None),
            LlmProviderKind::ChatCompletions => Transport::ChatCompletions {
                base_url: providers.llm_base_url.clone(),
                api_key: providers.groq_api_key.clone().ok_or_else(|| {
                    KeenEyeError::Configuration("GROQ_API_KEY is required for chat completions".to_string())
                })?,
            },
            LlmProviderKind::Local => Transport::LocalGenerate {
                base_url: providers.llm_base_url.clone(),
            },
        };

        info!("LLM transport: {} ({})", transport.endpoint(), providers.llm_model);
        let client = Self::new(
            transport,
            providers.llm_model.clone(),
            RetryPolicy::from_config(&config.retry),
            Duration::from_secs(config.retry.request_timeout_secs),
        )?;
        Ok(Some(Arc::new(client)))
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    async fn send_once(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<String> {
        let endpoint = self.transport.endpoint();
        let response = match &self.transport {
            Transport::ChatCompletions { api_key, .. } => {
                let request = ChatRequest {
                    model: &self.model,
                    messages: vec![
                        ChatMessage {
                            role: "system",
                            content: SYSTEM_PROMPT,
                        },
                        ChatMessage {
                            role: "user",
                            content: prompt,
                        },
                    ],
                    max_tokens,
                    temperature,
                };
                self.http.post(&endpoint).bearer_auth(api_key).json(&request).send().await?
            }
            Transport::LocalGenerate { .. } => {
                let request = GenerateRequest {
                    model: &self.model,
                    prompt: format!("{}\n\n{}", SYSTEM_PROMPT, prompt),
                    stream: false,
                    options: GenerateOptions {
                        temperature,
                        num_predict: max_tokens,
                    },
                };
                self.http.post(&endpoint).json(&request).send().await?
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), body));
        }

        let text = match &self.transport {
            Transport::ChatCompletions { .. } => {
                let parsed: ChatResponse = response.json().await?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|choice| choice.message.content)
                    .ok_or_else(|| KeenEyeError::Decode("chat completion returned no choices".to_string()))?
            }
            Transport::LocalGenerate { .. } => {
                let parsed: GenerateResponse = response.json().await?;
                parsed.response
            }
        };
        debug!("LLM returned {} chars", text.len());
        Ok(text)
    }
}

#[async_trait]
impl LanguageModel for LlmClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, max_tokens: usize, temperature: f32) -> Result<String> {
        let label = format!("LLM call ({})", self.model);
        self.retry
            .run(&label, || self.send_once(prompt, max_tokens, temperature))
            .await
            .map_err(|e| match e {
                KeenEyeError::Decode(_) => e,
                other if other.is_transient() => other,
                other => KeenEyeError::LlmInference(other.to_string()),
            })
    }
}
