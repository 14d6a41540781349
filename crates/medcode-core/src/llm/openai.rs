use super::{LlmClient, LlmSettings, OraclePrompt, TEMPERATURE, USER_AGENT};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const OPENAI_BASE: &str = "https://api.openai.com";
const OPENAI_MODEL: &str = "gpt-4o-mini";
const GROQ_BASE: &str = "https://api.groq.com/openai";
const GROQ_MODEL: &str = "meta-llama/llama-4-scout-17b-16e-instruct";

/// Client for OpenAI-compatible chat completion APIs (OpenAI itself and Groq).
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    url: String,
    api_key: String,
    model: String,
    label: &'static str,
}

impl OpenAiClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        Self::with_defaults(settings, "OpenAI", OPENAI_BASE, OPENAI_MODEL)
    }

    /// Groq serves the same wire format under its own base URL.
    pub fn groq(settings: &LlmSettings) -> Result<Self> {
        Self::with_defaults(settings, "Groq", GROQ_BASE, GROQ_MODEL)
    }

    fn with_defaults(
        settings: &LlmSettings,
        label: &'static str,
        default_base: &str,
        default_model: &str,
    ) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!(
                "{label} API key must be provided via {}",
                LlmSettings::API_KEY_ENV
            );
        }
        let base = settings.endpoint.as_deref().unwrap_or(default_base);
        let url = format!("{}/v1/chat/completions", base.trim_end_matches('/'));
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout())
            .build()
            .with_context(|| format!("failed to build {label} HTTP client"))?;
        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
            model: settings
                .model
                .clone()
                .unwrap_or_else(|| default_model.to_string()),
            label,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, prompt: &OraclePrompt) -> Result<String> {
        let payload = ChatCompletionRequest::from_prompt(Some(self.model.clone()), prompt);

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("failed to call {} chat completions API", self.label))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("{} API error ({}): {}", self.label, status, body);
        }

        let chat: ChatCompletionResponse = response
            .json()
            .await
            .with_context(|| format!("failed to parse {} response", self.label))?;
        chat.into_text()
            .ok_or_else(|| anyhow!("{} response missing message content", self.label))
    }
}

#[derive(Serialize)]
pub(super) struct ChatCompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

impl ChatCompletionRequest {
    /// Images travel as a `data:` URL part next to the text part.
    pub(super) fn from_prompt(model: Option<String>, prompt: &OraclePrompt) -> Self {
        let user = match &prompt.image {
            Some(image) => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: prompt.text.clone(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: image.data_url(),
                    },
                },
            ]),
            None => MessageContent::Text(prompt.text.clone()),
        };
        Self {
            model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(prompt.system.clone()),
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: prompt.max_tokens,
        }
    }
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
pub(super) struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

impl ChatCompletionResponse {
    pub(super) fn into_text(self) -> Option<String> {
        self.choices
            .into_iter()
            .find_map(|choice| choice.message.content)
    }
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}
