use super::{LlmClient, LlmSettings, OraclePrompt, TEMPERATURE, USER_AGENT};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_MODEL: &str = "claude-3-5-haiku-latest";
const DEFAULT_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: Client,
    url: String,
    api_key: String,
    api_version: String,
    model: String,
}

impl AnthropicClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!(
                "Anthropic API key must be provided via {}",
                LlmSettings::API_KEY_ENV
            );
        }
        let base = settings
            .endpoint
            .as_deref()
            .unwrap_or("https://api.anthropic.com");
        let url = format!("{}/v1/messages", base.trim_end_matches('/'));
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout())
            .build()
            .context("failed to build Anthropic HTTP client")?;
        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
            api_version: settings
                .api_version
                .clone()
                .unwrap_or_else(|| DEFAULT_VERSION.to_string()),
            model: settings
                .model
                .clone()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, prompt: &OraclePrompt) -> Result<String> {
        let payload = AnthropicRequest::from_prompt(self.model.clone(), prompt);

        let response = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.api_version)
            .json(&payload)
            .send()
            .await
            .context("failed to call Anthropic messages API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Anthropic API error ({}): {}", status, body);
        }

        let message: AnthropicResponse = response
            .json()
            .await
            .context("failed to parse Anthropic response")?;
        message
            .content
            .into_iter()
            .find_map(|part| part.text)
            .ok_or_else(|| anyhow!("Anthropic response missing message content"))
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    system: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
}

impl AnthropicRequest {
    fn from_prompt(model: String, prompt: &OraclePrompt) -> Self {
        let mut content = Vec::with_capacity(2);
        if let Some(image) = &prompt.image {
            content.push(AnthropicBlock::Image {
                source: ImageSource {
                    kind: "base64",
                    media_type: image.media_type.clone(),
                    data: image.to_base64(),
                },
            });
        }
        content.push(AnthropicBlock::Text {
            text: prompt.text.clone(),
        });
        Self {
            model,
            system: prompt.system.clone(),
            messages: vec![AnthropicMessage {
                role: "user",
                content,
            }],
            max_tokens: prompt.max_tokens,
            temperature: TEMPERATURE,
        }
    }
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<AnthropicBlock>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicBlock {
    Text { text: String },
    Image { source: ImageSource },
}

#[derive(Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: String,
    data: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    _type: String,
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ImageInput;
    use httpmock::prelude::*;
    use serde_json::json;

    fn base_settings(url: String) -> LlmSettings {
        LlmSettings {
            provider: "anthropic".into(),
            api_key: "test-key".into(),
            endpoint: Some(url),
            model: Some("claude-test".into()),
            timeout_secs: Some(5),
            api_version: None,
        }
    }

    fn prompt() -> OraclePrompt {
        OraclePrompt {
            system: "You classify medical records.".into(),
            text: "Filename: xray.png".into(),
            image: Some(ImageInput {
                media_type: "image/png".into(),
                data: b"png".to_vec(),
            }),
            max_tokens: 200,
        }
    }

    #[test]
    fn image_block_precedes_text() {
        let value =
            serde_json::to_value(AnthropicRequest::from_prompt("m".into(), &prompt())).unwrap();
        let content = &value["messages"][0]["content"];
        assert_eq!(content[0]["type"], json!("image"));
        assert_eq!(content[0]["source"]["type"], json!("base64"));
        assert_eq!(content[0]["source"]["data"], json!("cG5n"));
        assert_eq!(content[1]["text"], json!("Filename: xray.png"));
        assert_eq!(value["system"], json!("You classify medical records."));
    }

    #[test]
    fn defaults_version_and_model() {
        let mut settings = base_settings("https://example.com".into());
        settings.model = None;
        let client = AnthropicClient::new(&settings).unwrap();
        assert_eq!(client.model, DEFAULT_MODEL);
        assert_eq!(client.api_version, DEFAULT_VERSION);
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn complete_parses_successful_response() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/messages")
                .header("x-api-key", "test-key");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"content":[{"type":"text","text":"{\"code\":6100,\"confidence\":0.7}"}]}"#);
        });

        let client = AnthropicClient::new(&base_settings(server.base_url())).unwrap();
        let reply = client.complete(&prompt()).await.unwrap();
        assert_eq!(reply, "{\"code\":6100,\"confidence\":0.7}");
        mock.assert();
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn does_not_retry_on_failure() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v1/messages");
            then.status(500);
        });

        let client = AnthropicClient::new(&base_settings(server.base_url())).unwrap();
        let err = client.complete(&prompt()).await.unwrap_err();
        assert!(err.to_string().contains("Anthropic API error"));
        mock.assert_hits(1);
    }
}
