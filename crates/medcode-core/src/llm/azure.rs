use super::openai::{ChatCompletionRequest, ChatCompletionResponse};
use super::{LlmClient, LlmSettings, OraclePrompt, USER_AGENT};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;

const DEFAULT_API_VERSION: &str = "2024-02-15-preview";

/// Azure OpenAI deployment; same payload as OpenAI minus the model field.
#[derive(Debug, Clone)]
pub struct AzureOpenAiClient {
    http: Client,
    url: String,
    api_key: String,
}

impl AzureOpenAiClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        if settings.api_key.trim().is_empty() {
            bail!(
                "Azure OpenAI API key must be provided via {}",
                LlmSettings::API_KEY_ENV
            );
        }
        let endpoint = settings.endpoint.clone().ok_or_else(|| {
            anyhow!(
                "{} must be set for azure provider",
                LlmSettings::ENDPOINT_ENV
            )
        })?;
        let deployment = settings
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "{} must contain the deployment name for azure provider",
                    LlmSettings::MODEL_ENV
                )
            })?;
        let api_version = settings
            .api_version
            .as_deref()
            .unwrap_or(DEFAULT_API_VERSION);

        let url = format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            deployment,
            api_version
        );

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(settings.timeout())
            .build()
            .context("failed to build Azure OpenAI HTTP client")?;

        Ok(Self {
            http,
            url,
            api_key: settings.api_key.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for AzureOpenAiClient {
    async fn complete(&self, prompt: &OraclePrompt) -> Result<String> {
        let payload = ChatCompletionRequest::from_prompt(None, prompt);

        let response = self
            .http
            .post(&self.url)
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .context("failed to call Azure OpenAI chat completions API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("Azure OpenAI API error ({}): {}", status, body);
        }

        let chat: ChatCompletionResponse = response
            .json()
            .await
            .context("failed to parse Azure OpenAI response")?;
        chat.into_text()
            .ok_or_else(|| anyhow!("Azure OpenAI response missing message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn azure_settings() -> LlmSettings {
        LlmSettings {
            provider: "azure".into(),
            api_key: "azure-key".into(),
            endpoint: Some("https://example.openai.azure.com/".into()),
            model: Some("classifier".into()),
            timeout_secs: Some(5),
            api_version: None,
        }
    }

    #[test]
    fn builds_deployment_url() {
        let client = AzureOpenAiClient::new(&azure_settings()).unwrap();
        assert_eq!(
            client.url,
            "https://example.openai.azure.com/openai/deployments/classifier/chat/completions?api-version=2024-02-15-preview"
        );
    }

    #[test]
    fn requires_endpoint() {
        let mut settings = azure_settings();
        settings.endpoint = None;
        let err = AzureOpenAiClient::new(&settings).unwrap_err();
        assert!(err.to_string().contains(LlmSettings::ENDPOINT_ENV));
    }

    #[test]
    fn requires_deployment() {
        let mut settings = azure_settings();
        settings.model = Some("  ".into());
        let err = AzureOpenAiClient::new(&settings).unwrap_err();
        assert!(err.to_string().contains("deployment"));
    }

    #[tokio::test]
    #[ignore = "requires loopback networking"]
    async fn complete_sends_api_key_header() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/openai/deployments/classifier/chat/completions")
                .header("api-key", "azure-key");
            then.status(200).json_body(json!({
                "choices": [{"message": {"content": "{\"codes\": [4100]}"}}]
            }));
        });

        let mut settings = azure_settings();
        settings.endpoint = Some(server.base_url());
        let client = AzureOpenAiClient::new(&settings).unwrap();
        let prompt = OraclePrompt {
            system: "s".into(),
            text: "t".into(),
            image: None,
            max_tokens: 50,
        };
        let reply = client.complete(&prompt).await.unwrap();
        assert_eq!(reply, "{\"codes\": [4100]}");
        mock.assert();
    }
}
