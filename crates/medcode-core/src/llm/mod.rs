mod anthropic;
mod azure;
mod gemini;
mod openai;
mod scripted;
mod settings;

use std::{fmt, str::FromStr};

use anyhow::{bail, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

pub use anthropic::AnthropicClient;
pub use azure::AzureOpenAiClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiClient;
pub use scripted::ScriptedLlmClient;
pub use settings::LlmSettings;

pub(crate) const TEMPERATURE: f32 = 0.1;
pub(crate) const USER_AGENT: &str = "medcode/0.3";

/// Single completion request sent to a model: a system instruction, the user text and
/// optionally one inline image.
#[derive(Debug, Clone, PartialEq)]
pub struct OraclePrompt {
    pub system: String,
    pub text: String,
    pub image: Option<ImageInput>,
    pub max_tokens: u32,
}

/// Raw image bytes plus their declared media type.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageInput {
    pub media_type: String,
    pub data: Vec<u8>,
}

impl ImageInput {
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.data)
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.to_base64())
    }
}

impl fmt::Debug for ImageInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageInput")
            .field("media_type", &self.media_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Client abstraction over the classification model. Returns the model's raw text reply.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &OraclePrompt) -> Result<String>;
}

/// Stand-in used when no provider is configured; every call fails so callers take their fallback path.
#[derive(Debug, Default, Clone)]
pub struct NoopLlmClient;

#[async_trait]
impl LlmClient for NoopLlmClient {
    async fn complete(&self, _prompt: &OraclePrompt) -> Result<String> {
        bail!("classification model not configured (provider `noop`)")
    }
}

/// Supported model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Groq,
    Azure,
    Anthropic,
    Gemini,
    Noop,
}

impl FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "groq" => Ok(Self::Groq),
            "azure" | "azure-openai" => Ok(Self::Azure),
            "anthropic" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "noop" | "none" => Ok(Self::Noop),
            other => bail!("unsupported provider `{other}`"),
        }
    }
}

/// Build the client selected by `settings.provider`.
pub fn build_client(settings: &LlmSettings) -> Result<Box<dyn LlmClient>> {
    let client: Box<dyn LlmClient> = match settings.provider.parse::<ProviderKind>()? {
        ProviderKind::OpenAi => Box::new(OpenAiClient::new(settings)?),
        ProviderKind::Groq => Box::new(OpenAiClient::groq(settings)?),
        ProviderKind::Azure => Box::new(AzureOpenAiClient::new(settings)?),
        ProviderKind::Anthropic => Box::new(AnthropicClient::new(settings)?),
        ProviderKind::Gemini => Box::new(GeminiClient::new(settings)?),
        ProviderKind::Noop => Box::new(NoopLlmClient),
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str) -> LlmSettings {
        LlmSettings {
            provider: provider.into(),
            api_key: "test-key".into(),
            endpoint: Some("https://example.com".into()),
            model: Some("test-model".into()),
            timeout_secs: Some(5),
            api_version: None,
        }
    }

    #[test]
    fn provider_kind_parses_aliases() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert_eq!(" groq ".parse::<ProviderKind>().unwrap(), ProviderKind::Groq);
        assert_eq!("google".parse::<ProviderKind>().unwrap(), ProviderKind::Gemini);
        assert!("bard".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn build_client_supports_every_provider() {
        for provider in ["openai", "groq", "azure", "anthropic", "gemini", "noop"] {
            assert!(build_client(&settings(provider)).is_ok(), "{provider} should build");
        }
    }

    #[test]
    fn build_client_rejects_unknown_provider() {
        let err = build_client(&settings("mystery")).err().unwrap();
        assert!(err.to_string().contains("mystery"));
    }

    #[test]
    fn noop_client_always_fails() {
        let prompt = OraclePrompt {
            system: "sys".into(),
            text: "hello".into(),
            image: None,
            max_tokens: 10,
        };
        let err = futures::executor::block_on(NoopLlmClient.complete(&prompt)).unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn image_data_url_is_base64() {
        let image = ImageInput {
            media_type: "image/png".into(),
            data: b"abc".to_vec(),
        };
        assert_eq!(image.data_url(), "data:image/png;base64,YWJj");
        assert_eq!(format!("{image:?}"), "ImageInput { media_type: \"image/png\", bytes: 3 }");
    }
}
