use anyhow::{Context, Result};
use std::collections::HashMap;

/// Environment-driven configuration for the classification model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmSettings {
    pub provider: String,
    pub api_key: String,
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub api_version: Option<String>,
}

impl LlmSettings {
    pub const PROVIDER_ENV: &'static str = "MEDCODE_PROVIDER";
    pub const API_KEY_ENV: &'static str = "MEDCODE_API_KEY";
    pub const ENDPOINT_ENV: &'static str = "MEDCODE_ENDPOINT";
    pub const MODEL_ENV: &'static str = "MEDCODE_MODEL";
    pub const TIMEOUT_ENV: &'static str = "MEDCODE_TIMEOUT_SECS";
    pub const API_VERSION_ENV: &'static str = "MEDCODE_API_VERSION";

    /// Default request timeout applied by every HTTP adapter.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Load settings from environment variables.
    ///
    /// * `MEDCODE_PROVIDER` - Provider identifier (default: `groq`).
    /// * `MEDCODE_API_KEY`  - API key/token (required unless the provider is `noop`).
    /// * `MEDCODE_ENDPOINT` - Optional custom endpoint/base URL.
    pub fn from_env() -> Result<Self> {
        Self::from_map(std::env::vars().collect())
    }

    pub fn from_map(vars: HashMap<String, String>) -> Result<Self> {
        let provider = vars
            .get(Self::PROVIDER_ENV)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "groq".to_string());
        let api_key = match provider.to_lowercase().as_str() {
            "noop" | "none" => vars.get(Self::API_KEY_ENV).cloned().unwrap_or_default(),
            _ => vars
                .get(Self::API_KEY_ENV)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .with_context(|| {
                    format!(
                        "environment variable {} must be set for provider `{}`",
                        Self::API_KEY_ENV,
                        provider
                    )
                })?,
        };
        let non_empty = |key: &str| vars.get(key).cloned().filter(|v| !v.trim().is_empty());
        let timeout_secs = vars
            .get(Self::TIMEOUT_ENV)
            .and_then(|v| v.trim().parse::<u64>().ok());

        Ok(Self {
            endpoint: non_empty(Self::ENDPOINT_ENV),
            model: non_empty(Self::MODEL_ENV),
            api_version: non_empty(Self::API_VERSION_ENV),
            provider,
            api_key,
            timeout_secs,
        })
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_secs.unwrap_or(Self::DEFAULT_TIMEOUT_SECS))
    }
}
