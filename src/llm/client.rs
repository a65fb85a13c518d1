use crate::error::{PnlError, Result};
use crate::llm::types::*;
use log::debug;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_model() -> String {
    DEFAULT_GEMINI_MODEL.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: default_model(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Reads `GEMINI_API_KEY` and, optionally, `GEMINI_MODEL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PnlError::InvalidConfig("GEMINI_API_KEY is not set".to_string()))?;

        let mut config = Self::new(api_key);
        if let Ok(model) = std::env::var("GEMINI_MODEL") {
            if !model.trim().is_empty() {
                config.model = model;
            }
        }
        Ok(config)
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Blocking Gemini client.
///
/// Built on `reqwest::blocking`, so it must not be driven from inside an async
/// runtime's worker thread.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    config: GeminiConfig,
    base_url: String,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("model", &self.config.model)
            .field("timeout_secs", &self.config.timeout_secs)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(PnlError::InvalidConfig("Gemini API key is empty".to_string()));
        }
        if config.timeout_secs == 0 {
            return Err(PnlError::InvalidConfig(
                "Gemini timeout must be greater than zero".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn generate_content(
        &self,
        system_prompt: &str,
        messages: Vec<Content>,
        response_schema: Option<serde_json::Value>,
    ) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let payload = GenerateContentRequest {
            contents: messages,
            system_instruction: Some(Content {
                role: None,
                parts: vec![Part::text(system_prompt)],
            }),
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema,
                temperature: Some(0.0),
            },
        };

        debug!("Calling Gemini model '{}'", self.config.model);
        let res = self.client.post(&url).json(&payload).send()?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text()?;
            return Err(PnlError::StructureInferenceUnavailable(format!(
                "Gemini API error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json()?;
        body.first_text().map(str::to_string).ok_or_else(|| {
            PnlError::StructureInferenceUnavailable("Gemini returned no text".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = GeminiConfig::new("key");
        assert_eq!(config.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.timeout_secs, 30);

        let config: GeminiConfig = serde_json::from_str(r#"{"api_key": "k"}"#).unwrap();
        assert_eq!(config.model, DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn test_client_rejects_bad_config() {
        assert!(matches!(
            GeminiClient::new(GeminiConfig::new("  ")),
            Err(PnlError::InvalidConfig(_))
        ));
        assert!(matches!(
            GeminiClient::new(GeminiConfig::new("key").with_timeout_secs(0)),
            Err(PnlError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client = GeminiClient::new(GeminiConfig::new("secret-key"))
            .unwrap()
            .with_base_url("http://localhost:1/");
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains("http://localhost:1\""));
    }
}
