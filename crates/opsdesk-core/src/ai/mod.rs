pub mod gemini;
pub mod ollama;

pub use gemini::GeminiClient;
pub use ollama::OllamaClient;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{ConfigError, GatewayError};
use crate::provider::Provider;

/// Sampling settings sent with every generation request.
///
/// Component generation wants near-deterministic output, so the defaults keep
/// temperature low and ask for a JSON response body.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub response_mime_type: &'static str,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 16384,
            response_mime_type: "application/json",
        }
    }
}

/// A single-shot text generation endpoint.
#[async_trait]
pub trait Gateway: Send + Sync {
    fn provider(&self) -> Provider;

    fn model(&self) -> &str;

    /// One attempt, no retry. The caller decides what to show on failure.
    async fn send(&self, system_prompt: &str, user_prompt: &str) -> Result<String, GatewayError>;
}

/// Text the providers actually receive; both prompts travel as one user turn.
pub fn combine_prompts(system_prompt: &str, user_prompt: &str) -> String {
    format!("{}\n\nUser question: {}", system_prompt, user_prompt)
}

/// Build the gateway selected by the config file.
pub fn gateway_from_config(config: &Config) -> Result<Box<dyn Gateway>, ConfigError> {
    let provider = config.provider()?;
    let model = config
        .model
        .clone()
        .unwrap_or_else(|| provider.default_model().to_string());

    match provider {
        Provider::Gemini => {
            let api_key = config.gemini_api_key().ok_or(ConfigError::MissingApiKey)?;
            Ok(Box::new(GeminiClient::new(&api_key).with_model(&model)))
        }
        Provider::Ollama => Ok(Box::new(
            OllamaClient::new(&config.ollama_url()).with_model(&model),
        )),
    }
}
