use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::{combine_prompts, Gateway, GenerationConfig};
use crate::error::GatewayError;
use crate::provider::Provider;

const PROVIDER: &str = "Ollama";

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    options: OllamaOptions,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
    #[allow(dead_code)]
    done: bool,
}

#[derive(Deserialize)]
struct OllamaModel {
    name: String,
}

#[derive(Deserialize)]
struct OllamaModelsResponse {
    models: Vec<OllamaModel>,
}

#[derive(Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    model: String,
    generation: GenerationConfig,
}

impl OllamaClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: Provider::Ollama.default_model().to_string(),
            generation: GenerationConfig::default(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub async fn query_json(&self, prompt: &str) -> Result<String, GatewayError> {
        let url = format!("{}/api/generate", self.base_url);

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            format: Some("json".to_string()),
            options: OllamaOptions {
                temperature: self.generation.temperature,
                top_k: self.generation.top_k,
                top_p: self.generation.top_p,
                num_predict: self.generation.max_output_tokens,
            },
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                provider: PROVIDER,
                message: format!("{}. Make sure Ollama is running with: ollama serve", e),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!(status, body = %body, "Ollama request failed");
            return Err(GatewayError::Status {
                provider: PROVIDER,
                status,
                body,
            });
        }

        let ollama_response: OllamaResponse =
            response.json().await.map_err(|e| GatewayError::Transport {
                provider: PROVIDER,
                message: format!("invalid response body: {}", e),
            })?;

        if ollama_response.response.trim().is_empty() {
            return Err(GatewayError::EmptyResponse { provider: PROVIDER });
        }
        Ok(ollama_response.response)
    }

    pub async fn list_models(&self) -> Result<Vec<String>, GatewayError> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                provider: PROVIDER,
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::Status {
                provider: PROVIDER,
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let models_response: OllamaModelsResponse =
            response.json().await.map_err(|e| GatewayError::Transport {
                provider: PROVIDER,
                message: format!("invalid model list: {}", e),
            })?;

        Ok(models_response
            .models
            .into_iter()
            .map(|model| model.name)
            .collect())
    }
}

#[async_trait]
impl Gateway for OllamaClient {
    fn provider(&self) -> Provider {
        Provider::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, system_prompt: &str, user_prompt: &str) -> Result<String, GatewayError> {
        self.query_json(&combine_prompts(system_prompt, user_prompt)).await
    }
}
