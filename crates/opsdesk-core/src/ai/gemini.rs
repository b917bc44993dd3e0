use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::{combine_prompts, Gateway, GenerationConfig};
use crate::error::GatewayError;
use crate::provider::Provider;

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const PROVIDER: &str = "Gemini";

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
    response_mime_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Deserialize)]
struct GeminiResponsePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    #[serde(default)]
    parts: Vec<GeminiResponsePart>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiResponseContent>,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    generation: GenerationConfig,
}

impl GeminiClient {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: Provider::Gemini.default_model().to_string(),
            base_url: BASE_URL.to_string(),
            generation: GenerationConfig::default(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Point the client at another host (proxies, tests).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn build_request(&self, prompt: String) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: self.generation.temperature,
                top_k: self.generation.top_k,
                top_p: self.generation.top_p,
                max_output_tokens: self.generation.max_output_tokens,
                response_mime_type: self.generation.response_mime_type.to_string(),
            },
        }
    }

    /// The key travels in a header so it never shows up in a logged url.
    fn endpoint(&self) -> String {
        format!("{}/{}:generateContent", self.base_url, self.model)
    }

    pub async fn query(&self, prompt: &str) -> Result<String, GatewayError> {
        let url = self.endpoint();
        let request = self.build_request(prompt.to_string());

        debug!(model = %self.model, prompt_len = prompt.len(), "Sending Gemini request");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Transport {
                provider: PROVIDER,
                message: e.without_url().to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            error!(status, body = %body, "Gemini API error");
            return Err(GatewayError::Status {
                provider: PROVIDER,
                status,
                body,
            });
        }

        let gemini_response: GeminiResponse =
            response.json().await.map_err(|e| GatewayError::Transport {
                provider: PROVIDER,
                message: format!("invalid response body: {}", e),
            })?;

        gemini_response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|content| content.parts.into_iter().next())
            .and_then(|part| part.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or(GatewayError::EmptyResponse { provider: PROVIDER })
    }
}

#[async_trait]
impl Gateway for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, system_prompt: &str, user_prompt: &str) -> Result<String, GatewayError> {
        self.query(&combine_prompts(system_prompt, user_prompt)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    const MODEL_PATH: &str = "/gemini-2.5-flash:generateContent";

    #[test]
    fn test_request_body_shape() {
        let client = GeminiClient::new("k");
        let body = serde_json::to_value(client.build_request("hello".into())).unwrap();
        assert_eq!(body["contents"][0]["parts"][0]["text"], "hello");
        assert_eq!(body["generationConfig"]["topK"], 40);
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 16384);
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_returns_first_candidate_text() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", MODEL_PATH)
            .match_header("x-goog-api-key", "secret")
            .match_body(Matcher::PartialJson(json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .with_status(200)
            .with_body(
                json!({
                    "candidates": [{ "content": { "parts": [{ "text": "{\"type\":\"ui_component\"}" }] } }]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let client = GeminiClient::new("secret").with_base_url(&server.url());
        let text = client.send("system", "user").await.unwrap();
        assert_eq!(text, "{\"type\":\"ui_component\"}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_carries_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", MODEL_PATH)
            .match_query(Matcher::Any)
            .with_status(429)
            .with_body("quota exceeded")
            .create_async()
            .await;

        let client = GeminiClient::new("k").with_base_url(&server.url());
        match client.send("s", "u").await {
            Err(GatewayError::Status { status, body, .. }) => {
                assert_eq!(status, 429);
                assert_eq!(body, "quota exceeded");
            }
            other => panic!("expected status error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_missing_text_is_empty_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", MODEL_PATH)
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({ "candidates": [] }).to_string())
            .create_async()
            .await;

        let client = GeminiClient::new("k").with_base_url(&server.url());
        assert!(matches!(
            client.send("s", "u").await,
            Err(GatewayError::EmptyResponse { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = GeminiClient::new("k").with_base_url("http://127.0.0.1:1");
        assert!(matches!(
            client.send("s", "u").await,
            Err(GatewayError::Transport { .. })
        ));
    }

    #[tokio::test]
    async fn test_api_key_stays_out_of_urls_and_errors() {
        let client = GeminiClient::new("top-secret").with_base_url("http://127.0.0.1:1");
        assert!(!client.endpoint().contains("top-secret"));
        assert!(!client.endpoint().contains('?'));

        let err = client.send("s", "u").await.unwrap_err();
        assert!(!err.to_string().contains("top-secret"));
    }
}
