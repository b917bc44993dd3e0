use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::{ApiRequest, ApiTransport, Method};
use crate::context::{ActivityEntry, ContextSource, UserPreferences};
use crate::error::ApiError;

/// reqwest client for the admin API.
///
/// Async callers use [`HttpApiClient::execute`]; scripts go through the
/// blocking [`ApiTransport`] impl, which parks the calling worker thread while
/// the request runs on the stored runtime handle.
#[derive(Clone)]
pub struct HttpApiClient {
    client: Client,
    base_url: String,
    handle: Handle,
}

impl HttpApiClient {
    pub fn new(base_url: &str, handle: Handle) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            handle,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn execute(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let path = request.path.clone();
        let transport = |e: reqwest::Error| ApiError::Transport {
            path: path.clone(),
            message: e.to_string(),
        };

        debug!(method = %request.method, path = %request.path, "API request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Put => self.client.put(&url),
            Method::Delete => self.client.delete(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(&transport)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, path = %request.path, body = %body, "API request failed");
            return Err(ApiError::Status {
                path: request.path.clone(),
                status,
                body,
            });
        }

        let text = response.text().await.map_err(&transport)?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| ApiError::Decode {
            path: request.path.clone(),
            message: e.to_string(),
        })
    }
}

impl ApiTransport for HttpApiClient {
    fn send(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        let fut = self.execute(request);
        if Handle::try_current().is_ok() {
            tokio::task::block_in_place(|| self.handle.block_on(fut))
        } else {
            self.handle.block_on(fut)
        }
    }
}

#[async_trait]
impl ContextSource for HttpApiClient {
    async fn preferences(&self, user_id: i64) -> Result<Option<UserPreferences>, ApiError> {
        let path = format!("/user-preferences/{}", user_id);
        let value = self.execute(&ApiRequest::get(path.clone())).await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ApiError::Decode {
                path,
                message: e.to_string(),
            })
    }

    async fn activity(&self, user_id: i64, limit: usize) -> Result<Vec<ActivityEntry>, ApiError> {
        let path = format!("/user-activity/{}", user_id);
        let request = ApiRequest {
            query: vec![("limit".to_string(), limit.to_string())],
            ..ApiRequest::get(path.clone())
        };
        let value = self.execute(&request).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode {
            path,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_blocking_send_inside_runtime() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/inventory/products")
            .match_query(Matcher::UrlEncoded("low_stock".into(), "true".into()))
            .with_status(200)
            .with_body(json!([{ "id": 1, "name": "Widget" }]).to_string())
            .create_async()
            .await;

        let client = HttpApiClient::new(&server.url(), Handle::current());
        let request = ApiRequest {
            query: vec![("low_stock".into(), "true".into())],
            ..ApiRequest::get("/inventory/products")
        };
        let value = client.send(&request).unwrap();
        assert_eq!(value[0]["name"], "Widget");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_sends_json_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/operations/orders/7")
            .match_body(Matcher::Json(json!({ "status": "shipped" })))
            .with_status(200)
            .with_body(json!({ "message": "Order updated successfully" }).to_string())
            .create_async()
            .await;

        let client = HttpApiClient::new(&server.url(), Handle::current());
        let request = ApiRequest {
            method: Method::Put,
            body: Some(json!({ "status": "shipped" })),
            ..ApiRequest::get("/operations/orders/7")
        };
        let value = client.execute(&request).await.unwrap();
        assert_eq!(value["message"], "Order updated successfully");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_keeps_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/users/99")
            .with_status(404)
            .with_body(r#"{"error":"User not found"}"#)
            .create_async()
            .await;

        let client = HttpApiClient::new(&server.url(), Handle::current());
        match client.execute(&ApiRequest::get("/users/99")).await {
            Err(ApiError::Status { status, body, .. }) => {
                assert_eq!(status, 404);
                assert!(body.contains("User not found"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_context_readers() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/user-preferences/3")
            .with_status(200)
            .with_body(
                json!({
                    "user_id": 3,
                    "theme": "dark",
                    "items_per_page": 50,
                    "favorite_modules": "[\"inventory\",\"logistics\"]"
                })
                .to_string(),
            )
            .create_async()
            .await;
        server
            .mock("GET", "/user-activity/3")
            .match_query(Matcher::UrlEncoded("limit".into(), "20".into()))
            .with_status(200)
            .with_body(
                json!([{
                    "action_type": "view",
                    "action_description": "Viewed products",
                    "module": "inventory",
                    "created_at": "2024-05-01 10:00:00"
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let client = HttpApiClient::new(&server.url(), Handle::current());
        let prefs = client.preferences(3).await.unwrap().unwrap();
        assert_eq!(prefs.theme.as_deref(), Some("dark"));
        assert_eq!(prefs.favorite_modules(), vec!["inventory", "logistics"]);

        let activity = client.activity(3, 20).await.unwrap();
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].module.as_deref(), Some("inventory"));
    }
}
