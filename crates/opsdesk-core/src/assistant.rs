//! One request through the whole pipeline: context, prompt, gateway,
//! recovery.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info};

use crate::ai::Gateway;
use crate::context::{fetch_context, ContextSource};
use crate::error::GatewayError;
use crate::prompt;
use crate::recovery::{recover, Envelope, StrategyKind};
use crate::schema::SchemaContext;

/// Error tag attached to replies whose text could not be recovered.
pub const PARSE_FAILED_TAG: &str = "JSON_PARSE_FAILED";

/// What the assistant answers with.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    Component {
        envelope: Envelope,
        raw: String,
        strategy: StrategyKind,
    },
    Text {
        content: String,
        raw: String,
        parse_failed: bool,
    },
}

impl ChatReply {
    pub fn raw(&self) -> &str {
        match self {
            ChatReply::Component { raw, .. } | ChatReply::Text { raw, .. } => raw,
        }
    }

    /// `{response, rawResponse, error?}`, the shape clients of the chat
    /// endpoint expect.
    pub fn to_wire(&self) -> Value {
        match self {
            ChatReply::Component { envelope, raw, .. } => json!({
                "response": envelope,
                "rawResponse": raw,
            }),
            ChatReply::Text {
                content,
                raw,
                parse_failed,
            } => {
                let mut wire = json!({
                    "response": { "type": "text_response", "content": content },
                    "rawResponse": raw,
                });
                if *parse_failed {
                    wire["error"] = json!(PARSE_FAILED_TAG);
                }
                wire
            }
        }
    }
}

/// Turn raw model output into a reply.
pub fn reply_from_raw(raw: String) -> ChatReply {
    match recover(&raw) {
        Ok(recovered) => ChatReply::Component {
            envelope: recovered.envelope,
            strategy: recovered.strategy,
            raw,
        },
        Err(failure) => ChatReply::Text {
            content: format!(
                "Error: Could not parse JSON response from AI. Please try again. Raw response: {}",
                failure.excerpt
            ),
            raw,
            parse_failed: true,
        },
    }
}

pub struct Assistant {
    gateway: Box<dyn Gateway>,
    schema: SchemaContext,
    context_source: Option<Arc<dyn ContextSource>>,
}

impl Assistant {
    pub fn new(gateway: Box<dyn Gateway>, schema: SchemaContext) -> Self {
        Self {
            gateway,
            schema,
            context_source: None,
        }
    }

    pub fn with_context_source(mut self, source: Arc<dyn ContextSource>) -> Self {
        self.context_source = Some(source);
        self
    }

    pub fn gateway(&self) -> &dyn Gateway {
        self.gateway.as_ref()
    }

    pub async fn respond(&self, message: &str, user_id: Option<i64>) -> Result<ChatReply, GatewayError> {
        let context = match (user_id, &self.context_source) {
            (Some(user_id), Some(source)) => fetch_context(source.as_ref(), user_id).await,
            _ => None,
        };

        let prompt = prompt::build(message, &self.schema, context.as_ref());
        info!(
            provider = self.gateway.provider().as_str(),
            model = self.gateway.model(),
            personalized = context.is_some(),
            "Requesting component"
        );

        let raw = self
            .gateway
            .send(&prompt.system_prompt, &prompt.user_prompt)
            .await
            .map_err(|e| {
                error!(error = %e, "Gateway request failed");
                e
            })?;

        Ok(reply_from_raw(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::{visit, StaticContext};
    use crate::provider::Provider;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Answers with a fixed reply and remembers the prompts it saw.
    struct ScriptedGateway {
        reply: Result<String, u16>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedGateway {
        fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                seen: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Gateway for ScriptedGateway {
        fn provider(&self) -> Provider {
            Provider::Gemini
        }

        fn model(&self) -> &str {
            "scripted"
        }

        async fn send(&self, system_prompt: &str, _user_prompt: &str) -> Result<String, GatewayError> {
            self.seen.lock().unwrap().push(system_prompt.to_string());
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(GatewayError::Status {
                    provider: "gemini",
                    status: *status,
                    body: "quota exceeded".to_string(),
                }),
            }
        }
    }

    #[test]
    fn test_wire_shapes() {
        let failed = reply_from_raw("Sure! Here is what I would build.".to_string());
        let wire = failed.to_wire();
        assert_eq!(wire["response"]["type"], "text_response");
        assert_eq!(wire["error"], PARSE_FAILED_TAG);
        assert!(wire["response"]["content"]
            .as_str()
            .unwrap()
            .ends_with("Raw response: Sure! Here is what I would build."));

        let raw = r#"{"type":"ui_component","title":"T","code":"fn A() { ui::text(\"x\") }"}"#;
        let wire = reply_from_raw(raw.to_string()).to_wire();
        assert_eq!(wire["response"]["title"], "T");
        assert_eq!(wire["rawResponse"], raw);
        assert!(wire.get("error").is_none());
    }

    #[tokio::test]
    async fn test_respond_folds_in_user_context() {
        let gateway = ScriptedGateway::replying(r#"{"type":"ui_component","code":"fn A() { 1 }"}"#);
        let seen = gateway.seen.clone();
        let source = Arc::new(StaticContext {
            preferences: None,
            activity: vec![visit("logistics")],
            fail: false,
        });
        let assistant = Assistant::new(Box::new(gateway), SchemaContext::builtin())
            .with_context_source(source);

        let reply = assistant.respond("track shipments", Some(4)).await.unwrap();
        assert!(matches!(reply, ChatReply::Component { strategy: StrategyKind::DirectParse, .. }));
        assert!(seen.lock().unwrap()[0].contains("- User ID: 4"));
    }

    #[tokio::test]
    async fn test_respond_without_user_skips_context() {
        let gateway = ScriptedGateway::replying("no json here");
        let seen = gateway.seen.clone();
        let assistant = Assistant::new(Box::new(gateway), SchemaContext::builtin());

        let reply = assistant.respond("hello", None).await.unwrap();
        assert!(matches!(reply, ChatReply::Text { parse_failed: true, .. }));
        assert!(!seen.lock().unwrap()[0].contains("CURRENT USER CONTEXT"));
    }

    #[tokio::test]
    async fn test_gateway_errors_propagate() {
        let assistant = Assistant::new(Box::new(ScriptedGateway::failing(429)), SchemaContext::builtin());
        let err = assistant.respond("x", None).await.unwrap_err();
        assert!(matches!(err, GatewayError::Status { status: 429, .. }));
    }
}
