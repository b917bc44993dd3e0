//! End-to-end runs of the chat pipeline against a scripted gateway.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use opsdesk_core::api::ApiRequest;
use opsdesk_core::prompt::EXAMPLES;
use opsdesk_core::recovery::is_closeable;
use opsdesk_core::{
    materialize, ApiError, ApiTransport, Assistant, Bindings, ChatReply, ChatSession, Followup,
    Gateway, GatewayError, Provider, Registry, RenderError, SchemaContext, SessionState,
    StrategyKind,
};

struct ScriptedGateway(String);

#[async_trait]
impl Gateway for ScriptedGateway {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    fn model(&self) -> &str {
        "scripted"
    }

    async fn send(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, GatewayError> {
        Ok(self.0.clone())
    }
}

/// Every list endpoint returns the same two rows; writes succeed.
struct FixtureApi;

impl ApiTransport for FixtureApi {
    fn send(&self, request: &ApiRequest) -> Result<Value, ApiError> {
        if request.body.is_some() {
            return Ok(json!({ "message": "ok" }));
        }
        Ok(json!([
            { "id": 1, "name": "Widget", "order_number": "ORD-1", "customer_name": "Ana" },
            { "id": 2, "name": "Bolt", "order_number": "ORD-2", "customer_name": "Ben" }
        ]))
    }
}

async fn run(message: &str, reply: String) -> (ChatSession, Registry, Followup, ChatReply) {
    let assistant = Assistant::new(Box::new(ScriptedGateway(reply)), SchemaContext::builtin());
    let mut session = ChatSession::new();
    let mut registry = Registry::new();

    let text = session.submit(message).unwrap();
    let outcome = assistant.respond(&text, None).await;
    let reply = outcome.as_ref().unwrap().clone();
    let followup = session.resolve(outcome, &mut registry);
    (session, registry, followup, reply)
}

/// A long component whose JSON reply is cut off mid-`code`.
fn truncated_order_reply() -> String {
    let rows: Vec<String> = (0..400)
        .map(|i| format!("        ui::text(\"Order row {}\"),", i))
        .collect();
    let code = format!(
        "fn UpdateOrderStatus() {{\n    let status = use_state(\"status\", \"pending\");\n    try {{\n        set_state(\"status\", \"processing\");\n    }} catch (err) {{\n        alert(`${{err}}`);\n    }}\n    ui::card(\"Update Order Status\", [\n{}\n    ])\n}}",
        rows.join("\n")
    );

    let escaped = serde_json::to_string(&code).unwrap();
    let body: String = escaped[1..].chars().take(7000).collect();
    format!(
        "{{\"type\": \"ui_component\", \"title\": \"Update Order Status\", \"code\": \"{}",
        body
    )
}

#[tokio::test]
async fn scenario_a_verbatim_example_registers_component() {
    let reply = EXAMPLES[0].envelope().to_string();
    let (session, registry, followup, chat_reply) = run("I need to edit product stock", reply).await;

    let ChatReply::Component { strategy, .. } = &chat_reply else {
        panic!("expected a component, got {:?}", chat_reply);
    };
    assert_eq!(*strategy, StrategyKind::DirectParse);

    let record = &registry.list()[0];
    assert_eq!(record.title, "Edit Product Stock Threshold");
    assert_eq!(session.state(), SessionState::ComponentReady { id: record.id });
    assert!(matches!(followup, Followup::ShowComponent { id, .. } if id == record.id));

    let mut component = materialize(&record.code, &Bindings::new(Arc::new(FixtureApi))).unwrap();
    let text = component.render().unwrap().plain_text();
    assert!(text.contains("Edit Product Stock Threshold"));
}

#[tokio::test]
async fn scenario_b_truncated_code_is_repaired() {
    let reply = truncated_order_reply();
    assert!(!reply.contains("explanation"));

    let (session, registry, _, chat_reply) = run("update order status", reply).await;
    let ChatReply::Component { strategy, envelope, .. } = &chat_reply else {
        panic!("expected a component, got {:?}", chat_reply);
    };
    assert!(strategy.is_repair());
    assert!(is_closeable(&envelope.code));
    assert!(envelope.code.trim_end().ends_with('}'));
    assert!(matches!(session.state(), SessionState::ComponentReady { .. }));

    match materialize(&registry.list()[0].code, &Bindings::new(Arc::new(FixtureApi))) {
        Ok(mut component) => {
            let tree = component.render().unwrap();
            assert!(tree.plain_text().contains("Order row 0"));
        }
        Err(err) => assert!(
            matches!(err, RenderError::IncompleteBlock { .. } | RenderError::Compile { .. }),
            "unexpected error: {}",
            err
        ),
    }
}

#[tokio::test]
async fn scenario_c_prose_becomes_text_reply() {
    let prose = "I can help with that! First open the inventory page, then pick a product.";
    let (session, registry, followup, _) = run("how do I restock?", prose.to_string()).await;

    assert_eq!(session.state(), SessionState::TextReply);
    assert_eq!(followup, Followup::Stay);
    assert!(registry.is_empty());

    let last = session.messages().last().unwrap();
    assert!(last.parse_failed);
    assert!(!last.component_generated);
    assert!(last.content.contains(prose));
}
