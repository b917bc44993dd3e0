//! The conversation a front end drives: one request in flight at a time,
//! replies turned into messages and registry entries.

use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::assistant::ChatReply;
use crate::error::GatewayError;
use crate::registry::Registry;
use crate::state::ChatMessage;

pub const GREETING: &str = "Hi! What would you like to do? Just tell me what you need - like 'I need to update product stock' or 'I need to view my orders' - and I'll build it for you.";

pub const GATEWAY_APOLOGY: &str = "Sorry, there was an error processing your request. Please make sure the server is running and the Gemini API key is configured.";

pub const TEXT_FALLBACK: &str = "Sorry, I could not generate a response.";

/// How long the acknowledgment stays up before switching to the component.
pub const REDIRECT_DELAY: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Sending,
    TextReply,
    ComponentReady { id: i64 },
    Failed,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("message is empty")]
    Empty,

    #[error("a request is already in flight")]
    Busy,
}

/// What the view should do once a reply is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Followup {
    Stay,
    ShowComponent { id: i64, after: Duration },
}

#[derive(Debug)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    state: SessionState,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::assistant(GREETING)],
            state: SessionState::Idle,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_sending(&self) -> bool {
        self.state == SessionState::Sending
    }

    /// Accept a message for sending. Returns the trimmed text the caller
    /// should hand to the assistant.
    pub fn submit(&mut self, text: &str) -> Result<String, SubmitError> {
        if self.is_sending() {
            return Err(SubmitError::Busy);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::Empty);
        }

        self.messages.push(ChatMessage::user(text));
        self.state = SessionState::Sending;
        debug!(len = text.len(), "Message submitted");
        Ok(text.to_string())
    }

    /// Fold the outcome of the in-flight request into the conversation.
    pub fn resolve(
        &mut self,
        outcome: Result<ChatReply, GatewayError>,
        registry: &mut Registry,
    ) -> Followup {
        if !self.is_sending() {
            warn!(state = ?self.state, "Reply arrived with no request in flight");
            return Followup::Stay;
        }

        match outcome {
            Ok(ChatReply::Component { envelope, .. }) => {
                let record = registry.add(&envelope);
                let id = record.id;
                let explanation = envelope
                    .explanation
                    .clone()
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| format!("Generated component: {}", record.title));

                let mut message = ChatMessage::assistant(format!(
                    "{}\n\n✅ Component generated! Redirecting to view it...",
                    explanation
                ));
                message.component_generated = true;
                self.messages.push(message);
                self.state = SessionState::ComponentReady { id };

                Followup::ShowComponent {
                    id,
                    after: REDIRECT_DELAY,
                }
            }
            Ok(ChatReply::Text {
                content,
                raw,
                parse_failed,
            }) => {
                let text = [content, raw]
                    .into_iter()
                    .find(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| TEXT_FALLBACK.to_string());
                let mut message = ChatMessage::assistant(text);
                message.parse_failed = parse_failed;
                self.messages.push(message);
                self.state = SessionState::TextReply;
                Followup::Stay
            }
            Err(e) => {
                warn!(error = %e, "Chat request failed");
                self.messages.push(ChatMessage::assistant(GATEWAY_APOLOGY));
                self.state = SessionState::Failed;
                Followup::Stay
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{Envelope, StrategyKind};
    use crate::state::ChatRole;

    fn component(explanation: Option<&str>) -> ChatReply {
        ChatReply::Component {
            envelope: Envelope {
                kind: "ui_component".into(),
                title: Some("Orders".into()),
                description: None,
                code: "fn Orders() { ui::text(`x`) }".into(),
                explanation: explanation.map(String::from),
            },
            raw: String::new(),
            strategy: StrategyKind::DirectParse,
        }
    }

    #[test]
    fn test_starts_with_greeting() {
        let session = ChatSession::new();
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].role, ChatRole::Assistant);
        assert_eq!(session.messages()[0].content, GREETING);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_submit_rejects_empty_and_reentrant() {
        let mut session = ChatSession::new();
        assert_eq!(session.submit("   \n"), Err(SubmitError::Empty));
        assert_eq!(session.submit("  show orders "), Ok("show orders".to_string()));
        assert_eq!(session.submit("again"), Err(SubmitError::Busy));
        assert_eq!(session.messages().len(), 2);
    }

    #[test]
    fn test_component_reply_registers_and_redirects() {
        let mut session = ChatSession::new();
        let mut registry = Registry::new();
        session.submit("show orders").unwrap();

        let followup = session.resolve(Ok(component(None)), &mut registry);
        let id = registry.list()[0].id;
        assert_eq!(
            followup,
            Followup::ShowComponent {
                id,
                after: Duration::from_millis(1500)
            }
        );
        assert_eq!(session.state(), SessionState::ComponentReady { id });

        let ack = session.messages().last().unwrap();
        assert!(ack.component_generated);
        assert_eq!(
            ack.content,
            "Generated component: Orders\n\n✅ Component generated! Redirecting to view it..."
        );
    }

    #[test]
    fn test_text_reply_prefers_content_then_raw() {
        let mut session = ChatSession::new();
        let mut registry = Registry::new();

        session.submit("a").unwrap();
        session.resolve(
            Ok(ChatReply::Text {
                content: String::new(),
                raw: "plain prose".into(),
                parse_failed: true,
            }),
            &mut registry,
        );
        let last = session.messages().last().unwrap();
        assert_eq!(last.content, "plain prose");
        assert!(last.parse_failed);
        assert_eq!(session.state(), SessionState::TextReply);

        session.submit("b").unwrap();
        session.resolve(
            Ok(ChatReply::Text {
                content: " ".into(),
                raw: String::new(),
                parse_failed: false,
            }),
            &mut registry,
        );
        assert_eq!(session.messages().last().unwrap().content, TEXT_FALLBACK);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_gateway_failure_apologises_and_unlocks() {
        let mut session = ChatSession::new();
        let mut registry = Registry::new();
        session.submit("a").unwrap();
        session.resolve(
            Err(GatewayError::EmptyResponse { provider: "gemini" }),
            &mut registry,
        );
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.messages().last().unwrap().content, GATEWAY_APOLOGY);
        assert!(session.submit("retry by hand").is_ok());
    }

    #[test]
    fn test_stray_reply_is_ignored() {
        let mut session = ChatSession::new();
        let mut registry = Registry::new();
        assert_eq!(session.resolve(Ok(component(Some("x"))), &mut registry), Followup::Stay);
        assert!(registry.is_empty());
        assert_eq!(session.messages().len(), 1);
    }
}
