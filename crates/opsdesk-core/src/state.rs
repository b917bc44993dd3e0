//! UI-agnostic chat state types
//!
//! These are shared by every front end (the terminal UI, the one-shot CLI)
//! and don't depend on any specific UI framework.

use serde::{Deserialize, Serialize};

/// A chat message in the assistant conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// Set on the acknowledgment that follows a successful generation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub component_generated: bool,
    /// Set when the reply is raw model output that could not be parsed.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parse_failed: bool,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            component_generated: false,
            parse_failed: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            component_generated: false,
            parse_failed: false,
        }
    }
}

/// The role of a chat message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}
