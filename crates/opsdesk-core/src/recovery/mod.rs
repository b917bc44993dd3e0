//! Turns a model reply into a `ui_component` envelope.
//!
//! Models wrap JSON in prose, fence it, truncate it mid-string and leave raw
//! quotes inside the code value. The cascade below tries progressively more
//! permissive readings of the reply and stops at the first that produces an
//! envelope whose code can be closed.

pub mod lexical;
pub mod strategies;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use lexical::is_closeable;

pub const UI_COMPONENT: &str = "ui_component";

/// Characters of the raw reply kept in a failure.
pub const EXCERPT_LEN: usize = 500;

/// The component record the model is asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Envelope {
    pub fn title_or_default(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(strategies::DEFAULT_TITLE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    DirectParse,
    FencedBlock,
    BalancedSlice,
    BoundaryTrim,
    UnterminatedCode,
    FieldExtraction,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::DirectParse => "direct parse",
            StrategyKind::FencedBlock => "fenced block",
            StrategyKind::BalancedSlice => "balanced slice",
            StrategyKind::BoundaryTrim => "boundary trim",
            StrategyKind::UnterminatedCode => "unterminated code repair",
            StrategyKind::FieldExtraction => "field extraction",
        }
    }

    /// Whether the code may have been altered to make it closeable.
    pub fn is_repair(&self) -> bool {
        matches!(
            self,
            StrategyKind::UnterminatedCode | StrategyKind::FieldExtraction
        )
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type Strategy = fn(&str) -> Option<Envelope>;

/// Tried in order; the first `Some` wins.
pub const CASCADE: [(StrategyKind, Strategy); 6] = [
    (StrategyKind::DirectParse, strategies::direct_parse),
    (StrategyKind::FencedBlock, strategies::fenced_block),
    (StrategyKind::BalancedSlice, strategies::balanced_slice),
    (StrategyKind::BoundaryTrim, strategies::boundary_trim),
    (StrategyKind::UnterminatedCode, strategies::unterminated_code),
    (StrategyKind::FieldExtraction, strategies::field_extraction),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub envelope: Envelope,
    pub strategy: StrategyKind,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("could not recover a ui_component from the model reply")]
pub struct RecoveryFailure {
    /// Leading characters of the raw reply.
    pub excerpt: String,
}

impl RecoveryFailure {
    fn new(raw: &str) -> Self {
        Self {
            excerpt: raw.chars().take(EXCERPT_LEN).collect(),
        }
    }
}

pub fn recover(raw: &str) -> Result<Recovered, RecoveryFailure> {
    for (strategy, attempt) in CASCADE {
        match attempt(raw) {
            Some(envelope) => {
                if strategy.is_repair() {
                    info!(%strategy, code_len = envelope.code.len(), "Recovered component after repair");
                } else {
                    debug!(%strategy, "Recovered component");
                }
                return Ok(Recovered { envelope, strategy });
            }
            None => debug!(%strategy, "Recovery strategy did not match"),
        }
    }

    warn!(raw_len = raw.len(), "All recovery strategies failed");
    Err(RecoveryFailure::new(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope {
            kind: UI_COMPONENT.to_string(),
            title: Some("Edit Stock".to_string()),
            description: Some("Adjust product stock".to_string()),
            code: r#"fn EditStock() {
    let products = use_state("products", []);
    ui::card("Edit Stock", [
        ui::text(`Loaded ${products.len()} products`),
        ui::button(#{ label: "Save", on_click: || alert("saved \"ok\"") })
    ])
}"#
            .to_string(),
            explanation: Some("Pick a product and save.".to_string()),
        }
    }

    #[test]
    fn test_round_trip_uses_direct_parse() {
        let envelope = sample();
        let text = serde_json::to_string(&envelope).unwrap();
        let recovered = recover(&text).unwrap();
        assert_eq!(recovered.strategy, StrategyKind::DirectParse);
        assert_eq!(recovered.envelope, envelope);
    }

    #[test]
    fn test_fence_and_array_wrapping_are_transparent() {
        let envelope = sample();
        let text = serde_json::to_string_pretty(&envelope).unwrap();

        let fenced = format!("Here you go:\n```json\n{}\n```\nEnjoy!", text);
        let array = format!("[{}]", text);
        let fenced_array = format!("```\n[{}]\n```", text);

        for wrapped in [fenced, array, fenced_array] {
            assert_eq!(recover(&wrapped).unwrap().envelope, envelope);
        }
    }

    #[test]
    fn test_truncated_reply_yields_closeable_code() {
        let text = serde_json::to_string(&sample()).unwrap();
        let code_at = text.find("\"code\"").unwrap();

        for cut in (code_at + 20..text.len() - 1).step_by(7) {
            if !text.is_char_boundary(cut) {
                continue;
            }
            if let Ok(recovered) = recover(&text[..cut]) {
                assert!(
                    is_closeable(&recovered.envelope.code),
                    "cut at {} gave {:?}",
                    cut,
                    recovered.envelope.code
                );
                assert!(!recovered.envelope.code.trim().is_empty());
            }
        }
    }

    #[test]
    fn test_truncated_try_is_repaired() {
        let text = r#"{"type": "ui_component", "title": "Orders", "code": "fn Orders() {\n  let save = || {\n    try {\n      operationsAPI::updateOrder(1, #{});\n    } catch (err) {\n      alert(`failed`);\n    }\n  };\n  try {\n    let x = operationsAPI::getOrders("#;
        let recovered = recover(text).unwrap();
        assert!(recovered.strategy.is_repair());
        assert!(is_closeable(&recovered.envelope.code));
        assert_eq!(recovered.envelope.title.as_deref(), Some("Orders"));
    }

    #[test]
    fn test_prose_fails_with_excerpt() {
        let prose = "I'm sorry, I can only help with the admin dashboard. ".repeat(20);
        let failure = recover(&prose).unwrap_err();
        assert_eq!(failure.excerpt.chars().count(), EXCERPT_LEN);
        assert!(prose.starts_with(&failure.excerpt));
    }

    #[test]
    fn test_title_default() {
        let mut envelope = sample();
        envelope.title = None;
        assert_eq!(envelope.title_or_default(), "Generated Component");
    }
}
