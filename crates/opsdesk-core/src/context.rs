//! Per-user personalization folded into the prompt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ApiError;

/// Number of recent activity entries fetched for a request.
pub const ACTIVITY_LIMIT: usize = 20;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    #[serde(default)]
    pub user_id: Option<Value>,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub items_per_page: Option<i64>,
    #[serde(default)]
    pub default_view: Option<String>,
    /// Either a list or the JSON text of one, as stored by the API.
    #[serde(default)]
    pub favorite_modules: Option<Value>,
    #[serde(default)]
    pub custom_settings: Option<Value>,
}

/// Decode a column the API may hand back as embedded JSON text.
fn embedded_json(value: &Option<Value>) -> Option<Value> {
    match value {
        Some(Value::String(text)) => serde_json::from_str(text).ok(),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.clone()),
    }
}

impl UserPreferences {
    pub fn favorite_modules(&self) -> Vec<String> {
        match embedded_json(&self.favorite_modules) {
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn custom_settings(&self) -> Map<String, Value> {
        match embedded_json(&self.custom_settings) {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub action_type: String,
    #[serde(default)]
    pub action_description: String,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<i64>,
    #[serde(default)]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub user_id: i64,
    pub preferences: Option<UserPreferences>,
    pub activity: Vec<ActivityEntry>,
}

impl RequestContext {
    pub fn is_empty(&self) -> bool {
        self.preferences.is_none() && self.activity.is_empty()
    }

    /// Modules ordered by how often they show up in recent activity.
    pub fn frequent_modules(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for module in self.activity.iter().filter_map(|a| a.module.as_deref()) {
            match counts.iter_mut().find(|(m, _)| m == module) {
                Some((_, n)) => *n += 1,
                None => counts.push((module.to_string(), 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }

    /// Short natural-language summary for the system prompt.
    pub fn digest(&self) -> String {
        let mut lines = vec![format!("- User ID: {}", self.user_id)];

        if let Some(prefs) = &self.preferences {
            let mut parts = Vec::new();
            if let Some(theme) = &prefs.theme {
                parts.push(format!("theme {}", theme));
            }
            if let Some(language) = &prefs.language {
                parts.push(format!("language {}", language));
            }
            if let Some(timezone) = &prefs.timezone {
                parts.push(format!("timezone {}", timezone));
            }
            if let Some(items) = prefs.items_per_page {
                parts.push(format!("{} items per page", items));
            }
            if let Some(view) = &prefs.default_view {
                parts.push(format!("prefers the {} view", view));
            }
            if !parts.is_empty() {
                lines.push(format!("- Preferences: {}", parts.join(", ")));
            }

            let favorites = prefs.favorite_modules();
            if !favorites.is_empty() {
                lines.push(format!("- Favorite modules: {}", favorites.join(", ")));
            }
            let settings = prefs.custom_settings();
            if !settings.is_empty() {
                lines.push(format!("- Custom settings: {}", Value::Object(settings)));
            }
        }

        if !self.activity.is_empty() {
            let frequent: Vec<String> = self
                .frequent_modules()
                .into_iter()
                .map(|(module, n)| format!("{} ({}x)", module, n))
                .collect();
            if !frequent.is_empty() {
                lines.push(format!("- Most visited modules: {}", frequent.join(", ")));
            }

            lines.push(format!(
                "- Recent activity (last {} actions, newest first):",
                self.activity.len()
            ));
            for entry in &self.activity {
                let mut line = format!("  * {}: {}", entry.action_type, entry.action_description);
                if let Some(module) = &entry.module {
                    line.push_str(&format!(" [{}]", module));
                }
                if let (Some(kind), Some(id)) = (&entry.entity_type, entry.entity_id) {
                    line.push_str(&format!(" {} #{}", kind, id));
                }
                lines.push(line);
            }
        }

        lines.join("\n")
    }
}

/// Where preferences and activity come from.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn preferences(&self, user_id: i64) -> Result<Option<UserPreferences>, ApiError>;

    async fn activity(&self, user_id: i64, limit: usize) -> Result<Vec<ActivityEntry>, ApiError>;
}

/// Gather what is available; a failed lookup just leaves that part out.
pub async fn fetch_context(source: &dyn ContextSource, user_id: i64) -> Option<RequestContext> {
    let preferences = source.preferences(user_id).await.unwrap_or_else(|e| {
        warn!(user_id, error = %e, "Could not load user preferences");
        None
    });
    let activity = source
        .activity(user_id, ACTIVITY_LIMIT)
        .await
        .unwrap_or_else(|e| {
            warn!(user_id, error = %e, "Could not load user activity");
            Vec::new()
        });

    let context = RequestContext {
        user_id,
        preferences,
        activity,
    };
    (!context.is_empty()).then_some(context)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) struct StaticContext {
        pub preferences: Option<UserPreferences>,
        pub activity: Vec<ActivityEntry>,
        pub fail: bool,
    }

    #[async_trait]
    impl ContextSource for StaticContext {
        async fn preferences(&self, _user_id: i64) -> Result<Option<UserPreferences>, ApiError> {
            if self.fail {
                return Err(ApiError::Transport {
                    path: "/user-preferences".into(),
                    message: "connection refused".into(),
                });
            }
            Ok(self.preferences.clone())
        }

        async fn activity(&self, _user_id: i64, limit: usize) -> Result<Vec<ActivityEntry>, ApiError> {
            if self.fail {
                return Err(ApiError::Transport {
                    path: "/user-activity".into(),
                    message: "connection refused".into(),
                });
            }
            Ok(self.activity.iter().take(limit).cloned().collect())
        }
    }

    pub(crate) fn visit(module: &str) -> ActivityEntry {
        ActivityEntry {
            action_type: "view".into(),
            action_description: format!("Viewed {}", module),
            module: Some(module.into()),
            ..ActivityEntry::default()
        }
    }

    #[test]
    fn test_favorite_modules_accepts_text_or_list() {
        let text = UserPreferences {
            favorite_modules: Some(json!("[\"inventory\"]")),
            ..UserPreferences::default()
        };
        assert_eq!(text.favorite_modules(), vec!["inventory"]);

        let list = UserPreferences {
            favorite_modules: Some(json!(["operations", "users"])),
            ..UserPreferences::default()
        };
        assert_eq!(list.favorite_modules(), vec!["operations", "users"]);

        let broken = UserPreferences {
            favorite_modules: Some(json!("not json")),
            ..UserPreferences::default()
        };
        assert!(broken.favorite_modules().is_empty());
    }

    #[test]
    fn test_digest_mentions_frequent_modules() {
        let context = RequestContext {
            user_id: 2,
            preferences: Some(UserPreferences {
                theme: Some("dark".into()),
                ..UserPreferences::default()
            }),
            activity: vec![visit("inventory"), visit("logistics"), visit("inventory")],
        };
        assert_eq!(context.frequent_modules()[0], ("inventory".to_string(), 2));

        let digest = context.digest();
        assert!(digest.contains("User ID: 2"));
        assert!(digest.contains("theme dark"));
        assert!(digest.contains("inventory (2x)"));
        assert!(digest.contains("last 3 actions"));
    }

    #[tokio::test]
    async fn test_failed_lookups_mean_no_context() {
        let source = StaticContext {
            preferences: None,
            activity: Vec::new(),
            fail: true,
        };
        assert!(fetch_context(&source, 1).await.is_none());
    }

    #[tokio::test]
    async fn test_activity_only_context() {
        let source = StaticContext {
            preferences: None,
            activity: vec![visit("marketing")],
            fail: false,
        };
        let context = fetch_context(&source, 5).await.unwrap();
        assert_eq!(context.user_id, 5);
        assert_eq!(context.activity.len(), 1);
    }
}
