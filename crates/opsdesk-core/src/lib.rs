pub mod ai;
pub mod api;
pub mod assistant;
pub mod config;
pub mod context;
pub mod error;
pub mod prompt;
pub mod provider;
pub mod recovery;
pub mod registry;
pub mod sandbox;
pub mod schema;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use ai::{gateway_from_config, Gateway, GeminiClient, OllamaClient};
pub use api::{ApiTransport, HttpApiClient};
pub use assistant::{Assistant, ChatReply};
pub use config::Config;
pub use context::{ContextSource, RequestContext};
pub use error::{ApiError, ConfigError, GatewayError};
pub use prompt::Prompt;
pub use provider::Provider;
pub use recovery::{recover, Envelope, Recovered, RecoveryFailure, StrategyKind};
pub use registry::{GeneratedComponentRecord, Registry};
pub use sandbox::{materialize, Bindings, Component, RenderError, UiNode};
pub use schema::SchemaContext;
pub use session::{ChatSession, Followup, SessionState, SubmitError};
pub use state::{ChatMessage, ChatRole};
