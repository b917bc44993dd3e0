//! Error types shared across the assistant pipeline.

use thiserror::Error;

/// Failure talking to an AI provider.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The request never produced an HTTP response (DNS, connect, TLS, reset).
    #[error("{provider} request failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    /// The provider answered with a non-2xx status.
    #[error("{provider} API error {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// The provider answered 2xx but the reply carried no text.
    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: &'static str },

    /// The provider cannot be used with the current configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

/// Configuration problems detected before any request is made.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Gemini API key is not configured. Set GEMINI_API_KEY or add gemini_api_key to the config file")]
    MissingApiKey,

    #[error("Unknown provider '{0}' (expected 'gemini' or 'ollama')")]
    UnknownProvider(String),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Config IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure calling the admin REST API from a component or context lookup.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API request to {path} failed: {message}")]
    Transport { path: String, message: String },

    #[error("API {path} returned {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("API {path} returned invalid JSON: {message}")]
    Decode { path: String, message: String },

    #[error("Invalid request for {path}: {message}")]
    InvalidRequest { path: String, message: String },
}
