//! Provider configuration for the OctoFHIR platform provider
//!
//! This crate owns everything the provider needs to know before it issues its
//! first HTTP call:
//! - Region and environment selection, validated up front
//! - OAuth client, user and service-identity credentials, plus UAA credentials for PKI
//! - Per-service endpoint derivation with explicit overrides
//! - Retry tuning consumed by the call orchestrator
//!
//! Configuration is read from an optional TOML file and `OCTOFHIR__*`
//! environment variables, see [`loader::load_config`].

pub mod endpoints;
pub mod loader;
pub mod provider;
pub mod region;
pub mod secrets;

pub use endpoints::{Service, ServiceEndpoints};
pub use loader::load_config;
pub use provider::{
    CredentialsConfig, EndpointOverrides, LoggingConfig, ProviderConfig, RetryConfig, UaaConfig,
};
pub use region::{Environment, Region};
pub use secrets::SecretString;

/// Error types for configuration operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
