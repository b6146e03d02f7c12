use serde::{Deserialize, Serialize};

use crate::endpoints::{Service, ServiceEndpoints};
use crate::region::{Environment, Region};
use crate::secrets::SecretString;
use crate::{ConfigError, Result};

/// Top-level provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub region: Region,
    pub environment: Environment,
    /// Base DNS domain used to derive service endpoints
    pub domain: String,
    pub credentials: CredentialsConfig,
    pub uaa: Option<UaaConfig>,
    pub endpoints: EndpointOverrides,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: Region::default(),
            environment: Environment::default(),
            domain: "healthsuite.io".to_string(),
            credentials: CredentialsConfig::default(),
            uaa: None,
            endpoints: EndpointOverrides::default(),
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// OAuth client plus optional user principal or service identity
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub oauth_client_id: String,
    pub oauth_client_secret: SecretString,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Service identity used for the JWT-bearer grant
    pub service_id: Option<String>,
    /// PEM RSA private key belonging to `service_id`
    pub service_private_key: Option<SecretString>,
}

impl CredentialsConfig {
    pub fn has_user(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }

    pub fn has_service_identity(&self) -> bool {
        self.service_id.is_some() && self.service_private_key.is_some()
    }
}

/// UAA credentials, only needed by PKI resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UaaConfig {
    pub username: String,
    pub password: SecretString,
}

/// Explicit per-service endpoint overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointOverrides {
    pub iam: Option<String>,
    pub idm: Option<String>,
    pub blr: Option<String>,
    pub dbs: Option<String>,
    pub pki: Option<String>,
    pub dicom: Option<String>,
    pub ai: Option<String>,
    pub cdr: Option<String>,
    pub uaa: Option<String>,
}

impl EndpointOverrides {
    pub fn get(&self, service: Service) -> Option<&str> {
        let value = match service {
            Service::Iam => &self.iam,
            Service::Idm => &self.idm,
            Service::Blr => &self.blr,
            Service::Dbs => &self.dbs,
            Service::Pki => &self.pki,
            Service::Dicom => &self.dicom,
            Service::Ai => &self.ai,
            Service::Cdr => &self.cdr,
            Service::Uaa => &self.uaa,
        };
        value.as_deref()
    }
}

/// Retry tuning for the call orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub multiplier: f64,
    /// Randomization factor in [0, 1)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_interval_ms: 500,
            max_interval_ms: 60_000,
            multiplier: 1.5,
            jitter: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl ProviderConfig {
    /// Validate the configuration. Runs before any network traffic.
    pub fn validate(&self) -> Result<()> {
        let creds = &self.credentials;
        if creds.oauth_client_id.is_empty() || creds.oauth_client_secret.is_empty() {
            return Err(ConfigError::validation(
                "credentials.oauth_client_id and credentials.oauth_client_secret are required",
            ));
        }
        if creds.username.is_some() != creds.password.is_some() {
            return Err(ConfigError::validation(
                "credentials.username and credentials.password must be set together",
            ));
        }
        if creds.service_id.is_some() != creds.service_private_key.is_some() {
            return Err(ConfigError::validation(
                "credentials.service_id and credentials.service_private_key must be set together",
            ));
        }
        if let Some(uaa) = &self.uaa
            && (uaa.username.is_empty() || uaa.password.is_empty())
        {
            return Err(ConfigError::validation(
                "uaa.username and uaa.password are required when [uaa] is present",
            ));
        }
        if self.domain.trim_matches('.').is_empty() {
            return Err(ConfigError::validation("domain must not be empty"));
        }
        if !(1..=50).contains(&self.retry.max_attempts) {
            return Err(ConfigError::validation("retry.max_attempts must be in 1..=50"));
        }
        if self.retry.initial_interval_ms == 0
            || self.retry.initial_interval_ms > self.retry.max_interval_ms
        {
            return Err(ConfigError::validation(
                "retry.initial_interval_ms must be > 0 and <= retry.max_interval_ms",
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::validation("retry.multiplier must be >= 1.0"));
        }
        if !(0.0..1.0).contains(&self.retry.jitter) {
            return Err(ConfigError::validation("retry.jitter must be in [0, 1)"));
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(ConfigError::validation(format!(
                "logging.level must be one of {valid_levels:?}"
            )));
        }
        // Surface bad endpoint overrides now rather than on first use
        ServiceEndpoints::resolve(self)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> ProviderConfig {
        ProviderConfig {
            credentials: CredentialsConfig {
                oauth_client_id: "client".to_string(),
                oauth_client_secret: "secret".into(),
                ..CredentialsConfig::default()
            },
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_missing_client_credentials() {
        let err = ProviderConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("oauth_client_id"));
    }

    #[test]
    fn test_username_without_password() {
        let mut cfg = valid();
        cfg.credentials.username = Some("alice".to_string());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("must be set together"));
        cfg.credentials.password = Some("pw".into());
        assert!(cfg.validate().is_ok());
        assert!(cfg.credentials.has_user());
    }

    #[test]
    fn test_service_identity_pairing() {
        let mut cfg = valid();
        cfg.credentials.service_id = Some("svc@app.org.example".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_retry_bounds() {
        let mut cfg = valid();
        cfg.retry.max_attempts = 0;
        assert!(cfg.validate().is_err());
        cfg.retry.max_attempts = 5;
        cfg.retry.jitter = 1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_logging_level_validation() {
        let mut cfg = valid();
        cfg.logging.level = "loud".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));
    }

    #[test]
    fn test_secrets_not_in_debug() {
        let debug = format!("{:?}", valid());
        assert!(!debug.contains("secret\""));
        assert!(debug.contains("***"));
    }
}
