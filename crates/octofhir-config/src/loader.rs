//! Configuration loading from TOML file plus environment overrides.

use std::path::PathBuf;

use config::{Config, Environment, File};

use crate::provider::ProviderConfig;
use crate::{ConfigError, Result};

/// Default configuration file looked up when no path is given
pub const DEFAULT_CONFIG_FILE: &str = "octofhir-provider.toml";

/// Load and validate the provider configuration.
///
/// Sources, lowest priority first:
/// 1. the TOML file at `path` (or [`DEFAULT_CONFIG_FILE`]) when it exists
/// 2. environment variables, e.g. `OCTOFHIR__REGION=eu-west` or
///    `OCTOFHIR__CREDENTIALS__OAUTH_CLIENT_ID=...`
pub fn load_config(path: Option<&str>) -> Result<ProviderConfig> {
    let mut builder = Config::builder();
    let file = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
    if file.exists() {
        builder = builder.add_source(File::from(file));
    } else if path.is_some() {
        return Err(ConfigError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("config file {} not found", file.display()),
        )));
    }
    builder = builder.add_source(
        Environment::with_prefix("OCTOFHIR")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );
    let cfg = builder
        .build()
        .map_err(|e| ConfigError::parse(format!("config build error: {e}")))?;
    let merged: ProviderConfig = cfg
        .try_deserialize()
        .map_err(|e| ConfigError::parse(format!("config deserialize error: {e}")))?;
    merged.validate()?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Environment as Env, Region};
    use std::{env, fs};

    #[test]
    fn config_parsing_env_overrides_and_validation() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("provider.toml");
        let toml_content = r#"
region = "eu-west"
environment = "production"

[credentials]
oauth_client_id = "client"
oauth_client_secret = "secret"

[uaa]
username = "uaa-user"
password = "uaa-pass"

[endpoints]
cdr = "https://cdr.example.com"

[retry]
max_attempts = 5
"#;
        fs::write(&path, toml_content).expect("write toml");

        let cfg = load_config(path.to_str()).expect("should parse config");
        assert_eq!(cfg.region, Region::EuWest);
        assert_eq!(cfg.environment, Env::Prod);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.endpoints.cdr.as_deref(), Some("https://cdr.example.com"));
        assert_eq!(cfg.uaa.as_ref().map(|u| u.username.as_str()), Some("uaa-user"));

        // Env override should win over file
        unsafe {
            env::set_var("OCTOFHIR__RETRY__MAX_ATTEMPTS", "9");
        }
        let cfg_env = load_config(path.to_str()).expect("parse with env overrides");
        assert_eq!(cfg_env.retry.max_attempts, 9);
        unsafe {
            env::remove_var("OCTOFHIR__RETRY__MAX_ATTEMPTS");
        }

        // Invalid region is rejected before anything else happens
        let invalid_path = dir.path().join("invalid.toml");
        fs::write(
            &invalid_path,
            r#"
region = "mars-1"

[credentials]
oauth_client_id = "client"
oauth_client_secret = "secret"
"#,
        )
        .expect("write invalid toml");
        assert!(load_config(invalid_path.to_str()).is_err());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = load_config(Some("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
