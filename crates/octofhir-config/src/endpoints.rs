//! Per-service base URL derivation.
//!
//! Every back-end service lives at
//! `https://{service}-{environment}.{region}.{domain}`; production drops the
//! environment infix. UAA sits at `https://uaa.cloud.{region}.{domain}`.
//! Explicit overrides from `[endpoints]` always win.

use std::collections::BTreeMap;
use std::fmt;

use url::Url;

use crate::provider::ProviderConfig;
use crate::{ConfigError, Result};

/// Back-end services addressed by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Service {
    /// Token issuance
    Iam,
    /// Identity management (groups, services, clients, devices, applications)
    Idm,
    /// Blob repository
    Blr,
    /// Message-subscription fabric
    Dbs,
    /// Certificate issuance
    Pki,
    /// DICOM configuration
    Dicom,
    /// AI job orchestration
    Ai,
    /// Clinical data repository (FHIR)
    Cdr,
    /// Cloud Foundry UAA, used for PKI tokens
    Uaa,
}

impl Service {
    pub const ALL: [Service; 9] = [
        Service::Iam,
        Service::Idm,
        Service::Blr,
        Service::Dbs,
        Service::Pki,
        Service::Dicom,
        Service::Ai,
        Service::Cdr,
        Service::Uaa,
    ];

    /// Host label used when deriving the default URL
    fn host_label(&self) -> &'static str {
        match self {
            // identity management is served by the IAM host
            Service::Iam | Service::Idm => "iam",
            Service::Blr => "blobrepository",
            Service::Dbs => "databroker",
            Service::Pki => "pki-proxy",
            Service::Dicom => "dicom",
            Service::Ai => "ai-inference",
            Service::Cdr => "cdr",
            Service::Uaa => "uaa",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Service::Iam => "iam",
            Service::Idm => "idm",
            Service::Blr => "blr",
            Service::Dbs => "dbs",
            Service::Pki => "pki",
            Service::Dicom => "dicom",
            Service::Ai => "ai",
            Service::Cdr => "cdr",
            Service::Uaa => "uaa",
        };
        f.write_str(name)
    }
}

/// Resolved base URLs, one per service
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    urls: BTreeMap<Service, Url>,
}

impl ServiceEndpoints {
    /// Derive every endpoint from region/environment/domain, then apply overrides.
    pub fn resolve(config: &ProviderConfig) -> Result<Self> {
        let mut urls = BTreeMap::new();
        for service in Service::ALL {
            let url = match config.endpoints.get(service) {
                Some(raw) => parse_url(service, raw)?,
                None => parse_url(service, &derive(config, service))?,
            };
            urls.insert(service, url);
        }
        Ok(Self { urls })
    }

    pub fn url(&self, service: Service) -> &Url {
        // resolve() populates every variant of Service::ALL
        &self.urls[&service]
    }

    /// Join a path onto a service base URL, keeping any base path prefix.
    pub fn join(&self, service: Service, path: &str) -> String {
        format!(
            "{}/{}",
            self.url(service).as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn derive(config: &ProviderConfig, service: Service) -> String {
    let region = config.region.as_str();
    let domain = config.domain.trim_matches('.');
    if service == Service::Uaa {
        return format!("https://uaa.cloud.{region}.{domain}");
    }
    let label = service.host_label();
    if config.environment.is_production() {
        format!("https://{label}.{region}.{domain}")
    } else {
        format!("https://{label}-{}.{region}.{domain}", config.environment)
    }
}

fn parse_url(service: Service, raw: &str) -> Result<Url> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::validation(format!("endpoints.{service}: '{raw}' {e}")))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::validation(format!(
            "endpoints.{service}: '{raw}' is not an absolute URL"
        )));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{Environment, Region};

    fn config() -> ProviderConfig {
        ProviderConfig {
            region: Region::EuWest,
            environment: Environment::ClientTest,
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_derived_endpoints() {
        let endpoints = ServiceEndpoints::resolve(&config()).unwrap();
        assert_eq!(
            endpoints.url(Service::Iam).as_str(),
            "https://iam-client-test.eu-west.healthsuite.io/"
        );
        assert_eq!(
            endpoints.url(Service::Uaa).as_str(),
            "https://uaa.cloud.eu-west.healthsuite.io/"
        );
        assert_eq!(
            endpoints.join(Service::Blr, "/connect/blobrepository/Bucket"),
            "https://blobrepository-client-test.eu-west.healthsuite.io/connect/blobrepository/Bucket"
        );
    }

    #[test]
    fn test_production_drops_environment_infix() {
        let mut cfg = config();
        cfg.environment = Environment::Prod;
        let endpoints = ServiceEndpoints::resolve(&cfg).unwrap();
        assert_eq!(
            endpoints.url(Service::Dbs).as_str(),
            "https://databroker.eu-west.healthsuite.io/"
        );
    }

    #[test]
    fn test_override_wins() {
        let mut cfg = config();
        cfg.endpoints.idm = Some("http://127.0.0.1:9999/base".to_string());
        let endpoints = ServiceEndpoints::resolve(&cfg).unwrap();
        assert_eq!(
            endpoints.join(Service::Idm, "authorize/identity/Group"),
            "http://127.0.0.1:9999/base/authorize/identity/Group"
        );
        // iam is not affected by the idm override
        assert!(endpoints.url(Service::Iam).as_str().starts_with("https://iam-"));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut cfg = config();
        cfg.endpoints.pki = Some("not a url".to_string());
        let err = ServiceEndpoints::resolve(&cfg).unwrap_err();
        assert!(err.to_string().contains("endpoints.pki"));
    }
}
