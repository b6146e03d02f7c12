use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ConfigError;

/// Platform regions the provider knows how to address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    #[default]
    UsEast,
    UsWest,
    EuWest,
    EuCentral,
    Sa1,
    Ca1,
    Apac2,
    Apac3,
    Cn1,
}

impl Region {
    pub const ALL: [Region; 9] = [
        Region::UsEast,
        Region::UsWest,
        Region::EuWest,
        Region::EuCentral,
        Region::Sa1,
        Region::Ca1,
        Region::Apac2,
        Region::Apac3,
        Region::Cn1,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Region::UsEast => "us-east",
            Region::UsWest => "us-west",
            Region::EuWest => "eu-west",
            Region::EuCentral => "eu-central",
            Region::Sa1 => "sa1",
            Region::Ca1 => "ca1",
            Region::Apac2 => "apac2",
            Region::Apac3 => "apac3",
            Region::Cn1 => "cn1",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Region {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Region::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Region::ALL.iter().map(|r| r.as_str()).collect();
                ConfigError::validation(format!("region '{s}' must be one of {valid:?}"))
            })
    }
}

/// Deployment environment within a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Environment {
    Dev,
    Preview,
    #[default]
    ClientTest,
    #[serde(alias = "production")]
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Preview => "preview",
            Environment::ClientTest => "client-test",
            Environment::Prod => "prod",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Environment::Dev),
            "preview" => Ok(Environment::Preview),
            "client-test" => Ok(Environment::ClientTest),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(ConfigError::validation(format!(
                "environment '{other}' must be one of [\"dev\", \"preview\", \"client-test\", \"prod\", \"production\"]"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_parse() {
        assert_eq!("eu-west".parse::<Region>().unwrap(), Region::EuWest);
        let err = "mars-1".parse::<Region>().unwrap_err();
        assert!(err.to_string().contains("mars-1"));
    }

    #[test]
    fn test_environment_production_alias() {
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Prod);
        let env: Environment = serde_json::from_str("\"production\"").unwrap();
        assert_eq!(env, Environment::Prod);
        assert!(env.is_production());
        assert!("staging".parse::<Environment>().is_err());
    }
}
