//! Server configuration from environment variables.
//!
//!   BROKER_BIND_ADDR              listen address (default: 0.0.0.0:5000)
//!   BROKER_USERNAME / _PASSWORD   single basic-auth credential pair
//!   BROKER_CREDENTIALS            `user:pass,user2:pass2` allow-list
//!   BROKER_CATALOG_PATH           catalog file for the bundled backend
//!   BROKER_MIN_API_VERSION        minimum X-Broker-Api-Version (default: 2.13)
//!   BROKER_DISABLE_VERSION_CHECK  skip the version gate
//!   BROKER_DEBUG                  verbose logging

use std::path::PathBuf;

use thiserror::Error;

use crate::middleware::auth::BrokerCredentials;
use crate::middleware::version::ApiVersion;
use crate::router::ServerSettings;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}: expected `user:password` entries, got {value:?}")]
    Credentials { name: &'static str, value: String },

    #[error("{name}: BROKER_USERNAME and BROKER_PASSWORD must be set together")]
    IncompletePair { name: &'static str },

    #[error("{name}: not a version: {value:?}")]
    Version { name: &'static str, value: String },

    #[error("{name}: not a boolean: {value:?}")]
    Flag { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub bind_addr: String,
    pub credentials: Vec<BrokerCredentials>,
    pub catalog_path: Option<PathBuf>,
    pub min_api_version: ApiVersion,
    pub version_check: bool,
    pub debug: bool,
}

impl BrokerConfig {
    /// Read configuration from the process environment, after loading a
    /// `.env` file if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = lookup("BROKER_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into());

        let mut credentials = Vec::new();
        match (lookup("BROKER_USERNAME"), lookup("BROKER_PASSWORD")) {
            (Some(username), Some(password)) => {
                credentials.push(BrokerCredentials::new(username, password))
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::IncompletePair {
                    name: "BROKER_USERNAME",
                })
            }
        }
        if let Some(list) = lookup("BROKER_CREDENTIALS") {
            credentials.extend(parse_credentials(&list)?);
        }

        let min_api_version = match lookup("BROKER_MIN_API_VERSION") {
            Some(raw) => raw.parse::<ApiVersion>().map_err(|_| ConfigError::Version {
                name: "BROKER_MIN_API_VERSION",
                value: raw,
            })?,
            None => ApiVersion::MIN_SUPPORTED,
        };

        Ok(Self {
            bind_addr,
            credentials,
            catalog_path: lookup("BROKER_CATALOG_PATH").map(PathBuf::from),
            min_api_version,
            version_check: !flag(&lookup, "BROKER_DISABLE_VERSION_CHECK")?,
            debug: flag(&lookup, "BROKER_DEBUG")?,
        })
    }

    pub fn settings(&self) -> ServerSettings {
        ServerSettings {
            credentials: self.credentials.clone(),
            min_api_version: self.version_check.then_some(self.min_api_version),
        }
    }

    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "info,broker_server=debug,broker_core=debug"
        } else {
            "info"
        }
    }
}

fn parse_credentials(list: &str) -> Result<Vec<BrokerCredentials>, ConfigError> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once(':')
                .map(|(user, pass)| BrokerCredentials::new(user, pass))
                .ok_or_else(|| ConfigError::Credentials {
                    name: "BROKER_CREDENTIALS",
                    value: entry.to_string(),
                })
        })
        .collect()
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, name: &'static str) -> Result<bool, ConfigError> {
    let Some(raw) = lookup(name) else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "0" | "false" | "no" | "off" => Ok(false),
        "1" | "true" | "yes" | "on" => Ok(true),
        _ => Err(ConfigError::Flag { name, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<BrokerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BrokerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR);
        assert!(cfg.credentials.is_empty());
        assert!(cfg.version_check);
        assert_eq!(cfg.min_api_version, ApiVersion::MIN_SUPPORTED);
        assert_eq!(cfg.log_filter(), "info");
        assert_eq!(cfg.settings().min_api_version, Some(ApiVersion::MIN_SUPPORTED));
    }

    #[test]
    fn credentials_from_pair_and_list() {
        let cfg = config(&[
            ("BROKER_USERNAME", "admin"),
            ("BROKER_PASSWORD", "secret"),
            ("BROKER_CREDENTIALS", "cf:pw1, k8s:pw:with:colons"),
        ])
        .unwrap();
        let users: Vec<&str> = cfg.credentials.iter().map(|c| c.username.as_str()).collect();
        assert_eq!(users, vec!["admin", "cf", "k8s"]);
        assert_eq!(cfg.credentials[2].password, "pw:with:colons");
    }

    #[test]
    fn half_a_pair_is_rejected() {
        let err = config(&[("BROKER_USERNAME", "admin")]).unwrap_err();
        assert!(matches!(err, ConfigError::IncompletePair { .. }));
    }

    #[test]
    fn malformed_credentials_are_rejected() {
        let err = config(&[("BROKER_CREDENTIALS", "nocolon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Credentials { .. }));
    }

    #[test]
    fn version_gate_can_be_disabled() {
        let cfg = config(&[
            ("BROKER_DISABLE_VERSION_CHECK", "true"),
            ("BROKER_MIN_API_VERSION", "2.14"),
            ("BROKER_DEBUG", "1"),
        ])
        .unwrap();
        assert!(!cfg.version_check);
        assert_eq!(cfg.settings().min_api_version, None);
        assert_eq!(cfg.min_api_version, "2.14".parse::<ApiVersion>().unwrap());
        assert!(cfg.debug);
    }

    #[test]
    fn bad_flag_and_version_values() {
        assert!(matches!(
            config(&[("BROKER_DEBUG", "maybe")]).unwrap_err(),
            ConfigError::Flag { .. }
        ));
        assert!(matches!(
            config(&[("BROKER_MIN_API_VERSION", "two")]).unwrap_err(),
            ConfigError::Version { .. }
        ));
    }
}
