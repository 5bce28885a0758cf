//! # Configuration Module
//!
//! Process-wide tunables for balancer sessions and discovery watchers,
//! injected at construction time rather than hardcoded into the core.
//! Configuration is plain serde data loadable from YAML, with sensible
//! defaults for every field.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::balancing::StrategyKind;
use crate::core::error::{BalanceError, BalanceResult};

/// Default declared weight applied when registry metadata is missing or
/// invalid
pub const DEFAULT_WEIGHT: u32 = 10;

/// Fixed delay between discovery retry attempts
pub const DEFAULT_DISCOVERY_BACKOFF: Duration = Duration::from_secs(3);

/// Registry key suffix under which server instances register
pub const SERVER_ROLE: &str = "s";

/// Registry key suffix under which client instances register.
///
/// This crate never registers clients itself; the constant pins down the
/// path contract shared with the server-side registration code, which
/// writes both roles under the same service node.
pub const CLIENT_ROLE: &str = "c";

const NODE_CLUSTER_ENV: &str = "NODE_CLUSTER";

/// Configuration for one balancer session and its companion watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BalanceConfig {
    /// Selection strategy used for every pick on this session
    pub strategy: StrategyKind,
    /// Whether declared weights are honored at all; when false, round robin
    /// and random run unweighted over the full candidate list
    pub weighted: bool,
    /// Weight substituted when metadata is missing, unparseable, or negative
    pub default_weight: u32,
    /// Fixed backoff between discovery listing/watching retries
    #[serde(with = "humantime_serde")]
    pub discovery_backoff: Duration,
    /// Registry path layout shared with the server-side registration code
    pub registry: RegistryConfig,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::RoundRobin,
            weighted: true,
            default_weight: DEFAULT_WEIGHT,
            discovery_backoff: DEFAULT_DISCOVERY_BACKOFF,
            registry: RegistryConfig::default(),
        }
    }
}

impl BalanceConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> BalanceResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> BalanceResult<()> {
        if self.registry.schema.is_empty() {
            return Err(BalanceError::config("registry schema must not be empty"));
        }
        if self.registry.group.is_empty() {
            return Err(BalanceError::config("registry group must not be empty"));
        }
        if self.discovery_backoff.is_zero() {
            return Err(BalanceError::config(
                "discovery backoff must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Registry path layout: services register their endpoints under
/// `{schema}/{group}/{service}/{role}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// Top-level registry namespace
    pub schema: String,
    /// Deployment group; defaults to the `NODE_CLUSTER` environment variable
    /// when set
    pub group: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            schema: "osf".to_string(),
            group: std::env::var(NODE_CLUSTER_ENV).unwrap_or_else(|_| "default".to_string()),
        }
    }
}

impl RegistryConfig {
    /// Registry prefix under which a service's server instances register
    pub fn service_prefix(&self, service: &str) -> String {
        format!("{}/{}/{}/{}", self.schema, self.group, service, SERVER_ROLE)
    }

    /// Registry prefix under which a service's clients register themselves.
    ///
    /// Provided for callers that publish client presence next to the server
    /// entries; the watcher only ever reads [`Self::service_prefix`].
    pub fn client_prefix(&self, service: &str) -> String {
        format!("{}/{}/{}/{}", self.schema, self.group, service, CLIENT_ROLE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = BalanceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_weight, DEFAULT_WEIGHT);
        assert_eq!(config.discovery_backoff, Duration::from_secs(3));
    }

    #[test]
    fn service_prefix_layout() {
        let registry = RegistryConfig {
            schema: "osf".to_string(),
            group: "staging".to_string(),
        };
        assert_eq!(registry.service_prefix("greeter"), "osf/staging/greeter/s");
        assert_eq!(registry.client_prefix("greeter"), "osf/staging/greeter/c");
    }

    #[test]
    fn yaml_round_trip() {
        let yaml = r#"
strategy: smooth_weighted_round_robin
weighted: true
default_weight: 5
discovery_backoff: 500ms
registry:
  schema: osf
  group: prod
"#;
        let config: BalanceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.strategy, StrategyKind::SmoothWeightedRoundRobin);
        assert_eq!(config.default_weight, 5);
        assert_eq!(config.discovery_backoff, Duration::from_millis(500));
        assert_eq!(config.registry.group, "prod");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_from_yaml_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "strategy: weighted_random\ndefault_weight: 20\n").unwrap();

        let config = BalanceConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.strategy, StrategyKind::WeightedRandom);
        assert_eq!(config.default_weight, 20);
        assert!(config.weighted);
    }

    #[test]
    fn rejects_empty_schema() {
        let config = BalanceConfig {
            registry: RegistryConfig {
                schema: String::new(),
                group: "default".to_string(),
            },
            ..BalanceConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
