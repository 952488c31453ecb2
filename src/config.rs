//! Operator configuration

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable prefix, e.g. `DESCHEDULER_OPERATOR_DEFAULT_IMAGE`.
const ENV_PREFIX: &str = "DESCHEDULER_OPERATOR";

pub const VALID_STRATEGIES: [&str; 4] = [
    "duplicates",
    "interpodantiaffinity",
    "lownodeutilization",
    "nodeaffinity",
];

pub const VALID_FLAGS: [&str; 3] = ["descheduling-interval", "dry-run", "node-selector"];

/// Descheduler command with the mounted policy file and log level.
pub const DESCHEDULER_COMMAND: [&str; 5] = [
    "/bin/descheduler",
    "--policy-config-file",
    "/policy-dir/policy.yaml",
    "--v",
    "5",
];

/// Operator configuration, read from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    /// Image used when a Descheduler does not name one
    #[serde(default = "default_image")]
    pub default_image: String,

    /// Service account the descheduler pods run as
    #[serde(default = "default_service_account")]
    pub service_account: String,

    /// Priority class of the descheduler pods
    #[serde(default = "default_priority_class")]
    pub priority_class: String,

    /// Requeue delay after a failed call to the API server
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,

    /// Requeue delay after a Descheduler failed validation. Unset means the
    /// object is only reconciled again once it changes.
    #[serde(default)]
    pub invalid_intent_requeue_secs: Option<u64>,

    #[serde(default)]
    pub log_json: bool,
}

fn default_image() -> String {
    "skckadiyala/descheduler:v0.9.0".to_string()
}

fn default_service_account() -> String {
    "descheduler-operator".to_string()
}

fn default_priority_class() -> String {
    "system-cluster-critical".to_string()
}

fn default_retry_after_secs() -> u64 {
    3
}

impl Default for OperatorConfig {
    fn default() -> Self {
        OperatorConfig {
            default_image: default_image(),
            service_account: default_service_account(),
            priority_class: default_priority_class(),
            retry_after_secs: default_retry_after_secs(),
            invalid_intent_requeue_secs: None,
            log_json: false,
        }
    }
}

impl OperatorConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        Self::from_builder(
            ::config::Config::builder().add_source(
                ::config::Environment::with_prefix(ENV_PREFIX).try_parsing(true),
            ),
        )
    }

    fn from_builder(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<Self> {
        builder
            .build()
            .context("failed to read operator configuration")?
            .try_deserialize()
            .context("invalid operator configuration")
    }

    pub fn retry_after(&self) -> Duration {
        Duration::from_secs(self.retry_after_secs)
    }

    pub fn invalid_intent_requeue(&self) -> Option<Duration> {
        self.invalid_intent_requeue_secs.map(Duration::from_secs)
    }

    /// The fixed tables the convergence engine works against.
    pub fn rules(&self) -> Rules {
        Rules {
            default_image: self.default_image.clone(),
            service_account: self.service_account.clone(),
            priority_class: self.priority_class.clone(),
            ..Rules::default()
        }
    }
}

/// Allow-lists and job template values, fixed for the lifetime of the
/// controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rules {
    pub strategies: Vec<String>,
    pub flags: Vec<String>,
    pub command: Vec<String>,
    pub default_image: String,
    pub service_account: String,
    pub priority_class: String,
}

impl Default for Rules {
    fn default() -> Self {
        Rules {
            strategies: VALID_STRATEGIES.iter().map(|s| s.to_string()).collect(),
            flags: VALID_FLAGS.iter().map(|s| s.to_string()).collect(),
            command: DESCHEDULER_COMMAND.iter().map(|s| s.to_string()).collect(),
            default_image: default_image(),
            service_account: default_service_account(),
            priority_class: default_priority_class(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_json(json: &str) -> OperatorConfig {
        OperatorConfig::from_builder(
            ::config::Config::builder()
                .add_source(::config::File::from_str(json, ::config::FileFormat::Json)),
        )
        .unwrap()
    }

    #[test]
    fn empty_source_yields_defaults() {
        let config = from_json("{}");
        assert_eq!(config.default_image, "skckadiyala/descheduler:v0.9.0");
        assert_eq!(config.service_account, "descheduler-operator");
        assert_eq!(config.retry_after(), Duration::from_secs(3));
        assert_eq!(config.invalid_intent_requeue(), None);
        assert!(!config.log_json);
    }

    #[test]
    fn overrides_flow_into_rules() {
        let config = from_json(
            r#"{
                "default_image": "registry.local/descheduler:v0.10.0",
                "invalid_intent_requeue_secs": 60
            }"#,
        );
        assert_eq!(config.invalid_intent_requeue(), Some(Duration::from_secs(60)));

        let rules = config.rules();
        assert_eq!(rules.default_image, "registry.local/descheduler:v0.10.0");
        assert_eq!(rules.strategies.len(), 4);
        assert_eq!(rules.command[0], "/bin/descheduler");
    }
}
