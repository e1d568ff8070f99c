//! Configuration types for the end-to-end harness
//!
//! Built programmatically with builder methods, or loaded from environment
//! variables with [`Config::from_env`].
//!
//! # Example
//!
//! ```
//! use pipelines_e2e::config::{Config, Timeouts};
//! use std::time::Duration;
//!
//! let config = Config::new()
//!     .kubeconfig("~/.kube/config")
//!     .cluster("ci-cluster")
//!     .timeouts(Timeouts::default().api_timeout(Duration::from_secs(30)));
//!
//! assert_eq!(config.timeouts.api().timeout, Duration::from_secs(30));
//! ```

use std::time::Duration;

/// CronJob schedule the operator gives the default pruner
pub const PRUNER_SCHEDULE: &str = "0 8 * * *";

/// Name prefix of the pruner CronJob created by the operator
pub const PRUNER_NAME_PREFIX: &str = "tekton-resource-pruner";

/// Name of the console plugin deployment
pub const CONSOLE_PLUGIN_DEPLOYMENT: &str = "pipelines-console-plugin";

/// Installer set name prefixes that a healthy install must contain
pub const INSTALLERSET_NAME_PREFIXES: &[&str] = &[
    "addon-custom-clustertask",
    "addon-custom-communityclustertask",
    "addon-custom-consolecli",
    "addon-custom-openshiftconsole",
    "addon-custom-pipelinestemplate",
    "addon-custom-triggersresources",
    "addon-versioned-clustertasks",
    "pipeline-main-static",
    "pipeline-main-deployment",
    "trigger-main-static",
    "trigger-main-deployment",
    "rhosp-rbac",
];

/// Upper bound accepted for any configured timeout
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors from loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' is not a whole number of seconds")]
    InvalidDuration { var: String, value: String },

    #[error("invalid value for {var}: '{value}' (expected true or false)")]
    InvalidBool { var: String, value: String },

    #[error("invalid timeouts: {0}")]
    InvalidTimeouts(String),
}

/// An interval/timeout pair handed to the poller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    /// Time between predicate evaluations
    pub interval: Duration,
    /// Overall deadline
    pub timeout: Duration,
}

/// Timeout presets used across the harness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Interval between API polls
    pub api_retry: Duration,
    /// Deadline for the API-responsiveness preset
    pub api_timeout: Duration,
    /// Deadline for the resource-convergence preset
    pub resource_timeout: Duration,
    /// Default timeout for CLI invocations
    pub cli_timeout: Duration,
    /// Timeout for CLI deletes that may wait on finalizers
    pub delete_timeout: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            api_retry: Duration::from_secs(5),
            api_timeout: Duration::from_secs(120),
            resource_timeout: Duration::from_secs(600),
            cli_timeout: Duration::from_secs(120),
            // Results finalizers hold deletes for at least 150s
            delete_timeout: Duration::from_secs(300),
        }
    }
}

impl Timeouts {
    /// Short preset: is the API answering the way we expect?
    pub fn api(&self) -> Preset {
        Preset {
            interval: self.api_retry,
            timeout: self.api_timeout,
        }
    }

    /// Long preset: has the operator converged the resource?
    pub fn resource(&self) -> Preset {
        Preset {
            interval: self.api_retry,
            timeout: self.resource_timeout,
        }
    }

    /// Set the poll interval
    pub fn api_retry(mut self, interval: Duration) -> Self {
        self.api_retry = interval;
        self
    }

    /// Set the API-responsiveness deadline
    pub fn api_timeout(mut self, timeout: Duration) -> Self {
        self.api_timeout = timeout;
        self
    }

    /// Set the resource-convergence deadline
    pub fn resource_timeout(mut self, timeout: Duration) -> Self {
        self.resource_timeout = timeout;
        self
    }

    /// Set the CLI timeout
    pub fn cli_timeout(mut self, timeout: Duration) -> Self {
        self.cli_timeout = timeout;
        self
    }

    /// Check the presets are usable by the poller
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_retry.is_zero() {
            return Err(ConfigError::InvalidTimeouts(
                "api_retry must be greater than zero".to_string(),
            ));
        }
        if self.api_timeout < self.api_retry || self.resource_timeout < self.api_retry {
            return Err(ConfigError::InvalidTimeouts(format!(
                "timeouts must be at least the poll interval ({:?})",
                self.api_retry
            )));
        }
        let longest = [
            self.api_retry,
            self.api_timeout,
            self.resource_timeout,
            self.cli_timeout,
            self.delete_timeout,
        ]
        .into_iter()
        .max()
        .unwrap_or_default();
        if longest > MAX_TIMEOUT {
            return Err(ConfigError::InvalidTimeouts(format!(
                "{longest:?} exceeds the {MAX_TIMEOUT:?} limit"
            )));
        }
        Ok(())
    }
}

/// Harness configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Kubeconfig path, `None` means the client's default inference
    pub kubeconfig: Option<String>,

    /// Kubeconfig context to use
    pub cluster: Option<String>,

    /// External CLI binary
    pub cli: String,

    /// Timeout presets
    pub timeouts: Timeouts,

    /// Cluster has no route to public registries
    pub disconnected: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Defaults: inferred kubeconfig, `oc` on PATH, default timeouts
    pub fn new() -> Self {
        Self {
            kubeconfig: None,
            cluster: None,
            cli: "oc".to_string(),
            timeouts: Timeouts::default(),
            disconnected: false,
        }
    }

    /// Set kubeconfig path
    pub fn kubeconfig(mut self, path: impl Into<String>) -> Self {
        self.kubeconfig = Some(path.into());
        self
    }

    /// Set kubeconfig context
    pub fn cluster(mut self, context: impl Into<String>) -> Self {
        self.cluster = Some(context.into());
        self
    }

    /// Set the CLI binary
    pub fn cli(mut self, binary: impl Into<String>) -> Self {
        self.cli = binary.into();
        self
    }

    /// Set timeout presets
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Mark the cluster as disconnected
    pub fn disconnected(mut self, disconnected: bool) -> Self {
        self.disconnected = disconnected;
        self
    }

    /// Load configuration from process environment variables
    ///
    /// Reads `KUBECONFIG`, `E2E_CLUSTER`, `E2E_CLI`, `E2E_API_RETRY_SECS`,
    /// `E2E_API_TIMEOUT_SECS`, `E2E_RESOURCE_TIMEOUT_SECS`,
    /// `E2E_CLI_TIMEOUT_SECS` and `E2E_DISCONNECTED`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::new();

        if let Some(path) = lookup("KUBECONFIG").filter(|v| !v.is_empty()) {
            config.kubeconfig = Some(path);
        }
        if let Some(cluster) = lookup("E2E_CLUSTER").filter(|v| !v.is_empty()) {
            config.cluster = Some(cluster);
        }
        if let Some(cli) = lookup("E2E_CLI").filter(|v| !v.is_empty()) {
            config.cli = cli;
        }

        let secs = |var: &str| -> Result<Option<Duration>, ConfigError> {
            match lookup(var) {
                None => Ok(None),
                Some(value) => value
                    .trim()
                    .parse::<u64>()
                    .map(|s| Some(Duration::from_secs(s)))
                    .map_err(|_| ConfigError::InvalidDuration {
                        var: var.to_string(),
                        value,
                    }),
            }
        };

        if let Some(d) = secs("E2E_API_RETRY_SECS")? {
            config.timeouts.api_retry = d;
        }
        if let Some(d) = secs("E2E_API_TIMEOUT_SECS")? {
            config.timeouts.api_timeout = d;
        }
        if let Some(d) = secs("E2E_RESOURCE_TIMEOUT_SECS")? {
            config.timeouts.resource_timeout = d;
        }
        if let Some(d) = secs("E2E_CLI_TIMEOUT_SECS")? {
            config.timeouts.cli_timeout = d;
        }

        if let Some(value) = lookup("E2E_DISCONNECTED") {
            config.disconnected = match value.to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" | "" => false,
                _ => {
                    return Err(ConfigError::InvalidBool {
                        var: "E2E_DISCONNECTED".to_string(),
                        value,
                    })
                }
            };
        }

        config.timeouts.validate()?;
        Ok(config)
    }
}
