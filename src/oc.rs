//! Typed wrapper over the cluster CLI
//!
//! Every call goes through [`crate::cmd`] and logs the CLI output. Registered
//! once per suite in the [`Store`](crate::store::Store) under
//! [`CLI`](crate::store::CLI).

use std::time::Duration;
use tracing::info;

use crate::cmd::{self, RunResult, RunnerError};
use crate::config::{Config, CONSOLE_PLUGIN_DEPLOYMENT};

/// Namespace label that makes the operator enable TLS on event listeners
pub const EVENTLISTENER_TLS_LABEL: &str = "operator.tekton.dev/enable-annotation=enabled";

/// CloudEvent types an event listener emits for one handled trigger
pub const TRIGGER_EVENT_TYPES: &[&str] = &[
    "dev.tekton.event.triggers.started.v1",
    "dev.tekton.event.triggers.successful.v1",
    "dev.tekton.event.triggers.done.v1",
];

/// Handle for invoking the cluster CLI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Oc {
    /// CLI binary
    pub binary: String,
    /// Timeout for ordinary calls
    pub timeout: Duration,
    /// Timeout for deletes that may block on finalizers
    pub delete_timeout: Duration,
}

impl Default for Oc {
    fn default() -> Self {
        Self::new("oc")
    }
}

impl Oc {
    /// Create a handle for `binary` with default timeouts
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            timeout: cmd::DEFAULT_TIMEOUT,
            delete_timeout: Duration::from_secs(300),
        }
    }

    /// Create a handle from harness configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            binary: config.cli.clone(),
            timeout: config.timeouts.cli_timeout,
            delete_timeout: config.timeouts.delete_timeout,
        }
    }

    /// Set the call timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run arbitrary arguments, require success
    pub async fn must_succeed(&self, args: &[&str]) -> Result<RunResult, RunnerError> {
        let result = cmd::must_succeed(&self.binary, args, self.timeout).await?;
        info!(output = %result.stdout.trim_end(), "{} {}", self.binary, args.join(" "));
        Ok(result)
    }

    /// Run arbitrary arguments, ignore the exit code
    pub async fn run(&self, args: &[&str]) -> Result<RunResult, RunnerError> {
        cmd::run_with_timeout(&self.binary, args, self.timeout).await
    }

    /// `create -f <path> -n <namespace>`
    pub async fn create(&self, path: &str, namespace: &str) -> Result<(), RunnerError> {
        self.must_succeed(&["create", "-f", path, "-n", namespace])
            .await
            .map(drop)
    }

    /// `apply -f <path> -n <namespace>`
    pub async fn apply(&self, path: &str, namespace: &str) -> Result<(), RunnerError> {
        self.must_succeed(&["apply", "-f", path, "-n", namespace])
            .await
            .map(drop)
    }

    /// `delete -f <path> -n <namespace>` with the long delete timeout
    pub async fn delete(&self, path: &str, namespace: &str) -> Result<(), RunnerError> {
        let args = ["delete", "-f", path, "-n", namespace];
        let result = cmd::must_succeed(&self.binary, &args, self.delete_timeout).await?;
        info!(output = %result.stdout.trim_end(), "{} {}", self.binary, args.join(" "));
        Ok(())
    }

    /// `delete <kind> <name> -n <namespace>` with the long delete timeout
    pub async fn delete_resource(
        &self,
        kind: &str,
        name: &str,
        namespace: &str,
    ) -> Result<(), RunnerError> {
        let args = ["delete", kind, name, "-n", namespace];
        let result = cmd::must_succeed(&self.binary, &args, self.delete_timeout).await?;
        info!(output = %result.stdout.trim_end(), "{} {}", self.binary, args.join(" "));
        Ok(())
    }

    /// `new-project <namespace>`
    pub async fn new_project(&self, namespace: &str) -> Result<(), RunnerError> {
        self.must_succeed(&["new-project", namespace]).await.map(drop)
    }

    /// `delete project <namespace>`
    pub async fn delete_project(&self, namespace: &str) -> Result<(), RunnerError> {
        self.must_succeed(&["delete", "project", namespace])
            .await
            .map(drop)
    }

    /// `delete project <namespace>`, logging instead of failing
    pub async fn delete_project_ignore_errors(&self, namespace: &str) {
        match self.run(&["delete", "project", namespace]).await {
            Ok(result) => info!(output = %result.combined().trim_end(), namespace = %namespace, "Deleted project"),
            Err(e) => info!(error = %e, namespace = %namespace, "Project delete failed, ignoring"),
        }
    }

    /// True when `project <name>` switches successfully
    pub async fn project_exists(&self, namespace: &str) -> Result<bool, RunnerError> {
        let result = self.run(&["project", namespace]).await?;
        Ok(result.passed() && !result.combined().contains("error"))
    }

    /// True when `get secret` does not report an error
    pub async fn secret_exists(&self, name: &str, namespace: &str) -> Result<bool, RunnerError> {
        let result = self.run(&["get", "secret", name, "-n", namespace]).await?;
        Ok(!result.combined().contains("Error"))
    }

    /// Create the secret the webhook integration reads its tokens from
    pub async fn create_secret_for_webhook(
        &self,
        token: &str,
        webhook_secret: &str,
        namespace: &str,
    ) -> Result<(), RunnerError> {
        let token = format!("provider.token={token}");
        let webhook = format!("webhook.secret={webhook_secret}");
        self.must_succeed(&[
            "create",
            "secret",
            "generic",
            "gitlab-webhook-config",
            "--from-literal",
            &token,
            "--from-literal",
            &webhook,
            "-n",
            namespace,
        ])
        .await
        .map(drop)
    }

    /// Raw `.data` of a secret as printed by jsonpath
    pub async fn secret_data(&self, name: &str, namespace: &str) -> Result<String, RunnerError> {
        let result = self
            .must_succeed(&["get", "secrets", name, "-n", namespace, "-o", "jsonpath={.data}"])
            .await?;
        Ok(result.stdout)
    }

    /// `label namespace <namespace> <label>`
    pub async fn label_namespace(&self, namespace: &str, label: &str) -> Result<(), RunnerError> {
        self.must_succeed(&["label", "namespace", namespace, label])
            .await
            .map(drop)
    }

    /// `annotate namespace <namespace> <annotation>`
    pub async fn annotate_namespace(
        &self,
        namespace: &str,
        annotation: &str,
    ) -> Result<(), RunnerError> {
        self.must_succeed(&["annotate", "namespace", namespace, annotation])
            .await
            .map(drop)
    }

    /// Merge-patch the `TektonConfig` named `config`
    pub async fn update_tekton_config(&self, patch: &str) -> Result<(), RunnerError> {
        self.must_succeed(&["patch", "tektonconfig", "config", "-p", patch, "--type=merge"])
            .await
            .map(drop)
    }

    /// Merge-patch `TektonConfig`, expecting the admission webhook to reject it
    ///
    /// Fails unless the CLI exits 1 and stderr contains `expected_error`.
    pub async fn update_tekton_config_expect_failure(
        &self,
        patch: &str,
        expected_error: &str,
    ) -> Result<(), RunnerError> {
        let args = ["patch", "tektonconfig", "config", "-p", patch, "--type=merge"];
        let result = cmd::assert_exit_code(1, &self.binary, &args, self.timeout).await?;
        if !result.stderr.contains(expected_error) {
            return Err(RunnerError::UnexpectedOutput {
                command: format!("{} {}", self.binary, args.join(" ")),
                expected: format!("stderr containing {expected_error:?}"),
                output: result.stderr,
            });
        }
        Ok(())
    }

    /// JSON-patch away `spec.pruner` from `TektonConfig`
    ///
    /// A config without a pruner section makes the patch fail; that is
    /// logged, not returned.
    pub async fn remove_pruner_config(&self) -> Result<(), RunnerError> {
        let patch = r#"[{ "op": "remove", "path": "/spec/pruner" }]"#;
        let result = self
            .run(&["patch", "tektonconfig", "config", "-p", patch, "--type=json"])
            .await?;
        info!(exit_code = result.exit_code, output = %result.combined().trim_end(), "Removed pruner config");
        Ok(())
    }

    /// `annotate namespace <namespace> <annotation>`, logging instead of failing
    pub async fn annotate_namespace_ignore_errors(&self, namespace: &str, annotation: &str) {
        match self.run(&["annotate", "namespace", namespace, annotation]).await {
            Ok(result) => info!(output = %result.combined().trim_end(), namespace = %namespace, "Annotated namespace"),
            Err(e) => info!(error = %e, namespace = %namespace, "Namespace annotate failed, ignoring"),
        }
    }

    /// Label `namespace` so its event listeners are served over TLS
    pub async fn enable_tls_config_for_eventlisteners(
        &self,
        namespace: &str,
    ) -> Result<(), RunnerError> {
        self.label_namespace(namespace, EVENTLISTENER_TLS_LABEL).await
    }

    /// Fail unless `namespace` has the started, successful and done trigger events
    pub async fn verify_eventlistener_events(&self, namespace: &str) -> Result<(), RunnerError> {
        let args = ["-n", namespace, "get", "events"];
        let result = self.run(&args).await?;
        let output = result.combined();

        let missing = missing_trigger_events(&output);
        if !missing.is_empty() {
            return Err(RunnerError::UnexpectedOutput {
                command: format!("{} {}", self.binary, args.join(" ")),
                expected: format!("trigger events {}", missing.join(", ")),
                output,
            });
        }
        Ok(())
    }

    /// Add the pipelines plugin to the cluster console, if it is not there yet
    pub async fn enable_console_plugin(&self) -> Result<(), RunnerError> {
        let args = [
            "get",
            "consoles.operator.openshift.io",
            "cluster",
            "-o",
            "jsonpath={.spec.plugins}",
        ];
        let current = self.must_succeed(&args).await?.stdout;

        let plugins = plugins_with_console(&current).map_err(|e| RunnerError::UnexpectedOutput {
            command: format!("{} {}", self.binary, args.join(" ")),
            expected: format!("a JSON list of plugin names ({e})"),
            output: current.clone(),
        })?;
        let Some(plugins) = plugins else {
            info!(plugin = CONSOLE_PLUGIN_DEPLOYMENT, "Console plugin already enabled");
            return Ok(());
        };

        let patch = serde_json::json!({ "spec": { "plugins": plugins } }).to_string();
        self.must_succeed(&[
            "patch",
            "consoles.operator.openshift.io",
            "cluster",
            "-p",
            &patch,
            "--type=merge",
        ])
        .await
        .map(drop)
    }
}

/// Trigger event types absent from `get events` output
pub fn missing_trigger_events(output: &str) -> Vec<&'static str> {
    TRIGGER_EVENT_TYPES
        .iter()
        .copied()
        .filter(|event| !output.contains(event))
        .collect()
}

/// Console plugin list with the pipelines plugin appended
///
/// `current` is the jsonpath output of `.spec.plugins`, empty when unset.
/// Returns `None` when the plugin is already enabled.
pub fn plugins_with_console(current: &str) -> Result<Option<Vec<String>>, serde_json::Error> {
    let current = current.trim();
    let mut plugins: Vec<String> = if current.is_empty() {
        Vec::new()
    } else {
        serde_json::from_str(current)?
    };

    if plugins.iter().any(|p| p == CONSOLE_PLUGIN_DEPLOYMENT) {
        return Ok(None);
    }
    plugins.push(CONSOLE_PLUGIN_DEPLOYMENT.to_string());
    Ok(Some(plugins))
}
