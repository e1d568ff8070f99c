//! Cluster client handle shared by every predicate
//!
//! A [`Clients`] value bundles the kube client, the scenario's namespace,
//! the cancellation token that bounds every poll it drives, and the timeout
//! presets. [`new_client_set`] provisions a fresh `releasetest-xxxxx` project
//! and hands back a [`NamespaceCleanup`] that removes it again.

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cmd::RunnerError;
use crate::config::{Config, Timeouts};
use crate::oc::Oc;

/// Prefix of generated scenario namespaces
pub const NAMESPACE_PREFIX: &str = "releasetest";

/// Errors from building clients
#[derive(Debug, thiserror::Error)]
pub enum ClientsError {
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(String),

    #[error("failed to create Kubernetes client: {0}")]
    Connect(String),

    #[error("failed to create project {namespace}: {source}")]
    Project {
        namespace: String,
        #[source]
        source: RunnerError,
    },
}

/// Names of the operator custom resources under test
///
/// `Default` is the empty value; [`ResourceNames::operator_defaults`] gives
/// the names the operator creates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceNames {
    pub tekton_config: String,
    pub tekton_pipeline: String,
    pub tekton_trigger: String,
    pub tekton_chain: String,
    pub tekton_result: String,
    pub tekton_addon: String,
    pub tekton_hub: String,
    pub pipelines_as_code: String,
    pub manual_approval_gate: String,
    /// Namespace the operator installs components into
    pub target_namespace: String,
}

impl ResourceNames {
    /// Names the operator gives its custom resources out of the box
    pub fn operator_defaults() -> Self {
        Self {
            tekton_config: "config".to_string(),
            tekton_pipeline: "pipeline".to_string(),
            tekton_trigger: "trigger".to_string(),
            tekton_chain: "chain".to_string(),
            tekton_result: "result".to_string(),
            tekton_addon: "addon".to_string(),
            tekton_hub: "hub".to_string(),
            pipelines_as_code: "pipelines-as-code".to_string(),
            manual_approval_gate: "manual-approval-gate".to_string(),
            target_namespace: "openshift-pipelines".to_string(),
        }
    }
}

/// Cluster handle for one scenario
#[derive(Clone)]
pub struct Clients {
    /// Kubernetes client
    pub kube: Client,
    /// Scenario namespace
    pub namespace: String,
    /// Cancels every poll driven through this handle
    pub cancel: CancellationToken,
    /// Interval/timeout presets
    pub timeouts: Timeouts,
}

impl fmt::Debug for Clients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clients")
            .field("namespace", &self.namespace)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl Clients {
    /// Wrap an existing client
    pub fn new(kube: Client, namespace: impl Into<String>, timeouts: Timeouts) -> Self {
        Self {
            kube,
            namespace: namespace.into(),
            cancel: CancellationToken::new(),
            timeouts,
        }
    }

    /// Connect using the kubeconfig and context from `config`
    ///
    /// Without either, falls back to the client's default inference
    /// (in-cluster, then `KUBECONFIG`, then `~/.kube/config`).
    pub async fn connect(config: &Config, namespace: &str) -> Result<Self, ClientsError> {
        let kube = if config.kubeconfig.is_none() && config.cluster.is_none() {
            Client::try_default()
                .await
                .map_err(|e| ClientsError::Connect(e.to_string()))?
        } else {
            let options = KubeConfigOptions {
                context: config.cluster.clone(),
                ..KubeConfigOptions::default()
            };
            let kube_config = match &config.kubeconfig {
                Some(path) => {
                    let kubeconfig = Kubeconfig::read_from(path)
                        .map_err(|e| ClientsError::Kubeconfig(format!("{path}: {e}")))?;
                    kube::Config::from_custom_kubeconfig(kubeconfig, &options).await
                }
                None => kube::Config::from_kubeconfig(&options).await,
            }
            .map_err(|e| ClientsError::Kubeconfig(e.to_string()))?;

            Client::try_from(kube_config).map_err(|e| ClientsError::Connect(e.to_string()))?
        };

        Ok(Self::new(kube, namespace, config.timeouts.clone()))
    }

    /// Same cluster and timeouts, different namespace, fresh cancellation
    #[must_use]
    pub fn for_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            kube: self.kube.clone(),
            namespace: namespace.into(),
            cancel: self.cancel.child_token(),
            timeouts: self.timeouts.clone(),
        }
    }
}

/// Deletes a scenario project when run
///
/// Cleanup is explicit: call [`NamespaceCleanup::run`] from the scenario's
/// after-hook. Errors are logged, never returned.
#[derive(Debug)]
#[must_use = "the project is only deleted when `run` is awaited"]
pub struct NamespaceCleanup {
    oc: Oc,
    namespace: String,
    cancel: CancellationToken,
}

impl NamespaceCleanup {
    /// Namespace this guard removes
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Cancel outstanding polls and delete the project
    pub async fn run(self) {
        self.cancel.cancel();
        self.oc.delete_project_ignore_errors(&self.namespace).await;
    }
}

/// `releasetest-` followed by a five character random suffix
pub fn generate_namespace() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{NAMESPACE_PREFIX}-{}", &id[..5])
}

/// Connect, create a fresh scenario project, return the handle and its cleanup
pub async fn new_client_set(
    config: &Config,
    oc: &Oc,
) -> Result<(Arc<Clients>, NamespaceCleanup), ClientsError> {
    let namespace = generate_namespace();
    let clients = Clients::connect(config, &namespace).await?;

    oc.new_project(&namespace)
        .await
        .map_err(|source| ClientsError::Project {
            namespace: namespace.clone(),
            source,
        })?;

    info!(namespace = %namespace, "Created test project");

    let cleanup = NamespaceCleanup {
        oc: oc.clone(),
        namespace,
        cancel: clients.cancel.clone(),
    };

    Ok((Arc::new(clients), cleanup))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_namespace_format() {
        let ns = generate_namespace();

        assert!(ns.starts_with("releasetest-"));
        assert_eq!(ns.len(), "releasetest-".len() + 5);
        assert!(ns
            .trim_start_matches("releasetest-")
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_namespace_unique() {
        let a = generate_namespace();
        let b = generate_namespace();
        assert_ne!(a, b);
    }

    #[test]
    fn test_resource_names_operator_defaults() {
        let names = ResourceNames::operator_defaults();

        assert_eq!(names.tekton_config, "config");
        assert_eq!(names.target_namespace, "openshift-pipelines");
    }

    #[test]
    fn test_resource_names_default_is_empty() {
        let names = ResourceNames::default();

        assert!(names.tekton_config.is_empty());
        assert!(names.target_namespace.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_cancels_polls_and_ignores_cli_errors() {
        let cancel = CancellationToken::new();
        let cleanup = NamespaceCleanup {
            oc: Oc::new("nonexistent_cli_xyz"),
            namespace: "releasetest-abcde".to_string(),
            cancel: cancel.clone(),
        };
        assert_eq!(cleanup.namespace(), "releasetest-abcde");

        cleanup.run().await;

        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    #[ignore] // Requires real cluster
    async fn test_new_client_set_creates_project() {
        let config = Config::from_env().expect("config");
        let oc = Oc::from_config(&config);

        let (clients, cleanup) = new_client_set(&config, &oc).await.expect("client set");

        assert!(clients.namespace.starts_with("releasetest-"));
        assert!(oc.project_exists(&clients.namespace).await.unwrap());

        cleanup.run().await;
    }
}
