use super::{describe_error, is_not_found, presence_error, K8sError};
use crate::clients::Clients;
use crate::config::Preset;
use crate::poll::{poll_until, wait_for_absence, PollError, PollSpec, PredicateError};
use crate::wait::ResourceState;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, DeleteParams};
use std::time::Duration;
use tracing::info;

const DELETE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// True when exactly `replicas` are available and none are unavailable
pub fn deployment_ready(deployment: &Deployment, replicas: i32) -> bool {
    let status = deployment.status.as_ref();
    let available = status.and_then(|s| s.available_replicas).unwrap_or(0);
    let unavailable = status.and_then(|s| s.unavailable_replicas).unwrap_or(0);
    available == replicas && unavailable == 0
}

impl Clients {
    /// Wait until `name` has exactly `replicas` available replicas
    ///
    /// A missing deployment is waited for, not an error.
    pub async fn wait_for_deployment(
        &self,
        namespace: &str,
        name: &str,
        replicas: i32,
        preset: Preset,
    ) -> Result<(), K8sError> {
        let api: Api<Deployment> = Api::namespaced(self.kube.clone(), namespace);
        let api = &api;
        let spec = PollSpec::new(format!("deployment/{namespace}/{name}")).preset(preset);

        let outcome = poll_until(&self.cancel, &spec, move || async move {
            match api.get(name).await {
                Ok(deployment) if deployment_ready(&deployment, replicas) => Ok(true),
                Ok(deployment) => Err(PredicateError::NotYet(format!(
                    "{} (want {replicas})",
                    deployment.state_description()
                ))),
                Err(e) => Err(presence_error(&e, "Deployment", name)),
            }
        })
        .await;

        match outcome {
            Ok(()) => {}
            Err(PollError::Timeout(err)) => {
                let events = self.object_events(namespace, name).await;
                return Err(PollError::Timeout(err.with_events(events)).into());
            }
            Err(e) => return Err(e.into()),
        }

        info!(namespace = %namespace, name = %name, replicas = replicas, "Deployment available");
        Ok(())
    }

    /// Wait for each deployment to have one available replica
    pub async fn validate_deployments(
        &self,
        namespace: &str,
        names: &[&str],
    ) -> Result<(), K8sError> {
        for name in names {
            match self
                .wait_for_deployment(namespace, name, 1, self.timeouts.api())
                .await
            {
                Ok(()) => {}
                Err(K8sError::Poll(source)) => {
                    return Err(K8sError::Deployment {
                        name: (*name).to_string(),
                        source,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Wait until `name` is gone; 404 and 410 both count
    pub async fn wait_for_deployment_deletion(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), K8sError> {
        let api: Api<Deployment> = Api::namespaced(self.kube.clone(), namespace);
        let api = &api;
        let spec =
            PollSpec::new(format!("deployment/{namespace}/{name}")).preset(self.timeouts.api());

        wait_for_absence(&self.cancel, &spec, move || async move {
            match api.get(name).await {
                Ok(_) => Ok(true),
                Err(e) if is_not_found(&e) => Ok(false),
                Err(e) => Err(PredicateError::Terminal(describe_error(&e, "Deployment", name))),
            }
        })
        .await?;

        info!(namespace = %namespace, name = %name, "Deployment deleted");
        Ok(())
    }

    /// Delete `name` and wait for it to disappear
    pub async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), K8sError> {
        let api: Api<Deployment> = Api::namespaced(self.kube.clone(), namespace);

        match tokio::time::timeout(
            DELETE_REQUEST_TIMEOUT,
            api.delete(name, &DeleteParams::default()),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(K8sError::DeleteError(format!(
                    "{} in namespace {namespace}",
                    describe_error(&e, "Deployment", name)
                )));
            }
            Err(_) => {
                return Err(K8sError::DeleteError(format!(
                    "Deployment '{name}' in namespace {namespace}: request timed out after {DELETE_REQUEST_TIMEOUT:?}"
                )));
            }
        }

        self.wait_for_deployment_deletion(namespace, name).await
    }

    /// Wait for each deployment to be deleted
    pub async fn validate_deployment_deletion(
        &self,
        namespace: &str,
        names: &[&str],
    ) -> Result<(), K8sError> {
        for name in names {
            match self.wait_for_deployment_deletion(namespace, name).await {
                Ok(()) => {}
                Err(K8sError::Poll(source)) => {
                    return Err(K8sError::Deployment {
                        name: (*name).to_string(),
                        source,
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};

    fn deployment(available: Option<i32>, unavailable: Option<i32>) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                available_replicas: available,
                unavailable_replicas: unavailable,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_ready_when_available_matches() {
        assert!(deployment_ready(&deployment(Some(1), None), 1));
        assert!(deployment_ready(&deployment(Some(1), Some(0)), 1));
    }

    #[test]
    fn test_not_ready_with_unavailable_replicas() {
        assert!(!deployment_ready(&deployment(Some(1), Some(1)), 1));
    }

    #[test]
    fn test_not_ready_with_more_than_wanted() {
        assert!(!deployment_ready(&deployment(Some(2), None), 1));
    }

    #[test]
    fn test_no_status_is_zero_available() {
        let d = Deployment::default();
        assert!(!deployment_ready(&d, 1));
        assert!(deployment_ready(&d, 0));
    }
}
