use super::{describe_error, K8sError};
use crate::clients::Clients;
use crate::config::Preset;
use crate::poll::{poll_until, PollSpec, PredicateError};
use crate::resolver::{resolve, ResolvedCoordinate, ResourceCoordinate};
use futures::stream::BoxStream;
use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::runtime::watcher;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

impl Clients {
    async fn dynamic_api(
        &self,
        coordinate: &ResourceCoordinate,
        namespace: Option<&str>,
    ) -> Result<(Api<DynamicObject>, ResolvedCoordinate), K8sError> {
        let resolved = resolve(coordinate, &self.kube).await?;
        let ar = resolved.to_api_resource();

        let api = match namespace {
            Some(ns) if resolved.namespaced => Api::namespaced_with(self.kube.clone(), ns, &ar),
            _ => Api::all_with(self.kube.clone(), &ar),
        };
        Ok((api, resolved))
    }

    /// Wait until discovery serves `coordinate`, e.g. after a CRD install
    pub async fn wait_for_resource_type(
        &self,
        coordinate: &ResourceCoordinate,
        preset: Preset,
    ) -> Result<ResolvedCoordinate, K8sError> {
        let kube = &self.kube;
        let resolved: Mutex<Option<ResolvedCoordinate>> = Mutex::new(None);
        let resolved_ref = &resolved;
        let spec = PollSpec::new(format!("resourcetype/{coordinate}")).preset(preset);

        poll_until(&self.cancel, &spec, move || async move {
            let found = resolve(coordinate, kube).await?;
            *resolved_ref.lock().unwrap_or_else(PoisonError::into_inner) = Some(found);
            Ok::<_, PredicateError>(true)
        })
        .await?;

        let resolved = resolved
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .ok_or_else(|| K8sError::GetError(format!("resource type {coordinate} not resolved")))?;

        info!(api_version = %resolved.api_version(), resource = %resolved.resource, "Resource type served");
        Ok(resolved)
    }

    /// Fetch an object whose version is resolved through discovery
    ///
    /// `namespace` is ignored for cluster-scoped resources and required for
    /// namespaced ones.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let run = clients
    ///     .get_dynamic(&ResourceCoordinate::pipeline_runs(), "build-1", Some("ns"))
    ///     .await?;
    /// println!("{:?}", run.data["status"]);
    /// ```
    pub async fn get_dynamic(
        &self,
        coordinate: &ResourceCoordinate,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<DynamicObject, K8sError> {
        let (api, resolved) = self.dynamic_api(coordinate, namespace).await?;
        require_namespace(&resolved, name, namespace)?;
        api.get(name)
            .await
            .map_err(|e| K8sError::GetError(describe_error(&e, &resolved.kind, name)))
    }

    /// List objects whose version is resolved through discovery
    ///
    /// `None` lists namespaced resources across all namespaces.
    pub async fn list_dynamic(
        &self,
        coordinate: &ResourceCoordinate,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>, K8sError> {
        let (api, resolved) = self.dynamic_api(coordinate, namespace).await?;
        let list = api
            .list(&kube::api::ListParams::default())
            .await
            .map_err(|e| K8sError::ListError(format!("{}: {e}", resolved.resource)))?;
        Ok(list.items)
    }

    /// Watch objects whose version is resolved through discovery
    ///
    /// The stream ends only when dropped; watch errors are yielded, and the
    /// watcher re-lists after them.
    pub async fn watch_dynamic(
        &self,
        coordinate: &ResourceCoordinate,
        namespace: Option<&str>,
    ) -> Result<BoxStream<'static, Result<watcher::Event<DynamicObject>, watcher::Error>>, K8sError>
    {
        let (api, resolved) = self.dynamic_api(coordinate, namespace).await?;
        debug!(
            api_version = %resolved.api_version(),
            resource = %resolved.resource,
            namespace = ?namespace,
            "Watching dynamic resource"
        );
        Ok(watcher(api, watcher::Config::default()).boxed())
    }
}

fn require_namespace(
    resolved: &ResolvedCoordinate,
    name: &str,
    namespace: Option<&str>,
) -> Result<(), K8sError> {
    if resolved.namespaced && namespace.is_none() {
        return Err(K8sError::GetError(format!(
            "{} \"{name}\" is namespaced, but no namespace was given",
            resolved.kind
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinate(namespaced: bool) -> ResolvedCoordinate {
        ResolvedCoordinate {
            group: "tekton.dev".to_string(),
            version: "v1".to_string(),
            resource: "pipelineruns".to_string(),
            kind: "PipelineRun".to_string(),
            namespaced,
        }
    }

    #[test]
    fn test_namespaced_get_needs_namespace() {
        let err = require_namespace(&coordinate(true), "build-1", None).unwrap_err();

        assert!(matches!(err, K8sError::GetError(_)));
        assert!(err.to_string().contains("PipelineRun \"build-1\" is namespaced"));
    }

    #[test]
    fn test_namespace_optional_when_given_or_cluster_scoped() {
        assert!(require_namespace(&coordinate(true), "build-1", Some("ns")).is_ok());
        assert!(require_namespace(&coordinate(false), "config", None).is_ok());
    }
}
