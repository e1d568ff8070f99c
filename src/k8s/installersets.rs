use super::K8sError;
use crate::clients::Clients;
use crate::config::INSTALLERSET_NAME_PREFIXES;
use crate::resolver::ResourceCoordinate;
use kube::api::DynamicObject;
use tracing::{debug, info};

const CONSOLE_PREFIXES: &[&str] = &["addon-custom-consolecli", "addon-custom-openshiftconsole"];
const COMMUNITY_PREFIX: &str = "addon-custom-communityclustertask";

/// True when the object has a `Ready` condition with status `True`
pub fn installer_set_ready(obj: &DynamicObject) -> bool {
    obj.data["status"]["conditions"]
        .as_array()
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c["type"] == "Ready" && c["status"] == "True")
        })
}

/// Prefixes from `prefixes` that no name in `names` starts with
///
/// Console prefixes are skipped when the console is disabled, the
/// community prefix when the cluster is disconnected.
pub fn missing_prefixes<'a>(
    names: &[&str],
    prefixes: &[&'a str],
    console_enabled: bool,
    disconnected: bool,
) -> Vec<&'a str> {
    prefixes
        .iter()
        .copied()
        .filter(|prefix| console_enabled || !CONSOLE_PREFIXES.contains(prefix))
        .filter(|prefix| !(disconnected && *prefix == COMMUNITY_PREFIX))
        .filter(|prefix| !names.iter().any(|n| n.starts_with(prefix)))
        .collect()
}

impl Clients {
    async fn installer_sets(&self) -> Result<Vec<DynamicObject>, K8sError> {
        self.list_dynamic(&ResourceCoordinate::tekton_installer_sets(), None)
            .await
            .map_err(|e| K8sError::ListError(format!("error getting tektoninstallersets: {e}")))
    }

    /// Every `TektonInstallerSet` reports Ready
    pub async fn validate_installerset_status(&self) -> Result<(), K8sError> {
        let sets = self.installer_sets().await?;
        let failed: Vec<String> = sets
            .iter()
            .filter(|set| !installer_set_ready(set))
            .filter_map(|set| set.metadata.name.clone())
            .collect();

        if !failed.is_empty() {
            return Err(K8sError::Assertion(format!(
                "installer sets not ready: {}",
                failed.join(",")
            )));
        }
        info!(count = sets.len(), "All installer sets ready");
        Ok(())
    }

    /// An installer set exists for every expected name prefix
    pub async fn validate_installerset_names(&self, disconnected: bool) -> Result<(), K8sError> {
        let sets = self.installer_sets().await?;
        let names: Vec<&str> = sets
            .iter()
            .filter_map(|set| set.metadata.name.as_deref())
            .collect();
        let console_enabled = self.is_capability_enabled("Console").await?;

        let missing = missing_prefixes(
            &names,
            INSTALLERSET_NAME_PREFIXES,
            console_enabled,
            disconnected,
        );
        if !missing.is_empty() {
            return Err(K8sError::Assertion(format!(
                "installer sets missing for prefixes: {}",
                missing.join(",")
            )));
        }
        Ok(())
    }

    /// Whether the cluster version lists `capability` as enabled
    ///
    /// Clusters without the `ClusterVersion` API have no optional
    /// capabilities, so everything counts as enabled there.
    pub async fn is_capability_enabled(&self, capability: &str) -> Result<bool, K8sError> {
        let coordinate = ResourceCoordinate::new("config.openshift.io", "clusterversions");
        let version = match self.get_dynamic(&coordinate, "version", None).await {
            Ok(version) => version,
            Err(K8sError::Resolve(e)) if e.is_not_found() => {
                debug!(capability = %capability, "No ClusterVersion API, treating capability as enabled");
                return Ok(true);
            }
            Err(e) => return Err(e),
        };

        Ok(version.data["status"]["capabilities"]["enabledCapabilities"]
            .as_array()
            .is_some_and(|caps| caps.iter().any(|c| c == capability)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn installer_set(name: &str, status: serde_json::Value) -> DynamicObject {
        serde_json::from_value(json!({
            "apiVersion": "operator.tekton.dev/v1alpha1",
            "kind": "TektonInstallerSet",
            "metadata": { "name": name },
            "status": status,
        }))
        .unwrap()
    }

    #[test]
    fn test_ready_condition() {
        let ready = installer_set(
            "pipeline-main-static-abcde",
            json!({ "conditions": [
                { "type": "CrdsInstalled", "status": "True" },
                { "type": "Ready", "status": "True" },
            ]}),
        );
        assert!(installer_set_ready(&ready));
    }

    #[test]
    fn test_not_ready_condition() {
        let failing = installer_set(
            "pipeline-main-deployment-xyz",
            json!({ "conditions": [{ "type": "Ready", "status": "False" }] }),
        );
        assert!(!installer_set_ready(&failing));

        let no_status = installer_set("rhosp-rbac-1", json!({}));
        assert!(!installer_set_ready(&no_status));
    }

    #[test]
    fn test_missing_prefixes() {
        let names = ["pipeline-main-static-abc", "trigger-main-static-def"];
        let prefixes = ["pipeline-main-static", "trigger-main-static", "rhosp-rbac"];

        assert_eq!(
            missing_prefixes(&names, &prefixes, true, false),
            vec!["rhosp-rbac"]
        );
    }

    #[test]
    fn test_console_prefixes_skipped_when_disabled() {
        let prefixes = ["addon-custom-consolecli", "addon-custom-openshiftconsole"];

        assert!(missing_prefixes(&[], &prefixes, false, false).is_empty());
        assert_eq!(missing_prefixes(&[], &prefixes, true, false).len(), 2);
    }

    #[test]
    fn test_community_prefix_skipped_when_disconnected() {
        let prefixes = [COMMUNITY_PREFIX];

        assert!(missing_prefixes(&[], &prefixes, true, true).is_empty());
        assert_eq!(
            missing_prefixes(&[], &prefixes, true, false),
            vec![COMMUNITY_PREFIX]
        );
    }
}
