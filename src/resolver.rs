//! Resource-type resolution against live API discovery
//!
//! Custom resources move between API versions as operators upgrade, so tests
//! name them by group and resource and let the cluster say which version it
//! serves. [`resolve`] runs kube discovery on every call and picks the first
//! served resource matching the partial coordinate, in the version order
//! kube reports.
//!
//! No caching happens here. Discovery changes right after a CRD is installed,
//! and a caller polling for that CRD must see the new listing.
//!
//! # Example
//!
//! ```ignore
//! use pipelines_e2e::resolver::{resolve, ResourceCoordinate};
//!
//! let coordinate = ResourceCoordinate::tekton_installer_sets();
//! let resolved = resolve(&coordinate, &client).await?;
//! let api: Api<DynamicObject> = Api::all_with(client, &resolved.to_api_resource());
//! ```

use async_trait::async_trait;
use kube::discovery::{ApiCapabilities, ApiGroup, ApiResource, Discovery, Scope};
use std::fmt;
use tracing::debug;

use crate::poll::PredicateError;

/// Errors from resource-type resolution
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("resource {0} not found in API discovery")]
    NotFound(String),

    #[error("API discovery failed: {0}")]
    Discovery(String),
}

impl ResolveError {
    /// True when the resource is not served (yet)
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A type that is not served yet is worth waiting for; a broken discovery
/// endpoint is not.
impl From<ResolveError> for PredicateError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound(_) => Self::NotYet(err.to_string()),
            ResolveError::Discovery(_) => Self::Terminal(err.to_string()),
        }
    }
}

/// A resource named by group and plural, version optional
///
/// An empty `group` matches every group, the core group first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceCoordinate {
    /// API group (e.g., "operator.tekton.dev", "" for core)
    pub group: String,
    /// Required version, `None` to take the cluster's preference
    pub version: Option<String>,
    /// Resource name, plural or singular (e.g., "tektonconfigs")
    pub resource: String,
}

impl ResourceCoordinate {
    /// Coordinate without a version
    pub fn new(group: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: None,
            resource: resource.to_string(),
        }
    }

    /// Pin the version
    #[must_use]
    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string()).filter(|v| !v.is_empty());
        self
    }

    /// Operator: `TektonInstallerSet`
    #[must_use]
    pub fn tekton_installer_sets() -> Self {
        Self::new("operator.tekton.dev", "tektoninstallersets")
    }

    /// Operator: `TektonConfig`
    #[must_use]
    pub fn tekton_configs() -> Self {
        Self::new("operator.tekton.dev", "tektonconfigs")
    }

    /// Pipelines: `PipelineRun`
    #[must_use]
    pub fn pipeline_runs() -> Self {
        Self::new("tekton.dev", "pipelineruns")
    }

    /// Pipelines-as-code: `Repository`
    #[must_use]
    pub fn pac_repositories() -> Self {
        Self::new("pipelinesascode.tekton.dev", "repositories")
    }
}

impl fmt::Display for ResourceCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = if self.group.is_empty() {
            "*"
        } else {
            &self.group
        };
        match &self.version {
            Some(version) => write!(f, "{}/{}/{}", group, version, self.resource),
            None => write!(f, "{}/*/{}", group, self.resource),
        }
    }
}

/// A coordinate the cluster advertises as servable
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedCoordinate {
    pub group: String,
    pub version: String,
    /// Plural resource name
    pub resource: String,
    pub kind: String,
    pub namespaced: bool,
}

impl ResolvedCoordinate {
    /// `group/version`, or just `version` for the core group
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Convert to kube `ApiResource` for the dynamic client
    pub fn to_api_resource(&self) -> ApiResource {
        ApiResource {
            group: self.group.clone(),
            version: self.version.clone(),
            api_version: self.api_version(),
            kind: self.kind.clone(),
            plural: self.resource.clone(),
        }
    }
}


impl From<&(ApiResource, ApiCapabilities)> for ResolvedCoordinate {
    fn from((ar, caps): &(ApiResource, ApiCapabilities)) -> Self {
        Self {
            group: ar.group.clone(),
            version: ar.version.clone(),
            resource: ar.plural.clone(),
            kind: ar.kind.clone(),
            namespaced: caps.scope == Scope::Namespaced,
        }
    }
}

/// One API group's resources, most preferred first
///
/// Subresources live inside [`ApiCapabilities`] and never appear here.
#[derive(Debug, Clone)]
pub struct DiscoveredGroup {
    pub name: String,
    pub resources: Vec<(ApiResource, ApiCapabilities)>,
}

impl DiscoveredGroup {
    /// Order a group's resources by kube's version priority
    ///
    /// Resources of the preferred version (or the most stable one when the
    /// group names none) come first, then each remaining kind at its most
    /// stable version, then every other version.
    pub fn from_ordered(
        name: &str,
        recommended: Vec<(ApiResource, ApiCapabilities)>,
        by_stability: Vec<(ApiResource, ApiCapabilities)>,
        all_versions: Vec<(ApiResource, ApiCapabilities)>,
    ) -> Self {
        let mut resources = recommended;

        for entry in by_stability {
            if !resources.iter().any(|(known, _)| known.kind == entry.0.kind) {
                resources.push(entry);
            }
        }
        for entry in all_versions {
            if !resources
                .iter()
                .any(|(known, _)| known.kind == entry.0.kind && known.version == entry.0.version)
            {
                resources.push(entry);
            }
        }

        Self {
            name: name.to_string(),
            resources,
        }
    }
}

impl From<&ApiGroup> for DiscoveredGroup {
    fn from(group: &ApiGroup) -> Self {
        let all_versions = group
            .versions()
            .flat_map(|version| group.versioned_resources(version))
            .collect();

        Self::from_ordered(
            group.name(),
            group.recommended_resources(),
            group.resources_by_stability(),
            all_versions,
        )
    }
}

/// Source of API discovery results
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Groups currently served, in lookup order
    ///
    /// A non-empty `group` may narrow discovery to that group.
    async fn discover(&self, group: &str) -> Result<Vec<DiscoveredGroup>, ResolveError>;
}

#[async_trait]
impl DiscoverySource for kube::Client {
    async fn discover(&self, group: &str) -> Result<Vec<DiscoveredGroup>, ResolveError> {
        let mut discovery = Discovery::new(self.clone());
        if !group.is_empty() {
            discovery = discovery.filter(&[group]);
        }
        let discovery = discovery
            .run()
            .await
            .map_err(|e| ResolveError::Discovery(e.to_string()))?;

        // Alphabetical order puts the core group ("") first
        Ok(discovery
            .groups_alphabetical()
            .into_iter()
            .map(DiscoveredGroup::from)
            .collect())
    }
}

/// First discovered resource matching `coordinate`
///
/// Matches the plural or the kind, case-insensitively, like `kubectl get`.
/// An empty group matches every group; a version, when given, must match.
pub fn select(
    coordinate: &ResourceCoordinate,
    groups: &[DiscoveredGroup],
) -> Result<ResolvedCoordinate, ResolveError> {
    let version = coordinate.version.as_deref().filter(|v| !v.is_empty());

    groups
        .iter()
        .filter(|g| coordinate.group.is_empty() || g.name == coordinate.group)
        .flat_map(|g| g.resources.iter())
        .find(|(ar, _)| {
            version.map_or(true, |v| ar.version == v)
                && (ar.plural.eq_ignore_ascii_case(&coordinate.resource)
                    || ar.kind.eq_ignore_ascii_case(&coordinate.resource))
        })
        .map(ResolvedCoordinate::from)
        .ok_or_else(|| ResolveError::NotFound(coordinate.to_string()))
}

/// Resolve `coordinate` against a fresh discovery run
///
/// # Errors
///
/// - [`ResolveError::NotFound`] when nothing served matches
/// - [`ResolveError::Discovery`] when discovery itself fails
pub async fn resolve<D>(
    coordinate: &ResourceCoordinate,
    discovery: &D,
) -> Result<ResolvedCoordinate, ResolveError>
where
    D: DiscoverySource + ?Sized,
{
    let groups = discovery.discover(&coordinate.group).await?;
    let resolved = select(coordinate, &groups)?;

    debug!(
        requested = %coordinate,
        api_version = %resolved.api_version(),
        resource = %resolved.resource,
        "Resolved resource type"
    );

    Ok(resolved)
}
