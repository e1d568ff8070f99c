//! pipelines-e2e - end-to-end harness for a pipelines control plane
//!
//! Drives a live cluster through its API and the cluster CLI, then polls until
//! the operator's asynchronous reconciliation has converged. Provides:
//!
//! - [`poll`]: interval/timeout polling with cancellation and negation
//! - [`resolver`]: group/resource to served version via live discovery
//! - [`store`]: scenario and suite state shared between test steps
//! - [`k8s`]: deployment, service account, CronJob and installer set predicates
//! - [`cmd`] / [`oc`]: the external CLI
//!
//! # Example
//!
//! ```no_run
//! use pipelines_e2e::{clients, telemetry, Config, Oc, Store};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     telemetry::init_logging();
//!     let config = Config::from_env()?;
//!     let store = Arc::new(Store::new());
//!     let oc = Oc::from_config(&config);
//!
//!     store.begin_scenario();
//!     let (cs, cleanup) = clients::new_client_set(&config, &oc).await?;
//!     cs.validate_deployments("openshift-pipelines", &["tekton-pipelines-controller"])
//!         .await?;
//!     cleanup.run().await;
//!
//!     store.teardown();
//!     Ok(())
//! }
//! ```

pub mod clients;
pub mod cmd;
pub mod config;
pub mod k8s;
pub mod oc;
pub mod poll;
pub mod resolver;
pub mod store;
pub mod telemetry;
pub mod wait;

// Re-export commonly used types
pub use clients::{new_client_set, Clients, ClientsError, NamespaceCleanup, ResourceNames};
pub use config::{Config, ConfigError, Preset, Timeouts};
pub use k8s::K8sError;
pub use oc::Oc;
pub use poll::{poll_until, wait_for_absence, wait_for_presence, PollError, PollSpec, PredicateError};
pub use resolver::{resolve, DiscoveredGroup, DiscoverySource, ResolveError, ResolvedCoordinate, ResourceCoordinate};
pub use store::{Scope, Store, Value};
pub use wait::{WaitError, WaitEvent};
