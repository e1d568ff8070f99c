//! Cluster predicates built on the poller
//!
//! Each submodule adds methods to [`Clients`](crate::clients::Clients) for one
//! family of objects. Waits go through [`poll_until`](crate::poll::poll_until)
//! with the handle's cancellation token and timeout presets; one-shot
//! assertions list once and report what they saw.
//!
//! Failure classification follows one rule: a missing object (404/410) is
//! [`PredicateError::NotYet`] while waiting for presence and the success
//! signal while waiting for absence. Anything else the API server returns
//! aborts the poll.

#![allow(clippy::missing_errors_doc)]

mod accounts;
mod cronjobs;
mod deployments;
mod dynamic;
mod events;
mod installersets;

pub use cronjobs::{find_pruner_by_schedule, hello_cronjob, CRONJOB_KEY, HELLO_IMAGE};
pub use deployments::deployment_ready;
pub use events::join_messages;
pub use installersets::{installer_set_ready, missing_prefixes};

use crate::poll::{PollError, PredicateError};
use crate::resolver::ResolveError;

/// Errors from cluster predicates
#[derive(Debug, thiserror::Error)]
pub enum K8sError {
    #[error("{0}")]
    Poll(#[from] PollError),

    #[error("{0}")]
    Resolve(#[from] ResolveError),

    #[error("deployment {name}: {source}")]
    Deployment {
        name: String,
        #[source]
        source: PollError,
    },

    #[error("Failed to create resource: {0}")]
    CreateError(String),

    #[error("Failed to get resource: {0}")]
    GetError(String),

    #[error("Failed to delete resource: {0}")]
    DeleteError(String),

    #[error("Failed to list resources: {0}")]
    ListError(String),

    #[error("{0}")]
    Assertion(String),
}

/// True for 404 Not Found and 410 Gone
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(e) if e.code == 404 || e.code == 410)
}

/// Classify a read error while waiting for an object to appear
pub(crate) fn presence_error(err: &kube::Error, kind: &str, name: &str) -> PredicateError {
    if is_not_found(err) {
        PredicateError::NotYet(format!("{kind} '{name}' not found"))
    } else {
        PredicateError::Terminal(describe_error(err, kind, name))
    }
}

/// Turn a kube error into a message naming the object
///
/// Recognises the common API server failures; anything else is passed
/// through with the object prefixed.
pub fn describe_error(err: &kube::Error, kind: &str, name: &str) -> String {
    if let kube::Error::Api(resp) = err {
        match resp.code {
            404 => return format!("{kind} '{name}' not found"),
            409 => return format!("{kind} '{name}' already exists"),
            410 => return format!("{kind} '{name}' is gone"),
            401 | 403 => {
                return format!("{kind} '{name}': permission denied ({})", resp.message)
            }
            _ => {}
        }
    }

    let raw = err.to_string();
    if raw.contains("connection refused") {
        return format!("{kind} '{name}': cannot connect to Kubernetes API");
    }
    format!("{kind} '{name}': {raw}")
}
