//! Diagnostics attached to poll timeouts
//!
//! A timed-out poll carries the target it was watching, the last state the
//! predicate reported, how many evaluations ran and how long they took.
//!
//! # Example
//!
//! ```ignore
//! match clients.wait_for_deployment(ns, "smee", 1, preset).await {
//!     Err(K8sError::Poll(PollError::Timeout(err))) => {
//!         println!("Target: {}", err.target);
//!         println!("Last state: {}", err.last_state);
//!         println!("Attempts: {}", err.attempts);
//!     }
//!     _ => {}
//! }
//! ```

use std::fmt;
use std::time::Duration;

/// A simplified event for timeout context
#[derive(Debug, Clone)]
pub struct WaitEvent {
    /// Event reason (e.g., "`FailedCreate`", "`BackOff`")
    pub reason: String,
    /// Event message
    pub message: String,
    /// Timestamp as string
    pub timestamp: Option<String>,
}

/// Rich error context for a poll that ran out of time
#[derive(Debug, Clone)]
pub struct WaitError {
    /// What was being polled (e.g., "deployment/openshift-pipelines/smee")
    pub target: String,
    /// Description of the last observed state
    pub last_state: String,
    /// Number of predicate evaluations
    pub attempts: u32,
    /// How long we waited before giving up
    pub elapsed: Duration,
    /// The timeout that was configured
    pub timeout: Duration,
    /// Recent events related to the target
    pub events: Vec<WaitEvent>,
}

impl WaitError {
    /// Create a new `WaitError`
    pub fn new(target: impl Into<String>, timeout: Duration, elapsed: Duration) -> Self {
        Self {
            target: target.into(),
            last_state: "unknown".to_string(),
            attempts: 0,
            elapsed,
            timeout,
            events: Vec::new(),
        }
    }

    /// Set the last observed state
    #[must_use]
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.last_state = state.into();
        self
    }

    /// Set the number of evaluations
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Add events to the error
    #[must_use]
    pub fn with_events(mut self, events: Vec<WaitEvent>) -> Self {
        self.events = events;
        self
    }
}

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "Wait timeout for {}", self.target)?;
        writeln!(f, "├─ Last state: {}", self.last_state)?;
        writeln!(f, "├─ Attempts: {}", self.attempts)?;
        writeln!(f, "├─ Elapsed: {:?}", self.elapsed)?;
        writeln!(f, "└─ Timeout: {:?}", self.timeout)?;

        if !self.events.is_empty() {
            writeln!(f)?;
            writeln!(f, "Recent events:")?;
            for (i, event) in self.events.iter().enumerate() {
                let prefix = if i == self.events.len() - 1 {
                    "└─"
                } else {
                    "├─"
                };
                let ts = event.timestamp.as_deref().unwrap_or("??:??:??");
                writeln!(f, "{} [{}] {}: {}", prefix, ts, event.reason, event.message)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for WaitError {}

/// Human-readable state of a Kubernetes object, used as poll diagnostics
pub trait ResourceState {
    /// Get a human-readable description of the resource's current state
    fn state_description(&self) -> String;
}

impl ResourceState for k8s_openapi::api::apps::v1::Deployment {
    fn state_description(&self) -> String {
        let spec_replicas = self.spec.as_ref().and_then(|s| s.replicas).unwrap_or(1);
        let available = self
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0);
        let unavailable = self
            .status
            .as_ref()
            .and_then(|s| s.unavailable_replicas)
            .unwrap_or(0);

        if unavailable > 0 {
            format!("{available}/{spec_replicas} available, {unavailable} unavailable")
        } else {
            format!("{available}/{spec_replicas} available")
        }
    }
}

impl ResourceState for k8s_openapi::api::core::v1::Namespace {
    fn state_description(&self) -> String {
        let phase = self
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .unwrap_or("Unknown");
        format!("phase={phase}")
    }
}

impl ResourceState for k8s_openapi::api::batch::v1::CronJob {
    fn state_description(&self) -> String {
        let schedule = self
            .spec
            .as_ref()
            .map_or("<none>", |s| s.schedule.as_str());
        let active = self
            .status
            .as_ref()
            .and_then(|s| s.active.as_ref())
            .map_or(0, Vec::len);
        format!("schedule={schedule}, {active} active jobs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_error_display() {
        let err = WaitError::new(
            "deployment/ns/smee",
            Duration::from_secs(60),
            Duration::from_secs(60),
        )
        .with_state("0/1 available, 1 unavailable")
        .with_attempts(12);

        let output = err.to_string();
        assert!(output.contains("deployment/ns/smee"));
        assert!(output.contains("0/1 available"));
        assert!(output.contains("Attempts: 12"));
        assert!(output.contains("60s"));
    }

    #[test]
    fn test_wait_error_with_events() {
        let events = vec![
            WaitEvent {
                reason: "FailedCreate".to_string(),
                message: "quota exceeded".to_string(),
                timestamp: Some("10:42:01".to_string()),
            },
            WaitEvent {
                reason: "BackOff".to_string(),
                message: "Back-off pulling image".to_string(),
                timestamp: None,
            },
        ];

        let err = WaitError::new("deployment/ns/app", Duration::from_secs(30), Duration::from_secs(30))
            .with_events(events);

        let output = err.to_string();
        assert!(output.contains("FailedCreate"));
        assert!(output.contains("10:42:01"));
        assert!(output.contains("??:??:??"));
    }

    #[test]
    fn test_wait_error_builder_defaults() {
        let err = WaitError::new("sa/ns/pipeline", Duration::from_secs(120), Duration::from_secs(115));

        assert_eq!(err.target, "sa/ns/pipeline");
        assert_eq!(err.timeout, Duration::from_secs(120));
        assert_eq!(err.elapsed, Duration::from_secs(115));
        assert_eq!(err.last_state, "unknown");
        assert_eq!(err.attempts, 0);
    }

    #[test]
    fn test_deployment_state_description() {
        use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};

        let deployment = Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(3),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                available_replicas: Some(1),
                unavailable_replicas: Some(2),
                ..Default::default()
            }),
            ..Default::default()
        };

        let state = deployment.state_description();
        assert!(state.contains("1/3 available"));
        assert!(state.contains("2 unavailable"));
    }

    #[test]
    fn test_namespace_state_description() {
        use k8s_openapi::api::core::v1::{Namespace, NamespaceStatus};

        let ns = Namespace {
            status: Some(NamespaceStatus {
                phase: Some("Terminating".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        assert_eq!(ns.state_description(), "phase=Terminating");
    }
}
