use super::K8sError;
use crate::clients::Clients;
use crate::wait::WaitEvent;
use k8s_openapi::api::core::v1::Event;
use kube::api::{Api, ListParams};
use tracing::debug;

const MAX_WAIT_EVENTS: usize = 5;

/// Event messages, one per line, in listing order
pub fn join_messages(events: &[Event]) -> String {
    events
        .iter()
        .filter_map(|e| e.message.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}

/// The most recent events, oldest first, as timeout diagnostics
pub(crate) fn to_wait_events(events: &[Event]) -> Vec<WaitEvent> {
    let mut sorted: Vec<&Event> = events.iter().collect();
    sorted.sort_by_key(|e| e.last_timestamp.as_ref().map(|t| t.0));

    sorted
        .iter()
        .rev()
        .take(MAX_WAIT_EVENTS)
        .rev()
        .map(|e| WaitEvent {
            reason: e.reason.clone().unwrap_or_else(|| "Unknown".to_string()),
            message: e.message.clone().unwrap_or_default(),
            timestamp: e
                .last_timestamp
                .as_ref()
                .map(|t| t.0.format("%H:%M:%S").to_string()),
        })
        .collect()
}

impl Clients {
    /// Messages of every Warning event in `namespace`, newline separated
    pub async fn warning_events(&self, namespace: &str) -> Result<String, K8sError> {
        let api: Api<Event> = Api::namespaced(self.kube.clone(), namespace);
        let events = api
            .list(&ListParams::default().fields("type=Warning"))
            .await
            .map_err(|e| K8sError::ListError(format!("events in {namespace}: {e}")))?;

        Ok(join_messages(&events.items))
    }

    /// Recent events about one object; empty when they cannot be listed
    pub(crate) async fn object_events(&self, namespace: &str, name: &str) -> Vec<WaitEvent> {
        let api: Api<Event> = Api::namespaced(self.kube.clone(), namespace);
        let selector = format!("involvedObject.name={name}");
        match api.list(&ListParams::default().fields(&selector)).await {
            Ok(list) => to_wait_events(&list.items),
            Err(e) => {
                debug!(namespace = %namespace, name = %name, error = %e, "Could not list events");
                Vec::new()
            }
        }
    }
}
