use super::{describe_error, presence_error, K8sError};
use crate::clients::Clients;
use crate::poll::{poll_until, PollSpec, PredicateError};
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use kube::api::{Api, ListParams};
use std::sync::{Mutex, PoisonError};
use tracing::info;

impl Clients {
    /// Wait for a service account to show up in a namespace listing
    ///
    /// Returns the account as listed. A failed list aborts the wait.
    pub async fn wait_for_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ServiceAccount, K8sError> {
        let api: Api<ServiceAccount> = Api::namespaced(self.kube.clone(), namespace);
        let api = &api;
        let found: Mutex<Option<ServiceAccount>> = Mutex::new(None);
        let found_ref = &found;
        let spec =
            PollSpec::new(format!("serviceaccount/{namespace}/{name}")).preset(self.timeouts.api());

        poll_until(&self.cancel, &spec, move || async move {
            let list = api.list(&ListParams::default()).await.map_err(|e| {
                PredicateError::Terminal(describe_error(&e, "ServiceAccount", name))
            })?;
            match list
                .items
                .into_iter()
                .find(|sa| sa.metadata.name.as_deref() == Some(name))
            {
                Some(sa) => {
                    *found_ref.lock().unwrap_or_else(PoisonError::into_inner) = Some(sa);
                    Ok::<_, PredicateError>(true)
                }
                None => Ok(false),
            }
        })
        .await?;

        let account = found
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .ok_or_else(|| {
                K8sError::GetError(format!("ServiceAccount '{name}' vanished after listing"))
            })?;

        info!(namespace = %namespace, name = %name, "Service account present");
        Ok(account)
    }

    /// Poll (immediately) until the service account exists
    pub async fn verify_service_account_exists(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), K8sError> {
        let api: Api<ServiceAccount> = Api::namespaced(self.kube.clone(), namespace);
        let api = &api;
        let spec = PollSpec::new(format!("serviceaccount/{namespace}/{name}"))
            .preset(self.timeouts.api())
            .immediate(true);

        poll_until(&self.cancel, &spec, move || async move {
            match api.get(name).await {
                Ok(_) => Ok(true),
                Err(e) => Err(presence_error(&e, "ServiceAccount", name)),
            }
        })
        .await?;
        Ok(())
    }

    /// Check that the service account does not exist
    ///
    /// Succeeds on the first NotFound. An account that still exists fails
    /// immediately rather than being waited out, as does any other error.
    pub async fn verify_no_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<(), K8sError> {
        let api: Api<ServiceAccount> = Api::namespaced(self.kube.clone(), namespace);
        let api = &api;
        let spec = PollSpec::new(format!("serviceaccount/{namespace}/{name}"))
            .preset(self.timeouts.api())
            .immediate(true);

        poll_until(&self.cancel, &spec, move || async move {
            no_account_outcome(&api.get(name).await, namespace, name)
        })
        .await?;
        Ok(())
    }

    /// Poll (immediately) until the namespace exists
    pub async fn verify_namespace_exists(&self, namespace: &str) -> Result<(), K8sError> {
        let api: Api<Namespace> = Api::all(self.kube.clone());
        let api = &api;
        let spec = PollSpec::new(format!("namespace/{namespace}"))
            .preset(self.timeouts.api())
            .immediate(true);

        poll_until(&self.cancel, &spec, move || async move {
            match api.get(namespace).await {
                Ok(_) => Ok(true),
                Err(e) => Err(presence_error(&e, "Namespace", namespace)),
            }
        })
        .await?;
        Ok(())
    }
}

/// Only a 404 proves the account is gone; 410 and reads that succeed do not
fn no_account_outcome(
    read: &Result<ServiceAccount, kube::Error>,
    namespace: &str,
    name: &str,
) -> Result<bool, PredicateError> {
    match read {
        Err(kube::Error::Api(e)) if e.code == 404 => Ok(true),
        _ => Err(PredicateError::Terminal(format!(
            "service account \"{name}\" still exists in namespace \"{namespace}\""
        ))),
    }
}
