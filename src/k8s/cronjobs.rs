use super::{describe_error, K8sError};
use crate::clients::Clients;
use crate::config::{PRUNER_NAME_PREFIX, PRUNER_SCHEDULE};
use crate::poll::{poll_until, wait_for_absence, PollSpec, PredicateError};
use crate::store::Store;
use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams};
use tracing::info;

/// Scenario key holding the name of the CronJob created by [`Clients::create_cronjob`]
pub const CRONJOB_KEY: &str = "cronjob";

/// Image run by the test CronJob
pub const HELLO_IMAGE: &str = "image-registry.openshift-image-registry.svc:5000/openshift/golang";

/// The `hello` CronJob running [`HELLO_IMAGE`] with `args`
pub fn hello_cronjob(args: &[&str], schedule: &str) -> CronJob {
    CronJob {
        metadata: ObjectMeta {
            name: Some("hello".to_string()),
            ..Default::default()
        },
        spec: Some(CronJobSpec {
            schedule: schedule.to_string(),
            job_template: JobTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some("hello".to_string()),
                    ..Default::default()
                }),
                spec: Some(JobSpec {
                    template: PodTemplateSpec {
                        metadata: None,
                        spec: Some(PodSpec {
                            containers: vec![Container {
                                name: "hello".to_string(),
                                image: Some(HELLO_IMAGE.to_string()),
                                args: Some(args.iter().map(|a| (*a).to_string()).collect()),
                                ..Default::default()
                            }],
                            restart_policy: Some("Never".to_string()),
                            ..Default::default()
                        }),
                    },
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn schedule_of(cronjob: &CronJob) -> &str {
    cronjob.spec.as_ref().map_or("", |s| s.schedule.as_str())
}

fn name_of(cronjob: &CronJob) -> &str {
    cronjob.metadata.name.as_deref().unwrap_or_default()
}

fn container_count(cronjob: &CronJob) -> usize {
    cronjob
        .spec
        .as_ref()
        .and_then(|s| s.job_template.spec.as_ref())
        .and_then(|j| j.template.spec.as_ref())
        .map_or(0, |p| p.containers.len())
}

/// First pruner CronJob (name contains the pruner prefix) with `schedule`
pub fn find_pruner_by_schedule<'a>(cronjobs: &'a [CronJob], schedule: &str) -> Option<&'a CronJob> {
    cronjobs
        .iter()
        .find(|cj| schedule_of(cj) == schedule && name_of(cj).contains(PRUNER_NAME_PREFIX))
}

impl Clients {
    async fn list_cronjobs(&self, namespace: &str) -> Result<Vec<CronJob>, K8sError> {
        let api: Api<CronJob> = Api::namespaced(self.kube.clone(), namespace);
        let list = api.list(&ListParams::default()).await.map_err(|e| {
            K8sError::ListError(format!("cronjobs in namespace {namespace}: {e}"))
        })?;
        Ok(list.items)
    }

    /// Create the `hello` CronJob and record its name under [`CRONJOB_KEY`]
    pub async fn create_cronjob(
        &self,
        store: &Store,
        args: &[&str],
        schedule: &str,
        namespace: &str,
    ) -> Result<String, K8sError> {
        let api: Api<CronJob> = Api::namespaced(self.kube.clone(), namespace);

        let created = api
            .create(&PostParams::default(), &hello_cronjob(args, schedule))
            .await
            .map_err(|e| K8sError::CreateError(describe_error(&e, "CronJob", "hello")))?;

        let name = name_of(&created).to_string();
        store.put_scenario_data(CRONJOB_KEY, name.clone());

        info!(namespace = %namespace, name = %name, schedule = %schedule, "Created cronjob");
        Ok(name)
    }

    /// Delete a CronJob with background propagation
    pub async fn delete_cronjob(&self, name: &str, namespace: &str) -> Result<(), K8sError> {
        let api: Api<CronJob> = Api::namespaced(self.kube.clone(), namespace);
        api.delete(name, &DeleteParams::background())
            .await
            .map_err(|e| K8sError::DeleteError(describe_error(&e, "CronJob", name)))?;

        info!(namespace = %namespace, name = %name, "Deleted cronjob");
        Ok(())
    }

    /// The operator's default pruner CronJob exists
    pub async fn assert_default_cronjob_exists(&self, namespace: &str) -> Result<(), K8sError> {
        let cronjobs = self.list_cronjobs(namespace).await?;
        if cronjobs.is_empty() {
            return Err(K8sError::Assertion(format!(
                "no cronjobs present in namespace {namespace}"
            )));
        }
        if find_pruner_by_schedule(&cronjobs, PRUNER_SCHEDULE).is_none() {
            return Err(K8sError::Assertion(format!(
                "no cronjob with schedule {PRUNER_SCHEDULE} and prefix {PRUNER_NAME_PREFIX} present"
            )));
        }
        Ok(())
    }

    /// Name of the pruner CronJob running on `schedule`
    pub async fn cronjob_name_with_schedule(
        &self,
        namespace: &str,
        schedule: &str,
    ) -> Result<String, K8sError> {
        let cronjobs = self.list_cronjobs(namespace).await?;
        find_pruner_by_schedule(&cronjobs, schedule)
            .map(|cj| name_of(cj).to_string())
            .ok_or_else(|| {
                K8sError::Assertion(format!("no cronjob with schedule {schedule} found"))
            })
    }

    /// The first pruner CronJob runs exactly `count` containers
    pub async fn assert_pruner_cronjob_with_container(
        &self,
        namespace: &str,
        count: usize,
    ) -> Result<(), K8sError> {
        let cronjobs = self.list_cronjobs(namespace).await?;
        let pruner = cronjobs
            .iter()
            .find(|cj| name_of(cj).contains(PRUNER_NAME_PREFIX))
            .ok_or_else(|| {
                K8sError::Assertion(format!(
                    "cronjob with prefix {PRUNER_NAME_PREFIX} not found in {namespace}"
                ))
            })?;

        let found = container_count(pruner);
        if found != count {
            return Err(K8sError::Assertion(format!(
                "expected {count} containers in cronjob {} but found {found}",
                name_of(pruner)
            )));
        }
        Ok(())
    }

    async fn poll_cronjob(
        &self,
        fragment: &str,
        namespace: &str,
        absent: bool,
    ) -> Result<(), K8sError> {
        let api: Api<CronJob> = Api::namespaced(self.kube.clone(), namespace);
        let api = &api;
        let spec = PollSpec::new(format!("cronjob/{namespace}/*{fragment}*"))
            .preset(self.timeouts.resource());
        let predicate = move || async move {
            let list = api.list(&ListParams::default()).await.map_err(|e| {
                PredicateError::Terminal(format!("failed to list cronjobs in {namespace}: {e}"))
            })?;
            Ok::<_, PredicateError>(list.items.iter().any(|cj| name_of(cj).contains(fragment)))
        };

        if absent {
            wait_for_absence(&self.cancel, &spec, predicate).await?;
        } else {
            poll_until(&self.cancel, &spec, predicate).await?;
        }
        Ok(())
    }

    /// Wait for a CronJob whose name contains `fragment`
    pub async fn assert_cronjob_present(
        &self,
        fragment: &str,
        namespace: &str,
    ) -> Result<(), K8sError> {
        self.poll_cronjob(fragment, namespace, false).await
    }

    /// Wait until no CronJob name contains `fragment`
    pub async fn assert_cronjob_not_present(
        &self,
        fragment: &str,
        namespace: &str,
    ) -> Result<(), K8sError> {
        self.poll_cronjob(fragment, namespace, true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cronjob(name: &str, schedule: &str, containers: usize) -> CronJob {
        let mut cj = hello_cronjob(&[], schedule);
        cj.metadata.name = Some(name.to_string());
        if let Some(pod) = cj
            .spec
            .as_mut()
            .and_then(|s| s.job_template.spec.as_mut())
            .and_then(|j| j.template.spec.as_mut())
        {
            pod.containers = (0..containers)
                .map(|i| Container {
                    name: format!("c{i}"),
                    ..Default::default()
                })
                .collect();
        }
        cj
    }

    #[test]
    fn test_hello_cronjob_shape() {
        let cj = hello_cronjob(&["echo", "hi"], "*/5 * * * *");

        assert_eq!(name_of(&cj), "hello");
        assert_eq!(schedule_of(&cj), "*/5 * * * *");
        assert_eq!(container_count(&cj), 1);

        let pod = cj.spec.unwrap().job_template.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.containers[0].image.as_deref(), Some(HELLO_IMAGE));
        assert_eq!(
            pod.containers[0].args,
            Some(vec!["echo".to_string(), "hi".to_string()])
        );
    }

    #[test]
    fn test_find_pruner_by_schedule() {
        let cronjobs = vec![
            cronjob("hello", PRUNER_SCHEDULE, 1),
            cronjob("tekton-resource-pruner-abc12", "*/10 * * * *", 1),
            cronjob("tekton-resource-pruner-xyz98", PRUNER_SCHEDULE, 2),
        ];

        let found = find_pruner_by_schedule(&cronjobs, PRUNER_SCHEDULE).unwrap();
        assert_eq!(name_of(found), "tekton-resource-pruner-xyz98");
        assert_eq!(container_count(found), 2);

        assert!(find_pruner_by_schedule(&cronjobs, "0 0 * * *").is_none());
    }

    #[test]
    fn test_missing_spec_has_no_containers() {
        assert_eq!(container_count(&CronJob::default()), 0);
        assert_eq!(schedule_of(&CronJob::default()), "");
    }
}
