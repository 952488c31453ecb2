use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{CronJob, CronJobSpec, JobSpec, JobTemplateSpec};
use k8s_openapi::api::core::v1::{
    ConfigMap, ConfigMapVolumeSource, Container, PodSpec, PodTemplateSpec, ResourceRequirements,
    Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

use crate::config::Rules;
use crate::reconcile::Error;
use crate::types::Descheduler;

/// ConfigMap key holding the policy, also the file name inside the mount.
pub const POLICY_KEY: &str = "policy.yaml";

const POLICY_VOLUME: &str = "policy-volume";
const POLICY_MOUNT_PATH: &str = "/policy-dir";
const CONTAINER_NAME: &str = "descheduler";
const JOB_TEMPLATE_NAME: &str = "descheduler-job-spec";
const CPU: &str = "100m";
const MEMORY: &str = "500Mi";

/// The ConfigMap carrying `policy` for `descheduler`, named after it and
/// owned by it.
pub fn construct_config_map(descheduler: &Descheduler, policy: String) -> Result<ConfigMap, Error> {
    Ok(ConfigMap {
        metadata: owned_metadata(descheduler)?,
        data: Some(BTreeMap::from([(POLICY_KEY.to_string(), policy)])),
        ..ConfigMap::default()
    })
}

/// The command the descheduler container runs: the fixed prefix followed by
/// the validated flag tokens.
pub fn descheduler_command(rules: &Rules, flags: Option<&[String]>) -> Vec<String> {
    let mut command = rules.command.clone();
    command.extend(flags.unwrap_or_default().iter().cloned());
    command
}

pub fn descheduler_image(rules: &Rules, descheduler: &Descheduler) -> String {
    match descheduler.spec.image.as_deref() {
        Some(image) if !image.is_empty() => image.to_string(),
        _ => rules.default_image.clone(),
    }
}

/// The CronJob running the descheduler against the policy ConfigMap of the
/// same name.
pub fn construct_cron_job(
    descheduler: &Descheduler,
    rules: &Rules,
    flags: Option<&[String]>,
) -> Result<CronJob, Error> {
    let metadata = owned_metadata(descheduler)?;
    let config_map_name = metadata.name.clone();

    let resources = BTreeMap::from([
        ("cpu".to_string(), Quantity(CPU.to_string())),
        ("memory".to_string(), Quantity(MEMORY.to_string())),
    ]);

    let container = Container {
        name: CONTAINER_NAME.to_string(),
        image: Some(descheduler_image(rules, descheduler)),
        command: Some(descheduler_command(rules, flags)),
        resources: Some(ResourceRequirements {
            limits: Some(resources.clone()),
            requests: Some(resources),
        }),
        volume_mounts: Some(vec![VolumeMount {
            name: POLICY_VOLUME.to_string(),
            mount_path: POLICY_MOUNT_PATH.to_string(),
            ..VolumeMount::default()
        }]),
        ..Container::default()
    };

    let pod_spec = PodSpec {
        containers: vec![container],
        volumes: Some(vec![Volume {
            name: POLICY_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: config_map_name,
                ..ConfigMapVolumeSource::default()
            }),
            ..Volume::default()
        }]),
        priority_class_name: Some(rules.priority_class.clone()),
        restart_policy: Some("Never".to_string()),
        service_account_name: Some(rules.service_account.clone()),
        ..PodSpec::default()
    };

    Ok(CronJob {
        metadata,
        spec: Some(CronJobSpec {
            schedule: descheduler.spec.schedule.clone(),
            job_template: JobTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(JOB_TEMPLATE_NAME.to_string()),
                    ..ObjectMeta::default()
                }),
                spec: Some(JobSpec {
                    template: PodTemplateSpec {
                        metadata: None,
                        spec: Some(pod_spec),
                    },
                    ..JobSpec::default()
                }),
            },
            ..CronJobSpec::default()
        }),
        status: None,
    })
}

fn owned_metadata(descheduler: &Descheduler) -> Result<ObjectMeta, Error> {
    Ok(ObjectMeta {
        name: Some(
            descheduler
                .metadata
                .name
                .clone()
                .ok_or(Error::MissingObjectKey(".metadata.name"))?,
        ),
        namespace: Some(
            descheduler
                .metadata
                .namespace
                .clone()
                .ok_or(Error::MissingObjectKey(".metadata.namespace"))?,
        ),
        owner_references: Some(vec![OwnerReference {
            controller: Some(true),
            block_owner_deletion: Some(true),
            ..object_to_owner_reference::<Descheduler>(descheduler.metadata.clone())?
        }]),
        ..ObjectMeta::default()
    })
}

fn object_to_owner_reference<K: Resource<DynamicType = ()>>(
    meta: ObjectMeta,
) -> Result<OwnerReference, Error> {
    Ok(OwnerReference {
        api_version: K::api_version(&()).to_string(),
        kind: K::kind(&()).to_string(),
        name: meta.name.ok_or(Error::MissingObjectKey(".metadata.name"))?,
        uid: meta.uid.ok_or(Error::MissingObjectKey(".metadata.uid"))?,
        ..OwnerReference::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DeschedulerSpec;

    fn descheduler(image: Option<&str>) -> Descheduler {
        let mut descheduler = Descheduler::new(
            "cluster-hygiene",
            DeschedulerSpec {
                schedule: "*/10 * * * *".to_string(),
                image: image.map(str::to_string),
                ..DeschedulerSpec::default()
            },
        );
        descheduler.metadata.namespace = Some("kube-system".to_string());
        descheduler.metadata.uid = Some("4c1d7a4e-0000-4000-8000-000000000001".to_string());
        descheduler
    }

    fn pod_spec(job: &CronJob) -> &PodSpec {
        job.spec
            .as_ref()
            .unwrap()
            .job_template
            .spec
            .as_ref()
            .unwrap()
            .template
            .spec
            .as_ref()
            .unwrap()
    }

    #[test]
    fn config_map_is_owned_by_descheduler() {
        let config_map = construct_config_map(&descheduler(None), "kind: x\n".to_string()).unwrap();
        assert_eq!(config_map.metadata.name.as_deref(), Some("cluster-hygiene"));
        assert_eq!(config_map.metadata.namespace.as_deref(), Some("kube-system"));
        assert_eq!(
            config_map.data.unwrap().get(POLICY_KEY).map(String::as_str),
            Some("kind: x\n")
        );

        let owner = &config_map.metadata.owner_references.unwrap()[0];
        assert_eq!(owner.kind, "Descheduler");
        assert_eq!(owner.api_version, "descheduler.example.com/v1alpha1");
        assert_eq!(owner.name, "cluster-hygiene");
        assert_eq!(owner.controller, Some(true));
    }

    #[test]
    fn owner_reference_requires_uid() {
        let mut descheduler = descheduler(None);
        descheduler.metadata.uid = None;
        assert!(matches!(
            construct_config_map(&descheduler, String::new()),
            Err(Error::MissingObjectKey(".metadata.uid"))
        ));
    }

    #[test]
    fn cron_job_without_flags_runs_default_command() {
        let rules = Rules::default();
        let job = construct_cron_job(&descheduler(None), &rules, None).unwrap();
        assert_eq!(job.spec.as_ref().unwrap().schedule, "*/10 * * * *");

        let pod = pod_spec(&job);
        let container = &pod.containers[0];
        assert_eq!(
            container.command.as_deref(),
            Some(
                &[
                    "/bin/descheduler".to_string(),
                    "--policy-config-file".to_string(),
                    "/policy-dir/policy.yaml".to_string(),
                    "--v".to_string(),
                    "5".to_string(),
                ][..]
            )
        );
        assert_eq!(container.image.as_deref(), Some("skckadiyala/descheduler:v0.9.0"));
        assert_eq!(pod.restart_policy.as_deref(), Some("Never"));
        assert_eq!(pod.service_account_name.as_deref(), Some("descheduler-operator"));
        assert_eq!(
            pod.priority_class_name.as_deref(),
            Some("system-cluster-critical")
        );

        let limits = container.resources.as_ref().unwrap().limits.as_ref().unwrap();
        assert_eq!(limits["cpu"], Quantity("100m".to_string()));
        assert_eq!(limits["memory"], Quantity("500Mi".to_string()));
    }

    #[test]
    fn cron_job_mounts_policy_config_map() {
        let job = construct_cron_job(&descheduler(None), &Rules::default(), None).unwrap();
        let pod = pod_spec(&job);
        let volume = &pod.volumes.as_ref().unwrap()[0];
        assert_eq!(
            volume.config_map.as_ref().unwrap().name.as_deref(),
            Some("cluster-hygiene")
        );
        let mount = &pod.containers[0].volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.name, volume.name);
        assert_eq!(mount.mount_path, "/policy-dir");
    }

    #[test]
    fn flags_follow_command_prefix() {
        let rules = Rules::default();
        let flags = vec!["--dry-run".to_string(), "true".to_string()];
        let command = descheduler_command(&rules, Some(&flags));
        assert_eq!(command.len(), 7);
        assert_eq!(&command[..5], &rules.command[..]);
        assert_eq!(&command[5..], &flags[..]);
    }

    #[test]
    fn explicit_image_wins_over_default() {
        let rules = Rules::default();
        assert_eq!(
            descheduler_image(&rules, &descheduler(Some("registry.local/descheduler:v0.10.0"))),
            "registry.local/descheduler:v0.10.0"
        );
        assert_eq!(
            descheduler_image(&rules, &descheduler(Some(""))),
            rules.default_image
        );
    }
}
