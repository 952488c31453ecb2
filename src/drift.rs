//! Exact comparison of desired and observed derived resources.
//!
//! Nothing here is tolerant of reordering or formatting: the desired side is
//! always produced by the same deterministic builders, so any difference means
//! the resource has to be recreated.

use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::{ConfigMap, Container};

use crate::resources::POLICY_KEY;

/// The CronJob field group found to differ, in the order they are checked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobDrift {
    Schedule,
    Flags,
    Image,
}

pub fn policy_drifted(desired: &str, observed: Option<&str>) -> bool {
    observed != Some(desired)
}

pub fn flags_drifted(desired: &[String], observed: Option<&[String]>) -> bool {
    observed != Some(desired)
}

pub fn image_drifted(desired: &str, observed: Option<&str>) -> bool {
    observed != Some(desired)
}

pub fn schedule_drifted(desired: &str, observed: &str) -> bool {
    desired != observed
}

/// Whether a ConfigMap holds a different policy than `desired`.
pub fn config_map_drifted(desired: &str, observed: &ConfigMap) -> bool {
    let stored = observed
        .data
        .as_ref()
        .and_then(|data| data.get(POLICY_KEY))
        .map(String::as_str);
    policy_drifted(desired, stored)
}

/// Returns the first field group in which `observed` differs from `desired`:
/// schedule, then flags, then image.
pub fn cron_job_drift(desired: &CronJob, observed: &CronJob) -> Option<JobDrift> {
    let schedule = |job: &CronJob| {
        job.spec
            .as_ref()
            .map(|spec| spec.schedule.clone())
            .unwrap_or_default()
    };
    if schedule_drifted(&schedule(desired), &schedule(observed)) {
        return Some(JobDrift::Schedule);
    }

    let desired_container = descheduler_container(desired);
    let observed_container = descheduler_container(observed);

    let desired_command = desired_container
        .and_then(|container| container.command.as_deref())
        .unwrap_or_default();
    let observed_command = observed_container.and_then(|container| container.command.as_deref());
    if flags_drifted(desired_command, observed_command) {
        return Some(JobDrift::Flags);
    }

    let desired_image = desired_container
        .and_then(|container| container.image.as_deref())
        .unwrap_or_default();
    let observed_image = observed_container.and_then(|container| container.image.as_deref());
    if image_drifted(desired_image, observed_image) {
        return Some(JobDrift::Image);
    }

    None
}

fn descheduler_container(job: &CronJob) -> Option<&Container> {
    job.spec
        .as_ref()?
        .job_template
        .spec
        .as_ref()?
        .template
        .spec
        .as_ref()?
        .containers
        .first()
}
