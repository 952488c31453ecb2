use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, DeleteParams, PostParams};
use kube::error::ErrorResponse;
use kube::ResourceExt;
use serde::de::DeserializeOwned;

use crate::types::Descheduler;

/// The resources a convergence pass reads and writes, scoped to the namespace
/// of the Descheduler being reconciled.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>, kube::Error>;
    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), kube::Error>;
    async fn delete_config_map(&self, name: &str) -> Result<(), kube::Error>;

    async fn get_cron_job(&self, name: &str) -> Result<Option<CronJob>, kube::Error>;
    async fn create_cron_job(&self, cron_job: &CronJob) -> Result<(), kube::Error>;
    /// Deletes the CronJob but leaves Jobs it already started running.
    async fn delete_cron_job(&self, name: &str) -> Result<(), kube::Error>;

    async fn replace_status(&self, descheduler: &Descheduler) -> Result<(), kube::Error>;
}

pub struct KubeStore {
    config_maps: Api<ConfigMap>,
    cron_jobs: Api<CronJob>,
    deschedulers: Api<Descheduler>,
}

impl KubeStore {
    pub fn namespaced(client: kube::Client, namespace: &str) -> Self {
        KubeStore {
            config_maps: Api::namespaced(client.clone(), namespace),
            cron_jobs: Api::namespaced(client.clone(), namespace),
            deschedulers: Api::namespaced(client, namespace),
        }
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get_config_map(&self, name: &str) -> Result<Option<ConfigMap>, kube::Error> {
        get_opt(&self.config_maps, name).await
    }

    async fn create_config_map(&self, config_map: &ConfigMap) -> Result<(), kube::Error> {
        self.config_maps
            .create(&PostParams::default(), config_map)
            .await
            .map(|_| ())
    }

    async fn delete_config_map(&self, name: &str) -> Result<(), kube::Error> {
        self.config_maps
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
    }

    async fn get_cron_job(&self, name: &str) -> Result<Option<CronJob>, kube::Error> {
        get_opt(&self.cron_jobs, name).await
    }

    async fn create_cron_job(&self, cron_job: &CronJob) -> Result<(), kube::Error> {
        self.cron_jobs
            .create(&PostParams::default(), cron_job)
            .await
            .map(|_| ())
    }

    async fn delete_cron_job(&self, name: &str) -> Result<(), kube::Error> {
        self.cron_jobs
            .delete(name, &DeleteParams::orphan())
            .await
            .map(|_| ())
    }

    async fn replace_status(&self, descheduler: &Descheduler) -> Result<(), kube::Error> {
        self.deschedulers
            .replace_status(
                &descheduler.name(),
                &PostParams::default(),
                serde_json::to_vec(descheduler).map_err(kube::Error::SerdeError)?,
            )
            .await
            .map(|_| ())
    }
}

async fn get_opt<K>(api: &Api<K>, name: &str) -> Result<Option<K>, kube::Error>
where
    K: Clone + DeserializeOwned + Debug,
{
    match api.get(name).await {
        Ok(object) => Ok(Some(object)),
        Err(kube::Error::Api(ErrorResponse { code: 404, .. })) => Ok(None),
        Err(error) => Err(error),
    }
}
