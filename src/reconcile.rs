use std::sync::Arc;
use std::time::Duration;

use kube::runtime::controller::{Context, ReconcilerAction};
use kube::ResourceExt;
use thiserror::Error;
use tracing::Instrument;

use crate::config::{OperatorConfig, Rules};
use crate::drift;
use crate::policy::compile_policy;
use crate::resources::{construct_config_map, construct_cron_job};
use crate::store::{KubeStore, Store};
use crate::types::{Descheduler, DeschedulerStatus, Phase};
use crate::validate::ValidationError;

pub struct Data {
    pub client: kube::Client,
    pub config: OperatorConfig,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
    #[error("Invalid descheduler: {0}")]
    InvalidIntent(#[from] ValidationError),
    #[error("Failed to render policy: {0}")]
    RenderPolicyFailed(#[source] serde_yaml::Error),
    #[error("Failed to get config map: {0}")]
    GetConfigMapFailed(#[source] kube::Error),
    #[error("Failed to create config map: {0}")]
    CreateConfigMapFailed(#[source] kube::Error),
    #[error("Failed to delete config map: {0}")]
    DeleteConfigMapFailed(#[source] kube::Error),
    #[error("Failed to get cron job: {0}")]
    GetCronJobFailed(#[source] kube::Error),
    #[error("Failed to create cron job: {0}")]
    CreateCronJobFailed(#[source] kube::Error),
    #[error("Failed to delete cron job: {0}")]
    DeleteCronJobFailed(#[source] kube::Error),
    #[error("Failed to replace status: {0}")]
    ReplaceStatusFailed(#[source] kube::Error),
}

/// What a convergence pass did to the cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    NoOp,
    Mutated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pass {
    pub outcome: Outcome,
    /// Run another pass right away to confirm the converged state.
    pub requeue: bool,
}

impl From<Pass> for ReconcilerAction {
    fn from(pass: Pass) -> Self {
        ReconcilerAction {
            requeue_after: pass.requeue.then(|| Duration::from_secs(0)),
        }
    }
}

pub async fn reconcile(
    descheduler: Arc<Descheduler>,
    ctx: Context<Data>,
) -> Result<ReconcilerAction, Error> {
    let data = ctx.get_ref();
    let namespace = descheduler
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let store = KubeStore::namespaced(data.client.clone(), &namespace);
    let rules = data.config.rules();

    let span = tracing::info_span!("reconcile", %namespace, name = %descheduler.name());
    let pass = ConvergenceEngine::new(&rules)
        .converge(&store, (*descheduler).clone())
        .instrument(span)
        .await?;
    tracing::debug!(
        %namespace,
        name = %descheduler.name(),
        outcome = ?pass.outcome,
        requeue = pass.requeue,
        "pass finished"
    );

    Ok(pass.into())
}

pub fn error_policy(error: &Error, ctx: Context<Data>) -> ReconcilerAction {
    match error {
        Error::InvalidIntent(_) => {
            tracing::warn!(%error, "descheduler rejected, waiting for it to change")
        }
        _ => tracing::error!(%error),
    }
    ReconcilerAction {
        requeue_after: requeue_after(error, &ctx.get_ref().config),
    }
}

/// Invalid intents wait for the next edit unless a recheck interval is
/// configured; everything else is retried after a fixed delay.
fn requeue_after(error: &Error, config: &OperatorConfig) -> Option<Duration> {
    match error {
        Error::InvalidIntent(_) => config.invalid_intent_requeue(),
        _ => Some(config.retry_after()),
    }
}

/// Drives the ConfigMap and CronJob of one Descheduler towards its spec.
///
/// Each pass starts from scratch: it validates the spec, compares freshly
/// built resources with what is stored, and either creates missing ones or
/// deletes drifted ones so that a later pass recreates them. Nothing is ever
/// patched in place.
pub struct ConvergenceEngine<'a> {
    rules: &'a Rules,
}

impl<'a> ConvergenceEngine<'a> {
    pub fn new(rules: &'a Rules) -> Self {
        ConvergenceEngine { rules }
    }

    pub async fn converge<S: Store + ?Sized>(
        &self,
        store: &S,
        mut descheduler: Descheduler,
    ) -> Result<Pass, Error> {
        // Validation runs before anything is written.
        let flags = self.rules.validate_spec(&descheduler.spec)?;

        let name = descheduler
            .metadata
            .name
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;

        // The CronJob mounts the ConfigMap, so the ConfigMap always goes first.
        let config_map_mutated = self
            .converge_config_map(store, &name, &mut descheduler)
            .await?;
        let cron_job_mutated = self
            .converge_cron_job(store, &name, &mut descheduler, flags.as_deref())
            .await?;

        if config_map_mutated || cron_job_mutated {
            return Ok(Pass {
                outcome: Outcome::Mutated,
                requeue: false,
            });
        }

        if descheduler.phase() != Phase::Running {
            set_phase(store, &mut descheduler, Phase::Running).await?;
            return Ok(Pass {
                outcome: Outcome::Mutated,
                requeue: true,
            });
        }

        tracing::debug!("descheduler is converged");
        Ok(Pass {
            outcome: Outcome::NoOp,
            requeue: false,
        })
    }

    async fn converge_config_map<S: Store + ?Sized>(
        &self,
        store: &S,
        name: &str,
        descheduler: &mut Descheduler,
    ) -> Result<bool, Error> {
        let policy = compile_policy(&descheduler.spec.strategies)
            .render()
            .map_err(Error::RenderPolicyFailed)?;

        match store
            .get_config_map(name)
            .await
            .map_err(Error::GetConfigMapFailed)?
        {
            None => {
                let config_map = construct_config_map(descheduler, policy)?;
                store
                    .create_config_map(&config_map)
                    .await
                    .map_err(Error::CreateConfigMapFailed)?;
                tracing::info!(%name, "created policy config map");
                Ok(true)
            }
            Some(observed) if drift::config_map_drifted(&policy, &observed) => {
                tracing::info!(%name, "policy mismatch in config map, deleting it");
                store
                    .delete_config_map(name)
                    .await
                    .map_err(Error::DeleteConfigMapFailed)?;
                set_phase(store, descheduler, Phase::Updating).await?;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn converge_cron_job<S: Store + ?Sized>(
        &self,
        store: &S,
        name: &str,
        descheduler: &mut Descheduler,
        flags: Option<&[String]>,
    ) -> Result<bool, Error> {
        let desired = construct_cron_job(descheduler, self.rules, flags)?;

        match store
            .get_cron_job(name)
            .await
            .map_err(Error::GetCronJobFailed)?
        {
            None => {
                store
                    .create_cron_job(&desired)
                    .await
                    .map_err(Error::CreateCronJobFailed)?;
                tracing::info!(%name, "created descheduler cron job");
                Ok(true)
            }
            Some(observed) => match drift::cron_job_drift(&desired, &observed) {
                Some(drift) => {
                    tracing::info!(%name, ?drift, "cron job mismatch, deleting it");
                    store
                        .delete_cron_job(name)
                        .await
                        .map_err(Error::DeleteCronJobFailed)?;
                    set_phase(store, descheduler, Phase::Updating).await?;
                    Ok(true)
                }
                None => Ok(false),
            },
        }
    }
}

/// Writes `phase` to the status unless it is already there.
async fn set_phase<S: Store + ?Sized>(
    store: &S,
    descheduler: &mut Descheduler,
    phase: Phase,
) -> Result<(), Error> {
    let current = descheduler.phase();
    if current == phase {
        return Ok(());
    }
    descheduler.status = Some(DeschedulerStatus { phase });
    store
        .replace_status(descheduler)
        .await
        .map_err(Error::ReplaceStatusFailed)?;
    tracing::info!(from = ?current, to = ?phase, "updated descheduler phase");
    Ok(())
}
