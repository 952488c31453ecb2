mod config;
mod drift;
mod policy;
mod reconcile;
mod resources;
mod store;
mod types;
mod validate;

use anyhow::Result;
use futures_util::stream::StreamExt;
use k8s_openapi::api::batch::v1::CronJob;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::{Api, ListParams};
use kube::runtime::controller::{Context, Controller};
use kube::Client;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::OperatorConfig::load()?;
    init_tracing(config.log_json);

    let client = Client::try_default().await?;

    let descheduler_api = Api::<types::Descheduler>::all(client.clone());

    tracing::info!(default_image = %config.default_image, "starting descheduler operator");

    Controller::new(descheduler_api, ListParams::default())
        .owns(Api::<ConfigMap>::all(client.clone()), ListParams::default())
        .owns(Api::<CronJob>::all(client.clone()), ListParams::default())
        .shutdown_on_signal()
        .run(
            reconcile::reconcile,
            reconcile::error_policy,
            Context::new(reconcile::Data { client, config }),
        )
        .for_each(|res| async move {
            match res {
                Ok(o) => tracing::info!("reconciled {:?}", o),
                Err(e) => tracing::warn!("reconcile failed: {}", e),
            }
        })
        .await;

    tracing::info!("controller terminated");

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
