mod adapters;
mod config;
mod domain;
mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use entra_graph::{ChainedCredential, GraphClient};
use tracing::{error, info, warn};

use crate::{
    adapters::outbound::graph::GraphDirectoryAdapter,
    config::Settings,
    domain::{
        models::{RunSummary, TriggerOutcome},
        services::ProvisioningService,
        ProvisioningError,
    },
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    logging::init();

    match run().await {
        Ok(summary) => {
            report(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Provisioning trigger failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<RunSummary, ProvisioningError> {
    let settings = config::read_config()?;
    let service = ProvisioningService::new(Arc::new(build_directory(&settings)?));
    service.run(&settings.run_options()).await
}

fn build_directory(settings: &Settings) -> Result<GraphDirectoryAdapter, ProvisioningError> {
    let credential = ChainedCredential::from_env()
        .map_err(|e| ProvisioningError::Authentication(e.to_string()))?;
    info!(sources = ?credential.source_names(), "Resolving credentials");

    let mut client = GraphClient::new(credential.into_shared())
        .map_err(|e| ProvisioningError::graph_api(None, e.to_string()))?;
    if let Some(base_url) = &settings.graph_base_url {
        client = client.with_base_url(base_url);
    }

    Ok(GraphDirectoryAdapter::new(client))
}

fn report(summary: &RunSummary) {
    let trigger = match summary.trigger {
        TriggerOutcome::Started => "started",
        TriggerOutcome::AlreadyRunning => "already running",
    };
    info!(
        sp = %summary.service_principal_id,
        job = %summary.job_id,
        trigger,
        "Provisioning job triggered"
    );

    if let Some(on_demand) = &summary.on_demand {
        if let Some(setup_error) = &on_demand.setup_error {
            warn!(
                error = %setup_error,
                "On-demand provisioning skipped, the job itself was triggered"
            );
        } else if on_demand.failed > 0 || on_demand.groups_failed > 0 {
            warn!(
                attempted = on_demand.attempted,
                succeeded = on_demand.succeeded,
                failed = on_demand.failed,
                groups_failed = on_demand.groups_failed,
                "On-demand provisioning finished with failures"
            );
        } else {
            info!(
                groups = on_demand.groups,
                attempted = on_demand.attempted,
                succeeded = on_demand.succeeded,
                "On-demand provisioning finished"
            );
        }
    }
}
