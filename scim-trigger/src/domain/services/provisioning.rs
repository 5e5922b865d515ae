use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::on_demand::OnDemandProvisioner;
use crate::domain::{
    models::{AppId, JobId, RunSummary, ServicePrincipalId, TriggerOutcome},
    ports::outbound::DirectoryProvider,
    ProvisioningError,
};

/// What a single provisioning run should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub app_id: AppId,
    /// Provision assigned group members one by one after the job is started.
    pub on_demand: bool,
    pub on_demand_concurrency: usize,
    /// Fixed provisioning rule; discovered from the job schema when unset.
    pub rule_id: Option<String>,
}

impl RunOptions {
    pub fn new(app_id: impl Into<AppId>) -> Self {
        Self {
            app_id: app_id.into(),
            on_demand: false,
            on_demand_concurrency: 4,
            rule_id: None,
        }
    }
}

/// Locates an application's synchronization job and starts it.
pub struct ProvisioningService<D: DirectoryProvider> {
    directory: Arc<D>,
}

impl<D: DirectoryProvider> ProvisioningService<D> {
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    /// Resolve an application client ID to its service principal.
    ///
    /// Exactly one match is required. Zero matches is `NotFound`, more than
    /// one is `AmbiguousResult`.
    pub async fn locate_service_principal(
        &self,
        app_id: &AppId,
    ) -> Result<ServicePrincipalId, ProvisioningError> {
        let mut matches = self.directory.find_service_principals(app_id).await?;

        match matches.len() {
            0 => Err(ProvisioningError::not_found(format!(
                "service principal for app ID {app_id}"
            ))),
            1 => {
                let sp = matches.remove(0);
                info!(
                    sp = %sp.id,
                    name = sp.display_name.as_deref().unwrap_or_default(),
                    "Found service principal"
                );
                Ok(sp.id)
            }
            count => Err(ProvisioningError::AmbiguousResult {
                app_id: app_id.to_string(),
                count,
            }),
        }
    }

    /// The first synchronization job of the service principal.
    pub async fn locate_synchronization_job(
        &self,
        service_principal_id: &ServicePrincipalId,
    ) -> Result<JobId, ProvisioningError> {
        let jobs = self
            .directory
            .list_synchronization_jobs(service_principal_id)
            .await?;

        let Some(job) = jobs.first() else {
            return Err(ProvisioningError::not_found(format!(
                "synchronization job for service principal {service_principal_id}"
            )));
        };

        if jobs.len() > 1 {
            warn!(
                count = jobs.len(),
                job = %job.id,
                "Multiple synchronization jobs found, using the first"
            );
        }
        info!(
            job = %job.id,
            template = job.template_id.as_deref().unwrap_or_default(),
            status = job.status.as_deref().unwrap_or_default(),
            "Found synchronization job"
        );
        Ok(job.id.clone())
    }

    /// Start the job. A job that is already running counts as started.
    pub async fn start_job(
        &self,
        service_principal_id: &ServicePrincipalId,
        job_id: &JobId,
    ) -> Result<TriggerOutcome, ProvisioningError> {
        match self
            .directory
            .start_synchronization_job(service_principal_id, job_id)
            .await
        {
            Ok(()) => {
                info!(job = %job_id, "Synchronization job started");
                Ok(TriggerOutcome::Started)
            }
            Err(e) if e.is_conflict() => {
                info!(job = %job_id, "Synchronization job is already running");
                Ok(TriggerOutcome::AlreadyRunning)
            }
            Err(e) => Err(e),
        }
    }

    /// Locate, start, and optionally fan out. Stops at the first fatal error.
    ///
    /// Once the job has been started the run succeeds; fan-out problems are
    /// reported in the returned summary.
    #[instrument(name = "ProvisioningService::run", skip_all, fields(app_id = %options.app_id))]
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary, ProvisioningError> {
        let service_principal_id = self.locate_service_principal(&options.app_id).await?;
        let job_id = self
            .locate_synchronization_job(&service_principal_id)
            .await?;
        let trigger = self.start_job(&service_principal_id, &job_id).await?;

        let on_demand = if options.on_demand {
            let provisioner =
                OnDemandProvisioner::new(self.directory.clone(), options.on_demand_concurrency)
                    .with_rule_id(options.rule_id.clone());
            Some(provisioner.run(&service_principal_id, &job_id).await)
        } else {
            None
        };

        Ok(RunSummary {
            service_principal_id,
            job_id,
            trigger,
            on_demand,
        })
    }
}
