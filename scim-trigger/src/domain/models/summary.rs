use super::{JobId, ServicePrincipalId};

/// Result of issuing "start" on a synchronization job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Started,
    /// The job was already running; nothing had to be done.
    AlreadyRunning,
}

/// Aggregate outcome of an on-demand provisioning batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OnDemandSummary {
    pub groups: usize,
    pub groups_failed: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Set when the batch could not be prepared, e.g. the assignment list
    /// was unreadable or no provisioning rule exists.
    pub setup_error: Option<String>,
}

impl OnDemandSummary {
    pub fn setup_failed(error: impl ToString) -> Self {
        Self {
            setup_error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub service_principal_id: ServicePrincipalId,
    pub job_id: JobId,
    pub trigger: TriggerOutcome,
    pub on_demand: Option<OnDemandSummary>,
}
