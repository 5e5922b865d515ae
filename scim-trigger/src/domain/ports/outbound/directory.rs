use async_trait::async_trait;

use crate::domain::{
    models::{
        AppId, GroupId, GroupMember, JobId, ProvisioningRule, RoleAssignment, ServicePrincipal,
        ServicePrincipalId, SynchronizationJob, UserId,
    },
    ProvisioningError,
};

/// Outbound port for the directory and provisioning API.
///
/// Implementations translate transport failures into
/// [`ProvisioningError::GraphApi`] and keep the HTTP status so callers can
/// tell a 404 or 409 apart from other failures.
#[async_trait]
pub trait DirectoryProvider: Send + Sync + 'static {
    /// Service principals whose application client ID equals `app_id`.
    ///
    /// Only the first page of results is returned.
    async fn find_service_principals(
        &self,
        app_id: &AppId,
    ) -> Result<Vec<ServicePrincipal>, ProvisioningError>;

    /// Synchronization jobs attached to a service principal, in API order.
    async fn list_synchronization_jobs(
        &self,
        service_principal_id: &ServicePrincipalId,
    ) -> Result<Vec<SynchronizationJob>, ProvisioningError>;

    /// Issue the "start" action. Does not wait for the run to finish.
    async fn start_synchronization_job(
        &self,
        service_principal_id: &ServicePrincipalId,
        job_id: &JobId,
    ) -> Result<(), ProvisioningError>;

    /// Synchronization rules from the job's schema.
    async fn list_provisioning_rules(
        &self,
        service_principal_id: &ServicePrincipalId,
        job_id: &JobId,
    ) -> Result<Vec<ProvisioningRule>, ProvisioningError>;

    /// App-role assignments granted on the service principal, all pages.
    async fn list_role_assignments(
        &self,
        service_principal_id: &ServicePrincipalId,
    ) -> Result<Vec<RoleAssignment>, ProvisioningError>;

    /// User members of a group, all pages. Non-user members are skipped.
    async fn list_group_members(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<GroupMember>, ProvisioningError>;

    /// Provision a single user on demand through the job.
    async fn provision_user_on_demand(
        &self,
        service_principal_id: &ServicePrincipalId,
        job_id: &JobId,
        rule_id: &str,
        user_id: &UserId,
    ) -> Result<(), ProvisioningError>;
}
