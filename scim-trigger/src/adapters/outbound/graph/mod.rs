mod conversions;

use async_trait::async_trait;
use entra_graph::{GraphClient, SynchronizationJobSubject};

use crate::domain::{
    models::{
        AppId, GroupId, GroupMember, JobId, ProvisioningRule, RoleAssignment, ServicePrincipal,
        ServicePrincipalId, SynchronizationJob, UserId,
    },
    ports::outbound::DirectoryProvider,
    ProvisioningError,
};

use self::conversions::{
    to_domain_assignment, to_domain_job, to_domain_members, to_domain_rule,
    to_domain_service_principal, to_provisioning_error,
};

/// Adapter that wraps an `entra_graph::GraphClient` to implement the
/// `DirectoryProvider` port.
pub struct GraphDirectoryAdapter {
    client: GraphClient,
}

impl GraphDirectoryAdapter {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DirectoryProvider for GraphDirectoryAdapter {
    async fn find_service_principals(
        &self,
        app_id: &AppId,
    ) -> Result<Vec<ServicePrincipal>, ProvisioningError> {
        let service_principals = self
            .client
            .find_service_principals_by_app_id(app_id.as_str())
            .await
            .map_err(to_provisioning_error)?;

        Ok(service_principals
            .into_iter()
            .map(to_domain_service_principal)
            .collect())
    }

    async fn list_synchronization_jobs(
        &self,
        service_principal_id: &ServicePrincipalId,
    ) -> Result<Vec<SynchronizationJob>, ProvisioningError> {
        let jobs = self
            .client
            .list_synchronization_jobs(service_principal_id.as_str())
            .await
            .map_err(to_provisioning_error)?;

        Ok(jobs.into_iter().map(to_domain_job).collect())
    }

    async fn start_synchronization_job(
        &self,
        service_principal_id: &ServicePrincipalId,
        job_id: &JobId,
    ) -> Result<(), ProvisioningError> {
        self.client
            .start_synchronization_job(service_principal_id.as_str(), job_id.as_str())
            .await
            .map_err(to_provisioning_error)
    }

    async fn list_provisioning_rules(
        &self,
        service_principal_id: &ServicePrincipalId,
        job_id: &JobId,
    ) -> Result<Vec<ProvisioningRule>, ProvisioningError> {
        let schema = self
            .client
            .get_synchronization_schema(service_principal_id.as_str(), job_id.as_str())
            .await
            .map_err(to_provisioning_error)?;

        Ok(schema
            .synchronization_rules
            .into_iter()
            .map(to_domain_rule)
            .collect())
    }

    async fn list_role_assignments(
        &self,
        service_principal_id: &ServicePrincipalId,
    ) -> Result<Vec<RoleAssignment>, ProvisioningError> {
        let assignments = self
            .client
            .list_app_role_assignments(service_principal_id.as_str())
            .await
            .map_err(to_provisioning_error)?;

        Ok(assignments.into_iter().map(to_domain_assignment).collect())
    }

    async fn list_group_members(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<GroupMember>, ProvisioningError> {
        let members = self
            .client
            .list_group_members(group_id.as_str())
            .await
            .map_err(to_provisioning_error)?;

        Ok(to_domain_members(members))
    }

    async fn provision_user_on_demand(
        &self,
        service_principal_id: &ServicePrincipalId,
        job_id: &JobId,
        rule_id: &str,
        user_id: &UserId,
    ) -> Result<(), ProvisioningError> {
        self.client
            .provision_on_demand(
                service_principal_id.as_str(),
                job_id.as_str(),
                rule_id,
                vec![SynchronizationJobSubject::user(user_id.as_str())],
            )
            .await
            .map_err(to_provisioning_error)
    }
}
