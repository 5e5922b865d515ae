use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    batch::{run_settled, BatchSummary},
    models::{GroupId, JobId, OnDemandSummary, ServicePrincipalId, UserId},
    ports::outbound::DirectoryProvider,
    ProvisioningError,
};

/// Upper bound on parallel provision-on-demand calls.
pub const MAX_CONCURRENCY: usize = 5;

/// Users gathered from the groups assigned to an application.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct AssignedUsers {
    pub users: Vec<UserId>,
    pub groups: usize,
    pub groups_failed: usize,
}

/// Provisions every member of every group assigned to a service principal,
/// one provision-on-demand call per unique user.
///
/// Never fails past the batch boundary: per-user failures are counted, and a
/// failure to list the application's assignments or to resolve a
/// provisioning rule is logged and recorded in
/// [`OnDemandSummary::setup_error`].
pub struct OnDemandProvisioner<D: DirectoryProvider> {
    directory: Arc<D>,
    concurrency: usize,
    rule_id: Option<String>,
}

impl<D: DirectoryProvider> OnDemandProvisioner<D> {
    pub fn new(directory: Arc<D>, concurrency: usize) -> Self {
        Self {
            directory,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            rule_id: None,
        }
    }

    /// Use a fixed rule ID instead of discovering one from the job schema.
    pub fn with_rule_id(mut self, rule_id: Option<String>) -> Self {
        self.rule_id = rule_id;
        self
    }

    #[instrument(
        name = "OnDemandProvisioner::run",
        skip_all,
        fields(sp = %service_principal_id, job = %job_id)
    )]
    pub async fn run(
        &self,
        service_principal_id: &ServicePrincipalId,
        job_id: &JobId,
    ) -> OnDemandSummary {
        let assigned = match self.collect_users(service_principal_id).await {
            Ok(assigned) => assigned,
            Err(e) => {
                error!(error = %e, "Failed to list application role assignments");
                return OnDemandSummary::setup_failed(e);
            }
        };

        let mut summary = OnDemandSummary {
            groups: assigned.groups,
            groups_failed: assigned.groups_failed,
            ..Default::default()
        };

        if assigned.users.is_empty() {
            if assigned.groups > 0 {
                warn!(
                    groups = assigned.groups,
                    "Assigned groups have no user members, nothing to provision"
                );
            } else {
                info!("No groups assigned to the application");
            }
            return summary;
        }

        let rule_id = match self.resolve_rule_id(service_principal_id, job_id).await {
            Ok(rule_id) => rule_id,
            Err(e) => {
                error!(
                    error = %e,
                    users = assigned.users.len(),
                    "Cannot provision users without a provisioning rule"
                );
                summary.setup_error = Some(e.to_string());
                return summary;
            }
        };
        info!(
            users = assigned.users.len(),
            rule_id = %rule_id,
            "Provisioning users on demand"
        );

        let outcomes = run_settled(assigned.users, self.concurrency, |user_id| {
            let directory = self.directory.clone();
            let rule_id = rule_id.as_str();
            async move {
                directory
                    .provision_user_on_demand(service_principal_id, job_id, rule_id, &user_id)
                    .await
            }
        })
        .await;

        for outcome in &outcomes {
            match &outcome.result {
                Ok(()) => debug!(user = %outcome.item, "Provisioned user"),
                Err(e) => warn!(user = %outcome.item, error = %e, "Failed to provision user"),
            }
        }

        let BatchSummary {
            attempted,
            succeeded,
            failed,
        } = BatchSummary::from_outcomes(&outcomes);
        summary.attempted = attempted;
        summary.succeeded = succeeded;
        summary.failed = failed;

        info!(attempted, succeeded, failed, "On-demand provisioning finished");
        summary
    }

    /// Unique user IDs across all assigned groups, in first-seen order.
    ///
    /// A group that no longer exists counts as empty. Any other listing
    /// failure skips that group and is counted in `groups_failed`.
    pub async fn collect_users(
        &self,
        service_principal_id: &ServicePrincipalId,
    ) -> Result<AssignedUsers, ProvisioningError> {
        let assignments = match self
            .directory
            .list_role_assignments(service_principal_id)
            .await
        {
            Ok(assignments) => assignments,
            Err(e) if e.is_not_found() => {
                warn!(error = %e, "No role assignments found");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let mut seen_groups = HashSet::new();
        let groups: Vec<(GroupId, Option<String>)> = assignments
            .into_iter()
            .filter_map(|a| a.group_id().map(|id| (id, a.principal_display_name)))
            .filter(|(id, _)| seen_groups.insert(id.clone()))
            .collect();

        let mut result = AssignedUsers {
            groups: groups.len(),
            ..Default::default()
        };
        let mut seen_users = HashSet::new();

        for (group_id, group_name) in &groups {
            info!(
                group = %group_id,
                name = group_name.as_deref().unwrap_or_default(),
                "Processing group"
            );
            let members = match self.directory.list_group_members(group_id).await {
                Ok(members) => members,
                Err(e) if e.is_not_found() => {
                    warn!(group = %group_id, "Group not found, treating as empty");
                    continue;
                }
                Err(e) => {
                    warn!(group = %group_id, error = %e, "Failed to list group members");
                    result.groups_failed += 1;
                    continue;
                }
            };

            debug!(group = %group_id, members = members.len(), "Listed group members");
            for member in members {
                if !seen_users.insert(member.id.clone()) {
                    continue;
                }
                debug!(
                    user = %member.id,
                    name = member.display_name.as_deref().unwrap_or_default(),
                    upn = member.user_principal_name.as_deref().unwrap_or_default(),
                    "Queued user"
                );
                result.users.push(member.id);
            }
        }

        Ok(result)
    }

    /// The configured rule ID, or the first schema rule mapping users
    /// (falling back to the first rule).
    pub async fn resolve_rule_id(
        &self,
        service_principal_id: &ServicePrincipalId,
        job_id: &JobId,
    ) -> Result<String, ProvisioningError> {
        if let Some(rule_id) = &self.rule_id {
            return Ok(rule_id.clone());
        }

        let rules = self
            .directory
            .list_provisioning_rules(service_principal_id, job_id)
            .await?;

        let rule = rules
            .iter()
            .find(|r| r.maps_users)
            .or_else(|| rules.first())
            .ok_or_else(|| {
                ProvisioningError::not_found(format!("provisioning rule for job {job_id}"))
            })?;

        debug!(
            rule_id = %rule.id,
            name = rule.name.as_deref().unwrap_or_default(),
            maps_users = rule.maps_users,
            "Resolved provisioning rule"
        );
        Ok(rule.id.clone())
    }
}
