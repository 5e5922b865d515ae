//! In-memory directory for testing services without network calls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{
    models::{
        AppId, GroupId, GroupMember, JobId, PrincipalKind, ProvisioningRule, RoleAssignment,
        ServicePrincipal, ServicePrincipalId, SynchronizationJob, UserId,
    },
    ports::outbound::DirectoryProvider,
    ProvisioningError,
};

/// A call recorded by [`MockDirectory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryCall {
    FindServicePrincipals(String),
    ListJobs(String),
    StartJob(String, String),
    ListRules(String, String),
    ListRoleAssignments(String),
    ListGroupMembers(String),
    ProvisionUser { rule_id: String, user_id: String },
}

/// Mock directory with canned responses and a call log.
///
/// # Examples
///
/// ```ignore
/// let directory = MockDirectory::new()
///     .with_service_principals(&["sp-1"])
///     .with_jobs(&["job-1"])
///     .with_group("g-1", &["u-1", "u-2"])
///     .failing_user("u-2");
/// ```
pub struct MockDirectory {
    service_principals: Vec<ServicePrincipal>,
    jobs: Vec<SynchronizationJob>,
    start_status: Option<u16>,
    rules: Vec<ProvisioningRule>,
    assignments: Vec<RoleAssignment>,
    members: HashMap<String, Result<Vec<String>, u16>>,
    assignments_status: Option<u16>,
    failing_users: HashSet<String>,
    provision_delay: Option<Duration>,
    calls: Mutex<Vec<DirectoryCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for MockDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDirectory {
    pub fn new() -> Self {
        Self {
            service_principals: Vec::new(),
            jobs: Vec::new(),
            start_status: None,
            rules: vec![ProvisioningRule {
                id: "rule-users".to_owned(),
                name: Some("USER_OUTBOUND".to_owned()),
                maps_users: true,
            }],
            assignments: Vec::new(),
            members: HashMap::new(),
            assignments_status: None,
            failing_users: HashSet::new(),
            provision_delay: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_service_principals(mut self, ids: &[&str]) -> Self {
        self.service_principals = ids
            .iter()
            .map(|id| ServicePrincipal {
                id: ServicePrincipalId::new(*id),
                display_name: Some(format!("App {id}")),
            })
            .collect();
        self
    }

    pub fn with_jobs(mut self, ids: &[&str]) -> Self {
        self.jobs = ids
            .iter()
            .map(|id| SynchronizationJob {
                id: JobId::new(*id),
                template_id: Some("scim".to_owned()),
                status: Some("Active".to_owned()),
            })
            .collect();
        self
    }

    /// Make "start" fail with the given HTTP status.
    pub fn with_start_status(mut self, status: u16) -> Self {
        self.start_status = Some(status);
        self
    }

    pub fn with_rules(mut self, rules: Vec<ProvisioningRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Assign a group to the application with the given user members.
    pub fn with_group(mut self, group_id: &str, users: &[&str]) -> Self {
        self.assignments.push(group_assignment(group_id));
        self.members.insert(
            group_id.to_owned(),
            Ok(users.iter().map(|u| u.to_string()).collect()),
        );
        self
    }

    /// Assign a group whose member listing fails with `status`.
    pub fn with_failing_group(mut self, group_id: &str, status: u16) -> Self {
        self.assignments.push(group_assignment(group_id));
        self.members.insert(group_id.to_owned(), Err(status));
        self
    }

    /// Assign a user directly to the application.
    pub fn with_user_assignment(mut self, user_id: &str) -> Self {
        self.assignments.push(RoleAssignment {
            principal_id: user_id.to_owned(),
            principal_kind: PrincipalKind::User,
            principal_display_name: None,
        });
        self
    }

    pub fn with_assignments_status(mut self, status: u16) -> Self {
        self.assignments_status = Some(status);
        self
    }

    pub fn failing_user(mut self, user_id: &str) -> Self {
        self.failing_users.insert(user_id.to_owned());
        self
    }

    pub fn with_provision_delay(mut self, delay: Duration) -> Self {
        self.provision_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn provisioned_users(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                DirectoryCall::ProvisionUser { user_id, .. } => Some(user_id),
                _ => None,
            })
            .collect()
    }

    pub fn start_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, DirectoryCall::StartJob(..)))
            .count()
    }

    /// Highest number of concurrent provisioning calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, call: DirectoryCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn group_assignment(group_id: &str) -> RoleAssignment {
    RoleAssignment {
        principal_id: group_id.to_owned(),
        principal_kind: PrincipalKind::Group,
        principal_display_name: Some(format!("Group {group_id}")),
    }
}

fn status_error(status: u16) -> ProvisioningError {
    ProvisioningError::graph_api(Some(status), format!("mock returned {status}"))
}

#[async_trait]
impl DirectoryProvider for MockDirectory {
    async fn find_service_principals(
        &self,
        app_id: &AppId,
    ) -> Result<Vec<ServicePrincipal>, ProvisioningError> {
        self.record(DirectoryCall::FindServicePrincipals(app_id.to_string()));
        Ok(self.service_principals.clone())
    }

    async fn list_synchronization_jobs(
        &self,
        service_principal_id: &ServicePrincipalId,
    ) -> Result<Vec<SynchronizationJob>, ProvisioningError> {
        self.record(DirectoryCall::ListJobs(service_principal_id.to_string()));
        Ok(self.jobs.clone())
    }

    async fn start_synchronization_job(
        &self,
        service_principal_id: &ServicePrincipalId,
        job_id: &JobId,
    ) -> Result<(), ProvisioningError> {
        self.record(DirectoryCall::StartJob(
            service_principal_id.to_string(),
            job_id.to_string(),
        ));
        match self.start_status {
            Some(status) => Err(status_error(status)),
            None => Ok(()),
        }
    }

    async fn list_provisioning_rules(
        &self,
        service_principal_id: &ServicePrincipalId,
        job_id: &JobId,
    ) -> Result<Vec<ProvisioningRule>, ProvisioningError> {
        self.record(DirectoryCall::ListRules(
            service_principal_id.to_string(),
            job_id.to_string(),
        ));
        Ok(self.rules.clone())
    }

    async fn list_role_assignments(
        &self,
        service_principal_id: &ServicePrincipalId,
    ) -> Result<Vec<RoleAssignment>, ProvisioningError> {
        self.record(DirectoryCall::ListRoleAssignments(
            service_principal_id.to_string(),
        ));
        match self.assignments_status {
            Some(status) => Err(status_error(status)),
            None => Ok(self.assignments.clone()),
        }
    }

    async fn list_group_members(
        &self,
        group_id: &GroupId,
    ) -> Result<Vec<GroupMember>, ProvisioningError> {
        self.record(DirectoryCall::ListGroupMembers(group_id.to_string()));
        match self.members.get(group_id.as_str()) {
            Some(Ok(users)) => Ok(users
                .iter()
                .map(|user| GroupMember {
                    id: UserId::new(user.as_str()),
                    display_name: None,
                    user_principal_name: Some(format!("{user}@contoso.com")),
                })
                .collect()),
            Some(Err(status)) => Err(status_error(*status)),
            None => Err(status_error(404)),
        }
    }

    async fn provision_user_on_demand(
        &self,
        _service_principal_id: &ServicePrincipalId,
        _job_id: &JobId,
        rule_id: &str,
        user_id: &UserId,
    ) -> Result<(), ProvisioningError> {
        self.record(DirectoryCall::ProvisionUser {
            rule_id: rule_id.to_owned(),
            user_id: user_id.to_string(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(delay) = self.provision_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_users.contains(user_id.as_str()) {
            Err(ProvisioningError::graph_api(
                Some(400),
                format!("user {user_id} is out of scope"),
            ))
        } else {
            Ok(())
        }
    }
}
