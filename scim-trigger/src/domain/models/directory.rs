use super::{GroupId, JobId, ServicePrincipalId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePrincipal {
    pub id: ServicePrincipalId,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchronizationJob {
    pub id: JobId,
    pub template_id: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrincipalKind {
    User,
    Group,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub principal_id: String,
    pub principal_kind: PrincipalKind,
    pub principal_display_name: Option<String>,
}

impl RoleAssignment {
    /// The assigned group, if this assignment is to a group.
    pub fn group_id(&self) -> Option<GroupId> {
        (self.principal_kind == PrincipalKind::Group).then(|| GroupId::new(&self.principal_id))
    }
}

/// A user resolved from a group's membership list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember {
    pub id: UserId,
    pub display_name: Option<String>,
    pub user_principal_name: Option<String>,
}

/// A synchronization rule from the job's schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningRule {
    pub id: String,
    pub name: Option<String>,
    /// Whether the rule has an enabled mapping for user objects.
    pub maps_users: bool,
}
