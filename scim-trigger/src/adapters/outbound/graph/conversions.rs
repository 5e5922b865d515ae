use entra_graph::GraphError;

use crate::domain::{
    models::{
        GroupMember, JobId, PrincipalKind, ProvisioningRule, RoleAssignment, ServicePrincipal,
        ServicePrincipalId, SynchronizationJob, UserId,
    },
    ProvisioningError,
};

pub fn to_domain_service_principal(sp: entra_graph::ServicePrincipal) -> ServicePrincipal {
    ServicePrincipal {
        id: ServicePrincipalId::new(sp.id),
        display_name: sp.display_name.or(sp.app_display_name),
    }
}

pub fn to_domain_job(job: entra_graph::SynchronizationJob) -> SynchronizationJob {
    SynchronizationJob {
        id: JobId::new(job.id),
        template_id: job.template_id,
        status: job.status.and_then(|s| s.code),
    }
}

pub fn to_domain_rule(rule: entra_graph::SynchronizationRule) -> ProvisioningRule {
    ProvisioningRule {
        maps_users: rule.maps_source_object("User"),
        id: rule.id,
        name: rule.name,
    }
}

pub fn to_domain_assignment(assignment: entra_graph::AppRoleAssignment) -> RoleAssignment {
    let principal_kind = match assignment.principal_type {
        entra_graph::PrincipalType::User => PrincipalKind::User,
        entra_graph::PrincipalType::Group => PrincipalKind::Group,
        entra_graph::PrincipalType::ServicePrincipal | entra_graph::PrincipalType::Unknown => {
            PrincipalKind::Other
        }
    };

    RoleAssignment {
        principal_id: assignment.principal_id,
        principal_kind,
        principal_display_name: assignment.principal_display_name,
    }
}

/// Group members that are users. Nested groups, devices and service
/// principals are dropped.
pub fn to_domain_members(members: Vec<entra_graph::DirectoryObject>) -> Vec<GroupMember> {
    members
        .into_iter()
        .filter(|m| m.is_user())
        .map(|m| GroupMember {
            id: UserId::new(m.id),
            display_name: m.display_name,
            user_principal_name: m.user_principal_name,
        })
        .collect()
}

pub fn to_provisioning_error(error: GraphError) -> ProvisioningError {
    match error {
        GraphError::Credential(e) => ProvisioningError::Authentication(e.to_string()),
        GraphError::Api {
            status, message, ..
        } => ProvisioningError::graph_api(Some(status.as_u16()), message),
        other => ProvisioningError::graph_api(
            other.status().map(|s| s.as_u16()),
            other.to_string(),
        ),
    }
}
