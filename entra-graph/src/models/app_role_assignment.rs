use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PrincipalType {
    User,
    Group,
    ServicePrincipal,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AppRoleAssignment {
    pub id: Option<String>,
    pub principal_id: String,
    pub principal_type: PrincipalType,
    pub principal_display_name: Option<String>,
    pub app_role_id: Option<String>,
}
