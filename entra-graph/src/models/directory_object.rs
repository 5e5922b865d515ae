use serde::{Deserialize, Serialize};

const USER_ODATA_TYPE: &str = "#microsoft.graph.user";

/// A member of a group as returned by `/groups/{id}/members`.
///
/// Members can be users, nested groups, devices or service principals; the
/// concrete kind is carried in `@odata.type`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryObject {
    pub id: String,
    #[serde(rename = "@odata.type")]
    pub odata_type: Option<String>,
    pub display_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub user_type: Option<String>,
}

impl DirectoryObject {
    /// Objects without a type annotation are treated as users, which is what
    /// Graph returns when the request is already cast to `microsoft.graph.user`.
    pub fn is_user(&self) -> bool {
        self.odata_type
            .as_deref()
            .map_or(true, |t| t.eq_ignore_ascii_case(USER_ODATA_TYPE))
    }
}
