use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationJob {
    pub id: String,
    pub template_id: Option<String>,
    pub status: Option<SynchronizationStatus>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationStatus {
    /// `NotConfigured`, `NotRun`, `Active`, `Paused` or `Quarantine`.
    pub code: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationSchema {
    #[serde(default)]
    pub synchronization_rules: Vec<SynchronizationRule>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationRule {
    pub id: String,
    pub name: Option<String>,
    #[serde(default)]
    pub object_mappings: Vec<ObjectMapping>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMapping {
    pub source_object_name: Option<String>,
    pub target_object_name: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

impl SynchronizationRule {
    /// Whether this rule has an enabled mapping for the given source object
    /// type, e.g. `"User"`.
    pub fn maps_source_object(&self, object_name: &str) -> bool {
        self.object_mappings.iter().any(|mapping| {
            mapping.enabled
                && mapping
                    .source_object_name
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(object_name))
        })
    }
}

/// Body of `POST .../jobs/{id}/provisionOnDemand`.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ProvisionOnDemandRequest {
    pub parameters: Vec<SynchronizationJobApplicationParameters>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationJobApplicationParameters {
    pub rule_id: String,
    pub subjects: Vec<SynchronizationJobSubject>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SynchronizationJobSubject {
    pub object_id: String,
    pub object_type_name: String,
}

impl SynchronizationJobSubject {
    pub fn user(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            object_type_name: "User".to_owned(),
        }
    }
}

impl ProvisionOnDemandRequest {
    pub fn new(rule_id: impl Into<String>, subjects: Vec<SynchronizationJobSubject>) -> Self {
        Self {
            parameters: vec![SynchronizationJobApplicationParameters {
                rule_id: rule_id.into(),
                subjects,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provision_on_demand_body_shape() {
        let request = ProvisionOnDemandRequest::new(
            "rule-1",
            vec![SynchronizationJobSubject::user("u-1")],
        );

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "parameters": [{
                    "ruleId": "rule-1",
                    "subjects": [{"objectId": "u-1", "objectTypeName": "User"}]
                }]
            })
        );
    }

    #[test]
    fn rule_matches_enabled_user_mapping_only() {
        let json = r#"{
            "synchronizationRules": [
                {
                    "id": "groups-only",
                    "objectMappings": [{"sourceObjectName": "Group", "enabled": true}]
                },
                {
                    "id": "users-disabled",
                    "objectMappings": [{"sourceObjectName": "User", "enabled": false}]
                },
                {
                    "id": "users",
                    "name": "USER_INBOUND",
                    "objectMappings": [
                        {"sourceObjectName": "Group", "enabled": true},
                        {"sourceObjectName": "User", "targetObjectName": "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User", "enabled": true}
                    ]
                }
            ]
        }"#;

        let schema: SynchronizationSchema = serde_json::from_str(json).unwrap();
        let matching: Vec<_> = schema
            .synchronization_rules
            .iter()
            .filter(|rule| rule.maps_source_object("user"))
            .map(|rule| rule.id.as_str())
            .collect();

        assert_eq!(matching, vec!["users"]);
    }

    #[test]
    fn job_status_code() {
        let json = r#"{"id": "scim.abc.123", "templateId": "scim", "status": {"code": "Active"}}"#;

        let job: SynchronizationJob = serde_json::from_str(json).unwrap();
        assert_eq!(job.template_id.as_deref(), Some("scim"));
        assert_eq!(job.status.and_then(|s| s.code).as_deref(), Some("Active"));
    }
}
