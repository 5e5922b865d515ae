use serde::Deserialize;

/// One page of a Graph collection response.
#[derive(Debug, Deserialize)]
pub struct ODataPage<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// Error envelope returned by Graph on non-success responses.
#[derive(Debug, Deserialize)]
pub struct ODataError {
    pub error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub details: Vec<ODataErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct ODataErrorDetail {
    pub code: Option<String>,
    pub message: Option<String>,
    pub target: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Item {
        id: String,
    }

    #[test]
    fn page_with_next_link() {
        let json = r#"{
            "value": [{"id": "1"}, {"id": "2"}],
            "@odata.nextLink": "https://graph.microsoft.com/v1.0/groups/g/members?$skiptoken=abc"
        }"#;

        let page: ODataPage<Item> = serde_json::from_str(json).unwrap();
        assert_eq!(page.value.len(), 2);
        assert_eq!(page.value[1].id, "2");
        assert!(page.next_link.is_some());
    }

    #[test]
    fn page_without_value_is_empty() {
        let page: ODataPage<Item> = serde_json::from_str("{}").unwrap();
        assert!(page.value.is_empty());
        assert!(page.next_link.is_none());
    }

    #[test]
    fn error_with_details() {
        let json = r#"{
            "error": {
                "code": "BadRequest",
                "message": "Invalid ruleId",
                "details": [{"code": "InvalidRule", "message": "no such rule", "target": "ruleId"}]
            }
        }"#;

        let error: ODataError = serde_json::from_str(json).unwrap();
        assert_eq!(error.error.code, "BadRequest");
        assert_eq!(error.error.details.len(), 1);
        assert_eq!(error.error.details[0].target.as_deref(), Some("ruleId"));
    }
}
