use std::collections::HashMap;

use serde::Deserialize;

use crate::domain::{services::RunOptions, services::MAX_CONCURRENCY, ProvisioningError};

const DEFAULT_CONCURRENCY: usize = 4;

/// Environment variables read by this crate. Credential variables are read by
/// `entra_graph` itself.
const RECOGNIZED_VARS: [&str; 5] = [
    "AZURE_APP_ID",
    "RUN_ON_DEMAND_PROVISIONING",
    "SCIM_ON_DEMAND_CONCURRENCY",
    "SCIM_PROVISIONING_RULE_ID",
    "GRAPH_BASE_URL",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub app_id: String,
    pub run_on_demand_provisioning: bool,
    pub on_demand_concurrency: usize,
    pub provisioning_rule_id: Option<String>,
    pub graph_base_url: Option<String>,
}

/// Raw values as they appear in the environment, before validation.
#[derive(Deserialize, Debug, Default)]
struct RawSettings {
    azure_app_id: Option<String>,
    run_on_demand_provisioning: Option<String>,
    scim_on_demand_concurrency: Option<String>,
    scim_provisioning_rule_id: Option<String>,
    graph_base_url: Option<String>,
}

impl Settings {
    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            on_demand: self.run_on_demand_provisioning,
            on_demand_concurrency: self.on_demand_concurrency,
            rule_id: self.provisioning_rule_id.clone(),
            ..RunOptions::new(self.app_id.as_str())
        }
    }
}

impl TryFrom<RawSettings> for Settings {
    type Error = ProvisioningError;

    fn try_from(raw: RawSettings) -> Result<Self, Self::Error> {
        let app_id = non_empty(raw.azure_app_id).ok_or_else(|| {
            ProvisioningError::Configuration("AZURE_APP_ID must be set".to_owned())
        })?;

        let run_on_demand_provisioning = raw
            .run_on_demand_provisioning
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));

        let on_demand_concurrency = match non_empty(raw.scim_on_demand_concurrency) {
            None => DEFAULT_CONCURRENCY,
            Some(v) => v
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=MAX_CONCURRENCY).contains(n))
                .ok_or_else(|| {
                    ProvisioningError::Configuration(format!(
                        "SCIM_ON_DEMAND_CONCURRENCY must be between 1 and {MAX_CONCURRENCY}, got '{v}'"
                    ))
                })?,
        };

        Ok(Self {
            app_id,
            run_on_demand_provisioning,
            on_demand_concurrency,
            provisioning_rule_id: non_empty(raw.scim_provisioning_rule_id),
            graph_base_url: non_empty(raw.graph_base_url),
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Read settings from the process environment.
pub fn read_config() -> Result<Settings, ProvisioningError> {
    read_config_from(std::env::vars())
}

/// Read settings from the given variables. Only recognized names are used.
pub fn read_config_from(
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<Settings, ProvisioningError> {
    let vars: HashMap<String, String> = vars
        .into_iter()
        .filter(|(key, _)| RECOGNIZED_VARS.contains(&key.as_str()))
        .collect();

    let raw = config::Config::builder()
        .add_source(config::Environment::default().source(Some(vars)))
        .build()
        .and_then(|settings| settings.try_deserialize::<RawSettings>())
        .map_err(|e| ProvisioningError::Configuration(e.to_string()))?;

    Settings::try_from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn minimal_environment() {
        let settings = read_config_from(vars(&[("AZURE_APP_ID", "abc-123")])).unwrap();

        assert_eq!(
            settings,
            Settings {
                app_id: "abc-123".to_owned(),
                run_on_demand_provisioning: false,
                on_demand_concurrency: DEFAULT_CONCURRENCY,
                provisioning_rule_id: None,
                graph_base_url: None,
            }
        );
    }

    #[test]
    fn missing_app_id_is_configuration_error() {
        let err = read_config_from(vars(&[("RUN_ON_DEMAND_PROVISIONING", "true")])).unwrap_err();
        assert!(matches!(err, ProvisioningError::Configuration(_)));
    }

    #[test]
    fn blank_app_id_is_configuration_error() {
        let err = read_config_from(vars(&[("AZURE_APP_ID", "   ")])).unwrap_err();
        assert!(matches!(err, ProvisioningError::Configuration(_)));
    }

    #[test]
    fn app_id_is_trimmed() {
        let settings = read_config_from(vars(&[("AZURE_APP_ID", " abc-123\n")])).unwrap();
        assert_eq!(settings.app_id, "abc-123");
    }

    #[test]
    fn on_demand_flag_requires_true() {
        for (value, expected) in [
            ("true", true),
            ("TRUE", true),
            ("True", true),
            ("false", false),
            ("1", false),
            ("yes", false),
            ("", false),
        ] {
            let settings = read_config_from(vars(&[
                ("AZURE_APP_ID", "abc-123"),
                ("RUN_ON_DEMAND_PROVISIONING", value),
            ]))
            .unwrap();
            assert_eq!(settings.run_on_demand_provisioning, expected, "value {value:?}");
        }
    }

    #[test]
    fn concurrency_must_be_in_range() {
        let settings = read_config_from(vars(&[
            ("AZURE_APP_ID", "abc-123"),
            ("SCIM_ON_DEMAND_CONCURRENCY", "2"),
        ]))
        .unwrap();
        assert_eq!(settings.on_demand_concurrency, 2);

        for bad in ["0", "6", "many"] {
            let err = read_config_from(vars(&[
                ("AZURE_APP_ID", "abc-123"),
                ("SCIM_ON_DEMAND_CONCURRENCY", bad),
            ]))
            .unwrap_err();
            assert!(matches!(err, ProvisioningError::Configuration(_)));
        }
    }

    #[test]
    fn unrelated_variables_are_ignored() {
        let settings = read_config_from(vars(&[
            ("AZURE_APP_ID", "abc-123"),
            ("AZURE_CLIENT_SECRET", "s3cret"),
            ("PATH", "/usr/bin"),
        ]))
        .unwrap();
        assert_eq!(settings.app_id, "abc-123");
    }

    #[test]
    fn run_options_carry_settings() {
        let settings = read_config_from(vars(&[
            ("AZURE_APP_ID", "abc-123"),
            ("RUN_ON_DEMAND_PROVISIONING", "true"),
            ("SCIM_PROVISIONING_RULE_ID", "rule-1"),
        ]))
        .unwrap();

        let options = settings.run_options();
        assert_eq!(options.app_id.as_str(), "abc-123");
        assert!(options.on_demand);
        assert_eq!(options.rule_id.as_deref(), Some("rule-1"));
    }
}
