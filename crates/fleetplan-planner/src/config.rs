use crate::shared::error::{PlannerError, PlannerResult};
use std::path::PathBuf;
use std::str::FromStr;

pub const MANIFEST_VAR: &str = "FLEETPLAN_MANIFEST";
pub const STATE_VAR: &str = "FLEETPLAN_STATE";
pub const OUTPUT_VAR: &str = "FLEETPLAN_OUTPUT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
}

impl FromStr for OutputFormat {
    type Err = PlannerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "summary" => Ok(OutputFormat::Summary),
            "json" => Ok(OutputFormat::Json),
            other => Err(PlannerError::ConfigError(format!(
                "unknown output format '{other}', expected 'summary' or 'json'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerConfig {
    pub manifest_path: PathBuf,
    /// Persisted state snapshot; planning starts from empty state without it.
    pub state_path: Option<PathBuf>,
    pub output: OutputFormat,
}

impl PlannerConfig {
    pub fn from_env() -> PlannerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> PlannerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let manifest_path = lookup(MANIFEST_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| PlannerError::ConfigError(format!("{MANIFEST_VAR} is not set")))?;

        let state_path = lookup(STATE_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        let output = match lookup(OUTPUT_VAR) {
            Some(value) => value.parse()?,
            None => OutputFormat::default(),
        };

        Ok(Self {
            manifest_path,
            state_path,
            output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_config_requires_manifest() {
        let err = PlannerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("FLEETPLAN_MANIFEST"));
    }

    #[test]
    fn test_config_defaults() {
        let config =
            PlannerConfig::from_lookup(lookup(&[(MANIFEST_VAR, "deploy.json")])).unwrap();
        assert_eq!(config.manifest_path, PathBuf::from("deploy.json"));
        assert!(config.state_path.is_none());
        assert_eq!(config.output, OutputFormat::Summary);
    }

    #[test]
    fn test_config_reads_all_vars() {
        let config = PlannerConfig::from_lookup(lookup(&[
            (MANIFEST_VAR, "deploy.json"),
            (STATE_VAR, "state.json"),
            (OUTPUT_VAR, "JSON"),
        ]))
        .unwrap();
        assert_eq!(config.state_path, Some(PathBuf::from("state.json")));
        assert_eq!(config.output, OutputFormat::Json);
    }

    #[test]
    fn test_config_rejects_unknown_output() {
        let result =
            PlannerConfig::from_lookup(lookup(&[(MANIFEST_VAR, "deploy.json"), (OUTPUT_VAR, "yaml")]));
        assert!(matches!(result, Err(PlannerError::ConfigError(_))));
    }

    #[test]
    fn test_blank_state_path_is_ignored() {
        let config =
            PlannerConfig::from_lookup(lookup(&[(MANIFEST_VAR, "deploy.json"), (STATE_VAR, " ")]))
                .unwrap();
        assert!(config.state_path.is_none());
    }
}
