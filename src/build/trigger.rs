//! Triggering a build with its default parameters.

use crate::jenkins::{JenkinsClient, JobInfo};
use chrono::{DateTime, Utc};
use color_eyre::eyre::Result;

const PARAMETERS_PROPERTY: &str = "hudson.model.ParametersDefinitionProperty";
const PASSWORD_PARAMETER: &str = "PasswordParameterDefinition";

/// Best-effort identifier for a build we just enqueued.
///
/// Jenkins does not return the build number synchronously, so `number` is
/// the job's `nextBuildNumber` as observed immediately before submission.
/// The server is the source of truth: the build may not be indexed yet, and
/// two near-simultaneous triggers of the same job can race for the number.
#[derive(Debug, Clone)]
pub struct BuildHandle {
    pub job_name: String,
    pub number: i64,
    pub triggered_at: DateTime<Utc>,
}

/// Result of triggering a job: what was submitted, with what parameters.
#[derive(Debug, Clone)]
pub struct TriggeredBuild {
    pub handle: BuildHandle,
    /// Name/value pairs submitted with the build (secrets excluded).
    pub params: Vec<(String, String)>,
}

/// Fetch the job's metadata, fill in non-secret parameter defaults, and
/// enqueue one build. Not idempotent — calling twice enqueues two builds;
/// the dispatcher guards against duplicate button presses.
pub async fn trigger(client: &JenkinsClient, job_name: &str) -> Result<TriggeredBuild> {
    let info = client.job_info(job_name).await?;
    let params = default_params(&info);

    let handle = BuildHandle {
        job_name: job_name.to_owned(),
        number: info.next_build_number,
        triggered_at: Utc::now(),
    };

    client.build_job(job_name, &params).await?;
    eprintln!(
        "[trigger] Enqueued {job_name} (expecting build #{}, {} param(s))",
        handle.number,
        params.len()
    );

    Ok(TriggeredBuild { handle, params })
}

/// Collect the declared default value of every non-secret parameter.
///
/// The parameter definitions live in the action whose `_class` is
/// `hudson.model.ParametersDefinitionProperty`; a job without one takes no
/// parameters. Password-typed parameters are excluded entirely rather than
/// submitted with their defaults.
pub fn default_params(info: &JobInfo) -> Vec<(String, String)> {
    let definitions = info
        .actions
        .iter()
        .find(|a| {
            a.get("_class").and_then(|c| c.as_str()) == Some(PARAMETERS_PROPERTY)
        })
        .and_then(|a| a.get("parameterDefinitions"))
        .and_then(|d| d.as_array());

    let Some(definitions) = definitions else {
        return Vec::new();
    };

    let mut params = Vec::new();
    for def in definitions {
        let Some(name) = def.get("name").and_then(|n| n.as_str()) else {
            continue;
        };
        if def.get("type").and_then(|t| t.as_str()) == Some(PASSWORD_PARAMETER) {
            continue;
        }
        let value = def
            .get("defaultParameterValue")
            .and_then(|v| v.get("value"))
            .map(json_to_param)
            .unwrap_or_default();
        params.push((name.to_owned(), value));
    }
    params
}

/// Stringify a default value for submission (booleans and numbers appear
/// unquoted in the job info).
fn json_to_param(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_info(actions: serde_json::Value) -> JobInfo {
        serde_json::from_value(serde_json::json!({
            "nextBuildNumber": 42,
            "actions": actions,
        }))
        .unwrap()
    }

    #[test]
    fn test_no_parameters_property_means_empty_set() {
        let info = job_info(serde_json::json!([
            { "_class": "some.other.Action" },
        ]));
        assert!(default_params(&info).is_empty());
    }

    #[test]
    fn test_collects_declared_defaults() {
        let info = job_info(serde_json::json!([
            {
                "_class": "hudson.model.ParametersDefinitionProperty",
                "parameterDefinitions": [
                    {
                        "name": "BRANCH",
                        "type": "StringParameterDefinition",
                        "defaultParameterValue": { "value": "main" },
                    },
                    {
                        "name": "CLEAN",
                        "type": "BooleanParameterDefinition",
                        "defaultParameterValue": { "value": true },
                    },
                ],
            },
        ]));
        let params = default_params(&info);
        assert_eq!(
            params,
            vec![
                ("BRANCH".to_owned(), "main".to_owned()),
                ("CLEAN".to_owned(), "true".to_owned()),
            ]
        );
    }

    #[test]
    fn test_excludes_password_parameters() {
        let info = job_info(serde_json::json!([
            {
                "_class": "hudson.model.ParametersDefinitionProperty",
                "parameterDefinitions": [
                    {
                        "name": "DEPLOY_KEY",
                        "type": "PasswordParameterDefinition",
                        "defaultParameterValue": { "value": "hunter2" },
                    },
                    {
                        "name": "TARGET",
                        "type": "StringParameterDefinition",
                        "defaultParameterValue": { "value": "staging" },
                    },
                ],
            },
        ]));
        let params = default_params(&info);
        let names: Vec<_> = params.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["TARGET"]);
    }

    #[test]
    fn test_only_password_parameters_means_empty_set() {
        let info = job_info(serde_json::json!([
            {
                "_class": "hudson.model.ParametersDefinitionProperty",
                "parameterDefinitions": [
                    {
                        "name": "SECRET",
                        "type": "PasswordParameterDefinition",
                        "defaultParameterValue": { "value": "x" },
                    },
                ],
            },
        ]));
        assert!(default_params(&info).is_empty());
    }

    #[test]
    fn test_missing_default_becomes_empty_string() {
        let info = job_info(serde_json::json!([
            {
                "_class": "hudson.model.ParametersDefinitionProperty",
                "parameterDefinitions": [
                    { "name": "NOTE", "type": "StringParameterDefinition" },
                ],
            },
        ]));
        assert_eq!(default_params(&info), vec![("NOTE".to_owned(), String::new())]);
    }

    #[test]
    fn test_picks_the_parameters_property_among_actions() {
        let info = job_info(serde_json::json!([
            { "_class": "hudson.plugins.git.GitAction" },
            {
                "_class": "hudson.model.ParametersDefinitionProperty",
                "parameterDefinitions": [
                    {
                        "name": "ENV",
                        "type": "ChoiceParameterDefinition",
                        "defaultParameterValue": { "value": "dev" },
                    },
                ],
            },
        ]));
        assert_eq!(default_params(&info), vec![("ENV".to_owned(), "dev".to_owned())]);
    }
}
