//! Jenkins REST API client.
//!
//! A thin client over the Jenkins JSON API using HTTP basic auth with an API
//! token. Constructed once at startup and shared by `Arc` — the resolver,
//! trigger and every tracker borrow the same instance.
//!
//! "Build not found" is part of the normal protocol here (a freshly
//! triggered build is not indexed yet), so [`JenkinsClient::build_info`]
//! models it as `Ok(None)` instead of an error.

use color_eyre::eyre::{Result, WrapErr};
use serde::Deserialize;

/// A job as listed by the server.
#[derive(Debug, Clone, Deserialize)]
pub struct JobCandidate {
    #[serde(rename = "fullName")]
    pub full_name: String,
}

/// Job metadata needed to trigger a build.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub next_build_number: i64,
    /// Heterogeneous action objects; the parameter definitions live in the
    /// one whose `_class` is `hudson.model.ParametersDefinitionProperty`.
    #[serde(default)]
    pub actions: Vec<serde_json::Value>,
}

/// Status of one build execution.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub building: bool,
    /// Result string ("SUCCESS", "FAILURE", ...) once the build finished.
    pub result: Option<String>,
    /// Build start time, milliseconds since the epoch.
    pub timestamp: i64,
    /// Estimated total duration in milliseconds (from previous runs).
    pub estimated_duration: i64,
}

/// Jenkins API client.
pub struct JenkinsClient {
    base_url: String,
    user: String,
    token: String,
    /// HTTP client, reused across calls for connection pooling.
    client: reqwest::Client,
}

impl JenkinsClient {
    pub fn new(base_url: String, user: String, token: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            user,
            token,
            client,
        })
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .basic_auth(&self.user, Some(&self.token))
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .basic_auth(&self.user, Some(&self.token))
    }

    /// List all jobs on the server (recursing into folders).
    pub async fn list_jobs(&self) -> Result<Vec<JobCandidate>> {
        let url = format!(
            "{}/api/json?tree=jobs[fullName,jobs[fullName,jobs[fullName]]]",
            self.base_url
        );
        let resp = self
            .get(&url)
            .send()
            .await
            .wrap_err("failed to reach Jenkins")?
            .error_for_status()
            .wrap_err("Jenkins rejected job listing")?;

        let list: serde_json::Value = resp.json().await.wrap_err("malformed job listing")?;
        let mut jobs = Vec::new();
        collect_jobs(&list, &mut jobs);
        Ok(jobs)
    }

    /// Fetch job metadata (next build number + actions).
    pub async fn job_info(&self, job_name: &str) -> Result<JobInfo> {
        let url = format!("{}/{}/api/json", self.base_url, job_path(job_name));
        let resp = self
            .get(&url)
            .send()
            .await
            .wrap_err("failed to reach Jenkins")?
            .error_for_status()
            .wrap_err_with(|| format!("failed to fetch job info for {job_name}"))?;

        resp.json()
            .await
            .wrap_err_with(|| format!("malformed job info for {job_name}"))
    }

    /// Enqueue a build. Jenkins does not return the build number
    /// synchronously; callers track the `next_build_number` they observed
    /// before calling this.
    pub async fn build_job(&self, job_name: &str, params: &[(String, String)]) -> Result<()> {
        let url = if params.is_empty() {
            format!("{}/{}/build", self.base_url, job_path(job_name))
        } else {
            format!(
                "{}/{}/buildWithParameters",
                self.base_url,
                job_path(job_name)
            )
        };

        self.post(&url)
            .query(params)
            .send()
            .await
            .wrap_err("failed to reach Jenkins")?
            .error_for_status()
            .wrap_err_with(|| format!("Jenkins refused to build {job_name}"))?;

        Ok(())
    }

    /// Fetch the status of one build. `Ok(None)` means the server has no
    /// record of this build number (yet).
    pub async fn build_info(&self, job_name: &str, number: i64) -> Result<Option<BuildInfo>> {
        let url = format!(
            "{}/{}/{number}/api/json?tree=building,result,timestamp,estimatedDuration",
            self.base_url,
            job_path(job_name)
        );

        let resp = self
            .get(&url)
            .send()
            .await
            .wrap_err("failed to reach Jenkins")?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let resp = resp
            .error_for_status()
            .wrap_err_with(|| format!("failed to fetch build {job_name} #{number}"))?;

        let info = resp
            .json()
            .await
            .wrap_err_with(|| format!("malformed build info for {job_name} #{number}"))?;
        Ok(Some(info))
    }

    /// Display names of builds currently occupying executors.
    pub async fn running_builds(&self) -> Result<Vec<String>> {
        let url = format!(
            "{}/computer/api/json?tree=computer[executors[currentExecutable[fullDisplayName]]]",
            self.base_url
        );
        let resp = self
            .get(&url)
            .send()
            .await
            .wrap_err("failed to reach Jenkins")?
            .error_for_status()
            .wrap_err("failed to fetch executor state")?;

        let body: serde_json::Value = resp.json().await.wrap_err("malformed executor state")?;

        let mut names = Vec::new();
        let computers = body
            .get("computer")
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default();
        for computer in &computers {
            let executors = computer
                .get("executors")
                .and_then(|e| e.as_array())
                .cloned()
                .unwrap_or_default();
            for executor in &executors {
                if let Some(name) = executor
                    .get("currentExecutable")
                    .and_then(|e| e.get("fullDisplayName"))
                    .and_then(|n| n.as_str())
                {
                    names.push(name.to_owned());
                }
            }
        }
        Ok(names)
    }
}

/// Map a full job name to its URL path. Folder-nested names use `/`:
/// "team/app" lives at "job/team/job/app".
fn job_path(job_name: &str) -> String {
    let segments: Vec<String> = job_name
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| format!("job/{s}"))
        .collect();
    segments.join("/")
}

/// Flatten the (possibly folder-nested) job listing into candidates.
fn collect_jobs(node: &serde_json::Value, out: &mut Vec<JobCandidate>) {
    let Some(jobs) = node.get("jobs").and_then(|j| j.as_array()) else {
        return;
    };
    for job in jobs {
        if let Some(full_name) = job.get("fullName").and_then(|n| n.as_str()) {
            // Folders appear in the listing too but carry nested jobs;
            // only leaf entries are buildable.
            if job.get("jobs").is_some() {
                collect_jobs(job, out);
            } else {
                out.push(JobCandidate {
                    full_name: full_name.to_owned(),
                });
            }
        }
    }
}
