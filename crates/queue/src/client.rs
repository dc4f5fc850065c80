//! Job service traits and their reqwest implementation.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use microq_core::http::{ensure_success, get_json};
use microq_core::{Config, Job, JobId, JobStatus};

use crate::error::QueueError;

/// One row of a project's job listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobEntry {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Status")]
    pub status: JobStatus,
    #[serde(rename = "URLS", default)]
    pub urls: Option<JobUrls>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobUrls {
    #[serde(rename = "URL-Result", default)]
    pub result: Option<String>,
}

impl JobEntry {
    pub fn result_url(&self) -> Option<&str> {
        self.urls.as_ref()?.result.as_deref()
    }
}

/// A project registered at the job service.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessingProject {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Id")]
    pub id: String,
}

#[derive(Deserialize)]
struct JobList {
    #[serde(rename = "Jobs", default)]
    jobs: Vec<JobEntry>,
}

#[derive(Deserialize)]
struct ProjectList {
    #[serde(rename = "Projects", default)]
    projects: Vec<ProcessingProject>,
}

#[derive(Deserialize)]
struct TokenBody {
    token: String,
}

/// Issues short-lived job service tokens.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn fetch_token(&self) -> Result<String, QueueError>;
}

/// Accepts batches of jobs.
#[async_trait]
pub trait JobSink: Send + Sync {
    /// Post `jobs` under `token` and return the response status.
    ///
    /// Only transport failures are errors; every status is returned as is.
    async fn post_jobs(&self, project: &str, token: &str, jobs: &[Job]) -> Result<u16, QueueError>;
}

/// Read access to projects and their jobs.
#[async_trait]
pub trait JobDirectory: Send + Sync {
    async fn list_jobs(&self, project: &str) -> Result<Vec<JobEntry>, QueueError>;

    async fn project_exists(&self, project: &str) -> Result<bool, QueueError>;

    /// Ids of jobs claimed on `day`.
    async fn claimed_job_ids(&self, project: &str, day: NaiveDate) -> Result<Vec<JobId>, QueueError>;

    async fn list_projects(&self) -> Result<Vec<ProcessingProject>, QueueError>;
}

/// Deletes a single claim by url.
#[async_trait]
pub trait ClaimDeleter: Send + Sync {
    async fn delete_claim(&self, url: &str) -> Result<u16, QueueError>;
}

/// HTTP client for the MicroQ job service.
#[derive(Debug, Clone)]
pub struct JobServiceClient {
    http: reqwest::Client,
    root: String,
    version: String,
    username: String,
    password: String,
}

impl JobServiceClient {
    pub fn new(root: &str, version: &str, username: &str, password: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            root: root.trim_end_matches('/').to_string(),
            version: version.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.job_api_root,
            &config.job_api_version,
            &config.job_api_username,
            &config.job_api_password,
        )
    }

    /// `{root}/{version}`, the prefix of every project url.
    pub fn api_base(&self) -> String {
        format!("{}/{}", self.root, self.version)
    }

    pub fn project_uri(&self, project: &str) -> String {
        format!("{}/{project}", self.api_base())
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn admin_credentials(&self) -> (&str, &str) {
        (&self.username, &self.password)
    }
}

fn day_start(day: NaiveDate) -> String {
    day.format("%Y-%m-%dT00:00:00").to_string()
}

#[async_trait]
impl TokenEndpoint for JobServiceClient {
    async fn fetch_token(&self) -> Result<String, QueueError> {
        let url = format!("{}/token", self.root);
        let response = self
            .http
            .get(&url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        if response.status() != StatusCode::OK {
            return Err(QueueError::Auth(format!(
                "{url} returned status {}",
                response.status()
            )));
        }
        let body: TokenBody = response.json().await?;
        debug!("Obtained job service token");
        Ok(body.token)
    }
}

#[async_trait]
impl JobSink for JobServiceClient {
    async fn post_jobs(&self, project: &str, token: &str, jobs: &[Job]) -> Result<u16, QueueError> {
        let url = format!("{}/jobs", self.project_uri(project));
        let response = self
            .http
            .post(&url)
            .basic_auth(token, Some(""))
            .json(jobs)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl JobDirectory for JobServiceClient {
    async fn list_jobs(&self, project: &str) -> Result<Vec<JobEntry>, QueueError> {
        let url = format!("{}/jobs", self.project_uri(project));
        let list: JobList = get_json(&self.http, &url, &[]).await?;
        Ok(list.jobs)
    }

    async fn project_exists(&self, project: &str) -> Result<bool, QueueError> {
        let response = self.http.get(self.project_uri(project)).send().await?;
        Ok(response.status() == StatusCode::OK)
    }

    async fn claimed_job_ids(&self, project: &str, day: NaiveDate) -> Result<Vec<JobId>, QueueError> {
        let url = format!("{}/jobs", self.project_uri(project));
        let query = [
            ("status", "CLAIMED".to_string()),
            ("start", day_start(day)),
            ("end", day_start(day + Duration::days(1))),
        ];
        let list: JobList = get_json(&self.http, &url, &query).await?;
        list.jobs
            .iter()
            .map(|job| job.id.parse::<JobId>().map_err(QueueError::from))
            .collect()
    }

    async fn list_projects(&self) -> Result<Vec<ProcessingProject>, QueueError> {
        let url = format!("{}/projects", self.api_base());
        let list: ProjectList = get_json(&self.http, &url, &[]).await?;
        Ok(list.projects)
    }
}

#[async_trait]
impl ClaimDeleter for JobServiceClient {
    async fn delete_claim(&self, url: &str) -> Result<u16, QueueError> {
        let response = self
            .http
            .delete(url)
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await?;
        Ok(response.status().as_u16())
    }
}

/// Resolve `response` or turn its status into [`QueueError::Http`].
pub(crate) fn check_status(response: reqwest::Response) -> Result<reqwest::Response, QueueError> {
    Ok(ensure_success(response)?)
}
