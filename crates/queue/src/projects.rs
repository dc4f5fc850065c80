//! Project administration at the job service.

use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use microq_catalog::{CatalogError, Level2Project, OdinClient};
use microq_core::job::TargetPayload;
use microq_core::{JobId, TargetCipher};

use crate::client::{check_status, JobDirectory, JobServiceClient, ProcessingProject};
use crate::error::QueueError;

/// Body of a project creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectSpec {
    pub processing_image_url: String,
    pub deadline: NaiveDate,
    /// Upstream (Odin) project the results are written to.
    pub name: String,
}

#[derive(Deserialize)]
struct ProjectInfo {
    #[serde(rename = "Name")]
    name: String,
}

/// A level2 project that also exists at the job service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedProject {
    /// Odin project name.
    pub name: String,
    /// Job service project id.
    pub id: String,
}

/// Outcome of [`JobServiceClient::delete_level2_results`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    pub deleted: usize,
    pub failed: usize,
}

impl JobServiceClient {
    pub async fn create_project(&self, project: &str, spec: &ProjectSpec) -> Result<(), QueueError> {
        let (user, password) = self.admin_credentials();
        let response = self
            .http()
            .put(self.project_uri(project))
            .basic_auth(user, Some(password))
            .json(spec)
            .send()
            .await?;
        if response.status() != StatusCode::CREATED {
            warn!(project, status = %response.status(), "Project creation rejected");
            return Err(QueueError::Http("Project could not be created".to_string()));
        }
        info!(project, odin_project = %spec.name, deadline = %spec.deadline, "Created project");
        Ok(())
    }

    pub async fn delete_project(&self, project: &str) -> Result<(), QueueError> {
        let (user, password) = self.admin_credentials();
        let response = self
            .http()
            .delete(self.project_uri(project))
            .basic_auth(user, Some(password))
            .send()
            .await?;
        check_status(response)?;
        info!(project, "Deleted project");
        Ok(())
    }

    /// The Odin project name stored with `project`.
    pub async fn project_name(&self, project: &str) -> Result<String, QueueError> {
        let response = self.http().get(self.project_uri(project)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(QueueError::NoProject(project.to_string()));
        }
        let info: ProjectInfo = check_status(response)?.json().await?;
        Ok(info.name)
    }

    /// Delete the level2 results of every job of `project` from the catalog.
    ///
    /// Each result is addressed by the encrypted target of its job. Rejected
    /// deletions are logged and counted and the remaining jobs are still
    /// tried; an unreachable catalog stops the purge.
    pub async fn delete_level2_results(
        &self,
        project: &str,
        odin_project: &str,
        odin: &OdinClient,
        cipher: &TargetCipher,
    ) -> Result<PurgeSummary, QueueError> {
        let jobs = self.list_jobs(project).await?;
        if jobs.is_empty() {
            return Err(QueueError::NoJobs(project.to_string()));
        }
        let mut summary = PurgeSummary::default();
        for job in &jobs {
            let Some(result_url) = job.result_url() else {
                continue;
            };
            let id: JobId = job.id.parse()?;
            let target = TargetPayload {
                scan_id: id.scan_id,
                freqmode: id.freqmode,
                project: odin_project.to_string(),
            }
            .encode(cipher)?;
            match odin.delete_level2_result(result_url, &target).await {
                Ok(()) => summary.deleted += 1,
                Err(CatalogError::Http(e)) if e.is_connect() => {
                    return Err(CatalogError::Http(e).into());
                }
                Err(e) => {
                    warn!(project, job = %job.id, error = %e, "Failed to delete level2 result");
                    summary.failed += 1;
                }
            }
        }
        info!(project, deleted = summary.deleted, failed = summary.failed, "Deleted level2 results");
        Ok(summary)
    }
}

/// Level2 projects that have a processing project of the same name, in
/// level2 order.
pub fn get_matching_projects(
    level2: &[Level2Project],
    processing: &[ProcessingProject],
) -> Vec<MatchedProject> {
    level2
        .iter()
        .filter_map(|l2| {
            processing
                .iter()
                .find(|p| p.name == l2.name)
                .map(|p| MatchedProject {
                    name: l2.name.clone(),
                    id: p.id.clone(),
                })
        })
        .collect()
}
