//! Concurrent release of failed (and optionally claimed) job claims.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use microq_core::JobStatus;

use crate::client::{ClaimDeleter, JobDirectory, JobEntry};
use crate::error::QueueError;

pub const DEFAULT_WORKERS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseSummary {
    /// Claim deletions handed to the workers, all of which ran.
    pub enqueued: usize,
}

/// Releases claims through a fixed number of worker tasks.
pub struct ClaimReleasePool {
    directory: Arc<dyn JobDirectory>,
    deleter: Arc<dyn ClaimDeleter>,
    /// `{JOB_API_ROOT}/{version}`
    api_base: String,
    workers: usize,
}

impl ClaimReleasePool {
    pub fn new(
        directory: Arc<dyn JobDirectory>,
        deleter: Arc<dyn ClaimDeleter>,
        api_base: &str,
    ) -> Self {
        Self {
            directory,
            deleter,
            api_base: api_base.trim_end_matches('/').to_string(),
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    fn claim_url(&self, project: &str, job_id: &str) -> String {
        format!("{}/{project}/jobs/{job_id}/claim", self.api_base)
    }

    /// Delete the claim of every FAILED job of `project`, and of every
    /// CLAIMED job too when `force` is set.
    ///
    /// Returns once every deletion has run. Individual deletion failures
    /// are only logged.
    pub async fn release_claims(&self, project: &str, force: bool) -> Result<ReleaseSummary, QueueError> {
        let jobs = self.directory.list_jobs(project).await?;
        if !self.directory.project_exists(project).await? {
            return Err(QueueError::NoProject(project.to_string()));
        }
        if jobs.is_empty() {
            return Err(QueueError::NoJobs(project.to_string()));
        }

        let urls: Vec<String> = jobs
            .iter()
            .filter(|job| is_releasable(job, force))
            .map(|job| self.claim_url(project, &job.id))
            .collect();
        info!(
            project,
            force,
            jobs = jobs.len(),
            releasing = urls.len(),
            workers = self.workers,
            "Releasing claims"
        );

        let (tx, rx) = mpsc::channel::<String>(self.workers);
        let rx = Arc::new(Mutex::new(rx));
        let handles: Vec<_> = (0..self.workers)
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let deleter = Arc::clone(&self.deleter);
                tokio::spawn(async move {
                    loop {
                        // Hold the lock only while waiting for the next url.
                        let next = rx.lock().await.recv().await;
                        let Some(url) = next else { break };
                        match deleter.delete_claim(&url).await {
                            Ok(status) => info!(worker, "DELETE-CLAIM {url} {status}"),
                            Err(e) => warn!(worker, error = %e, "DELETE-CLAIM {url} failed"),
                        }
                    }
                })
            })
            .collect();

        let enqueued = urls.len();
        for url in urls {
            if tx.send(url).await.is_err() {
                return Err(QueueError::Worker(
                    "all claim release workers stopped".to_string(),
                ));
            }
        }
        drop(tx);

        for result in join_all(handles).await {
            result.map_err(|e| QueueError::Worker(e.to_string()))?;
        }
        info!(project, enqueued, "Claim release finished");
        Ok(ReleaseSummary { enqueued })
    }
}

fn is_releasable(job: &JobEntry, force: bool) -> bool {
    match job.status {
        JobStatus::Failed => true,
        JobStatus::Claimed => force,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use microq_core::JobId;

    use crate::client::ProcessingProject;

    enum Listing {
        Jobs(Vec<(String, JobStatus)>),
        Unreachable,
        Status(&'static str),
    }

    struct MockDirectory {
        listing: Listing,
        exists: bool,
    }

    #[async_trait]
    impl JobDirectory for MockDirectory {
        async fn list_jobs(&self, _project: &str) -> Result<Vec<JobEntry>, QueueError> {
            match &self.listing {
                Listing::Jobs(jobs) => Ok(jobs
                    .iter()
                    .map(|(id, status)| JobEntry {
                        id: id.clone(),
                        status: status.clone(),
                        urls: None,
                    })
                    .collect()),
                Listing::Unreachable => Err(QueueError::Connection),
                Listing::Status(text) => Err(QueueError::Http(text.to_string())),
            }
        }

        async fn project_exists(&self, _project: &str) -> Result<bool, QueueError> {
            Ok(self.exists)
        }

        async fn claimed_job_ids(
            &self,
            _project: &str,
            _day: NaiveDate,
        ) -> Result<Vec<JobId>, QueueError> {
            Ok(Vec::new())
        }

        async fn list_projects(&self) -> Result<Vec<ProcessingProject>, QueueError> {
            Ok(Vec::new())
        }
    }

    #[derive(Clone)]
    struct MockDeleter {
        calls: Arc<AtomicUsize>,
        urls: Arc<std::sync::Mutex<Vec<String>>>,
        fail: bool,
    }

    impl MockDeleter {
        fn new(fail: bool) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                urls: Arc::new(std::sync::Mutex::new(Vec::new())),
                fail,
            }
        }
    }

    #[async_trait]
    impl ClaimDeleter for MockDeleter {
        async fn delete_claim(&self, url: &str) -> Result<u16, QueueError> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.urls.lock().unwrap().push(url.to_string());
            if self.fail {
                return Err(QueueError::Connection);
            }
            Ok(204)
        }
    }

    fn mixed_jobs() -> Listing {
        Listing::Jobs(vec![
            ("1:1".to_string(), JobStatus::Failed),
            ("1:2".to_string(), JobStatus::Claimed),
            ("1:3".to_string(), JobStatus::Available),
            ("1:4".to_string(), JobStatus::Failed),
        ])
    }

    fn pool(listing: Listing, exists: bool, deleter: &MockDeleter) -> ClaimReleasePool {
        ClaimReleasePool::new(
            Arc::new(MockDirectory { listing, exists }),
            Arc::new(deleter.clone()),
            "http://mq/rest_api/v4/",
        )
    }

    #[tokio::test]
    async fn test_releases_failed_only() {
        let deleter = MockDeleter::new(false);
        let summary = pool(mixed_jobs(), true, &deleter)
            .release_claims("proj", false)
            .await
            .unwrap();
        assert_eq!(summary.enqueued, 2);
        assert_eq!(deleter.calls.load(Ordering::SeqCst), 2);

        let urls: HashSet<String> = deleter.urls.lock().unwrap().iter().cloned().collect();
        assert_eq!(
            urls,
            HashSet::from([
                "http://mq/rest_api/v4/proj/jobs/1:1/claim".to_string(),
                "http://mq/rest_api/v4/proj/jobs/1:4/claim".to_string(),
            ])
        );
    }

    #[tokio::test]
    async fn test_force_releases_claimed() {
        let deleter = MockDeleter::new(false);
        let summary = pool(mixed_jobs(), true, &deleter)
            .release_claims("proj", true)
            .await
            .unwrap();
        assert_eq!(summary.enqueued, 3);
        assert_eq!(deleter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_drains_more_urls_than_workers() {
        let jobs = (0..57)
            .map(|i| (format!("1:{i}"), JobStatus::Failed))
            .collect();
        let deleter = MockDeleter::new(false);
        let summary = pool(Listing::Jobs(jobs), true, &deleter)
            .with_workers(4)
            .release_claims("proj", false)
            .await
            .unwrap();
        assert_eq!(summary.enqueued, 57);
        assert_eq!(deleter.calls.load(Ordering::SeqCst), 57);

        let unique: HashSet<String> = deleter.urls.lock().unwrap().iter().cloned().collect();
        assert_eq!(unique.len(), 57);
    }

    #[tokio::test]
    async fn test_failed_deletions_do_not_abort() {
        let deleter = MockDeleter::new(true);
        let summary = pool(mixed_jobs(), true, &deleter)
            .release_claims("proj", true)
            .await
            .unwrap();
        assert_eq!(summary.enqueued, 3);
        assert_eq!(deleter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_precondition_order() {
        let deleter = MockDeleter::new(false);

        let err = pool(Listing::Unreachable, false, &deleter)
            .release_claims("proj", false)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Connection));

        let err = pool(Listing::Status("404 Not Found"), false, &deleter)
            .release_claims("proj", false)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "404 Not Found");

        let err = pool(Listing::Jobs(vec![]), false, &deleter)
            .release_claims("proj", false)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No project called proj");

        let err = pool(Listing::Jobs(vec![]), true, &deleter)
            .release_claims("proj", false)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Project proj has no jobs");

        assert_eq!(deleter.calls.load(Ordering::SeqCst), 0);
    }
}
