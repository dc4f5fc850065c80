//! Queue error types.

use microq_catalog::CatalogError;
use microq_core::http::HttpError;
use microq_core::CoreError;
use thiserror::Error;

use crate::submit::SubmitReport;

pub const CONNECT_ERROR_MESSAGE: &str = "Could not connect to MicroQ service, validate that the url is correct and that you have internet connection.";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("{}", CONNECT_ERROR_MESSAGE)]
    Connection,

    /// Non-success status, carrying the HTTP error text.
    #[error("{0}")]
    Http(String),

    #[error("Failed to get token from job service: {0}")]
    Auth(String),

    #[error("No project called {0}")]
    NoProject(String),

    #[error("Project {0} has no jobs")]
    NoJobs(String),

    #[error(transparent)]
    Transport(HttpError),

    #[error("Claim release worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<HttpError> for QueueError {
    fn from(err: HttpError) -> Self {
        if err.is_connect() {
            return Self::Connection;
        }
        match err {
            HttpError::Status { message, .. } => Self::Http(message),
            other => Self::Transport(other),
        }
    }
}

impl From<reqwest::Error> for QueueError {
    fn from(err: reqwest::Error) -> Self {
        HttpError::from(err).into()
    }
}

/// Failure of a [`JobBatchSubmitter`](crate::JobBatchSubmitter) run.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// No token could be obtained; nothing was posted.
    #[error("Could not authenticate with job service: {0}")]
    Auth(#[source] QueueError),

    /// The scan id source failed; nothing was posted.
    #[error("Failed to generate scan ids: {0}")]
    Source(#[source] CatalogError),

    #[error("Failed to build jobs: {0}")]
    Job(#[source] CoreError),

    /// Posting stopped part way. Rerun with `skip = resume_skip`.
    #[error(
        "Job submission aborted after {completed_batches} completed batches \
         (resume with skip={resume_skip}): {source}"
    )]
    Aborted {
        completed_batches: usize,
        resume_skip: usize,
        report: Box<SubmitReport>,
        #[source]
        source: QueueError,
    },
}

impl SubmitError {
    pub fn resume_skip(&self) -> Option<usize> {
        match self {
            Self::Aborted { resume_skip, .. } => Some(*resume_skip),
            _ => None,
        }
    }
}
