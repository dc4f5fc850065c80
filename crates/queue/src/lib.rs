//! Client side orchestration of the MicroQ job service.
//!
//! - [`JobBatchSubmitter`]: posts scan jobs in batches, renewing the token
//!   on rejection and reporting a resume offset on failure
//! - [`ClaimReleasePool`]: releases failed or stuck claims concurrently
//! - [`UnprocessedScanReconciler`]: finds catalog scans a project has not
//!   claimed yet
//! - [`JobServiceClient`]: reqwest implementation of the job service traits

pub mod client;
pub mod error;
pub mod projects;
pub mod reconcile;
pub mod release;
pub mod submit;
pub mod token;

pub use client::{
    ClaimDeleter, JobDirectory, JobEntry, JobServiceClient, JobSink, ProcessingProject,
    TokenEndpoint,
};
pub use error::{QueueError, SubmitError, CONNECT_ERROR_MESSAGE};
pub use projects::{get_matching_projects, MatchedProject, ProjectSpec, PurgeSummary};
pub use reconcile::UnprocessedScanReconciler;
pub use release::{ClaimReleasePool, ReleaseSummary, DEFAULT_WORKERS};
pub use submit::{JobBatchSubmitter, SubmitPhase, SubmitReport, DEFAULT_BATCH_SIZE};
pub use token::AuthTokenProvider;
