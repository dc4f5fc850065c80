//! Chunked, resumable job submission.
//!
//! A run authenticates, turns every scan id past `skip` into a [`Job`], and
//! posts the jobs in fixed-size batches, strictly in order. A 401 renews the
//! token once and retries that batch once. A transport failure stops the run
//! and reports the `skip` to resume from.

use std::collections::BTreeMap;
use std::fmt;

use futures::TryStreamExt;
use serde::Serialize;
use tracing::{error, info, warn};

use microq_catalog::ScanIdStream;
use microq_core::{FreqMode, Job, JobFactory, ScanId};

use crate::client::{JobSink, TokenEndpoint};
use crate::error::{QueueError, SubmitError};
use crate::token::AuthTokenProvider;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

const UNAUTHORIZED: u16 = 401;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPhase {
    Init,
    Authenticated,
    Posting,
    Renewing,
    Done,
    Failed,
}

impl fmt::Display for SubmitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Authenticated => "authenticated",
            Self::Posting => "posting",
            Self::Renewing => "renewing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a submission run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmitReport {
    /// Scan ids consumed from the source, skipped ones included.
    pub processed: usize,
    pub skipped: usize,
    /// Batches that got a response.
    pub batches: usize,
    /// HTTP status -> number of batches.
    pub status_counts: BTreeMap<u16, usize>,
    /// HTTP status -> batch indices.
    pub status_batches: BTreeMap<u16, Vec<usize>>,
}

impl SubmitReport {
    fn record(&mut self, batch: usize, status: u16) {
        self.batches += 1;
        *self.status_counts.entry(status).or_default() += 1;
        self.status_batches.entry(status).or_default().push(batch);
    }

    /// Whether every posted batch got a 2xx.
    pub fn all_succeeded(&self) -> bool {
        self.status_counts.keys().all(|s| (200..300).contains(s))
    }
}

impl fmt::Display for SubmitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Processed {} scans ({} skipped) in {} batches",
            self.processed, self.skipped, self.batches
        )?;
        for (status, count) in &self.status_counts {
            writeln!(f, "  status {status}: {count} batches")?;
        }
        Ok(())
    }
}

/// Posts jobs for one processing project.
pub struct JobBatchSubmitter<E, S> {
    tokens: AuthTokenProvider<E>,
    sink: S,
    factory: JobFactory,
    project: String,
    batch_size: usize,
    phase: SubmitPhase,
}

impl<E: TokenEndpoint, S: JobSink> JobBatchSubmitter<E, S> {
    pub fn new(tokens: AuthTokenProvider<E>, sink: S, factory: JobFactory, project: &str) -> Self {
        Self {
            tokens,
            sink,
            factory,
            project: project.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            phase: SubmitPhase::Init,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn phase(&self) -> SubmitPhase {
        self.phase
    }

    fn enter(&mut self, phase: SubmitPhase) {
        self.phase = phase;
        tracing::debug!(project = %self.project, %phase, "Submitter phase");
    }

    /// Submit every scan of `scan_ids` after the first `skip` as a job of
    /// `freqmode`.
    pub async fn submit(
        &mut self,
        scan_ids: ScanIdStream,
        freqmode: FreqMode,
        skip: usize,
    ) -> Result<SubmitReport, SubmitError> {
        self.enter(SubmitPhase::Init);
        let mut token = match self.tokens.get_token().await {
            Ok(token) => token,
            Err(e) => {
                self.enter(SubmitPhase::Failed);
                return Err(SubmitError::Auth(e));
            }
        };
        self.enter(SubmitPhase::Authenticated);

        if skip > 0 {
            warn!(
                skip,
                "Skipping scans by position; assumes the source order is unchanged since the last run"
            );
        }

        let scans: Vec<ScanId> = match scan_ids.try_collect().await {
            Ok(scans) => scans,
            Err(e) => {
                self.enter(SubmitPhase::Failed);
                return Err(SubmitError::Source(e));
            }
        };
        let jobs = match self.make_jobs(&scans, freqmode, skip) {
            Ok(jobs) => jobs,
            Err(e) => {
                self.enter(SubmitPhase::Failed);
                return Err(e);
            }
        };

        let mut report = SubmitReport {
            processed: scans.len(),
            skipped: skip.min(scans.len()),
            ..Default::default()
        };
        let total_batches = jobs.len().div_ceil(self.batch_size);
        info!(
            project = %self.project,
            freqmode,
            jobs = jobs.len(),
            batches = total_batches,
            "Submitting jobs"
        );

        for (batch, chunk) in jobs.chunks(self.batch_size).enumerate() {
            match self.post_batch(chunk, &mut token).await {
                Ok(status) => {
                    report.record(batch, status);
                    info!(
                        project = %self.project,
                        batch,
                        of = total_batches,
                        status,
                        submitted = skip + (batch * self.batch_size) + chunk.len(),
                        "Posted batch"
                    );
                }
                Err(source) => {
                    self.enter(SubmitPhase::Failed);
                    let resume_skip = skip + batch * self.batch_size;
                    error!(
                        project = %self.project,
                        batch,
                        error = %source,
                        "Job submission aborted, resume with skip={resume_skip}"
                    );
                    return Err(SubmitError::Aborted {
                        completed_batches: batch,
                        resume_skip,
                        report: Box::new(report),
                        source,
                    });
                }
            }
        }

        self.enter(SubmitPhase::Done);
        info!(
            project = %self.project,
            processed = report.processed,
            batches = report.batches,
            statuses = ?report.status_counts,
            "Job submission finished"
        );
        Ok(report)
    }

    fn make_jobs(&self, scans: &[ScanId], freqmode: FreqMode, skip: usize) -> Result<Vec<Job>, SubmitError> {
        scans
            .iter()
            .skip(skip)
            .map(|&scan_id| self.factory.make_job(scan_id, freqmode))
            .collect::<Result<_, _>>()
            .map_err(SubmitError::Job)
    }

    /// Post one batch, renewing the token at most once.
    async fn post_batch(&mut self, jobs: &[Job], token: &mut String) -> Result<u16, QueueError> {
        self.enter(SubmitPhase::Posting);
        let status = self.sink.post_jobs(&self.project, token, jobs).await?;
        if status != UNAUTHORIZED {
            return Ok(status);
        }

        self.enter(SubmitPhase::Renewing);
        warn!(project = %self.project, "Token rejected, renewing");
        self.tokens.invalidate();
        *token = self.tokens.get_token().await?;

        self.enter(SubmitPhase::Posting);
        self.sink.post_jobs(&self.project, token, jobs).await
    }
}
