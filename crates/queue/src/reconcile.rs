//! Scans available in the catalog but not yet claimed at the job service.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, info};

use microq_catalog::Catalog;
use microq_core::{FreqMode, ScanId};

use crate::client::JobDirectory;
use crate::error::QueueError;

pub struct UnprocessedScanReconciler<C> {
    catalog: Arc<C>,
    directory: Arc<dyn JobDirectory>,
}

impl<C: Catalog> UnprocessedScanReconciler<C> {
    pub fn new(catalog: Arc<C>, directory: Arc<dyn JobDirectory>) -> Self {
        Self { catalog, directory }
    }

    /// Scans of `[date_start, date_end)` not claimed by `project`.
    ///
    /// The freqmode is taken from the first claimed job; a project without
    /// claimed jobs yields `(None, [])`. The returned ids are in no
    /// particular order.
    pub async fn reconcile(
        &self,
        project: &str,
        date_start: NaiveDate,
        date_end: NaiveDate,
    ) -> Result<(Option<FreqMode>, Vec<ScanId>), QueueError> {
        let mut claimed = Vec::new();
        for day in days(date_start, date_end) {
            let ids = self.directory.claimed_job_ids(project, day).await?;
            debug!(project, %day, claimed = ids.len(), "Fetched claimed jobs");
            claimed.extend(ids);
        }

        let Some(first) = claimed.first() else {
            info!(project, "No claimed jobs, nothing to reconcile");
            return Ok((None, Vec::new()));
        };
        let freqmode = first.freqmode;
        let claimed: BTreeSet<ScanId> = claimed.iter().map(|id| id.scan_id).collect();

        let mut available = BTreeSet::new();
        for day in days(date_start, date_end) {
            let ids = self.catalog.level1_scan_ids(freqmode, day).await?;
            debug!(freqmode, %day, available = ids.len(), "Fetched level1 scans");
            available.extend(ids);
        }

        let unprocessed: Vec<ScanId> = available.difference(&claimed).copied().collect();
        info!(
            project,
            freqmode,
            claimed = claimed.len(),
            available = available.len(),
            unprocessed = unprocessed.len(),
            "Reconciled scans"
        );
        Ok((Some(freqmode), unprocessed))
    }
}

fn days(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day < end)
}
