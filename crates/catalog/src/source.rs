//! Lazy scan id streams.
//!
//! Every stream is ordered and performs no I/O until first polled.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tracing::{debug, info};

use microq_core::{FreqMode, ScanId};

use crate::backend::backend_for;
use crate::client::{Catalog, DayEntry};
use crate::error::CatalogError;

pub type ScanIdStream = BoxStream<'static, Result<ScanId, CatalogError>>;

/// Days requested per `period_info` page.
pub const DEFAULT_WINDOW_DAYS: u32 = 365;

/// First day with Odin scans.
pub const FIRST_DAY: (i32, u32, u32) = (2001, 8, 4);

pub fn first_day() -> NaiveDate {
    let (y, m, d) = FIRST_DAY;
    NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default()
}

/// Produces scan id streams backed by a [`Catalog`].
pub struct ScanIdSource<C> {
    catalog: Arc<C>,
    window_days: u32,
}

impl<C: Catalog + 'static> ScanIdSource<C> {
    pub fn new(catalog: Arc<C>) -> Self {
        Self {
            catalog,
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }

    pub fn with_window_days(mut self, window_days: u32) -> Self {
        self.window_days = window_days.max(1);
        self
    }

    /// One scan id per non-blank line of `path`, in file order.
    ///
    /// A malformed line ends the stream with [`CatalogError::Parse`].
    pub fn from_file(path: impl Into<PathBuf>) -> ScanIdStream {
        stream::try_unfold(FileState::Unopened(path.into()), next_from_file).boxed()
    }

    /// All scans of the vds dataset for `freqmode`, in server order.
    ///
    /// Fails up front with [`CatalogError::UnknownFreqMode`] when the
    /// freqmode has no backend.
    pub fn fixed_dataset(&self, freqmode: FreqMode) -> Result<ScanIdStream, CatalogError> {
        let backend = backend_for(freqmode).ok_or(CatalogError::UnknownFreqMode(freqmode))?;
        let catalog = Arc::clone(&self.catalog);
        Ok(
            stream::once(async move { catalog.vds_scan_ids(backend, freqmode).await })
                .map_ok(|ids| stream::iter(ids.into_iter().map(Ok::<_, CatalogError>)))
                .try_flatten()
                .boxed(),
        )
    }

    /// All scans of `freqmode` on days in `[start_day, end_day)`.
    ///
    /// `start_day` defaults to [`FIRST_DAY`]. `end_day` defaults to, and is
    /// clamped to, the catalog's latest ecmf day.
    pub fn date_range(
        &self,
        freqmode: FreqMode,
        start_day: Option<NaiveDate>,
        end_day: Option<NaiveDate>,
    ) -> ScanIdStream {
        let start_day = start_day.unwrap_or_else(first_day);
        let walk = DateRangeWalk {
            catalog: Arc::clone(&self.catalog),
            freqmode,
            window_days: self.window_days,
            start_day,
            requested_end: end_day,
            end_day: None,
            window_start: start_day,
            days: VecDeque::new(),
            scans: VecDeque::new(),
        };

        stream::try_unfold(walk, |mut walk| async move {
            walk.next_scan()
                .await
                .map(|next| next.map(|scan_id| (scan_id, walk)))
        })
        .boxed()
    }
}

enum FileState {
    Unopened(PathBuf),
    Reading {
        path: PathBuf,
        lines: Lines<BufReader<File>>,
        line_no: usize,
    },
}

async fn next_from_file(state: FileState) -> Result<Option<(ScanId, FileState)>, CatalogError> {
    let (path, mut lines, mut line_no) = match state {
        FileState::Unopened(path) => {
            let file = File::open(&path).await.map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            (path, BufReader::new(file).lines(), 0)
        }
        FileState::Reading {
            path,
            lines,
            line_no,
        } => (path, lines, line_no),
    };

    loop {
        let line = lines.next_line().await.map_err(|source| CatalogError::Io {
            path: path.clone(),
            source,
        })?;
        let Some(line) = line else {
            return Ok(None);
        };
        line_no += 1;

        let value = line.trim();
        if value.is_empty() {
            continue;
        }
        let scan_id = value.parse::<ScanId>().map_err(|_| CatalogError::Parse {
            line: line_no,
            value: value.to_string(),
        })?;
        return Ok(Some((
            scan_id,
            FileState::Reading {
                path,
                lines,
                line_no,
            },
        )));
    }
}

/// Pagination state of [`ScanIdSource::date_range`].
struct DateRangeWalk<C> {
    catalog: Arc<C>,
    freqmode: FreqMode,
    window_days: u32,
    start_day: NaiveDate,
    requested_end: Option<NaiveDate>,
    /// Resolved against the catalog on first poll.
    end_day: Option<NaiveDate>,
    window_start: NaiveDate,
    days: VecDeque<DayEntry>,
    scans: VecDeque<ScanId>,
}

impl<C: Catalog> DateRangeWalk<C> {
    async fn next_scan(&mut self) -> Result<Option<ScanId>, CatalogError> {
        loop {
            if let Some(scan_id) = self.scans.pop_front() {
                return Ok(Some(scan_id));
            }

            if let Some(day) = self.days.pop_front() {
                debug!(date = %day.date, url = %day.url, "Fetching day log");
                self.scans = self.catalog.log_scan_ids(&day.url).await?.into();
                continue;
            }

            let end_day = self.resolve_end_day().await?;
            if self.window_start >= end_day {
                return Ok(None);
            }
            self.fetch_window(end_day).await?;
        }
    }

    async fn resolve_end_day(&mut self) -> Result<NaiveDate, CatalogError> {
        if let Some(end_day) = self.end_day {
            return Ok(end_day);
        }
        let latest = self.catalog.latest_ecmf_day().await?;
        let end_day = self.requested_end.map_or(latest, |end| end.min(latest));
        info!(
            freqmode = self.freqmode,
            start = %self.start_day,
            end = %end_day,
            "Generating scan ids for date range"
        );
        self.end_day = Some(end_day);
        Ok(end_day)
    }

    async fn fetch_window(&mut self, end_day: NaiveDate) -> Result<(), CatalogError> {
        let page = self
            .catalog
            .period_info(self.window_start, self.window_days)
            .await?;

        let mut days: Vec<DayEntry> = page
            .days
            .into_iter()
            .filter(|day| {
                day.freqmode == self.freqmode && day.date >= self.start_day && day.date < end_day
            })
            .collect();
        days.sort_by(|a, b| (a.date, &a.url).cmp(&(b.date, &b.url)));

        let next_start = page
            .period_end
            .succ_opt()
            .ok_or_else(|| CatalogError::Protocol(format!("period end {} out of range", page.period_end)))?;
        if next_start <= self.window_start {
            return Err(CatalogError::Protocol(format!(
                "period_info from {} ended at {}, window does not advance",
                self.window_start, page.period_end
            )));
        }

        debug!(
            window_start = %self.window_start,
            period_end = %page.period_end,
            days = days.len(),
            "Fetched period window"
        );
        self.window_start = next_start;
        self.days = days.into();
        Ok(())
    }
}
