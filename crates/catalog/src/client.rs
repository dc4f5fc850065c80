//! Odin catalog trait and its HTTP implementation.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use tracing::debug;

use microq_core::http::{ensure_success, get_json, HttpError};
use microq_core::{FreqMode, ScanId};

use crate::backend::Backend;
use crate::error::CatalogError;

/// One day listed by `period_info`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DayEntry {
    #[serde(rename = "Date")]
    pub date: NaiveDate,
    /// Log url listing the day's scans.
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "NumScan", default)]
    pub num_scans: u64,
    #[serde(rename = "FreqMode")]
    pub freqmode: FreqMode,
}

/// One page of `period_info`.
#[derive(Debug, Clone, Deserialize)]
pub struct PeriodInfo {
    #[serde(rename = "Data")]
    pub days: Vec<DayEntry>,
    /// Last day covered by this page (inclusive).
    #[serde(rename = "PeriodEnd")]
    pub period_end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Level2Project {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Deserialize)]
struct ScanRow {
    #[serde(rename = "ScanID")]
    scan_id: ScanId,
}

#[derive(Deserialize)]
struct DataList<T> {
    #[serde(rename = "Data")]
    data: Vec<T>,
}

#[derive(Deserialize)]
struct VdsRow {
    #[serde(rename = "Info")]
    info: ScanRow,
}

#[derive(Deserialize)]
struct VdsList {
    #[serde(rename = "VDS")]
    vds: Vec<VdsRow>,
}

#[derive(Deserialize)]
struct LatestEcmf {
    #[serde(rename = "Date")]
    date: NaiveDate,
}

/// The catalog endpoints scan ids are generated from.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// All scans of the fixed vds dataset, in server order.
    async fn vds_scan_ids(
        &self,
        backend: Backend,
        freqmode: FreqMode,
    ) -> Result<Vec<ScanId>, CatalogError>;

    /// Days with scans starting at `start`, covering up to `length_days`.
    ///
    /// Any non-success status is a [`CatalogError::Protocol`].
    async fn period_info(
        &self,
        start: NaiveDate,
        length_days: u32,
    ) -> Result<PeriodInfo, CatalogError>;

    /// Scan ids listed in a day log returned by [`Catalog::period_info`].
    async fn log_scan_ids(&self, url: &str) -> Result<Vec<ScanId>, CatalogError>;

    /// Latest day with ecmf data available (exclusive upper bound for scans).
    async fn latest_ecmf_day(&self) -> Result<NaiveDate, CatalogError>;

    /// Level1 scans of `freqmode` observed on `day`.
    async fn level1_scan_ids(
        &self,
        freqmode: FreqMode,
        day: NaiveDate,
    ) -> Result<Vec<ScanId>, CatalogError>;

    async fn level2_projects(&self) -> Result<Vec<Level2Project>, CatalogError>;
}

/// HTTP client for the Odin REST API.
#[derive(Debug, Clone)]
pub struct OdinClient {
    base_url: String,
    http: reqwest::Client,
    result_credentials: Option<(String, String)>,
}

impl OdinClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    pub fn with_client(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
            result_credentials: None,
        }
    }

    /// Credentials sent when deleting level2 results.
    pub fn with_result_credentials(mut self, user: &str, password: &str) -> Self {
        self.result_credentials = Some((user.to_string(), password.to_string()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Delete the level2 results addressed by an encrypted target parameter.
    ///
    /// `result_url` is a job's view-result url; everything from
    /// `/development` on is replaced by the `d` query parameter.
    pub async fn delete_level2_result(
        &self,
        result_url: &str,
        target: &str,
    ) -> Result<(), CatalogError> {
        let base = result_url
            .split("/development")
            .next()
            .unwrap_or(result_url);
        let url = format!("{base}?d={target}");
        let mut request = self.http.delete(&url);
        if let Some((user, password)) = &self.result_credentials {
            request = request.basic_auth(user, Some(password));
        }
        let response = request.send().await.map_err(HttpError::from)?;
        ensure_success(response)?;
        debug!(url = %base, "Deleted level2 result");
        Ok(())
    }
}

fn day_param(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl Catalog for OdinClient {
    async fn vds_scan_ids(
        &self,
        backend: Backend,
        freqmode: FreqMode,
    ) -> Result<Vec<ScanId>, CatalogError> {
        let url = format!("{}/v4/vds/{backend}/{freqmode}/allscans", self.base_url);
        let list: VdsList = get_json(&self.http, &url, &[]).await?;
        Ok(list.vds.into_iter().map(|row| row.info.scan_id).collect())
    }

    async fn period_info(
        &self,
        start: NaiveDate,
        length_days: u32,
    ) -> Result<PeriodInfo, CatalogError> {
        let url = format!(
            "{}/v5/period_info/{}/",
            self.base_url,
            start.format("%Y/%m/%d")
        );
        debug!(%start, length_days, "Requesting period info");
        get_json(&self.http, &url, &[("length", length_days.to_string())])
            .await
            .map_err(|e| match e {
                HttpError::Status { url, status, .. } => {
                    CatalogError::Protocol(format!("{url} returned status {status}"))
                }
                other => other.into(),
            })
    }

    async fn log_scan_ids(&self, url: &str) -> Result<Vec<ScanId>, CatalogError> {
        let list: DataList<ScanRow> = get_json(&self.http, url, &[]).await?;
        Ok(list.data.into_iter().map(|row| row.scan_id).collect())
    }

    async fn latest_ecmf_day(&self) -> Result<NaiveDate, CatalogError> {
        let url = format!("{}/v5/config_data/latest_ecmf_file", self.base_url);
        let latest: LatestEcmf = get_json(&self.http, &url, &[]).await?;
        Ok(latest.date)
    }

    async fn level1_scan_ids(
        &self,
        freqmode: FreqMode,
        day: NaiveDate,
    ) -> Result<Vec<ScanId>, CatalogError> {
        let url = format!("{}/v5/level1/{freqmode}/scans", self.base_url);
        let query = [
            ("start_time", day_param(day)),
            ("end_time", day_param(day + Duration::days(1))),
        ];
        let list: DataList<ScanRow> = get_json(&self.http, &url, &query).await?;
        Ok(list.data.into_iter().map(|row| row.scan_id).collect())
    }

    async fn level2_projects(&self) -> Result<Vec<Level2Project>, CatalogError> {
        let url = format!("{}/v5/level2/projects", self.base_url);
        let list: DataList<Level2Project> = get_json(&self.http, &url, &[]).await?;
        Ok(list.data)
    }
}
