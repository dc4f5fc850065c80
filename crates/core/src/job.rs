//! Job records posted to the job service, and the ids they are keyed by.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

use crate::cipher::TargetCipher;
use crate::error::CoreError;

/// Identifier of one observation scan in the catalog.
pub type ScanId = u64;

/// Acquisition mode tag; routes scans to a backend and namespaces job ids.
pub type FreqMode = u32;

/// Job type understood by the qsmr workers.
pub const QSMR_JOB_TYPE: &str = "qsmr";

/// `"<freqmode>:<scanid>"`, the wire identifier of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId {
    pub freqmode: FreqMode,
    pub scan_id: ScanId,
}

impl JobId {
    pub fn new(freqmode: FreqMode, scan_id: ScanId) -> Self {
        Self { freqmode, scan_id }
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.freqmode, self.scan_id)
    }
}

impl FromStr for JobId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidJobId(s.to_string());
        let (freqmode, scan_id) = s.split_once(':').ok_or_else(invalid)?;
        Ok(Self {
            freqmode: freqmode.trim().parse().map_err(|_| invalid())?,
            scan_id: scan_id.trim().parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Job status as reported by the job service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum JobStatus {
    Available,
    Claimed,
    Failed,
    Done,
    Other(String),
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "AVAILABLE" => Self::Available,
            "CLAIMED" => Self::Claimed,
            "FAILED" => Self::Failed,
            "DONE" | "FINISHED" => Self::Done,
            _ => Self::Other(s),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => f.write_str("AVAILABLE"),
            Self::Claimed => f.write_str("CLAIMED"),
            Self::Failed => f.write_str("FAILED"),
            Self::Done => f.write_str("DONE"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// One unit of work as posted to `/v4/{project}/jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub id: JobId,
    #[serde(rename = "type")]
    pub job_type: String,
    pub source_url: String,
    pub target_url: String,
    pub view_result_url: String,
}

/// Payload encrypted into the `d` parameter of a job's target url.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPayload {
    #[serde(rename = "ScanID")]
    pub scan_id: ScanId,
    #[serde(rename = "FreqMode")]
    pub freqmode: FreqMode,
    #[serde(rename = "Project")]
    pub project: String,
}

impl TargetPayload {
    pub fn encode(&self, cipher: &TargetCipher) -> Result<String, CoreError> {
        cipher.encrypt(&serde_json::to_string(self)?)
    }

    pub fn decode(token: &str, cipher: &TargetCipher) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(&cipher.decrypt(token)?)?)
    }
}

/// Builds qsmr [`Job`]s for one upstream project.
#[derive(Debug, Clone)]
pub struct JobFactory {
    odin_api_root: String,
    odin_project: String,
    cipher: TargetCipher,
}

impl JobFactory {
    pub fn new(odin_api_root: &str, odin_project: &str, cipher: TargetCipher) -> Self {
        Self {
            odin_api_root: odin_api_root.trim_end_matches('/').to_string(),
            odin_project: odin_project.to_string(),
            cipher,
        }
    }

    pub fn odin_project(&self) -> &str {
        &self.odin_project
    }

    pub fn make_job(&self, scan_id: ScanId, freqmode: FreqMode) -> Result<Job, CoreError> {
        let root = &self.odin_api_root;
        let target = TargetPayload {
            scan_id,
            freqmode,
            project: self.odin_project.clone(),
        }
        .encode(&self.cipher)?;

        Ok(Job {
            id: JobId::new(freqmode, scan_id),
            job_type: QSMR_JOB_TYPE.to_string(),
            source_url: format!("{root}/v4/l1_log/{freqmode}/{scan_id}/"),
            target_url: format!("{root}/v5/level2?d={target}"),
            view_result_url: format!(
                "{root}/v5/level2/development/{}/{freqmode}/{scan_id}",
                self.odin_project
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "rc/lY+OQYq6mvI6tCfr+tQ==";

    fn factory() -> JobFactory {
        JobFactory::new(
            "http://odin.test/rest_api",
            "odinproject",
            TargetCipher::from_secret(SECRET).unwrap(),
        )
    }

    #[test]
    fn test_job_id_display_and_parse() {
        let id = JobId::new(1, 7014769645);
        assert_eq!(id.to_string(), "1:7014769645");
        assert_eq!("1:7014769645".parse::<JobId>().unwrap(), id);
    }

    #[test]
    fn test_job_id_rejects_malformed() {
        for bad in ["", "1", "1:", ":2", "a:2", "1:b", "1;2"] {
            assert!(bad.parse::<JobId>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_job_status_from_wire() {
        let statuses: Vec<JobStatus> =
            serde_json::from_str(r#"["FAILED","claimed","AVAILABLE","WEIRD"]"#).unwrap();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Failed,
                JobStatus::Claimed,
                JobStatus::Available,
                JobStatus::Other("WEIRD".into())
            ]
        );
    }

    #[test]
    fn test_make_job_urls() {
        let job = factory().make_job(42, 13).unwrap();
        assert_eq!(job.id.to_string(), "13:42");
        assert_eq!(job.job_type, "qsmr");
        assert_eq!(job.source_url, "http://odin.test/rest_api/v4/l1_log/13/42/");
        assert!(job
            .target_url
            .starts_with("http://odin.test/rest_api/v5/level2?d="));
        assert_eq!(
            job.view_result_url,
            "http://odin.test/rest_api/v5/level2/development/odinproject/13/42"
        );
    }

    #[test]
    fn test_target_parameter_decodes_to_payload() {
        let job = factory().make_job(42, 13).unwrap();
        let (_, d) = job.target_url.split_once("?d=").unwrap();
        let cipher = TargetCipher::from_secret(SECRET).unwrap();
        let payload = TargetPayload::decode(d, &cipher).unwrap();
        assert_eq!(
            payload,
            TargetPayload {
                scan_id: 42,
                freqmode: 13,
                project: "odinproject".into()
            }
        );
    }

    #[test]
    fn test_job_wire_shape() {
        let job = factory().make_job(3, 1).unwrap();
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["id"], "1:3");
        assert_eq!(value["type"], "qsmr");
        assert!(value.get("job_type").is_none());
        assert!(value["source_url"].is_string());
        assert!(value["target_url"].is_string());
        assert!(value["view_result_url"].is_string());
    }
}
