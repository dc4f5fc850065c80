use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::CoreError;

/// Config file read when no path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "/odin.cfg";

pub const DEFAULT_JOB_API_VERSION: &str = "v4";

const REQUIRED_KEYS: &[&str] = &[
    "ODIN_API_ROOT",
    "ODIN_SECRET",
    "JOB_API_ROOT",
    "JOB_API_USERNAME",
    "JOB_API_PASSWORD",
];

const OPTIONAL_KEYS: &[&str] = &["JOB_API_VERSION"];

const URL_KEYS: &[&str] = &["ODIN_API_ROOT", "JOB_API_ROOT"];

pub const CONFIG_FILE_DOCS: &str = "The configuration file should contain these settings:
ODIN_API_ROOT=https://example.com/odin_api
ODIN_SECRET=<secret encryption key>
JOB_API_ROOT=https://example.com/job_api
JOB_API_USERNAME=<username>
JOB_API_PASSWORD=<password>

It may contain:
JOB_API_VERSION=v4";

/// Raw `KEY=VALUE` settings before validation.
pub type Settings = BTreeMap<String, String>;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub odin_api_root: String,
    #[serde(skip_serializing)]
    pub odin_secret: String,
    pub job_api_root: String,
    pub job_api_username: String,
    #[serde(skip_serializing)]
    pub job_api_password: String,
    pub job_api_version: String,
}

impl Config {
    /// Load and validate the config file at `path` (or [`DEFAULT_CONFIG_PATH`]).
    ///
    /// When the file does not exist, settings are taken from the process
    /// environment instead (call [`load_dotenv`] first to pick up `.env`).
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        if path.exists() {
            debug!(?path, "Loading config file");
            let settings = read_settings(&path)?;
            Self::from_settings(&settings)
        } else {
            debug!(?path, "Config file not found, reading settings from environment");
            Self::from_env()
        }
    }

    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, CoreError> {
        let settings: Settings = REQUIRED_KEYS
            .iter()
            .chain(OPTIONAL_KEYS)
            .filter_map(|key| env_opt(key).map(|v| (key.to_string(), v)))
            .collect();
        Self::from_settings(&settings)
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, CoreError> {
        validate_settings(settings)?;
        let get = |key: &str| settings.get(key).cloned().unwrap_or_default();
        Ok(Self {
            odin_api_root: get("ODIN_API_ROOT"),
            odin_secret: get("ODIN_SECRET"),
            job_api_root: get("JOB_API_ROOT"),
            job_api_username: get("JOB_API_USERNAME"),
            job_api_password: get("JOB_API_PASSWORD"),
            job_api_version: settings
                .get("JOB_API_VERSION")
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| DEFAULT_JOB_API_VERSION.to_string()),
        })
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  odin api:    {}", self.odin_api_root);
        tracing::info!(
            "  job api:     {} (version {}, user {})",
            self.job_api_root,
            self.job_api_version,
            self.job_api_username
        );
    }
}

/// Read `KEY=VALUE` rows without touching the process environment.
/// Surrounding quotes are stripped from values.
pub fn read_settings(path: &Path) -> Result<Settings, CoreError> {
    let rows = dotenvy::from_path_iter(path).map_err(|e| {
        CoreError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let mut settings = Settings::new();
    for row in rows {
        let (key, value) = row.map_err(|e| {
            CoreError::Config(format!("failed to parse {}: {e}", path.display()))
        })?;
        settings.insert(key, value);
    }
    Ok(settings)
}

/// Check presence, URL shape and unknown keys.
///
/// Missing values are reported on their own; URL and unknown-key problems
/// are collected together.
pub fn validate_settings(settings: &Settings) -> Result<(), CoreError> {
    let missing: Vec<String> = REQUIRED_KEYS
        .iter()
        .filter(|key| settings.get(**key).map_or(true, |v| v.is_empty()))
        .map(|key| format!("Missing in config: {key}"))
        .collect();
    if !missing.is_empty() {
        return Err(CoreError::Config(missing.join("; ")));
    }

    let mut problems = Vec::new();
    for key in URL_KEYS {
        let url = &settings[*key];
        if !url.starts_with("http") {
            problems.push(format!("{key} does not look like an url: {url}"));
        }
        if url.ends_with('/') {
            problems.push(format!("{key} must not end with /"));
        }
    }

    let unknown: Vec<&str> = settings
        .keys()
        .map(String::as_str)
        .filter(|k| !REQUIRED_KEYS.contains(k) && !OPTIONAL_KEYS.contains(k))
        .collect();
    if !unknown.is_empty() {
        problems.push(format!("Config contains invalid settings: {}", unknown.join(", ")));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(CoreError::Config(problems.join("; ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn settings() -> Settings {
        [
            ("ODIN_SECRET", "adsfasree"),
            ("ODIN_API_ROOT", "http://example.com"),
            ("JOB_API_ROOT", "http://example2.com"),
            ("JOB_API_USERNAME", "testuser"),
            ("JOB_API_PASSWORD", "testpw"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ODIN_SECRET=adsfasree").unwrap();
        writeln!(file, "ODIN_API_ROOT=\"http://example.com\"").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "JOB_API_ROOT=http://example2.com").unwrap();
        writeln!(file, "JOB_API_USERNAME=testuser").unwrap();
        writeln!(file, "JOB_API_PASSWORD=testpw").unwrap();

        assert_eq!(read_settings(file.path()).unwrap(), settings());

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.odin_api_root, "http://example.com");
        assert_eq!(config.job_api_version, DEFAULT_JOB_API_VERSION);
        assert_eq!(config.job_api_root, "http://example2.com");
    }

    #[test]
    fn test_validate_ok() {
        assert!(validate_settings(&settings()).is_ok());
    }

    #[test]
    fn test_validate_missing_key() {
        for key in REQUIRED_KEYS {
            let mut s = settings();
            s.remove(*key);
            let err = validate_settings(&s).unwrap_err().to_string();
            assert!(err.contains(key), "{err}");
        }
    }

    #[test]
    fn test_validate_empty_value() {
        let mut s = settings();
        s.insert("JOB_API_PASSWORD".into(), String::new());
        assert!(validate_settings(&s).is_err());
    }

    #[test]
    fn test_validate_invalid_urls() {
        for key in URL_KEYS {
            let mut s = settings();
            let stripped = s[*key][7..].to_string();
            s.insert(key.to_string(), stripped);
            assert!(validate_settings(&s).is_err());

            let mut s = settings();
            let slashed = format!("{}/", s[*key]);
            s.insert(key.to_string(), slashed);
            assert!(validate_settings(&s).is_err());
        }
    }

    #[test]
    fn test_validate_unknown_key() {
        let mut s = settings();
        s.insert("BAD".into(), "smirk".into());
        let err = validate_settings(&s).unwrap_err().to_string();
        assert!(err.contains("BAD"));
    }

    #[test]
    fn test_optional_version() {
        let mut s = settings();
        s.insert("JOB_API_VERSION".into(), "v5".into());
        let config = Config::from_settings(&s).unwrap();
        assert_eq!(config.job_api_version, "v5");
    }

    #[test]
    fn test_summary_redacts_secrets() {
        let config = Config::from_settings(&settings()).unwrap();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("adsfasree"));
        assert!(!json.contains("testpw"));
    }
}
