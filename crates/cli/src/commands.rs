use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{Duration, Local, NaiveDate};
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use microq_catalog::{first_day, Catalog, OdinClient, ScanIdSource};
use microq_core::config::CONFIG_FILE_DOCS;
use microq_core::validate::{check_deadline, check_project_name, parse_day};
use microq_core::{Config, JobFactory, TargetCipher};
use microq_queue::{
    get_matching_projects, AuthTokenProvider, ClaimReleasePool, JobBatchSubmitter, JobDirectory,
    JobServiceClient, ProjectSpec, SubmitError, UnprocessedScanReconciler,
};

use crate::cli::{QsmrJobsArgs, QsmrProjectsArgs};

/// First day production backfill looks at.
const FIRST_PRODUCTION_DAY: (i32, u32, u32) = (2019, 8, 1);

const DEFAULT_DEADLINE_DAYS: i64 = 10;

const VALID_ONLY: &str = "Configuration and project names are valid";

fn load_config(path: Option<&Path>) -> Result<Config> {
    match Config::load(path) {
        Ok(config) => {
            config.log_summary();
            Ok(config)
        }
        Err(e) => {
            eprintln!("{CONFIG_FILE_DOCS}");
            Err(e).context("invalid configuration")
        }
    }
}

fn build_submitter(
    config: &Config,
    client: &JobServiceClient,
    project: &str,
    odin_project: &str,
) -> Result<JobBatchSubmitter<JobServiceClient, JobServiceClient>> {
    let cipher = TargetCipher::from_secret(&config.odin_secret).context("invalid ODIN_SECRET")?;
    let factory = JobFactory::new(&config.odin_api_root, odin_project, cipher);
    Ok(JobBatchSubmitter::new(
        AuthTokenProvider::new(client.clone()),
        client.clone(),
        factory,
        project,
    ))
}

/// Print the outcome of a submission; an aborted run also gets the resume hint.
fn report_submission(result: Result<microq_queue::SubmitReport, SubmitError>) -> Result<()> {
    match result {
        Ok(report) => {
            print!("{report}");
            Ok(())
        }
        Err(e) => {
            if let SubmitError::Aborted {
                report, resume_skip, ..
            } = &e
            {
                print!("{report}");
                println!("Exiting, you can try again with --skip={resume_skip}");
            }
            Err(e.into())
        }
    }
}

pub async fn qsmrjobs(config_path: Option<&Path>, args: QsmrJobsArgs) -> Result<()> {
    check_project_name("Project name", &args.project)?;
    check_project_name("Odin project name", &args.odin_project)?;
    let config = load_config(config_path)?;

    let Some(freqmode) = args.freq_mode else {
        println!("{VALID_ONLY}");
        return Ok(());
    };
    let start_day = args.start_day.as_deref().map(parse_day).transpose()?;
    let end_day = args.end_day.as_deref().map(parse_day).transpose()?;

    let odin = Arc::new(OdinClient::new(&config.odin_api_root));
    let source = ScanIdSource::new(Arc::clone(&odin));
    if args.skip > 0 {
        println!("Skipping the first {} scanids", args.skip);
    }
    let scan_ids = if args.vds {
        println!("Adding all in vds dataset");
        source.fixed_dataset(freqmode)?
    } else if args.all {
        let start = start_day.unwrap_or_else(first_day);
        let end = match end_day {
            Some(end) => end,
            None => odin.latest_ecmf_day().await?,
        };
        println!("Adding all between {start} and {end}");
        source.date_range(freqmode, start_day, end_day)
    } else if let Some(path) = &args.jobs_file {
        println!("Adding from file");
        ScanIdSource::<OdinClient>::from_file(path)
    } else {
        println!("{VALID_ONLY}");
        return Ok(());
    };

    let client = JobServiceClient::from_config(&config);
    let mut submitter = build_submitter(&config, &client, &args.project, &args.odin_project)?;
    report_submission(submitter.submit(scan_ids, freqmode, args.skip).await)
}

pub async fn qsmrprojects(config_path: Option<&Path>, args: QsmrProjectsArgs) -> Result<()> {
    check_project_name("Project name", &args.project)?;
    check_project_name("Odin project name", &args.odin_project)?;
    let today = Local::now().date_naive();
    let deadline = match &args.deadline {
        Some(deadline) => check_deadline(deadline, today)?,
        None => today + Duration::days(DEFAULT_DEADLINE_DAYS),
    };
    let config = load_config(config_path)?;

    let client = JobServiceClient::from_config(&config);
    if client.project_exists(&args.project).await? {
        bail!("Project {} already exists.\nChange PROJECT_NAME!", args.project);
    }
    let spec = ProjectSpec {
        processing_image_url: args.processing_image_url,
        deadline,
        name: args.odin_project,
    };
    client.create_project(&args.project, &spec).await?;
    println!("Created project {} (deadline {deadline})", args.project);
    Ok(())
}

pub async fn delete_claims(
    config_path: Option<&Path>,
    project: &str,
    force: bool,
    workers: usize,
) -> Result<()> {
    let config = load_config(config_path)?;
    let client = Arc::new(JobServiceClient::from_config(&config));
    let pool = ClaimReleasePool::new(client.clone(), client.clone(), &client.api_base())
        .with_workers(workers);
    let summary = pool.release_claims(project, force).await?;
    println!("Released {} claims in project {project}", summary.enqueued);
    Ok(())
}

pub async fn delete_project(config_path: Option<&Path>, project: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let client = JobServiceClient::from_config(&config);
    let odin_project = client.project_name(project).await?;

    let odin = OdinClient::new(&config.odin_api_root)
        .with_result_credentials(&config.odin_api_root, &config.odin_secret);
    let cipher = TargetCipher::from_secret(&config.odin_secret).context("invalid ODIN_SECRET")?;
    let purge = client
        .delete_level2_results(project, &odin_project, &odin, &cipher)
        .await?;
    if purge.failed > 0 {
        bail!("Could not delete all Level2 data");
    }

    client
        .delete_project(project)
        .await
        .with_context(|| format!("Project {project} could not be deleted"))?;
    println!(
        "Deleted project {project} and {} level2 results of {odin_project}",
        purge.deleted
    );
    Ok(())
}

pub async fn add_production_jobs(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let odin = Arc::new(OdinClient::new(&config.odin_api_root));
    let client = Arc::new(JobServiceClient::from_config(&config));

    let (y, m, d) = FIRST_PRODUCTION_DAY;
    let date_start = NaiveDate::from_ymd_opt(y, m, d).context("invalid first production day")?;
    let date_end = odin.latest_ecmf_day().await?;

    let level2 = odin.level2_projects().await?;
    let processing = client.list_projects().await?;
    let matched = get_matching_projects(&level2, &processing);
    info!(
        projects = matched.len(),
        start = %date_start,
        end = %date_end,
        "Adding production jobs"
    );

    let reconciler = UnprocessedScanReconciler::new(Arc::clone(&odin), client.clone());
    let mut first_failure = None;
    for project in matched {
        let (freqmode, scans) = reconciler
            .reconcile(&project.id, date_start, date_end)
            .await
            .with_context(|| format!("failed to reconcile {}", project.id))?;
        let Some(freqmode) = freqmode else {
            continue;
        };
        if scans.is_empty() {
            continue;
        }
        println!(
            "Adding {} unprocessed scans to {} (freqmode {freqmode})",
            scans.len(),
            project.id
        );
        let ids = stream::iter(scans.into_iter().map(Ok)).boxed();
        let mut submitter = build_submitter(&config, &client, &project.id, &project.name)?;
        if let Err(e) = report_submission(submitter.submit(ids, freqmode, 0).await) {
            warn!(project = %project.id, error = %e, "Production jobs not fully added");
            first_failure.get_or_insert(e);
        }
    }
    match first_failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use axum::extract::{Path as UrlPath, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    #[derive(Default)]
    struct Stub {
        tokens: AtomicUsize,
        posted: Mutex<Vec<String>>,
    }

    async fn latest_ecmf() -> Json<Value> {
        Json(json!({"Date": "2019-08-02"}))
    }

    async fn level2_projects() -> Json<Value> {
        Json(json!({"Data": [{"Name": "meso"}, {"Name": "strat"}]}))
    }

    async fn level1_scans() -> Json<Value> {
        Json(json!({"Data": [{"ScanID": 1}, {"ScanID": 2}]}))
    }

    /// The second token request fails, so the first project cannot renew.
    async fn token(State(stub): State<Arc<Stub>>) -> Response {
        if stub.tokens.fetch_add(1, Ordering::SeqCst) == 1 {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
        Json(json!({"token": "tok"})).into_response()
    }

    async fn projects() -> Json<Value> {
        Json(json!({"Projects": [
            {"Name": "meso", "Id": "meso1"},
            {"Name": "strat", "Id": "strat1"},
        ]}))
    }

    async fn claimed() -> Json<Value> {
        Json(json!({"Jobs": [{"Id": "1:9", "Status": "CLAIMED"}]}))
    }

    async fn post_jobs(State(stub): State<Arc<Stub>>, UrlPath(project): UrlPath<String>) -> StatusCode {
        if project == "meso1" {
            return StatusCode::UNAUTHORIZED;
        }
        stub.posted.lock().unwrap().push(project);
        StatusCode::CREATED
    }

    async fn spawn_stub() -> (String, Arc<Stub>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let origin = format!("http://{}", listener.local_addr().unwrap());
        let stub = Arc::new(Stub::default());

        let app = Router::new()
            .route("/odin/v5/config_data/latest_ecmf_file", get(latest_ecmf))
            .route("/odin/v5/level2/projects", get(level2_projects))
            .route("/odin/v5/level1/{freqmode}/scans", get(level1_scans))
            .route("/mq/token", get(token))
            .route("/mq/v4/projects", get(projects))
            .route("/mq/v4/{project}/jobs", get(claimed).post(post_jobs))
            .with_state(stub.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (origin, stub)
    }

    #[tokio::test]
    async fn test_production_jobs_continue_after_aborted_project() {
        let (origin, stub) = spawn_stub().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "JOB_API_ROOT={origin}/mq\nJOB_API_USERNAME=admin\nJOB_API_PASSWORD=sesame\n\
             ODIN_API_ROOT={origin}/odin\nODIN_SECRET='rc/lY+OQYq6mvI6tCfr+tQ=='"
        )
        .unwrap();

        let result = add_production_jobs(Some(file.path())).await;

        assert!(result.is_err());
        assert_eq!(*stub.posted.lock().unwrap(), vec!["strat1"]);
        assert_eq!(stub.tokens.load(Ordering::SeqCst), 3);
    }
}
