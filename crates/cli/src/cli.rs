use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use microq_core::config::CONFIG_FILE_DOCS;
use microq_queue::DEFAULT_WORKERS;

/// Administer qsmr processing projects and jobs at the MicroQ job service.
#[derive(Parser, Debug)]
#[command(name = "microq-admin", after_help = CONFIG_FILE_DOCS)]
pub struct CliArgs {
    /// Config file with KEY=VALUE settings (default: /odin.cfg, falling
    /// back to the environment when it does not exist)
    #[arg(long, global = true, env = "MICROQ_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add qsmr jobs for all scans of a freqmode, a date range, the vds
    /// dataset or a file. Without a freqmode and a source only the config
    /// and project names are validated.
    Qsmrjobs(QsmrJobsArgs),

    /// Add a processing project to the job service.
    Qsmrprojects(QsmrProjectsArgs),

    /// Release failed (and with --force also claimed) jobs so they are
    /// processed again.
    DeleteClaims {
        /// The project for which to release claims
        project: String,

        /// Release claimed jobs too, not only failed ones
        #[arg(long)]
        force: bool,

        /// Concurrent delete requests
        #[arg(long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,
    },

    /// Delete a job service project and its level2 data.
    DeleteProject {
        /// The job service project to delete
        #[arg(value_name = "USERVICE_PROJECT")]
        project: String,
    },

    /// Add jobs for unprocessed scans of every production project.
    AddProductionJobs,
}

#[derive(Args, Debug)]
pub struct QsmrJobsArgs {
    /// Job service project name (ascii letters and digits, starting with a
    /// letter)
    #[arg(value_name = "PROJECT_NAME")]
    pub project: String,

    /// The project name used in the odin api
    #[arg(value_name = "ODIN_PROJECT")]
    pub odin_project: String,

    /// Freqmode of the jobs
    #[arg(long)]
    pub freq_mode: Option<u32>,

    /// Add all scan ids for this freqmode
    #[arg(long)]
    pub all: bool,

    /// Together with --all, only add scans from this day (yyyy-mm-dd)
    #[arg(long, requires = "all")]
    pub start_day: Option<String>,

    /// Together with --all, only add scans before this day (yyyy-mm-dd)
    #[arg(long, requires = "all")]
    pub end_day: Option<String>,

    /// Add all scan ids of the vds dataset for this freqmode
    #[arg(long)]
    pub vds: bool,

    /// Add the scan ids in this file, one per row
    #[arg(long)]
    pub jobs_file: Option<PathBuf>,

    /// Number of scan ids to skip, as printed by an aborted run
    #[arg(long, default_value_t = 0)]
    pub skip: usize,
}

#[derive(Args, Debug)]
pub struct QsmrProjectsArgs {
    /// Job service project name (ascii letters and digits, starting with a
    /// letter)
    #[arg(value_name = "PROJECT_NAME")]
    pub project: String,

    /// The project name used in the odin api
    #[arg(value_name = "ODIN_PROJECT")]
    pub odin_project: String,

    /// Url of the worker processing image
    #[arg(value_name = "PROCESSING_IMAGE_URL")]
    pub processing_image_url: String,

    /// Desired deadline (yyyy-mm-dd), default 10 days from today. Only sets
    /// the priority of the project.
    #[arg(long)]
    pub deadline: Option<String>,
}
