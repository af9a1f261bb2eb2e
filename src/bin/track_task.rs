use std::path::PathBuf;

use clap::{AppSettings, Parser};
use log::debug;

use gleam_x::{
    config::tracking_enabled,
    connect, setup_logging,
    track::{Directive, TrackArgs},
    DbConfig, GleamXError, ObsId, TrackingIdentity,
};

/// Record the progress of GLEAM-X batch jobs in the registry. Does nothing
/// unless GXTRACK is "track".
#[derive(Parser, Debug)]
#[clap(version, about)]
#[clap(global_setting(AppSettings::DeriveDisplayOrder))]
#[clap(disable_help_subcommand = true)]
struct Args {
    /// One of queue, start, finish, fail, obs_status, queue_mosaic,
    /// start_mosaic or finish_mosaic.
    directive: String,

    /// Job id from slurm.
    #[clap(long = "jobid")]
    job_id: Option<i64>,

    /// Task id from slurm (the array index).
    #[clap(long = "taskid")]
    task_id: Option<i64>,

    /// The task being run.
    #[clap(long)]
    task: Option<String>,

    /// Submission time [Unix seconds, or "now"].
    #[clap(long = "submission_time")]
    submission_time: Option<String>,

    /// Job start time [Unix seconds, or "now"].
    #[clap(long = "start_time")]
    start_time: Option<String>,

    /// Job finish time [Unix seconds, or "now"].
    #[clap(long = "finish_time")]
    finish_time: Option<String>,

    /// The batch file name.
    #[clap(long = "batch_file")]
    batch_file: Option<String>,

    /// The observation id.
    #[clap(long = "obs_id")]
    obs_id: Option<ObsId>,

    /// The observations in a mosaic batch. Only used by the mosaic
    /// directives.
    #[clap(long = "batch_obs_ids", multiple_values(true))]
    batch_obs_ids: Vec<ObsId>,

    /// The standard error log.
    #[clap(long)]
    stderr: Option<String>,

    /// The standard out log.
    #[clap(long)]
    stdout: Option<String>,

    /// Observation status; one of unprocessed, downloaded, calibrated, imaged
    /// or archived.
    #[clap(long)]
    status: Option<String>,

    /// Subband of the images being mosaicked together.
    #[clap(long)]
    subband: Option<String>,

    /// The user submitting the job. Defaults to GXUSER, then USER.
    #[clap(long)]
    user: Option<String>,

    /// The cluster running the job. Defaults to GXCLUSTER, then HOST_CLUSTER,
    /// then HOST.
    #[clap(long = "host_cluster")]
    host_cluster: Option<String>,

    /// A TOML file describing the database to use. If not given, GXDBCONFIG
    /// or the GXDB* variables are used.
    #[clap(long)]
    db_config: Option<PathBuf>,

    /// The verbosity of the program. Increase by specifying multiple times
    /// (e.g. -vv).
    #[clap(short, long, parse(from_occurrences))]
    verbosity: u8,
}

fn main() {
    if !tracking_enabled(|key| std::env::var(key).ok()) {
        println!("Task process tracking is disabled.");
        return;
    }

    if let Err(e) = try_main() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), GleamXError> {
    let args = Args::parse();
    setup_logging(args.verbosity);
    debug!("{args:?}");

    let directive = Directive::parse(&args.directive)?;
    let identity = TrackingIdentity::from_env();
    let request = TrackArgs {
        job_id: args.job_id,
        task_id: args.task_id,
        task: args.task,
        submission_time: args.submission_time,
        start_time: args.start_time,
        finish_time: args.finish_time,
        batch_file: args.batch_file,
        obs_id: args.obs_id,
        batch_obs_ids: args.batch_obs_ids,
        stderr: args.stderr,
        stdout: args.stdout,
        status: args.status,
        subband: args.subband,
        user: args.user.or(identity.user),
        host_cluster: args.host_cluster.or(identity.host_cluster),
    }
    .into_request(directive)?;

    let config = DbConfig::resolve(args.db_config.as_deref())?;
    debug!("Using {}", config.describe());
    let mut registry = connect(&config)?;
    let rows = registry.apply(&request)?;
    debug!("{directive}: {rows} row(s) written");
    Ok(())
}
