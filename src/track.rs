//! Tracking of batch jobs and observations through the pipeline.
//!
//! Batch scripts call `track_task` at submission, start and end of each job;
//! every call maps onto one of the [`Registry`] methods here. No transition
//! validation is done: a task can be "finished" without ever being "started".

use diesel::prelude::*;
use itertools::Itertools;
use log::{debug, warn};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString, IntoStaticStr};
use thiserror::Error;
use vec1::Vec1;

use crate::{
    db::{
        models::{MosaicTask, NewMosaicTask, NewProcessingTask, ProcessingTask},
        schema::{mosaic, observation, processing},
        with_conn, DbError, Registry,
    },
    ObsId,
};

/// Where an observation is in the pipeline. These values are also hard-coded
/// in the GLEAM-X website's data models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ObsStatus {
    Unprocessed,
    Downloaded,
    Calibrated,
    Imaged,
    Archived,
}

impl ObsStatus {
    /// All valid statuses, comma separated.
    pub fn allowed() -> String {
        ObsStatus::iter().join(", ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TaskStatus {
    Queued,
    Started,
    Finished,
    Failed,
}

/// Identifies one task of one batch job on one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub job_id: i64,
    pub task_id: i64,
    pub host_cluster: String,
}

/// Everything recorded when a task is submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub key: TaskKey,
    /// Unix seconds.
    pub submission_time: i64,
    pub obs_id: ObsId,
    pub user: String,
    pub batch_file: String,
    pub stderr: String,
    pub stdout: String,
    /// The name of the pipeline step, e.g. "calibrate".
    pub task: String,
}

/// A mosaicking job spanning several observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMosaic {
    pub key: TaskKey,
    pub obs_ids: Vec1<ObsId>,
    pub submission_time: i64,
    pub user: String,
    pub subband: String,
}

impl Registry {
    /// Record a newly submitted task with status "queued". The observation
    /// must already be in the registry.
    pub fn queue_task(&mut self, task: &QueuedTask) -> Result<(), DbError> {
        let status: &'static str = TaskStatus::Queued.into();
        let row = NewProcessingTask {
            job_id: task.key.job_id,
            task_id: task.key.task_id,
            host_cluster: &task.key.host_cluster,
            submission_time: task.submission_time,
            task: &task.task,
            user: &task.user,
            obs_id: task.obs_id,
            status,
            batch_file: &task.batch_file,
            stderr: &task.stderr,
            stdout: &task.stdout,
        };
        debug!("Queueing {row:?}");
        with_conn!(self, |conn| diesel::insert_into(processing::table)
            .values(&row)
            .execute(conn)?);
        Ok(())
    }

    /// Mark a task as started at `time` (Unix seconds).
    pub fn start_task(&mut self, key: &TaskKey, time: i64) -> Result<usize, DbError> {
        self.set_task_status(key, TaskStatus::Started, time)
    }

    /// Mark a task as finished at `time` (Unix seconds).
    pub fn finish_task(&mut self, key: &TaskKey, time: i64) -> Result<usize, DbError> {
        self.set_task_status(key, TaskStatus::Finished, time)
    }

    /// Mark a task as failed at `time` (Unix seconds).
    pub fn fail_task(&mut self, key: &TaskKey, time: i64) -> Result<usize, DbError> {
        self.set_task_status(key, TaskStatus::Failed, time)
    }

    /// Returns the number of rows updated. Updating a task that was never
    /// queued is not an error, but it is logged.
    fn set_task_status(
        &mut self,
        key: &TaskKey,
        status: TaskStatus,
        time: i64,
    ) -> Result<usize, DbError> {
        let target = processing::table
            .filter(processing::job_id.eq(key.job_id))
            .filter(processing::task_id.eq(key.task_id))
            .filter(processing::host_cluster.eq(&key.host_cluster));
        let status_str: &'static str = status.into();

        let n = match status {
            TaskStatus::Queued | TaskStatus::Started => {
                with_conn!(self, |conn| diesel::update(target)
                    .set((
                        processing::status.eq(status_str),
                        processing::start_time.eq(time),
                    ))
                    .execute(conn)?)
            }
            TaskStatus::Finished | TaskStatus::Failed => {
                with_conn!(self, |conn| diesel::update(target)
                    .set((
                        processing::status.eq(status_str),
                        processing::end_time.eq(time),
                    ))
                    .execute(conn)?)
            }
        };

        if n == 0 {
            warn!(
                "No task with job id {}, task id {} on {} to mark as {status}",
                key.job_id, key.task_id, key.host_cluster
            );
        }
        Ok(n)
    }

    pub fn get_task(&mut self, key: &TaskKey) -> Result<Option<ProcessingTask>, DbError> {
        let task = with_conn!(self, |conn| processing::table
            .filter(processing::job_id.eq(key.job_id))
            .filter(processing::task_id.eq(key.task_id))
            .filter(processing::host_cluster.eq(&key.host_cluster))
            .select(ProcessingTask::as_select())
            .first(conn)
            .optional()?);
        Ok(task)
    }

    /// Set an observation's status. Returns the number of rows updated.
    pub fn update_observation_status(
        &mut self,
        obs_id: ObsId,
        status: ObsStatus,
    ) -> Result<usize, DbError> {
        let status_str: &'static str = status.into();
        let n = with_conn!(self, |conn| diesel::update(
            observation::table.filter(observation::obs_id.eq(obs_id))
        )
        .set(observation::status.eq(status_str))
        .execute(conn)?);
        if n == 0 {
            warn!("No observation {obs_id} to mark as {status}");
        }
        Ok(n)
    }

    /// The obsids of every observation with `status`, ascending.
    pub fn observation_ids_with_status(
        &mut self,
        status: ObsStatus,
    ) -> Result<Vec<ObsId>, DbError> {
        let status_str: &'static str = status.into();
        let ids = with_conn!(self, |conn| observation::table
            .filter(observation::status.eq(status_str))
            .select(observation::obs_id)
            .order(observation::obs_id.asc())
            .load(conn)?);
        Ok(ids)
    }

    /// As [`Registry::update_observation_status`], but with a status that
    /// still needs validating. An invalid status never reaches the database.
    pub fn set_observation_status(
        &mut self,
        obs_id: ObsId,
        status: &str,
    ) -> Result<usize, TrackError> {
        let status = parse_obs_status(status)?;
        Ok(self.update_observation_status(obs_id, status)?)
    }

    /// Add one "queued" mosaic row per observation in the batch.
    pub fn queue_mosaic(&mut self, batch: &QueuedMosaic) -> Result<usize, DbError> {
        let status: &'static str = TaskStatus::Queued.into();
        let mut inserted = 0;
        for &obs_id in batch.obs_ids.iter() {
            let row = NewMosaicTask {
                obs_id,
                job_id: batch.key.job_id,
                task_id: batch.key.task_id,
                host_cluster: &batch.key.host_cluster,
                user: &batch.user,
                subband: &batch.subband,
                status,
                submission_time: batch.submission_time,
            };
            inserted += with_conn!(self, |conn| diesel::insert_into(mosaic::table)
                .values(&row)
                .execute(conn)?);
        }
        debug!(
            "Queued mosaic job {} task {} ({} observations)",
            batch.key.job_id, batch.key.task_id, inserted
        );
        Ok(inserted)
    }

    pub fn start_mosaic(
        &mut self,
        key: &TaskKey,
        subband: &str,
        time: i64,
    ) -> Result<usize, DbError> {
        self.set_mosaic_status(key, subband, TaskStatus::Started, time)
    }

    pub fn finish_mosaic(
        &mut self,
        key: &TaskKey,
        subband: &str,
        time: i64,
    ) -> Result<usize, DbError> {
        self.set_mosaic_status(key, subband, TaskStatus::Finished, time)
    }

    fn set_mosaic_status(
        &mut self,
        key: &TaskKey,
        subband: &str,
        status: TaskStatus,
        time: i64,
    ) -> Result<usize, DbError> {
        let target = mosaic::table
            .filter(mosaic::job_id.eq(key.job_id))
            .filter(mosaic::task_id.eq(key.task_id))
            .filter(mosaic::host_cluster.eq(&key.host_cluster))
            .filter(mosaic::subband.eq(subband));
        let status_str: &'static str = status.into();

        let n = match status {
            TaskStatus::Queued | TaskStatus::Started => {
                with_conn!(self, |conn| diesel::update(target)
                    .set((mosaic::status.eq(status_str), mosaic::start_time.eq(time)))
                    .execute(conn)?)
            }
            TaskStatus::Finished | TaskStatus::Failed => {
                with_conn!(self, |conn| diesel::update(target)
                    .set((mosaic::status.eq(status_str), mosaic::end_time.eq(time)))
                    .execute(conn)?)
            }
        };

        if n == 0 {
            warn!(
                "No mosaic rows with job id {}, task id {}, subband {subband} on {} \
                 to mark as {status}",
                key.job_id, key.task_id, key.host_cluster
            );
        }
        Ok(n)
    }

    /// The rows of a mosaic job, in insertion order.
    pub fn mosaic_tasks(
        &mut self,
        key: &TaskKey,
        subband: &str,
    ) -> Result<Vec<MosaicTask>, DbError> {
        let rows = with_conn!(self, |conn| mosaic::table
            .filter(mosaic::job_id.eq(key.job_id))
            .filter(mosaic::task_id.eq(key.task_id))
            .filter(mosaic::host_cluster.eq(&key.host_cluster))
            .filter(mosaic::subband.eq(subband))
            .order(mosaic::mos_id.asc())
            .select(MosaicTask::as_select())
            .load(conn)?);
        Ok(rows)
    }
}

pub fn parse_obs_status(s: &str) -> Result<ObsStatus, TrackError> {
    s.trim().parse().map_err(|_| TrackError::InvalidObsStatus {
        got: s.to_string(),
        allowed: ObsStatus::allowed(),
    })
}

/// Interpret a time argument as Unix seconds. Batch scripts sometimes pass
/// an unexpanded `date +%s` through; that, "now" and "NOW()" all mean the
/// current time.
pub fn parse_time_arg(argument: &'static str, value: &str) -> Result<i64, TrackError> {
    let trimmed = value.trim();
    if trimmed.eq_ignore_ascii_case("now")
        || trimmed.eq_ignore_ascii_case("now()")
        || trimmed.contains("date +%s")
    {
        let now = hifitime::Epoch::now().map_err(TrackError::Clock)?;
        return Ok(now.to_unix_seconds().floor() as i64);
    }
    trimmed.parse().map_err(|_| TrackError::BadTime {
        argument,
        value: value.to_string(),
    })
}

/// The things `track_task` can be asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Directive {
    Queue,
    Start,
    Finish,
    Fail,
    ObsStatus,
    QueueMosaic,
    StartMosaic,
    FinishMosaic,
}

impl Directive {
    pub fn parse(s: &str) -> Result<Directive, TrackError> {
        s.trim()
            .parse()
            .map_err(|_| TrackError::UnknownDirective {
                got: s.to_string(),
                allowed: Directive::iter().join(", "),
            })
    }
}

/// The raw, optional arguments given to `track_task`. Which of them are
/// needed depends on the [`Directive`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackArgs {
    pub job_id: Option<i64>,
    pub task_id: Option<i64>,
    pub task: Option<String>,
    pub submission_time: Option<String>,
    pub start_time: Option<String>,
    pub finish_time: Option<String>,
    pub batch_file: Option<String>,
    pub obs_id: Option<ObsId>,
    pub batch_obs_ids: Vec<ObsId>,
    pub stderr: Option<String>,
    pub stdout: Option<String>,
    pub status: Option<String>,
    pub subband: Option<String>,
    pub user: Option<String>,
    pub host_cluster: Option<String>,
}

/// A fully validated `track_task` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackRequest {
    Queue(QueuedTask),
    Start { key: TaskKey, time: i64 },
    Finish { key: TaskKey, time: i64 },
    Fail { key: TaskKey, time: i64 },
    ObsStatus { obs_id: ObsId, status: ObsStatus },
    QueueMosaic(QueuedMosaic),
    StartMosaic { key: TaskKey, subband: String, time: i64 },
    FinishMosaic { key: TaskKey, subband: String, time: i64 },
}

fn require<T>(
    value: Option<T>,
    directive: Directive,
    argument: &'static str,
) -> Result<T, TrackError> {
    value.ok_or(TrackError::MissingArgument {
        directive,
        argument,
    })
}

impl TrackArgs {
    fn key(&self, directive: Directive) -> Result<TaskKey, TrackError> {
        Ok(TaskKey {
            job_id: require(self.job_id, directive, "jobid")?,
            task_id: require(self.task_id, directive, "taskid")?,
            host_cluster: require(self.host_cluster.clone(), directive, "host_cluster")?,
        })
    }

    fn time(
        &self,
        value: &Option<String>,
        directive: Directive,
        argument: &'static str,
    ) -> Result<i64, TrackError> {
        parse_time_arg(argument, require(value.as_deref(), directive, argument)?)
    }

    /// Check that everything `directive` needs is present and valid. Nothing
    /// here touches the database.
    pub fn into_request(self, directive: Directive) -> Result<TrackRequest, TrackError> {
        let d = directive;
        let request = match directive {
            Directive::Queue => TrackRequest::Queue(QueuedTask {
                key: self.key(d)?,
                submission_time: self.time(&self.submission_time, d, "submission_time")?,
                obs_id: require(self.obs_id, d, "obs_id")?,
                user: require(self.user, d, "user")?,
                batch_file: require(self.batch_file, d, "batch_file")?,
                stderr: require(self.stderr, d, "stderr")?,
                stdout: require(self.stdout, d, "stdout")?,
                task: require(self.task, d, "task")?,
            }),

            Directive::Start => TrackRequest::Start {
                key: self.key(d)?,
                time: self.time(&self.start_time, d, "start_time")?,
            },

            Directive::Finish => TrackRequest::Finish {
                key: self.key(d)?,
                time: self.time(&self.finish_time, d, "finish_time")?,
            },

            Directive::Fail => TrackRequest::Fail {
                key: self.key(d)?,
                time: self.time(&self.finish_time, d, "finish_time")?,
            },

            Directive::ObsStatus => {
                let obs_id = require(self.obs_id, d, "obs_id")?;
                let status = require(self.status.as_deref(), d, "status")?;
                TrackRequest::ObsStatus {
                    obs_id,
                    status: parse_obs_status(status)?,
                }
            }

            Directive::QueueMosaic => {
                let key = self.key(d)?;
                let submission_time = self.time(&self.submission_time, d, "submission_time")?;
                let obs_ids = Vec1::try_from_vec(self.batch_obs_ids).map_err(|_| {
                    TrackError::MissingArgument {
                        directive: d,
                        argument: "batch_obs_ids",
                    }
                })?;
                TrackRequest::QueueMosaic(QueuedMosaic {
                    key,
                    obs_ids,
                    submission_time,
                    user: require(self.user, d, "user")?,
                    subband: require(self.subband, d, "subband")?,
                })
            }

            Directive::StartMosaic => TrackRequest::StartMosaic {
                key: self.key(d)?,
                time: self.time(&self.start_time, d, "start_time")?,
                subband: require(self.subband, d, "subband")?,
            },

            Directive::FinishMosaic => TrackRequest::FinishMosaic {
                key: self.key(d)?,
                time: self.time(&self.finish_time, d, "finish_time")?,
                subband: require(self.subband, d, "subband")?,
            },
        };
        Ok(request)
    }
}

impl Registry {
    /// Carry out a validated `track_task` request. Returns the number of rows
    /// written.
    pub fn apply(&mut self, request: &TrackRequest) -> Result<usize, DbError> {
        match request {
            TrackRequest::Queue(task) => self.queue_task(task).map(|_| 1),
            TrackRequest::Start { key, time } => self.start_task(key, *time),
            TrackRequest::Finish { key, time } => self.finish_task(key, *time),
            TrackRequest::Fail { key, time } => self.fail_task(key, *time),
            TrackRequest::ObsStatus { obs_id, status } => {
                self.update_observation_status(*obs_id, *status)
            }
            TrackRequest::QueueMosaic(batch) => self.queue_mosaic(batch),
            TrackRequest::StartMosaic { key, subband, time } => {
                self.start_mosaic(key, subband, *time)
            }
            TrackRequest::FinishMosaic { key, subband, time } => {
                self.finish_mosaic(key, subband, *time)
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Observation status `{got}` is not in the allowed list [{allowed}]. Exiting without updating.")]
    InvalidObsStatus { got: String, allowed: String },

    #[error("Directive {directive} requires argument {argument}")]
    MissingArgument {
        directive: Directive,
        argument: &'static str,
    },

    #[error("I don't know what you are asking ('{got}'); please give one of these directives: {allowed}")]
    UnknownDirective { got: String, allowed: String },

    #[error("Argument {argument} should be Unix seconds or 'now', but got '{value}'")]
    BadTime {
        argument: &'static str,
        value: String,
    },

    #[error("Couldn't read the system clock: {0}")]
    Clock(hifitime::Errors),

    #[error(transparent)]
    Db(#[from] DbError),
}
