//! Rows of the registry tables.

use diesel::prelude::*;

use super::schema::{calapparent, mosaic, observation, processing, sources};
use crate::ObsId;

/// One telescope observation.
#[derive(Debug, Clone, Default, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = observation)]
pub struct Observation {
    pub obs_id: ObsId,
    pub projectid: Option<String>,
    pub lst_deg: Option<f64>,
    /// GPS seconds.
    pub starttime: Option<i64>,
    pub duration_sec: Option<i32>,
    pub obsname: Option<String>,
    pub creator: Option<String>,
    pub azimuth_pointing: Option<f64>,
    pub elevation_pointing: Option<f64>,
    /// \[degrees\]
    pub ra_pointing: Option<f64>,
    /// \[degrees\]
    pub dec_pointing: Option<f64>,
    /// The centre coarse-channel number.
    pub cenchan: Option<i32>,
    pub freq_res: Option<f64>,
    pub int_time: Option<f64>,
    /// The 16 dipole delays as a JSON array.
    pub delays: Option<String>,
    pub calibration: Option<bool>,
    pub cal_obs_id: Option<ObsId>,
    pub calibrators: Option<String>,
    pub peelsrcs: Option<String>,
    pub flags: Option<String>,
    pub selfcal: Option<bool>,
    pub ion_phs_med: Option<i32>,
    pub ion_phs_peak: Option<i32>,
    pub ion_phs_std: Option<i32>,
    pub archived: Option<bool>,
    pub nfiles: Option<i32>,
    pub status: Option<String>,
}

/// One batch job/task execution against an observation.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = processing)]
pub struct ProcessingTask {
    pub job_id: i64,
    pub task_id: i64,
    pub host_cluster: String,
    pub submission_time: Option<i64>,
    pub task: Option<String>,
    pub user: Option<String>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub obs_id: Option<ObsId>,
    pub status: Option<String>,
    pub batch_file: Option<String>,
    pub stderr: Option<String>,
    pub stdout: Option<String>,
    pub output_files: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = processing)]
pub(crate) struct NewProcessingTask<'a> {
    pub(crate) job_id: i64,
    pub(crate) task_id: i64,
    pub(crate) host_cluster: &'a str,
    pub(crate) submission_time: i64,
    pub(crate) task: &'a str,
    pub(crate) user: &'a str,
    pub(crate) obs_id: ObsId,
    pub(crate) status: &'a str,
    pub(crate) batch_file: &'a str,
    pub(crate) stderr: &'a str,
    pub(crate) stdout: &'a str,
}

/// A static, named celestial object used for calibration.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = sources)]
pub struct Source {
    #[diesel(column_name = source)]
    pub name: String,
    /// \[degrees\]
    #[diesel(column_name = ra_j2000)]
    pub ra_deg: f64,
    /// \[degrees\]
    #[diesel(column_name = dec_j2000)]
    pub dec_deg: f64,
    /// Flux density at 150 MHz \[Jy\].
    pub flux: f64,
    /// Spectral index.
    pub alpha: f64,
    /// Spectral curvature.
    pub beta: f64,
}

/// A source's beam-attenuated brightness in an observation.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable)]
#[diesel(table_name = calapparent)]
pub struct ApparentFlux {
    pub obs_id: ObsId,
    pub source: String,
    /// \[Jy\]
    pub appflux: f64,
    pub infov: bool,
}

/// One observation's membership of a mosaicking job.
#[derive(Debug, Clone, PartialEq, Queryable, Selectable)]
#[diesel(table_name = mosaic)]
pub struct MosaicTask {
    pub mos_id: i32,
    pub obs_id: Option<ObsId>,
    pub job_id: Option<i64>,
    pub task_id: Option<i64>,
    pub host_cluster: Option<String>,
    pub user: Option<String>,
    pub subband: Option<String>,
    pub status: Option<String>,
    pub submission_time: Option<i64>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = mosaic)]
pub(crate) struct NewMosaicTask<'a> {
    pub(crate) obs_id: ObsId,
    pub(crate) job_id: i64,
    pub(crate) task_id: i64,
    pub(crate) host_cluster: &'a str,
    pub(crate) user: &'a str,
    pub(crate) subband: &'a str,
    pub(crate) status: &'a str,
    pub(crate) submission_time: i64,
}
