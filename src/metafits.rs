//! Observation metadata from an MWA metafits file.

use std::path::{Path, PathBuf};

use hifitime::{Duration, Epoch};
use itertools::Itertools;
use log::debug;
use thiserror::Error;

use crate::{
    db::models::Observation,
    fits::{fits_get_optional_key, fits_get_required_key, fits_open, fits_open_hdu, FitsError},
    track::ObsStatus,
    ObsId,
};

/// The metafits primary-header values the pipeline cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct MetafitsContext {
    pub obs_id: ObsId,
    /// GPS seconds of the start of the observation.
    pub gps_time: i64,
    pub exposure_sec: i32,
    pub ra_deg: f64,
    pub dec_deg: f64,
    pub azimuth_deg: f64,
    pub altitude_deg: f64,
    pub lst_deg: f64,
    pub cenchan: i32,
    pub freqcent_mhz: f64,
    pub finechan_khz: f64,
    pub int_time_sec: f64,
    pub delays: [u32; 16],
    pub project: Option<String>,
    pub filename: Option<String>,
    pub creator: Option<String>,
    pub calibration: bool,
    pub calibrators: Option<String>,
}

impl MetafitsContext {
    pub fn read<P: AsRef<Path>>(metafits: P) -> Result<MetafitsContext, MetafitsError> {
        let metafits = metafits.as_ref();
        debug!("Reading {}", metafits.display());
        let mut fptr = fits_open(metafits)?;
        let hdu = fits_open_hdu(&mut fptr, 0)?;

        let gps_time: i64 = fits_get_required_key(&mut fptr, &hdu, "GPSTIME")?;
        let delays_str: String = fits_get_required_key(&mut fptr, &hdu, "DELAYS")?;
        let delays = parse_delays(&delays_str).ok_or_else(|| MetafitsError::BadDelays {
            file: metafits.to_path_buf(),
            value: delays_str.clone(),
        })?;
        let calibrat: Option<String> = fits_get_optional_key(&mut fptr, &hdu, "CALIBRAT")?;

        Ok(MetafitsContext {
            obs_id: gps_time,
            gps_time,
            exposure_sec: fits_get_required_key(&mut fptr, &hdu, "EXPOSURE")?,
            ra_deg: fits_get_required_key(&mut fptr, &hdu, "RA")?,
            dec_deg: fits_get_required_key(&mut fptr, &hdu, "DEC")?,
            azimuth_deg: fits_get_required_key(&mut fptr, &hdu, "AZIMUTH")?,
            altitude_deg: fits_get_required_key(&mut fptr, &hdu, "ALTITUDE")?,
            lst_deg: fits_get_required_key(&mut fptr, &hdu, "LST")?,
            cenchan: fits_get_required_key(&mut fptr, &hdu, "CENTCHAN")?,
            freqcent_mhz: fits_get_required_key(&mut fptr, &hdu, "FREQCENT")?,
            finechan_khz: fits_get_required_key(&mut fptr, &hdu, "FINECHAN")?,
            int_time_sec: fits_get_required_key(&mut fptr, &hdu, "INTTIME")?,
            delays,
            project: fits_get_optional_key(&mut fptr, &hdu, "PROJECT")?,
            filename: fits_get_optional_key(&mut fptr, &hdu, "FILENAME")?,
            creator: fits_get_optional_key(&mut fptr, &hdu, "CREATOR")?,
            calibration: matches!(calibrat.as_deref().map(str::trim), Some("T")),
            calibrators: fits_get_optional_key(&mut fptr, &hdu, "CALIBSRC")?,
        })
    }

    /// The middle of the observation.
    pub fn midpoint(&self) -> Epoch {
        Epoch::from_gpst_seconds(self.gps_time as f64)
            + Duration::from_seconds(f64::from(self.exposure_sec) / 2.0)
    }

    pub fn centre_freq_hz(&self) -> f64 {
        self.freqcent_mhz * 1e6
    }

    /// The registry row for this observation, ready to be ingested.
    pub fn to_observation(&self) -> Observation {
        let status: &'static str = ObsStatus::Unprocessed.into();
        Observation {
            obs_id: self.obs_id,
            projectid: self.project.clone(),
            lst_deg: Some(self.lst_deg),
            starttime: Some(self.gps_time),
            duration_sec: Some(self.exposure_sec),
            obsname: self.filename.clone(),
            creator: self.creator.clone(),
            azimuth_pointing: Some(self.azimuth_deg),
            elevation_pointing: Some(self.altitude_deg),
            ra_pointing: Some(self.ra_deg),
            dec_pointing: Some(self.dec_deg),
            cenchan: Some(self.cenchan),
            freq_res: Some(self.finechan_khz),
            int_time: Some(self.int_time_sec),
            delays: Some(format!("[{}]", self.delays.iter().join(", "))),
            calibration: Some(self.calibration),
            calibrators: self.calibrators.clone(),
            archived: Some(false),
            status: Some(status.to_string()),
            ..Default::default()
        }
    }
}

/// Metafits delays look like "0,1,2,...".
fn parse_delays(s: &str) -> Option<[u32; 16]> {
    let v = s
        .split(',')
        .map(|d| d.trim().parse().ok())
        .collect::<Option<Vec<u32>>>()?;
    <[u32; 16]>::try_from(v).ok()
}

#[derive(Error, Debug)]
pub enum MetafitsError {
    #[error("{} has DELAYS '{value}', which isn't 16 comma-separated integers", file.display())]
    BadDelays { file: PathBuf, value: String },

    #[error(transparent)]
    Fits(#[from] FitsError),
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_abs_diff_eq;
    use fitsio::FitsFile;
    use tempfile::TempDir;

    use super::*;

    /// Write a small metafits file with the keys of a real GLEAM-X
    /// observation.
    pub(crate) fn write_metafits(dir: &TempDir, delays: &str) -> PathBuf {
        let path = dir.path().join("1090008640.metafits");
        let mut fptr = FitsFile::create(&path).open().unwrap();
        let hdu = fptr.primary_hdu().unwrap();
        hdu.write_key(&mut fptr, "GPSTIME", 1090008640_i64).unwrap();
        hdu.write_key(&mut fptr, "EXPOSURE", 112_i64).unwrap();
        hdu.write_key(&mut fptr, "RA", 8.4203).unwrap();
        hdu.write_key(&mut fptr, "DEC", -26.7838).unwrap();
        hdu.write_key(&mut fptr, "AZIMUTH", 0.0).unwrap();
        hdu.write_key(&mut fptr, "ALTITUDE", 90.0).unwrap();
        hdu.write_key(&mut fptr, "LST", 8.4203).unwrap();
        hdu.write_key(&mut fptr, "CENTCHAN", 145_i64).unwrap();
        hdu.write_key(&mut fptr, "FREQCENT", 185.595).unwrap();
        hdu.write_key(&mut fptr, "FINECHAN", 40.0).unwrap();
        hdu.write_key(&mut fptr, "INTTIME", 0.5).unwrap();
        hdu.write_key(&mut fptr, "DELAYS", delays).unwrap();
        hdu.write_key(&mut fptr, "PROJECT", "G0008").unwrap();
        hdu.write_key(&mut fptr, "FILENAME", "high_season1_2456854").unwrap();
        hdu.write_key(&mut fptr, "CREATOR", "Hurley-Walker").unwrap();
        hdu.write_key(&mut fptr, "CALIBRAT", "F").unwrap();
        path
    }

    #[test]
    fn test_read_metafits() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_metafits(&dir, "0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0");
        let context = MetafitsContext::read(&path).unwrap();
        assert_eq!(context.obs_id, 1090008640);
        assert_eq!(context.exposure_sec, 112);
        assert_eq!(context.cenchan, 145);
        assert_abs_diff_eq!(context.dec_deg, -26.7838);
        assert_abs_diff_eq!(context.centre_freq_hz(), 185.595e6, epsilon = 1e-3);
        assert_eq!(context.delays, [0; 16]);
        assert_eq!(context.project.as_deref(), Some("G0008"));
        assert!(!context.calibration);
        assert!(context.calibrators.is_none());

        assert_abs_diff_eq!(context.midpoint().to_gpst_seconds(), 1090008696.0, epsilon = 1e-6);

        let obs = context.to_observation();
        assert_eq!(obs.obs_id, 1090008640);
        assert_eq!(obs.starttime, Some(1090008640));
        assert_eq!(obs.duration_sec, Some(112));
        assert_eq!(obs.obsname.as_deref(), Some("high_season1_2456854"));
        assert_eq!(
            obs.delays.as_deref(),
            Some("[0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]")
        );
        assert_eq!(obs.status.as_deref(), Some("unprocessed"));
    }

    #[test]
    fn test_bad_delays() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_metafits(&dir, "0,0,0");
        assert!(matches!(
            MetafitsContext::read(&path),
            Err(MetafitsError::BadDelays { .. })
        ));
    }

    #[test]
    fn test_parse_delays() {
        assert_eq!(
            parse_delays("3,2,1,0,3,2,1,0,3,2,1,0,3,2,1,0"),
            Some([3, 2, 1, 0, 3, 2, 1, 0, 3, 2, 1, 0, 3, 2, 1, 0])
        );
        assert_eq!(parse_delays("3,2,1,x,3,2,1,0,3,2,1,0,3,2,1,0"), None);
        assert_eq!(parse_delays(""), None);
    }
}
