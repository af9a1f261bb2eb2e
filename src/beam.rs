//! Primary-beam responses.
//!
//! The pipeline only ever needs the instrumental XX and YY power of the MWA
//! primary beam towards a direction, so that's all the [`Beam`] trait
//! offers. The real thing is the FEE beam out of `mwa_hyperbeam`.

use std::path::Path;

use hifitime::{Duration, Epoch};
use log::debug;
use marlu::{
    constants::{MWA_LAT_RAD, MWA_LONG_RAD},
    precession::get_lmst,
    AzEl, RADec,
};
use mwa_hyperbeam::fee::{FEEBeamError, InitFEEBeamError};
use thiserror::Error;

/// Something that can give the MWA's primary-beam power.
pub trait Beam: Sync {
    /// The XX and YY power responses towards `azel`, normalised to zenith.
    /// Anything below the horizon has no response.
    fn power(&self, azel: AzEl, freq_hz: f64, delays: &[u32; 16]) -> Result<[f64; 2], BeamError>;
}

/// The MWA fully-embedded-element beam.
pub struct FeeBeam {
    hyperbeam_object: mwa_hyperbeam::fee::FEEBeam,
}

impl FeeBeam {
    pub fn new<P: AsRef<Path>>(file: P) -> Result<FeeBeam, BeamError> {
        debug!("Reading FEE beam from {}", file.as_ref().display());
        let hyperbeam_object = mwa_hyperbeam::fee::FEEBeam::new(file.as_ref())?;
        Ok(FeeBeam { hyperbeam_object })
    }

    /// Use the beam file named by `MWA_BEAM_FILE`.
    pub fn new_from_env() -> Result<FeeBeam, BeamError> {
        debug!("Reading FEE beam from MWA_BEAM_FILE");
        let hyperbeam_object = mwa_hyperbeam::fee::FEEBeam::new_from_env()?;
        Ok(FeeBeam { hyperbeam_object })
    }

    pub fn from_file_or_env(file: Option<&Path>) -> Result<FeeBeam, BeamError> {
        match file {
            Some(f) => Self::new(f),
            None => Self::new_from_env(),
        }
    }
}

impl Beam for FeeBeam {
    fn power(&self, azel: AzEl, freq_hz: f64, delays: &[u32; 16]) -> Result<[f64; 2], BeamError> {
        if azel.el <= 0.0 {
            return Ok([0.0, 0.0]);
        }

        // All dipoles are assumed alive.
        let amps = [1.0; 16];
        let j = self.hyperbeam_object.calc_jones_pair(
            azel.az,
            azel.za(),
            freq_hz.round() as u32,
            delays,
            &amps,
            true,
            Some(MWA_LAT_RAD),
            false,
        )?;
        let xx = j[0].norm_sqr() + j[1].norm_sqr();
        let yy = j[2].norm_sqr() + j[3].norm_sqr();
        Ok([xx, yy])
    }
}

/// A beam with unit response everywhere above the horizon.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnityBeam;

impl Beam for UnityBeam {
    fn power(&self, azel: AzEl, _freq_hz: f64, _delays: &[u32; 16]) -> Result<[f64; 2], BeamError> {
        if azel.el <= 0.0 {
            Ok([0.0, 0.0])
        } else {
            Ok([1.0, 1.0])
        }
    }
}

/// Where `radec` is on the sky as seen from the MWA at `time`.
pub fn radec_to_mwa_azel(radec: RADec, time: Epoch) -> AzEl {
    let lst_rad = get_lmst(MWA_LONG_RAD, time, Duration::default());
    radec.to_hadec(lst_rad).to_azel(MWA_LAT_RAD)
}

/// The XX and YY beam power towards `radec` at `time`.
pub fn beam_power_at_radec(
    beam: &dyn Beam,
    radec: RADec,
    time: Epoch,
    freq_hz: f64,
    delays: &[u32; 16],
) -> Result<[f64; 2], BeamError> {
    let azel = radec_to_mwa_azel(radec, time);
    debug!(
        "RA {:.4} Dec {:.4} is at Az {:.4} El {:.4} (degrees)",
        radec.ra.to_degrees(),
        radec.dec.to_degrees(),
        azel.az.to_degrees(),
        azel.el.to_degrees()
    );
    beam.power(azel, freq_hz, delays)
}

#[derive(Error, Debug)]
pub enum BeamError {
    #[error(transparent)]
    InitFEE(#[from] InitFEEBeamError),

    #[error(transparent)]
    Fee(#[from] FEEBeamError),
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_unity_beam_horizon() {
        let delays = [0; 16];
        let up = AzEl { az: 0.0, el: 0.5 };
        let down = AzEl { az: 0.0, el: -0.5 };
        assert_eq!(UnityBeam.power(up, 150e6, &delays).unwrap(), [1.0, 1.0]);
        assert_eq!(UnityBeam.power(down, 150e6, &delays).unwrap(), [0.0, 0.0]);
    }

    #[test]
    fn test_zenith_stays_near_zenith() {
        // Whatever is at the MWA's zenith (RA = LST, Dec = latitude) must be
        // at an elevation of 90 degrees.
        let time = Epoch::from_gpst_seconds(1090008640.0);
        let lst = get_lmst(MWA_LONG_RAD, time, Duration::default());
        let zenith = RADec {
            ra: lst,
            dec: MWA_LAT_RAD,
        };
        let azel = radec_to_mwa_azel(zenith, time);
        assert_abs_diff_eq!(azel.el, std::f64::consts::FRAC_PI_2, epsilon = 1e-6);

        // ... and the south celestial pole is always up at the MWA.
        let scp = RADec::from_degrees(0.0, -90.0);
        let azel = radec_to_mwa_azel(scp, time);
        assert_abs_diff_eq!(azel.el, -MWA_LAT_RAD, epsilon = 1e-6);
    }

    #[test]
    fn test_beam_power_at_radec_uses_the_horizon() {
        let time = Epoch::from_gpst_seconds(1090008640.0);
        let delays = [0; 16];
        // The north celestial pole is never visible from the MWA.
        let ncp = RADec::from_degrees(0.0, 90.0);
        assert_eq!(
            beam_power_at_radec(&UnityBeam, ncp, time, 150e6, &delays).unwrap(),
            [0.0, 0.0]
        );
        let scp = RADec::from_degrees(0.0, -90.0);
        assert_eq!(
            beam_power_at_radec(&UnityBeam, scp, time, 150e6, &delays).unwrap(),
            [1.0, 1.0]
        );
    }

    #[test]
    #[serial_test::serial]
    #[ignore = "needs the FEE beam file in MWA_BEAM_FILE"]
    fn test_fee_beam_zenith() {
        let beam = FeeBeam::new_from_env().unwrap();
        let zenith = AzEl {
            az: 0.0,
            el: std::f64::consts::FRAC_PI_2,
        };
        let [xx, yy] = beam.power(zenith, 150e6, &[0; 16]).unwrap();
        // Normalised to zenith.
        assert_abs_diff_eq!(xx, 1.0, epsilon = 1e-2);
        assert_abs_diff_eq!(yy, 1.0, epsilon = 1e-2);
    }
}
