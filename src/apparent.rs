//! The per-observation cache of bright-source apparent fluxes.
//!
//! For every source in the catalogue, an observation gets one `calapparent`
//! row holding how bright the source appears through the primary beam, and
//! whether it lands inside the nominal image.

use diesel::prelude::*;
use hifitime::Epoch;
use log::{debug, info, trace};
use marlu::RADec;
use thiserror::Error;

use crate::{
    beam::{beam_power_at_radec, Beam, BeamError},
    db::{
        models::{ApparentFlux, Observation, Source},
        schema::calapparent,
        with_conn, DbError, Registry,
    },
    ObsId, COARSE_CHAN_WIDTH_HZ,
};

/// Source flux densities in the catalogue are referenced to this frequency.
const REFERENCE_FREQ_HZ: f64 = 150e6;

/// The nominal image is this many pixels on a side...
const IMAGE_SIZE_PIX: f64 = 8000.0;
/// ... with this (1-based) reference pixel on both axes...
const IMAGE_CRPIX: f64 = 4000.0;
/// ... and a pixel scale of this divided by the centre channel \[degrees\].
const PIXSCALE_NUMERATOR_DEG: f64 = 0.5;

/// The bits of an observation needed to place sources in its beam and field.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationGeometry {
    pub obs_id: ObsId,
    pub start: Epoch,
    pub pointing: RADec,
    pub cenchan: i32,
    pub delays: [u32; 16],
}

impl ObservationGeometry {
    pub fn from_observation(obs: &Observation) -> Result<ObservationGeometry, ApparentFluxError> {
        let missing = |field: &'static str| ApparentFluxError::IncompleteObservation {
            obs_id: obs.obs_id,
            field,
        };
        let starttime = obs.starttime.ok_or_else(|| missing("starttime"))?;
        let ra = obs.ra_pointing.ok_or_else(|| missing("ra_pointing"))?;
        let dec = obs.dec_pointing.ok_or_else(|| missing("dec_pointing"))?;
        let cenchan = obs.cenchan.ok_or_else(|| missing("cenchan"))?;
        let delays_json = obs.delays.as_deref().ok_or_else(|| missing("delays"))?;
        let delays = parse_delays(delays_json).ok_or_else(|| ApparentFluxError::BadDelays {
            obs_id: obs.obs_id,
            delays: delays_json.to_string(),
        })?;

        Ok(ObservationGeometry {
            obs_id: obs.obs_id,
            start: Epoch::from_gpst_seconds(starttime as f64),
            pointing: RADec::from_degrees(ra, dec),
            cenchan,
            delays,
        })
    }

    pub fn freq_hz(&self) -> f64 {
        COARSE_CHAN_WIDTH_HZ * f64::from(self.cenchan)
    }
}

/// Delays are stored as a JSON array of 16 integers.
fn parse_delays(s: &str) -> Option<[u32; 16]> {
    let v: Vec<u32> = serde_json::from_str(s).ok()?;
    <[u32; 16]>::try_from(v).ok()
}

/// How bright `source` appears at `freq_hz` through a beam with XX and YY
/// power `power`. Spectral curvature is ignored. A NaN (e.g. from a beam
/// that couldn't be evaluated) becomes 0.
pub fn apparent_flux(source: &Source, freq_hz: f64, power: [f64; 2]) -> f64 {
    let [xx, yy] = power;
    let flux = source.flux * (freq_hz / REFERENCE_FREQ_HZ).powf(source.alpha) * (xx + yy) / 2.0;
    if flux.is_nan() {
        0.0
    } else {
        flux
    }
}

/// Does `source` land strictly inside the nominal 8000x8000 SIN-projected
/// image centred on `pointing`? Positions on the far side of the sky never
/// do.
pub fn in_field_of_view(pointing: RADec, cenchan: i32, source: RADec) -> bool {
    let d_ra = source.ra - pointing.ra;
    let (s_dec, c_dec) = source.dec.sin_cos();
    let (s_dec0, c_dec0) = pointing.dec.sin_cos();
    let (s_dra, c_dra) = d_ra.sin_cos();

    let n = s_dec * s_dec0 + c_dec * c_dec0 * c_dra;
    if n <= 0.0 {
        return false;
    }
    let l = c_dec * s_dra;
    let m = s_dec * c_dec0 - c_dec * s_dec0 * c_dra;

    let pixscale = PIXSCALE_NUMERATOR_DEG / f64::from(cenchan);
    // 0-based pixel coordinates; RA increases to the left.
    let x = (IMAGE_CRPIX - 1.0) + l.to_degrees() / -pixscale;
    let y = (IMAGE_CRPIX - 1.0) + m.to_degrees() / pixscale;
    trace!("pixel coordinates ({x:.1}, {y:.1})");
    0.0 < x && x < IMAGE_SIZE_PIX && 0.0 < y && y < IMAGE_SIZE_PIX
}

/// Work out the apparent flux of every source in an observation.
pub fn compute_apparent_fluxes(
    geometry: &ObservationGeometry,
    sources: &[Source],
    beam: &dyn Beam,
) -> Result<Vec<ApparentFlux>, BeamError> {
    let freq_hz = geometry.freq_hz();
    sources
        .iter()
        .map(|source| {
            let radec = RADec::from_degrees(source.ra_deg, source.dec_deg);
            let power =
                beam_power_at_radec(beam, radec, geometry.start, freq_hz, &geometry.delays)?;
            let appflux = apparent_flux(source, freq_hz, power);
            let infov = in_field_of_view(geometry.pointing, geometry.cenchan, radec);
            debug!(
                "{} {}: {appflux:.3} Jy, in field: {infov}",
                geometry.obs_id, source.name
            );
            Ok(ApparentFlux {
                obs_id: geometry.obs_id,
                source: source.name.clone(),
                appflux,
                infov,
            })
        })
        .collect()
}

/// What [`Registry::insert_sources_for_obsid`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUpdate {
    /// Rows already existed and weren't forced to be recomputed.
    AlreadyPresent,
    /// This many rows were written.
    Inserted(usize),
}

impl Registry {
    /// Are there any apparent fluxes for this observation?
    pub fn check_for_obsid(&mut self, obs_id: ObsId) -> Result<bool, DbError> {
        let count: i64 = with_conn!(self, |conn| calapparent::table
            .filter(calapparent::obs_id.eq(obs_id))
            .count()
            .get_result(conn)?);
        Ok(count > 0)
    }

    /// The cached apparent fluxes of an observation, ordered by source name.
    pub fn apparent_fluxes(&mut self, obs_id: ObsId) -> Result<Vec<ApparentFlux>, DbError> {
        let rows = with_conn!(self, |conn| calapparent::table
            .filter(calapparent::obs_id.eq(obs_id))
            .order(calapparent::source.asc())
            .select(ApparentFlux::as_select())
            .load(conn)?);
        Ok(rows)
    }

    /// Write apparent fluxes, replacing any existing rows with the same
    /// observation and source.
    pub fn upsert_apparent_fluxes(&mut self, rows: &[ApparentFlux]) -> Result<usize, DbError> {
        for row in rows {
            with_conn!(self, |conn| diesel::replace_into(calapparent::table)
                .values(row)
                .execute(conn)?);
        }
        Ok(rows.len())
    }

    /// Fill the apparent-flux cache for an observation, unless it's already
    /// there and `force_update` isn't set.
    pub fn insert_sources_for_obsid(
        &mut self,
        obs_id: ObsId,
        beam: &dyn Beam,
        force_update: bool,
    ) -> Result<CacheUpdate, ApparentFluxError> {
        if !force_update && self.check_for_obsid(obs_id)? {
            info!("{obs_id} already has apparent fluxes; skipping");
            return Ok(CacheUpdate::AlreadyPresent);
        }

        let obs = self
            .get_observation(obs_id)?
            .ok_or(ApparentFluxError::UnknownObservation(obs_id))?;
        let geometry = ObservationGeometry::from_observation(&obs)?;
        let sources = self.sources()?;
        let rows = compute_apparent_fluxes(&geometry, &sources, beam)?;
        let n = self.upsert_apparent_fluxes(&rows)?;
        info!("{obs_id}: wrote {n} apparent fluxes");
        Ok(CacheUpdate::Inserted(n))
    }
}

#[derive(Error, Debug)]
pub enum ApparentFluxError {
    #[error("Observation {0} is not in the registry")]
    UnknownObservation(ObsId),

    #[error("Observation {obs_id} has no {field}; can't work out its apparent fluxes")]
    IncompleteObservation { obs_id: ObsId, field: &'static str },

    #[error("Observation {obs_id} has delays '{delays}', which isn't a JSON list of 16 integers")]
    BadDelays { obs_id: ObsId, delays: String },

    #[error(transparent)]
    Beam(#[from] BeamError),

    #[error(transparent)]
    Db(#[from] DbError),
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use marlu::AzEl;

    use super::*;
    use crate::{
        beam::UnityBeam,
        db::tests::{observation, registry},
        sources::bright_sources,
    };

    /// Half power everywhere above the horizon.
    struct HalfBeam;

    impl Beam for HalfBeam {
        fn power(&self, azel: AzEl, _: f64, _: &[u32; 16]) -> Result<[f64; 2], BeamError> {
            Ok(if azel.el > 0.0 { [0.5, 0.5] } else { [0.0, 0.0] })
        }
    }

    /// A beam that can't be evaluated.
    struct NanBeam;

    impl Beam for NanBeam {
        fn power(&self, _: AzEl, _: f64, _: &[u32; 16]) -> Result<[f64; 2], BeamError> {
            Ok([f64::NAN, f64::NAN])
        }
    }

    fn source(flux: f64, alpha: f64) -> Source {
        Source {
            name: "Test".to_string(),
            ra_deg: 0.0,
            dec_deg: 0.0,
            flux,
            alpha,
            beta: 0.0,
        }
    }

    #[test]
    fn test_apparent_flux_formula() {
        // At the reference frequency only the beam matters.
        assert_abs_diff_eq!(apparent_flux(&source(100.0, -0.7), 150e6, [1.0, 0.5]), 75.0);
        // Spectral index.
        assert_abs_diff_eq!(
            apparent_flux(&source(100.0, -1.0), 300e6, [1.0, 1.0]),
            50.0,
            epsilon = 1e-10
        );
        // 1.28 MHz * 121 = 154.88 MHz.
        assert_abs_diff_eq!(
            apparent_flux(&source(1500.0, -0.5), 154.88e6, [0.2, 0.4]),
            1500.0 * (154.88f64 / 150.0).powf(-0.5) * 0.3,
            epsilon = 1e-10
        );
        assert_eq!(apparent_flux(&source(100.0, -1.0), 150e6, [f64::NAN, 1.0]), 0.0);
    }

    #[test]
    fn test_field_of_view() {
        let pointing = RADec::from_degrees(0.0, -27.0);
        // cenchan 121: 0.5/121 deg per pixel, so about 16.5 deg either side.
        assert!(in_field_of_view(pointing, 121, pointing));
        assert!(in_field_of_view(pointing, 121, RADec::from_degrees(10.0, -27.0)));
        assert!(in_field_of_view(pointing, 121, RADec::from_degrees(350.0, -20.0)));
        assert!(!in_field_of_view(pointing, 121, RADec::from_degrees(0.0, -45.0)));
        assert!(!in_field_of_view(pointing, 121, RADec::from_degrees(25.0, -27.0)));
        // Higher frequencies have smaller images.
        assert!(in_field_of_view(pointing, 69, RADec::from_degrees(0.0, -50.0)));
        assert!(!in_field_of_view(pointing, 169, RADec::from_degrees(0.0, -50.0)));
        // The far side of the sky.
        assert!(!in_field_of_view(pointing, 1, RADec::from_degrees(180.0, 27.0)));
    }

    #[test]
    fn test_geometry_needs_a_complete_observation() {
        let obs = observation(1234567890);
        let geometry = ObservationGeometry::from_observation(&obs).unwrap();
        assert_abs_diff_eq!(geometry.freq_hz(), 154.88e6, epsilon = 1e-3);
        assert_eq!(geometry.delays, [0; 16]);

        let mut bad = obs.clone();
        bad.cenchan = None;
        assert!(matches!(
            ObservationGeometry::from_observation(&bad),
            Err(ApparentFluxError::IncompleteObservation {
                field: "cenchan",
                ..
            })
        ));

        let mut bad = obs;
        bad.delays = Some("[0, 1, 2]".to_string());
        assert!(matches!(
            ObservationGeometry::from_observation(&bad),
            Err(ApparentFluxError::BadDelays { .. })
        ));
    }

    #[test]
    fn test_nan_power_gives_zero_flux() {
        let obs = observation(1234567890);
        let geometry = ObservationGeometry::from_observation(&obs).unwrap();
        let sources = bright_sources().unwrap();
        let rows = compute_apparent_fluxes(&geometry, &sources, &NanBeam).unwrap();
        assert_eq!(rows.len(), 7);
        assert!(rows.iter().all(|r| r.appflux == 0.0));
    }

    #[test]
    fn test_insert_sources_for_obsid() {
        let mut registry = registry();
        registry.insert_sources(&bright_sources().unwrap()).unwrap();
        registry.insert_observation(&observation(1234567890)).unwrap();

        assert!(!registry.check_for_obsid(1234567890).unwrap());
        let update = registry
            .insert_sources_for_obsid(1234567890, &HalfBeam, false)
            .unwrap();
        assert_eq!(update, CacheUpdate::Inserted(7));
        assert!(registry.check_for_obsid(1234567890).unwrap());

        let rows = registry.apparent_fluxes(1234567890).unwrap();
        assert_eq!(rows.len(), 7);
        for row in &rows {
            assert!(row.appflux >= 0.0);
            // None of the A-team is within 20 degrees of RA 0, Dec -27.
            assert!(!row.infov, "{} shouldn't be in the field", row.source);
        }
        // Something is always up.
        assert!(rows.iter().any(|r| r.appflux > 0.0));

        // Not forced, so nothing is recomputed.
        let update = registry
            .insert_sources_for_obsid(1234567890, &UnityBeam, false)
            .unwrap();
        assert_eq!(update, CacheUpdate::AlreadyPresent);
        assert_eq!(registry.apparent_fluxes(1234567890).unwrap(), rows);

        // Forced, the rows are replaced, not duplicated.
        let update = registry
            .insert_sources_for_obsid(1234567890, &UnityBeam, true)
            .unwrap();
        assert_eq!(update, CacheUpdate::Inserted(7));
        let new_rows = registry.apparent_fluxes(1234567890).unwrap();
        assert_eq!(new_rows.len(), 7);
        for (old, new) in rows.iter().zip(new_rows.iter()) {
            assert_eq!(old.source, new.source);
            assert_abs_diff_eq!(new.appflux, old.appflux * 2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_insert_sources_for_unknown_obsid() {
        let mut registry = registry();
        assert!(matches!(
            registry.insert_sources_for_obsid(1, &UnityBeam, false),
            Err(ApparentFluxError::UnknownObservation(1))
        ));
    }

    #[test]
    fn test_orphan_apparent_flux_is_rejected() {
        let mut registry = registry();
        registry.insert_sources(&bright_sources().unwrap()).unwrap();
        let row = ApparentFlux {
            obs_id: 1234567890,
            source: "CasA".to_string(),
            appflux: 1.0,
            infov: false,
        };
        assert!(registry.upsert_apparent_fluxes(&[row.clone()]).is_err());

        registry.insert_observation(&observation(1234567890)).unwrap();
        let unknown_source = ApparentFlux {
            source: "3C444".to_string(),
            ..row.clone()
        };
        assert!(registry.upsert_apparent_fluxes(&[unknown_source]).is_err());
        assert_eq!(registry.upsert_apparent_fluxes(&[row]).unwrap(), 1);
    }
}
