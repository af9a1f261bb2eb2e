//! The bright-source catalogue.
//!
//! Only a handful of very bright radio sources ("A-team") matter to the
//! pipeline: they are either the calibrators or the things that need to be
//! peeled out of the field. Their positions are kept as sexagesimal strings
//! so they are easy to check against the literature.

use diesel::prelude::*;
use log::{debug, info};
use thiserror::Error;

use crate::db::{models::Source, schema::sources, with_conn, DbConnection, DbError, Registry};

/// Name, J2000 RA ("HH:MM:SS.s"), J2000 Dec ("+DD:MM:SS.s"), flux density at
/// 150 MHz \[Jy\], spectral index.
const BRIGHT_SOURCES: [(&str, &str, &str, f64, f64); 7] = [
    ("CasA", "23:23:24.000", "+58:48:54.00", 13000.0, -0.5),
    ("CygA", "19:59:28.35663", "+40:44:02.0970", 9000.0, -1.0),
    ("Crab", "05:34:31.94", "+22:00:52.2", 1500.0, -0.5),
    ("VirA", "12:30:49.42338", "+12:23:28.0439", 1200.0, -1.0),
    ("PicA", "05:19:49.7229", "-45:46:43.853", 570.0, -1.0),
    ("HerA", "16:51:11.4", "+04:59:20", 520.0, -1.1),
    ("HydA", "09:18:05.651", "-12:05:43.99", 350.0, -0.9),
];

/// Split a colon-delimited sexagesimal string into its sign and three
/// (unsigned) fields. The sign is taken from the string, so "-00:30:00" is
/// correctly negative.
fn split_colons(s: &str) -> Result<(f64, [f64; 3]), SexagesimalError> {
    let trimmed = s.trim();
    let (sign, unsigned) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };

    let mut fields = [0.0; 3];
    let mut count = 0;
    for elem in unsigned.split(':') {
        if count == 3 {
            return Err(SexagesimalError::WrongFieldCount(s.to_string()));
        }
        fields[count] = elem
            .parse()
            .map_err(|_| SexagesimalError::NotANumber(s.to_string()))?;
        count += 1;
    }
    if count != 3 {
        return Err(SexagesimalError::WrongFieldCount(s.to_string()));
    }
    Ok((sign, fields))
}

/// Convert "HH:MM:SS.s" to degrees.
pub fn hms_to_degrees(hms: &str) -> Result<f64, SexagesimalError> {
    let (sign, [h, m, s]) = split_colons(hms)?;
    Ok(sign * 15.0 * (h + m / 60.0 + s / 3600.0))
}

/// Convert "[+-]DD:MM:SS.s" to degrees.
pub fn dms_to_degrees(dms: &str) -> Result<f64, SexagesimalError> {
    let (sign, [d, m, s]) = split_colons(dms)?;
    Ok(sign * (d + m / 60.0 + s / 3600.0))
}

/// The bright-source catalogue with positions in degrees.
pub fn bright_sources() -> Result<Vec<Source>, SexagesimalError> {
    BRIGHT_SOURCES
        .iter()
        .map(|&(name, ra, dec, flux, alpha)| {
            Ok(Source {
                name: name.to_string(),
                ra_deg: hms_to_degrees(ra)?,
                dec_deg: dms_to_degrees(dec)?,
                flux,
                alpha,
                beta: 0.0,
            })
        })
        .collect()
}

impl Registry {
    /// Add sources to the catalogue. A source that is already there gets its
    /// position, flux and spectral shape overwritten in place, so rows that
    /// refer to it (e.g. apparent fluxes) survive. Returns the number of
    /// sources written.
    pub fn insert_sources(&mut self, new: &[Source]) -> Result<usize, DbError> {
        for source in new {
            debug!("Writing source {}", source.name);
            let changes = (
                sources::ra_j2000.eq(source.ra_deg),
                sources::dec_j2000.eq(source.dec_deg),
                sources::flux.eq(source.flux),
                sources::alpha.eq(source.alpha),
                sources::beta.eq(source.beta),
            );
            // The conflict clause differs between backends, so no with_conn!.
            match &mut self.conn {
                DbConnection::Sqlite(conn) => diesel::insert_into(sources::table)
                    .values(source)
                    .on_conflict(sources::source)
                    .do_update()
                    .set(changes)
                    .execute(conn)?,

                #[cfg(feature = "mysql")]
                DbConnection::Mysql(conn) => diesel::insert_into(sources::table)
                    .values(source)
                    .on_conflict(diesel::dsl::DuplicatedKeys)
                    .do_update()
                    .set(changes)
                    .execute(conn)?,
            };
        }
        info!("Wrote {} sources", new.len());
        Ok(new.len())
    }

    /// Every source in the catalogue, ordered by name.
    pub fn sources(&mut self) -> Result<Vec<Source>, DbError> {
        let all = with_conn!(self, |conn| sources::table
            .select(Source::as_select())
            .order(sources::source.asc())
            .load(conn)?);
        Ok(all)
    }
}

#[derive(Error, Debug)]
pub enum SexagesimalError {
    #[error("Sexagesimal '{0}' doesn't have three colon-separated fields")]
    WrongFieldCount(String),

    #[error("Sexagesimal '{0}' contains something that isn't a number")]
    NotANumber(String),
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::{
        beam::UnityBeam,
        db::tests::{observation, registry},
    };

    #[test]
    fn test_hms() {
        assert_abs_diff_eq!(hms_to_degrees("05:34:31.94").unwrap(), 83.633083, epsilon = 1e-6);
        assert_abs_diff_eq!(hms_to_degrees("23:23:24.000").unwrap(), 350.85, epsilon = 1e-9);
        assert_abs_diff_eq!(hms_to_degrees("00:00:00").unwrap(), 0.0);
    }

    #[test]
    fn test_dms() {
        assert_abs_diff_eq!(dms_to_degrees("+22:00:52.2").unwrap(), 22.0145, epsilon = 1e-9);
        assert_abs_diff_eq!(
            dms_to_degrees("-45:46:43.853").unwrap(),
            -45.778848,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(dms_to_degrees("-00:30:00").unwrap(), -0.5);
        assert_abs_diff_eq!(dms_to_degrees("04:59:20").unwrap(), 4.988889, epsilon = 1e-6);
    }

    #[test]
    fn test_bad_sexagesimal() {
        assert!(matches!(
            dms_to_degrees("12:30"),
            Err(SexagesimalError::WrongFieldCount(_))
        ));
        assert!(matches!(
            dms_to_degrees("12:30:00:00"),
            Err(SexagesimalError::WrongFieldCount(_))
        ));
        assert!(matches!(
            hms_to_degrees("12:3O:00"),
            Err(SexagesimalError::NotANumber(_))
        ));
    }

    #[test]
    fn test_bright_sources() {
        let sources = bright_sources().unwrap();
        assert_eq!(sources.len(), 7);
        let hyda = sources.iter().find(|s| s.name == "HydA").unwrap();
        assert_abs_diff_eq!(hyda.ra_deg, 139.523546, epsilon = 1e-6);
        assert_abs_diff_eq!(hyda.dec_deg, -12.095553, epsilon = 1e-6);
        assert_abs_diff_eq!(hyda.flux, 350.0);
        assert_abs_diff_eq!(hyda.alpha, -0.9);
        assert!(sources.iter().all(|s| s.beta == 0.0));
    }

    #[test]
    fn test_populate_is_rerunnable() {
        let mut registry = registry();
        let sources = bright_sources().unwrap();
        assert_eq!(registry.insert_sources(&sources).unwrap(), 7);
        assert_eq!(registry.insert_sources(&sources).unwrap(), 7);

        let stored = registry.sources().unwrap();
        let names: Vec<&str> = stored.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            ["CasA", "Crab", "CygA", "HerA", "HydA", "PicA", "VirA"]
        );
        let casa = &stored[0];
        assert_abs_diff_eq!(casa.dec_deg, 58.815, epsilon = 1e-9);
    }

    #[test]
    fn test_repopulate_updates_values_and_keeps_apparent_fluxes() {
        let mut registry = registry();
        let mut sources = bright_sources().unwrap();
        registry.insert_sources(&sources).unwrap();
        registry.insert_observation(&observation(1090008640)).unwrap();
        registry
            .insert_sources_for_obsid(1090008640, &UnityBeam, false)
            .unwrap();
        assert_eq!(registry.apparent_fluxes(1090008640).unwrap().len(), 7);

        let casa = sources.iter_mut().find(|s| s.name == "CasA").unwrap();
        casa.flux = 1.0;
        casa.alpha = -0.7;
        registry.insert_sources(&sources).unwrap();

        let stored = registry.sources().unwrap();
        assert_eq!(stored.len(), 7);
        let casa = stored.iter().find(|s| s.name == "CasA").unwrap();
        assert_abs_diff_eq!(casa.flux, 1.0);
        assert_abs_diff_eq!(casa.alpha, -0.7);
        let cyga = stored.iter().find(|s| s.name == "CygA").unwrap();
        assert_abs_diff_eq!(cyga.flux, 9000.0);

        // The apparent fluxes that refer to the sources are still there.
        assert_eq!(registry.apparent_fluxes(1090008640).unwrap().len(), 7);
    }
}
