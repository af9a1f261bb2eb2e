//! Error type for everything the binaries can report. Library functions return
//! their module's own error; this enum only gathers them up.

use thiserror::Error;

use crate::{
    apparent::ApparentFluxError, beam::BeamError, config::ConfigError, db::DbError,
    metadata::MetadataError, metafits::MetafitsError, obsids::ObsidsError,
    sources::SexagesimalError, track::TrackError,
};

#[derive(Error, Debug)]
pub enum GleamXError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Db(#[from] DbError),

    #[error("{0}")]
    Track(#[from] TrackError),

    #[error("{0}")]
    ApparentFlux(#[from] ApparentFluxError),

    #[error("{0}")]
    Beam(#[from] BeamError),

    #[error("{0}")]
    Metafits(#[from] MetafitsError),

    #[error("{0}")]
    Metadata(#[from] MetadataError),

    #[error("{0}")]
    Obsids(#[from] ObsidsError),

    #[error("{0}")]
    Sexagesimal(#[from] SexagesimalError),

    #[error("Couldn't build the worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// Some items handed to a worker pool failed. The individual failures
    /// have already been reported.
    #[error("{failed} of {total} observations failed")]
    PartialFailure { failed: usize, total: usize },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
