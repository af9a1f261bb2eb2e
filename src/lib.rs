//! Support code for the GLEAM-X pipeline: the job-tracking registry and the
//! small utilities that feed it.

pub mod apparent;
pub mod beam;
pub mod config;
pub mod db;
mod error;
mod fits;
pub mod logging;
pub mod metadata;
pub mod metafits;
pub mod obsids;
pub mod pool;
pub mod sources;
pub mod track;

pub use config::{DbConfig, MysqlConfig, TrackingIdentity};
pub use db::{connect, make_db, DbError, Registry};
pub use error::GleamXError;
pub use logging::setup_logging;
pub use track::{ObsStatus, TaskKey, TaskStatus};

/// The MWA obsid, which is also the GPS time of the start of the observation
/// \[seconds\].
pub type ObsId = i64;

/// Frequency width of an MWA coarse channel \[Hz\]. A coarse channel number
/// multiplied by this gives its centre frequency.
pub const COARSE_CHAN_WIDTH_HZ: f64 = 1.28e6;
