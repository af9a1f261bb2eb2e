//! Errors associated with the registry database.

use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Couldn't connect to the database at {target}: {source}")]
    Connect {
        target: String,
        source: diesel::ConnectionError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database query failed: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("The configuration asks for a MySQL database, but MySQL support was not enabled when this program was compiled (enable the \"mysql\" feature)")]
    MysqlNotCompiled,
}
