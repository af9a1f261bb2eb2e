//! The GLEAM-X registry database.
//!
//! A [`Registry`] wraps one live connection to either SQLite or (with the
//! "mysql" feature) MySQL. All queries are written once with diesel's query
//! builder and dispatched to the concrete connection with [`with_conn`].

mod error;
pub mod models;
pub mod schema;
mod schema_sql;

pub use error::DbError;
pub use models::{ApparentFlux, MosaicTask, Observation, ProcessingTask, Source};

use diesel::{connection::SimpleConnection, prelude::*, sqlite::SqliteConnection};
use log::{debug, info, trace};

use crate::{config::DbConfig, ObsId};
use schema::observation;
use schema_sql::{create_statements, Dialect, TABLE_NAMES};

#[cfg(feature = "mysql")]
use diesel::mysql::MysqlConnection;

/// The name of the database holding the GLEAM-X tables on a MySQL server.
pub const DB_NAME: &str = "gleam_x";

/// How long a SQLite connection waits on a lock held by another process
/// before giving up \[milliseconds\].
const SQLITE_BUSY_TIMEOUT_MS: u32 = 10_000;

pub(crate) enum DbConnection {
    Sqlite(SqliteConnection),

    #[cfg(feature = "mysql")]
    Mysql(MysqlConnection),
}

/// A connection to the registry.
pub struct Registry {
    pub(crate) conn: DbConnection,
}

/// Run `$body` with `$conn` bound to the registry's concrete diesel
/// connection.
macro_rules! with_conn {
    ($registry:expr, |$conn:ident| $body:expr) => {
        match &mut $registry.conn {
            $crate::db::DbConnection::Sqlite($conn) => $body,
            #[cfg(feature = "mysql")]
            $crate::db::DbConnection::Mysql($conn) => $body,
        }
    };
}
pub(crate) use with_conn;

/// Open a connection to the registry described by `config`. Nothing is
/// retried; a failure here should abort the calling process.
pub fn connect(config: &DbConfig) -> Result<Registry, DbError> {
    match config {
        DbConfig::Sqlite { path } => {
            let target = path.display().to_string();
            debug!("Opening SQLite database {target}");
            let mut conn = SqliteConnection::establish(&target)
                .map_err(|source| DbError::Connect { target, source })?;
            // Foreign keys are off by default in SQLite.
            conn.batch_execute(&format!(
                "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {SQLITE_BUSY_TIMEOUT_MS};"
            ))?;
            Ok(Registry {
                conn: DbConnection::Sqlite(conn),
            })
        }

        #[cfg(feature = "mysql")]
        DbConfig::Mysql(mysql) => {
            debug!("Connecting to {}", config.describe());
            let conn = MysqlConnection::establish(&mysql.url(true)?).map_err(|source| {
                DbError::Connect {
                    target: config.describe(),
                    source,
                }
            })?;
            Ok(Registry {
                conn: DbConnection::Mysql(conn),
            })
        }

        #[cfg(not(feature = "mysql"))]
        DbConfig::Mysql(_) => Err(DbError::MysqlNotCompiled),
    }
}

/// Create the registry's tables (and, on MySQL, the database itself). If
/// `drop_existing` is set, anything already there is dropped first.
///
/// The returned [`Registry`] is connected to the new tables.
pub fn make_db(config: &DbConfig, drop_existing: bool) -> Result<Registry, DbError> {
    match config {
        DbConfig::Sqlite { .. } => {
            let mut registry = connect(config)?;
            if drop_existing {
                for table in TABLE_NAMES.iter().rev() {
                    info!("Dropping table {table}");
                    with_conn!(registry, |conn| conn
                        .batch_execute(&format!("DROP TABLE IF EXISTS {table}"))?);
                }
            }
            registry.create_tables(Dialect::Sqlite)?;
            Ok(registry)
        }

        #[cfg(feature = "mysql")]
        DbConfig::Mysql(mysql) => {
            let mut conn = MysqlConnection::establish(&mysql.url(false)?).map_err(|source| {
                DbError::Connect {
                    target: config.describe(),
                    source,
                }
            })?;
            if drop_existing {
                info!("Dropping database {}", mysql.database);
                conn.batch_execute(&format!("DROP DATABASE IF EXISTS {}", mysql.database))?;
            }
            conn.batch_execute(&format!("CREATE DATABASE {}", mysql.database))?;
            conn.batch_execute(&format!("USE {}", mysql.database))?;
            let mut registry = Registry {
                conn: DbConnection::Mysql(conn),
            };
            registry.create_tables(Dialect::Mysql)?;
            Ok(registry)
        }

        #[cfg(not(feature = "mysql"))]
        DbConfig::Mysql(_) => Err(DbError::MysqlNotCompiled),
    }
}

impl Registry {
    fn create_tables(&mut self, dialect: Dialect) -> Result<(), DbError> {
        for statement in create_statements(dialect) {
            debug!("{};", statement.trim());
            with_conn!(self, |conn| conn.batch_execute(statement)?);
        }
        Ok(())
    }

    /// Add a new observation.
    pub fn insert_observation(&mut self, obs: &Observation) -> Result<(), DbError> {
        trace!("Inserting observation {}", obs.obs_id);
        with_conn!(self, |conn| diesel::insert_into(observation::table)
            .values(obs)
            .execute(conn)?);
        Ok(())
    }

    pub fn get_observation(&mut self, obs_id: ObsId) -> Result<Option<Observation>, DbError> {
        let obs = with_conn!(self, |conn| observation::table
            .find(obs_id)
            .select(Observation::as_select())
            .first(conn)
            .optional()?);
        Ok(obs)
    }

    pub fn observation_exists(&mut self, obs_id: ObsId) -> Result<bool, DbError> {
        let count: i64 = with_conn!(self, |conn| observation::table
            .filter(observation::obs_id.eq(obs_id))
            .count()
            .get_result(conn)?);
        Ok(count > 0)
    }

    /// All of the obsids in the registry, ascending.
    pub fn observation_ids(&mut self) -> Result<Vec<ObsId>, DbError> {
        let ids = with_conn!(self, |conn| observation::table
            .select(observation::obs_id)
            .order(observation::obs_id.asc())
            .load(conn)?);
        Ok(ids)
    }
}
