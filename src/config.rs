//! Database and tracking configuration.
//!
//! The database to talk to is resolved once, at process start, into a
//! [`DbConfig`]. In order of precedence it comes from:
//!
//! 1. a TOML file given on the command line;
//! 2. a TOML file named by `GXDBCONFIG`;
//! 3. the `GXDBHOST`, `GXDBPORT`, `GXDBUSER` and `GXDBPASS` variables (MySQL);
//! 4. the `GXDBFILE` variable (SQLite).
//!
//! A configuration file looks like
//!
//! ```toml
//! [database]
//! backend = "mysql"
//! host = "localhost"
//! port = 3306
//! user = "gleam"
//! password = "secret"
//! ```
//!
//! or, for a local SQLite file,
//!
//! ```toml
//! [database]
//! backend = "sqlite"
//! path = "GLEAM-X.sqlite"
//! ```

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::db::DB_NAME;

const DEFAULT_MYSQL_PORT: u16 = 3306;

/// Where the registry lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum DbConfig {
    Mysql(MysqlConfig),

    Sqlite {
        /// The database file. `:memory:` gives a private in-memory database.
        path: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MysqlConfig {
    pub host: String,

    #[serde(default = "default_mysql_port")]
    pub port: u16,

    pub user: String,

    pub password: String,

    /// The database (schema) holding the GLEAM-X tables.
    #[serde(default = "default_database")]
    pub database: String,
}

fn default_mysql_port() -> u16 {
    DEFAULT_MYSQL_PORT
}

fn default_database() -> String {
    DB_NAME.to_string()
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    database: DbConfig,
}

impl MysqlConfig {
    /// The connection URL, with the user and password escaped. If
    /// `with_database` is false, the URL points at the server only, which is
    /// needed to create the database in the first place.
    pub fn url(&self, with_database: bool) -> Result<String, ConfigError> {
        let bad_host = || ConfigError::BadHost {
            host: self.host.clone(),
        };
        let mut url = Url::parse("mysql://localhost").map_err(|_| bad_host())?;
        url.set_host(Some(&self.host)).map_err(|_| bad_host())?;
        url.set_port(Some(self.port)).map_err(|_| bad_host())?;
        url.set_username(&self.user).map_err(|_| bad_host())?;
        url.set_password(Some(&self.password))
            .map_err(|_| bad_host())?;
        if with_database {
            url.set_path(&self.database);
        }
        Ok(url.into())
    }
}

impl DbConfig {
    /// A private, in-memory SQLite database. Handy for tests and dry runs.
    pub fn in_memory() -> DbConfig {
        DbConfig::Sqlite {
            path: PathBuf::from(":memory:"),
        }
    }

    /// Read the `[database]` table of a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<DbConfig, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(file.database)
    }

    /// Resolve the configuration from the process environment, preferring
    /// `explicit_file` if one was given.
    pub fn resolve(explicit_file: Option<&Path>) -> Result<DbConfig, ConfigError> {
        Self::resolve_with(explicit_file, |key| std::env::var(key).ok())
    }

    /// As [`DbConfig::resolve`], but with the variables supplied by `var`.
    pub fn resolve_with<F>(explicit_file: Option<&Path>, var: F) -> Result<DbConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(file) = explicit_file {
            debug!("Reading database configuration from {}", file.display());
            return Self::from_file(file);
        }
        if let Some(file) = var("GXDBCONFIG") {
            debug!("Reading database configuration from GXDBCONFIG={file}");
            return Self::from_file(file);
        }
        Self::from_vars(var)
    }

    /// Build a configuration purely from `GXDB*` variables.
    pub fn from_vars<F>(var: F) -> Result<DbConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("GXDBHOST") {
            let port = match var("GXDBPORT") {
                Some(p) => p
                    .trim()
                    .parse()
                    .map_err(|_| ConfigError::BadPort { value: p.clone() })?,
                None => DEFAULT_MYSQL_PORT,
            };
            let user = var("GXDBUSER").ok_or(ConfigError::MissingVar("GXDBUSER"))?;
            let password = var("GXDBPASS").ok_or(ConfigError::MissingVar("GXDBPASS"))?;
            return Ok(DbConfig::Mysql(MysqlConfig {
                host,
                port,
                user,
                password,
                database: default_database(),
            }));
        }

        if let Some(path) = var("GXDBFILE") {
            return Ok(DbConfig::Sqlite {
                path: PathBuf::from(path),
            });
        }

        Err(ConfigError::NotConfigured)
    }

    /// A description safe to print (no password).
    pub fn describe(&self) -> String {
        match self {
            DbConfig::Mysql(m) => {
                format!("mysql://{}@{}:{}/{}", m.user, m.host, m.port, m.database)
            }
            DbConfig::Sqlite { path } => format!("sqlite:{}", path.display()),
        }
    }
}

/// Who is submitting jobs, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingIdentity {
    pub user: Option<String>,
    pub host_cluster: Option<String>,
}

impl TrackingIdentity {
    pub fn from_env() -> TrackingIdentity {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// The user is `GXUSER` (falling back to `USER`) and the cluster is
    /// `GXCLUSTER` (falling back to `HOST_CLUSTER`, then `HOST`).
    pub fn from_vars<F>(var: F) -> TrackingIdentity
    where
        F: Fn(&str) -> Option<String>,
    {
        TrackingIdentity {
            user: var("GXUSER").or_else(|| var("USER")),
            host_cluster: var("GXCLUSTER")
                .or_else(|| var("HOST_CLUSTER"))
                .or_else(|| var("HOST")),
        }
    }
}

/// Task tracking only happens when `GXTRACK` is exactly "track".
pub fn tracking_enabled<F>(var: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    matches!(var("GXTRACK").as_deref(), Some("track"))
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No database connection configuration detected. Set GXDBCONFIG to a configuration file, or set the GXDBHOST, GXDBPORT, GXDBUSER and GXDBPASS (or GXDBFILE) environment variables")]
    NotConfigured,

    #[error("GXDBHOST is set, but {0} is not")]
    MissingVar(&'static str),

    #[error("'{host}' is not a valid database host")]
    BadHost { host: String },

    #[error("GXDBPORT '{value}' is not a valid port number")]
    BadPort { value: String },

    #[error("Couldn't read database configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't parse database configuration file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
