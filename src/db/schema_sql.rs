//! `CREATE TABLE` statements for each supported SQL dialect.

/// Tables in the order they must be created (foreign keys point backwards).
pub(super) const TABLE_NAMES: [&str; 5] =
    ["observation", "processing", "sources", "calapparent", "mosaic"];

const OBSERVATION: &str = "
CREATE TABLE observation
(
obs_id BIGINT PRIMARY KEY,
projectid TEXT,
lst_deg DOUBLE,
starttime BIGINT,
duration_sec INT,
obsname TEXT,
creator TEXT,
azimuth_pointing DOUBLE,
elevation_pointing DOUBLE,
ra_pointing DOUBLE,
dec_pointing DOUBLE,
cenchan INT,
freq_res DOUBLE,
int_time DOUBLE,
delays TEXT,
calibration BOOL,
cal_obs_id BIGINT,
calibrators TEXT,
peelsrcs TEXT,
flags TEXT,
selfcal BOOL,
ion_phs_med INT,
ion_phs_peak INT,
ion_phs_std INT,
archived BOOL,
nfiles INT,
status TEXT,
FOREIGN KEY(cal_obs_id) REFERENCES observation(obs_id)
)";

const PROCESSING: &str = "
CREATE TABLE processing
(
job_id BIGINT,
task_id BIGINT,
host_cluster VARCHAR(255),
submission_time BIGINT,
task TEXT,
user TEXT,
start_time BIGINT,
end_time BIGINT,
obs_id BIGINT,
status TEXT,
batch_file TEXT,
stderr TEXT,
stdout TEXT,
output_files TEXT,
FOREIGN KEY(obs_id) REFERENCES observation(obs_id),
CONSTRAINT job_task_id PRIMARY KEY (job_id,task_id,host_cluster)
)";

const SOURCES: &str = "
CREATE TABLE sources
(
source VARCHAR(255) NOT NULL,
RAJ2000 DOUBLE NOT NULL,
DecJ2000 DOUBLE NOT NULL,
flux DOUBLE NOT NULL,
alpha DOUBLE NOT NULL,
beta DOUBLE NOT NULL,
PRIMARY KEY (source)
)";

const CALAPPARENT: &str = "
CREATE TABLE calapparent
(
obs_id BIGINT NOT NULL,
source VARCHAR(255) NOT NULL,
appflux DOUBLE NOT NULL,
infov BOOL NOT NULL,
FOREIGN KEY(obs_id) REFERENCES observation(obs_id),
FOREIGN KEY(source) REFERENCES sources(source),
CONSTRAINT obs_src PRIMARY KEY (obs_id,source)
)";

const MOSAIC_MYSQL: &str = "
CREATE TABLE mosaic
(
mos_id INT AUTO_INCREMENT PRIMARY KEY,
obs_id BIGINT,
job_id BIGINT,
task_id BIGINT,
host_cluster VARCHAR(255),
user TEXT,
subband TEXT,
status TEXT,
submission_time BIGINT,
start_time BIGINT,
end_time BIGINT,
FOREIGN KEY(obs_id) REFERENCES observation(obs_id)
)";

// SQLite only auto-increments an "INTEGER PRIMARY KEY" column.
const MOSAIC_SQLITE: &str = "
CREATE TABLE mosaic
(
mos_id INTEGER PRIMARY KEY AUTOINCREMENT,
obs_id BIGINT,
job_id BIGINT,
task_id BIGINT,
host_cluster VARCHAR(255),
user TEXT,
subband TEXT,
status TEXT,
submission_time BIGINT,
start_time BIGINT,
end_time BIGINT,
FOREIGN KEY(obs_id) REFERENCES observation(obs_id)
)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Dialect {
    Sqlite,
    #[cfg_attr(not(feature = "mysql"), allow(dead_code))]
    Mysql,
}

pub(super) fn create_statements(dialect: Dialect) -> [&'static str; 5] {
    let mosaic = match dialect {
        Dialect::Sqlite => MOSAIC_SQLITE,
        Dialect::Mysql => MOSAIC_MYSQL,
    };
    [OBSERVATION, PROCESSING, SOURCES, CALAPPARENT, mosaic]
}
