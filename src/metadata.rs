//! Observation metadata from the MWA metadata web service.

use std::{collections::HashMap, thread::sleep, time::Duration};

use log::{debug, info, warn};
use serde::Deserialize;
use thiserror::Error;

use crate::{
    db::{models::Observation, DbError, Registry},
    track::ObsStatus,
    ObsId,
};

/// Append the service name to this base URL, e.g. "obs".
pub const BASE_URL: &str = "http://ws.mwatelescope.org/metadata";

const NUM_RETRIES: u32 = 3;
const RETRY_PAUSE: Duration = Duration::from_secs(3);
const TIMEOUT: Duration = Duration::from_secs(10);

/// The index of the centre coarse channel in an rfstream's 24 channels.
const CENTRE_CHANNEL_INDEX: usize = 12;

/// The parts of the "obs" service's response that go into the registry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObsMetadata {
    pub projectid: Option<String>,
    pub starttime: i64,
    pub stoptime: i64,
    pub obsname: Option<String>,
    pub creator: Option<String>,
    pub metadata: PointingMetadata,
    pub rfstreams: HashMap<String, RfStream>,
    pub freq_res: Option<f64>,
    pub int_time: Option<f64>,
    #[serde(default)]
    pub files: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PointingMetadata {
    pub local_sidereal_time_deg: Option<f64>,
    pub azimuth_pointing: Option<f64>,
    pub elevation_pointing: Option<f64>,
    pub ra_pointing: Option<f64>,
    pub dec_pointing: Option<f64>,
    pub calibration: Option<bool>,
    pub calibrators: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RfStream {
    pub frequencies: Vec<i32>,
    pub xdelays: Vec<u32>,
}

impl ObsMetadata {
    /// The registry row for this observation, ready to be ingested.
    pub fn to_observation(&self, obs_id: ObsId) -> Result<Observation, MetadataError> {
        let rfstream = self
            .rfstreams
            .get("0")
            .ok_or(MetadataError::MissingField {
                obs_id,
                field: "rfstreams[\"0\"]",
            })?;
        let cenchan = rfstream
            .frequencies
            .get(CENTRE_CHANNEL_INDEX)
            .copied()
            .ok_or(MetadataError::MissingField {
                obs_id,
                field: "rfstreams[\"0\"].frequencies[12]",
            })?;
        // A Vec<u32> always serialises.
        let delays = serde_json::to_string(&rfstream.xdelays).map_err(MetadataError::Json)?;
        let status: &'static str = ObsStatus::Unprocessed.into();

        Ok(Observation {
            obs_id,
            projectid: self.projectid.clone(),
            lst_deg: self.metadata.local_sidereal_time_deg,
            starttime: Some(self.starttime),
            duration_sec: Some((self.stoptime - self.starttime) as i32),
            obsname: self.obsname.clone(),
            creator: self.creator.clone(),
            azimuth_pointing: self.metadata.azimuth_pointing,
            elevation_pointing: self.metadata.elevation_pointing,
            ra_pointing: self.metadata.ra_pointing,
            dec_pointing: self.metadata.dec_pointing,
            cenchan: Some(cenchan),
            freq_res: self.freq_res,
            int_time: self.int_time,
            delays: Some(delays),
            calibration: self.metadata.calibration,
            calibrators: self.metadata.calibrators.clone(),
            nfiles: Some(self.files.len() as i32),
            archived: Some(false),
            status: Some(status.to_string()),
            ..Default::default()
        })
    }
}

/// A blocking client of the metadata web service.
pub struct MetadataClient {
    client: reqwest::blocking::Client,
    base_url: String,
    retry_pause: Duration,
}

impl MetadataClient {
    pub fn new() -> Result<MetadataClient, MetadataError> {
        Self::with_base_url(BASE_URL, RETRY_PAUSE)
    }

    pub fn with_base_url(
        base_url: &str,
        retry_pause: Duration,
    ) -> Result<MetadataClient, MetadataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(TIMEOUT)
            .build()?;
        Ok(MetadataClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry_pause,
        })
    }

    /// Query the "obs" service. Failed requests are retried a few times
    /// before giving up.
    pub fn get_obs(&self, obs_id: ObsId) -> Result<ObsMetadata, MetadataError> {
        let url = format!("{}/obs", self.base_url);
        let mut attempt = 0;
        loop {
            debug!("GET {url}?obs_id={obs_id} (attempt {})", attempt + 1);
            let result = self
                .client
                .get(&url)
                .query(&[("obs_id", obs_id)])
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.json::<ObsMetadata>());
            match result {
                Ok(meta) => return Ok(meta),
                Err(e) if attempt < NUM_RETRIES && !e.is_decode() => {
                    warn!("Metadata request for {obs_id} failed ({e}). Retrying...");
                    attempt += 1;
                    sleep(self.retry_pause);
                }
                Err(e) => return Err(MetadataError::Http(e)),
            }
        }
    }
}

/// What [`import_observation`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportOutcome {
    AlreadyImported,
    Imported,
}

/// Add an observation to the registry using the web service, unless it's
/// already there.
pub fn import_observation(
    registry: &mut Registry,
    client: &MetadataClient,
    obs_id: ObsId,
) -> Result<ImportOutcome, MetadataError> {
    if registry.observation_exists(obs_id)? {
        info!("Obsid `{obs_id}` is already imported.");
        return Ok(ImportOutcome::AlreadyImported);
    }
    let meta = client.get_obs(obs_id)?;
    registry.insert_observation(&meta.to_observation(obs_id)?)?;
    info!("Imported {obs_id}");
    Ok(ImportOutcome::Imported)
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Metadata web service request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Metadata for {obs_id} has no {field}")]
    MissingField { obs_id: ObsId, field: &'static str },

    #[error("Couldn't serialise delays: {0}")]
    Json(serde_json::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}
