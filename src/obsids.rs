//! Newline-delimited obsid files, as passed around the GLEAM-X pipeline.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::info;
use thiserror::Error;

use crate::ObsId;

/// Read one obsid per line. Blank lines and anything after a `#` are ignored.
pub fn read_obsids_file<P: AsRef<Path>>(path: P) -> Result<Vec<ObsId>, ObsidsError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ObsidsError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut obsids = vec![];
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|source| ObsidsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let content = match line.split_once('#') {
            Some((before, _)) => before,
            None => line.as_str(),
        }
        .trim();
        if content.is_empty() {
            continue;
        }
        // Files written by numpy sometimes have "1090008640.0".
        let obsid = content
            .parse::<ObsId>()
            .ok()
            .or_else(|| {
                content
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as ObsId)
            })
            .ok_or_else(|| ObsidsError::BadLine {
                path: path.to_path_buf(),
                line_num: i + 1,
                content: content.to_string(),
            })?;
        obsids.push(obsid);
    }
    Ok(obsids)
}

/// Write one obsid per line. Refuses to overwrite an existing file unless
/// `clobber` is set.
pub fn write_obsids_file<P: AsRef<Path>>(
    obsids: &[ObsId],
    path: P,
    clobber: bool,
) -> Result<(), ObsidsError> {
    let path = path.as_ref();
    if !clobber && path.exists() {
        return Err(ObsidsError::Exists(path.to_path_buf()));
    }
    info!("Writing {} with {} obsids", path.display(), obsids.len());
    let write = || -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        for obsid in obsids {
            writeln!(out, "{obsid}")?;
        }
        out.flush()
    };
    write().map_err(|source| ObsidsError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Error, Debug)]
pub enum ObsidsError {
    #[error("Couldn't read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Couldn't write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{}, line {line_num}: '{content}' is not an obsid", path.display())]
    BadLine {
        path: PathBuf,
        line_num: usize,
        content: String,
    },

    #[error("Output file {} already exists", .0.display())]
    Exists(PathBuf),
}
