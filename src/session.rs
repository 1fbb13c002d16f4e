//! On-disk state of one network: the chain and what was deployed on it.

use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{chain::Chain, deploy::Deployments, primitives::Address};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is not a valid session file: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path} holds chain {found}, expected chain {expected}")]
    ChainMismatch {
        path: PathBuf,
        expected: u64,
        found: u64,
    },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Session {
    pub chain: Chain,
    #[serde(default)]
    pub deployments: Deployments,
}

fn read_all(path: &Path) -> Result<Option<Vec<u8>>, SessionError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(source) => Err(SessionError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_all(path: &Path, bytes: &[u8]) -> Result<(), SessionError> {
    let io = |source| SessionError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io)?;
    }
    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp).map_err(io)?;
    file.write_all(bytes).map_err(io)?;
    file.sync_all().map_err(io)?;
    fs::rename(&tmp, path).map_err(io)
}

impl Session {
    /// Fresh chain with `accounts` prefunded.
    pub fn genesis(chain_id: u64, accounts: &[Address]) -> Self {
        Self {
            chain: Chain::with_prefunded(chain_id, accounts),
            deployments: Deployments::default(),
        }
    }

    /// Loads the session at `path`, or starts a fresh chain funding
    /// `accounts` when there is none.
    pub fn open(path: &Path, chain_id: u64, accounts: &[Address]) -> Result<Self, SessionError> {
        let Some(bytes) = read_all(path)? else {
            info!(chain_id, accounts = accounts.len(), path = %path.display(), "starting a fresh chain");
            return Ok(Self::genesis(chain_id, accounts));
        };
        let session: Session = serde_json::from_slice(&bytes).map_err(|source| SessionError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        if session.chain.chain_id() != chain_id {
            return Err(SessionError::ChainMismatch {
                path: path.to_path_buf(),
                expected: chain_id,
                found: session.chain.chain_id(),
            });
        }
        debug!(block = session.chain.block_number(), "loaded session");
        Ok(session)
    }

    pub fn save(&self, path: &Path) -> Result<(), SessionError> {
        let bytes = serde_json::to_vec_pretty(self).map_err(|source| SessionError::Corrupt {
            path: path.to_path_buf(),
            source,
        })?;
        write_all(path, &bytes)
    }

    /// Removes the session file; a missing file is not an error.
    pub fn reset(path: &Path) -> Result<(), SessionError> {
        match fs::remove_file(path) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(SessionError::Io {
                path: path.to_path_buf(),
                source: err,
            }),
            _ => Ok(()),
        }
    }
}
