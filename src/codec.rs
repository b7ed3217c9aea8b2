//! Serialization formats for run records and summaries.
//!
//! CI jobs dump their failure records with Python's pickle module, so pickle
//! is the default. JSON is accepted for hand-written or converted dumps.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// On-disk format of record and summary files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// Python pickle (protocols 0-5 read, protocol 2 written)
    #[default]
    Pickle,
    /// JSON
    Json,
}

/// Error raised while encoding or decoding a payload.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid pickle data: {0}")]
    Pickle(#[from] serde_pickle::Error),
    #[error("invalid JSON data: {0}")]
    Json(#[from] serde_json::Error),
}

impl RecordFormat {
    /// Decode a value from raw bytes.
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, CodecError> {
        match self {
            // Python 2 dumps store str as byte strings.
            RecordFormat::Pickle => Ok(serde_pickle::from_slice(
                bytes,
                serde_pickle::DeOptions::new().decode_strings(),
            )?),
            RecordFormat::Json => Ok(serde_json::from_slice(bytes)?),
        }
    }

    /// Encode a value to raw bytes.
    ///
    /// Pickles are written with protocol 2 so Python 2 tooling can load them.
    pub fn encode<T: Serialize>(self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self {
            RecordFormat::Pickle => Ok(serde_pickle::to_vec(
                value,
                serde_pickle::SerOptions::new().proto_v2(),
            )?),
            RecordFormat::Json => Ok(serde_json::to_vec_pretty(value)?),
        }
    }
}
