// src/error.rs
use std::path::PathBuf;

use thiserror::Error;

/// Failure while turning an audio file into PCM channels.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported or malformed audio: {0}")]
    Malformed(String),
    #[error("no decodable audio track in {0}")]
    NoAudioTrack(PathBuf),
    #[error("resampling failed: {0}")]
    Resample(String),
}

/// Failure at the persistence boundary. Transient failures (busy or locked
/// connection) may be retried by the caller; permanent ones (schema
/// violation, disk full) must abort the batch.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("transient store failure: {0}")]
    Transient(String),
    #[error("store failure: {0}")]
    Permanent(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// Any failure surfaced by the ingest or recognition pipelines.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("worker pool failed to start: {0}")]
    Pool(String),
}
