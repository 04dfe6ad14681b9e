//! Error types for shmcache

use crate::dtype::DType;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("shared memory error: {0}")]
    SharedMemory(String),

    #[error("unsupported element type: {0:?}")]
    UnsupportedType(DType),

    #[error("corrupt shared buffer handle: {0}")]
    CorruptHandle(String),

    #[error("invalid shape: {0}")]
    InvalidShape(String),

    #[error("cache root {path} unavailable: {source}")]
    CacheRootUnavailable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to remove {path}, check permissions/ownership: {source}")]
    CacheDeleteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Sidecar missing or undecodable. Absorbed by the cache as a miss.
    #[error("cache hash {path} unreadable: {reason}")]
    HashUnreadable { path: PathBuf, reason: String },

    #[error("cache entry {0} was never checked")]
    EntryNotChecked(String),

    #[error("descriptor serialization error: {0}")]
    Descriptor(#[from] serde_json::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
