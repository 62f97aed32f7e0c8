use std::path::PathBuf;

use emmy_parser::{FileId, ParseError};
use thiserror::Error;

/// Why a search action produced no value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InferError {
    #[error("search cancelled")]
    Cancelled,
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid settings JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown file: {0}")]
    UnknownFile(FileId),
}
