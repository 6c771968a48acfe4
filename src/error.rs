//! Error types for autopost-x

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to list images in {}: {source}", .dir.display())]
    ListImages {
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read record file {}: {source}", .path.display())]
    RecordRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to record '{id}' in {}: {reason}", .path.display())]
    RecordWrite {
        path: PathBuf,
        id: String,
        reason: String,
    },
}

impl Error {
    /// Process exit code for an error that ends the run.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Authentication(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum CaptionError {
    #[error("Failed to read image {}: {source}", .path.display())]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Caption endpoint error ({status}): {body}")]
    Endpoint { status: u16, body: String },

    #[error("Model returned an empty caption")]
    Empty,
}

#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Network(String),

    #[error("Rate limited (429). {0}")]
    RateLimited(String),

    #[error("X API error ({status}): {body}")]
    Api { status: u16, body: String },
}
