use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the image-harvester library
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Source fetch answered with a non-success status
    #[error("Fetch failed for {url}: HTTP {status}")]
    Fetch { url: String, status: u16 },

    /// Source bytes could not be decoded as an image
    #[error("Decode failed: {0}")]
    Decode(String),

    /// The rendered canvas could not be encoded
    #[error("Encode failed: {0}")]
    Encode(String),

    /// The external sink refused or failed to store a file
    #[error("Sink failed for {path}: {reason}")]
    Sink { path: PathBuf, reason: String },

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Unknown error
    #[error("Unknown error: {0}")]
    Unknown(String),
}
