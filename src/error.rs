use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FetchError {
    #[error("environment variable {0} is not set")]
    #[diagnostic(help("obtain a token with `es sso access --token` and export it"))]
    MissingCredential(String),

    #[error("invalid date (expected YYYY-MM-DD): {0}")]
    InvalidDate(String),

    #[error("end date {end} is before start date {start}")]
    InvertedDateRange { start: String, end: String },

    #[error("invalid station id: {0}")]
    InvalidStationId(String),

    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("no station ids found in {0}")]
    EmptyStationList(PathBuf),

    #[error("failed to read station list at {0}")]
    StationListRead(PathBuf),

    #[error("no stations left to download after filtering")]
    NoStations,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("station catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("station catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("unexpected station catalog response: {0}")]
    CatalogFormat(String),

    #[error("archive client error: {0}")]
    ArchiveHttp(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl FetchError {
    /// Errors that should stop the process before any work is scheduled.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FetchError::MissingCredential(_)
                | FetchError::InvalidDate(_)
                | FetchError::InvertedDateRange { .. }
                | FetchError::InvalidStationId(_)
                | FetchError::InvalidBoundingBox(_)
                | FetchError::EmptyStationList(_)
                | FetchError::StationListRead(_)
                | FetchError::NoStations
                | FetchError::ConfigRead(_)
                | FetchError::ConfigParse(_)
                | FetchError::InvalidConfig(_)
        )
    }
}
