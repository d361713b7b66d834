use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadSitesError {
    #[error("Failed to read site file '{0}'")]
    SourceRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to read cache file '{0}'")]
    CacheRead(PathBuf, #[source] std::io::Error),

    #[error("Failed to write cache file '{0}'")]
    CacheWrite(PathBuf, #[source] std::io::Error),

    #[error("Failed to decode cache data from '{0}'")]
    CacheDecode(PathBuf, #[source] Box<bincode::error::DecodeError>),

    #[error("Failed to encode cache data")]
    CacheEncode(#[source] Box<bincode::error::EncodeError>),

    #[error("Network request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    // Covers errors during download stream processing and decompression
    #[error("Data download or decompression failed")]
    DownloadIo(#[from] std::io::Error),

    #[error("Site data exceeds the {limit} byte limit")]
    SourceTooLarge { limit: u64 },

    #[error("Failed to parse CSV data")]
    CsvParse(#[from] PolarsError),

    #[error("Latitude or Longitude columns (LAT_DEC, LONG_DEC) are missing from the data. Found columns: {}", .found.join(", "))]
    MissingCoordinateColumns { found: Vec<String> },

    #[error("No valid latitude and longitude data found in the file ({rows} rows read)")]
    NoValidCoordinates { rows: usize },

    // Covers errors joining tokio blocking tasks
    #[error("Background task failed to complete")]
    TaskJoin(#[from] tokio::task::JoinError),
}
