use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParcelError {
    #[error("Failed to build HTTP client for parcel lookups")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Parcel request failed for {0}")]
    NetworkRequest(String, #[source] reqwest::Error),

    #[error("Parcel request to {url} failed with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        #[source]
        source: reqwest::Error,
    },

    #[error("Parcel response from {0} is not valid JSON")]
    Decode(String, #[source] reqwest::Error),
}
