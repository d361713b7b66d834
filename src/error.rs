use crate::parcel::error::ParcelError;
use crate::sites::error::LoadSitesError;
use crate::types::error::InputError;
use polars::error::PolarsError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SiteLocatorError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    LoadSites(#[from] LoadSitesError),

    #[error(transparent)]
    Parcel(#[from] ParcelError),

    #[error("Parcel enrichment requested but no parcel service is configured")]
    ParcelNotConfigured,

    #[error("Failed to build result table")]
    Table(#[source] PolarsError),

    #[error("Failed to create cache directory '{0}'")]
    CacheDirCreation(PathBuf, #[source] std::io::Error),

    #[error("Failed to determine cache directory")]
    CacheDirResolution(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_errors_convert_transparently() {
        let input = InputError::InvalidRadius(-1.0);
        let err: SiteLocatorError = input.clone().into();
        assert_eq!(err.to_string(), input.to_string());
        assert!(matches!(err, SiteLocatorError::Input(InputError::InvalidRadius(_))));

        let load: SiteLocatorError = LoadSitesError::SourceTooLarge { limit: 10 }.into();
        assert_eq!(load.to_string(), "Site data exceeds the 10 byte limit");
    }
}
