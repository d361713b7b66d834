//! This module provides the main entry point for searching a site dataset.
//! It loads (and caches) the dataset once, then answers radius and nearest-site
//! queries and optionally enriches results with parcel data.

use crate::error::SiteLocatorError;
use crate::export::matches_to_frame;
use crate::parcel::client::{EnrichedSite, ParcelClient, ParcelClientConfig};
use crate::sites::loader::{SiteDataset, SiteLoader, SiteSource};
use crate::sites::locator::SiteLocator;
use crate::types::distance::{DistanceUnit, SearchRadius};
use crate::types::lat_lon::LatLon;
use crate::types::site::SiteMatch;
use crate::utils::{ensure_cache_dir_exists, get_cache_dir};
use bon::bon;
use log::info;
use polars::prelude::DataFrame;
use std::path::PathBuf;

/// Search radius used when none is given, in the requested unit.
pub const DEFAULT_RADIUS: f64 = 0.2;

/// Number of sites returned by [`SiteLocatorClient::nearest_sites`] when no limit is given.
pub const DEFAULT_NEAREST_LIMIT: usize = 5;

/// The main client struct for searching a site dataset.
///
/// The dataset is loaded once when the client is created and indexed for proximity
/// search. Loading a local file goes through an on-disk cache unless the client is
/// created with [`SiteLocatorClient::without_cache`].
///
/// # Examples
///
/// ```rust,no_run
/// # use site_locator::{SiteLocatorClient, SiteLocatorError, LatLon};
/// # async fn run() -> Result<(), SiteLocatorError> {
/// let client = SiteLocatorClient::open("sites.csv").await?;
/// let matches = client
///     .find_sites()
///     .location(LatLon(33.749, -84.388))
///     .call()?;
/// println!("{} sites within 0.2 miles", matches.len());
/// # Ok(())
/// # }
/// ```
pub struct SiteLocatorClient {
    locator: SiteLocator,
    source: Option<SiteSource>,
    parcel_client: Option<ParcelClient>,
}

#[bon]
impl SiteLocatorClient {
    /// Loads `source` using a specific cache directory.
    ///
    /// # Arguments
    ///
    /// * `source` - A local path (plain or `.gz`) or an `http(s)` URL of a CSV site dataset.
    /// * `cache_folder` - Directory for the parsed-dataset cache. Created if missing.
    ///
    /// # Errors
    ///
    /// Returns [`SiteLocatorError::CacheDirCreation`] if the directory cannot be created,
    /// and [`SiteLocatorError::LoadSites`] if the dataset cannot be read or parsed.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// # use site_locator::{SiteLocatorClient, SiteLocatorError};
    /// # use std::path::PathBuf;
    /// # async fn run() -> Result<(), SiteLocatorError> {
    /// let client =
    ///     SiteLocatorClient::with_cache_folder("towers.csv.gz", PathBuf::from("/tmp/sites")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_cache_folder(
        source: impl Into<SiteSource>,
        cache_folder: PathBuf,
    ) -> Result<Self, SiteLocatorError> {
        ensure_cache_dir_exists(&cache_folder)
            .await
            .map_err(|e| SiteLocatorError::CacheDirCreation(cache_folder.clone(), e))?;
        Self::load(source.into(), SiteLoader::new(Some(&cache_folder))).await
    }

    /// Loads `source` using the default cache directory
    /// (e.g. `~/.cache/site_locator_cache` on Linux).
    ///
    /// # Errors
    ///
    /// Returns [`SiteLocatorError::CacheDirResolution`] if the default cache directory
    /// cannot be found, plus everything [`SiteLocatorClient::with_cache_folder`] returns.
    pub async fn open(source: impl Into<SiteSource>) -> Result<Self, SiteLocatorError> {
        let cache_folder = get_cache_dir().map_err(SiteLocatorError::CacheDirResolution)?;
        Self::with_cache_folder(source, cache_folder).await
    }

    /// Loads `source` without reading or writing any cache.
    pub async fn without_cache(source: impl Into<SiteSource>) -> Result<Self, SiteLocatorError> {
        Self::load(source.into(), SiteLoader::new(None)).await
    }

    /// Wraps an already loaded dataset.
    pub fn from_dataset(dataset: SiteDataset) -> Self {
        Self {
            locator: SiteLocator::new(dataset),
            source: None,
            parcel_client: None,
        }
    }

    async fn load(source: SiteSource, loader: SiteLoader) -> Result<Self, SiteLocatorError> {
        let dataset = loader.load(&source).await?;
        info!(
            "Loaded {} sites from {} ({} rows without coordinates, {} with invalid coordinates)",
            dataset.sites.len(),
            source,
            dataset.missing_coordinates,
            dataset.invalid_coordinates
        );
        Ok(Self {
            locator: SiteLocator::new(dataset),
            source: Some(source),
            parcel_client: None,
        })
    }

    /// Attaches a parcel service used by [`SiteLocatorClient::enrich`].
    ///
    /// # Errors
    ///
    /// Returns [`SiteLocatorError::Parcel`] if the HTTP client cannot be built.
    pub fn with_parcel_client(mut self, config: ParcelClientConfig) -> Result<Self, SiteLocatorError> {
        self.parcel_client = Some(ParcelClient::new(config)?);
        Ok(self)
    }

    /// Finds all sites within a radius of a location.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.location(LatLon)`: **Required.** Center of the search.
    /// * `.radius(f64)`: Optional. Search radius in `unit`. Defaults to [`DEFAULT_RADIUS`].
    /// * `.unit(DistanceUnit)`: Optional. Unit of the radius and of the reported distances. Defaults to miles.
    /// * `.limit(usize)`: Optional. Keep only the closest `limit` matches.
    ///
    /// # Returns
    ///
    /// Every site whose great-circle distance is at most the radius, closest first, ties
    /// in dataset row order. An empty vector when nothing is in range.
    ///
    /// # Errors
    ///
    /// Returns [`SiteLocatorError::Input`] if the location is out of range or the radius is not
    /// a positive finite number.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use site_locator::{DistanceUnit, LatLon, Site, SiteDataset, SiteLocatorClient};
    /// let dataset = SiteDataset::new(
    ///     vec!["LAT_DEC".into(), "LONG_DEC".into()],
    ///     vec![Site::new(0, LatLon(33.7490, -84.3880)), Site::new(1, LatLon(33.80, -84.30))],
    /// );
    /// let client = SiteLocatorClient::from_dataset(dataset);
    ///
    /// let near = client.find_sites().location(LatLon(33.7491, -84.3881)).call().unwrap();
    /// assert_eq!(near.len(), 1);
    ///
    /// let wide = client
    ///     .find_sites()
    ///     .location(LatLon(33.7491, -84.3881))
    ///     .radius(20.0)
    ///     .unit(DistanceUnit::Kilometers)
    ///     .call()
    ///     .unwrap();
    /// assert_eq!(wide.len(), 2);
    /// ```
    #[builder]
    pub fn find_sites(
        &self,
        location: LatLon,
        radius: Option<f64>,
        unit: Option<DistanceUnit>,
        limit: Option<usize>,
    ) -> Result<Vec<SiteMatch>, SiteLocatorError> {
        let center = LatLon::new(location.0, location.1)?;
        let radius = SearchRadius::new(
            radius.unwrap_or(DEFAULT_RADIUS),
            unit.unwrap_or_default(),
        )?;

        let mut matches = self.locator.within_radius(center, radius);
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    /// Finds the sites closest to a location.
    ///
    /// This method uses a builder pattern.
    ///
    /// # Arguments
    ///
    /// * `.location(LatLon)`: **Required.** Reference point.
    /// * `.limit(usize)`: Optional. Maximum number of sites. Defaults to [`DEFAULT_NEAREST_LIMIT`].
    /// * `.max_distance(f64)`: Optional. Ignore sites farther than this, in `unit`.
    /// * `.unit(DistanceUnit)`: Optional. Defaults to miles.
    ///
    /// # Errors
    ///
    /// Returns [`SiteLocatorError::Input`] for an invalid location or max distance.
    #[builder]
    pub fn nearest_sites(
        &self,
        location: LatLon,
        limit: Option<usize>,
        max_distance: Option<f64>,
        unit: Option<DistanceUnit>,
    ) -> Result<Vec<SiteMatch>, SiteLocatorError> {
        let center = LatLon::new(location.0, location.1)?;
        let unit = unit.unwrap_or_default();
        let max_distance = max_distance
            .map(|d| SearchRadius::new(d, unit))
            .transpose()?;
        Ok(self.locator.nearest(
            center,
            limit.unwrap_or(DEFAULT_NEAREST_LIMIT),
            max_distance,
            unit,
        ))
    }

    /// Looks up parcel data for each match, keeping the input order.
    ///
    /// # Errors
    ///
    /// Returns [`SiteLocatorError::ParcelNotConfigured`] when no parcel service was attached.
    /// Failures of individual lookups are not errors; those sites carry no parcel.
    pub async fn enrich(
        &self,
        matches: Vec<SiteMatch>,
    ) -> Result<Vec<EnrichedSite>, SiteLocatorError> {
        let client = self
            .parcel_client
            .as_ref()
            .ok_or(SiteLocatorError::ParcelNotConfigured)?;
        Ok(client.enrich(matches).await)
    }

    /// Renders matches as a table with every dataset column plus the distance.
    pub fn to_frame(
        &self,
        matches: &[SiteMatch],
        unit: DistanceUnit,
    ) -> Result<DataFrame, SiteLocatorError> {
        matches_to_frame(&self.dataset().headers, matches, unit).map_err(SiteLocatorError::Table)
    }

    pub fn dataset(&self) -> &SiteDataset {
        self.locator.dataset()
    }

    /// Where the dataset was loaded from. `None` for [`SiteLocatorClient::from_dataset`].
    pub fn source(&self) -> Option<&SiteSource> {
        self.source.as_ref()
    }

    pub fn has_parcel_client(&self) -> bool {
        self.parcel_client.is_some()
    }

    pub fn len(&self) -> usize {
        self.locator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locator.is_empty()
    }
}
