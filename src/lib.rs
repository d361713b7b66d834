mod error;
mod export;
mod parcel;
mod site_locator;
mod sites;
mod types;
mod utils;

#[cfg(test)]
mod test_support;

pub use error::SiteLocatorError;
pub use site_locator::*;

pub use export::{distance_column_name, matches_to_frame, write_csv, write_json};

pub use parcel::client::{EnrichedSite, ParcelClient, ParcelClientConfig};
pub use parcel::error::ParcelError;
pub use parcel::fields::{ParcelFieldMap, ParcelInfo};

pub use sites::error::LoadSitesError;
pub use sites::geohash;
pub use sites::loader::{SiteDataset, SiteLoader, SiteSource};
pub use sites::locator::{SiteLocator, INDEX_PRECISION};

pub use types::distance::{great_circle_km, DistanceUnit, SearchRadius, EARTH_RADIUS_KM};
pub use types::error::InputError;
pub use types::lat_lon::LatLon;
pub use types::site::*;

pub use utils::get_cache_dir;
