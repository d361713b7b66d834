pub mod error;
pub mod geohash;
pub mod loader;
pub mod locator;
