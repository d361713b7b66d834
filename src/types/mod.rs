pub mod distance;
pub mod error;
pub mod lat_lon;
pub mod site;
