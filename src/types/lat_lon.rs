//! Geographic coordinates and parsing of the `"latitude, longitude"` search input.

use crate::types::error::InputError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Represents a geographical coordinate using latitude and longitude.
///
/// Latitude is the first element (index 0), and longitude is the second (index 1).
/// Both values are decimal degrees.
///
/// # Examples
///
/// ```
/// use site_locator::LatLon;
///
/// let downtown = LatLon(40.7128, -74.0060);
/// assert_eq!(downtown.0, 40.7128); // Latitude
/// assert_eq!(downtown.1, -74.0060); // Longitude
///
/// // Parse what a user typed into a search box.
/// let parsed: LatLon = " 40.7128 ,-74.0060 ".parse().unwrap();
/// assert_eq!(parsed, downtown);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon(pub f64, pub f64);

impl LatLon {
    /// Creates a validated coordinate.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidNumber`] for NaN or infinite values and
    /// [`InputError::OutOfRange`] when latitude is outside `[-90, 90]` or longitude
    /// outside `[-180, 180]`.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InputError> {
        let latitude = check_component("latitude", latitude, 90.0)?;
        let longitude = check_component("longitude", longitude, 180.0)?;
        Ok(Self(latitude, longitude))
    }

    pub fn latitude(&self) -> f64 {
        self.0
    }

    pub fn longitude(&self) -> f64 {
        self.1
    }
}

fn check_component(field: &'static str, value: f64, limit: f64) -> Result<f64, InputError> {
    if !value.is_finite() {
        return Err(InputError::InvalidNumber {
            field,
            value: value.to_string(),
        });
    }
    if !(-limit..=limit).contains(&value) {
        return Err(InputError::OutOfRange {
            field,
            value,
            min: -limit,
            max: limit,
        });
    }
    Ok(value)
}

fn parse_component(field: &'static str, raw: &str, limit: f64) -> Result<f64, InputError> {
    let trimmed = raw.trim();
    let value = trimmed
        .parse::<f64>()
        .map_err(|_| InputError::InvalidNumber {
            field,
            value: trimmed.to_string(),
        })?;
    check_component(field, value, limit)
}

impl FromStr for LatLon {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').collect();
        match parts.as_slice() {
            [_] => Err(InputError::MissingSeparator),
            [lat, lon] => Ok(Self(
                parse_component("latitude", lat, 90.0)?,
                parse_component("longitude", lon, 180.0)?,
            )),
            _ => Err(InputError::TooManyParts(parts.len())),
        }
    }
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}, {:.6}", self.0, self.1)
    }
}
