//! Distance units, validated search radii and great-circle distance.

use crate::types::error::InputError;
use crate::types::lat_lon::LatLon;
use haversine::{distance, Location as HaversineLocation, Units};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Mean Earth radius used by [`great_circle_km`], in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const KM_PER_MILE: f64 = 1.609_344;

/// Unit in which search radii and result distances are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DistanceUnit {
    /// Statute miles. The default, matching how site searches are usually phrased.
    #[default]
    Miles,
    Kilometers,
}

impl DistanceUnit {
    /// Converts `value` expressed in this unit to kilometers.
    pub fn to_km(self, value: f64) -> f64 {
        match self {
            DistanceUnit::Miles => value * KM_PER_MILE,
            DistanceUnit::Kilometers => value,
        }
    }

    /// Converts a kilometer value into this unit.
    pub fn from_km(self, km: f64) -> f64 {
        match self {
            DistanceUnit::Miles => km / KM_PER_MILE,
            DistanceUnit::Kilometers => km,
        }
    }

    /// Short suffix used in column names and printed output.
    pub fn suffix(self) -> &'static str {
        match self {
            DistanceUnit::Miles => "mi",
            DistanceUnit::Kilometers => "km",
        }
    }
}

impl fmt::Display for DistanceUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistanceUnit::Miles => "miles",
            DistanceUnit::Kilometers => "kilometers",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for DistanceUnit {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mi" | "mile" | "miles" => Ok(DistanceUnit::Miles),
            "km" | "kilometer" | "kilometers" | "kilometre" | "kilometres" => {
                Ok(DistanceUnit::Kilometers)
            }
            other => Err(InputError::UnknownUnit(other.to_string())),
        }
    }
}

/// A validated search radius.
///
/// # Examples
///
/// ```
/// use site_locator::{DistanceUnit, SearchRadius};
///
/// let radius = SearchRadius::new(0.2, DistanceUnit::Miles).unwrap();
/// assert!((radius.km() - 0.3218688).abs() < 1e-9);
/// assert!(SearchRadius::new(0.0, DistanceUnit::Miles).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchRadius {
    value: f64,
    unit: DistanceUnit,
}

impl SearchRadius {
    /// Creates a radius, rejecting zero, negative and non-finite values.
    pub fn new(value: f64, unit: DistanceUnit) -> Result<Self, InputError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(InputError::InvalidRadius(value));
        }
        Ok(Self { value, unit })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn unit(&self) -> DistanceUnit {
        self.unit
    }

    pub fn km(&self) -> f64 {
        self.unit.to_km(self.value)
    }
}

impl fmt::Display for SearchRadius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Great-circle (haversine) distance between two points, in kilometers.
pub fn great_circle_km(a: LatLon, b: LatLon) -> f64 {
    distance(
        HaversineLocation {
            latitude: a.0,
            longitude: a.1,
        },
        HaversineLocation {
            latitude: b.0,
            longitude: b.1,
        },
        Units::Kilometers,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_conversions() {
        assert!((DistanceUnit::Miles.to_km(1.0) - 1.609344).abs() < 1e-12);
        assert!((DistanceUnit::Miles.from_km(1.609344) - 1.0).abs() < 1e-12);
        assert_eq!(DistanceUnit::Kilometers.to_km(3.5), 3.5);
        assert_eq!(DistanceUnit::Kilometers.from_km(3.5), 3.5);
    }

    #[test]
    fn test_unit_parsing() {
        assert_eq!("mi".parse::<DistanceUnit>(), Ok(DistanceUnit::Miles));
        assert_eq!(" KM ".parse::<DistanceUnit>(), Ok(DistanceUnit::Kilometers));
        assert_eq!(
            "furlong".parse::<DistanceUnit>(),
            Err(InputError::UnknownUnit("furlong".to_string()))
        );
    }

    #[test]
    fn test_radius_validation() {
        assert!(SearchRadius::new(0.1, DistanceUnit::Miles).is_ok());
        assert_eq!(
            SearchRadius::new(-1.0, DistanceUnit::Miles),
            Err(InputError::InvalidRadius(-1.0))
        );
        assert!(SearchRadius::new(f64::NAN, DistanceUnit::Kilometers).is_err());
        assert!(SearchRadius::new(f64::INFINITY, DistanceUnit::Kilometers).is_err());
    }

    #[test]
    fn test_great_circle_known_distance() {
        // Atlanta to New York City is roughly 1200 km.
        let atlanta = LatLon(33.7490, -84.3880);
        let nyc = LatLon(40.7128, -74.0060);
        let d = great_circle_km(atlanta, nyc);
        assert!((1190.0..1210.0).contains(&d), "distance was {}", d);
        assert_eq!(great_circle_km(nyc, nyc), 0.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = great_circle_km(LatLon(0.0, 0.0), LatLon(1.0, 0.0));
        let expected = EARTH_RADIUS_KM * 1f64.to_radians();
        assert!((d - expected).abs() < 1e-6);
    }
}
