//! Geohash encoding, cell geometry and 3x3 neighbourhoods used to bucket sites
//! for radius searches.

use crate::types::distance::EARTH_RADIUS_KM;
use crate::types::lat_lon::LatLon;
use thiserror::Error;

const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Longest geohash supported. 12 characters resolve to a few centimeters.
pub const MAX_PRECISION: usize = 12;

// Cells are widened by this factor when checking they cover a radius, absorbing
// floating point error near cell edges.
const COVERAGE_MARGIN: f64 = 1.001;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GeohashError {
    #[error("Invalid geohash character '{0}'")]
    InvalidCharacter(char),

    #[error("Geohash must have between 1 and 12 characters, got {0}")]
    InvalidLength(usize),
}

/// Bounding box of a geohash cell, in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeohashBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl GeohashBox {
    pub fn center(&self) -> LatLon {
        LatLon(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
    }

    pub fn contains(&self, point: LatLon) -> bool {
        (self.min_lat..=self.max_lat).contains(&point.0)
            && (self.min_lon..=self.max_lon).contains(&point.1)
    }
}

/// Encodes a point as a geohash of `precision` characters (clamped to `1..=12`).
pub fn encode(point: LatLon, precision: usize) -> String {
    let precision = precision.clamp(1, MAX_PRECISION);
    let (mut lat_lo, mut lat_hi) = (-90.0f64, 90.0f64);
    let (mut lon_lo, mut lon_hi) = (-180.0f64, 180.0f64);

    let mut hash = String::with_capacity(precision);
    let mut even_bit = true;
    let mut bits = 0u8;
    let mut bit_count = 0;

    while hash.len() < precision {
        if even_bit {
            let mid = (lon_lo + lon_hi) / 2.0;
            if point.1 >= mid {
                bits = (bits << 1) | 1;
                lon_lo = mid;
            } else {
                bits <<= 1;
                lon_hi = mid;
            }
        } else {
            let mid = (lat_lo + lat_hi) / 2.0;
            if point.0 >= mid {
                bits = (bits << 1) | 1;
                lat_lo = mid;
            } else {
                bits <<= 1;
                lat_hi = mid;
            }
        }
        even_bit = !even_bit;
        bit_count += 1;

        if bit_count == 5 {
            hash.push(BASE32[bits as usize] as char);
            bits = 0;
            bit_count = 0;
        }
    }
    hash
}

/// Decodes a geohash into the bounding box of its cell.
pub fn decode_bbox(hash: &str) -> Result<GeohashBox, GeohashError> {
    if hash.is_empty() || hash.len() > MAX_PRECISION {
        return Err(GeohashError::InvalidLength(hash.len()));
    }
    let (mut lat_lo, mut lat_hi) = (-90.0f64, 90.0f64);
    let (mut lon_lo, mut lon_hi) = (-180.0f64, 180.0f64);
    let mut even_bit = true;

    for c in hash.chars() {
        let value = BASE32
            .iter()
            .position(|&b| b as char == c.to_ascii_lowercase())
            .ok_or(GeohashError::InvalidCharacter(c))?;
        for shift in (0..5).rev() {
            let bit = (value >> shift) & 1 == 1;
            if even_bit {
                let mid = (lon_lo + lon_hi) / 2.0;
                if bit {
                    lon_lo = mid;
                } else {
                    lon_hi = mid;
                }
            } else {
                let mid = (lat_lo + lat_hi) / 2.0;
                if bit {
                    lat_lo = mid;
                } else {
                    lat_hi = mid;
                }
            }
            even_bit = !even_bit;
        }
    }

    Ok(GeohashBox {
        min_lat: lat_lo,
        max_lat: lat_hi,
        min_lon: lon_lo,
        max_lon: lon_hi,
    })
}

/// Height and width of a geohash cell at `precision`, as `(lat_degrees, lon_degrees)`.
pub fn cell_size_degrees(precision: usize) -> (f64, f64) {
    let bits = 5 * precision.clamp(1, MAX_PRECISION) as i32;
    let lon_bits = (bits + 1) / 2;
    let lat_bits = bits / 2;
    (180.0 / 2f64.powi(lat_bits), 360.0 / 2f64.powi(lon_bits))
}

/// The cell containing `point` plus its eight neighbours at `precision`.
///
/// Longitude wraps across the antimeridian. Neighbours that would lie beyond a pole
/// are skipped, and duplicates (possible at very coarse precisions) are removed.
pub fn neighbourhood(point: LatLon, precision: usize) -> Vec<String> {
    let precision = precision.clamp(1, MAX_PRECISION);
    let (cell_lat, cell_lon) = cell_size_degrees(precision);
    let center_hash = encode(point, precision);
    // `encode` output is always valid base32.
    let center = match decode_bbox(&center_hash) {
        Ok(bbox) => bbox.center(),
        Err(_) => return vec![center_hash],
    };

    let mut cells = Vec::with_capacity(9);
    for d_lat in [-1.0, 0.0, 1.0] {
        let lat = center.0 + d_lat * cell_lat;
        if !(-90.0..=90.0).contains(&lat) {
            continue;
        }
        for d_lon in [-1.0, 0.0, 1.0] {
            let lon = wrap_longitude(center.1 + d_lon * cell_lon);
            let hash = encode(LatLon(lat, lon), precision);
            if !cells.contains(&hash) {
                cells.push(hash);
            }
        }
    }
    cells
}

fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if wrapped >= 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Picks the finest geohash precision (up to `max_precision`) whose 3x3 neighbourhood
/// around `center` is guaranteed to contain every point within `radius_km`.
///
/// A cell qualifies when it is at least as tall as the circle's latitude half-span and
/// at least as wide as its longitude half-span, measured at the circle's most poleward
/// latitude. Returns `None` when no precision qualifies (very large radius, or a circle
/// touching a pole); callers should then consider every site.
pub fn precision_for_radius(center: LatLon, radius_km: f64, max_precision: usize) -> Option<usize> {
    let angular = radius_km / EARTH_RADIUS_KM;
    if !angular.is_finite() || angular < 0.0 {
        return None;
    }
    let lat_span = angular.to_degrees();
    let poleward = center.0.abs() + lat_span;
    if poleward >= 90.0 {
        return None;
    }

    // From the haversine formula with both latitudes at most `poleward`:
    // sin(dlon / 2) <= sin(angular / 2) / cos(poleward)
    let ratio = (angular / 2.0).sin() / poleward.to_radians().cos();
    if ratio >= 1.0 {
        return None;
    }
    let lon_span = (2.0 * ratio.asin()).to_degrees();

    (1..=max_precision.clamp(1, MAX_PRECISION))
        .rev()
        .find(|&p| {
            let (cell_lat, cell_lon) = cell_size_degrees(p);
            cell_lat >= lat_span * COVERAGE_MARGIN && cell_lon >= lon_span * COVERAGE_MARGIN
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_known_values() {
        // Reference hashes from the original geohash.org service.
        assert_eq!(encode(LatLon(57.64911, 10.40744), 11), "u4pruydqqvj");
        assert_eq!(encode(LatLon(42.6, -5.6), 5), "ezs42");
        assert_eq!(encode(LatLon(0.0, 0.0), 1), "s");
        assert_eq!(encode(LatLon(-90.0, -180.0), 3), "000");
    }

    #[test]
    fn test_encode_clamps_precision() {
        assert_eq!(encode(LatLon(10.0, 10.0), 0).len(), 1);
        assert_eq!(encode(LatLon(10.0, 10.0), 40).len(), MAX_PRECISION);
    }

    #[test]
    fn test_decode_contains_original_point() {
        let point = LatLon(33.748995, -84.387982);
        for precision in 1..=MAX_PRECISION {
            let bbox = decode_bbox(&encode(point, precision)).unwrap();
            assert!(bbox.contains(point), "precision {} box {:?}", precision, bbox);
            let (h, w) = cell_size_degrees(precision);
            assert!((bbox.max_lat - bbox.min_lat - h).abs() < 1e-12);
            assert!((bbox.max_lon - bbox.min_lon - w).abs() < 1e-12);
        }
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert_eq!(decode_bbox(""), Err(GeohashError::InvalidLength(0)));
        assert_eq!(decode_bbox("ezsa"), Err(GeohashError::InvalidCharacter('a')));
        assert!(decode_bbox("0123456789bcd").is_err());
    }

    #[test]
    fn test_neighbourhood_is_three_by_three() {
        let cells = neighbourhood(LatLon(42.6, -5.6), 5);
        assert_eq!(cells.len(), 9);
        assert!(cells.contains(&"ezs42".to_string()));
        for n in ["ezefp", "ezs40", "ezs41", "ezefr", "ezs43", "ezefx", "ezs48", "ezs49"] {
            assert!(cells.contains(&n.to_string()), "missing {}", n);
        }
    }

    #[test]
    fn test_neighbourhood_wraps_antimeridian() {
        let cells = neighbourhood(LatLon(0.0, 179.99), 4);
        assert_eq!(cells.len(), 9);
        let west_side = cells
            .iter()
            .filter(|c| decode_bbox(c).unwrap().min_lon < 0.0)
            .count();
        assert_eq!(west_side, 3);
    }

    #[test]
    fn test_neighbourhood_skips_beyond_pole() {
        let cells = neighbourhood(LatLon(89.99, 10.0), 3);
        assert_eq!(cells.len(), 6);
    }

    #[test]
    fn test_precision_for_radius() {
        let atlanta = LatLon(33.749, -84.388);
        // 0.2 miles is about 322 meters; precision 6 cells are ~0.0055 degrees tall.
        let p = precision_for_radius(atlanta, 0.322, 7).unwrap();
        assert_eq!(p, 6);
        // Smaller radii allow finer cells, bounded by the max precision.
        assert_eq!(precision_for_radius(atlanta, 0.01, 7), Some(7));
        assert_eq!(precision_for_radius(atlanta, 0.01, 6), Some(6));
        // Larger radii need coarser cells.
        let coarse = precision_for_radius(atlanta, 100.0, 7).unwrap();
        assert!(coarse < p);
        // Whole-planet radius and polar circles fall back to a full scan.
        assert_eq!(precision_for_radius(atlanta, 20_000.0, 7), None);
        assert_eq!(precision_for_radius(LatLon(89.9, 0.0), 20.0, 7), None);
    }

    #[test]
    fn test_chosen_cells_cover_radius() {
        let center = LatLon(60.0, 25.0);
        let radius_km = 3.0;
        let p = precision_for_radius(center, radius_km, 7).unwrap();
        let (cell_lat, cell_lon) = cell_size_degrees(p);
        let lat_span = (radius_km / EARTH_RADIUS_KM).to_degrees();
        assert!(cell_lat >= lat_span);
        // At 60 degrees north a degree of longitude is half as long.
        assert!(cell_lon >= 2.0 * lat_span);
    }
}
