//! Mapping of a parcel service's JSON response onto [`ParcelInfo`].
//!
//! Real-estate APIs disagree on response layout, so every attribute is located with a
//! JSON pointer ([RFC 6901](https://www.rfc-editor.org/rfc/rfc6901)) that can be
//! configured per service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Building and parcel attributes for the land a site stands on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParcelInfo {
    pub parcel_id: Option<String>,
    pub land_use: Option<String>,
    pub building_area_sqft: Option<f64>,
    pub lot_size_acres: Option<f64>,
    pub year_built: Option<i32>,
    pub owner: Option<String>,
    pub address: Option<String>,
    /// The record the fields were read from, as returned by the service.
    pub raw: Value,
}

/// JSON pointers locating each [`ParcelInfo`] attribute within a response.
///
/// `record` selects the parcel object inside the response body (for services that wrap
/// it, e.g. `/property`); when it points at an array, the first element is used.
/// The attribute pointers are then resolved relative to that record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelFieldMap {
    pub record: Option<String>,
    pub parcel_id: String,
    pub land_use: String,
    pub building_area_sqft: String,
    pub lot_size_acres: String,
    pub year_built: String,
    pub owner: String,
    pub address: String,
}

impl Default for ParcelFieldMap {
    fn default() -> Self {
        Self {
            record: None,
            parcel_id: "/parcel_id".to_string(),
            land_use: "/land_use".to_string(),
            building_area_sqft: "/building_area_sqft".to_string(),
            lot_size_acres: "/lot_size_acres".to_string(),
            year_built: "/year_built".to_string(),
            owner: "/owner".to_string(),
            address: "/address".to_string(),
        }
    }
}

impl ParcelFieldMap {
    /// Extracts a [`ParcelInfo`] from a response body.
    ///
    /// Returns `None` when the record pointer does not resolve, or resolves to `null`
    /// or an empty array. Individual attributes that are missing or of the wrong type
    /// are left as `None`.
    pub fn extract(&self, body: &Value) -> Option<ParcelInfo> {
        let record = match &self.record {
            Some(pointer) => body.pointer(pointer)?,
            None => body,
        };
        let record = match record {
            Value::Null => return None,
            Value::Array(items) => items.first()?,
            other => other,
        };

        Some(ParcelInfo {
            parcel_id: text_at(record, &self.parcel_id),
            land_use: text_at(record, &self.land_use),
            building_area_sqft: number_at(record, &self.building_area_sqft),
            lot_size_acres: number_at(record, &self.lot_size_acres),
            year_built: number_at(record, &self.year_built)
                .filter(|y| y.fract() == 0.0 && (0.0..=9999.0).contains(y))
                .map(|y| y as i32),
            owner: text_at(record, &self.owner),
            address: text_at(record, &self.address),
            raw: record.clone(),
        })
    }
}

fn text_at(record: &Value, pointer: &str) -> Option<String> {
    match record.pointer(pointer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// Services frequently send numbers as strings ("1,250").
fn number_at(record: &Value, pointer: &str) -> Option<f64> {
    match record.pointer(pointer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    }
}
