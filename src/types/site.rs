//! Defines the data structures representing radio/cell sites read from a site dataset,
//! the mapping from dataset columns to typed attributes, and search matches.

use crate::types::distance::DistanceUnit;
use crate::types::lat_lon::LatLon;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

// --- Column names ---
pub const COL_LATITUDE: &str = "LAT_DEC";
pub const COL_LONGITUDE: &str = "LONG_DEC";
pub const COL_SITE_NAME: &str = "SITE_NAME";
pub const COL_OWNER: &str = "OWNER";
pub const COL_FCC_ASR: &str = "FCC_ASR";
pub const COL_FAA_STUDY: &str = "FAA_STUDY";
pub const COL_STRUCTURE_TYPE: &str = "STRUCTURE TYPE";
pub const COL_STATUS: &str = "STATUS";
pub const COL_ADDRESS: &str = "ADDRESS";
pub const COL_CITY: &str = "CITY";
pub const COL_STATE: &str = "STATE";
pub const COL_ZIP: &str = "ZIP";
pub const COL_BUILT_DATE: &str = "BUILT_DATE";
pub const COL_SITE_ELEVATION_FT: &str = "SITE_EL_FT";
pub const COL_AMSL_FT: &str = "AMSL_FT";
pub const COL_STRUCTURE_HEIGHT_FT: &str = "STR_HT_FT";

const BUILT_DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%m/%d/%Y", "%m/%d/%y", "%Y/%m/%d", "%d-%b-%Y"];
const BUILT_DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M"];

/// A single radio/cell site: one cleaned row of the source dataset.
///
/// Well-known columns are exposed as typed fields. Every raw cell of the row is
/// also retained in [`Site::values`], aligned with the dataset headers, so a result
/// can be exported with all of its original columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    /// Zero-based index of the row in the source file (header excluded).
    pub row: usize,
    /// Site position from `LAT_DEC` / `LONG_DEC`.
    pub location: LatLon,
    pub site_name: Option<String>,
    pub owner: Option<String>,
    /// FCC Antenna Structure Registration number.
    pub fcc_asr: Option<String>,
    /// FAA aeronautical study number.
    pub faa_study: Option<String>,
    pub structure_type: Option<String>,
    pub status: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
    /// Build date as written in the dataset. See [`Site::built_date`] for a parsed value.
    pub built_date_raw: Option<String>,
    /// Ground elevation at the site, in feet.
    pub site_elevation_ft: Option<f64>,
    /// Overall height above mean sea level, in feet.
    pub amsl_ft: Option<f64>,
    /// Structure height above ground, in feet.
    pub structure_height_ft: Option<f64>,
    /// Raw cell values of the row, in dataset header order.
    pub values: Vec<Option<String>>,
}

impl Site {
    /// Creates a site with only a position. Attribute fields start empty.
    pub fn new(row: usize, location: LatLon) -> Self {
        Site {
            row,
            location,
            site_name: None,
            owner: None,
            fcc_asr: None,
            faa_study: None,
            structure_type: None,
            status: None,
            address: None,
            city: None,
            state: None,
            zip: None,
            built_date_raw: None,
            site_elevation_ft: None,
            amsl_ft: None,
            structure_height_ft: None,
            values: Vec::new(),
        }
    }

    /// Parses [`Site::built_date_raw`] using the date formats commonly found in site
    /// inventories (`2004-06-30`, `06/30/2004`, `30-Jun-2004`, ...).
    pub fn built_date(&self) -> Option<NaiveDate> {
        let raw = self.built_date_raw.as_deref()?.trim();
        BUILT_DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
            .or_else(|| {
                BUILT_DATETIME_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                    .map(|dt| dt.date())
            })
    }

    /// Single-line address assembled from the address, city, state and zip columns.
    pub fn full_address(&self) -> String {
        [&self.address, &self.city, &self.state, &self.zip]
            .iter()
            .map(|part| part.as_deref().unwrap_or("-"))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Multi-line description of the site's key attributes. Missing values render as `-`.
    pub fn summary(&self) -> String {
        fn text(value: &Option<String>) -> &str {
            value.as_deref().unwrap_or("-")
        }
        fn number(value: Option<f64>) -> String {
            value.map_or_else(|| "-".to_string(), |v| v.to_string())
        }

        let mut out = String::new();
        // Writing to a String cannot fail.
        let _ = writeln!(out, "Site Name: {}", text(&self.site_name));
        let _ = writeln!(out, "Owner: {}", text(&self.owner));
        let _ = writeln!(out, "FCC ASR: {}", text(&self.fcc_asr));
        let _ = writeln!(out, "FAA Study: {}", text(&self.faa_study));
        let _ = writeln!(out, "Structure Type: {}", text(&self.structure_type));
        let _ = writeln!(out, "Status: {}", text(&self.status));
        let _ = writeln!(out, "Address: {}", self.full_address());
        let _ = writeln!(out, "Built Date: {}", text(&self.built_date_raw));
        let _ = writeln!(
            out,
            "Site Elevation (ft): {}",
            number(self.site_elevation_ft)
        );
        let _ = writeln!(out, "AMSL (ft): {}", number(self.amsl_ft));
        let _ = write!(out, "Height (ft): {}", number(self.structure_height_ft));
        out
    }
}

/// A site found by a search, together with its distance from the search center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteMatch {
    pub site: Site,
    /// Great-circle distance from the search center, expressed in `unit`.
    pub distance: f64,
    pub unit: DistanceUnit,
}

/// Why a dataset row could not become a [`Site`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRejection {
    /// Latitude or longitude cell is empty.
    MissingCoordinates,
    /// Latitude or longitude is not a number or is out of range.
    InvalidCoordinates,
}

/// Positions of the known site columns within a dataset header row.
///
/// Header names are compared after trimming and ignoring ASCII case, so
/// `" lat_dec"` still resolves to `LAT_DEC`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteColumns {
    latitude: usize,
    longitude: usize,
    site_name: Option<usize>,
    owner: Option<usize>,
    fcc_asr: Option<usize>,
    faa_study: Option<usize>,
    structure_type: Option<usize>,
    status: Option<usize>,
    address: Option<usize>,
    city: Option<usize>,
    state: Option<usize>,
    zip: Option<usize>,
    built_date: Option<usize>,
    site_elevation_ft: Option<usize>,
    amsl_ft: Option<usize>,
    structure_height_ft: Option<usize>,
}

impl SiteColumns {
    /// Resolves column positions. Returns `None` when either coordinate column is absent.
    pub fn resolve<S: AsRef<str>>(headers: &[S]) -> Option<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.as_ref().trim().eq_ignore_ascii_case(name))
        };
        Some(Self {
            latitude: find(COL_LATITUDE)?,
            longitude: find(COL_LONGITUDE)?,
            site_name: find(COL_SITE_NAME),
            owner: find(COL_OWNER),
            fcc_asr: find(COL_FCC_ASR),
            faa_study: find(COL_FAA_STUDY),
            structure_type: find(COL_STRUCTURE_TYPE),
            status: find(COL_STATUS),
            address: find(COL_ADDRESS),
            city: find(COL_CITY),
            state: find(COL_STATE),
            zip: find(COL_ZIP),
            built_date: find(COL_BUILT_DATE),
            site_elevation_ft: find(COL_SITE_ELEVATION_FT),
            amsl_ft: find(COL_AMSL_FT),
            structure_height_ft: find(COL_STRUCTURE_HEIGHT_FT),
        })
    }

    /// Builds a [`Site`] from one row of raw cell values.
    pub fn build_site(&self, row: usize, values: Vec<Option<String>>) -> Result<Site, RowRejection> {
        let cell = |idx: Option<usize>| -> Option<String> {
            idx.and_then(|i| values.get(i))
                .and_then(|v| v.as_deref())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let number = |idx: Option<usize>| -> Option<f64> {
            cell(idx).and_then(|v| v.replace(',', "").parse::<f64>().ok())
        };

        let (Some(lat_raw), Some(lon_raw)) = (cell(Some(self.latitude)), cell(Some(self.longitude)))
        else {
            return Err(RowRejection::MissingCoordinates);
        };
        let location = match (lat_raw.parse::<f64>(), lon_raw.parse::<f64>()) {
            (Ok(lat), Ok(lon)) => {
                LatLon::new(lat, lon).map_err(|_| RowRejection::InvalidCoordinates)?
            }
            _ => return Err(RowRejection::InvalidCoordinates),
        };

        Ok(Site {
            row,
            location,
            site_name: cell(self.site_name),
            owner: cell(self.owner),
            fcc_asr: cell(self.fcc_asr),
            faa_study: cell(self.faa_study),
            structure_type: cell(self.structure_type),
            status: cell(self.status),
            address: cell(self.address),
            city: cell(self.city),
            state: cell(self.state),
            zip: cell(self.zip),
            built_date_raw: cell(self.built_date),
            site_elevation_ft: number(self.site_elevation_ft),
            amsl_ft: number(self.amsl_ft),
            structure_height_ft: number(self.structure_height_ft),
            values,
        })
    }
}
