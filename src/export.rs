//! Tabular and JSON output of search results.

use crate::types::distance::DistanceUnit;
use crate::types::site::SiteMatch;
use polars::prelude::*;
use serde::Serialize;
use std::io::Write;

/// Name of the distance column appended by [`matches_to_frame`], e.g. `DISTANCE_MI`.
pub fn distance_column_name(unit: DistanceUnit) -> String {
    format!("DISTANCE_{}", unit.suffix().to_ascii_uppercase())
}

/// Builds a `DataFrame` with one row per match, in result order.
///
/// The frame holds every original dataset column (as text, exactly as read) followed by
/// a float column with each match's distance in `unit`.
///
/// # Examples
///
/// ```
/// use site_locator::{matches_to_frame, DistanceUnit, LatLon, Site, SiteMatch};
///
/// let mut site = Site::new(0, LatLon(33.749, -84.388));
/// site.values = vec![Some("Peachtree".to_string()), Some("33.749".to_string())];
/// let matches = vec![SiteMatch { site, distance: 0.12, unit: DistanceUnit::Miles }];
///
/// let headers = vec!["SITE_NAME".to_string(), "LAT_DEC".to_string()];
/// let frame = matches_to_frame(&headers, &matches, DistanceUnit::Miles).unwrap();
/// assert_eq!(frame.shape(), (1, 3));
/// ```
pub fn matches_to_frame(
    headers: &[String],
    matches: &[SiteMatch],
    unit: DistanceUnit,
) -> PolarsResult<DataFrame> {
    let mut columns: Vec<Column> = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| {
            let values: Vec<Option<&str>> = matches
                .iter()
                .map(|m| m.site.values.get(idx).and_then(|v| v.as_deref()))
                .collect();
            Column::new(header.as_str().into(), values)
        })
        .collect();

    let distances: Vec<f64> = matches
        .iter()
        .map(|m| unit.from_km(m.unit.to_km(m.distance)))
        .collect();
    columns.push(Column::new(distance_column_name(unit).into(), distances));

    DataFrame::new(columns)
}

/// Writes a frame as CSV with a header row.
pub fn write_csv<W: Write>(frame: &mut DataFrame, writer: W) -> PolarsResult<()> {
    CsvWriter::new(writer).include_header(true).finish(frame)
}

/// Writes any serializable result set as pretty-printed JSON.
pub fn write_json<T: Serialize + ?Sized, W: Write>(
    value: &T,
    writer: W,
) -> Result<(), serde_json::Error> {
    serde_json::to_writer_pretty(writer, value)
}
