//! Command line front end: finds sites around a "latitude, longitude" point and prints
//! them as a table, CSV, JSON or per-site summaries.

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, ValueEnum};
use log::info;
use polars::prelude::{Column, DataFrame};
use site_locator::{
    matches_to_frame, write_csv, write_json, DistanceUnit, EnrichedSite, LatLon,
    ParcelClientConfig, SiteLocatorClient, SiteMatch,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;

/// Smallest accepted search radius, in miles, whatever `--unit` is used.
const MIN_RADIUS_MILES: f64 = 0.1;
const NO_RESULTS_MESSAGE: &str = "No sites found within the specified radius.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Table,
    Csv,
    Json,
    Summary,
}

#[derive(Parser, Debug)]
#[command(name = "site-locator")]
#[command(about = "Find radio and cell sites within a radius of a point")]
struct Args {
    /// Site dataset: a CSV file (optionally .gz) or an http(s) URL
    #[arg(short, long, env = "SITE_LOCATOR_DATA")]
    data: String,

    /// Search center as "latitude, longitude", e.g. "33.7490, -84.3880"
    #[arg(short, long, value_parser = LatLon::from_str, allow_hyphen_values = true)]
    location: LatLon,

    /// Search radius (at least 0.1 miles)
    #[arg(short, long, default_value_t = 0.2, value_parser = parse_radius)]
    radius: f64,

    /// Unit of the radius and the reported distances (mi or km)
    #[arg(short, long, default_value = "mi", value_parser = DistanceUnit::from_str)]
    unit: DistanceUnit,

    /// Keep only the closest N results
    #[arg(long, conflicts_with = "nearest")]
    limit: Option<usize>,

    /// Return the N nearest sites (within --radius) instead of every site in the radius
    #[arg(long)]
    nearest: Option<usize>,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Write results to a file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for the parsed dataset cache
    #[arg(long, env = "SITE_LOCATOR_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Neither read nor write the dataset cache
    #[arg(long, conflicts_with = "cache_dir")]
    no_cache: bool,

    /// Parcel service endpoint. When set, results are enriched with parcel data
    #[arg(long, env = "SITE_LOCATOR_PARCEL_ENDPOINT")]
    parcel_endpoint: Option<String>,

    /// API key sent to the parcel service
    #[arg(long, env = "SITE_LOCATOR_PARCEL_API_KEY", hide_env_values = true)]
    parcel_api_key: Option<String>,

    /// Header carrying the parcel API key
    #[arg(long, default_value = "apikey")]
    parcel_api_key_header: String,
}

/// Everything a search produced, ready to be rendered.
struct SearchOutcome {
    client: SiteLocatorClient,
    matches: Vec<SiteMatch>,
    enriched: Option<Vec<EnrichedSite>>,
}

fn parse_radius(s: &str) -> Result<f64, String> {
    let value: f64 = s
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", s))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(format!("'{}' is not a positive finite number", s));
    }
    Ok(value)
}

// The unit is only known once every argument is parsed.
fn check_minimum_radius(radius: f64, unit: DistanceUnit) -> Result<(), String> {
    let min_km = DistanceUnit::Miles.to_km(MIN_RADIUS_MILES);
    if unit.to_km(radius) + 1e-9 < min_km {
        return Err(format!(
            "radius must be at least {} miles ({:.4} {})",
            MIN_RADIUS_MILES,
            unit.from_km(min_km),
            unit.suffix()
        ));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set RUST_LOG=info (or debug) to see loading and cache messages.
    env_logger::init();

    let args = Args::parse();
    if let Err(message) = check_minimum_radius(args.radius, args.unit) {
        Args::command()
            .error(ErrorKind::ValueValidation, message)
            .exit();
    }

    let outcome = run(&args).await?;
    if outcome.matches.is_empty() {
        eprintln!("{}", NO_RESULTS_MESSAGE);
        return Ok(());
    }

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    render(args.format, &outcome, args.unit, &mut out)?;
    out.flush()?;
    Ok(())
}

async fn run(args: &Args) -> Result<SearchOutcome> {
    let mut client = if args.no_cache {
        SiteLocatorClient::without_cache(args.data.as_str()).await
    } else if let Some(dir) = &args.cache_dir {
        SiteLocatorClient::with_cache_folder(args.data.as_str(), dir.clone()).await
    } else {
        SiteLocatorClient::open(args.data.as_str()).await
    }
    .with_context(|| format!("Failed to load site data from {}", args.data))?;

    if let Some(endpoint) = &args.parcel_endpoint {
        let config = ParcelClientConfig::builder()
            .endpoint(endpoint.as_str())
            .maybe_api_key(args.parcel_api_key.clone())
            .api_key_header(args.parcel_api_key_header.as_str())
            .build();
        client = client.with_parcel_client(config)?;
    }

    let matches = match args.nearest {
        Some(n) => client
            .nearest_sites()
            .location(args.location)
            .limit(n)
            .max_distance(args.radius)
            .unit(args.unit)
            .call()?,
        None => client
            .find_sites()
            .location(args.location)
            .radius(args.radius)
            .unit(args.unit)
            .maybe_limit(args.limit)
            .call()?,
    };
    info!(
        "{} of {} sites within {} {} of {}",
        matches.len(),
        client.len(),
        args.radius,
        args.unit,
        args.location
    );

    let enriched = if client.has_parcel_client() && !matches.is_empty() {
        Some(client.enrich(matches.clone()).await?)
    } else {
        None
    };
    Ok(SearchOutcome {
        client,
        matches,
        enriched,
    })
}

// --- Output helpers ---

fn render<W: Write>(
    format: OutputFormat,
    outcome: &SearchOutcome,
    unit: DistanceUnit,
    out: &mut W,
) -> Result<()> {
    let enriched = outcome.enriched.as_deref();
    match format {
        OutputFormat::Table => {
            let frame = results_frame(&outcome.client, &outcome.matches, enriched, unit)?;
            writeln!(out, "{}", frame)?;
        }
        OutputFormat::Csv => {
            let mut frame = results_frame(&outcome.client, &outcome.matches, enriched, unit)?;
            write_csv(&mut frame, &mut *out)?;
        }
        OutputFormat::Json => {
            match enriched {
                Some(enriched) => write_json(enriched, &mut *out)?,
                None => write_json(&outcome.matches, &mut *out)?,
            }
            writeln!(out)?;
        }
        OutputFormat::Summary => write_summaries(out, &outcome.matches, enriched)?,
    }
    Ok(())
}

fn results_frame(
    client: &SiteLocatorClient,
    matches: &[SiteMatch],
    enriched: Option<&[EnrichedSite]>,
    unit: DistanceUnit,
) -> Result<DataFrame> {
    let mut frame = matches_to_frame(&client.dataset().headers, matches, unit)?;
    if let Some(enriched) = enriched {
        let text = |f: fn(&EnrichedSite) -> Option<String>| -> Vec<Option<String>> {
            enriched.iter().map(f).collect()
        };
        let number = |f: fn(&EnrichedSite) -> Option<f64>| -> Vec<Option<f64>> {
            enriched.iter().map(f).collect()
        };
        let columns = [
            Column::new(
                "PARCEL_ID".into(),
                text(|e| e.parcel.as_ref().and_then(|p| p.parcel_id.clone())),
            ),
            Column::new(
                "PARCEL_LAND_USE".into(),
                text(|e| e.parcel.as_ref().and_then(|p| p.land_use.clone())),
            ),
            Column::new(
                "PARCEL_BUILDING_SQFT".into(),
                number(|e| e.parcel.as_ref().and_then(|p| p.building_area_sqft)),
            ),
            Column::new(
                "PARCEL_LOT_ACRES".into(),
                number(|e| e.parcel.as_ref().and_then(|p| p.lot_size_acres)),
            ),
            Column::new(
                "PARCEL_YEAR_BUILT".into(),
                number(|e| e.parcel.as_ref().and_then(|p| p.year_built.map(f64::from))),
            ),
        ];
        for column in columns {
            frame.with_column(column)?;
        }
    }
    Ok(frame)
}

fn write_summaries<W: Write>(
    out: &mut W,
    matches: &[SiteMatch],
    enriched: Option<&[EnrichedSite]>,
) -> io::Result<()> {
    for (i, site_match) in matches.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        writeln!(out, "{}", site_match.site.summary())?;
        writeln!(
            out,
            "Distance: {:.3} {}",
            site_match.distance,
            site_match.unit.suffix()
        )?;
        let parcel = enriched.and_then(|e| e.get(i)).and_then(|e| e.parcel.as_ref());
        match parcel {
            Some(p) => {
                let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
                writeln!(out, "Parcel ID: {}", or_dash(&p.parcel_id))?;
                writeln!(out, "Land Use: {}", or_dash(&p.land_use))?;
                writeln!(
                    out,
                    "Building Area (sqft): {}",
                    p.building_area_sqft.map_or("-".to_string(), |v| v.to_string())
                )?;
                writeln!(
                    out,
                    "Year Built: {}",
                    p.year_built.map_or("-".to_string(), |v| v.to_string())
                )?;
            }
            None if enriched.is_some() => writeln!(out, "Parcel: not available")?,
            None => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use site_locator::{ParcelInfo, Site, SiteDataset};
    use std::io::Write as _;

    const CSV: &str = "SITE_NAME,LAT_DEC,LONG_DEC\n\
        Downtown,33.7490,-84.3880\n\
        Corner,33.7500,-84.3880\n";

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["site-locator", "--data", "sites.csv", "--location", "33.749, -84.388"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    fn client() -> SiteLocatorClient {
        let mut downtown = Site::new(0, LatLon(33.7490, -84.3880));
        downtown.site_name = Some("Downtown".to_string());
        downtown.values = vec![
            Some("Downtown".to_string()),
            Some("33.7490".to_string()),
            Some("-84.3880".to_string()),
        ];
        let mut corner = Site::new(1, LatLon(33.7500, -84.3880));
        corner.site_name = Some("Corner".to_string());
        corner.values = vec![
            Some("Corner".to_string()),
            Some("33.7500".to_string()),
            Some("-84.3880".to_string()),
        ];
        SiteLocatorClient::from_dataset(SiteDataset::new(
            vec!["SITE_NAME".into(), "LAT_DEC".into(), "LONG_DEC".into()],
            vec![downtown, corner],
        ))
    }

    fn enriched(matches: &[SiteMatch]) -> Vec<EnrichedSite> {
        let parcel = ParcelInfo {
            parcel_id: Some("14-0078".to_string()),
            land_use: Some("COMMERCIAL".to_string()),
            building_area_sqft: Some(12500.0),
            lot_size_acres: None,
            year_built: Some(1987),
            owner: None,
            address: None,
            raw: serde_json::Value::Null,
        };
        matches
            .iter()
            .enumerate()
            .map(|(i, m)| EnrichedSite {
                site_match: m.clone(),
                parcel: (i == 0).then(|| parcel.clone()),
            })
            .collect()
    }

    fn find_all(client: &SiteLocatorClient) -> Vec<SiteMatch> {
        client
            .find_sites()
            .location(LatLon(33.749, -84.388))
            .call()
            .unwrap()
    }

    #[test]
    fn test_parse_radius() {
        assert_eq!(parse_radius("0.2"), Ok(0.2));
        assert_eq!(parse_radius(" 5 "), Ok(5.0));
        assert!(parse_radius("far").is_err());
        assert!(parse_radius("0").is_err());
        assert!(parse_radius("-1").is_err());
        assert!(parse_radius("inf").is_err());
        assert!(parse_radius("NaN").is_err());
    }

    #[test]
    fn test_minimum_radius_is_in_miles() {
        assert!(check_minimum_radius(0.1, DistanceUnit::Miles).is_ok());
        assert!(check_minimum_radius(0.09, DistanceUnit::Miles).is_err());
        assert!(check_minimum_radius(0.1, DistanceUnit::Kilometers).is_err());
        assert!(check_minimum_radius(0.1609344, DistanceUnit::Kilometers).is_ok());
        assert!(check_minimum_radius(0.2, DistanceUnit::Kilometers).is_ok());
    }

    #[test]
    fn test_argument_parsing() {
        let parsed = args(&[]);
        assert_eq!(parsed.radius, 0.2);
        assert_eq!(parsed.unit, DistanceUnit::Miles);
        assert_eq!(parsed.format, OutputFormat::Table);
        assert_eq!(parsed.location, LatLon(33.749, -84.388));

        let southern = Args::try_parse_from([
            "site-locator",
            "--data",
            "sites.csv",
            "--location",
            "-33.8688, 151.2093",
            "--unit",
            "km",
        ])
        .unwrap();
        assert_eq!(southern.location, LatLon(-33.8688, 151.2093));
        assert_eq!(southern.unit, DistanceUnit::Kilometers);

        assert!(Args::try_parse_from(["site-locator", "--data", "x", "--location", "33.7"]).is_err());
    }

    #[test]
    fn test_limit_conflicts_with_nearest() {
        let argv = [
            "site-locator",
            "--data",
            "sites.csv",
            "--location",
            "33.749, -84.388",
            "--nearest",
            "3",
            "--limit",
            "2",
        ];
        let err = Args::try_parse_from(argv).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_results_frame_appends_parcel_columns() {
        let client = client();
        let matches = find_all(&client);
        let enriched = enriched(&matches);

        let plain = results_frame(&client, &matches, None, DistanceUnit::Miles).unwrap();
        assert_eq!(plain.shape(), (2, 4));

        let frame =
            results_frame(&client, &matches, Some(&enriched), DistanceUnit::Miles).unwrap();
        let names: Vec<String> = frame
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "SITE_NAME",
                "LAT_DEC",
                "LONG_DEC",
                "DISTANCE_MI",
                "PARCEL_ID",
                "PARCEL_LAND_USE",
                "PARCEL_BUILDING_SQFT",
                "PARCEL_LOT_ACRES",
                "PARCEL_YEAR_BUILT",
            ]
        );
        let ids = frame.column("PARCEL_ID").unwrap().str().unwrap();
        assert_eq!(ids.get(0), Some("14-0078"));
        assert_eq!(ids.get(1), None);
        let years = frame.column("PARCEL_YEAR_BUILT").unwrap().f64().unwrap();
        assert_eq!(years.get(0), Some(1987.0));
    }

    #[test]
    fn test_write_summaries() {
        let client = client();
        let matches = find_all(&client);

        let mut plain = Vec::new();
        write_summaries(&mut plain, &matches, None).unwrap();
        let plain = String::from_utf8(plain).unwrap();
        assert!(plain.starts_with("Site Name: Downtown\n"));
        assert!(plain.contains("Distance: 0.000 mi\n"));
        assert!(!plain.contains("Parcel"));

        let enriched = enriched(&matches);
        let mut out = Vec::new();
        write_summaries(&mut out, &matches, Some(&enriched)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Parcel ID: 14-0078\n"));
        assert!(text.contains("Year Built: 1987\n"));
        assert!(text.trim_end().ends_with("Parcel: not available"));
    }

    #[tokio::test]
    async fn test_run_with_no_matches() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();
        file.flush().unwrap();
        let data = file.path().to_string_lossy().to_string();

        let argv = [
            "site-locator",
            "--data",
            data.as_str(),
            "--location",
            "40.7128, -74.0060",
            "--no-cache",
        ];
        let outcome = run(&Args::try_parse_from(argv).unwrap()).await.unwrap();
        assert!(outcome.matches.is_empty());
        assert!(outcome.enriched.is_none());
        assert_eq!(outcome.client.len(), 2);

        let argv = [
            "site-locator",
            "--data",
            data.as_str(),
            "--location",
            "33.749, -84.388",
            "--no-cache",
            "--format",
            "json",
        ];
        let args = Args::try_parse_from(argv).unwrap();
        let outcome = run(&args).await.unwrap();
        assert_eq!(outcome.matches.len(), 2);
        let mut out = Vec::new();
        render(args.format, &outcome, args.unit, &mut out).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(2));
    }
}
