use crate::sites::error::LoadSitesError;
use crate::types::site::{RowRejection, Site, SiteColumns};
use async_compression::tokio::bufread::GzipDecoder;
use bincode::config::{Configuration, Fixint, LittleEndian};
use futures_util::TryStreamExt;
use log::{debug, info, warn};
use polars::prelude::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::task;
use tokio_util::io::StreamReader;

const BINCODE_CONFIG: Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_fixed_int_encoding();
// Bump when the cached layout of `SiteDataset` changes.
const CACHE_FORMAT_VERSION: u32 = 1;
/// Default upper bound on the decompressed size of a dataset.
pub const DEFAULT_MAX_SOURCE_BYTES: u64 = 1024 * 1024 * 1024;
const UTF8_BOM: char = '\u{feff}';

/// Where a site dataset is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteSource {
    /// A CSV file on the local filesystem. `.gz` files are decompressed.
    Path(PathBuf),
    /// A CSV file served over `http` or `https`. `.gz` URLs are decompressed.
    Url(String),
}

impl SiteSource {
    /// Interprets `input` as a URL when it starts with `http://` or `https://`,
    /// and as a filesystem path otherwise.
    pub fn parse(input: &str) -> Self {
        let lower = input.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            SiteSource::Url(input.to_string())
        } else {
            SiteSource::Path(PathBuf::from(input))
        }
    }

    fn is_gzip(&self) -> bool {
        match self {
            SiteSource::Path(path) => path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("gz")),
            SiteSource::Url(url) => {
                let without_query = url.split(['?', '#']).next().unwrap_or(url);
                without_query.to_ascii_lowercase().ends_with(".gz")
            }
        }
    }
}

impl From<&str> for SiteSource {
    fn from(value: &str) -> Self {
        SiteSource::parse(value)
    }
}

impl From<PathBuf> for SiteSource {
    fn from(value: PathBuf) -> Self {
        SiteSource::Path(value)
    }
}

impl From<&Path> for SiteSource {
    fn from(value: &Path) -> Self {
        SiteSource::Path(value.to_path_buf())
    }
}

impl fmt::Display for SiteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiteSource::Path(path) => write!(f, "{}", path.display()),
            SiteSource::Url(url) => write!(f, "{}", url),
        }
    }
}

/// A cleaned site dataset: the original header row and every row with usable coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDataset {
    /// Column names in file order.
    pub headers: Vec<String>,
    pub sites: Vec<Site>,
    /// Rows dropped because latitude or longitude was empty.
    pub missing_coordinates: usize,
    /// Rows dropped because latitude or longitude was not a valid coordinate.
    pub invalid_coordinates: usize,
}

impl SiteDataset {
    /// Wraps already validated sites, e.g. ones built in memory rather than read from a file.
    pub fn new(headers: Vec<String>, sites: Vec<Site>) -> Self {
        SiteDataset {
            headers,
            sites,
            missing_coordinates: 0,
            invalid_coordinates: 0,
        }
    }

    /// Total number of data rows in the source, including dropped ones.
    pub fn source_rows(&self) -> usize {
        self.sites.len() + self.missing_coordinates + self.invalid_coordinates
    }
}

#[derive(Serialize, Deserialize)]
struct CachedDataset {
    fingerprint: u64,
    dataset: SiteDataset,
}

/// Reads site datasets from files or URLs, caching parsed local files on disk.
pub struct SiteLoader {
    cache_dir: Option<PathBuf>,
    download_client: Client,
    max_source_bytes: u64,
}

impl SiteLoader {
    /// Creates a loader. With `cache_dir` set to `None`, nothing is read from or written to disk
    /// besides the source itself.
    pub fn new(cache_dir: Option<&Path>) -> SiteLoader {
        SiteLoader {
            cache_dir: cache_dir.map(Path::to_path_buf),
            download_client: Client::new(),
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
        }
    }

    /// Uses `client` for downloads instead of a default `reqwest::Client`.
    pub fn with_http_client(mut self, client: Client) -> SiteLoader {
        self.download_client = client;
        self
    }

    /// Rejects sources whose (decompressed) content exceeds `limit` bytes.
    pub fn with_max_source_bytes(mut self, limit: u64) -> SiteLoader {
        self.max_source_bytes = limit;
        self
    }

    pub async fn load(&self, source: &SiteSource) -> Result<SiteDataset, LoadSitesError> {
        match source {
            SiteSource::Path(path) => self.load_file(path, source.is_gzip()).await,
            SiteSource::Url(url) => {
                let bytes = self.download(url, source.is_gzip()).await?;
                Self::parse_bytes(bytes).await
            }
        }
    }

    async fn load_file(&self, path: &Path, gzip: bool) -> Result<SiteDataset, LoadSitesError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| LoadSitesError::SourceRead(path.to_path_buf(), e))?;
        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(|e| LoadSitesError::SourceRead(path.to_path_buf(), e))?;
        let fingerprint = Self::fingerprint(&canonical, &metadata);
        let cache_file = self
            .cache_dir
            .as_ref()
            .map(|dir| dir.join(Self::cache_file_name(&canonical)));

        if let Some(cache_file) = &cache_file {
            if tokio::fs::metadata(cache_file).await.is_ok() {
                let path_clone = cache_file.clone();
                match task::spawn_blocking(move || Self::read_cache(&path_clone)).await? {
                    Ok(cached) if cached.fingerprint == fingerprint => {
                        info!(
                            "Cache hit for {} ({} sites) at {}",
                            path.display(),
                            cached.dataset.sites.len(),
                            cache_file.display()
                        );
                        return Ok(cached.dataset);
                    }
                    Ok(_) => info!("Cache for {} is stale, reloading", path.display()),
                    Err(e) => warn!("Ignoring unreadable cache {}: {}", cache_file.display(), e),
                }
            }
        }

        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| LoadSitesError::SourceRead(path.to_path_buf(), e))?;
        let bytes = if gzip {
            self.read_all(GzipDecoder::new(BufReader::new(file))).await?
        } else {
            self.read_all(file).await?
        };
        let load_start = std::time::Instant::now();
        let dataset = Self::parse_bytes(bytes).await?;
        info!(
            "Parsed {} sites from {} in {:?}",
            dataset.sites.len(),
            path.display(),
            load_start.elapsed()
        );

        if let Some(cache_file) = cache_file {
            let cached = CachedDataset {
                fingerprint,
                dataset,
            };
            let (cached, result) =
                task::spawn_blocking(move || {
                    let result = Self::write_cache(&cached, &cache_file);
                    (cached, result)
                })
                .await?;
            if let Err(e) = result {
                warn!("Could not cache parsed sites: {}", e);
            }
            return Ok(cached.dataset);
        }

        Ok(dataset)
    }

    /// Reads the whole source, failing instead of truncating when it is larger than
    /// the configured limit.
    async fn read_all<R: AsyncRead + Unpin>(&self, reader: R) -> Result<Vec<u8>, LoadSitesError> {
        let limit = self.max_source_bytes;
        let mut bytes = Vec::new();
        reader
            .take(limit.saturating_add(1))
            .read_to_end(&mut bytes)
            .await?;
        if bytes.len() as u64 > limit {
            return Err(LoadSitesError::SourceTooLarge { limit });
        }
        Ok(bytes)
    }

    /// Downloads a dataset, decompressing it when `gzip` is set.
    async fn download(&self, url: &str, gzip: bool) -> Result<Vec<u8>, LoadSitesError> {
        info!("Downloading site data from {}", url);
        let response = self
            .download_client
            .get(url)
            .send()
            .await
            .map_err(|e| LoadSitesError::NetworkRequest(url.to_string(), e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("HTTP error for {}: {:?}", url, e);
                return Err(if let Some(status) = e.status() {
                    LoadSitesError::HttpStatus {
                        url: url.to_string(),
                        status,
                        source: e,
                    }
                } else {
                    LoadSitesError::NetworkRequest(url.to_string(), e)
                });
            }
        };

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let stream_reader = StreamReader::new(stream);
        let bytes = if gzip {
            self.read_all(GzipDecoder::new(BufReader::new(stream_reader))).await?
        } else {
            self.read_all(stream_reader).await?
        };
        info!("Downloaded {} bytes of site data", bytes.len());
        Ok(bytes)
    }

    /// Parses raw CSV bytes into a [`SiteDataset`] on a blocking task.
    pub async fn parse_bytes(bytes: Vec<u8>) -> Result<SiteDataset, LoadSitesError> {
        task::spawn_blocking(move || parse_csv(bytes)).await?
    }

    // --- Cache helpers ---

    fn fingerprint(canonical: &Path, metadata: &std::fs::Metadata) -> u64 {
        let mut hasher = DefaultHasher::new();
        CACHE_FORMAT_VERSION.hash(&mut hasher);
        canonical.hash(&mut hasher);
        metadata.len().hash(&mut hasher);
        metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .hash(&mut hasher);
        hasher.finish()
    }

    fn cache_file_name(canonical: &Path) -> String {
        let mut hasher = DefaultHasher::new();
        canonical.hash(&mut hasher);
        let stem = canonical
            .file_stem()
            .map(|s| s.to_string_lossy().replace(|c: char| !c.is_ascii_alphanumeric(), "_"))
            .unwrap_or_else(|| "sites".to_string());
        format!("{}-{:016x}.bin", stem, hasher.finish())
    }

    fn read_cache(cache_path: &Path) -> Result<CachedDataset, LoadSitesError> {
        let bytes = std::fs::read(cache_path)
            .map_err(|e| LoadSitesError::CacheRead(cache_path.to_path_buf(), e))?;
        let (cached, _) =
            bincode::serde::decode_from_slice::<CachedDataset, _>(&bytes, BINCODE_CONFIG)
                .map_err(|e| LoadSitesError::CacheDecode(cache_path.to_path_buf(), Box::new(e)))?;
        Ok(cached)
    }

    fn write_cache(cached: &CachedDataset, cache_path: &Path) -> Result<(), LoadSitesError> {
        let cache_start = std::time::Instant::now();
        let data = bincode::serde::encode_to_vec(cached, BINCODE_CONFIG)
            .map_err(|e| LoadSitesError::CacheEncode(Box::new(e)))?;
        let dir = cache_path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .map_err(|e| LoadSitesError::CacheWrite(dir.to_path_buf(), e))?;

        let mut temp_file = NamedTempFile::new_in(dir)
            .map_err(|e| LoadSitesError::CacheWrite(cache_path.to_path_buf(), e))?;
        temp_file
            .write_all(&data)
            .and_then(|_| temp_file.flush())
            .map_err(|e| LoadSitesError::CacheWrite(cache_path.to_path_buf(), e))?;
        temp_file
            .persist(cache_path)
            .map_err(|e| LoadSitesError::CacheWrite(cache_path.to_path_buf(), e.error))?;
        debug!(
            "Wrote site cache ({} bytes) to {} in {:?}",
            data.len(),
            cache_path.display(),
            cache_start.elapsed()
        );
        Ok(())
    }
}

/// Decodes file bytes as UTF-8, falling back to ISO-8859-1 (Latin-1) when the bytes are
/// not valid UTF-8. A leading byte order mark is removed.
pub(crate) fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            warn!(
                "Site data is not valid UTF-8 ({}), decoding as ISO-8859-1",
                e.utf8_error()
            );
            // Every Latin-1 byte maps to the Unicode code point of the same value.
            e.into_bytes().into_iter().map(char::from).collect()
        }
    };
    match text.strip_prefix(UTF8_BOM) {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

/// Parses CSV text with a header row into a [`SiteDataset`].
///
/// Every column is read as text; coordinates and numeric attributes are parsed per row
/// so that one malformed cell only drops its own row.
pub(crate) fn parse_csv(bytes: Vec<u8>) -> Result<SiteDataset, LoadSitesError> {
    let text = decode_text(bytes);
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(text.into_bytes()))
        .finish()?;

    let headers: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();
    let columns =
        SiteColumns::resolve(&headers).ok_or_else(|| LoadSitesError::MissingCoordinateColumns {
            found: headers.clone(),
        })?;

    let text_columns: Vec<Column> = df
        .get_columns()
        .iter()
        .map(|c| c.cast(&DataType::String))
        .collect::<PolarsResult<_>>()?;
    let text_columns: Vec<&StringChunked> = text_columns
        .iter()
        .map(|c| c.str())
        .collect::<PolarsResult<_>>()?;

    let mut sites = Vec::with_capacity(df.height());
    let mut missing_coordinates = 0;
    let mut invalid_coordinates = 0;
    for row in 0..df.height() {
        let values = text_columns
            .iter()
            .map(|ca| ca.get(row).map(str::to_string))
            .collect();
        match columns.build_site(row, values) {
            Ok(site) => sites.push(site),
            Err(RowRejection::MissingCoordinates) => missing_coordinates += 1,
            Err(RowRejection::InvalidCoordinates) => invalid_coordinates += 1,
        }
    }

    if missing_coordinates > 0 {
        debug!(
            "Dropped {} rows with missing latitude/longitude",
            missing_coordinates
        );
    }
    if invalid_coordinates > 0 {
        warn!(
            "Dropped {} rows with unparseable or out-of-range latitude/longitude",
            invalid_coordinates
        );
    }
    if sites.is_empty() {
        return Err(LoadSitesError::NoValidCoordinates { rows: df.height() });
    }

    Ok(SiteDataset {
        headers,
        sites,
        missing_coordinates,
        invalid_coordinates,
    })
}
