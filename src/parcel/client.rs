//! HTTP client that enriches site matches with building/parcel attributes from a
//! JSON web service.

use crate::parcel::error::ParcelError;
use crate::parcel::fields::{ParcelFieldMap, ParcelInfo};
use crate::types::lat_lon::LatLon;
use crate::types::site::SiteMatch;
use bon::Builder;
use futures_util::stream::{self, StreamExt};
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Connection and request settings for a parcel service.
///
/// Only the endpoint is required; the service is queried with
/// `GET {endpoint}?{latitude_param}={lat}&{longitude_param}={lon}` plus any
/// `extra_query` pairs.
///
/// # Examples
///
/// ```
/// use site_locator::ParcelClientConfig;
/// use std::time::Duration;
///
/// let config = ParcelClientConfig::builder()
///     .endpoint("https://parcels.example.com/v1/lookup")
///     .api_key("secret")
///     .timeout(Duration::from_secs(5))
///     .build();
/// assert_eq!(config.latitude_param, "latitude");
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Debug, Clone, Builder)]
pub struct ParcelClientConfig {
    #[builder(into)]
    pub endpoint: String,
    #[builder(into)]
    pub api_key: Option<String>,
    #[builder(into, default = "apikey".to_string())]
    pub api_key_header: String,
    #[builder(into, default = "latitude".to_string())]
    pub latitude_param: String,
    #[builder(into, default = "longitude".to_string())]
    pub longitude_param: String,
    #[builder(default)]
    pub extra_query: Vec<(String, String)>,
    #[builder(default)]
    pub fields: ParcelFieldMap,
    #[builder(default = Duration::from_secs(10))]
    pub timeout: Duration,
    /// Maximum number of lookups in flight during [`ParcelClient::enrich`].
    #[builder(default = 4)]
    pub concurrency: usize,
    /// Honour `HTTP_PROXY`/`HTTPS_PROXY` style environment variables.
    #[builder(default = true)]
    pub system_proxy: bool,
}

/// A site match together with the parcel it stands on, when the lookup succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSite {
    pub site_match: SiteMatch,
    pub parcel: Option<ParcelInfo>,
}

pub struct ParcelClient {
    config: ParcelClientConfig,
    http: Client,
}

impl ParcelClient {
    pub fn new(config: ParcelClientConfig) -> Result<Self, ParcelError> {
        let mut builder = Client::builder().timeout(config.timeout);
        if !config.system_proxy {
            builder = builder.no_proxy();
        }
        let http = builder.build().map_err(ParcelError::ClientBuild)?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ParcelClientConfig {
        &self.config
    }

    /// Looks up the parcel at `location`.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the service answers `404 Not Found` or its response holds no
    /// parcel record; `Ok(Some(_))` with the mapped attributes otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ParcelError`] for connection failures, timeouts, non-success statuses
    /// other than 404, and bodies that are not JSON.
    pub async fn lookup(&self, location: LatLon) -> Result<Option<ParcelInfo>, ParcelError> {
        let url = &self.config.endpoint;
        let mut request = self
            .http
            .get(url)
            .query(&[
                (self.config.latitude_param.as_str(), location.0.to_string()),
                (self.config.longitude_param.as_str(), location.1.to_string()),
            ])
            .query(&self.config.extra_query);
        if let Some(key) = &self.config.api_key {
            request = request.header(self.config.api_key_header.as_str(), key.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ParcelError::NetworkRequest(url.clone(), e))?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("No parcel at {} ({} returned 404)", location, url);
            return Ok(None);
        }
        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                return Err(if let Some(status) = e.status() {
                    ParcelError::HttpStatus {
                        url: url.clone(),
                        status,
                        source: e,
                    }
                } else {
                    ParcelError::NetworkRequest(url.clone(), e)
                });
            }
        };

        let body: Value = response
            .json()
            .await
            .map_err(|e| ParcelError::Decode(url.clone(), e))?;
        Ok(self.config.fields.extract(&body))
    }

    /// Looks up the parcel for every match, keeping the input order.
    ///
    /// Lookups run with at most [`ParcelClientConfig::concurrency`] requests in flight.
    /// A failed lookup is logged and leaves that site's `parcel` empty; it never fails
    /// the whole batch.
    pub async fn enrich(&self, matches: Vec<SiteMatch>) -> Vec<EnrichedSite> {
        stream::iter(matches)
            .map(|site_match| async move {
                let parcel = match self.lookup(site_match.site.location).await {
                    Ok(parcel) => parcel,
                    Err(e) => {
                        warn!(
                            "Parcel lookup failed for site row {} at {}: {}",
                            site_match.site.row, site_match.site.location, e
                        );
                        None
                    }
                };
                EnrichedSite { site_match, parcel }
            })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve, ReceivedRequest};
    use crate::types::distance::DistanceUnit;
    use crate::types::site::Site;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    fn client(base: &str) -> ParcelClient {
        ParcelClient::new(
            ParcelClientConfig::builder()
                .endpoint(format!("{}/parcel", base))
                .api_key("secret")
                .api_key_header("X-Api-Key")
                .system_proxy(false)
                .build(),
        )
        .unwrap()
    }

    fn site_match(row: usize, location: LatLon) -> SiteMatch {
        SiteMatch {
            site: Site::new(row, location),
            distance: 0.1,
            unit: DistanceUnit::Miles,
        }
    }

    fn json(status: StatusCode, body: &str) -> (StatusCode, Vec<u8>) {
        (status, body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_lookup_sends_query_and_key() {
        let seen: Arc<Mutex<Option<ReceivedRequest>>> = Arc::new(Mutex::new(None));
        let seen_clone = seen.clone();
        let base = serve(move |request| {
            *seen_clone.lock().unwrap() = Some(request.clone());
            json(StatusCode::OK, r#"{"parcel_id": "A-1", "year_built": "1975"}"#)
        })
        .await;

        let info = client(&base)
            .lookup(LatLon(33.749, -84.388))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.parcel_id.as_deref(), Some("A-1"));
        assert_eq!(info.year_built, Some(1975));

        let request = seen.lock().unwrap().clone().unwrap();
        assert_eq!(request.uri, "/parcel?latitude=33.749&longitude=-84.388");
        assert_eq!(request.header("x-api-key"), Some("secret"));
    }

    #[tokio::test]
    async fn test_lookup_not_found_is_none() {
        let base = serve(|_| json(StatusCode::NOT_FOUND, "{}")).await;
        let result = client(&base).lookup(LatLon(1.0, 1.0)).await.unwrap();
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_lookup_server_error() {
        let base = serve(|_| json(StatusCode::INTERNAL_SERVER_ERROR, "{}")).await;
        let err = client(&base).lookup(LatLon(1.0, 1.0)).await.unwrap_err();
        match err {
            ParcelError::HttpStatus { status, .. } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR)
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_lookup_invalid_json() {
        let base = serve(|_| json(StatusCode::OK, "<html>")).await;
        let err = client(&base).lookup(LatLon(1.0, 1.0)).await.unwrap_err();
        assert!(matches!(err, ParcelError::Decode(..)));
    }

    #[tokio::test]
    async fn test_enrich_falls_back_per_site() {
        // Fail every lookup south of the equator.
        let base = serve(|request| {
            if request.uri.contains("latitude=-") {
                json(StatusCode::SERVICE_UNAVAILABLE, "{}")
            } else {
                json(StatusCode::OK, r#"{"land_use": "INDUSTRIAL"}"#)
            }
        })
        .await;

        let matches = vec![
            site_match(0, LatLon(10.0, 10.0)),
            site_match(1, LatLon(-10.0, 10.0)),
            site_match(2, LatLon(20.0, 10.0)),
        ];
        let enriched = client(&base).enrich(matches).await;
        let rows: Vec<usize> = enriched.iter().map(|e| e.site_match.site.row).collect();
        assert_eq!(rows, vec![0, 1, 2]);
        assert_eq!(
            enriched[0].parcel.as_ref().and_then(|p| p.land_use.as_deref()),
            Some("INDUSTRIAL")
        );
        assert_eq!(enriched[1].parcel, None);
        assert!(enriched[2].parcel.is_some());
    }

    #[tokio::test]
    async fn test_enrich_unreachable_service() {
        // Bind then drop a listener so the port is very likely closed.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let enriched = client(&format!("http://{}", addr))
            .enrich(vec![site_match(0, LatLon(1.0, 1.0))])
            .await;
        assert_eq!(enriched.len(), 1);
        assert_eq!(enriched[0].parcel, None);
    }
}
