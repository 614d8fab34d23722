//! Overpass (OpenStreetMap) facility discovery with endpoint failover

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use sentinel_core::config::DiscoveryConfig;
use sentinel_core::{
    Coordinate, Facility, FacilityDiscovery, FacilityKind, Result, SentinelError,
};

use crate::http::{build_client, map_send_error, read_json};

/// Elements requested from the server per query
const QUERY_LIMIT: usize = 25;

const DEFAULT_ADDRESS: &str = "Medical facility near you";

/// Hospital and clinic lookup against a list of Overpass interpreters
pub struct OverpassClient {
    endpoints: Vec<String>,
    max_results: usize,
    client: reqwest::Client,
    timeout: Duration,
}

impl OverpassClient {
    pub fn new(config: &DiscoveryConfig) -> Result<Self> {
        Ok(Self {
            endpoints: config.overpass_endpoints.clone(),
            max_results: config.max_results,
            client: build_client(config.timeout)?,
            timeout: config.timeout,
        })
    }

    async fn query_endpoint(&self, endpoint: &str, query: &str) -> Result<Vec<Facility>> {
        let response = self
            .client
            .post(endpoint)
            .form(&[("data", query)])
            .send()
            .await
            .map_err(|e| map_send_error(e, endpoint, self.timeout))?;

        let body: OverpassResponse = read_json(response).await?;
        debug!("{} returned {} elements", endpoint, body.elements.len());
        Ok(parse_elements(body.elements, self.max_results))
    }
}

/// Overpass QL for hospitals and clinics within `radius_km`
pub fn build_query(center: Coordinate, radius_km: f64) -> String {
    let radius_m = (radius_km * 1000.0).round() as u64;
    format!(
        "[out:json][timeout:30];\n(\n  nwr[\"amenity\"=\"hospital\"](around:{r},{lat},{lng});\n  nwr[\"amenity\"=\"clinic\"](around:{r},{lat},{lng});\n);\nout center body qt {QUERY_LIMIT};",
        r = radius_m,
        lat = center.lat,
        lng = center.lng,
    )
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    id: u64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

impl OverpassElement {
    fn coordinate(&self) -> Option<Coordinate> {
        let (lat, lng) = match (&self.center, self.lat, self.lon) {
            (Some(center), _, _) => (center.lat, center.lon),
            (None, Some(lat), Some(lon)) => (lat, lon),
            _ => return None,
        };
        Coordinate::checked(lat, lng).ok()
    }

    fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    fn address(&self) -> String {
        let parts: Vec<&str> = [
            self.tag("addr:housenumber"),
            self.tag("addr:street"),
            self.tag("addr:suburb").or_else(|| self.tag("addr:city")),
        ]
        .into_iter()
        .flatten()
        .collect();

        if parts.is_empty() {
            DEFAULT_ADDRESS.to_string()
        } else {
            parts.join(", ")
        }
    }

    fn into_facility(self) -> Option<Facility> {
        let name = self.tag("name:en").or_else(|| self.tag("name"))?.to_string();
        let coordinate = self.coordinate()?;
        let kind = FacilityKind::from_amenity(self.tag("amenity").unwrap_or("hospital"));

        Some(
            Facility::new(format!("osm-{}", self.id), name, coordinate, kind)
                .with_address(self.address())
                .with_maps_uri(maps_search_uri(coordinate)),
        )
    }
}

/// Google Maps search link for a coordinate
pub fn maps_search_uri(at: Coordinate) -> String {
    format!(
        "https://www.google.com/maps/search/?api=1&query={},{}",
        at.lat, at.lng
    )
}

fn parse_elements(elements: Vec<OverpassElement>, max_results: usize) -> Vec<Facility> {
    elements
        .into_iter()
        .filter_map(OverpassElement::into_facility)
        .take(max_results)
        .collect()
}

/// Parse an Overpass JSON body into facilities
pub fn parse_response(body: &str, max_results: usize) -> Result<Vec<Facility>> {
    let response: OverpassResponse =
        serde_json::from_str(body).map_err(|e| SentinelError::MalformedResponse(e.to_string()))?;
    Ok(parse_elements(response.elements, max_results))
}

#[async_trait]
impl FacilityDiscovery for OverpassClient {
    /// Tries each endpoint in order. The first one yielding at least one
    /// named facility wins; an empty answer moves on to the next endpoint.
    async fn discover(&self, center: Coordinate, radius_km: f64) -> Result<Vec<Facility>> {
        let query = build_query(center, radius_km);
        let mut answered = false;
        let mut last_error = None;

        for endpoint in &self.endpoints {
            debug!("Trying Overpass endpoint {}", endpoint);
            match self.query_endpoint(endpoint, &query).await {
                Ok(facilities) if !facilities.is_empty() => {
                    info!("Found {} facilities via {}", facilities.len(), endpoint);
                    return Ok(facilities);
                }
                Ok(_) => {
                    answered = true;
                    debug!("{} returned no named facilities", endpoint);
                }
                Err(e) => {
                    warn!("Overpass endpoint {} failed: {}", endpoint, e);
                    last_error = Some(e);
                }
            }
        }

        match (answered, last_error) {
            (true, _) | (false, None) => Ok(Vec::new()),
            (false, Some(e)) => Err(SentinelError::DiscoveryFailed(format!(
                "all Overpass endpoints failed, last error: {e}"
            ))),
        }
    }

    fn name(&self) -> &str {
        "overpass"
    }
}
