//! Gemini discovery fallback grounded on Google Maps

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use sentinel_core::config::GeminiConfig;
use sentinel_core::{
    Coordinate, Facility, FacilityDiscovery, FacilityKind, Result, SentinelError,
};

use crate::http::{build_client, map_send_error, read_json};
use crate::overpass::maps_search_uri;

/// Asks a Gemini model for nearby facilities using the Maps grounding tool
pub struct GeminiDiscovery {
    config: GeminiConfig,
    client: reqwest::Client,
    timeout: Duration,
}

impl GeminiDiscovery {
    pub fn new(config: GeminiConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            config,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

/// Request body for `generateContent` with Maps grounding
pub fn build_request(center: Coordinate, radius_km: f64) -> serde_json::Value {
    json!({
        "contents": [{
            "parts": [{
                "text": format!(
                    "Find hospitals and medical centers within {radius_km}km of {}, {}",
                    center.lat, center.lng
                )
            }]
        }],
        "tools": [{ "googleMaps": {} }],
        "toolConfig": {
            "retrievalConfig": {
                "latLng": { "latitude": center.lat, "longitude": center.lng }
            }
        }
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Deserialize)]
struct GroundingChunk {
    maps: Option<MapsChunk>,
}

#[derive(Debug, Deserialize)]
struct MapsChunk {
    title: Option<String>,
    address: Option<String>,
    uri: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
}

fn into_facilities(response: GenerateResponse) -> Vec<Facility> {
    let chunks = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.grounding_metadata)
        .map(|m| m.grounding_chunks)
        .unwrap_or_default();

    chunks
        .into_iter()
        .enumerate()
        .filter_map(|(index, chunk)| {
            let maps = chunk.maps?;
            let coordinate = Coordinate::checked(maps.lat?, maps.lng?).ok()?;
            let name = maps.title.unwrap_or_else(|| "Medical Facility".to_string());
            let uri = maps.uri.unwrap_or_else(|| maps_search_uri(coordinate));
            let address = maps
                .address
                .unwrap_or_else(|| "Location via Google Maps".to_string());

            Some(
                Facility::new(format!("gmaps-{index}"), name, coordinate, FacilityKind::Hospital)
                    .with_address(address)
                    .with_maps_uri(uri),
            )
        })
        .collect()
}

/// Parse a `generateContent` body into facilities; chunks without coordinates are skipped
pub fn parse_response(body: &str) -> Result<Vec<Facility>> {
    let response: GenerateResponse =
        serde_json::from_str(body).map_err(|e| SentinelError::MalformedResponse(e.to_string()))?;
    Ok(into_facilities(response))
}

#[async_trait]
impl FacilityDiscovery for GeminiDiscovery {
    async fn discover(&self, center: Coordinate, radius_km: f64) -> Result<Vec<Facility>> {
        let endpoint = self.endpoint();
        debug!("Gemini discovery via {}", endpoint);

        let response = self
            .client
            .post(&endpoint)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&build_request(center, radius_km))
            .send()
            .await
            .map_err(|e| map_send_error(e, &endpoint, self.timeout))?;

        let body: GenerateResponse = read_json(response).await?;
        let facilities = into_facilities(body);
        info!("Gemini returned {} grounded facilities", facilities.len());
        Ok(facilities)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
