//! OSRM road routing

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use sentinel_core::config::RoutingConfig;
use sentinel_core::{Coordinate, Result, RoutePolyline, RouteSource, RoutingClient, SentinelError};

use crate::http::{build_client, map_send_error, read_json};

/// Routing client for an OSRM `route/v1` service
pub struct OsrmClient {
    base_url: String,
    profile: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OsrmClient {
    pub fn new(config: &RoutingConfig) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            profile: config.profile.clone(),
            client: build_client(config.timeout)?,
            timeout: config.timeout,
        })
    }

    /// Request URL for a full-geometry route
    pub fn route_url(&self, origin: Coordinate, destination: Coordinate) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}?overview=full&geometries=geojson",
            self.base_url, self.profile, origin.lng, origin.lat, destination.lng, destination.lat
        )
    }
}

#[derive(Debug, Deserialize)]
struct OsrmResponse {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    /// Meters
    distance: f64,
    /// Seconds
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    /// GeoJSON order: `[lng, lat]`
    coordinates: Vec<[f64; 2]>,
}

/// Parse an OSRM route response body into a polyline
pub fn parse_route(body: &str, origin: Coordinate, destination: Coordinate) -> Result<RoutePolyline> {
    let response: OsrmResponse =
        serde_json::from_str(body).map_err(|e| SentinelError::MalformedResponse(e.to_string()))?;
    into_polyline(response, origin, destination)
}

fn into_polyline(
    response: OsrmResponse,
    origin: Coordinate,
    destination: Coordinate,
) -> Result<RoutePolyline> {
    if response.code != "Ok" {
        return Err(SentinelError::RoutingFailed(match response.message {
            Some(message) => format!("{}: {}", response.code, message),
            None => response.code,
        }));
    }

    let route = response
        .routes
        .into_iter()
        .next()
        .ok_or_else(|| SentinelError::NoRoute {
            from: origin.to_string(),
            to: destination.to_string(),
        })?;

    let points: Vec<Coordinate> = route
        .geometry
        .coordinates
        .iter()
        .map(|[lng, lat]| Coordinate::new(*lat, *lng))
        .collect();

    if points.iter().any(|p| !p.is_valid()) {
        return Err(SentinelError::MalformedResponse(
            "route geometry contains invalid coordinates".into(),
        ));
    }

    let duration_min = (route.duration / 60.0).ceil().max(0.0) as u32;
    RoutePolyline::new(points, route.distance / 1000.0, duration_min, RouteSource::Road)
        .ok_or_else(|| SentinelError::MalformedResponse("route geometry is empty".into()))
}

#[async_trait]
impl RoutingClient for OsrmClient {
    async fn route(&self, origin: Coordinate, destination: Coordinate) -> Result<RoutePolyline> {
        let url = self.route_url(origin, destination);
        debug!("OSRM request {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| map_send_error(e, &self.base_url, self.timeout))?;

        let body: OsrmResponse = read_json(response).await?;
        into_polyline(body, origin, destination)
    }

    fn name(&self) -> &str {
        "osrm"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USER: Coordinate = Coordinate::new(12.9716, 77.5946);
    const HOSPITAL: Coordinate = Coordinate::new(13.0, 77.6);

    #[test]
    fn test_parse_swaps_geojson_order() {
        let body = r#"{
            "code": "Ok",
            "routes": [{
                "distance": 4321.0,
                "duration": 601.0,
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[77.5946, 12.9716], [77.597, 12.985], [77.6, 13.0]]
                }
            }]
        }"#;

        let route = parse_route(body, USER, HOSPITAL).unwrap();
        assert_eq!(route.len(), 3);
        assert_eq!(route.origin(), USER);
        assert_eq!(route.point(1), Coordinate::new(12.985, 77.597));
        assert!((route.distance_km - 4.321).abs() < 1e-9);
        assert_eq!(route.duration_min, 11);
        assert_eq!(route.source, RouteSource::Road);
    }

    #[test]
    fn test_error_code_is_routing_failure() {
        let body = r#"{"code": "NoSegment", "message": "Could not find a matching segment"}"#;
        let err = parse_route(body, USER, HOSPITAL).unwrap_err();
        assert!(matches!(err, SentinelError::RoutingFailed(ref m) if m.starts_with("NoSegment")));
    }

    #[test]
    fn test_empty_routes_and_garbage() {
        let err = parse_route(r#"{"code": "Ok", "routes": []}"#, USER, HOSPITAL).unwrap_err();
        assert_eq!(err.error_code(), "NO_ROUTE");

        let err = parse_route("<html>", USER, HOSPITAL).unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_RESPONSE");

        let body = r#"{"code":"Ok","routes":[{"distance":1,"duration":1,"geometry":{"coordinates":[]}}]}"#;
        assert!(parse_route(body, USER, HOSPITAL).is_err());
    }

    #[test]
    fn test_route_url_is_lng_lat() {
        let client = OsrmClient::new(&RoutingConfig::default()).unwrap();
        assert_eq!(
            client.route_url(USER, HOSPITAL),
            "https://router.project-osrm.org/route/v1/driving/77.5946,12.9716;77.6,13?overview=full&geometries=geojson"
        );
    }

    #[tokio::test]
    async fn test_unreachable_router_is_error() {
        let config = RoutingConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(2),
            ..RoutingConfig::default()
        };
        let client = OsrmClient::new(&config).unwrap();
        assert!(client.route(USER, HOSPITAL).await.is_err());
    }
}
