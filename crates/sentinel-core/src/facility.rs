//! Medical facilities returned by discovery

use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// Kind of medical facility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacilityKind {
    Hospital,
    Clinic,
}

impl FacilityKind {
    /// Map an OSM `amenity` tag value
    pub fn from_amenity(amenity: &str) -> Self {
        match amenity {
            "clinic" => FacilityKind::Clinic,
            _ => FacilityKind::Hospital,
        }
    }
}

/// How the road figures of a facility were obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentSource {
    /// From the routing service
    Road,
    /// Haversine estimate after a routing failure
    Estimate,
}

/// A hospital or clinic near the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    pub id: String,
    pub name: String,
    pub coordinate: Coordinate,
    pub kind: FacilityKind,
    pub address: Option<String>,
    pub maps_uri: Option<String>,
    /// Road distance, `None` while still estimating
    pub road_distance_km: Option<f64>,
    pub road_duration_min: Option<u32>,
    pub enrichment: Option<EnrichmentSource>,
}

impl Facility {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        coordinate: Coordinate,
        kind: FacilityKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            coordinate,
            kind,
            address: None,
            maps_uri: None,
            road_distance_km: None,
            road_duration_min: None,
            enrichment: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_maps_uri(mut self, uri: impl Into<String>) -> Self {
        self.maps_uri = Some(uri.into());
        self
    }

    /// A copy of this facility carrying road figures
    pub fn enriched(&self, distance_km: f64, duration_min: u32, source: EnrichmentSource) -> Self {
        Self {
            road_distance_km: Some(distance_km),
            road_duration_min: Some(duration_min),
            enrichment: Some(source),
            ..self.clone()
        }
    }

    pub fn is_enriched(&self) -> bool {
        self.road_distance_km.is_some()
    }

    /// Distance used for ordering: road distance when known, haversine otherwise
    pub fn ranking_distance_km(&self, origin: &Coordinate) -> f64 {
        self.road_distance_km
            .unwrap_or_else(|| origin.distance_km(&self.coordinate))
    }
}

/// Sort facilities ascending by [`Facility::ranking_distance_km`]
pub fn rank_facilities(facilities: &mut [Facility], origin: &Coordinate) {
    facilities.sort_by(|a, b| {
        a.ranking_distance_km(origin)
            .total_cmp(&b.ranking_distance_km(origin))
    });
}

/// Ranked result of one discovery scan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FacilityList {
    pub center: Option<Coordinate>,
    items: Vec<Facility>,
}

impl FacilityList {
    /// Build a list, ranking the facilities around `center`
    pub fn ranked(center: Coordinate, mut items: Vec<Facility>) -> Self {
        rank_facilities(&mut items, &center);
        Self {
            center: Some(center),
            items,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Facility> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Facility> {
        self.items.iter().find(|f| f.id == id)
    }

    pub fn as_slice(&self) -> &[Facility] {
        &self.items
    }
}

impl<'a> IntoIterator for &'a FacilityList {
    type Item = &'a Facility;
    type IntoIter = std::slice::Iter<'a, Facility>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
