//! Best-effort road figures for discovered facilities

use futures::future::join_all;
use tracing::{debug, warn};

use sentinel_core::{
    eta_minutes, Coordinate, EnrichmentSource, Facility, FacilityList, RoutingClient,
};

/// Enrichment tunables
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichmentParams {
    /// Facilities routed, in discovery order
    pub limit: usize,
    /// Speed for haversine duration estimates
    pub estimate_speed_kmh: f64,
}

fn round_tenth(km: f64) -> f64 {
    (km * 10.0).round() / 10.0
}

async fn enrich_one(
    router: &dyn RoutingClient,
    center: Coordinate,
    facility: Facility,
    estimate_speed_kmh: f64,
) -> Facility {
    match router.route(center, facility.coordinate).await {
        Ok(route) => facility.enriched(
            round_tenth(route.distance_km),
            route.duration_min,
            EnrichmentSource::Road,
        ),
        Err(e) => {
            warn!(
                "Road distance to {} unavailable, estimating: {}",
                facility.name, e
            );
            let km = center.distance_km(&facility.coordinate);
            facility.enriched(
                round_tenth(km),
                eta_minutes(km, estimate_speed_kmh),
                EnrichmentSource::Estimate,
            )
        }
    }
}

/// Route the first `params.limit` facilities concurrently, then rank the
/// whole list. Facilities past the limit keep `road_distance_km = None`.
pub async fn enrich_and_rank(
    router: &dyn RoutingClient,
    center: Coordinate,
    mut facilities: Vec<Facility>,
    params: EnrichmentParams,
) -> FacilityList {
    let split = params.limit.min(facilities.len());
    let rest = facilities.split_off(split);

    debug!("Enriching {} of {} facilities", split, split + rest.len());
    let mut enriched = join_all(
        facilities
            .into_iter()
            .map(|f| enrich_one(router, center, f, params.estimate_speed_kmh)),
    )
    .await;
    enriched.extend(rest);

    FacilityList::ranked(center, enriched)
}
