//! Simulated ambulance dispatch point

use rand::Rng;

use sentinel_core::Coordinate;

/// Random point `[min_km, max_km)` away from `user` in a uniform direction.
///
/// The distance is exact under haversine because the point is projected
/// on the sphere.
pub fn generate_dispatch_origin<R: Rng + ?Sized>(
    rng: &mut R,
    user: Coordinate,
    min_km: f64,
    max_km: f64,
) -> Coordinate {
    let distance_km = rng.gen_range(min_km..max_km);
    let bearing = rng.gen_range(0.0..360.0);
    user.project(bearing, distance_km)
}
