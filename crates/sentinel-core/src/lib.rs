//! Sentinel Core - Value types and collaborator traits for emergency dispatch
//!
//! This crate holds everything the dispatch lifecycle shares with its
//! collaborators: coordinates and distance math, facilities, route
//! polylines, phone numbers, configuration and the error taxonomy.
//!
//! # Modules
//!
//! - [`geo`] - Coordinates, haversine distance, bearings and compass buckets
//! - [`route`] - Route polylines and the straight-line fallback
//! - [`facility`] - Discovered hospitals and clinics, ranking
//! - [`phone`] - Emergency-contact phone numbers
//! - [`surface`] - Keyed map surface commands
//! - [`config`] - Configuration types
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust
//! use sentinel_core::{Coordinate, CompassDirection, RoutePolyline};
//!
//! let user = Coordinate::new(12.9716, 77.5946);
//! let hospital = Coordinate::new(13.0, 77.6);
//!
//! let route = RoutePolyline::straight_line(user, hospital, 40.0);
//! assert_eq!(route.len(), 2);
//!
//! let heading = CompassDirection::from_bearing(user.bearing_to(&hospital));
//! println!("Head {heading} for {:.1} km", route.distance_km);
//! ```

pub mod config;
pub mod error;
pub mod facility;
pub mod geo;
pub mod phone;
pub mod route;
pub mod surface;

pub use config::SentinelConfig;
pub use error::{Result, SentinelError};
pub use facility::{rank_facilities, EnrichmentSource, Facility, FacilityKind, FacilityList};
pub use geo::{eta_minutes, haversine_km, initial_bearing, CompassDirection, Coordinate};
pub use phone::PhoneNumber;
pub use route::{RoutePolyline, RouteSource};
pub use surface::{MapSurface, MarkerKind};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Road routing between two points
#[async_trait]
pub trait RoutingClient: Send + Sync {
    /// Fetch a road route. Failures are reported, never papered over;
    /// callers decide on the straight-line fallback.
    async fn route(&self, origin: Coordinate, destination: Coordinate) -> Result<RoutePolyline>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Nearby medical facility lookup
#[async_trait]
pub trait FacilityDiscovery: Send + Sync {
    /// Facilities within `radius_km` of `center`, unranked and unenriched
    async fn discover(&self, center: Coordinate, radius_km: f64) -> Result<Vec<Facility>>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// A deep link that hands an alert off to an external messenger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertLink {
    pub url: String,
    /// Normalized recipient, without `+`
    pub recipient: String,
}

/// Builds emergency alert links. There is no delivery receipt.
pub trait AlertDispatcher: Send + Sync {
    fn emergency_link(&self, phone: &PhoneNumber, location: Coordinate) -> Result<AlertLink>;

    /// Name used in logs
    fn name(&self) -> &str;
}

/// Source of the user's current position
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Coordinate>;
}

/// Persistence for the single emergency-contact phone number
#[async_trait]
pub trait PhoneStore: Send + Sync {
    async fn load_phone(&self) -> Result<Option<PhoneNumber>>;

    async fn save_phone(&self, phone: &PhoneNumber) -> Result<()>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
