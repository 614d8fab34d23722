//! Geolocation providers

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;

use sentinel_core::{Coordinate, GeolocationProvider, Result, SentinelError};

/// Always reports the same position
#[derive(Debug, Clone, Copy)]
pub struct StaticLocation(pub Coordinate);

#[async_trait]
impl GeolocationProvider for StaticLocation {
    async fn current_position(&self) -> Result<Coordinate> {
        Ok(self.0)
    }
}

/// Last fix pushed by a client (e.g. the browser via the node API).
///
/// Clones share the same fix.
#[derive(Debug, Clone, Default)]
pub struct SharedLocation {
    fix: Arc<RwLock<Option<Coordinate>>>,
}

impl SharedLocation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new fix, rejecting invalid coordinates
    pub fn update(&self, lat: f64, lng: f64) -> Result<Coordinate> {
        let coordinate = Coordinate::checked(lat, lng)?;
        *self.fix.write() = Some(coordinate);
        Ok(coordinate)
    }

    pub fn latest(&self) -> Option<Coordinate> {
        *self.fix.read()
    }
}

#[async_trait]
impl GeolocationProvider for SharedLocation {
    async fn current_position(&self) -> Result<Coordinate> {
        self.latest()
            .ok_or_else(|| SentinelError::GeolocationUnavailable("no position reported yet".into()))
    }
}
