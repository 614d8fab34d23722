//! Scripted collaborators for exercising the lifecycle without a network

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use sentinel_core::{
    eta_minutes, AlertDispatcher, AlertLink, Coordinate, Facility, FacilityDiscovery, FacilityKind,
    GeolocationProvider, PhoneNumber, Result, RoutePolyline, RouteSource, RoutingClient,
    SentinelError,
};

/// `n` evenly spaced points from `from` to `to`, both ends included
pub fn interpolate(from: Coordinate, to: Coordinate, n: usize) -> Vec<Coordinate> {
    let n = n.max(2);
    (0..n)
        .map(|i| {
            let t = i as f64 / (n - 1) as f64;
            Coordinate::new(
                from.lat + (to.lat - from.lat) * t,
                from.lng + (to.lng - from.lng) * t,
            )
        })
        .collect()
}

/// Facilities around `center`, nearest last so ranking has work to do
pub fn facilities_near(center: Coordinate, count: usize) -> Vec<Facility> {
    (0..count)
        .map(|i| {
            let offset = 0.01 * (count - i) as f64;
            Facility::new(
                format!("osm-{}", 1000 + i),
                format!("General Hospital {i}"),
                Coordinate::new(center.lat + offset, center.lng + offset / 2.0),
                FacilityKind::Hospital,
            )
            .with_address("Medical facility near you")
        })
        .collect()
}

/// Router that draws straight interpolated "roads"
#[derive(Debug)]
pub struct ScriptedRouter {
    points: usize,
    fail: bool,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedRouter {
    /// Succeeds with `points` waypoints per route
    pub fn road(points: usize) -> Self {
        Self {
            points,
            fail: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::road(2)
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RoutingClient for ScriptedRouter {
    async fn route(&self, origin: Coordinate, destination: Coordinate) -> Result<RoutePolyline> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(SentinelError::RoutingFailed("scripted failure".into()));
        }

        let distance_km = origin.distance_km(&destination) * 1.2;
        RoutePolyline::new(
            interpolate(origin, destination, self.points),
            distance_km,
            eta_minutes(distance_km, 40.0),
            RouteSource::Road,
        )
        .ok_or_else(|| SentinelError::NoRoute {
            from: origin.to_string(),
            to: destination.to_string(),
        })
    }

    fn name(&self) -> &str {
        "scripted-router"
    }
}

/// Discovery returning a fixed list
#[derive(Debug)]
pub struct ScriptedDiscovery {
    facilities: Vec<Facility>,
    fail: bool,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedDiscovery {
    pub fn new(facilities: Vec<Facility>) -> Self {
        Self {
            facilities,
            fail: false,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::empty()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FacilityDiscovery for ScriptedDiscovery {
    async fn discover(&self, _center: Coordinate, _radius_km: f64) -> Result<Vec<Facility>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(SentinelError::DiscoveryFailed("scripted failure".into()));
        }
        Ok(self.facilities.clone())
    }

    fn name(&self) -> &str {
        "scripted-discovery"
    }
}

/// Alert dispatcher that records every link it builds
#[derive(Debug, Default)]
pub struct RecordingAlert {
    links: Mutex<Vec<AlertLink>>,
}

impl RecordingAlert {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn links(&self) -> Vec<AlertLink> {
        self.links.lock().clone()
    }
}

impl AlertDispatcher for RecordingAlert {
    fn emergency_link(&self, phone: &PhoneNumber, location: Coordinate) -> Result<AlertLink> {
        let recipient = phone.wa_digits("91");
        let link = AlertLink {
            url: format!(
                "https://wa.me/{}?text=SOS%20{},{}",
                recipient, location.lat, location.lng
            ),
            recipient,
        };
        self.links.lock().push(link.clone());
        Ok(link)
    }

    fn name(&self) -> &str {
        "recording-alert"
    }
}

/// Geolocation whose fix can be moved or withdrawn mid-test
#[derive(Debug, Default)]
pub struct ScriptedLocation {
    fix: RwLock<Option<Coordinate>>,
    hang: bool,
}

impl ScriptedLocation {
    pub fn at(position: Coordinate) -> Self {
        Self {
            fix: RwLock::new(Some(position)),
            hang: false,
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Never answers, like a browser stuck on the permission prompt
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn set(&self, position: Coordinate) {
        *self.fix.write() = Some(position);
    }

    pub fn clear(&self) {
        *self.fix.write() = None;
    }
}

#[async_trait]
impl GeolocationProvider for ScriptedLocation {
    async fn current_position(&self) -> Result<Coordinate> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        (*self.fix.read())
            .ok_or_else(|| SentinelError::GeolocationUnavailable("no scripted fix".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_endpoints() {
        let a = Coordinate::new(12.0, 77.0);
        let b = Coordinate::new(13.0, 78.0);
        let points = interpolate(a, b, 5);
        assert_eq!(points.len(), 5);
        assert_eq!(points[0], a);
        assert_eq!(points[4], b);
        assert_eq!(interpolate(a, b, 0).len(), 2);
    }

    #[tokio::test]
    async fn test_scripted_router() {
        let router = ScriptedRouter::road(6);
        let a = Coordinate::new(12.0, 77.0);
        let b = Coordinate::new(12.1, 77.1);
        let route = router.route(a, b).await.unwrap();
        assert_eq!(route.len(), 6);
        assert_eq!(route.destination(), b);
        assert_eq!(router.calls(), 1);

        let failing = ScriptedRouter::failing();
        assert!(failing.route(a, b).await.is_err());
    }
}
