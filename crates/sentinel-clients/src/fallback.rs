//! Chained discovery sources

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use sentinel_core::{Coordinate, Facility, FacilityDiscovery, Result};

/// Tries each source in order until one yields facilities.
///
/// Source failures are logged and swallowed; when every source fails or
/// comes back empty the result is an empty list.
pub struct FallbackDiscovery {
    sources: Vec<Arc<dyn FacilityDiscovery>>,
}

impl FallbackDiscovery {
    pub fn new(sources: Vec<Arc<dyn FacilityDiscovery>>) -> Self {
        Self { sources }
    }

    pub fn push(&mut self, source: Arc<dyn FacilityDiscovery>) {
        self.sources.push(source);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl FacilityDiscovery for FallbackDiscovery {
    async fn discover(&self, center: Coordinate, radius_km: f64) -> Result<Vec<Facility>> {
        for source in &self.sources {
            match source.discover(center, radius_km).await {
                Ok(facilities) if !facilities.is_empty() => {
                    info!(
                        "Discovery source {} returned {} facilities",
                        source.name(),
                        facilities.len()
                    );
                    return Ok(facilities);
                }
                Ok(_) => info!("Discovery source {} found nothing", source.name()),
                Err(e) => warn!("Discovery source {} failed: {}", source.name(), e),
            }
        }

        warn!("Could not fetch facilities from any source");
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "fallback"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{FacilityKind, SentinelError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        result: Result<Vec<Facility>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, result: Result<Vec<Facility>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                result,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl FacilityDiscovery for Scripted {
        async fn discover(&self, _center: Coordinate, _radius_km: f64) -> Result<Vec<Facility>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }

        fn name(&self) -> &str {
            self.name
        }
    }

    fn hospital(id: &str) -> Facility {
        Facility::new(id, id, Coordinate::new(12.98, 77.6), FacilityKind::Hospital)
    }

    #[tokio::test]
    async fn test_falls_through_failures_and_empties() {
        let failing = Scripted::new("down", Err(SentinelError::DiscoveryFailed("503".into())));
        let empty = Scripted::new("empty", Ok(vec![]));
        let good = Scripted::new("good", Ok(vec![hospital("gmaps-0")]));
        let unused = Scripted::new("unused", Ok(vec![hospital("never")]));

        let sources: Vec<Arc<dyn FacilityDiscovery>> =
            vec![failing.clone(), empty.clone(), good.clone(), unused.clone()];
        let chain = FallbackDiscovery::new(sources);
        let found = chain.discover(Coordinate::new(12.97, 77.59), 10.0).await.unwrap();

        assert_eq!(found[0].id, "gmaps-0");
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(empty.calls.load(Ordering::SeqCst), 1);
        assert_eq!(unused.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_failing_is_empty_not_error() {
        let down: Arc<dyn FacilityDiscovery> =
            Scripted::new("down", Err(SentinelError::Timeout { duration_ms: 15000 }));
        let chain = FallbackDiscovery::new(vec![down]);
        let found = chain.discover(Coordinate::new(12.97, 77.59), 10.0).await.unwrap();
        assert!(found.is_empty());
    }
}
