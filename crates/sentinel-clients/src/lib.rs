//! Sentinel Clients - HTTP implementations of the dispatch collaborators
//!
//! - [`osrm`] - Road routing against an OSRM service
//! - [`overpass`] - Hospital/clinic discovery with endpoint failover
//! - [`gemini`] - Generative discovery fallback grounded on Google Maps
//! - [`fallback`] - Ordered chain of discovery sources
//! - [`whatsapp`] - `wa.me` alert links
//! - [`geolocation`] - Static and client-fed position providers

mod http;

pub mod fallback;
pub mod gemini;
pub mod geolocation;
pub mod osrm;
pub mod overpass;
pub mod whatsapp;

pub use fallback::FallbackDiscovery;
pub use gemini::GeminiDiscovery;
pub use geolocation::{SharedLocation, StaticLocation};
pub use osrm::OsrmClient;
pub use overpass::OverpassClient;
pub use whatsapp::WhatsAppAlert;

use sentinel_core::config::DiscoveryConfig;
use sentinel_core::{FacilityDiscovery, Result};
use std::sync::Arc;

/// Overpass first, then Gemini when configured
pub fn discovery_chain(config: &DiscoveryConfig) -> Result<FallbackDiscovery> {
    let overpass: Arc<dyn FacilityDiscovery> = Arc::new(OverpassClient::new(config)?);
    let mut chain = FallbackDiscovery::new(vec![overpass]);
    if let Some(gemini) = &config.gemini {
        chain.push(Arc::new(GeminiDiscovery::new(gemini.clone(), config.timeout)?));
    }
    Ok(chain)
}
