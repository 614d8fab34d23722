//! WhatsApp alert links
//!
//! The link only pre-fills a message; whether the user actually sends it
//! is unknowable, so the lifecycle gates on manual confirmation.

use chrono::{DateTime, Local};
use reqwest::Url;
use tracing::info;

use sentinel_core::config::AlertConfig;
use sentinel_core::{AlertDispatcher, AlertLink, Coordinate, PhoneNumber, Result, SentinelError};

/// Builds `wa.me` deep links carrying an SOS message
pub struct WhatsAppAlert {
    config: AlertConfig,
}

impl WhatsAppAlert {
    pub fn new(config: AlertConfig) -> Self {
        Self { config }
    }

    /// Google Maps link for the user's position
    pub fn maps_link(&self, location: Coordinate) -> String {
        format!(
            "{}?q={},{}",
            self.config.maps_base_url.trim_end_matches('/'),
            location.lat,
            location.lng
        )
    }

    /// SOS message text stamped with `time`
    pub fn sos_message(&self, location: Coordinate, time: DateTime<Local>) -> String {
        format!(
            "🚨 *EMERGENCY SOS ALERT* 🚨\n\n\
             I need immediate help!\n\n\
             📍 *My Location:*\n{}\n\n\
             ⏰ Time: {}\n\n\
             This is an automated emergency alert from Sentinel.\n\n\
             Please send help immediately!",
            self.maps_link(location),
            time.format("%d/%m/%Y, %H:%M:%S")
        )
    }

    /// Deep link to `phone` with `message` pre-filled
    pub fn link_for(&self, phone: &PhoneNumber, message: &str) -> Result<AlertLink> {
        let recipient = phone.wa_digits(&self.config.default_country_code);
        let base = format!("{}/{}", self.config.base_url.trim_end_matches('/'), recipient);

        let mut url = Url::parse(&base)
            .map_err(|e| SentinelError::InvalidConfig(format!("alert.base_url: {e}")))?;
        url.query_pairs_mut().append_pair("text", message);

        Ok(AlertLink {
            url: url.into(),
            recipient,
        })
    }
}

impl AlertDispatcher for WhatsAppAlert {
    fn emergency_link(&self, phone: &PhoneNumber, location: Coordinate) -> Result<AlertLink> {
        let message = self.sos_message(location, Local::now());
        let link = self.link_for(phone, &message)?;
        info!("Prepared WhatsApp alert for {}", link.recipient);
        Ok(link)
    }

    fn name(&self) -> &str {
        "whatsapp"
    }
}
