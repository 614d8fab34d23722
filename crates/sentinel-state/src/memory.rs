//! In-memory phone store

use async_trait::async_trait;
use parking_lot::RwLock;
use sentinel_core::{PhoneNumber, PhoneStore};

/// Volatile [`PhoneStore`], lost on restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    phone: RwLock<Option<PhoneNumber>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_phone(phone: PhoneNumber) -> Self {
        Self {
            phone: RwLock::new(Some(phone)),
        }
    }
}

#[async_trait]
impl PhoneStore for MemoryStore {
    async fn load_phone(&self) -> sentinel_core::Result<Option<PhoneNumber>> {
        Ok(self.phone.read().clone())
    }

    async fn save_phone(&self, phone: &PhoneNumber) -> sentinel_core::Result<()> {
        *self.phone.write() = Some(phone.clone());
        Ok(())
    }
}
