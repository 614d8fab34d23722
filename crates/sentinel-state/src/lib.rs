//! Sentinel State - Emergency-contact persistence
//!
//! The only state that outlives a dispatch session is the user's
//! emergency-contact phone number.
//!
//! ## Components
//!
//! - **storage**: SQLite key-value settings with sqlx
//! - **memory**: volatile store for tests and ephemeral nodes
//! - **error**: State-specific error types
//!
//! ## Example
//!
//! ```ignore
//! use sentinel_state::SqliteStore;
//! use sentinel_core::{PhoneNumber, PhoneStore};
//!
//! let store = SqliteStore::connect("sqlite:sentinel.db?mode=rwc").await?;
//! store.save_phone(&PhoneNumber::parse("98765 43210")?).await?;
//! ```

pub mod error;
pub mod memory;
pub mod storage;

pub use error::{Result, StateError};
pub use memory::MemoryStore;
pub use storage::SqliteStore;

/// Settings key holding the emergency-contact number
pub const PHONE_KEY: &str = "sos_emergency_phone";
