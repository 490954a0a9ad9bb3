//! Warden Storage - SQLite persistence layer.
//!
//! This crate persists the small amount of state that must survive an agent
//! restart:
//!
//! - Settings (protection state, scan-service credential)
//! - The pending-download transition journal, written before each host side
//!   effect so that a crash mid-flow leaves a detectable remnant instead of
//!   a silent leak
//! - The local scan-event log shown in the popup (privacy-preserving: URL
//!   hashes and truncated previews, never full URLs)
//!
//! # Example
//!
//! ```
//! use warden_storage::Database;
//!
//! let db = Database::in_memory().unwrap();
//! db.record_transition("dl-1", "https://example.com/f.exe", "detected", "scanning", None)
//!     .unwrap();
//! assert_eq!(db.unresolved_keys().unwrap(), vec!["dl-1".to_string()]);
//! ```

mod database;
pub mod error;
pub mod models;
mod schema;

pub use database::{create_preview, hash_url, Database};
pub use error::{Result, StorageError};
pub use models::{NewScanEvent, ScanEventRecord, TransitionRecord};
pub use schema::SCHEMA_VERSION;
