//! coci-common: Shared record types, errors, configuration and HTTP plumbing
//! used across all COCI crates.

pub mod error;
pub mod record;
pub mod config;
pub mod countries;
pub mod sandbox;

// Re-export commonly used types
pub use config::{CociConfig, Thresholds};
pub use countries::CountryRegistry;
pub use error::{CociError, Result};
pub use record::{
    AffiliationProvenance, Dataset, DatasetLink, DatasetMatch, EventRecord, OrganiserRecord,
};
