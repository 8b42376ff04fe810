//! # RateWatch
//!
//! Remittance rate ingestion and threshold alert engine.
//!
//! RateWatch polls remittance providers for exchange-rate quotes on a fixed
//! set of corridors, keeps the latest quote per provider, and notifies
//! subscribers when a corridor's best rate crosses their threshold.
//!
//! ## Architecture
//!
//! - **Sources**: one [`sources::QuoteSource`] per provider, each fallible and bounded by a timeout
//! - **Ingestion**: fans out over provider x corridor and upserts into the rate store
//! - **Storage**: in-memory or PostgreSQL rate and subscription stores
//! - **Alerting**: threshold evaluation with de-duplication and pluggable notifiers
//! - **API**: REST API for rate tables, subscriptions, and manual cycle triggers
//!
//! ## Quick Start
//!
//! ```bash
//! # Serve the API and run cycles on their configured intervals
//! ratewatch serve
//!
//! # Fetch quotes once and show the ranked table
//! ratewatch rates "USA:USD/BDT"
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod alerting;
pub mod api;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod models;
pub mod service;
pub mod sources;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
pub use service::RateWatch;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::models::*;
    pub use crate::service::RateWatch;
    pub use crate::store::Stores;
}
