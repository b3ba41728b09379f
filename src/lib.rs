//! REST API for a field-service mobile app.
//!
//! Technicians list their assigned maintenance visits, start them, punch in
//! and out on site, tick off checklists and spare items, upload photos and
//! report symptoms. Every request is authenticated with an API key.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`geo`]: Haversine distance and geofence checks
//! - [`duration`]: `"Xh Ym"` duration strings and stored timestamps
//! - [`address`]: Postal address rendering
//! - [`store`]: Document and file storage
//! - [`auth`]: API-key authentication
//! - [`visits`]: Visit view, punch-in/out and visit updates
//! - [`serial`]: Installation addresses and item lookups
//! - [`api`]: HTTP API
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod address;
pub mod api;
pub mod auth;
pub mod config;
pub mod duration;
pub mod error;
pub mod geo;
pub mod metrics;
pub mod serial;
pub mod store;
pub mod utils;
pub mod visits;

pub use config::Config;
pub use error::{Result, ServiceError};
