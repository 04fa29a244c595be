//! InfluxDB SDK for Vigil Platform
//!
//! Provides a Rust client for running Flux queries against InfluxDB 2.x and
//! decoding the annotated CSV responses into typed tables.

mod annotated;
mod client;
mod error;
pub mod flux;
mod types;

pub use annotated::parse_annotated_csv;
pub use client::{InfluxClient, InfluxConfig};
pub use error::{InfluxError, Result};
pub use types::*;

/// Re-export for convenience
pub mod prelude {
    pub use super::types::*;
    pub use super::{InfluxClient, InfluxConfig, InfluxError, Result};
}
