//! Vigil Core - Shared service infrastructure
//!
//! This crate provides:
//! - Standard service trait all microservices must implement
//! - Runtime bootstrap with graceful shutdown
//! - Error handling utilities
//! - Configuration management

pub mod config;
pub mod error;
pub mod service;

pub use config::ServiceConfig;
pub use error::{Result, VigilError};
pub use service::{DependencyStatus, HealthStatus, MicroserviceRuntime, ReadinessStatus, VigilService};
