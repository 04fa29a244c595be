//! Reader Service
//!
//! Query gateway between the message bus and the telemetry store:
//! - Requests arrive as `{query_type, params}` on a NATS subject
//! - Each query type maps to a Flux query against InfluxDB
//! - Returned rows are projected and folded into a derived answer
//! - The answer is sent back in a `{status, data, summary, message}` envelope

pub mod config;
pub mod derivation;
pub mod dispatcher;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod projector;
pub mod query;
pub mod request;
pub mod service;
pub mod store;
pub mod transport;

pub use config::ReaderConfig;
pub use dispatcher::Dispatcher;
pub use error::{QueryError, Result};
pub use request::{Params, QueryKind, Request, Response, Status};
pub use service::ReaderService;
pub use store::QueryStore;
