//! service-core: shared HTTP plumbing for the booking payment services.
//!
//! Error mapping, layered configuration, request-id and metrics middleware,
//! tracing setup and HMAC helpers.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod utils;

pub use error::AppError;
