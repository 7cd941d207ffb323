pub mod config;
pub mod crypto;
mod error;
pub mod service;
pub mod soap;
pub mod telemetry;

pub use error::{Error, Result};
pub use service::EnvelopeService;
pub use soap::ServiceVariant;
