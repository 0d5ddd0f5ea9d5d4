//! Runtime adapters: telemetry and the admin HTTP surface.

pub mod error;
pub mod http;
pub mod telemetry;
