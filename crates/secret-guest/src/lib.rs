pub mod assignment;
pub mod config;
pub mod error;
pub mod telemetry;
