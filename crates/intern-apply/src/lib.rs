pub mod accounts;
pub mod config;
pub mod error;
pub mod submissions;
pub mod telemetry;
