//! Service plumbing shared by Ridepool binaries: config loading, tracing, health, request ids.

pub mod config;
pub mod health;
pub mod middleware;
pub mod tracing;
