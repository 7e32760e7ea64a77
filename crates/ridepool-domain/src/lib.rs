//! Domain types shared across all Ridepool services.
//!
//! Pure types with no framework dependencies.

pub mod account;
pub mod channel;
pub mod device;
pub mod id;
