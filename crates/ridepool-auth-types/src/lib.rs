//! Auth types shared across Ridepool services.
//!
//! Provides session-token validation, the verification guard, and the `BearerToken` extractor.

pub mod guard;
pub mod identity;
pub mod token;
