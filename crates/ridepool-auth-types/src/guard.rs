//! Verification-level guard checked at handler entry.

use ridepool_domain::account::{VerificationFlags, VerificationRequirement};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{requirement} required")]
pub struct VerificationDenied {
    pub requirement: VerificationRequirement,
}

/// Fail with [`VerificationDenied`] unless `flags` meet `requirement`.
pub fn ensure_verified(
    requirement: VerificationRequirement,
    flags: VerificationFlags,
) -> Result<(), VerificationDenied> {
    if requirement.is_satisfied(flags) {
        Ok(())
    } else {
        Err(VerificationDenied { requirement })
    }
}
