//! Account state as seen by the authentication layer.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of an account, owned by the accounts service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Suspended,
    /// Mobile verified, corporate email not yet confirmed.
    PendingEmail,
}

/// Which contact channels the user has proven ownership of.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationFlags {
    pub mobile_verified: bool,
    pub email_verified: bool,
}

impl VerificationFlags {
    pub fn fully_verified(self) -> bool {
        self.mobile_verified && self.email_verified
    }
}

/// Capability labels embedded in session tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    MobileVerified,
    EmailVerified,
    FullyVerified,
    AccessRideFeatures,
    AccountActive,
}

/// Derive the permission labels for the given verification state and status.
///
/// Order is stable so tokens minted from the same state are comparable.
pub fn derive_permissions(flags: VerificationFlags, status: AccountStatus) -> Vec<Permission> {
    let mut permissions = Vec::with_capacity(5);
    if flags.mobile_verified {
        permissions.push(Permission::MobileVerified);
    }
    if flags.email_verified {
        permissions.push(Permission::EmailVerified);
    }
    if flags.fully_verified() {
        permissions.push(Permission::FullyVerified);
        permissions.push(Permission::AccessRideFeatures);
    }
    if status == AccountStatus::Active {
        permissions.push(Permission::AccountActive);
    }
    permissions
}

/// Verification level an operation demands from its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationRequirement {
    Mobile,
    Email,
    Full,
}

impl VerificationRequirement {
    pub fn is_satisfied(self, flags: VerificationFlags) -> bool {
        match self {
            Self::Mobile => flags.mobile_verified,
            Self::Email => flags.email_verified,
            Self::Full => flags.fully_verified(),
        }
    }
}

impl fmt::Display for VerificationRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Mobile => "mobile verification",
            Self::Email => "email verification",
            Self::Full => "full verification",
        };
        f.write_str(label)
    }
}
