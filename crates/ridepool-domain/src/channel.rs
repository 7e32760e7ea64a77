//! Delivery channels for one-time codes.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static E164: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\+[1-9][0-9]{7,14}$").unwrap());
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]{2,}$").unwrap());

const MAX_EMAIL_LEN: usize = 254;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Phone,
    Email,
}

impl ChannelKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::Email => "email",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid phone number")]
    InvalidPhone,
    #[error("invalid email address")]
    InvalidEmail,
}

/// A normalised, validated delivery address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Channel {
    kind: ChannelKind,
    address: String,
}

impl Channel {
    /// Normalise a phone number to E.164.
    ///
    /// Spaces, dashes and parentheses are stripped. A `00` prefix becomes `+`;
    /// a number with no international prefix gets `default_country_code`.
    pub fn phone(raw: &str, default_country_code: &str) -> Result<Self, ChannelError> {
        let digits: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '(' | ')' | '.'))
            .collect();
        let normalized = if digits.starts_with('+') {
            digits
        } else if let Some(rest) = digits.strip_prefix("00") {
            format!("+{rest}")
        } else {
            format!("{default_country_code}{}", digits.trim_start_matches('0'))
        };
        if !E164.is_match(&normalized) {
            return Err(ChannelError::InvalidPhone);
        }
        Ok(Self {
            kind: ChannelKind::Phone,
            address: normalized,
        })
    }

    pub fn email(raw: &str) -> Result<Self, ChannelError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.len() > MAX_EMAIL_LEN || !EMAIL.is_match(&normalized) {
            return Err(ChannelError::InvalidEmail);
        }
        Ok(Self {
            kind: ChannelKind::Email,
            address: normalized,
        })
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Store-level identifier, e.g. `phone:+919876543210`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.address)
    }

    pub fn masked(&self) -> String {
        mask_identifier(&self.address)
    }
}

impl fmt::Display for Channel {
    /// Displays the masked form so channels can go straight into log fields.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.masked())
    }
}

/// Mask all but the last four characters, e.g. `****3210`.
pub fn mask_identifier(identifier: &str) -> String {
    let chars: Vec<char> = identifier.chars().collect();
    if chars.len() <= 4 {
        return "****".to_owned();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}
