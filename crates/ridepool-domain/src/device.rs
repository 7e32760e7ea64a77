//! Client device context reported at sign-in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Device context attached to a session and fed to risk scoring.
///
/// Every field is optional: clients report what they can.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: Option<String>,
    pub device_type: Option<String>,
    pub device_model: Option<String>,
    pub os_version: Option<String>,
    pub app_version: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl DeviceInfo {
    /// Descriptive attributes keyed by name, empty values omitted.
    ///
    /// Network address and user agent are excluded; they are separate risk signals.
    pub fn attributes(&self) -> BTreeMap<String, String> {
        [
            ("app_version", &self.app_version),
            ("device_id", &self.device_id),
            ("device_model", &self.device_model),
            ("device_type", &self.device_type),
            ("os_version", &self.os_version),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            value
                .as_deref()
                .filter(|v| !v.is_empty())
                .map(|v| (key.to_owned(), v.to_owned()))
        })
        .collect()
    }
}
