//! Contact identity and discovery provenance value objects.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::ValidationError;

/// Chat/video platform a contact was discovered on, normalized to lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform(String);

impl Platform {
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_lowercase();
        if name.is_empty() {
            return Err(ValidationError::empty_field("platform"));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Platform {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.0
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable identity of a counterparty: unique per (platform, external user id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContactIdentity {
    platform: Platform,
    external_user_id: String,
}

impl ContactIdentity {
    /// Builds an identity; the external id is trimmed but otherwise kept verbatim.
    pub fn new(
        platform: impl Into<String>,
        external_user_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let platform = Platform::new(platform)?;
        let external_user_id = external_user_id.into().trim().to_string();
        if external_user_id.is_empty() {
            return Err(ValidationError::empty_field("external_user_id"));
        }
        Ok(Self {
            platform,
            external_user_id,
        })
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn external_user_id(&self) -> &str {
        &self.external_user_id
    }
}

impl fmt::Display for ContactIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.external_user_id)
    }
}

/// Where and how a contact was first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryInfo {
    #[serde(default)]
    pub display_name: Option<String>,
    /// Chat group the offer was posted in.
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub source_message: Option<String>,
    #[serde(default)]
    pub source_video_url: Option<String>,
}
