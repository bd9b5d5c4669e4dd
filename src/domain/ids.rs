//! Domain identifier types with validation
//!
//! Newtype wrappers for platform container IDs, site identifiers and the
//! generated de-identified WBHI-ID.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Platform container identifier
///
/// Opaque ID of a project, subject, session or acquisition on the imaging
/// platform.
///
/// # Examples
///
/// ```
/// use wbhi_sync::domain::ids::ContainerId;
///
/// let id = ContainerId::new("65a1f0c2d4e5").unwrap();
/// assert_eq!(id.as_str(), "65a1f0c2d4e5");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new ContainerId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Container ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Builds a sequential ID such as `ses-000004`
    ///
    /// Used by platforms that mint their own IDs.
    pub fn sequential(kind: &str, n: u64) -> Self {
        Self(format!("{kind}-{n:06}"))
    }

    /// Returns the container ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContainerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for ContainerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Site identifier
///
/// Sites are the platform groups that own an `Inbound Data` project. Site IDs
/// are lower-case and compared exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SiteId(String);

impl SiteId {
    /// Creates a new SiteId from a string
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Site ID cannot be empty".to_string());
        }
        if id.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(format!("Site ID '{id}' cannot contain whitespace or '/'"));
        }
        Ok(Self(id))
    }

    /// Returns the site ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SiteId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SiteId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SiteId> for String {
    fn from(id: SiteId) -> Self {
        id.0
    }
}

/// De-identified subject identifier
///
/// A one-character site prefix followed by an upper-case alphanumeric suffix,
/// e.g. `S7KQ2ZD`. Once written to a consent record it is authoritative and
/// reused on every later encounter of that record.
///
/// # Examples
///
/// ```
/// use wbhi_sync::domain::ids::WbhiId;
///
/// let id = WbhiId::new("U4F9K2A").unwrap();
/// assert_eq!(id.prefix(), 'U');
/// assert_eq!(id.suffix(), "4F9K2A");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WbhiId(String);

impl WbhiId {
    /// Creates a new WbhiId from a string
    ///
    /// Accepts any non-blank value: identifiers already stored in the
    /// registry are authoritative even when they predate the current format.
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("WBHI-ID cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Builds an identifier from a site prefix and generated suffix
    pub fn from_parts(prefix: char, suffix: &str) -> Self {
        Self(format!("{prefix}{suffix}"))
    }

    /// Returns the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Site prefix character
    pub fn prefix(&self) -> char {
        self.0.chars().next().unwrap_or_default()
    }

    /// Everything after the prefix
    pub fn suffix(&self) -> &str {
        let prefix_len = self.prefix().len_utf8();
        &self.0[prefix_len..]
    }
}

impl fmt::Display for WbhiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WbhiId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for WbhiId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
