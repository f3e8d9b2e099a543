//! Typed ID definitions for all hostpool entities.

use crate::define_id;
use crate::IdError;

// =============================================================================
// Fleet
// =============================================================================

define_id!(
    /// A physical or dedicated machine that hosts services.
    ServerId,
    "srv"
);

define_id!(
    /// A rented virtual instance placed on a server.
    ServiceId,
    "svc"
);

define_id!(
    /// A catalog template services are created from.
    PackageId,
    "pkg"
);

// =============================================================================
// Accounts
// =============================================================================

define_id!(
    /// An authenticated principal.
    UserId,
    "usr"
);

// =============================================================================
// Billing
// =============================================================================

/// Invoice ID assigned by the billing provider (for example `in_1NxYz...`).
///
/// The engine never mints these, so they are opaque strings rather than
/// ULID-backed IDs. Only `[A-Za-z0-9_-]` is accepted because the value is
/// placed into provider URLs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InvoiceId(String);

impl InvoiceId {
    /// Parses a provider-assigned invoice ID.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IdError::InvalidExternal(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// Returns the raw provider ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InvoiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for InvoiceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for InvoiceId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for InvoiceId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
