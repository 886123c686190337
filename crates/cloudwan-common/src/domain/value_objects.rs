//! Value Objects - Immutable network identifiers with validation
//!
//! Value Objects are:
//! - Immutable
//! - Comparable by value (not identity)
//! - Self-validating

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares an opaque, provider-assigned handle.
///
/// Handles only need to be non-empty; their format belongs to the provider.
macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Create handle, rejecting empty values
            pub fn new(id: impl Into<String>) -> Result<Self, ConfigError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ConfigError::InvalidIdentifier {
                        kind: $kind,
                        value: id,
                        reason: "cannot be empty",
                    });
                }
                Ok(Self(id))
            }

            /// Get inner value
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ConfigError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_handle!(
    /// Availability zone name, e.g. `us-east-1a`
    AvailabilityZone,
    "availability zone"
);
opaque_handle!(
    /// Subnet handle assigned by the partitioning collaborator
    SubnetId,
    "subnet id"
);
opaque_handle!(
    /// Route table handle; may not exist until the network converges
    RouteTableId,
    "route table id"
);
opaque_handle!(
    /// Enforcement endpoint handle of the inspection engine in one zone
    EndpointId,
    "endpoint id"
);
opaque_handle!(
    /// Attachment identifier, assigned by the hub on admission
    AttachmentId,
    "attachment id"
);
opaque_handle!(
    /// Network (VPC) handle
    VpcId,
    "vpc id"
);
opaque_handle!(
    /// Hub (core network) identifier
    HubId,
    "hub id"
);
opaque_handle!(
    /// Account owning the hub and member networks
    AccountId,
    "account id"
);

/// Region name (Value Object)
///
/// # Invariants
/// - Non-empty
/// - Lowercase alphanumeric with hyphens
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Region(String);

impl Region {
    /// Create region with validation
    pub fn new(region: impl Into<String>) -> Result<Self, ConfigError> {
        let region = region.into();
        let invalid = |reason| ConfigError::InvalidIdentifier {
            kind: "region",
            value: region.clone(),
            reason,
        };

        if region.is_empty() {
            return Err(invalid("cannot be empty"));
        }
        if !region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(invalid("lowercase alphanumeric and hyphens only"));
        }

        Ok(Self(region))
    }

    /// Get inner value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Region {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Region> for String {
    fn from(value: Region) -> Self {
        value.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Segment name (Value Object)
///
/// # Invariants
/// - Starts with a letter
/// - Alphanumeric only
/// - Max 64 characters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SegmentName(String);

impl SegmentName {
    /// Create segment name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        let invalid = |reason| ConfigError::InvalidIdentifier {
            kind: "segment name",
            value: name.clone(),
            reason,
        };

        match name.chars().next() {
            None => return Err(invalid("cannot be empty")),
            Some(c) if !c.is_ascii_alphabetic() => return Err(invalid("must start with a letter")),
            _ => {}
        }
        if name.len() > 64 {
            return Err(invalid("max 64 characters"));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid("alphanumeric only"));
        }

        Ok(Self(name))
    }

    /// Get inner value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SegmentName {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SegmentName> for String {
    fn from(value: SegmentName) -> Self {
        value.0
    }
}

impl fmt::Display for SegmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Subnet role inside a member network
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetRole {
    /// No internet path; hub attachment subnets
    Isolated,
    /// Internet-facing
    Public,
    /// NAT or appliance subnets (the inspection engine lives here)
    Private,
}

impl SubnetRole {
    /// Lowercase label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Isolated => "isolated",
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

/// Inclusive private ASN range for the hub, rendered as `low-high`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AsnRange {
    low: u32,
    high: u32,
}

impl AsnRange {
    /// Create range, `low` must not exceed `high`
    pub fn new(low: u32, high: u32) -> Result<Self, ConfigError> {
        if low > high {
            return Err(ConfigError::InvalidAsnRange(format!("{}-{}", low, high)));
        }
        Ok(Self { low, high })
    }

    /// Parse `low-high`
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidAsnRange(value.to_string());
        let (low, high) = value.split_once('-').ok_or_else(invalid)?;
        let low = low.trim().parse().map_err(|_| invalid())?;
        let high = high.trim().parse().map_err(|_| invalid())?;
        Self::new(low, high)
    }

    /// Lowest ASN
    pub fn low(&self) -> u32 {
        self.low
    }

    /// Highest ASN
    pub fn high(&self) -> u32 {
        self.high
    }
}

impl TryFrom<String> for AsnRange {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<AsnRange> for String {
    fn from(value: AsnRange) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AsnRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_name_validation() {
        assert!(SegmentName::new("prod").is_ok());
        assert!(SegmentName::new("sharedservices").is_ok());
        assert!(SegmentName::new("").is_err());
        assert!(SegmentName::new("1prod").is_err());
        assert!(SegmentName::new("shared-services").is_err());
        assert!(SegmentName::new("a".repeat(65)).is_err());
    }

    #[test]
    fn test_region_validation() {
        assert!(Region::new("eu-west-1").is_ok());
        assert!(Region::new("EU-WEST-1").is_err());
        assert!(Region::new("").is_err());
    }

    #[test]
    fn test_handles_reject_empty() {
        assert!(EndpointId::new("vpce-0abc").is_ok());
        assert!(EndpointId::new("  ").is_err());
        assert!(serde_json::from_str::<AttachmentId>("\"\"").is_err());
    }

    #[test]
    fn test_asn_range() {
        let range = AsnRange::parse("65412-65534").unwrap();
        assert_eq!(range.low(), 65412);
        assert_eq!(range.high(), 65534);
        assert_eq!(range.to_string(), "65412-65534");
        assert!(AsnRange::parse("65534-65412").is_err());
        assert!(AsnRange::parse("65412").is_err());
    }
}
