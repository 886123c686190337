//! Error types for the CloudWAN control plane
//!
//! Every failure falls in one of three classes. "Pending" values (no endpoint
//! yet, no route table yet, no attachment id yet) are not errors at all: they
//! are modelled as absence and simply re-evaluated later.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Error class, decides who handles a failure and whether it may be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// Malformed static input. Fails before provisioning, never retried.
    Configuration,
    /// Not admitted within a caller-imposed deadline. The caller decides.
    Retryable,
    /// Rejected outright. Aborts the affected network only.
    Fatal,
}

impl ErrorClass {
    /// Lowercase label used in logs and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration",
            Self::Retryable => "retryable",
            Self::Fatal => "fatal",
        }
    }
}

/// Malformed topology or reference input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Region list is empty
    #[error("at least one region is required")]
    EmptyRegions,

    /// Same region listed twice
    #[error("duplicate region: {0}")]
    DuplicateRegion(String),

    /// Two segments share a name
    #[error("duplicate segment: {0}")]
    DuplicateSegment(String),

    /// Two member networks share a name
    #[error("duplicate member network: {0}")]
    DuplicateNetwork(String),

    /// Identifier failed validation
    #[error("invalid {kind} '{value}': {reason}")]
    InvalidIdentifier {
        /// Identifier kind ("segment name", "region", ...)
        kind: &'static str,
        /// Offending value
        value: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// CIDR block failed to parse or is unusable
    #[error("invalid CIDR '{value}' for {owner}")]
    InvalidCidr {
        /// Entity owning the CIDR
        owner: String,
        /// Offending value
        value: String,
    },

    /// Two member networks in one region overlap
    #[error("CIDR of {first} overlaps {second} in {region}")]
    OverlappingCidr {
        /// Region both networks live in
        region: String,
        /// First network
        first: String,
        /// Second network
        second: String,
    },

    /// Region referenced but not part of the hub
    #[error("{owner} references region {region} outside the hub edge locations")]
    UnknownRegion {
        /// Referencing entity
        owner: String,
        /// Unknown region
        region: String,
    },

    /// Segment referenced but not declared
    #[error("{owner} references undeclared segment {segment}")]
    UnknownSegment {
        /// Referencing entity
        owner: String,
        /// Unknown segment
        segment: String,
    },

    /// Member network referenced but not declared
    #[error("{owner} references undeclared member network {network}")]
    UnknownNetwork {
        /// Referencing entity
        owner: String,
        /// Unknown network
        network: String,
    },

    /// ASN range is not `low-high`
    #[error("invalid ASN range '{0}'")]
    InvalidAsnRange(String),

    /// Availability zone count out of range
    #[error("{network}: availability zone count {count} outside 1..=6")]
    InvalidZoneCount {
        /// Network name
        network: String,
        /// Requested count
        count: u8,
    },

    /// Subnet layout does not fit the network CIDR
    #[error("{network}: subnet layout does not fit in {cidr}")]
    LayoutOverflow {
        /// Network name
        network: String,
        /// Network CIDR
        cidr: String,
    },

    /// Attachment policy rule numbers must strictly increase
    #[error("attachment policy rule {current} does not follow rule {previous}")]
    RuleOrder {
        /// Previous rule number
        previous: u32,
        /// Current rule number
        current: u32,
    },

    /// Resource reference could not be parsed
    #[error("malformed reference '{reference}': {reason}")]
    MalformedReference {
        /// Offending reference
        reference: String,
        /// What is wrong with it
        reason: &'static str,
    },

    /// Topology text is not valid for its format
    #[error("cannot decode {format} topology: {reason}")]
    Decode {
        /// `yaml` or `toml`
        format: &'static str,
        /// Decoder message
        reason: String,
    },

    /// Topology file could not be read or decoded
    #[error("cannot load topology from {path}: {reason}")]
    Load {
        /// File path
        path: String,
        /// Underlying error
        reason: String,
    },
}

/// Provisioning failure raised by a control-plane component
#[derive(Error, Debug, Clone)]
pub enum ProvisionError {
    /// Static input was malformed
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Attachment still pending when the caller's deadline expired
    #[error("attachment for {network} not admitted within {waited:?}")]
    AdmissionTimeout {
        /// Member network
        network: String,
        /// Time spent waiting
        waited: Duration,
    },

    /// Hub refused the attachment
    #[error("attachment for {network} rejected ({reference}): {reason}")]
    AdmissionRejected {
        /// Member network
        network: String,
        /// Reference the hub refused
        reference: String,
        /// Hub-provided reason
        reason: String,
    },

    /// Hub refused the policy document
    #[error("hub {hub} rejected policy: {reason}")]
    PolicyRejected {
        /// Hub identifier
        hub: String,
        /// Hub-provided reason
        reason: String,
    },

    /// Policy synthesis reached with an attachment still unresolved
    #[error("route injection for segment {segment} references unresolved attachment of {network}")]
    UnresolvedDestination {
        /// Segment of the route-injection action
        segment: String,
        /// Network whose attachment is missing
        network: String,
    },

    /// Policy document is not self-consistent
    #[error("policy document inconsistent: {0}")]
    InconsistentPolicy(String),

    /// Collaborator call failed
    #[error("provider error during {operation}: {message}")]
    Provider {
        /// Operation name
        operation: &'static str,
        /// Provider message
        message: String,
    },
}

impl ProvisionError {
    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Configuration(_) => ErrorClass::Configuration,
            Self::AdmissionTimeout { .. } => ErrorClass::Retryable,
            Self::AdmissionRejected { .. }
            | Self::PolicyRejected { .. }
            | Self::UnresolvedDestination { .. }
            | Self::InconsistentPolicy(_)
            | Self::Provider { .. } => ErrorClass::Fatal,
        }
    }

    /// Whether the caller may retry
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Shorthand for a collaborator failure
    pub fn provider(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            operation,
            message: message.into(),
        }
    }
}

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;
