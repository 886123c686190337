//! Resource references
//!
//! ARN-style references handed to the attachment primitive. Built from typed
//! handles, or parsed and validated when they come from outside.

use super::value_objects::{AccountId, HubId, Region, SubnetId, VpcId};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

const PARTITION: &str = "aws";

/// Reference to a provider resource, rendered as
/// `arn:{partition}:{service}:{region}:{account}:{type}/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceArn {
    partition: String,
    service: String,
    region: Option<Region>,
    account: AccountId,
    resource_type: String,
    resource_id: String,
}

impl ResourceArn {
    /// Reference to a member network
    pub fn vpc(region: &Region, account: &AccountId, vpc: &VpcId) -> Self {
        Self::regional("ec2", region, account, "vpc", vpc.as_str())
    }

    /// Reference to one subnet of a member network
    pub fn subnet(region: &Region, account: &AccountId, subnet: &SubnetId) -> Self {
        Self::regional("ec2", region, account, "subnet", subnet.as_str())
    }

    /// Reference to the hub; global, so it carries no region
    pub fn core_network(account: &AccountId, hub: &HubId) -> Self {
        Self {
            partition: PARTITION.to_string(),
            service: "networkmanager".to_string(),
            region: None,
            account: account.clone(),
            resource_type: "core-network".to_string(),
            resource_id: hub.as_str().to_string(),
        }
    }

    fn regional(
        service: &str,
        region: &Region,
        account: &AccountId,
        resource_type: &str,
        resource_id: &str,
    ) -> Self {
        Self {
            partition: PARTITION.to_string(),
            service: service.to_string(),
            region: Some(region.clone()),
            account: account.clone(),
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
        }
    }

    /// Parse and validate a reference
    pub fn parse(reference: &str) -> Result<Self, ConfigError> {
        let malformed = |reason| ConfigError::MalformedReference {
            reference: reference.to_string(),
            reason,
        };

        let parts: Vec<&str> = reference.splitn(6, ':').collect();
        if parts.len() != 6 {
            return Err(malformed("expected six ':'-separated fields"));
        }
        if parts[0] != "arn" {
            return Err(malformed("missing 'arn' prefix"));
        }
        if parts[1].is_empty() || parts[2].is_empty() {
            return Err(malformed("partition and service are required"));
        }

        let region = match parts[3] {
            "" => None,
            r => Some(Region::new(r).map_err(|_| malformed("invalid region"))?),
        };

        if parts[4].is_empty() || !parts[4].chars().all(|c| c.is_ascii_digit()) {
            return Err(malformed("account must be numeric"));
        }
        let account = AccountId::new(parts[4]).map_err(|_| malformed("account must be numeric"))?;

        let (resource_type, resource_id) = parts[5]
            .split_once('/')
            .ok_or_else(|| malformed("resource must be 'type/id'"))?;
        if resource_type.is_empty() || resource_id.is_empty() {
            return Err(malformed("resource must be 'type/id'"));
        }
        if resource_id.contains(|c: char| c == ':' || c.is_whitespace()) {
            return Err(malformed("resource id contains ':' or whitespace"));
        }
        if region.is_none() && parts[2] == "ec2" {
            return Err(malformed("ec2 references are regional"));
        }

        Ok(Self {
            partition: parts[1].to_string(),
            service: parts[2].to_string(),
            region,
            account,
            resource_type: resource_type.to_string(),
            resource_id: resource_id.to_string(),
        })
    }

    /// Provider service (`ec2`, `networkmanager`)
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Region, absent for global resources
    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    /// Owning account
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Resource type (`vpc`, `subnet`, `core-network`)
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Resource id
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }
}

impl fmt::Display for ResourceArn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arn:{}:{}:{}:{}:{}/{}",
            self.partition,
            self.service,
            self.region.as_ref().map(Region::as_str).unwrap_or(""),
            self.account,
            self.resource_type,
            self.resource_id,
        )
    }
}

impl TryFrom<String> for ResourceArn {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ResourceArn> for String {
    fn from(value: ResourceArn) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> AccountId {
        AccountId::new("123456789012").unwrap()
    }

    #[test]
    fn test_reference_formats() {
        let region = Region::new("us-east-1").unwrap();
        let vpc = ResourceArn::vpc(&region, &account(), &VpcId::new("vpc-0a1b").unwrap());
        assert_eq!(vpc.to_string(), "arn:aws:ec2:us-east-1:123456789012:vpc/vpc-0a1b");

        let subnet = ResourceArn::subnet(&region, &account(), &SubnetId::new("subnet-01").unwrap());
        assert_eq!(subnet.to_string(), "arn:aws:ec2:us-east-1:123456789012:subnet/subnet-01");

        let core = ResourceArn::core_network(&account(), &HubId::new("core-network-0f").unwrap());
        assert_eq!(
            core.to_string(),
            "arn:aws:networkmanager::123456789012:core-network/core-network-0f"
        );
        assert!(core.region().is_none());
    }

    #[test]
    fn test_parse_roundtrip_preserves_fields() {
        let parsed = ResourceArn::parse("arn:aws:ec2:eu-west-1:123456789012:subnet/subnet-9").unwrap();
        assert_eq!(parsed.service(), "ec2");
        assert_eq!(parsed.region().map(Region::as_str), Some("eu-west-1"));
        assert_eq!(parsed.resource_type(), "subnet");
        assert_eq!(parsed.resource_id(), "subnet-9");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(ResourceArn::parse("vpc-0a1b").is_err());
        assert!(ResourceArn::parse("arn:aws:ec2:us-east-1:acct:vpc/vpc-1").is_err());
        assert!(ResourceArn::parse("arn:aws:ec2::123456789012:vpc/vpc-1").is_err());
        assert!(ResourceArn::parse("arn:aws:ec2:us-east-1:123456789012:vpc").is_err());
        assert!(ResourceArn::parse("arn:aws:ec2:us-east-1:123456789012:vpc/").is_err());
        assert!(ResourceArn::parse("arn:aws:ec2:us-east-1:123456789012:vpc/vpc:1").is_err());
    }
}
