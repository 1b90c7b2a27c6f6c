//! Typed references to pre-existing network resources
//!
//! These are references only. The VPC, subnet, and security group are owned
//! by the external provider and are never created, modified, or deleted here.

use crate::config::EffectiveParameters;
use crate::error::DeployError;

/// Reference to an existing VPC, scoped to the deployment region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VpcRef {
    pub vpc_id: String,
    pub region: String,
}

/// Reference to an existing subnet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetRef {
    pub subnet_id: String,
    pub region: String,
}

/// Reference to an existing security group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupRef {
    pub group_id: String,
    pub region: String,
}

/// Machine image selection policy.
///
/// An explicit AMI is used verbatim; otherwise the executor looks up the
/// latest general-purpose Amazon Linux image for the region, so operators
/// are not forced to track per-region image identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSelector {
    Explicit { ami_id: String, region: String },
    DefaultLinux { region: String },
}

/// Pure image selection: explicit identifier wins, empty counts as absent
pub fn select_image(explicit_ami: Option<&str>, region: &str) -> ImageSelector {
    match explicit_ami {
        Some(ami_id) if !ami_id.is_empty() => ImageSelector::Explicit {
            ami_id: ami_id.to_string(),
            region: region.to_string(),
        },
        _ => ImageSelector::DefaultLinux {
            region: region.to_string(),
        },
    }
}

/// Resolved handles to the externally-owned network objects plus the image
/// selector. Built once after validation; nothing downstream mutates it.
#[derive(Debug, Clone)]
pub struct ResourceReferences {
    pub vpc: VpcRef,
    pub subnet: SubnetRef,
    pub security_group: SecurityGroupRef,
    pub image: ImageSelector,
}

impl ResourceReferences {
    /// Resolve validated identifiers into typed references.
    ///
    /// Identifier shape is the only check performed; a malformed identifier
    /// is operator input error and aborts assembly.
    pub fn build(params: &EffectiveParameters) -> Result<Self, DeployError> {
        check_id("VPC", "vpc-", &params.vpc_id)?;
        check_id("subnet", "subnet-", &params.subnet_id)?;
        check_id("security group", "sg-", &params.security_group_id)?;

        Ok(Self {
            vpc: VpcRef {
                vpc_id: params.vpc_id.clone(),
                region: params.region.clone(),
            },
            subnet: SubnetRef {
                subnet_id: params.subnet_id.clone(),
                region: params.region.clone(),
            },
            security_group: SecurityGroupRef {
                group_id: params.security_group_id.clone(),
                region: params.region.clone(),
            },
            image: select_image(params.ami_id.as_deref(), &params.region),
        })
    }
}

fn check_id(kind: &'static str, prefix: &str, value: &str) -> Result<(), DeployError> {
    if value.starts_with(prefix) && value.len() > prefix.len() {
        Ok(())
    } else {
        Err(DeployError::InvalidResourceReference {
            kind,
            value: value.to_string(),
        })
    }
}
