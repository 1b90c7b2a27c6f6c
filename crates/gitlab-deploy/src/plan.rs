//! Deployment plan assembly
//!
//! The plan is a declarative description of everything the executor will
//! request from AWS, in dependency order: the instance role exists before
//! the instance, and the address association happens only after the
//! instance exists. Any step failing aborts the rest; retry is a redeploy.

use crate::config::EffectiveParameters;
use crate::refs::{ImageSelector, ResourceReferences};
use crate::user_data::{self, BootstrapScript};

/// Remote-management capability for the instance (SSM session access)
pub const SSM_MANAGED_POLICY_ARN: &str =
    "arn:aws:iam::aws:policy/AmazonSSMManagedInstanceCore";

/// Read-only object storage access for the instance
pub const S3_READ_ONLY_POLICY_ARN: &str = "arn:aws:iam::aws:policy/AmazonS3ReadOnlyAccess";

/// Kinds of resources the plan declares, used for ordering and reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    InstanceRole,
    Instance,
    StaticAddress,
    AddressAssociation,
}

/// Least-privilege instance role: two managed capability attachments,
/// no write or administrative scopes
#[derive(Debug, Clone)]
pub struct RolePlan {
    pub role_name: String,
    pub managed_policy_arns: Vec<&'static str>,
}

/// The compute instance bound to the resolved network references
#[derive(Debug, Clone)]
pub struct InstancePlan {
    pub name: String,
    pub instance_type: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub image: ImageSelector,
    pub user_data: BootstrapScript,
}

/// The static public address; stable across instance replacement so the
/// identity-provider callback never needs reconfiguring
#[derive(Debug, Clone)]
pub struct AddressPlan {
    pub name: String,
}

impl AddressPlan {
    pub fn new() -> Self {
        Self {
            name: "gitlab-eip".to_string(),
        }
    }
}

impl Default for AddressPlan {
    fn default() -> Self {
        Self::new()
    }
}

/// Full deployment description produced by the assembler
#[derive(Debug, Clone)]
pub struct DeploymentPlan {
    pub role: RolePlan,
    pub instance: InstancePlan,
    pub address: AddressPlan,
}

impl DeploymentPlan {
    /// Assemble the plan from validated parameters and references.
    ///
    /// Cannot fail: every input has already passed validation and
    /// reference building.
    pub fn build(
        params: &EffectiveParameters,
        refs: &ResourceReferences,
        expected_endpoint: &str,
    ) -> Self {
        Self {
            role: RolePlan {
                role_name: "gitlab-instance-role".to_string(),
                managed_policy_arns: vec![SSM_MANAGED_POLICY_ARN, S3_READ_ONLY_POLICY_ARN],
            },
            instance: InstancePlan {
                name: "gitlab".to_string(),
                instance_type: params.instance_type.clone(),
                subnet_id: refs.subnet.subnet_id.clone(),
                security_group_id: refs.security_group.group_id.clone(),
                image: refs.image.clone(),
                user_data: user_data::generate(params, expected_endpoint),
            },
            address: AddressPlan::new(),
        }
    }

    /// Declared creation order; external orchestration may parallelize
    /// anything not ordered here
    pub fn resources(&self) -> [ResourceKind; 4] {
        [
            ResourceKind::InstanceRole,
            ResourceKind::Instance,
            ResourceKind::StaticAddress,
            ResourceKind::AddressAssociation,
        ]
    }
}

/// Human-readable deployment preview for dry-run mode.
///
/// Names every resource the executor would create, including the imported
/// network references. Never includes the client secret.
pub fn render_preview(
    params: &EffectiveParameters,
    refs: &ResourceReferences,
    plan: &DeploymentPlan,
) -> String {
    let image = match &plan.instance.image {
        ImageSelector::Explicit { ami_id, .. } => ami_id.clone(),
        ImageSelector::DefaultLinux { region } => {
            format!("latest Amazon Linux 2023 ({region})")
        }
    };
    let policies: String = plan
        .role
        .managed_policy_arns
        .iter()
        .map(|arn| format!("                   - {arn}\n"))
        .collect();

    format!(
        r#"
=== DRY RUN ===

This deployment would create:

  Role:            {role} ({count} managed policies)
{policies}  Instance:        {instance_type} in {subnet} / {sg}
                   image: {image}
  Static address:  {address} (+ association)

Imported references:
  VPC:             {vpc} ({region})

  Cognito domain:  {domain}
  Cognito region:  {cognito_region}

Outputs after deploy: GitLabURL, SSHCommand

To deploy for real, remove the --dry-run flag.
"#,
        role = plan.role.role_name,
        count = plan.role.managed_policy_arns.len(),
        policies = policies,
        instance_type = plan.instance.instance_type,
        subnet = plan.instance.subnet_id,
        sg = plan.instance.security_group_id,
        image = image,
        address = plan.address.name,
        vpc = refs.vpc.vpc_id,
        region = refs.vpc.region,
        domain = params.cognito_domain,
        cognito_region = params.cognito_region,
    )
}

/// Read-only values exposed after assembly, computed from the static address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOutputs {
    pub gitlab_url: String,
    pub ssh_command: String,
}

impl DeploymentOutputs {
    pub fn from_address(public_ip: &str) -> Self {
        Self {
            gitlab_url: format!("https://{public_ip}"),
            ssh_command: format!("ssh ec2-user@{public_ip}"),
        }
    }
}
