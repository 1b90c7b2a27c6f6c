//! IAM role and instance profile management for the GitLab host

use crate::plan::RolePlan;
use anyhow::{Context, Result};
use aws_sdk_iam::Client;
use tracing::{debug, info};

/// The trust policy allowing EC2 to assume the role
const EC2_ASSUME_ROLE_POLICY: &str = r#"{
    "Version": "2012-10-17",
    "Statement": [
        {
            "Effect": "Allow",
            "Principal": {
                "Service": "ec2.amazonaws.com"
            },
            "Action": "sts:AssumeRole"
        }
    ]
}"#;

/// IAM client for managing the instance role
pub struct IamClient {
    client: Client,
}

impl IamClient {
    /// Create a new IAM client
    pub async fn new(region: &str) -> Result<Self> {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Ok(Self {
            client: Client::new(&config),
        })
    }

    /// Create the instance role with its managed policy attachments and an
    /// instance profile of the same name.
    ///
    /// Returns the instance profile name for `run_instances`.
    pub async fn create_instance_role(&self, plan: &RolePlan) -> Result<String> {
        let role_name = &plan.role_name;
        let profile_name = role_name.clone();

        // A leftover profile from a previous deployment would make role
        // creation fail halfway through; surface it before creating anything.
        if self.instance_profile_exists(&profile_name).await {
            anyhow::bail!(
                "instance profile '{}' already exists, likely from a previous deployment; \
                 delete it and re-run",
                profile_name
            );
        }

        info!(role_name = %role_name, "Creating IAM role for GitLab instance");

        self.client
            .create_role()
            .role_name(role_name)
            .assume_role_policy_document(EC2_ASSUME_ROLE_POLICY)
            .description("GitLab instance role (SSM access, read-only S3)")
            .tags(
                aws_sdk_iam::types::Tag::builder()
                    .key("gitlab-deploy:managed")
                    .value("true")
                    .build()
                    .map_err(|e| anyhow::anyhow!("Failed to build IAM tag: {}", e))?,
            )
            .send()
            .await
            .context("Failed to create IAM role")?;

        debug!(role_name = %role_name, "IAM role created");

        for arn in &plan.managed_policy_arns {
            self.client
                .attach_role_policy()
                .role_name(role_name)
                .policy_arn(*arn)
                .send()
                .await
                .with_context(|| format!("Failed to attach managed policy {arn}"))?;

            debug!(role_name = %role_name, policy_arn = %arn, "Managed policy attached");
        }

        self.client
            .create_instance_profile()
            .instance_profile_name(&profile_name)
            .send()
            .await
            .context("Failed to create instance profile")?;

        self.client
            .add_role_to_instance_profile()
            .instance_profile_name(&profile_name)
            .role_name(role_name)
            .send()
            .await
            .context("Failed to add role to instance profile")?;

        info!(
            role_name = %role_name,
            profile_name = %profile_name,
            "IAM role and instance profile created"
        );

        // Wait a bit for IAM propagation before the instance references it
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;

        Ok(profile_name)
    }

    /// Check if the instance profile already exists (previous deployment)
    pub async fn instance_profile_exists(&self, profile_name: &str) -> bool {
        self.client
            .get_instance_profile()
            .instance_profile_name(profile_name)
            .send()
            .await
            .is_ok()
    }
}
