//! EC2 instance, AMI, and static address management

use crate::plan::{AddressPlan, InstancePlan};
use crate::refs::ImageSelector;
use anyhow::{Context, Result};
use aws_sdk_ec2::{
    types::{DomainType, Filter, InstanceStateName, InstanceType, ResourceType, Tag, TagSpecification},
    Client,
};
use tracing::{debug, info};

/// EC2 client for managing the GitLab instance and its static address
pub struct Ec2Client {
    client: Client,
    region: String,
}

/// A static public address allocated for the deployment
#[derive(Debug, Clone)]
pub struct AllocatedAddress {
    pub allocation_id: String,
    pub public_ip: String,
}

impl Ec2Client {
    /// Create a new EC2 client
    pub async fn new(region: &str) -> Result<Self> {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(region.to_string()))
            .load()
            .await;

        Ok(Self {
            client: Client::new(&config),
            region: region.to_string(),
        })
    }

    /// Resolve an image selector to a concrete AMI ID.
    ///
    /// Explicit selectors are used verbatim; the default selects the latest
    /// general-purpose Amazon Linux 2023 x86_64 image for the region.
    pub async fn resolve_image(&self, selector: &ImageSelector) -> Result<String> {
        match selector {
            ImageSelector::Explicit { ami_id, .. } => Ok(ami_id.clone()),
            ImageSelector::DefaultLinux { .. } => self.latest_al2023_ami().await,
        }
    }

    async fn latest_al2023_ami(&self) -> Result<String> {
        let response = self
            .client
            .describe_images()
            .owners("amazon")
            .filters(
                Filter::builder()
                    .name("name")
                    .values("al2023-ami-*-x86_64")
                    .build(),
            )
            .filters(Filter::builder().name("state").values("available").build())
            .filters(
                Filter::builder()
                    .name("architecture")
                    .values("x86_64")
                    .build(),
            )
            .send()
            .await
            .context("Failed to describe images")?;

        // Sort by creation date and get the latest
        let mut images: Vec<_> = response.images().iter().collect();
        images.sort_by(|a, b| {
            b.creation_date()
                .unwrap_or_default()
                .cmp(a.creation_date().unwrap_or_default())
        });

        let ami = images
            .first()
            .and_then(|img| img.image_id())
            .context("No Amazon Linux 2023 AMI found")?;

        debug!(ami = %ami, region = %self.region, "Resolved default Linux image");

        Ok(ami.to_string())
    }

    /// Allocate a static public address for the deployment
    pub async fn allocate_address(&self, plan: &AddressPlan) -> Result<AllocatedAddress> {
        info!(name = %plan.name, "Allocating static address");

        let response = self
            .client
            .allocate_address()
            .domain(DomainType::Vpc)
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::ElasticIp)
                    .tags(Tag::builder().key("Name").value(&plan.name).build())
                    .tags(
                        Tag::builder()
                            .key("gitlab-deploy:managed")
                            .value("true")
                            .build(),
                    )
                    .build(),
            )
            .send()
            .await
            .context("Failed to allocate address")?;

        let allocation_id = response
            .allocation_id()
            .context("No allocation ID returned")?
            .to_string();
        let public_ip = response
            .public_ip()
            .context("No public IP returned")?
            .to_string();

        info!(allocation_id = %allocation_id, public_ip = %public_ip, "Static address allocated");

        Ok(AllocatedAddress {
            allocation_id,
            public_ip,
        })
    }

    /// Launch the GitLab instance with the resolved image and role
    pub async fn launch_instance(
        &self,
        plan: &InstancePlan,
        ami_id: &str,
        iam_instance_profile: &str,
    ) -> Result<String> {
        let instance_type: InstanceType = plan.instance_type.parse().map_err(|_| {
            anyhow::anyhow!("Invalid instance type: {}", plan.instance_type)
        })?;

        info!(
            instance_type = %plan.instance_type,
            ami = %ami_id,
            subnet = %plan.subnet_id,
            "Launching instance"
        );

        let response = self
            .client
            .run_instances()
            .image_id(ami_id)
            .instance_type(instance_type)
            .min_count(1)
            .max_count(1)
            .subnet_id(&plan.subnet_id)
            .security_group_ids(&plan.security_group_id)
            .iam_instance_profile(
                aws_sdk_ec2::types::IamInstanceProfileSpecification::builder()
                    .name(iam_instance_profile)
                    .build(),
            )
            .user_data(plan.user_data.to_base64())
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Instance)
                    .tags(Tag::builder().key("Name").value(&plan.name).build())
                    .tags(
                        Tag::builder()
                            .key("gitlab-deploy:managed")
                            .value("true")
                            .build(),
                    )
                    .build(),
            )
            .send()
            .await
            .context("Failed to launch instance")?;

        let instance_id = response
            .instances()
            .first()
            .and_then(|i| i.instance_id())
            .context("No instance ID returned")?
            .to_string();

        info!(instance_id = %instance_id, "Instance launched");

        Ok(instance_id)
    }

    /// Wait for an instance to be running
    pub async fn wait_for_running(&self, instance_id: &str) -> Result<()> {
        info!(instance_id = %instance_id, "Waiting for instance to be running");

        loop {
            let response = self
                .client
                .describe_instances()
                .instance_ids(instance_id)
                .send()
                .await
                .context("Failed to describe instance")?;

            let instance = response
                .reservations()
                .first()
                .and_then(|r| r.instances().first())
                .context("Instance not found")?;

            let state = instance
                .state()
                .and_then(|s| s.name())
                .unwrap_or(&InstanceStateName::Pending);

            match state {
                InstanceStateName::Running => {
                    info!(instance_id = %instance_id, "Instance is running");
                    return Ok(());
                }
                InstanceStateName::Pending => {
                    debug!(instance_id = %instance_id, "Instance still pending");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
                _ => {
                    anyhow::bail!(
                        "Instance {} entered unexpected state: {:?}",
                        instance_id,
                        state
                    );
                }
            }
        }
    }

    /// Associate a previously allocated static address with the instance.
    ///
    /// Only valid once the instance exists; called after `wait_for_running`.
    pub async fn associate_address(
        &self,
        address: &AllocatedAddress,
        instance_id: &str,
    ) -> Result<()> {
        info!(
            allocation_id = %address.allocation_id,
            instance_id = %instance_id,
            "Associating static address"
        );

        self.client
            .associate_address()
            .allocation_id(&address.allocation_id)
            .instance_id(instance_id)
            .send()
            .await
            .context("Failed to associate address")?;

        Ok(())
    }
}
