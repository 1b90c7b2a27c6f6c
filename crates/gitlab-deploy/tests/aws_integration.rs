//! Integration tests for the AWS executor layer
//!
//! These tests require AWS credentials and create real IAM resources.
//! Run with: cargo test --test aws_integration -- --ignored

use anyhow::Result;
use gitlab_deploy::aws::IamClient;
use gitlab_deploy::plan::RolePlan;

const TEST_REGION: &str = "us-east-2";

/// A profile left behind by an earlier deployment must abort role creation
/// with a descriptive error before any resource is created.
#[tokio::test]
#[ignore = "Creates real IAM resources - run with --ignored to execute"]
async fn leftover_instance_profile_aborts_role_creation() -> Result<()> {
    let profile_name = format!("gitlab-deploy-test-{}", std::process::id());

    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(aws_config::Region::new(TEST_REGION))
        .load()
        .await;
    let client = aws_sdk_iam::Client::new(&config);

    // Simulate the leftover profile
    client
        .create_instance_profile()
        .instance_profile_name(&profile_name)
        .send()
        .await?;

    let iam = IamClient::new(TEST_REGION).await?;
    let plan = RolePlan {
        role_name: profile_name.clone(),
        managed_policy_arns: vec![],
    };

    let err = iam.create_instance_role(&plan).await.unwrap_err();
    assert!(
        err.to_string().contains("already exists"),
        "unexpected error: {err}"
    );

    // Cleanup
    client
        .delete_instance_profile()
        .instance_profile_name(&profile_name)
        .send()
        .await?;

    Ok(())
}
