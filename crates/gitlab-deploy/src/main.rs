//! gitlab-deploy: provision a single-host GitLab deployment on EC2, fronted
//! by an authenticating reverse proxy wired to Amazon Cognito.
//!
//! Pipeline: resolve parameters, validate, build resource references,
//! generate the bootstrap script, then assemble the stack in dependency
//! order. Any failure aborts the remaining steps; retry is a re-invoke.

use anyhow::Result;
use clap::{Parser, Subcommand};
use gitlab_deploy::aws::{Ec2Client, IamClient};
use gitlab_deploy::config::{ConfigSource, EffectiveParameters, USAGE};
use gitlab_deploy::plan::{render_preview, AddressPlan, DeploymentOutputs, DeploymentPlan};
use gitlab_deploy::refs::ResourceReferences;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gitlab-deploy")]
#[command(about = "Single-host GitLab deployment behind Cognito sign-in")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve parameters and provision the GitLab stack
    Deploy {
        /// Path to the JSON parameter file
        #[arg(long, default_value = "config/params.json")]
        params: PathBuf,

        /// Per-key parameter override (key=value, repeatable)
        #[arg(short = 'c', long = "context", value_parser = parse_key_val)]
        context: Vec<(String, String)>,

        /// Validate and print the plan without creating resources
        #[arg(long)]
        dry_run: bool,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Deploy {
            params,
            context,
            dry_run,
        } => deploy(params, context, dry_run).await,
    }
}

async fn deploy(
    params_path: PathBuf,
    context: Vec<(String, String)>,
    dry_run: bool,
) -> Result<()> {
    let overrides: HashMap<String, String> = context.into_iter().collect();

    info!(path = %params_path.display(), "Loading parameter file");
    let source = ConfigSource::load(&params_path, overrides)?;

    let params = EffectiveParameters::resolve(&source);
    params
        .validate()
        .map_err(|err| anyhow::anyhow!("{err}\n\n{USAGE}"))?;

    info!(
        region = %params.region,
        instance_type = %params.instance_type,
        "Parameters resolved and validated"
    );

    let refs = ResourceReferences::build(&params)?;

    if dry_run {
        let plan = DeploymentPlan::build(&params, &refs, "<static-address>");
        println!("{}", render_preview(&params, &refs, &plan));
        return Ok(());
    }

    let iam = IamClient::new(&params.region).await?;
    let ec2 = Ec2Client::new(&params.region).await?;

    // The static address is allocated up front so the proxy callback URL
    // can embed it; the association still happens only after the instance
    // exists.
    let address = ec2.allocate_address(&AddressPlan::new()).await?;

    let plan = DeploymentPlan::build(&params, &refs, &address.public_ip);

    let profile_name = iam.create_instance_role(&plan.role).await?;

    let ami_id = ec2.resolve_image(&plan.instance.image).await?;
    let instance_id = ec2
        .launch_instance(&plan.instance, &ami_id, &profile_name)
        .await?;

    ec2.wait_for_running(&instance_id).await?;
    ec2.associate_address(&address, &instance_id).await?;

    let outputs = DeploymentOutputs::from_address(&address.public_ip);

    info!(
        instance_id = %instance_id,
        gitlab_url = %outputs.gitlab_url,
        "Deployment complete"
    );

    println!("GitLabURL:  {}", outputs.gitlab_url);
    println!("SSHCommand: {}", outputs.ssh_command);

    Ok(())
}
