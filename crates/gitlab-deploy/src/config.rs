//! Parameter resolution and validation
//!
//! Deployment parameters come from three sources merged in precedence order:
//! per-invocation overrides, ambient environment (account/region only), and
//! the JSON parameter file. An empty string from any source counts as absent
//! and falls through to the next source.

use crate::error::DeployError;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// Default instance type for the GitLab host
pub const DEFAULT_INSTANCE_TYPE: &str = "t3.large";

/// Default deployment and Cognito region
pub const DEFAULT_REGION: &str = "ap-northeast-1";

/// Usage text printed when required parameters are missing
pub const USAGE: &str = "\
Required parameters:
  * vpcId: VPC ID
  * subnetId: subnet ID
  * securityGroupId: security group ID
  * cognitoClientId: Cognito app client ID
  * cognitoClientSecret: Cognito app client secret
  * cognitoDomain: Cognito hosted domain prefix

Optional parameters:
  * amiId: AMI ID (default: latest Amazon Linux 2023)
  * instanceType: instance type (default: t3.large)
  * cognitoRegion: Cognito region (default: ap-northeast-1)
  * region: deployment region (default: ap-northeast-1)
  * account: AWS account ID

Example:
  gitlab-deploy deploy \\
    -c vpcId=vpc-xxxxxxxx -c subnetId=subnet-xxxxxxxx -c securityGroupId=sg-xxxxxxxx \\
    -c cognitoClientId=xxxxxxxx -c cognitoClientSecret=xxxxxxxx -c cognitoDomain=mydomain";

/// Ambient environment capture, read once at the process boundary.
///
/// Only account and region may come from the environment; all other keys
/// resolve from overrides and the parameter file.
#[derive(Debug, Clone, Default)]
pub struct AmbientEnv {
    pub account: Option<String>,
    pub region: Option<String>,
}

impl AmbientEnv {
    /// Capture account/region from the process environment
    pub fn capture() -> Self {
        Self {
            account: env_non_empty("AWS_ACCOUNT_ID"),
            region: env_non_empty("AWS_REGION").or_else(|| env_non_empty("AWS_DEFAULT_REGION")),
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Merged view over the three parameter sources
#[derive(Debug, Clone)]
pub struct ConfigSource {
    overrides: HashMap<String, String>,
    env: AmbientEnv,
    file: HashMap<String, String>,
}

impl ConfigSource {
    /// Build a source from already-collected parts (test seam)
    pub fn new(
        overrides: HashMap<String, String>,
        env: AmbientEnv,
        file: HashMap<String, String>,
    ) -> Self {
        Self {
            overrides,
            env,
            file,
        }
    }

    /// Load the parameter file and capture the ambient environment.
    ///
    /// The deployment cannot proceed without known network identifiers, so a
    /// missing file is fatal regardless of how the path was chosen.
    pub fn load(path: &Path, overrides: HashMap<String, String>) -> Result<Self, DeployError> {
        if !path.exists() {
            return Err(DeployError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = fs::read_to_string(path)
            .map_err(|e| DeployError::io(path.display().to_string(), e))?;
        let file: HashMap<String, String> = serde_json::from_str(&content)?;

        Ok(Self::new(overrides, AmbientEnv::capture(), file))
    }

    /// Resolve a key: override wins over the file; empty values are absent
    pub fn resolve(&self, key: &str) -> Option<String> {
        non_empty(self.overrides.get(key)).or_else(|| non_empty(self.file.get(key)))
    }

    /// Resolve a key with a default for when neither source supplies it
    pub fn resolve_or(&self, key: &str, default: &str) -> String {
        self.resolve(key).unwrap_or_else(|| default.to_string())
    }

    /// Resolve account/region: override > environment > file
    fn resolve_env_backed(&self, key: &str, env_value: &Option<String>) -> Option<String> {
        non_empty(self.overrides.get(key))
            .or_else(|| env_value.clone().filter(|v| !v.is_empty()))
            .or_else(|| non_empty(self.file.get(key)))
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.is_empty()).cloned()
}

/// The resolved parameter set consumed by every downstream step.
///
/// Immutable once validation succeeds. Required fields hold the empty string
/// when unresolved; `validate` turns those into one combined error.
#[derive(Clone)]
pub struct EffectiveParameters {
    pub vpc_id: String,
    pub subnet_id: String,
    pub security_group_id: String,
    pub instance_type: String,
    pub ami_id: Option<String>,
    pub cognito_client_id: String,
    pub cognito_client_secret: String,
    pub cognito_domain: String,
    pub cognito_region: String,
    pub account: Option<String>,
    pub region: String,
}

impl EffectiveParameters {
    /// Resolve every parameter from the merged sources
    pub fn resolve(source: &ConfigSource) -> Self {
        Self {
            vpc_id: source.resolve_or("vpcId", ""),
            subnet_id: source.resolve_or("subnetId", ""),
            security_group_id: source.resolve_or("securityGroupId", ""),
            instance_type: source.resolve_or("instanceType", DEFAULT_INSTANCE_TYPE),
            ami_id: source.resolve("amiId"),
            cognito_client_id: source.resolve_or("cognitoClientId", ""),
            cognito_client_secret: source.resolve_or("cognitoClientSecret", ""),
            cognito_domain: source.resolve_or("cognitoDomain", ""),
            cognito_region: source.resolve_or("cognitoRegion", DEFAULT_REGION),
            account: source.resolve_env_backed("account", &source.env.account),
            region: source
                .resolve_env_backed("region", &source.env.region)
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        }
    }

    /// Check required fields, reporting every missing one in a single error
    pub fn validate(&self) -> Result<(), DeployError> {
        let required = [
            ("vpcId", &self.vpc_id),
            ("subnetId", &self.subnet_id),
            ("securityGroupId", &self.security_group_id),
            ("cognitoClientId", &self.cognito_client_id),
            ("cognitoClientSecret", &self.cognito_client_secret),
            ("cognitoDomain", &self.cognito_domain),
        ];

        let fields: Vec<String> = required
            .iter()
            .filter(|(_, value)| value.is_empty())
            .map(|(name, _)| (*name).to_string())
            .collect();

        if fields.is_empty() {
            Ok(())
        } else {
            Err(DeployError::MissingRequiredParameters { fields })
        }
    }
}

// Manual Debug keeps the client secret out of logs.
impl fmt::Debug for EffectiveParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectiveParameters")
            .field("vpc_id", &self.vpc_id)
            .field("subnet_id", &self.subnet_id)
            .field("security_group_id", &self.security_group_id)
            .field("instance_type", &self.instance_type)
            .field("ami_id", &self.ami_id)
            .field("cognito_client_id", &self.cognito_client_id)
            .field("cognito_client_secret", &"<redacted>")
            .field("cognito_domain", &self.cognito_domain)
            .field("cognito_region", &self.cognito_region)
            .field("account", &self.account)
            .field("region", &self.region)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_override_wins_over_file_and_default() {
        let source = ConfigSource::new(
            file_map(&[("instanceType", "c7i.large")]),
            AmbientEnv::default(),
            file_map(&[("instanceType", "m5.xlarge")]),
        );
        assert_eq!(source.resolve_or("instanceType", "t3.large"), "c7i.large");
    }

    #[test]
    fn test_file_wins_over_default() {
        let source = ConfigSource::new(
            HashMap::new(),
            AmbientEnv::default(),
            file_map(&[("instanceType", "m5.xlarge")]),
        );
        assert_eq!(source.resolve_or("instanceType", "t3.large"), "m5.xlarge");
    }

    #[test]
    fn test_empty_file_value_falls_through_to_default() {
        let source = ConfigSource::new(
            HashMap::new(),
            AmbientEnv::default(),
            file_map(&[("instanceType", "")]),
        );
        assert_eq!(source.resolve_or("instanceType", "t3.large"), "t3.large");
    }

    #[test]
    fn test_env_wins_over_file_for_region() {
        let env = AmbientEnv {
            account: Some("111122223333".to_string()),
            region: Some("us-east-2".to_string()),
        };
        let source = ConfigSource::new(
            HashMap::new(),
            env,
            file_map(&[("region", "eu-west-1"), ("account", "999988887777")]),
        );
        let params = EffectiveParameters::resolve(&source);
        assert_eq!(params.region, "us-east-2");
        assert_eq!(params.account.as_deref(), Some("111122223333"));
    }

    #[test]
    fn test_override_wins_over_env_for_region() {
        let env = AmbientEnv {
            account: None,
            region: Some("us-east-2".to_string()),
        };
        let source = ConfigSource::new(file_map(&[("region", "eu-west-1")]), env, HashMap::new());
        let params = EffectiveParameters::resolve(&source);
        assert_eq!(params.region, "eu-west-1");
    }

    #[test]
    fn test_defaults_applied_when_unset() {
        let source = ConfigSource::new(HashMap::new(), AmbientEnv::default(), HashMap::new());
        let params = EffectiveParameters::resolve(&source);
        assert_eq!(params.instance_type, "t3.large");
        assert_eq!(params.cognito_region, "ap-northeast-1");
        assert_eq!(params.region, "ap-northeast-1");
        assert_eq!(params.ami_id, None);
    }

    #[test]
    fn test_validate_reports_every_missing_field() {
        let source = ConfigSource::new(HashMap::new(), AmbientEnv::default(), HashMap::new());
        let params = EffectiveParameters::resolve(&source);
        let err = params.validate().unwrap_err();

        match err {
            DeployError::MissingRequiredParameters { fields } => {
                assert_eq!(
                    fields,
                    vec![
                        "vpcId",
                        "subnetId",
                        "securityGroupId",
                        "cognitoClientId",
                        "cognitoClientSecret",
                        "cognitoDomain",
                    ]
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_empty_string_treated_as_absent() {
        let source = ConfigSource::new(
            file_map(&[("cognitoDomain", "")]),
            AmbientEnv::default(),
            file_map(&[
                ("vpcId", "vpc-1"),
                ("subnetId", "subnet-1"),
                ("securityGroupId", "sg-1"),
                ("cognitoClientId", "cid"),
                ("cognitoClientSecret", "csec"),
            ]),
        );
        let params = EffectiveParameters::resolve(&source);
        let err = params.validate().unwrap_err();

        match err {
            DeployError::MissingRequiredParameters { fields } => {
                assert_eq!(fields, vec!["cognitoDomain"]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_validate_passes_with_complete_set() {
        let source = ConfigSource::new(
            file_map(&[
                ("vpcId", "vpc-1"),
                ("subnetId", "subnet-1"),
                ("securityGroupId", "sg-1"),
                ("cognitoClientId", "cid"),
                ("cognitoClientSecret", "csec"),
                ("cognitoDomain", "dom"),
            ]),
            AmbientEnv::default(),
            HashMap::new(),
        );
        let params = EffectiveParameters::resolve(&source);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_load_missing_file_is_config_not_found() {
        let err = ConfigSource::load(Path::new("/nonexistent/params.json"), HashMap::new())
            .unwrap_err();
        assert!(matches!(err, DeployError::ConfigNotFound { .. }));
        assert!(err.to_string().contains("/nonexistent/params.json"));
    }

    #[test]
    fn test_load_parses_parameter_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{
                "vpcId": "vpc-12345",
                "subnetId": "subnet-12345",
                "securityGroupId": "sg-12345",
                "cognitoClientId": "client",
                "cognitoClientSecret": "secret",
                "cognitoDomain": "mydomain"
            }}"#
        )
        .unwrap();

        let source = ConfigSource::load(file.path(), HashMap::new()).unwrap();
        let params = EffectiveParameters::resolve(&source);
        assert_eq!(params.vpc_id, "vpc-12345");
        assert_eq!(params.cognito_domain, "mydomain");
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_client_secret() {
        let source = ConfigSource::new(
            file_map(&[("cognitoClientSecret", "super-secret")]),
            AmbientEnv::default(),
            HashMap::new(),
        );
        let params = EffectiveParameters::resolve(&source);
        let rendered = format!("{params:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
