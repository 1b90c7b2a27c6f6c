//! Bootstrap script generation for the GitLab host
//!
//! The generated user-data script installs GitLab EE and an oauth2-proxy
//! instance fronting its web port, wired to the Cognito hosted sign-in page.
//! The script is self-contained: the client secret is baked into a config
//! file with restrictive permissions and is never echoed to console output.

use crate::config::EffectiveParameters;
use std::fmt;
use tracing::info;

/// Generated machine-startup script, immutable once produced.
///
/// Consumed exactly once at instance creation; changing it afterwards
/// requires a redeploy.
#[derive(Clone)]
pub struct BootstrapScript(String);

impl BootstrapScript {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base64-encode for the EC2 user-data field
    pub fn to_base64(&self) -> String {
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, self.0.as_bytes())
    }
}

// The script embeds the client secret; keep it out of Debug output.
impl fmt::Debug for BootstrapScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BootstrapScript({} bytes)", self.0.len())
    }
}

/// Generate the bootstrap script for a deployment.
///
/// `expected_endpoint` is the static public address (or DNS name) the
/// deployment will be reachable at; the proxy callback URL is derived from
/// it, which is why the address must survive instance replacement.
pub fn generate(params: &EffectiveParameters, expected_endpoint: &str) -> BootstrapScript {
    let script = format!(
        r#"#!/bin/bash
set -euo pipefail

# Re-runs of user data must not reinstall anything
if [ -f /var/lib/gitlab-deploy/bootstrap.done ]; then
    exit 0
fi
mkdir -p /var/lib/gitlab-deploy

exec > >(tee /var/log/gitlab-bootstrap.log) 2>&1

echo "Starting GitLab bootstrap"

EXTERNAL_HOST="{endpoint}"

echo "Installing GitLab EE..."
curl -fsSL https://packages.gitlab.com/install/repositories/gitlab/gitlab-ee/script.rpm.sh | bash
dnf install -y gitlab-ee

# GitLab's bundled nginx binds to loopback only; oauth2-proxy owns the
# public port and forwards validated sessions.
cat > /etc/gitlab/gitlab.rb <<GITLAB_RB
external_url 'https://${{EXTERNAL_HOST}}'
nginx['listen_addresses'] = ['127.0.0.1']
nginx['listen_port'] = 8080
nginx['listen_https'] = false
GITLAB_RB

echo "Installing oauth2-proxy..."
OAUTH2_PROXY_VERSION="7.6.0"
curl -fsSL -o /tmp/oauth2-proxy.tar.gz \
    "https://github.com/oauth2-proxy/oauth2-proxy/releases/download/v${{OAUTH2_PROXY_VERSION}}/oauth2-proxy-v${{OAUTH2_PROXY_VERSION}}.linux-amd64.tar.gz"
tar -xzf /tmp/oauth2-proxy.tar.gz -C /tmp
install -m 0755 "/tmp/oauth2-proxy-v${{OAUTH2_PROXY_VERSION}}.linux-amd64/oauth2-proxy" /usr/local/bin/oauth2-proxy

echo "Writing oauth2-proxy configuration..."
COOKIE_SECRET=$(head -c 32 /dev/urandom | base64 | tr -- '+/' '-_' | head -c 32)

mkdir -p /etc/oauth2-proxy
umask 077
cat > /etc/oauth2-proxy/oauth2-proxy.cfg <<PROXY_CFG
provider = "oidc"
skip_oidc_discovery = true
client_id = "{client_id}"
client_secret = "{client_secret}"
login_url = "https://{domain}.auth.{cognito_region}.amazoncognito.com/oauth2/authorize"
redeem_url = "https://{domain}.auth.{cognito_region}.amazoncognito.com/oauth2/token"
profile_url = "https://{domain}.auth.{cognito_region}.amazoncognito.com/oauth2/userInfo"
oidc_jwks_url = "https://{domain}.auth.{cognito_region}.amazoncognito.com/.well-known/jwks.json"
redirect_url = "https://{endpoint}/oauth2/callback"
upstreams = [ "http://127.0.0.1:8080" ]
email_domains = [ "*" ]
http_address = "0.0.0.0:80"
reverse_proxy = true
cookie_secret = "${{COOKIE_SECRET}}"
cookie_secure = true
PROXY_CFG
chmod 600 /etc/oauth2-proxy/oauth2-proxy.cfg

cat > /etc/systemd/system/oauth2-proxy.service <<UNIT
[Unit]
Description=oauth2-proxy for GitLab
After=network-online.target

[Service]
ExecStart=/usr/local/bin/oauth2-proxy --config /etc/oauth2-proxy/oauth2-proxy.cfg
Restart=on-failure

[Install]
WantedBy=multi-user.target
UNIT

systemctl daemon-reload
systemctl enable --now oauth2-proxy

echo "Running gitlab-ctl reconfigure..."
gitlab-ctl reconfigure

touch /var/lib/gitlab-deploy/bootstrap.done
echo "GitLab bootstrap complete"
"#,
        endpoint = expected_endpoint,
        client_id = params.cognito_client_id,
        client_secret = params.cognito_client_secret,
        domain = params.cognito_domain,
        cognito_region = params.cognito_region,
    );

    info!(
        domain = %params.cognito_domain,
        cognito_region = %params.cognito_region,
        endpoint = %expected_endpoint,
        bytes = script.len(),
        "Generated bootstrap script"
    );

    BootstrapScript(script)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AmbientEnv, ConfigSource};
    use std::collections::HashMap;

    fn test_params() -> EffectiveParameters {
        let file: HashMap<String, String> = [
            ("vpcId", "vpc-1"),
            ("subnetId", "subnet-1"),
            ("securityGroupId", "sg-1"),
            ("cognitoClientId", "cid"),
            ("cognitoClientSecret", "csec"),
            ("cognitoDomain", "dom"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let source = ConfigSource::new(HashMap::new(), AmbientEnv::default(), file);
        EffectiveParameters::resolve(&source)
    }

    #[test]
    fn test_script_contains_provider_settings() {
        let script = generate(&test_params(), "203.0.113.10");
        let text = script.as_str();
        assert!(text.contains(r#"client_id = "cid""#));
        assert!(text.contains("dom.auth.ap-northeast-1.amazoncognito.com"));
        assert!(text.contains(r#"redirect_url = "https://203.0.113.10/oauth2/callback""#));
    }

    #[test]
    fn test_secret_confined_to_config_payload() {
        let script = generate(&test_params(), "203.0.113.10");
        let lines_with_secret: Vec<&str> = script
            .as_str()
            .lines()
            .filter(|line| line.contains("csec"))
            .collect();
        assert_eq!(lines_with_secret, vec![r#"client_secret = "csec""#]);
    }

    #[test]
    fn test_secret_never_echoed() {
        let script = generate(&test_params(), "203.0.113.10");
        for line in script.as_str().lines() {
            if line.trim_start().starts_with("echo") {
                assert!(!line.contains("csec"), "secret echoed: {line}");
            }
        }
    }

    #[test]
    fn test_config_file_has_restrictive_permissions() {
        let script = generate(&test_params(), "203.0.113.10");
        assert!(script
            .as_str()
            .contains("chmod 600 /etc/oauth2-proxy/oauth2-proxy.cfg"));
    }

    #[test]
    fn test_script_is_idempotent() {
        let script = generate(&test_params(), "203.0.113.10");
        let text = script.as_str();
        assert!(text.starts_with("#!/bin/bash"));
        assert!(text.contains("if [ -f /var/lib/gitlab-deploy/bootstrap.done ]"));
        assert!(text.contains("touch /var/lib/gitlab-deploy/bootstrap.done"));
    }

    #[test]
    fn test_debug_does_not_leak_script_body() {
        let script = generate(&test_params(), "203.0.113.10");
        let rendered = format!("{script:?}");
        assert!(!rendered.contains("csec"));
        assert!(rendered.contains("BootstrapScript"));
    }

    #[test]
    fn test_base64_round_trip() {
        let script = generate(&test_params(), "203.0.113.10");
        let decoded = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            script.to_base64(),
        )
        .unwrap();
        assert_eq!(decoded, script.as_str().as_bytes());
    }
}
