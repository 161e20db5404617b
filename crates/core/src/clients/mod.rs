//! HTTP clients for the supported sources and targets, and construction of
//! a [`ClientSet`] from configuration.

pub mod gitlab;
pub mod keycloak;
pub mod mailcow;
pub mod outline;

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::info;

use crate::config::{require_secret, BrokeConfig, TargetKind};
use crate::errors::{ClientError, CoreError};
use crate::targets::ClientSet;

pub use gitlab::GitLabClient;
pub use keycloak::KeycloakClient;
pub use mailcow::MailcowClient;
pub use outline::OutlineClient;

const USER_AGENT_VALUE: &str = concat!("broke/", env!("CARGO_PKG_VERSION"));

fn http_client(
    timeout: Duration,
    insecure: bool,
    mut headers: HeaderMap,
) -> Result<reqwest::Client, ClientError> {
    headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
    let http = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .danger_accept_invalid_certs(insecure)
        .build()?;
    Ok(http)
}

fn header_value(value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::from_str(value)
        .map_err(|_| ClientError::AuthenticationFailed("credential is not a valid header value".into()))
}

fn check_response(resp: &reqwest::Response) -> Result<(), ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(());
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return Err(ClientError::AuthenticationFailed(format!("HTTP {}", status)));
    }
    Err(ClientError::ApiError {
        status: status.as_u16(),
        body: format!("HTTP {}", status),
    })
}

impl ClientSet {
    /// Build an HTTP client for every configured source and target.
    ///
    /// Secrets must have been resolved with
    /// [`BrokeConfig::resolve_env_vars`] beforehand.
    pub fn from_config(config: &BrokeConfig) -> Result<Self, CoreError> {
        let timeout = Duration::from_secs(config.http.timeout_secs);
        let mut clients = ClientSet::new();

        for source in &config.user_sources {
            let kc = &source.keycloak;
            let username = require_secret(
                &kc.admin_username,
                &kc.admin_username_env,
                "keycloak.admin_username_env",
            )?;
            let password = require_secret(
                &kc.admin_password,
                &kc.admin_password_env,
                "keycloak.admin_password_env",
            )?;
            let client = KeycloakClient::new(kc, username, password, timeout)?;
            clients = clients.with_source(source.name.clone(), Arc::new(client));
        }

        for target in &config.user_targets {
            let name = target.name.clone();
            clients = match &target.kind {
                TargetKind::Mailcow(c) => {
                    let key = require_secret(&c.api_key, &c.api_key_env, "mailcow.api_key_env")?;
                    clients.with_mail_target(name, Arc::new(MailcowClient::new(&c.url, key, timeout)?))
                }
                TargetKind::Outline(c) => {
                    let key = require_secret(&c.api_key, &c.api_key_env, "outline.api_key_env")?;
                    clients.with_wiki_target(name, Arc::new(OutlineClient::new(&c.url, key, timeout)?))
                }
                TargetKind::Gitlab(c) => {
                    let key = require_secret(&c.api_key, &c.api_key_env, "gitlab.api_key_env")?;
                    clients.with_scm_target(name, Arc::new(GitLabClient::new(&c.url, key, timeout)?))
                }
            };
        }

        info!(
            sources = config.user_sources.len(),
            targets = config.user_targets.len(),
            "clients created"
        );
        Ok(clients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_requires_secrets() {
        let toml_str = r#"
[[user_sources]]
name = "kc"
[user_sources.keycloak]
url = "https://sso.example.com"
realm = "r"
admin_username_env = "TEST_BROKE_CLIENTS_UNSET_USER"
admin_password_env = "TEST_BROKE_CLIENTS_UNSET_PASSWORD"
"#;
        let mut config = BrokeConfig::from_toml(toml_str).unwrap();
        config.resolve_env_vars();
        let err = match ClientSet::from_config(&config) {
            Err(e) => e,
            Ok(_) => panic!("expected missing secret"),
        };
        assert!(err.to_string().contains("TEST_BROKE_CLIENTS_UNSET_USER"));
    }

    #[test]
    fn test_from_config_registers_every_client() {
        let toml_str = r#"
[[user_sources]]
name = "kc"
[user_sources.keycloak]
url = "https://sso.example.com"
realm = "r"
admin_username_env = "U"
admin_password_env = "P"

[[user_targets]]
name = "mail"
[user_targets.mailcow]
url = "https://mail.example.com"
api_key_env = "K"

[[user_targets]]
name = "wiki"
[user_targets.outline]
url = "https://wiki.example.com"
api_key_env = "K"

[[user_targets]]
name = "code"
[user_targets.gitlab]
url = "https://git.example.com"
api_key_env = "K"
"#;
        let mut config = BrokeConfig::from_toml(toml_str).unwrap();
        config.user_sources[0].keycloak.admin_username = Some("admin".into());
        config.user_sources[0].keycloak.admin_password = Some("secret".into());
        for target in &mut config.user_targets {
            match &mut target.kind {
                TargetKind::Mailcow(c) => c.api_key = Some("k".into()),
                TargetKind::Outline(c) => c.api_key = Some("k".into()),
                TargetKind::Gitlab(c) => c.api_key = Some("k".into()),
            }
        }

        let clients = ClientSet::from_config(&config).expect("clients should build");
        assert!(clients.source("kc").is_ok());
        assert!(clients.mail_target("mail").is_ok());
        assert!(clients.wiki_target("wiki").is_ok());
        assert!(clients.scm_target("code").is_ok());
        assert!(clients.wiki_target("mail").is_err());
    }
}
