//! Keycloak admin REST API client.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, trace};

use crate::config::KeycloakConfig;
use crate::errors::ClientError;
use crate::identity::User;
use crate::targets::UserSource;

use super::{check_response, http_client};

/// Users fetched per page.
const PAGE_SIZE: usize = 100;

/// Tokens are refreshed this long before they expire.
const TOKEN_MARGIN: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeycloakUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeycloakGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KeycloakRole {
    pub name: String,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Reads users of one realm with an admin account.
pub struct KeycloakClient {
    http: reqwest::Client,
    base_url: String,
    realm: String,
    username: String,
    password: String,
    token: Mutex<Option<CachedToken>>,
}

impl KeycloakClient {
    pub fn new(
        config: &KeycloakConfig,
        username: &str,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let base_url = config.url.trim_end_matches('/').to_string();
        let http = http_client(timeout, config.insecure, HeaderMap::new())?;
        info!(url = %base_url, realm = %config.realm, "created KeycloakClient");
        Ok(Self {
            http,
            base_url,
            realm: config.realm.clone(),
            username: username.to_string(),
            password: password.to_string(),
            token: Mutex::new(None),
        })
    }

    /// Return a valid admin access token, logging in again when the cached
    /// one is about to expire.
    async fn access_token(&self) -> Result<String, ClientError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_MARGIN < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let url = format!(
            "{}/realms/{}/protocol/openid-connect/token",
            self.base_url, self.realm
        );
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "password"),
                ("client_id", "admin-cli"),
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ClientError::AuthenticationFailed(format!(
                "keycloak login as '{}' failed: HTTP {}",
                self.username,
                resp.status()
            )));
        }
        let token: TokenResponse = resp.json().await?;
        debug!(expires_in = token.expires_in, "obtained keycloak access token");

        let value = token.access_token.clone();
        *cached = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(value)
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let token = self.access_token().await?;
        let url = format!("{}/admin/realms/{}{}", self.base_url, self.realm, path);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&token)
            .query(query)
            .send()
            .await?;
        check_response(&resp)?;
        Ok(resp.json().await?)
    }

    #[instrument(skip(self))]
    pub async fn count_users(&self) -> Result<usize, ClientError> {
        self.get("/users/count", &[]).await
    }

    /// All users of the realm, paged. Disabled accounts are included.
    #[instrument(skip(self))]
    pub async fn get_users(&self) -> Result<Vec<KeycloakUser>, ClientError> {
        let total = self.count_users().await?;
        let mut users = Vec::with_capacity(total);

        while users.len() < total {
            let page: Vec<KeycloakUser> = self
                .get(
                    "/users",
                    &[
                        ("first", users.len().to_string()),
                        ("max", PAGE_SIZE.to_string()),
                        ("briefRepresentation", "true".to_string()),
                    ],
                )
                .await?;
            trace!(first = users.len(), count = page.len(), "fetched user page");
            let last_page = page.len() < PAGE_SIZE;
            users.extend(page);
            if last_page {
                break;
            }
        }

        debug!(count = users.len(), total, "fetched keycloak users");
        Ok(users)
    }

    #[instrument(skip(self))]
    pub async fn get_user_groups(&self, user_id: &str) -> Result<Vec<KeycloakGroup>, ClientError> {
        self.get(
            &format!("/users/{}/groups", user_id),
            &[("max", "1000".to_string())],
        )
        .await
    }

    /// Effective realm roles, including those inherited from composites and groups.
    #[instrument(skip(self))]
    pub async fn get_effective_realm_roles(
        &self,
        user_id: &str,
    ) -> Result<Vec<KeycloakRole>, ClientError> {
        self.get(&format!("/users/{}/role-mappings/realm/composite", user_id), &[])
            .await
    }
}

#[async_trait]
impl UserSource for KeycloakClient {
    async fn test_connection(&self) -> Result<(), ClientError> {
        self.count_users().await.map(|_| ())
    }

    async fn list_users(&self) -> Result<Vec<User>, ClientError> {
        let accounts = self.get_users().await?;
        let mut users = Vec::with_capacity(accounts.len());

        for account in accounts {
            let groups = self.get_user_groups(&account.id).await?;
            let roles = self.get_effective_realm_roles(&account.id).await?;
            users.push(into_user(account, groups, roles));
        }
        Ok(users)
    }
}

fn into_user(account: KeycloakUser, groups: Vec<KeycloakGroup>, roles: Vec<KeycloakRole>) -> User {
    let groups: BTreeSet<String> = groups.into_iter().map(|g| g.name).collect();
    let roles: BTreeSet<String> = roles.into_iter().map(|r| r.name).collect();
    User {
        id: account.id,
        source: String::new(),
        username: account.username,
        email: account.email.unwrap_or_default(),
        groups,
        roles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_page() {
        let body = r#"[
            {"id": "u-1", "username": "alice", "email": "alice@example.com", "enabled": true, "emailVerified": true},
            {"id": "u-2", "username": "svc-backup"}
        ]"#;
        let users: Vec<KeycloakUser> = serde_json::from_str(body).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].email.as_deref(), Some("alice@example.com"));
        assert_eq!(users[1].email, None);
    }

    #[test]
    fn test_into_user_collects_group_and_role_names() {
        let account = KeycloakUser {
            id: "u-1".into(),
            username: "alice".into(),
            email: Some("alice@example.com".into()),
        };
        let groups: Vec<KeycloakGroup> =
            serde_json::from_str(r#"[{"id": "g-1", "name": "staff", "path": "/staff"}]"#).unwrap();
        let roles: Vec<KeycloakRole> = serde_json::from_str(
            r#"[{"id": "r-1", "name": "offline_access", "composite": false}, {"name": "admin"}]"#,
        )
        .unwrap();

        let user = into_user(account, groups, roles);
        assert!(user.has_group("staff"));
        assert!(!user.has_group("/staff"));
        assert!(user.has_role("admin"));
        assert!(user.has_role("offline_access"));
        assert_eq!(user.email, "alice@example.com");
    }

    #[test]
    fn test_token_default_expiry() {
        let token: TokenResponse = serde_json::from_str(r#"{"access_token": "abc"}"#).unwrap();
        assert_eq!(token.expires_in, 60);
    }
}
