//! Outline wiki API client.
//!
//! Every Outline endpoint is a `POST /api/<method>` with a JSON body and a
//! `{"data": ...}` envelope in the response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, trace};

use crate::actions::OutlineRole;
use crate::errors::ClientError;
use crate::targets::{WikiGroup, WikiTarget, WikiUser};

use super::{check_response, header_value, http_client};

/// Page size for list endpoints.
const PAGE_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutlineUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_viewer: bool,
}

impl OutlineUser {
    /// Current role, falling back to the legacy admin/viewer flags.
    pub fn current_role(&self) -> Option<OutlineRole> {
        match self.role.as_deref() {
            Some(role) => OutlineRole::from_api(role),
            None if self.is_admin => Some(OutlineRole::Admin),
            None if self.is_viewer => Some(OutlineRole::Viewer),
            None => Some(OutlineRole::Editor),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlineGroup {
    pub id: String,
    pub name: String,
}

/// `groups.list` answers either with a bare list or with `{groups: [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GroupList {
    Wrapped { groups: Vec<OutlineGroup> },
    Bare(Vec<OutlineGroup>),
}

impl GroupList {
    fn into_groups(self) -> Vec<OutlineGroup> {
        match self {
            Self::Wrapped { groups } => groups,
            Self::Bare(groups) => groups,
        }
    }
}

#[derive(Clone)]
pub struct OutlineClient {
    http: reqwest::Client,
    api_url: String,
}

impl OutlineClient {
    pub fn new(url: &str, api_key: &str, timeout: Duration) -> Result<Self, ClientError> {
        let api_url = format!("{}/api", url.trim_end_matches('/'));
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", api_key))?);
        let http = http_client(timeout, false, headers)?;
        info!(api_url = %api_url, "created OutlineClient");
        Ok(Self { http, api_url })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, ClientError> {
        let url = format!("{}/{}", self.api_url, method);
        let resp = self.http.post(&url).json(&body).send().await?;
        check_response(&resp)?;
        let envelope: Envelope<T> = resp.json().await?;
        Ok(envelope.data)
    }

    #[instrument(skip(self))]
    pub async fn users_by_email(&self, email: &str) -> Result<Vec<OutlineUser>, ClientError> {
        let users: Vec<OutlineUser> = self
            .call("users.list", json!({ "emails": [email], "filter": "all" }))
            .await?;
        // Older servers ignore the email filter.
        Ok(users
            .into_iter()
            .filter(|u| u.email.as_deref() == Some(email))
            .collect())
    }

    /// All groups, optionally restricted to those the user belongs to.
    #[instrument(skip(self))]
    pub async fn list_groups(&self, user_id: Option<&str>) -> Result<Vec<OutlineGroup>, ClientError> {
        let mut groups = Vec::new();
        loop {
            let mut body = json!({ "limit": PAGE_LIMIT, "offset": groups.len() });
            if let Some(id) = user_id {
                body["userId"] = json!(id);
            }
            let page: GroupList = self.call("groups.list", body).await?;
            let page = page.into_groups();
            trace!(offset = groups.len(), count = page.len(), "fetched group page");
            let last_page = page.len() < PAGE_LIMIT;
            groups.extend(page);
            if last_page {
                break;
            }
        }
        Ok(groups)
    }
}

fn exact_groups(groups: Vec<OutlineGroup>, name: &str) -> Vec<WikiGroup> {
    groups
        .into_iter()
        .filter(|g| g.name == name)
        .map(|g| WikiGroup {
            id: g.id,
            name: g.name,
        })
        .collect()
}

#[async_trait]
impl WikiTarget for OutlineClient {
    async fn test_connection(&self) -> Result<(), ClientError> {
        let _: serde_json::Value = self.call("auth.info", json!({})).await?;
        Ok(())
    }

    async fn find_users(&self, email: &str) -> Result<Vec<WikiUser>, ClientError> {
        let users = self.users_by_email(email).await?;
        Ok(users
            .into_iter()
            .map(|u| WikiUser {
                role: u.current_role(),
                email: u.email.unwrap_or_default(),
                id: u.id,
            })
            .collect())
    }

    async fn find_groups(&self, name: &str) -> Result<Vec<WikiGroup>, ClientError> {
        let groups = self.list_groups(None).await?;
        Ok(exact_groups(groups, name))
    }

    async fn user_group_names(&self, user_id: &str) -> Result<Vec<String>, ClientError> {
        let groups = self.list_groups(Some(user_id)).await?;
        Ok(groups.into_iter().map(|g| g.name).collect())
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .call("groups.add_user", json!({ "id": group_id, "userId": user_id }))
            .await?;
        debug!(user_id, group_id, "added user to outline group");
        Ok(())
    }

    async fn set_user_role(&self, user_id: &str, role: OutlineRole) -> Result<(), ClientError> {
        let _: serde_json::Value = self
            .call(
                "users.update_role",
                json!({ "id": user_id, "role": role.api_name() }),
            )
            .await?;
        debug!(user_id, %role, "updated outline role");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_users_list() {
        let body = r#"{"data": [
            {"id": "a1", "name": "Alice", "email": "alice@example.com", "role": "member"},
            {"id": "b2", "name": "Bob", "email": "bob@example.com", "isAdmin": true}
        ], "pagination": {"limit": 25, "offset": 0}}"#;
        let envelope: Envelope<Vec<OutlineUser>> = serde_json::from_str(body).unwrap();
        assert_eq!(envelope.data.len(), 2);
        assert_eq!(envelope.data[0].current_role(), Some(OutlineRole::Editor));
        assert_eq!(envelope.data[1].current_role(), Some(OutlineRole::Admin));
    }

    #[test]
    fn test_unknown_role_is_none() {
        let user: OutlineUser =
            serde_json::from_str(r#"{"id": "g", "email": "g@example.com", "role": "guest"}"#).unwrap();
        assert_eq!(user.current_role(), None);
    }

    #[test]
    fn test_parse_group_list_shapes() {
        let wrapped: Envelope<GroupList> = serde_json::from_str(
            r#"{"data": {"groups": [{"id": "g1", "name": "Staff", "memberCount": 3}], "groupMemberships": []}}"#,
        )
        .unwrap();
        assert_eq!(wrapped.data.into_groups()[0].name, "Staff");

        let bare: Envelope<GroupList> =
            serde_json::from_str(r#"{"data": [{"id": "g2", "name": "Ops"}]}"#).unwrap();
        assert_eq!(bare.data.into_groups()[0].id, "g2");
    }

    #[test]
    fn test_exact_groups() {
        let groups: Vec<OutlineGroup> = serde_json::from_str(
            r#"[
                {"id": "g1", "name": "Staff"},
                {"id": "g2", "name": "Staff Alumni"},
                {"id": "g3", "name": "staff"}
            ]"#,
        )
        .unwrap();
        let exact = exact_groups(groups, "Staff");
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].id, "g1");
    }
}
