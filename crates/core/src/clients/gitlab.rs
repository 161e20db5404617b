//! GitLab REST API (v4) client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};

use crate::actions::{AccessLevel, GroupPermission};
use crate::errors::ClientError;
use crate::targets::{ScmGroup, ScmUser, SourceControlTarget};

use super::{check_response, header_value, http_client};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabGroup {
    pub id: u64,
    pub name: String,
    pub full_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabMember {
    pub id: u64,
    pub access_level: u32,
}

#[derive(Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    api_url: String,
}

impl GitLabClient {
    pub fn new(url: &str, token: &str, timeout: Duration) -> Result<Self, ClientError> {
        let api_url = format!("{}/api/v4", url.trim_end_matches('/'));
        let mut headers = HeaderMap::new();
        headers.insert("private-token", header_value(token)?);
        let http = http_client(timeout, false, headers)?;
        info!(api_url = %api_url, "created GitLabClient");
        Ok(Self { http, api_url })
    }

    #[instrument(skip(self))]
    pub async fn get_authenticated_user(&self) -> Result<GitLabUser, ClientError> {
        let url = format!("{}/user", self.api_url);
        let resp = self.http.get(&url).send().await?;
        check_response(&resp)?;
        let user: GitLabUser = resp.json().await?;
        debug!(username = %user.username, "fetched authenticated user");
        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn users_by_username(&self, username: &str) -> Result<Vec<GitLabUser>, ClientError> {
        let url = format!("{}/users", self.api_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("username", username)])
            .send()
            .await?;
        check_response(&resp)?;
        let users: Vec<GitLabUser> = resp.json().await?;
        Ok(users)
    }

    #[instrument(skip(self))]
    pub async fn search_groups(&self, search: &str) -> Result<Vec<GitLabGroup>, ClientError> {
        let url = format!("{}/groups", self.api_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("search", search), ("per_page", "100"), ("all_available", "true")])
            .send()
            .await?;
        check_response(&resp)?;
        let groups: Vec<GitLabGroup> = resp.json().await?;
        debug!(count = groups.len(), "searched groups");
        Ok(groups)
    }

    /// Direct membership of a user in a group; `None` if not a member.
    #[instrument(skip(self))]
    pub async fn get_member(&self, group_id: u64, user_id: u64) -> Result<Option<GitLabMember>, ClientError> {
        let url = format!("{}/groups/{}/members/{}", self.api_url, group_id, user_id);
        let resp = self.http.get(&url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_response(&resp)?;
        Ok(Some(resp.json().await?))
    }

    #[instrument(skip(self))]
    pub async fn add_member(&self, group_id: u64, user_id: u64, access_level: u32) -> Result<(), ClientError> {
        let url = format!("{}/groups/{}/members", self.api_url, group_id);
        let resp = self
            .http
            .post(&url)
            .json(&json!({ "user_id": user_id, "access_level": access_level }))
            .send()
            .await?;
        if resp.status() == StatusCode::CONFLICT {
            debug!(group_id, user_id, "already a member, updating access level");
            return self.edit_member(group_id, user_id, access_level).await;
        }
        check_response(&resp)?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn edit_member(&self, group_id: u64, user_id: u64, access_level: u32) -> Result<(), ClientError> {
        let url = format!("{}/groups/{}/members/{}", self.api_url, group_id, user_id);
        let resp = self
            .http
            .put(&url)
            .json(&json!({ "access_level": access_level }))
            .send()
            .await?;
        check_response(&resp)?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn set_admin(&self, user_id: u64, admin: bool) -> Result<(), ClientError> {
        let url = format!("{}/users/{}", self.api_url, user_id);
        let resp = self
            .http
            .put(&url)
            .json(&json!({ "admin": admin }))
            .send()
            .await?;
        check_response(&resp)?;
        Ok(())
    }
}

/// Keep groups whose name or full path equals `name` exactly; GitLab's
/// search is a substring match.
fn exact_groups(groups: Vec<GitLabGroup>, name: &str) -> Vec<ScmGroup> {
    groups
        .into_iter()
        .filter(|g| g.name == name || g.full_path == name)
        .map(|g| ScmGroup {
            id: g.id,
            name: g.name,
            full_path: g.full_path,
        })
        .collect()
}

#[async_trait]
impl SourceControlTarget for GitLabClient {
    async fn test_connection(&self) -> Result<(), ClientError> {
        self.get_authenticated_user().await.map(|_| ())
    }

    async fn find_users(&self, username: &str) -> Result<Vec<ScmUser>, ClientError> {
        let users = self.users_by_username(username).await?;
        Ok(users
            .into_iter()
            .filter(|u| u.username == username)
            .map(|u| ScmUser {
                id: u.id,
                username: u.username,
                is_admin: u.is_admin,
            })
            .collect())
    }

    async fn find_groups(&self, name: &str) -> Result<Vec<ScmGroup>, ClientError> {
        let groups = self.search_groups(name).await?;
        Ok(exact_groups(groups, name))
    }

    async fn member_permission(
        &self,
        group_id: u64,
        user_id: u64,
    ) -> Result<Option<GroupPermission>, ClientError> {
        let member = self.get_member(group_id, user_id).await?;
        Ok(member.and_then(|m| GroupPermission::from_access_level_value(m.access_level)))
    }

    async fn add_user_to_group(
        &self,
        user_id: u64,
        group_id: u64,
        permission: GroupPermission,
    ) -> Result<(), ClientError> {
        self.add_member(group_id, user_id, permission.access_level_value())
            .await
    }

    async fn set_access_level(&self, user_id: u64, level: AccessLevel) -> Result<(), ClientError> {
        self.set_admin(user_id, level.is_admin()).await
    }
}
