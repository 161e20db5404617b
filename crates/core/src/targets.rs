//! Capability traits of user sources and user targets, and the registry of
//! live clients keyed by configured name.
//!
//! The planner and runner only talk to these traits. The HTTP
//! implementations live in [`crate::clients`]; tests register in-memory
//! fakes instead.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::actions::{AccessLevel, GroupPermission, OutlineRole};
use crate::errors::{ClientError, ReconcileError};
use crate::identity::User;

// ---------------------------------------------------------------------------
// Target-side records
// ---------------------------------------------------------------------------

/// Request to create a mailbox `<local_part>@<domain>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMailbox {
    pub local_part: String,
    pub domain: String,
    /// Display name of the mailbox owner.
    pub name: String,
    pub auth_source: String,
}

impl CreateMailbox {
    pub fn address(&self) -> String {
        format!("{}@{}", self.local_part, self.domain)
    }
}

/// An account in the wiki.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiUser {
    pub id: String,
    pub email: String,
    /// `None` when the wiki reports a role outside [`OutlineRole`].
    pub role: Option<OutlineRole>,
}

/// A group in the wiki.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiGroup {
    pub id: String,
    pub name: String,
}

/// An account in the source-control system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmUser {
    pub id: u64,
    pub username: String,
    pub is_admin: bool,
}

impl ScmUser {
    pub fn access_level(&self) -> AccessLevel {
        if self.is_admin {
            AccessLevel::Administrator
        } else {
            AccessLevel::Regular
        }
    }
}

/// A group in the source-control system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScmGroup {
    pub id: u64,
    pub name: String,
    pub full_path: String,
}

// ---------------------------------------------------------------------------
// Capability traits
// ---------------------------------------------------------------------------

/// A directory that users are read from.
#[async_trait]
pub trait UserSource: Send + Sync {
    /// Verify connectivity and credentials.
    async fn test_connection(&self) -> Result<(), ClientError>;

    /// Every user of the source with groups and effective roles populated.
    /// `User::source` is filled in by the caller.
    async fn list_users(&self) -> Result<Vec<User>, ClientError>;
}

/// A mail server holding mailboxes.
#[async_trait]
pub trait MailTarget: Send + Sync {
    async fn test_connection(&self) -> Result<(), ClientError>;

    async fn mailbox_exists(&self, address: &str) -> Result<bool, ClientError>;

    async fn create_mailbox(&self, request: &CreateMailbox) -> Result<(), ClientError>;
}

/// A wiki with groups and per-user roles.
#[async_trait]
pub trait WikiTarget: Send + Sync {
    async fn test_connection(&self) -> Result<(), ClientError>;

    /// Every account whose email equals `email`.
    async fn find_users(&self, email: &str) -> Result<Vec<WikiUser>, ClientError>;

    /// Every group whose name equals `name`.
    async fn find_groups(&self, name: &str) -> Result<Vec<WikiGroup>, ClientError>;

    /// Names of the groups the account belongs to.
    async fn user_group_names(&self, user_id: &str) -> Result<Vec<String>, ClientError>;

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> Result<(), ClientError>;

    async fn set_user_role(&self, user_id: &str, role: OutlineRole) -> Result<(), ClientError>;
}

/// A source-control system with groups and an instance-wide admin flag.
#[async_trait]
pub trait SourceControlTarget: Send + Sync {
    async fn test_connection(&self) -> Result<(), ClientError>;

    /// Every account whose username equals `username`.
    async fn find_users(&self, username: &str) -> Result<Vec<ScmUser>, ClientError>;

    /// Every group whose name or full path equals `name`.
    async fn find_groups(&self, name: &str) -> Result<Vec<ScmGroup>, ClientError>;

    /// Current permission of the user in the group, `None` if not a member.
    async fn member_permission(
        &self,
        group_id: u64,
        user_id: u64,
    ) -> Result<Option<GroupPermission>, ClientError>;

    /// Make the user a member with `permission`, updating an existing
    /// membership if needed.
    async fn add_user_to_group(
        &self,
        user_id: u64,
        group_id: u64,
        permission: GroupPermission,
    ) -> Result<(), ClientError>;

    async fn set_access_level(&self, user_id: u64, level: AccessLevel) -> Result<(), ClientError>;
}

/// Require exactly one lookup result.
pub(crate) fn exactly_one<T>(
    target: &str,
    kind: &'static str,
    key: &str,
    mut matches: Vec<T>,
) -> Result<T, ReconcileError> {
    if matches.len() == 1 {
        if let Some(found) = matches.pop() {
            return Ok(found);
        }
    }
    Err(ReconcileError::AmbiguousLookup {
        target: target.to_string(),
        kind,
        key: key.to_string(),
        matches: matches.len(),
    })
}

// ---------------------------------------------------------------------------
// Client registry
// ---------------------------------------------------------------------------

/// Live clients for every configured source and target, keyed by name.
#[derive(Default, Clone)]
pub struct ClientSet {
    sources: BTreeMap<String, Arc<dyn UserSource>>,
    mail: BTreeMap<String, Arc<dyn MailTarget>>,
    wiki: BTreeMap<String, Arc<dyn WikiTarget>>,
    scm: BTreeMap<String, Arc<dyn SourceControlTarget>>,
}

/// Outcome of a connection check against one source or target.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub name: String,
    pub kind: &'static str,
    /// `None` when the check succeeded.
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

impl ClientSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, name: impl Into<String>, client: Arc<dyn UserSource>) -> Self {
        self.sources.insert(name.into(), client);
        self
    }

    pub fn with_mail_target(mut self, name: impl Into<String>, client: Arc<dyn MailTarget>) -> Self {
        self.mail.insert(name.into(), client);
        self
    }

    pub fn with_wiki_target(mut self, name: impl Into<String>, client: Arc<dyn WikiTarget>) -> Self {
        self.wiki.insert(name.into(), client);
        self
    }

    pub fn with_scm_target(
        mut self,
        name: impl Into<String>,
        client: Arc<dyn SourceControlTarget>,
    ) -> Self {
        self.scm.insert(name.into(), client);
        self
    }

    pub fn source(&self, name: &str) -> Result<&dyn UserSource, ReconcileError> {
        self.sources
            .get(name)
            .map(|c| c.as_ref())
            .ok_or_else(|| ReconcileError::MissingClient(name.to_string()))
    }

    pub fn mail_target(&self, name: &str) -> Result<&dyn MailTarget, ReconcileError> {
        self.mail
            .get(name)
            .map(|c| c.as_ref())
            .ok_or_else(|| ReconcileError::MissingClient(name.to_string()))
    }

    pub fn wiki_target(&self, name: &str) -> Result<&dyn WikiTarget, ReconcileError> {
        self.wiki
            .get(name)
            .map(|c| c.as_ref())
            .ok_or_else(|| ReconcileError::MissingClient(name.to_string()))
    }

    pub fn scm_target(&self, name: &str) -> Result<&dyn SourceControlTarget, ReconcileError> {
        self.scm
            .get(name)
            .map(|c| c.as_ref())
            .ok_or_else(|| ReconcileError::MissingClient(name.to_string()))
    }

    /// Check every registered client. Failures are reported, not raised.
    pub async fn test_connections(&self) -> Vec<ConnectionStatus> {
        let mut statuses = Vec::new();

        for (name, client) in &self.sources {
            statuses.push(status(name, "keycloak", client.test_connection().await));
        }
        for (name, client) in &self.mail {
            statuses.push(status(name, "mailcow", client.test_connection().await));
        }
        for (name, client) in &self.wiki {
            statuses.push(status(name, "outline", client.test_connection().await));
        }
        for (name, client) in &self.scm {
            statuses.push(status(name, "gitlab", client.test_connection().await));
        }

        statuses
    }
}

fn status(name: &str, kind: &'static str, result: Result<(), ClientError>) -> ConnectionStatus {
    match result {
        Ok(()) => {
            info!(name, kind, "connection ok");
            ConnectionStatus {
                name: name.to_string(),
                kind,
                error: None,
            }
        }
        Err(e) => {
            warn!(name, kind, error = %e, "connection failed");
            ConnectionStatus {
                name: name.to_string(),
                kind,
                error: Some(e.to_string()),
            }
        }
    }
}
