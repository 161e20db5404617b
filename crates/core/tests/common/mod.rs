//! In-memory sources and targets for planner and runner tests.
//!
//! Every fake keeps mutable state behind a `Mutex`, so applying a plan
//! changes what the next plan sees. Calls are recorded for assertions.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use broke_core::actions::{AccessLevel, GroupPermission, OutlineRole};
use broke_core::config::BrokeConfig;
use broke_core::errors::ClientError;
use broke_core::targets::{
    CreateMailbox, MailTarget, ScmGroup, ScmUser, SourceControlTarget, UserSource, WikiGroup,
    WikiTarget, WikiUser,
};
use broke_core::{ClientSet, User};

// ===========================================================================
// Helpers
// ===========================================================================

pub fn user(name: &str, groups: &[&str], roles: &[&str]) -> User {
    User::new(
        format!("id-{}", name),
        "",
        name,
        format!("{}@example.com", name),
    )
    .with_groups(groups.iter().copied())
    .with_roles(roles.iter().copied())
}

pub fn config(targets: &str) -> BrokeConfig {
    let toml_str = format!(
        r#"
[[user_sources]]
name = "kc"
[user_sources.keycloak]
url = "https://sso.example.com"
realm = "staff"
admin_username_env = "KC_USER"
admin_password_env = "KC_PASSWORD"
{}
"#,
        targets
    );
    let config = BrokeConfig::from_toml(&toml_str).expect("test config should parse");
    config.validate().expect("test config should validate");
    config
}

fn unavailable() -> ClientError {
    ClientError::ApiError {
        status: 503,
        body: "HTTP 503 Service Unavailable".into(),
    }
}

// ===========================================================================
// Source
// ===========================================================================

#[derive(Default)]
pub struct FakeSource {
    pub users: Vec<User>,
    pub fail: bool,
}

impl FakeSource {
    pub fn new(users: Vec<User>) -> Arc<Self> {
        Arc::new(Self { users, fail: false })
    }
}

#[async_trait]
impl UserSource for FakeSource {
    async fn test_connection(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn list_users(&self) -> Result<Vec<User>, ClientError> {
        if self.fail {
            return Err(ClientError::AuthenticationFailed("invalid_grant".into()));
        }
        Ok(self.users.clone())
    }
}

// ===========================================================================
// Mail
// ===========================================================================

#[derive(Default)]
pub struct FakeMail {
    pub mailboxes: Mutex<BTreeSet<String>>,
    pub created: Mutex<Vec<CreateMailbox>>,
    pub lookups: Mutex<usize>,
    pub fail_lookups: bool,
    /// Addresses whose creation is rejected.
    pub reject: BTreeSet<String>,
}

impl FakeMail {
    pub fn with_mailboxes(addresses: &[&str]) -> Self {
        Self {
            mailboxes: Mutex::new(addresses.iter().map(|a| a.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn created_addresses(&self) -> Vec<String> {
        self.created.lock().unwrap().iter().map(|r| r.address()).collect()
    }
}

#[async_trait]
impl MailTarget for FakeMail {
    async fn test_connection(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn mailbox_exists(&self, address: &str) -> Result<bool, ClientError> {
        *self.lookups.lock().unwrap() += 1;
        if self.fail_lookups {
            return Err(unavailable());
        }
        Ok(self.mailboxes.lock().unwrap().contains(address))
    }

    async fn create_mailbox(&self, request: &CreateMailbox) -> Result<(), ClientError> {
        let address = request.address();
        if self.reject.contains(&address) {
            return Err(ClientError::Rejected("mailbox_quota_exceeded".into()));
        }
        self.mailboxes.lock().unwrap().insert(address);
        self.created.lock().unwrap().push(request.clone());
        Ok(())
    }
}

// ===========================================================================
// Wiki
// ===========================================================================

#[derive(Default)]
pub struct FakeWiki {
    pub users: Mutex<Vec<WikiUser>>,
    pub groups: Mutex<Vec<WikiGroup>>,
    /// Group names per wiki user id.
    pub memberships: Mutex<BTreeMap<String, Vec<String>>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeWiki {
    /// Wiki with groups `names`, each with id `g-<lowercased name>`.
    pub fn with_groups(names: &[&str]) -> Self {
        let wiki = Self::default();
        for name in names {
            wiki.add_group(&format!("g-{}", name.to_lowercase()), name);
        }
        wiki
    }

    pub fn add_group(&self, id: &str, name: &str) {
        self.groups.lock().unwrap().push(WikiGroup {
            id: id.into(),
            name: name.into(),
        });
    }

    pub fn role_of(&self, id: &str) -> Option<OutlineRole> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .and_then(|u| u.role)
    }

    pub fn add_user(&self, id: &str, email: &str, role: OutlineRole, groups: &[&str]) {
        self.users.lock().unwrap().push(WikiUser {
            id: id.into(),
            email: email.into(),
            role: Some(role),
        });
        self.memberships
            .lock()
            .unwrap()
            .insert(id.into(), groups.iter().map(|g| g.to_string()).collect());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl WikiTarget for FakeWiki {
    async fn test_connection(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn find_users(&self, email: &str) -> Result<Vec<WikiUser>, ClientError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.email == email)
            .cloned()
            .collect())
    }

    async fn find_groups(&self, name: &str) -> Result<Vec<WikiGroup>, ClientError> {
        Ok(self
            .groups
            .lock()
            .unwrap()
            .iter()
            .filter(|g| g.name == name)
            .cloned()
            .collect())
    }

    async fn user_group_names(&self, user_id: &str) -> Result<Vec<String>, ClientError> {
        Ok(self
            .memberships
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_user_to_group(&self, user_id: &str, group_id: &str) -> Result<(), ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("add_user_to_group {} {}", user_id, group_id));
        let name = self
            .groups
            .lock()
            .unwrap()
            .iter()
            .find(|g| g.id == group_id)
            .map(|g| g.name.clone())
            .ok_or_else(|| ClientError::Rejected(format!("unknown group {}", group_id)))?;
        self.memberships
            .lock()
            .unwrap()
            .entry(user_id.to_string())
            .or_default()
            .push(name);
        Ok(())
    }

    async fn set_user_role(&self, user_id: &str, role: OutlineRole) -> Result<(), ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("set_user_role {} {}", user_id, role));
        for u in self.users.lock().unwrap().iter_mut() {
            if u.id == user_id {
                u.role = Some(role);
            }
        }
        Ok(())
    }
}

// ===========================================================================
// Source control
// ===========================================================================

#[derive(Default)]
pub struct FakeScm {
    pub users: Mutex<Vec<ScmUser>>,
    pub groups: Vec<ScmGroup>,
    /// Permission per (group id, user id).
    pub members: Mutex<BTreeMap<(u64, u64), GroupPermission>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeScm {
    pub fn new(groups: &[(u64, &str)]) -> Self {
        Self {
            groups: groups
                .iter()
                .map(|(id, name)| ScmGroup {
                    id: *id,
                    name: name.to_string(),
                    full_path: name.to_string(),
                })
                .collect(),
            ..Default::default()
        }
    }

    pub fn add_user(&self, id: u64, username: &str, is_admin: bool) {
        self.users.lock().unwrap().push(ScmUser {
            id,
            username: username.into(),
            is_admin,
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Admin flag of the account and its permission in group `group_id`.
    pub fn state_of(&self, user_id: u64, group_id: u64) -> (bool, Option<GroupPermission>) {
        let is_admin = self
            .users
            .lock()
            .unwrap()
            .iter()
            .any(|u| u.id == user_id && u.is_admin);
        let permission = self.members.lock().unwrap().get(&(group_id, user_id)).copied();
        (is_admin, permission)
    }
}

#[async_trait]
impl SourceControlTarget for FakeScm {
    async fn test_connection(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn find_users(&self, username: &str) -> Result<Vec<ScmUser>, ClientError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.username == username)
            .cloned()
            .collect())
    }

    async fn find_groups(&self, name: &str) -> Result<Vec<ScmGroup>, ClientError> {
        Ok(self
            .groups
            .iter()
            .filter(|g| g.name == name || g.full_path == name)
            .cloned()
            .collect())
    }

    async fn member_permission(
        &self,
        group_id: u64,
        user_id: u64,
    ) -> Result<Option<GroupPermission>, ClientError> {
        Ok(self.members.lock().unwrap().get(&(group_id, user_id)).copied())
    }

    async fn add_user_to_group(
        &self,
        user_id: u64,
        group_id: u64,
        permission: GroupPermission,
    ) -> Result<(), ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("add_user_to_group {} {} {}", user_id, group_id, permission));
        self.members
            .lock()
            .unwrap()
            .insert((group_id, user_id), permission);
        Ok(())
    }

    async fn set_access_level(&self, user_id: u64, level: AccessLevel) -> Result<(), ClientError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("set_access_level {} {}", user_id, level));
        for u in self.users.lock().unwrap().iter_mut() {
            if u.id == user_id {
                u.is_admin = level.is_admin();
            }
        }
        Ok(())
    }
}

/// Client set with one source named `kc` returning `users`.
pub fn clients_with(users: Vec<User>) -> ClientSet {
    ClientSet::new().with_source("kc", FakeSource::new(users))
}
