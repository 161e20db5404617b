//! Target-specific actions emitted by the planner and applied by the runner.
//!
//! Every target kind has its own closed action enum. An action is always
//! wrapped in a [`TargetAction`] naming the configured target it applies to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Discriminator values
// ---------------------------------------------------------------------------

/// Role of a user in the Outline wiki.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlineRole {
    Admin,
    Editor,
    Viewer,
}

impl OutlineRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }

    /// Role name understood by the Outline API (`editor` is called `member`).
    pub fn api_name(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Editor => "member",
            Self::Viewer => "viewer",
        }
    }

    /// Interpret a role reported by the Outline API.
    pub fn from_api(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "member" | "editor" => Some(Self::Editor),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

impl FromStr for OutlineRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            other => Err(format!(
                "unknown outline role '{}' (expected admin, editor or viewer)",
                other
            )),
        }
    }
}

impl fmt::Display for OutlineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission of a member inside a GitLab group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupPermission {
    Guest,
    Reporter,
    Developer,
    Maintainer,
    Owner,
}

impl GroupPermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guest => "guest",
            Self::Reporter => "reporter",
            Self::Developer => "developer",
            Self::Maintainer => "maintainer",
            Self::Owner => "owner",
        }
    }

    /// Numeric `access_level` used by the GitLab API.
    pub fn access_level_value(&self) -> u32 {
        match self {
            Self::Guest => 10,
            Self::Reporter => 20,
            Self::Developer => 30,
            Self::Maintainer => 40,
            Self::Owner => 50,
        }
    }

    pub fn from_access_level_value(value: u32) -> Option<Self> {
        match value {
            10 => Some(Self::Guest),
            20 => Some(Self::Reporter),
            30 => Some(Self::Developer),
            40 => Some(Self::Maintainer),
            50 => Some(Self::Owner),
            _ => None,
        }
    }
}

impl FromStr for GroupPermission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(Self::Guest),
            "reporter" => Ok(Self::Reporter),
            "developer" => Ok(Self::Developer),
            "maintainer" => Ok(Self::Maintainer),
            "owner" => Ok(Self::Owner),
            other => Err(format!(
                "unknown gitlab group permission '{}' (expected owner, maintainer, developer, reporter or guest)",
                other
            )),
        }
    }
}

impl fmt::Display for GroupPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instance-wide access level of a GitLab account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Regular,
    Administrator,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::Administrator => "administrator",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Administrator)
    }
}

impl FromStr for AccessLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regular" => Ok(Self::Regular),
            "administrator" => Ok(Self::Administrator),
            other => Err(format!(
                "unknown gitlab access level '{}' (expected regular or administrator)",
                other
            )),
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Identifies an action for de-duplication: the variant name and the value
/// that distinguishes two actions of that variant. Settings a target holds
/// once per account use an empty value.
pub trait KeyedAction {
    fn key(&self) -> (&'static str, String);
}

/// Actions on a Mailcow mail server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum MailcowAction {
    /// Ensure a mailbox `<username>@<domain>` exists.
    CreateAccount { domain: String, auth_source: String },
}

impl KeyedAction for MailcowAction {
    fn key(&self) -> (&'static str, String) {
        match self {
            Self::CreateAccount { domain, .. } => ("createAccount", domain.clone()),
        }
    }
}

/// Actions on an Outline wiki.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum OutlineAction {
    AddGroup { group_name: String },
    SetRole { role: OutlineRole },
}

impl KeyedAction for OutlineAction {
    fn key(&self) -> (&'static str, String) {
        match self {
            Self::AddGroup { group_name } => ("addGroup", group_name.clone()),
            Self::SetRole { .. } => ("setRole", String::new()),
        }
    }
}

/// Actions on a GitLab instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GitlabAction {
    AddGroup {
        group_name: String,
        permission_level: GroupPermission,
    },
    SetAccessLevel { access_level: AccessLevel },
}

impl KeyedAction for GitlabAction {
    fn key(&self) -> (&'static str, String) {
        match self {
            Self::AddGroup { group_name, .. } => ("addGroup", group_name.clone()),
            Self::SetAccessLevel { .. } => ("setAccessLevel", String::new()),
        }
    }
}

/// An action bound to the configured target it applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetAction<A> {
    /// Name of the user target.
    pub target: String,
    #[serde(flatten)]
    pub action: A,
}

impl<A: KeyedAction> TargetAction<A> {
    pub fn new(target: impl Into<String>, action: A) -> Self {
        Self {
            target: target.into(),
            action,
        }
    }

    pub fn same_key(&self, other: &Self) -> bool {
        self.target == other.target && self.action.key() == other.action.key()
    }
}

/// Append `candidate` unless an action with the same target and key is
/// already present. Returns whether it was appended.
pub fn push_unique<A: KeyedAction>(list: &mut Vec<TargetAction<A>>, candidate: TargetAction<A>) -> bool {
    if list.iter().any(|existing| existing.same_key(&candidate)) {
        return false;
    }
    list.push(candidate);
    true
}
