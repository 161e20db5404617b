//! A single identity loaded from a user source.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// One user as seen by a source directory during the current run.
///
/// Users from different sources are never merged: the same person in two
/// sources yields two `User` values distinguished by `source`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Stable identifier assigned by the source.
    pub id: String,
    /// Name of the configured source the user was loaded from.
    pub source: String,
    pub username: String,
    pub email: String,
    /// Group names the user is a member of.
    pub groups: BTreeSet<String>,
    /// Role names held directly or inherited through groups.
    pub roles: BTreeSet<String>,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            username: username.into(),
            email: email.into(),
            groups: BTreeSet::new(),
            roles: BTreeSet::new(),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups.extend(groups.into_iter().map(Into::into));
        self
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Case-sensitive group membership test.
    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains(name)
    }

    /// Case-sensitive role membership test.
    pub fn has_role(&self, name: &str) -> bool {
        self.roles.contains(name)
    }
}
