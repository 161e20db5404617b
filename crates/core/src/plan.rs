//! The plan: per-user lists of actions that would converge each target.

use serde::{Deserialize, Serialize};

use crate::actions::{GitlabAction, MailcowAction, OutlineAction, TargetAction};
use crate::identity::User;

/// Everything a run would change, one entry per loaded user in load order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub user_plans: Vec<UserPlan>,
}

impl Plan {
    /// Total number of actions across all users and target kinds.
    pub fn action_count(&self) -> usize {
        self.user_plans.iter().map(|p| p.actions.len()).sum()
    }

    /// True when no user needs any change.
    pub fn is_empty(&self) -> bool {
        self.action_count() == 0
    }

    /// Number of users with at least one action.
    pub fn users_with_actions(&self) -> usize {
        self.user_plans.iter().filter(|p| p.has_actions()).count()
    }
}

/// Actions planned for a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPlan {
    pub user: User,
    pub actions: Actions,
}

impl UserPlan {
    pub fn has_actions(&self) -> bool {
        !self.actions.is_empty()
    }
}

/// Actions grouped by target kind. Each list is ordered by target
/// declaration, then mapping declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actions {
    pub mailcow_actions: Vec<TargetAction<MailcowAction>>,
    pub outline_actions: Vec<TargetAction<OutlineAction>>,
    pub gitlab_actions: Vec<TargetAction<GitlabAction>>,
}

impl Actions {
    pub fn len(&self) -> usize {
        self.mailcow_actions.len() + self.outline_actions.len() + self.gitlab_actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
