//! Apply a plan to the targets.
//!
//! Users are processed in plan order. For each user, mail actions run
//! first, then wiki actions, then source-control actions. The first
//! failure aborts the run; actions already applied stay applied, and a
//! fresh plan afterwards only contains what is still missing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::actions::{GitlabAction, MailcowAction, OutlineAction, TargetAction};
use crate::errors::ReconcileError;
use crate::identity::User;
use crate::options::{Phase, RunOptions};
use crate::plan::{Plan, UserPlan};
use crate::targets::{exactly_one, ClientSet, CreateMailbox};

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub users: usize,
    /// Actions in the plan that was run.
    pub actions_planned: usize,
    /// Actions that changed a target. Always zero for a dry run.
    pub actions_applied: usize,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Executes plans against the registered clients.
pub struct Runner<'a> {
    clients: &'a ClientSet,
    options: &'a RunOptions,
}

impl<'a> Runner<'a> {
    pub fn new(clients: &'a ClientSet, options: &'a RunOptions) -> Self {
        Self { clients, options }
    }

    /// Apply every action of `plan`, stopping at the first failure.
    #[instrument(skip(self, plan), fields(actions = plan.action_count(), dry_run = self.options.dry_run))]
    pub async fn apply(&self, plan: &Plan) -> Result<RunReport, ReconcileError> {
        let started_at = Utc::now();
        let progress = &self.options.progress;
        progress.start(Phase::Applying, plan.user_plans.len() as u64);

        let mut applied = 0;
        for user_plan in &plan.user_plans {
            match self.apply_user(user_plan).await {
                Ok(count) => {
                    applied += count;
                    progress.advance(&user_plan.user.username);
                }
                Err(e) => {
                    progress.finish();
                    return Err(e);
                }
            }
        }
        progress.finish();

        let report = RunReport {
            users: plan.user_plans.len(),
            actions_planned: plan.action_count(),
            actions_applied: if self.options.dry_run { 0 } else { applied },
            dry_run: self.options.dry_run,
            started_at,
            completed_at: Utc::now(),
        };
        info!(
            users = report.users,
            planned = report.actions_planned,
            applied = report.actions_applied,
            dry_run = report.dry_run,
            "run complete"
        );
        Ok(report)
    }

    async fn apply_user(&self, plan: &UserPlan) -> Result<usize, ReconcileError> {
        if !plan.has_actions() {
            return Ok(0);
        }
        let user = &plan.user;
        let actions = &plan.actions;

        for action in &actions.mailcow_actions {
            self.apply_mailcow(user, action).await?;
        }

        // Account lookups are shared by every action on the same target.
        let mut wiki_ids: HashMap<&str, String> = HashMap::new();
        for action in &actions.outline_actions {
            self.apply_outline(user, action, &mut wiki_ids).await?;
        }

        let mut scm_ids: HashMap<&str, u64> = HashMap::new();
        for action in &actions.gitlab_actions {
            self.apply_gitlab(user, action, &mut scm_ids).await?;
        }

        Ok(actions.len())
    }

    async fn apply_mailcow(
        &self,
        user: &User,
        action: &TargetAction<MailcowAction>,
    ) -> Result<(), ReconcileError> {
        let target = action.target.as_str();
        let client = self.clients.mail_target(target)?;

        match &action.action {
            MailcowAction::CreateAccount {
                domain,
                auth_source,
            } => {
                let request = CreateMailbox {
                    local_part: user.username.clone(),
                    domain: domain.clone(),
                    name: user.username.clone(),
                    auth_source: auth_source.clone(),
                };
                if self.options.dry_run {
                    info!(user_target = %target, address = %request.address(), "dry run: would create mailbox");
                    return Ok(());
                }
                client
                    .create_mailbox(&request)
                    .await
                    .map_err(|e| ReconcileError::target(target, e))?;
                info!(user_target = %target, address = %request.address(), "created mailbox");
            }
        }
        Ok(())
    }

    async fn apply_outline<'p>(
        &self,
        user: &User,
        action: &'p TargetAction<OutlineAction>,
        ids: &mut HashMap<&'p str, String>,
    ) -> Result<(), ReconcileError> {
        let target = action.target.as_str();
        let client = self.clients.wiki_target(target)?;

        if self.options.dry_run {
            info!(user_target = %target, username = %user.username, action = ?action.action, "dry run: would apply");
            return Ok(());
        }

        let user_id = match ids.get(target) {
            Some(id) => id.clone(),
            None => {
                let matches = client
                    .find_users(&user.email)
                    .await
                    .map_err(|e| ReconcileError::target(target, e))?;
                let account = exactly_one(target, "user", &user.email, matches)?;
                debug!(user_target = %target, id = %account.id, "resolved wiki account");
                ids.insert(target, account.id.clone());
                account.id
            }
        };

        match &action.action {
            OutlineAction::AddGroup { group_name } => {
                let groups = client
                    .find_groups(group_name)
                    .await
                    .map_err(|e| ReconcileError::target(target, e))?;
                let group = exactly_one(target, "group", group_name, groups)?;
                client
                    .add_user_to_group(&user_id, &group.id)
                    .await
                    .map_err(|e| ReconcileError::target(target, e))?;
                info!(user_target = %target, username = %user.username, group = %group_name, "added to wiki group");
            }
            OutlineAction::SetRole { role } => {
                client
                    .set_user_role(&user_id, *role)
                    .await
                    .map_err(|e| ReconcileError::target(target, e))?;
                info!(user_target = %target, username = %user.username, %role, "set wiki role");
            }
        }
        Ok(())
    }

    async fn apply_gitlab<'p>(
        &self,
        user: &User,
        action: &'p TargetAction<GitlabAction>,
        ids: &mut HashMap<&'p str, u64>,
    ) -> Result<(), ReconcileError> {
        let target = action.target.as_str();
        let client = self.clients.scm_target(target)?;

        if self.options.dry_run {
            info!(user_target = %target, username = %user.username, action = ?action.action, "dry run: would apply");
            return Ok(());
        }

        let user_id = match ids.get(target) {
            Some(id) => *id,
            None => {
                let matches = client
                    .find_users(&user.username)
                    .await
                    .map_err(|e| ReconcileError::target(target, e))?;
                let account = exactly_one(target, "user", &user.username, matches)?;
                debug!(user_target = %target, id = account.id, "resolved gitlab account");
                ids.insert(target, account.id);
                account.id
            }
        };

        match &action.action {
            GitlabAction::AddGroup {
                group_name,
                permission_level,
            } => {
                let groups = client
                    .find_groups(group_name)
                    .await
                    .map_err(|e| ReconcileError::target(target, e))?;
                let group = exactly_one(target, "group", group_name, groups)?;
                client
                    .add_user_to_group(user_id, group.id, *permission_level)
                    .await
                    .map_err(|e| ReconcileError::target(target, e))?;
                info!(
                    user_target = %target,
                    username = %user.username,
                    group = %group_name,
                    permission = %permission_level,
                    "added to gitlab group"
                );
            }
            GitlabAction::SetAccessLevel { access_level } => {
                client
                    .set_access_level(user_id, *access_level)
                    .await
                    .map_err(|e| ReconcileError::target(target, e))?;
                info!(user_target = %target, username = %user.username, level = %access_level, "set gitlab access level");
            }
        }
        Ok(())
    }
}
