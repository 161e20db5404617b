//! Compute, per user, the actions that would bring every target in line
//! with the configured mappings.
//!
//! Planning only reads target state. Targets are visited in declaration
//! order and mappings within a target in declaration order, so the same
//! inputs always produce the same plan.

mod gitlab;
mod mailcow;
mod outline;

use tracing::{debug, info, instrument};

use crate::config::{BrokeConfig, TargetKind};
use crate::errors::ReconcileError;
use crate::identity::User;
use crate::options::{Phase, RunOptions};
use crate::plan::{Actions, Plan, UserPlan};
use crate::targets::ClientSet;

/// Read-only planning pass over a configuration and its clients.
pub struct Planner<'a> {
    config: &'a BrokeConfig,
    clients: &'a ClientSet,
    options: &'a RunOptions,
}

impl<'a> Planner<'a> {
    pub fn new(config: &'a BrokeConfig, clients: &'a ClientSet, options: &'a RunOptions) -> Self {
        Self {
            config,
            clients,
            options,
        }
    }

    /// Load users from every source in declaration order.
    ///
    /// Users are not merged across sources; each carries the name of the
    /// source it came from.
    #[instrument(skip(self))]
    pub async fn load_users(&self) -> Result<Vec<User>, ReconcileError> {
        let mut users = Vec::new();

        for source in &self.config.user_sources {
            let client = self.clients.source(&source.name)?;
            let loaded = client
                .list_users()
                .await
                .map_err(|error| ReconcileError::SourceUnavailable {
                    source_name: source.name.clone(),
                    error,
                })?;

            info!(source = %source.name, count = loaded.len(), "loaded users");
            users.extend(loaded.into_iter().map(|mut user| {
                user.source = source.name.clone();
                user
            }));
        }

        Ok(users)
    }

    /// Build the plan for `users`, keeping their order.
    #[instrument(skip(self, users), fields(users = users.len()))]
    pub async fn compute_plan(&self, users: &[User]) -> Result<Plan, ReconcileError> {
        let progress = &self.options.progress;
        progress.start(Phase::Planning, users.len() as u64);

        let mut user_plans = Vec::with_capacity(users.len());
        for user in users {
            match self.user_actions(user).await {
                Ok(actions) => {
                    debug!(username = %user.username, actions = actions.len(), "planned user");
                    user_plans.push(UserPlan {
                        user: user.clone(),
                        actions,
                    });
                    progress.advance(&user.username);
                }
                Err(e) => {
                    progress.finish();
                    return Err(e);
                }
            }
        }
        progress.finish();

        let plan = Plan { user_plans };
        info!(
            users = plan.user_plans.len(),
            actions = plan.action_count(),
            "plan computed"
        );
        Ok(plan)
    }

    /// Load users, then plan them.
    pub async fn plan(&self) -> Result<Plan, ReconcileError> {
        let users = self.load_users().await?;
        self.compute_plan(&users).await
    }

    /// Every action one user needs, across all targets.
    pub async fn user_actions(&self, user: &User) -> Result<Actions, ReconcileError> {
        let mut actions = Actions::default();

        for target in &self.config.user_targets {
            match &target.kind {
                TargetKind::Mailcow(cfg) => {
                    self.plan_mailcow(&target.name, cfg, user, &mut actions.mailcow_actions)
                        .await?
                }
                TargetKind::Outline(cfg) => {
                    self.plan_outline(&target.name, cfg, user, &mut actions.outline_actions)
                        .await?
                }
                TargetKind::Gitlab(cfg) => {
                    self.plan_gitlab(&target.name, cfg, user, &mut actions.gitlab_actions)
                        .await?
                }
            }
        }

        Ok(actions)
    }
}
