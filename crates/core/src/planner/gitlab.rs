use tracing::{debug, trace, warn};

use crate::actions::{push_unique, AccessLevel, GitlabAction, GroupPermission, TargetAction};
use crate::config::GitLabConfig;
use crate::errors::ReconcileError;
use crate::identity::{is_satisfied, MappingSet, User};
use crate::targets::exactly_one;

use super::Planner;

/// One piece of source-control state asked for by a satisfied mapping.
#[derive(Debug, Clone, PartialEq)]
enum Wanted {
    AccessLevel(AccessLevel),
    Group(String, GroupPermission),
}

impl Planner<'_> {
    pub(super) async fn plan_gitlab(
        &self,
        target: &str,
        config: &GitLabConfig,
        user: &User,
        out: &mut Vec<TargetAction<GitlabAction>>,
    ) -> Result<(), ReconcileError> {
        let Some(wanted) = desired_scm(target, config, user)? else {
            return Ok(());
        };

        let client = self.clients.scm_target(target)?;
        let matches = client
            .find_users(&user.username)
            .await
            .map_err(|e| ReconcileError::target(target, e))?;
        let account = exactly_one(target, "user", &user.username, matches)?;

        for item in wanted {
            match item {
                Wanted::AccessLevel(level) => {
                    if account.access_level() == level {
                        trace!(user_target = %target, %level, "access level already set");
                        continue;
                    }
                    debug!(user_target = %target, %level, "planned access level change");
                    push_unique(
                        out,
                        TargetAction::new(target, GitlabAction::SetAccessLevel { access_level: level }),
                    );
                }
                Wanted::Group(group_name, permission) => {
                    let groups = client
                        .find_groups(&group_name)
                        .await
                        .map_err(|e| ReconcileError::target(target, e))?;
                    let group = exactly_one(target, "group", &group_name, groups)?;

                    let current = client
                        .member_permission(group.id, account.id)
                        .await
                        .map_err(|e| ReconcileError::target(target, e))?;
                    if current == Some(permission) {
                        trace!(user_target = %target, group = %group_name, %permission, "membership up to date");
                        continue;
                    }

                    debug!(
                        user_target = %target,
                        group = %group_name,
                        %permission,
                        current = ?current,
                        "planned group membership"
                    );
                    push_unique(
                        out,
                        TargetAction::new(
                            target,
                            GitlabAction::AddGroup {
                                group_name,
                                permission_level: permission,
                            },
                        ),
                    );
                }
            }
        }
        Ok(())
    }
}

/// Fold the satisfied mappings into the source-control state they ask for,
/// in mapping order. The first mapping naming the access level, or a
/// given group, decides its value. `None` when no mapping applies to the
/// user.
fn desired_scm(
    target: &str,
    config: &GitLabConfig,
    user: &User,
) -> Result<Option<Vec<Wanted>>, ReconcileError> {
    let mut wanted: Option<Vec<Wanted>> = None;

    for mapping in &config.mappings {
        if !is_satisfied(user, &MappingSet::from(&mapping.criteria)) {
            continue;
        }

        let access_level = match mapping.access_level.as_deref() {
            Some(raw) => Some(
                raw.parse::<AccessLevel>()
                    .map_err(|e| ReconcileError::invalid_mapping(target, e))?,
            ),
            None => None,
        };
        let assignments = mapping
            .group_assignments
            .iter()
            .map(|a| {
                a.permission
                    .parse::<GroupPermission>()
                    .map(|p| (a.group.as_str(), p))
                    .map_err(|e| ReconcileError::invalid_mapping(target, e))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if access_level.is_none() && assignments.is_empty() {
            return Err(ReconcileError::invalid_mapping(
                target,
                "gitlab mapping needs access_level or group_assignments",
            ));
        }

        let items = wanted.get_or_insert_with(Vec::new);

        if let Some(level) = access_level {
            let kept = items.iter().find_map(|item| match item {
                Wanted::AccessLevel(kept) => Some(*kept),
                Wanted::Group(..) => None,
            });
            match kept {
                None => items.push(Wanted::AccessLevel(level)),
                Some(kept) if kept != level => {
                    warn!(
                        user_target = %target,
                        username = %user.username,
                        %kept,
                        ignored = %level,
                        "conflicting gitlab access levels, keeping the first"
                    );
                }
                Some(_) => {}
            }
        }

        for (group_name, permission) in assignments {
            let kept = items.iter().find_map(|item| match item {
                Wanted::Group(name, kept) if name == group_name => Some(*kept),
                _ => None,
            });
            match kept {
                None => items.push(Wanted::Group(group_name.to_string(), permission)),
                Some(kept) if kept != permission => {
                    warn!(
                        user_target = %target,
                        username = %user.username,
                        group = %group_name,
                        %kept,
                        ignored = %permission,
                        "conflicting gitlab group permissions, keeping the first"
                    );
                }
                Some(_) => {}
            }
        }
    }
    Ok(wanted)
}
