use tracing::{debug, trace, warn};

use crate::actions::{push_unique, OutlineAction, OutlineRole, TargetAction};
use crate::config::OutlineConfig;
use crate::errors::ReconcileError;
use crate::identity::{is_satisfied, MappingSet, User};
use crate::targets::{exactly_one, WikiTarget, WikiUser};

use super::Planner;

/// One piece of wiki state asked for by a satisfied mapping.
#[derive(Debug, Clone, PartialEq)]
enum Wanted {
    Group(String),
    Role(OutlineRole),
}

impl Planner<'_> {
    pub(super) async fn plan_outline(
        &self,
        target: &str,
        config: &OutlineConfig,
        user: &User,
        out: &mut Vec<TargetAction<OutlineAction>>,
    ) -> Result<(), ReconcileError> {
        let Some(wanted) = desired_wiki(target, config, user)? else {
            return Ok(());
        };

        let client = self.clients.wiki_target(target)?;
        let (wiki_user, member_of) = lookup(target, client, user).await?;

        for item in wanted {
            match item {
                Wanted::Group(group_name) => {
                    let groups = client
                        .find_groups(&group_name)
                        .await
                        .map_err(|e| ReconcileError::target(target, e))?;
                    exactly_one(target, "group", &group_name, groups)?;

                    if member_of.contains(&group_name) {
                        trace!(user_target = %target, group = %group_name, "already a group member");
                        continue;
                    }
                    debug!(user_target = %target, group = %group_name, "planned group membership");
                    push_unique(out, TargetAction::new(target, OutlineAction::AddGroup { group_name }));
                }
                Wanted::Role(role) => {
                    if wiki_user.role == Some(role) {
                        trace!(user_target = %target, %role, "role already set");
                        continue;
                    }
                    debug!(user_target = %target, %role, current = ?wiki_user.role, "planned role change");
                    push_unique(out, TargetAction::new(target, OutlineAction::SetRole { role }));
                }
            }
        }
        Ok(())
    }
}

/// Fold the satisfied mappings into the wiki state they ask for, in
/// mapping order. The first mapping naming a role decides the role.
/// `None` when no mapping applies to the user.
fn desired_wiki(
    target: &str,
    config: &OutlineConfig,
    user: &User,
) -> Result<Option<Vec<Wanted>>, ReconcileError> {
    let mut wanted: Option<Vec<Wanted>> = None;

    for mapping in &config.mappings {
        if !is_satisfied(user, &MappingSet::from(&mapping.criteria)) {
            continue;
        }

        let role = match mapping.outline_role.as_deref() {
            Some(raw) => Some(
                raw.parse::<OutlineRole>()
                    .map_err(|e| ReconcileError::invalid_mapping(target, e))?,
            ),
            None => None,
        };
        if mapping.outline_group.is_none() && role.is_none() {
            return Err(ReconcileError::invalid_mapping(
                target,
                "outline mapping needs outline_group or outline_role",
            ));
        }

        let items = wanted.get_or_insert_with(Vec::new);
        if let Some(group) = &mapping.outline_group {
            let item = Wanted::Group(group.clone());
            if !items.contains(&item) {
                items.push(item);
            }
        }
        let Some(role) = role else {
            continue;
        };
        let kept = items.iter().find_map(|item| match item {
            Wanted::Role(kept) => Some(*kept),
            Wanted::Group(_) => None,
        });
        match kept {
            None => items.push(Wanted::Role(role)),
            Some(kept) if kept != role => {
                warn!(
                    user_target = %target,
                    username = %user.username,
                    %kept,
                    ignored = %role,
                    "conflicting outline roles, keeping the first"
                );
            }
            Some(_) => {}
        }
    }
    Ok(wanted)
}

async fn lookup(
    target: &str,
    client: &dyn WikiTarget,
    user: &User,
) -> Result<(WikiUser, Vec<String>), ReconcileError> {
    let matches = client
        .find_users(&user.email)
        .await
        .map_err(|e| ReconcileError::target(target, e))?;
    let wiki_user = exactly_one(target, "user", &user.email, matches)?;

    let groups = client
        .user_group_names(&wiki_user.id)
        .await
        .map_err(|e| ReconcileError::target(target, e))?;
    trace!(user_target = %target, id = %wiki_user.id, groups = groups.len(), "resolved wiki account");
    Ok((wiki_user, groups))
}
