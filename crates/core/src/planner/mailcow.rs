use tracing::{debug, trace};

use crate::actions::{push_unique, MailcowAction, TargetAction};
use crate::config::MailcowConfig;
use crate::errors::ReconcileError;
use crate::identity::{is_satisfied, MappingSet, User};

use super::Planner;

impl Planner<'_> {
    /// A satisfied mapping yields `CreateAccount` unless the mailbox
    /// `<username>@<domain>` already exists.
    pub(super) async fn plan_mailcow(
        &self,
        target: &str,
        config: &MailcowConfig,
        user: &User,
        out: &mut Vec<TargetAction<MailcowAction>>,
    ) -> Result<(), ReconcileError> {
        for mapping in &config.mappings {
            if !is_satisfied(user, &MappingSet::from(&mapping.criteria)) {
                continue;
            }
            if mapping.domain.is_empty() {
                return Err(ReconcileError::invalid_mapping(target, "mailcow mapping without domain"));
            }

            let client = self.clients.mail_target(target)?;
            let address = format!("{}@{}", user.username, mapping.domain);
            trace!(user_target = %target, %address, "mapping satisfied, checking mailbox");

            let exists = client
                .mailbox_exists(&address)
                .await
                .map_err(|e| ReconcileError::target(target, e))?;
            if exists {
                trace!(user_target = %target, %address, "mailbox already exists");
                continue;
            }

            let action = TargetAction::new(
                target,
                MailcowAction::CreateAccount {
                    domain: mapping.domain.clone(),
                    auth_source: mapping.auth_source.clone(),
                },
            );
            if push_unique(out, action) {
                debug!(user_target = %target, %address, "planned mailbox creation");
            }
        }
        Ok(())
    }
}
